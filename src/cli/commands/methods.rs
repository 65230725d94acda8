use super::AppContext;
use crate::errors::AppResult;
use crate::models::TrackingMethod;
use crate::utils::colors::{GREEN, GREY, RESET};
use crate::utils::formatting::pad_right;

pub fn handle(ctx: &AppContext) -> AppResult<()> {
    let registry = ctx.registry();
    let capabilities = registry.capabilities();
    let available = registry.available_methods(&capabilities);

    println!("🔐 Tracking methods on this device:\n");
    for method in TrackingMethod::ALL {
        let default = if method == ctx.cfg.default_method {
            " (default)"
        } else {
            ""
        };
        if available.contains(&method) {
            println!(
                "  {GREEN}✔{RESET} {} {}{}",
                pad_right(method.to_db_str(), 6),
                method.label(),
                default
            );
        } else {
            println!(
                "  {GREY}✘ {} {} (not supported){}{RESET}",
                pad_right(method.to_db_str(), 6),
                method.label(),
                default
            );
        }
    }
    Ok(())
}
