use super::AppContext;
use crate::cli::parser::Commands;
use crate::core::resolver::Resolution;
use crate::errors::AppResult;
use crate::ui::messages::{info, warning};
use crate::utils::colors::{GREEN, GREY, RESET};
use crate::utils::formatting::{meters2readable, pad_right};

pub async fn handle(cmd: &Commands, ctx: &AppContext) -> AppResult<()> {
    let Commands::Resolve { position, json } = cmd else {
        return Ok(());
    };

    let position = ctx.position(position)?;
    let mut resolver = ctx.resolver(ctx.backend()?);
    let resolution = resolver.resolve(position).await?;

    if *json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
        return Ok(());
    }

    print_resolution(&resolution, resolver.radius_m());
    Ok(())
}

pub fn print_resolution(resolution: &Resolution, radius_m: f64) {
    if resolution.candidates.is_empty() {
        warning("No stores configured for this tenant.");
        return;
    }

    if let Some(reason) = &resolution.position_unavailable {
        warning(format!("Position unavailable ({reason}); pick a store with --store"));
    }

    let name_w = resolution
        .candidates
        .iter()
        .map(|c| c.name().len())
        .max()
        .unwrap_or(4);

    for c in &resolution.candidates {
        let selected = resolution
            .auto_selected
            .as_ref()
            .is_some_and(|a| a.id() == c.id());
        let marker = if selected { "▶" } else { " " };
        let distance = match c.distance_meters {
            Some(d) if c.in_geofence(radius_m) => format!("{GREEN}{}{RESET}", meters2readable(d)),
            Some(d) => meters2readable(d),
            None => format!("{GREY}--{RESET}"),
        };
        println!("{} {}  {}  {}", marker, pad_right(c.name(), name_w), c.id(), distance);
    }

    match &resolution.auto_selected {
        Some(store) => info(format!("Auto-selected: {} ({})", store.name(), store.id())),
        None if resolution.position_unavailable.is_none() => info(format!(
            "No store within {}; choose one with --store and --reason",
            meters2readable(radius_m)
        )),
        None => {}
    }
}
