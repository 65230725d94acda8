use super::AppContext;
use crate::cli::parser::Commands;
use crate::errors::AppResult;
use crate::ui::messages::info;
use crate::utils::colors::{CYAN, GREY, RESET, color_for_optional_field};
use crate::utils::formatting::{pad_right, secs2readable};
use crate::utils::time::{format_local, format_local_time};

pub fn handle(cmd: &Commands, ctx: &AppContext) -> AppResult<()> {
    let Commands::History { limit } = cmd else {
        return Ok(());
    };

    let backend = ctx.require_local("history")?;
    let sessions = backend.recent_sessions(&ctx.user_id, *limit)?;

    if sessions.is_empty() {
        info(format!("No sessions for '{}'", ctx.user_id));
        return Ok(());
    }

    let store_w = sessions
        .iter()
        .map(|s| s.store_id.len())
        .max()
        .unwrap_or(5)
        .max(5);

    println!(
        "{}{:<16}  {}  {:<6}  {:>5}  {:>6}  {:>6}{}",
        CYAN,
        "clock-in",
        pad_right("store", store_w),
        "method",
        "out",
        "breaks",
        "worked",
        RESET
    );

    let now = ctx.clock.now();
    for s in &sessions {
        let out = s.clock_out_at.map(format_local_time);
        let out_color = color_for_optional_field(out.as_deref());
        let out = out.unwrap_or_else(|| "--:--".to_string());

        println!(
            "{:<16}  {}  {:<6}  {}{:>5}{}  {:>6}  {:>6}",
            format_local(s.clock_in_at),
            pad_right(&s.store_id, store_w),
            s.tracking_method.to_db_str(),
            out_color,
            out,
            RESET,
            secs2readable(s.break_seconds_at(now), true),
            secs2readable(s.work_seconds_at(now), true)
        );
    }

    if sessions.iter().any(|s| s.is_open()) {
        println!("{GREY}(open sessions are counted up to now){RESET}");
    }
    Ok(())
}
