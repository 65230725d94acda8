use super::AppContext;
use crate::backend::Backend;
use crate::cli::parser::Commands;
use crate::core::machine::{AttendanceStateMachine, ErrorOverlay, Guards, Phase};
use crate::core::timers::DerivedTimers;
use crate::errors::AppResult;
use crate::models::AttendanceSession;
use crate::ui::messages::info;
use crate::utils::colors::{CYAN, RED, RESET, YELLOW, color_for_phase};
use crate::utils::formatting::secs2readable;
use crate::utils::time::{format_local, format_local_time};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    user_id: String,
    phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<AttendanceSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timers: Option<DerivedTimers>,
    guards: Guards,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorOverlay>,
}

impl StatusView {
    fn of(machine: &AttendanceStateMachine<Backend>) -> Self {
        Self {
            user_id: machine.user_id().to_string(),
            phase: machine.phase(),
            session: machine.session(),
            timers: machine.timers(),
            guards: machine.guards(),
            error: machine.last_error(),
        }
    }
}

fn timers_line(t: &DerivedTimers) -> String {
    let mut line = format!(
        "elapsed {} | worked {} | breaks {}",
        secs2readable(t.elapsed_seconds, true),
        secs2readable(t.elapsed_work_seconds, true),
        secs2readable(t.break_seconds, true)
    );
    if t.needs_break {
        line.push_str(&format!(" | {YELLOW}break due{RESET}"));
    }
    if t.is_overtime {
        line.push_str(&format!(" | {RED}overtime{RESET}"));
    }
    line
}

pub async fn handle(cmd: &Commands, ctx: &AppContext) -> AppResult<()> {
    let Commands::Status { json, watch } = cmd else {
        return Ok(());
    };

    let machine = ctx.machine().await?;
    let view = StatusView::of(&machine);

    if *json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let phase = view.phase.as_str();
    println!(
        "{}• User:{} {}   {}• State:{} {}{}{}",
        CYAN,
        RESET,
        view.user_id,
        CYAN,
        RESET,
        color_for_phase(phase),
        phase,
        RESET
    );

    let Some(session) = &view.session else {
        info("Not clocked in.");
        return Ok(());
    };

    println!(
        "{}• Session:{} {} at '{}' via {} since {}",
        CYAN,
        RESET,
        session.id,
        session.store_id,
        session.tracking_method,
        format_local(session.clock_in_at)
    );
    for (i, b) in session.breaks.iter().enumerate() {
        let end = b.end.map_or_else(|| "running".to_string(), format_local_time);
        println!("    break {}: {} → {}", i + 1, format_local_time(b.start), end);
    }
    if let Some(t) = &view.timers {
        println!("{}• Timers:{} {}", CYAN, RESET, timers_line(t));
    }

    if let Some(ticks) = watch {
        let mut rx = machine.start_ticker();
        for _ in 0..*ticks {
            if rx.changed().await.is_err() {
                break;
            }
            let t = *rx.borrow_and_update();
            println!("  ⏱  {}", timers_line(&t));
        }
        machine.stop_ticker();
    }

    Ok(())
}
