//! `clock-in`, `break start|end` and `clock-out`.

use super::AppContext;
use crate::backend::Backend;
use crate::cli::parser::{BreakAction, Commands};
use crate::core::resolver::StoreResolver;
use crate::core::strategy::StrategyContext;
use crate::errors::{AppResult, AttendanceError};
use crate::models::{DeviceInfo, StoreCandidate};
use crate::ui::messages::{info, success, verification_warnings, warning};
use crate::utils::formatting::{meters2readable, secs2readable};
use crate::utils::time::{format_local, format_local_time};
use chrono::{DateTime, Utc};

/// Pick the store: the auto-selection, or a manual one with a reason.
fn choose_store(
    resolver: &mut StoreResolver<Backend>,
    requested: Option<&str>,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<StoreCandidate> {
    let auto = resolver.selected_store();

    let store = match (requested, auto) {
        (Some(id), Some(auto)) if auto.id() == id => auto,
        (Some(id), _) => resolver.override_store(id, reason.unwrap_or_default(), now)?,
        (None, Some(auto)) => auto,
        (None, None) => {
            return Err(AttendanceError::Validation(
                "no store within the geofence; choose one with --store and --reason".into(),
            )
            .into());
        }
    };
    Ok(store)
}

pub async fn handle_clock_in(cmd: &Commands, ctx: &AppContext) -> AppResult<()> {
    let Commands::ClockIn {
        method,
        store,
        reason,
        scan,
        position,
    } = cmd
    else {
        return Ok(());
    };

    let machine = ctx.machine().await?;
    if let Some(open) = machine.session() {
        return Err(AttendanceError::Conflict(format!(
            "already clocked in since {} at '{}'",
            format_local(open.clock_in_at),
            open.store_id
        ))
        .into());
    }

    let now = ctx.clock.now();
    let position = ctx.position(position)?;

    let mut resolver = ctx.resolver(machine.backend().clone());
    let resolution = resolver.resolve(position.clone()).await?;
    if resolution.candidates.is_empty() {
        let err = AttendanceError::Validation("no stores configured for this tenant".into());
        return Err(err.into());
    }
    let store = choose_store(&mut resolver, store.as_deref(), reason.as_deref(), now)?;
    if let Some(manual) = resolver.manual_override() {
        info(format!(
            "Store overridden to '{}': {}",
            manual.store.id(),
            manual.reason
        ));
    }

    let method = method.unwrap_or(ctx.cfg.default_method);
    let mut registry = ctx.registry();
    let strategy_ctx = StrategyContext {
        user_id: ctx.user_id.clone(),
        store: Some(store.clone()),
        position,
        scanned: scan.clone(),
        device: DeviceInfo::detect(),
        geofence_radius_m: ctx.cfg.geofence_radius_m,
        now,
    };

    registry.select(method, &strategy_ctx)?;
    let (payload, warnings) = registry.verify(&strategy_ctx)?;
    registry.deactivate();
    verification_warnings(method, warnings);

    machine.select_method(method);
    machine.select_store(store.clone());
    let session = machine.clock_in(payload).await?;

    let distance = store
        .distance_meters
        .map(|d| format!(", {}", meters2readable(d)))
        .unwrap_or_default();
    success(format!(
        "Clocked in at {} ({}{}) via {} at {}",
        store.name(),
        store.id(),
        distance,
        session.tracking_method,
        format_local_time(session.clock_in_at)
    ));
    Ok(())
}

pub async fn handle_break(cmd: &Commands, ctx: &AppContext) -> AppResult<()> {
    let Commands::Break { action } = cmd else {
        return Ok(());
    };
    let machine = ctx.machine().await?;

    match action {
        BreakAction::Start => {
            let session = machine.start_break().await?;
            let at = session.open_break().map_or(session.clock_in_at, |b| b.start);
            success(format!("Break started at {}", format_local_time(at)));
        }
        BreakAction::End => {
            let session = machine.end_break().await?;
            if let Some(last) = session.breaks.last() {
                success(format!(
                    "Break ended ({})",
                    secs2readable(last.seconds_until(ctx.clock.now()), false)
                ));
            }
        }
    }
    Ok(())
}

pub async fn handle_clock_out(ctx: &AppContext) -> AppResult<()> {
    let machine = ctx.machine().await?;
    let outcome = machine.clock_out().await?;
    let session = &outcome.session;

    if outcome.auto_closed_break {
        warning("A running break was closed at clock-out.");
    }

    let Some(out) = session.clock_out_at else {
        return Ok(());
    };
    success(format!(
        "Clocked out at {}: worked {}, breaks {} ({} closed)",
        format_local_time(out),
        secs2readable(session.work_seconds_at(out), false),
        secs2readable(session.break_seconds_at(out), false),
        session.closed_breaks()
    ));
    Ok(())
}
