//! Derived timers and the ticker task that republishes them.

use crate::core::clock::Clock;
use crate::core::machine::MachineSnapshot;
use crate::core::policy::{AttendancePolicy, OvertimeBasis};
use crate::models::AttendanceSession;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace};

/// Presentational values recomputed on every tick. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedTimers {
    pub elapsed_seconds: i64,
    pub elapsed_work_seconds: i64,
    pub break_seconds: i64,
    pub needs_break: bool,
    pub is_overtime: bool,
}

impl DerivedTimers {
    pub fn compute(
        session: &AttendanceSession,
        now: DateTime<Utc>,
        policy: &AttendancePolicy,
    ) -> Self {
        let elapsed = session.presence_seconds_at(now);
        let breaks = session.break_seconds_at(now);
        let work = (elapsed - breaks).max(0);

        let overtime_measure = match policy.overtime_basis {
            OvertimeBasis::Presence => elapsed,
            OvertimeBasis::NetWork => work,
        };

        Self {
            elapsed_seconds: elapsed,
            elapsed_work_seconds: work,
            break_seconds: breaks,
            needs_break: !session.has_taken_break()
                && work >= policy.break_required_after.num_seconds(),
            is_overtime: overtime_measure >= policy.overtime_after.num_seconds(),
        }
    }
}

/// Handle of a running ticker. Dropping it stops the task.
#[derive(Debug)]
pub struct TimerTicker {
    handle: JoinHandle<()>,
}

impl TimerTicker {
    /// Spawn a task that recomputes the timers every `policy.tick_interval`
    /// and whenever a new snapshot is published. The task ends on its own
    /// once the session is closed or gone, or when nobody listens anymore.
    pub fn spawn(
        mut snapshots: watch::Receiver<MachineSnapshot>,
        clock: Arc<dyn Clock>,
        policy: AttendancePolicy,
    ) -> (Self, watch::Receiver<DerivedTimers>) {
        let initial = current(&snapshots.borrow(), clock.as_ref(), &policy).unwrap_or_default();
        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut ticks = interval(policy.tick_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticks.tick() => {}
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let (timers, open) = {
                    let snapshot = snapshots.borrow_and_update();
                    match snapshot.session() {
                        Some(session) => (
                            DerivedTimers::compute(session, clock.now(), &policy),
                            session.is_open(),
                        ),
                        None => break,
                    }
                };

                trace!(?timers, "tick");
                if tx.send(timers).is_err() || !open {
                    break;
                }
            }
            debug!("timer ticker stopped");
        });

        (Self { handle }, rx)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
        debug!("timer ticker aborted");
    }
}

impl Drop for TimerTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn current(
    snapshot: &MachineSnapshot,
    clock: &dyn Clock,
    policy: &AttendancePolicy,
) -> Option<DerivedTimers> {
    snapshot
        .session()
        .map(|s| DerivedTimers::compute(s, clock.now(), policy))
}
