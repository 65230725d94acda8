use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What clock-out does when a break is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenBreakPolicy {
    /// Close the break at clock-out time and report it.
    #[default]
    AutoClose,
    /// Refuse the clock-out until the break is ended.
    Reject,
}

/// Which elapsed time the overtime threshold is measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OvertimeBasis {
    /// Time since clock-in, breaks included.
    #[default]
    Presence,
    /// Time since clock-in minus breaks.
    NetWork,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendancePolicy {
    pub break_required_after: Duration,
    pub overtime_after: Duration,
    pub overtime_basis: OvertimeBasis,
    pub open_break_policy: OpenBreakPolicy,
    /// Maximum age of a verification payload.
    pub verification_window: Duration,
    pub tick_interval: std::time::Duration,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            break_required_after: Duration::hours(6),
            overtime_after: Duration::hours(8),
            overtime_basis: OvertimeBasis::default(),
            open_break_policy: OpenBreakPolicy::default(),
            verification_window: Duration::seconds(120),
            tick_interval: std::time::Duration::from_secs(1),
        }
    }
}
