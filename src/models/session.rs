use super::tracking_method::TrackingMethod;
use crate::errors::{AttendanceError, AttendanceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Location snapshot captured at clock-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakInterval {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl BreakInterval {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Seconds spent on this break, counting no further than `upper`.
    pub fn seconds_until(&self, upper: DateTime<Utc>) -> i64 {
        let end = self.end.map_or(upper, |e| e.min(upper));
        (end - self.start).num_seconds().max(0)
    }
}

/// One open or closed work period of a user.
///
/// The backend copy is the system of record. The mutating helpers below are
/// shared by the backends (to apply a transition) and by the state machine (to
/// dry-run one before calling out), so both enforce the same invariants:
///
/// - `clock_out_at` is strictly after `clock_in_at`;
/// - breaks are ordered, non-overlapping and inside the session;
/// - only the last break may be open, and only while the session is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSession {
    pub id: Uuid,
    pub user_id: String,
    pub store_id: String,
    pub tracking_method: TrackingMethod,
    pub clock_in_at: DateTime<Utc>,
    #[serde(default)]
    pub clock_out_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub breaks: Vec<BreakInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoSnapshot>,
}

impl AttendanceSession {
    pub fn open(
        id: Uuid,
        user_id: impl Into<String>,
        store_id: impl Into<String>,
        tracking_method: TrackingMethod,
        clock_in_at: DateTime<Utc>,
        geo_location: Option<GeoSnapshot>,
    ) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            store_id: store_id.into(),
            tracking_method,
            clock_in_at,
            clock_out_at: None,
            breaks: Vec::new(),
            geo_location,
        }
    }

    pub fn is_open(&self) -> bool {
        self.clock_out_at.is_none()
    }

    pub fn open_break(&self) -> Option<&BreakInterval> {
        self.breaks.last().filter(|b| b.is_open())
    }

    pub fn is_on_break(&self) -> bool {
        self.open_break().is_some()
    }

    /// True once any break (open or closed) was started in this session.
    pub fn has_taken_break(&self) -> bool {
        !self.breaks.is_empty()
    }

    pub fn closed_breaks(&self) -> usize {
        self.breaks.iter().filter(|b| !b.is_open()).count()
    }

    fn upper_bound(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.clock_out_at.unwrap_or(now)
    }

    /// Wall-clock seconds since clock-in (up to clock-out for closed sessions).
    pub fn presence_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        (self.upper_bound(now) - self.clock_in_at).num_seconds().max(0)
    }

    /// Closed break durations plus the running one.
    pub fn break_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        let upper = self.upper_bound(now);
        self.breaks.iter().map(|b| b.seconds_until(upper)).sum()
    }

    pub fn work_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        (self.presence_seconds_at(now) - self.break_seconds_at(now)).max(0)
    }

    pub fn begin_break(&mut self, at: DateTime<Utc>) -> AttendanceResult<()> {
        if !self.is_open() {
            return Err(AttendanceError::State("session is already closed".into()));
        }
        if self.is_on_break() {
            return Err(AttendanceError::State("a break is already running".into()));
        }
        if at < self.clock_in_at {
            return Err(AttendanceError::Validation(
                "a break cannot start before clock-in".into(),
            ));
        }
        if let Some(prev_end) = self.breaks.last().and_then(|b| b.end)
            && at < prev_end
        {
            return Err(AttendanceError::Validation(
                "a break cannot overlap the previous one".into(),
            ));
        }

        self.breaks.push(BreakInterval {
            start: at,
            end: None,
        });
        Ok(())
    }

    pub fn finish_break(&mut self, at: DateTime<Utc>) -> AttendanceResult<()> {
        if !self.is_open() {
            return Err(AttendanceError::State("session is already closed".into()));
        }
        let Some(open) = self.breaks.last_mut().filter(|b| b.is_open()) else {
            return Err(AttendanceError::State("no break is running".into()));
        };
        if at <= open.start {
            return Err(AttendanceError::Validation(
                "a break must end after it started".into(),
            ));
        }

        open.end = Some(at);
        Ok(())
    }

    /// Close the session at `at`.
    ///
    /// A running break is closed at the same instant when `close_open_break`
    /// is set, otherwise the clock-out is refused. Returns whether a break was
    /// auto-closed.
    pub fn close(&mut self, at: DateTime<Utc>, close_open_break: bool) -> AttendanceResult<bool> {
        if !self.is_open() {
            return Err(AttendanceError::State("session is already closed".into()));
        }
        if at <= self.clock_in_at {
            return Err(AttendanceError::Validation(
                "clock-out must be after clock-in".into(),
            ));
        }

        let mut auto_closed = false;
        if self.is_on_break() {
            if !close_open_break {
                return Err(AttendanceError::State(
                    "end the running break before clocking out".into(),
                ));
            }
            self.finish_break(at)?;
            auto_closed = true;
        }

        self.clock_out_at = Some(at);
        Ok(auto_closed)
    }

    /// Check the structural invariants of a session received from a backend.
    pub fn check_invariants(&self) -> AttendanceResult<()> {
        let invalid = |msg: &str| {
            Err(AttendanceError::Validation(format!(
                "session {}: {}",
                self.id, msg
            )))
        };

        if let Some(out) = self.clock_out_at
            && out <= self.clock_in_at
        {
            return invalid("clock-out is not after clock-in");
        }

        let last = self.breaks.len().saturating_sub(1);
        let mut prev_end: Option<DateTime<Utc>> = None;

        for (i, b) in self.breaks.iter().enumerate() {
            if b.start < self.clock_in_at {
                return invalid("break starts before clock-in");
            }
            if prev_end.is_some_and(|p| b.start < p) {
                return invalid("breaks overlap or are out of order");
            }
            match b.end {
                Some(end) => {
                    if end <= b.start {
                        return invalid("break ends before it starts");
                    }
                    if self.clock_out_at.is_some_and(|out| end > out) {
                        return invalid("break ends after clock-out");
                    }
                    prev_end = Some(end);
                }
                None => {
                    if i != last {
                        return invalid("only the last break may be open");
                    }
                    if self.clock_out_at.is_some() {
                        return invalid("closed session has an open break");
                    }
                }
            }
        }

        Ok(())
    }
}
