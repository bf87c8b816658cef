//! Session and status types plus the elapsed-time helpers behind duration labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Goal applied when `begin` is called without one.
pub const DEFAULT_GOAL_HOURS: f64 = 16.0;

/// One timed interval. `ended_at` is `None` only for the active session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub goal_hours: f64,
    pub duration_label: String,
}

impl Session {
    /// A freshly started session.
    pub fn started(id: u64, started_at: DateTime<Utc>, goal_hours: f64) -> Self {
        Self {
            id,
            started_at,
            ended_at: None,
            goal_hours,
            duration_label: duration_label(started_at, started_at),
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Close the session at `at`, fixing the final duration label.
    pub fn finish(mut self, at: DateTime<Utc>) -> Self {
        self.duration_label = duration_label(self.started_at, at);
        self.ended_at = Some(at);
        self
    }

    /// Elapsed `(hours, minutes)` between start and `now` (or the end, if closed).
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> (u64, u64) {
        split_elapsed(self.started_at, self.ended_at.unwrap_or(now))
    }
}

/// Transient projection of the active session, recomputed on every read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub active: bool,
    #[serde(default)]
    pub elapsed_hours: u64,
    #[serde(default)]
    pub elapsed_minutes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_hours: Option<f64>,
}

impl Status {
    pub fn inactive() -> Self {
        Self {
            active: false,
            elapsed_hours: 0,
            elapsed_minutes: 0,
            since: None,
            goal_hours: None,
        }
    }

    /// Status for `session` as seen at `now`. Closed sessions project as inactive.
    pub fn of(session: &Session, now: DateTime<Utc>) -> Self {
        if !session.is_active() {
            return Self::inactive();
        }
        let (elapsed_hours, elapsed_minutes) = session.elapsed_at(now);
        Self {
            active: true,
            elapsed_hours,
            elapsed_minutes,
            since: Some(session.started_at),
            goal_hours: Some(session.goal_hours),
        }
    }

    /// Fraction of the goal reached, `None` while inactive.
    pub fn progress(&self) -> Option<f64> {
        let goal = self.goal_hours.filter(|g| *g > 0.0)?;
        if !self.active {
            return None;
        }
        let elapsed = self.elapsed_hours as f64 + self.elapsed_minutes as f64 / 60.0;
        Some(elapsed / goal)
    }
}

/// Whole hours and remaining minutes between two instants, floored. Negative spans clamp to zero.
pub fn split_elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> (u64, u64) {
    let total_minutes = u64::try_from((to - from).num_minutes()).unwrap_or(0);
    (total_minutes / 60, total_minutes % 60)
}

/// `"{h}h {m}m"` label as shown in history.
pub fn duration_label(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let (hours, minutes) = split_elapsed(from, to);
    format!("{hours}h {minutes}m")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 8, h, m, 0).unwrap()
    }

    #[test]
    fn duration_label_floors_minutes() {
        let start = at(0, 0);
        let end = start + Duration::seconds(16 * 3600 + 30 * 60 + 59);
        assert_eq!(duration_label(start, end), "16h 30m");
    }

    #[test]
    fn negative_span_clamps_to_zero() {
        assert_eq!(split_elapsed(at(10, 0), at(9, 0)), (0, 0));
    }

    #[test]
    fn finish_sets_end_and_label() {
        let session = Session::started(7, at(1, 0), 18.0);
        assert!(session.is_active());
        assert_eq!(session.duration_label, "0h 0m");

        let done = session.finish(at(19, 15));
        assert!(!done.is_active());
        assert_eq!(done.ended_at, Some(at(19, 15)));
        assert_eq!(done.duration_label, "18h 15m");
    }

    #[test]
    fn status_of_active_session() {
        let session = Session::started(1, at(2, 0), 16.0);
        let status = Status::of(&session, at(5, 45));
        assert!(status.active);
        assert_eq!(status.elapsed_hours, 3);
        assert_eq!(status.elapsed_minutes, 45);
        assert_eq!(status.since, Some(at(2, 0)));
        assert_eq!(status.goal_hours, Some(16.0));
    }

    #[test]
    fn status_of_closed_session_is_inactive() {
        let session = Session::started(1, at(2, 0), 16.0).finish(at(3, 0));
        assert_eq!(Status::of(&session, at(4, 0)), Status::inactive());
    }

    #[test]
    fn progress_is_relative_to_goal() {
        let session = Session::started(1, at(0, 0), 16.0);
        let status = Status::of(&session, at(8, 0));
        assert_eq!(status.progress(), Some(0.5));
        assert_eq!(Status::inactive().progress(), None);
    }

    #[test]
    fn session_serializes_camel_case() {
        let session = Session::started(3, at(6, 0), 18.0);
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["goalHours"], 18.0);
        assert_eq!(json["durationLabel"], "0h 0m");
        assert!(json["endedAt"].is_null());
        assert!(json.get("startedAt").is_some());
    }

    #[test]
    fn inactive_status_omits_optional_fields() {
        let json = serde_json::to_value(Status::inactive()).unwrap();
        assert_eq!(json["active"], false);
        assert!(json.get("since").is_none());
        assert!(json.get("goalHours").is_none());
    }
}
