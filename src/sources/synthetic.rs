use super::traits::SessionSource;
use crate::error::ApiError;
use crate::session::{DEFAULT_GOAL_HOURS, Session, Status};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// `(hours, minutes)` of the seeded history, most recent first.
const SEED_DURATIONS: [(i64, i64); 5] = [(16, 30), (18, 0), (17, 15), (18, 30), (16, 30)];

#[derive(Debug)]
struct SyntheticState {
    active: Option<Session>,
    completed: Vec<Session>,
    next_id: u64,
}

/// In-memory stand-in for the backend. Nothing it records leaves the process.
#[derive(Debug)]
pub struct SyntheticSource {
    state: Mutex<SyntheticState>,
    latency: Duration,
}

impl SyntheticSource {
    /// Empty source: no history, ids start at 1.
    pub fn new(latency: Duration) -> Self {
        Self {
            state: Mutex::new(SyntheticState {
                active: None,
                completed: Vec::new(),
                next_id: 1,
            }),
            latency,
        }
    }

    /// Source pre-filled with five completed sessions ending the day before `now`.
    pub fn seeded_at(now: DateTime<Utc>, latency: Duration) -> Self {
        let completed: Vec<Session> = SEED_DURATIONS
            .iter()
            .zip(1_u64..)
            .map(|(&(hours, minutes), id)| {
                let days_back = i64::try_from(id).unwrap_or(1);
                let ended_at = now - ChronoDuration::days(days_back);
                let started_at =
                    ended_at - ChronoDuration::hours(hours) - ChronoDuration::minutes(minutes);
                Session::started(id, started_at, DEFAULT_GOAL_HOURS).finish(ended_at)
            })
            .collect();
        let next_id = completed.len() as u64 + 1;

        Self {
            state: Mutex::new(SyntheticState {
                active: None,
                completed,
                next_id,
            }),
            latency,
        }
    }

    pub fn seeded(latency: Duration) -> Self {
        Self::seeded_at(Utc::now(), latency)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl SessionSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn begin(&self, goal_hours: f64) -> Result<Session, ApiError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if state.active.is_some() {
            return Err(ApiError::AlreadyActive);
        }
        let session = Session::started(state.next_id, Utc::now(), goal_hours);
        state.next_id += 1;
        state.active = Some(session.clone());
        Ok(session)
    }

    async fn end(&self) -> Result<Session, ApiError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let active = state.active.take().ok_or(ApiError::NoActiveSession)?;
        let finished = active.finish(Utc::now());
        state.completed.insert(0, finished.clone());
        Ok(finished)
    }

    async fn status(&self) -> Result<Status, ApiError> {
        self.simulate_latency().await;
        let state = self.state.lock();
        Ok(state
            .active
            .as_ref()
            .map_or_else(Status::inactive, |session| Status::of(session, Utc::now())))
    }

    async fn history(&self) -> Result<Vec<Session>, ApiError> {
        self.simulate_latency().await;
        Ok(self.state.lock().completed.clone())
    }
}
