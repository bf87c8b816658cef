//! The four session operations, independent of where the data comes from.

use crate::error::ApiError;
use crate::events::{EventBus, Notice};
use crate::fallback::{FallbackCoordinator, SourceMode};
use crate::session::{DEFAULT_GOAL_HOURS, Session, Status};
use crate::sources::SessionSource;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct SessionService {
    coordinator: Arc<FallbackCoordinator>,
}

impl SessionService {
    pub fn new(coordinator: Arc<FallbackCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Start a session. `None` uses the 16h default; the goal must be a
    /// positive, finite number of hours.
    pub async fn begin(&self, goal_hours: Option<f64>) -> Result<Session, ApiError> {
        let goal = validate_goal(goal_hours)?;
        let session = self.coordinator.begin(goal).await?;
        tracing::info!(session_id = session.id, goal_hours = goal, "Session started");
        Ok(session)
    }

    pub async fn end(&self) -> Result<Session, ApiError> {
        let session = self.coordinator.end().await?;
        tracing::info!(
            session_id = session.id,
            duration = %session.duration_label,
            "Session ended"
        );
        Ok(session)
    }

    pub async fn status(&self) -> Result<Status, ApiError> {
        self.coordinator.status().await
    }

    /// All sessions, newest first by start time.
    pub async fn history(&self) -> Result<Vec<Session>, ApiError> {
        let mut sessions = self.coordinator.history().await?;
        sessions.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(sessions)
    }

    pub fn mode(&self) -> SourceMode {
        self.coordinator.mode()
    }

    /// Subscribe to mode notices. Pass the id to [`Self::unsubscribe`] when done.
    pub fn subscribe(&self) -> (u64, UnboundedReceiver<Notice>) {
        self.events().subscribe()
    }

    pub fn unsubscribe(&self, id: u64) {
        self.events().unsubscribe(id);
    }

    pub fn coordinator(&self) -> &FallbackCoordinator {
        &self.coordinator
    }

    fn events(&self) -> &EventBus {
        self.coordinator.events()
    }
}

fn validate_goal(goal_hours: Option<f64>) -> Result<f64, ApiError> {
    match goal_hours {
        None => Ok(DEFAULT_GOAL_HOURS),
        Some(goal) if goal.is_finite() && goal > 0.0 => Ok(goal),
        Some(goal) => Err(ApiError::InvalidGoal(format!(
            "goal must be a positive number of hours, got {goal}"
        ))),
    }
}
