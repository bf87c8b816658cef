use crate::error::ApiError;
use crate::session::{Session, Status};
use async_trait::async_trait;

/// A provider of session data: the backend, the synthetic stand-in, or a
/// coordinator choosing between them.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Start a session with an already-validated goal.
    async fn begin(&self, goal_hours: f64) -> Result<Session, ApiError>;

    async fn end(&self) -> Result<Session, ApiError>;

    async fn status(&self) -> Result<Status, ApiError>;

    /// All sessions, in whatever order the source keeps them.
    async fn history(&self) -> Result<Vec<Session>, ApiError>;
}
