use reqwest::Method;
use uuid::Uuid;

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Correlation identity of one transport call. Generated fresh per call and
/// reused by every retry of that call so the attempts line up in logs.
#[derive(Debug, Clone)]
pub struct RequestTrace {
    pub id: String,
    pub method: Method,
    pub path: String,
}

impl RequestTrace {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            path: path.to_string(),
        }
    }

    /// GET and HEAD may be replayed safely; everything else mutates state.
    pub fn is_idempotent(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}
