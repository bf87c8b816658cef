//! Chooses between the backend and synthetic data for every session call.
//!
//! The coordinator starts on the backend (or pinned to synthetic data when
//! forced). A transient backend failure moves it to synthetic data, but only
//! where the environment allows it; production failures always reach the
//! caller. While on synthetic data, every call first asks the health monitor
//! whether the backend is back.

use crate::error::ApiError;
use crate::events::{EventBus, ModeEvent};
use crate::health::HealthMonitor;
use crate::session::{Session, Status};
use crate::sources::SessionSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const MODE_REMOTE: u8 = 0;
const MODE_SYNTHETIC: u8 = 1;

/// Deployment environment. Only development may substitute synthetic data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn permits_fallback(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "unknown environment '{other}' (expected development or production)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Remote,
    Synthetic,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

pub struct FallbackCoordinator {
    remote: Arc<dyn SessionSource>,
    synthetic: Arc<dyn SessionSource>,
    health: Arc<HealthMonitor>,
    events: Arc<EventBus>,
    environment: Environment,
    pinned: bool,
    mode: AtomicU8,
}

impl FallbackCoordinator {
    pub fn new(
        remote: Arc<dyn SessionSource>,
        synthetic: Arc<dyn SessionSource>,
        health: Arc<HealthMonitor>,
        events: Arc<EventBus>,
        environment: Environment,
        force_synthetic: bool,
    ) -> Self {
        let initial = if force_synthetic {
            MODE_SYNTHETIC
        } else {
            MODE_REMOTE
        };
        Self {
            remote,
            synthetic,
            health,
            events,
            environment,
            pinned: force_synthetic,
            mode: AtomicU8::new(initial),
        }
    }

    pub fn mode(&self) -> SourceMode {
        if self.mode.load(Ordering::Acquire) == MODE_SYNTHETIC {
            SourceMode::Synthetic
        } else {
            SourceMode::Remote
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Mode for the next call, switching back to the backend first when it
    /// has recovered.
    async fn resolve(&self) -> SourceMode {
        if self.pinned {
            return SourceMode::Synthetic;
        }
        if self.mode() == SourceMode::Synthetic
            && self.health.is_healthy().await
            && self
                .mode
                .compare_exchange(
                    MODE_SYNTHETIC,
                    MODE_REMOTE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        {
            tracing::info!("Backend reachable again, leaving synthetic data");
            self.events.emit(ModeEvent::Recovered);
        }
        self.mode()
    }

    fn enter_synthetic(&self, cause: &ApiError) {
        // Stale healthy verdicts must not flip the very next call back.
        self.health.mark_unhealthy(&cause.to_string());
        if self
            .mode
            .compare_exchange(
                MODE_REMOTE,
                MODE_SYNTHETIC,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            tracing::warn!(error = %cause, "Backend unreachable, switching to synthetic data");
            self.events.emit(ModeEvent::EnteredSynthetic);
        }
    }

    async fn dispatch<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, ApiError>
    where
        F: Fn(Arc<dyn SessionSource>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ApiError>> + Send,
        T: Send,
    {
        if self.resolve().await == SourceMode::Synthetic {
            return call(Arc::clone(&self.synthetic)).await;
        }

        match call(Arc::clone(&self.remote)).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_transient() && self.environment.permits_fallback() => {
                tracing::warn!(
                    operation,
                    source = self.remote.name(),
                    error = %err,
                    "Remote call failed, retrying once on synthetic data"
                );
                self.enter_synthetic(&err);
                call(Arc::clone(&self.synthetic)).await
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::debug!(
                        operation,
                        environment = ?self.environment,
                        "Fallback not permitted, returning remote failure"
                    );
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl SessionSource for FallbackCoordinator {
    fn name(&self) -> &str {
        "coordinator"
    }

    async fn begin(&self, goal_hours: f64) -> Result<Session, ApiError> {
        self.dispatch("begin", |source: Arc<dyn SessionSource>| async move {
            source.begin(goal_hours).await
        })
        .await
    }

    async fn end(&self) -> Result<Session, ApiError> {
        self.dispatch("end", |source: Arc<dyn SessionSource>| async move {
            source.end().await
        })
        .await
    }

    async fn status(&self) -> Result<Status, ApiError> {
        self.dispatch("status", |source: Arc<dyn SessionSource>| async move {
            source.status().await
        })
        .await
    }

    async fn history(&self) -> Result<Vec<Session>, ApiError> {
        self.dispatch("history", |source: Arc<dyn SessionSource>| async move {
            source.history().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Notice;
    use crate::health::Probe;
    use crate::sources::SyntheticSource;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Synthetic-backed source that can be told to fail, counting every call.
    struct ScriptedSource {
        inner: SyntheticSource,
        failure: Mutex<Option<ApiError>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: SyntheticSource::new(Duration::ZERO),
                failure: Mutex::new(None),
                calls: AtomicU32::new(0),
            })
        }

        fn fail_with(&self, err: Option<ApiError>) {
            *self.failure.lock() = err;
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn enter(&self) -> Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failure = self.failure.lock().clone();
            failure.map_or(Ok(()), Err)
        }
    }

    #[async_trait]
    impl SessionSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn begin(&self, goal_hours: f64) -> Result<Session, ApiError> {
            self.enter()?;
            self.inner.begin(goal_hours).await
        }

        async fn end(&self) -> Result<Session, ApiError> {
            self.enter()?;
            self.inner.end().await
        }

        async fn status(&self) -> Result<Status, ApiError> {
            self.enter()?;
            self.inner.status().await
        }

        async fn history(&self) -> Result<Vec<Session>, ApiError> {
            self.enter()?;
            self.inner.history().await
        }
    }

    struct SwitchProbe {
        up: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Probe for SwitchProbe {
        async fn check(&self) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err("connection refused".into())
            }
        }
    }

    struct Harness {
        remote: Arc<ScriptedSource>,
        synthetic: Arc<ScriptedSource>,
        probe: Arc<SwitchProbe>,
        coordinator: FallbackCoordinator,
        notices: UnboundedReceiver<Notice>,
    }

    impl Harness {
        fn new(environment: Environment, force_synthetic: bool) -> Self {
            let remote = ScriptedSource::new();
            let synthetic = ScriptedSource::new();
            let probe = Arc::new(SwitchProbe {
                up: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            });
            let health = Arc::new(HealthMonitor::new(
                probe.clone(),
                Duration::from_secs(30),
            ));
            let events = Arc::new(EventBus::new());
            let (_, notices) = events.subscribe();
            let coordinator = FallbackCoordinator::new(
                remote.clone(),
                synthetic.clone(),
                health,
                events,
                environment,
                force_synthetic,
            );
            Self {
                remote,
                synthetic,
                probe,
                coordinator,
                notices,
            }
        }

        fn drain(&mut self) -> Vec<ModeEvent> {
            let mut seen = Vec::new();
            while let Ok(notice) = self.notices.try_recv() {
                seen.push(notice.event);
            }
            seen
        }
    }

    fn timeout() -> ApiError {
        ApiError::Timeout { timeout_ms: 8000 }
    }

    #[tokio::test]
    async fn production_propagates_remote_failure() {
        let mut h = Harness::new(Environment::Production, false);
        h.remote.fail_with(Some(timeout()));

        let err = h.coordinator.status().await.unwrap_err();

        assert_eq!(err, timeout());
        assert_eq!(h.synthetic.calls(), 0);
        assert_eq!(h.coordinator.mode(), SourceMode::Remote);
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn development_falls_back_with_one_notice() {
        let mut h = Harness::new(Environment::Development, false);
        h.remote.fail_with(Some(ApiError::Network("connection refused".into())));

        let status = h.coordinator.status().await.unwrap();
        assert!(!status.active);
        assert_eq!(h.coordinator.mode(), SourceMode::Synthetic);

        h.coordinator.begin(16.0).await.unwrap();
        h.coordinator.status().await.unwrap();

        assert_eq!(h.drain(), vec![ModeEvent::EnteredSynthetic]);
        assert_eq!(h.remote.calls(), 1);
        assert_eq!(h.synthetic.calls(), 3);
        // The failure was recorded, so no probe ran while the verdict is fresh.
        assert_eq!(h.probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn synthetic_failure_after_fallback_is_returned() {
        let mut h = Harness::new(Environment::Development, false);
        h.remote.fail_with(Some(timeout()));
        h.synthetic.fail_with(Some(ApiError::NoActiveSession));

        let err = h.coordinator.end().await.unwrap_err();

        assert_eq!(err, ApiError::NoActiveSession);
        assert_eq!(h.remote.calls(), 1);
        assert_eq!(h.synthetic.calls(), 1);
        assert_eq!(h.drain(), vec![ModeEvent::EnteredSynthetic]);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_once_backend_is_healthy() {
        let mut h = Harness::new(Environment::Development, false);
        h.remote.fail_with(Some(timeout()));
        h.coordinator.history().await.unwrap();
        assert_eq!(h.coordinator.mode(), SourceMode::Synthetic);

        h.remote.fail_with(None);
        h.probe.up.store(true, Ordering::SeqCst);
        // Still inside the TTL of the recorded failure.
        h.coordinator.history().await.unwrap();
        assert_eq!(h.coordinator.mode(), SourceMode::Synthetic);

        tokio::time::advance(Duration::from_secs(31)).await;
        h.coordinator.history().await.unwrap();
        h.coordinator.history().await.unwrap();

        assert_eq!(h.coordinator.mode(), SourceMode::Remote);
        assert_eq!(
            h.drain(),
            vec![ModeEvent::EnteredSynthetic, ModeEvent::Recovered]
        );
        assert_eq!(h.remote.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_synthetic_never_recovers() {
        let mut h = Harness::new(Environment::Production, true);
        h.probe.up.store(true, Ordering::SeqCst);

        for _ in 0..3 {
            h.coordinator.status().await.unwrap();
            tokio::time::advance(Duration::from_secs(60)).await;
        }

        assert!(h.coordinator.is_pinned());
        assert_eq!(h.coordinator.mode(), SourceMode::Synthetic);
        assert_eq!(h.remote.calls(), 0);
        assert_eq!(h.probe.calls.load(Ordering::SeqCst), 0);
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn non_transient_failures_never_fall_back() {
        let mut h = Harness::new(Environment::Development, false);

        for err in [
            ApiError::from_status(404, "Not Found".into()),
            ApiError::from_status(401, "Unauthorized".into()),
            ApiError::AlreadyActive,
            ApiError::Decode("expected value".into()),
        ] {
            h.remote.fail_with(Some(err.clone()));
            assert_eq!(h.coordinator.begin(16.0).await.unwrap_err(), err);
        }

        assert_eq!(h.synthetic.calls(), 0);
        assert_eq!(h.coordinator.mode(), SourceMode::Remote);
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn concurrent_failures_emit_one_notice() {
        let mut h = Harness::new(Environment::Development, false);
        h.remote.fail_with(Some(ApiError::Server {
            status: 503,
            message: "Service Unavailable".into(),
        }));

        let (a, b, c) = tokio::join!(
            h.coordinator.status(),
            h.coordinator.history(),
            h.coordinator.status()
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(h.drain(), vec![ModeEvent::EnteredSynthetic]);
    }

    #[test]
    fn environment_parsing() {
        assert_eq!(
            "development".parse::<Environment>(),
            Ok(Environment::Development)
        );
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
        assert!(!Environment::default().permits_fallback());
    }
}
