//! Backend reachability with a cached verdict.
//!
//! A verdict is reused until its TTL expires. Callers that find the cache
//! expired at the same time share one probe: the probe guard is held across
//! the freshness check and the probe itself.

use crate::transport::TransportClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One reachability check. Never retried.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

/// `GET` on the backend liveness endpoint.
pub struct HttpProbe {
    transport: Arc<TransportClient>,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(transport: Arc<TransportClient>, path: &str, timeout: Duration) -> Self {
        Self {
            transport,
            path: path.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> Result<(), String> {
        let body = self
            .transport
            .probe(&self.path, self.timeout)
            .await
            .map_err(|e| e.to_string())?;

        // Spring-style bodies report `{"status":"UP"}`; anything else is down.
        match body
            .as_ref()
            .and_then(|b| b.get("status"))
            .and_then(|s| s.as_str())
        {
            Some(status) if !status.eq_ignore_ascii_case("UP") => {
                Err(format!("backend reports status {status}"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct HealthState {
    healthy: bool,
    checked_at: Option<Instant>,
    checked_at_wall: Option<DateTime<Utc>>,
    last_error: Option<String>,
    probe_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// `None` until the first probe or observed failure.
    pub healthy: Option<bool>,
    pub last_checked_at: Option<String>,
    pub last_error: Option<String>,
    pub probe_count: u64,
    pub ttl_seconds: u64,
}

pub struct HealthMonitor {
    probe: Arc<dyn Probe>,
    ttl: Duration,
    state: RwLock<HealthState>,
    probe_guard: tokio::sync::Mutex<()>,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn Probe>, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            state: RwLock::new(HealthState::default()),
            probe_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Cached verdict while fresh; otherwise probes. Never fails.
    pub async fn is_healthy(&self) -> bool {
        if let Some(healthy) = self.fresh_verdict() {
            return healthy;
        }

        let _guard = self.probe_guard.lock().await;
        // Another caller may have finished a probe while we waited.
        if let Some(healthy) = self.fresh_verdict() {
            return healthy;
        }

        let outcome = self.probe.check().await;
        let healthy = outcome.is_ok();
        {
            let mut state = self.state.write();
            state.probe_count += 1;
            match outcome {
                Ok(()) => Self::record(&mut state, true, None),
                Err(reason) => Self::record(&mut state, false, Some(reason)),
            }
        }

        if healthy {
            tracing::debug!("Health probe succeeded");
        } else {
            tracing::debug!(
                error = self.state.read().last_error.as_deref().unwrap_or_default(),
                "Health probe failed"
            );
        }
        healthy
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().checked_at_wall
    }

    /// Record an observed transient failure. The next `is_healthy` within the
    /// TTL answers `false` without probing.
    pub fn mark_unhealthy(&self, reason: &str) {
        Self::record(&mut self.state.write(), false, Some(reason.to_string()));
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.read();
        HealthSnapshot {
            healthy: state.checked_at.map(|_| state.healthy),
            last_checked_at: state.checked_at_wall.map(|at| at.to_rfc3339()),
            last_error: state.last_error.clone(),
            probe_count: state.probe_count,
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    fn fresh_verdict(&self) -> Option<bool> {
        let state = self.state.read();
        match state.checked_at {
            Some(at) if at.elapsed() < self.ttl => Some(state.healthy),
            _ => None,
        }
    }

    fn record(state: &mut HealthState, healthy: bool, error: Option<String>) {
        state.healthy = healthy;
        state.checked_at = Some(Instant::now());
        state.checked_at_wall = Some(Utc::now());
        if healthy {
            state.last_error = None;
        } else {
            state.last_error = error;
        }
    }
}
