use super::traits::SessionSource;
use crate::error::ApiError;
use crate::session::{DEFAULT_GOAL_HOURS, Session, Status, duration_label, split_elapsed};
use crate::store::{AUTH_TOKEN_KEY, KeyValueStore, USERNAME_KEY};
use crate::transport::{RequestOptions, TransportClient};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

/// Message fragments the backend uses for a start while a session runs.
const ALREADY_ACTIVE_MARKERS: &[&str] = &["bereits ein fasten", "already active"];
/// Message fragments the backend uses for a stop without a session.
const NO_ACTIVE_MARKERS: &[&str] = &["kein aktives fasten", "no active"];

/// Backend session access over the transport client.
///
/// Credentials are read from the store on every call, so logging in or out
/// takes effect without rebuilding the source.
pub struct RemoteSource {
    transport: Arc<TransportClient>,
    store: Arc<dyn KeyValueStore>,
}

impl RemoteSource {
    pub fn new(transport: Arc<TransportClient>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { transport, store }
    }

    /// `/api/fast/{op}`, or `/api/fast/user/{name}/{op}` when an account is stored.
    /// The account name is percent-encoded as a single path segment.
    fn path(&self, op: &str) -> Result<String, ApiError> {
        let Some(name) = self
            .store
            .get(USERNAME_KEY)
            .filter(|name| !name.trim().is_empty())
        else {
            return Ok(format!("/api/fast/{op}"));
        };

        let mut url = Url::parse("http://backend/api/fast/user")
            .map_err(|e| ApiError::Config(format!("account path: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Config("account path cannot carry segments".into()))?
            .push(name.trim())
            .push(op);
        Ok(url.path().to_string())
    }

    fn options(&self) -> RequestOptions {
        match self.store.get(AUTH_TOKEN_KEY).filter(|t| !t.is_empty()) {
            Some(token) => RequestOptions::default().bearer(&token),
            None => RequestOptions::default(),
        }
    }
}

#[async_trait]
impl SessionSource for RemoteSource {
    fn name(&self) -> &str {
        "remote"
    }

    async fn begin(&self, goal_hours: f64) -> Result<Session, ApiError> {
        let body = serde_json::json!({ "goalHours": goal_hours });
        let wire: WireSession = self
            .transport
            .post(&self.path("start")?, Some(body), &self.options())
            .await
            .map_err(|e| match e.status() {
                Some(409) => ApiError::AlreadyActive,
                Some(400) if mentions(&e, ALREADY_ACTIVE_MARKERS) => ApiError::AlreadyActive,
                _ => e,
            })?;
        Ok(wire.into_session())
    }

    async fn end(&self) -> Result<Session, ApiError> {
        let wire: WireSession = self
            .transport
            .post(&self.path("stop")?, None, &self.options())
            .await
            .map_err(|e| match e.status() {
                Some(404 | 409) => ApiError::NoActiveSession,
                Some(400) if mentions(&e, NO_ACTIVE_MARKERS) => ApiError::NoActiveSession,
                _ => e,
            })?;
        Ok(wire.into_session())
    }

    async fn status(&self) -> Result<Status, ApiError> {
        let wire: WireStatus = self
            .transport
            .get(&self.path("status")?, &self.options())
            .await?;
        Ok(wire.into_status(Utc::now()))
    }

    async fn history(&self) -> Result<Vec<Session>, ApiError> {
        let wire: Vec<WireSession> = self
            .transport
            .get(&self.path("history")?, &self.options())
            .await?;
        Ok(wire.into_iter().map(WireSession::into_session).collect())
    }
}

/// Older backends answer business-rule violations with a plain 400.
fn mentions(error: &ApiError, markers: &[&str]) -> bool {
    match error {
        ApiError::Rejected { message, .. } => {
            let message = message.to_lowercase();
            markers.iter().any(|marker| message.contains(marker))
        }
        _ => false,
    }
}

/// Session as the backend sends it. Field names vary between backend versions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSession {
    id: u64,
    #[serde(alias = "startedAt", deserialize_with = "timestamp")]
    start_at: DateTime<Utc>,
    #[serde(default, alias = "endedAt", deserialize_with = "optional_timestamp")]
    end_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "durationLabel")]
    duration: Option<String>,
    #[serde(default)]
    goal_hours: Option<f64>,
    #[serde(default)]
    duration_hours: Option<f64>,
}

impl WireSession {
    fn into_session(self) -> Session {
        let duration_label = match (self.duration, self.end_at, self.duration_hours) {
            (Some(label), _, _) if !label.trim().is_empty() => label,
            (_, Some(end), _) => duration_label(self.start_at, end),
            (_, None, Some(hours)) if hours.is_finite() && hours > 0.0 => {
                let total_minutes = (hours * 60.0).floor() as u64;
                format!("{}h {}m", total_minutes / 60, total_minutes % 60)
            }
            _ => duration_label(self.start_at, self.start_at),
        };
        Session {
            id: self.id,
            started_at: self.start_at,
            ended_at: self.end_at,
            goal_hours: self.goal_hours.unwrap_or(DEFAULT_GOAL_HOURS),
            duration_label,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireStatus {
    #[serde(rename_all = "camelCase")]
    Backend {
        has_active_fast: bool,
        #[serde(default)]
        current_fast: Option<WireSession>,
    },
    Flat(FlatStatus),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatStatus {
    active: bool,
    #[serde(default)]
    hours: Option<u64>,
    #[serde(default)]
    minutes: Option<u64>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    goal_hours: Option<f64>,
}

impl WireStatus {
    fn into_status(self, now: DateTime<Utc>) -> Status {
        match self {
            Self::Backend {
                has_active_fast: true,
                current_fast: Some(current),
            } => {
                let session = current.into_session();
                Status::of(
                    &Session {
                        ended_at: None,
                        ..session
                    },
                    now,
                )
            }
            Self::Backend { .. } => Status::inactive(),
            Self::Flat(flat) if !flat.active => Status::inactive(),
            Self::Flat(flat) => {
                let (hours, minutes) = match (flat.hours, flat.minutes, flat.since) {
                    (Some(h), m, _) => (h, m.unwrap_or(0)),
                    (None, _, Some(since)) => split_elapsed(since, now),
                    _ => (0, 0),
                };
                Status {
                    active: true,
                    elapsed_hours: hours,
                    elapsed_minutes: minutes,
                    since: flat.since,
                    goal_hours: flat.goal_hours,
                }
            }
        }
    }
}

/// RFC 3339, or a zone-less local timestamp taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
    }
}
