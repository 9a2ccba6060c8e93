//! Core domain types for fieldsafe
//!
//! Two kinds of safety event flow through the system, each with its own
//! durable queue and delivery endpoint:
//!
//! | Kind | Payload | Queue key | Endpoint |
//! |------|---------|-----------|----------|
//! | [`EventKind::Sos`] | [`SosEvent`] | `gbv_sos_queue` | `/api/gbv/sos` |
//! | [`EventKind::Report`] | [`ReportEvent`] | `gbv_report_queue` | `/api/gbv/report` |
//!
//! Payloads are serialized with camelCase field names, matching what the
//! delivery endpoint accepts and what is persisted in the queue.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// ============================================
// EventKind
// ============================================

/// The kind of a safety event. Each kind owns one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Silent panic alert
    Sos,
    /// Anonymous incident report
    Report,
}

impl EventKind {
    /// All kinds, in sync order
    pub const ALL: [EventKind; 2] = [EventKind::Sos, EventKind::Report];

    /// Short lowercase name used in config, CLI and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sos => "sos",
            EventKind::Report => "report",
        }
    }

    /// Parse from the short lowercase name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sos" => Some(EventKind::Sos),
            "report" => Some(EventKind::Report),
            _ => None,
        }
    }

    /// Fixed durable-storage key for this kind's queue
    pub fn queue_key(&self) -> &'static str {
        match self {
            EventKind::Sos => "gbv_sos_queue",
            EventKind::Report => "gbv_report_queue",
        }
    }

    /// Default endpoint path, relative to the server URL
    pub fn default_path(&self) -> &'static str {
        match self {
            EventKind::Sos => "/api/gbv/sos",
            EventKind::Report => "/api/gbv/report",
        }
    }

    /// Human-readable name for CLI output
    pub fn display_name(&self) -> &'static str {
        match self {
            EventKind::Sos => "SOS alerts",
            EventKind::Report => "Reports",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Location
// ============================================

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a validated coordinate
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    /// Check that both components are finite and within range
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::InvalidPayload(format!(
                "latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::InvalidPayload(format!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

// ============================================
// Events
// ============================================

/// A silent panic alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosEvent {
    /// Reporting user. Currently a configured placeholder, not a session identity.
    pub user_id: String,
    /// Trigger time, millisecond precision
    pub timestamp: DateTime<Utc>,
    /// Location at trigger time, if the device had a fix
    pub location: Option<GeoPoint>,
}

impl SosEvent {
    /// Build an alert stamped with the current time
    pub fn new(user_id: impl Into<String>, location: Option<GeoPoint>) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(Error::InvalidPayload("user id must not be empty".to_string()));
        }
        if let Some(point) = &location {
            point.validate()?;
        }

        Ok(Self {
            user_id,
            timestamp: now_millis(),
            location,
        })
    }
}

/// An anonymous incident report.
///
/// The body is sent as written; nothing is encrypted client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEvent {
    /// Time-based identifier, unique within a process
    pub report_id: String,
    /// Free-text report body
    pub report: String,
    /// Submission time, millisecond precision
    pub timestamp: DateTime<Utc>,
}

impl ReportEvent {
    /// Build a report stamped with the current time
    ///
    /// Returns [`Error::InvalidPayload`] if the text is blank.
    pub fn new(report: impl Into<String>) -> Result<Self> {
        let report = report.into();
        if report.trim().is_empty() {
            return Err(Error::InvalidPayload("report text must not be empty".to_string()));
        }

        let timestamp = now_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Ok(Self {
            report_id: format!("report-{}-{}", timestamp.timestamp_millis(), &suffix[..8]),
            report,
            timestamp,
        })
    }
}

/// Either kind of safety event, as accepted by the sync service.
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyEvent {
    Sos(SosEvent),
    Report(ReportEvent),
}

impl SafetyEvent {
    /// Which queue and endpoint this event belongs to
    pub fn kind(&self) -> EventKind {
        match self {
            SafetyEvent::Sos(_) => EventKind::Sos,
            SafetyEvent::Report(_) => EventKind::Report,
        }
    }

    /// Serialize to the JSON body sent to the endpoint and stored in the queue
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            SafetyEvent::Sos(event) => serde_json::to_value(event)?,
            SafetyEvent::Report(event) => serde_json::to_value(event)?,
        };
        Ok(value)
    }
}

impl From<SosEvent> for SafetyEvent {
    fn from(event: SosEvent) -> Self {
        SafetyEvent::Sos(event)
    }
}

impl From<ReportEvent> for SafetyEvent {
    fn from(event: ReportEvent) -> Self {
        SafetyEvent::Report(event)
    }
}

/// Content-based key for receiver-side deduplication (32-char hex)
///
/// SHA-256 over the kind and the canonical JSON of the payload. A replayed
/// event produces the same key as its first delivery attempt.
pub fn idempotency_key(kind: EventKind, payload: &serde_json::Value) -> String {
    let content = serde_json::to_string(payload).unwrap_or_default();
    let hash_input = format!("{}:{}", kind.as_str(), content);

    let mut hasher = Sha256::new();
    hasher.update(hash_input.as_bytes());
    let result = hasher.finalize();

    hex::encode(&result[..16])
}

fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
