//! Producers of safety events
//!
//! The panic button and the anonymous report form both go through
//! [`SafetyReporter`]. Whether an event went out immediately or was queued,
//! the caller gets the same confirmation text: the person asking for help is
//! always told it is on the way.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{GeoPoint, ReportEvent, SosEvent};

use super::service::EventSyncService;

/// Shown while a panic alert is being submitted
pub const SOS_PENDING_STATUS: &str = "Sending silent alert...";
/// Shown once a panic alert is delivered or safely queued
pub const SOS_SENT_STATUS: &str = "Alert Sent. Help is on the way.";
/// Shown while a report is being submitted
pub const REPORT_PENDING_STATUS: &str = "Submitting report securely...";
/// Shown once a report is delivered or safely queued
pub const REPORT_SUBMITTED_STATUS: &str = "Your anonymous report has been submitted.";

/// Builds events for one reporter and submits them
#[derive(Clone)]
pub struct SafetyReporter {
    service: Arc<EventSyncService>,
    user_id: String,
}

impl SafetyReporter {
    pub fn new(service: Arc<EventSyncService>, user_id: impl Into<String>) -> Self {
        Self {
            service,
            user_id: user_id.into(),
        }
    }

    pub fn service(&self) -> &Arc<EventSyncService> {
        &self.service
    }

    /// Raise a silent panic alert
    ///
    /// `location` is whatever the location provider had; `None` when there
    /// was no fix.
    pub async fn panic_alert(&self, location: Option<GeoPoint>) -> Result<&'static str> {
        let event = SosEvent::new(self.user_id.clone(), location)?;
        let outcome = self.service.submit(event.into()).await?;
        tracing::debug!(?outcome, has_location = location.is_some(), "Panic alert submitted");
        Ok(SOS_SENT_STATUS)
    }

    /// Submit an anonymous report
    ///
    /// Blank text is rejected with [`crate::Error::InvalidPayload`] and
    /// nothing is queued.
    pub async fn submit_report(&self, text: &str) -> Result<&'static str> {
        let event = ReportEvent::new(text)?;
        let report_id = event.report_id.clone();
        let outcome = self.service.submit(event.into()).await?;
        tracing::debug!(?outcome, %report_id, "Report submitted");
        Ok(REPORT_SUBMITTED_STATUS)
    }
}
