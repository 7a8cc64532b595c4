//! Background delivery of attendance confirmations.
//!
//! - [`NotificationQueue`] owns the single worker task and the job table
//! - [`NotificationTransport`] is the delivery seam (log only, or an HTTP mail relay)

pub mod queue;
pub mod transport;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::attendance::GeoPoint;

pub use queue::{NotificationQueue, QueueSettings, QueueStatus};
pub use transport::{LogTransport, NotificationTransport, WebhookTransport};

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The relay could not be reached.
    #[error("delivery request failed: {0}")]
    Request(String),

    /// The relay answered with a non-success status.
    #[error("relay rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The attempt did not finish within the configured send timeout.
    #[error("delivery timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// The worker has shut down and no longer accepts jobs.
    #[error("notification queue is closed")]
    QueueClosed,
}

/// Template data for the "attendance confirmed" message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceConfirmation {
    pub tutor_name: String,
    pub date: NaiveDate,
    /// Local wall-clock time of the check-in, `HH:MM:SS`
    pub time: String,
    pub center_name: String,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub to: String,
    pub confirmation: AttendanceConfirmation,
}

impl NotificationPayload {
    pub fn subject(&self) -> String {
        format!(
            "Attendance Confirmed - {}",
            self.confirmation.date.format("%A, %-d %B %Y")
        )
    }

    pub fn text_body(&self) -> String {
        let c = &self.confirmation;
        let location = c
            .location
            .map(|p| format!("{:.6}, {:.6}", p.latitude, p.longitude))
            .unwrap_or_else(|| "Not available".to_string());

        format!(
            "Dear {name},\n\n\
             Your attendance has been successfully marked and recorded in our system.\n\n\
             Attendance Details:\n\
             - Date: {date}\n\
             - Time: {time}\n\
             - Center: {center}\n\
             - Location: {location}\n\n\
             Your attendance will be reflected in your monthly reports.\n\n\
             This is an automated message. Please do not reply to this email.\n",
            name = c.tutor_name,
            date = c.date.format("%A, %-d %B %Y"),
            time = c.time,
            center = c.center_name,
        )
    }
}
