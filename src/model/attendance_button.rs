use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Process-wide switch for tutor self check-in. Stored as a single row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceButton {
    pub enabled: bool,
    #[schema(nullable = true)]
    pub last_changed_by: Option<u64>,
    #[schema(nullable = true)]
    pub last_changed_at: Option<DateTime<Utc>>,
}

impl Default for AttendanceButton {
    // never toggled: self check-in is open
    fn default() -> Self {
        Self {
            enabled: true,
            last_changed_by: None,
            last_changed_at: None,
        }
    }
}
