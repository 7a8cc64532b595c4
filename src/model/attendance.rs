use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

/// Geodetic point reported by a tutor's device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = 28.6139)]
    pub latitude: f64,
    #[schema(example = 77.2090)]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn as_lat_lon(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

/// Canonical attendance row, unique per (tutor, day).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 42)]
    pub tutor_id: u64,
    #[schema(example = 7)]
    pub center_id: u64,
    #[schema(example = "2025-10-14")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[schema(example = 42)]
    pub marked_by: u64,
    #[schema(nullable = true)]
    pub location: Option<GeoPoint>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Day-keyed copy of an attendance record kept in the tutor's own history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedAttendanceEntry {
    #[schema(example = "2025-10-14")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[schema(nullable = true)]
    pub location: Option<GeoPoint>,
    #[schema(example = 7)]
    pub center: u64,
    #[schema(example = "Jama Masjid Center")]
    pub center_name: String,
    #[schema(example = 42)]
    pub marked_by: u64,
    pub created_at: DateTime<Utc>,
}

/// Values written by a day-keyed upsert.
#[derive(Debug, Clone)]
pub struct DailyAttendance {
    pub center_id: u64,
    pub center_name: String,
    pub status: AttendanceStatus,
    pub marked_by: u64,
    pub location: Option<GeoPoint>,
    pub at: DateTime<Utc>,
}

impl EmbeddedAttendanceEntry {
    pub fn mirror(record: &AttendanceRecord, center_name: &str) -> Self {
        Self {
            date: record.date,
            status: record.status,
            location: record.location,
            center: record.center_id,
            center_name: center_name.to_string(),
            marked_by: record.marked_by,
            created_at: record.created_at,
        }
    }
}
