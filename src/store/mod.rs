use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::{
    model::{
        attendance::{AttendanceRecord, DailyAttendance, EmbeddedAttendanceEntry},
        attendance_button::AttendanceButton,
        tutor::{Center, Tutor},
    },
    utils::calendar::DayRange,
};

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Selection for the "recent activity" listings.
#[derive(Debug, Clone)]
pub struct RecentQuery {
    pub tutor_id: Option<u64>,
    pub day: Option<NaiveDate>,
    pub limit: u32,
    pub exclude_archived: bool,
}

impl RecentQuery {
    pub fn latest(limit: u32) -> Self {
        Self {
            tutor_id: None,
            day: None,
            limit,
            exclude_archived: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub range: DayRange,
    /// Center the record was taken at
    pub center_id: Option<u64>,
    pub tutor_id: Option<u64>,
}

/// Canonical attendance records plus the per-tutor day-keyed history.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Insert-or-replace keyed by (tutor, day). The canonical record and the
    /// history entry are written as one unit.
    async fn upsert_daily(
        &self,
        tutor_id: u64,
        day: NaiveDate,
        write: DailyAttendance,
    ) -> Result<(AttendanceRecord, EmbeddedAttendanceEntry), StoreError>;

    /// Most recently written first.
    async fn find_recent(&self, query: RecentQuery) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Soft-deletes records created at or after `cutoff`; returns how many changed.
    async fn archive_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Raw records for aggregation, archived ones included.
    async fn find_for_report(
        &self,
        filter: &ReportFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// History entries in day order.
    async fn tutor_history(
        &self,
        tutor_id: u64,
        range: Option<DayRange>,
    ) -> Result<Vec<EmbeddedAttendanceEntry>, StoreError>;
}

#[async_trait]
pub trait ButtonStore: Send + Sync {
    /// Current switch state; the default when it was never toggled.
    async fn current(&self) -> Result<AttendanceButton, StoreError>;

    async fn set(
        &self,
        enabled: bool,
        changed_by: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceButton, StoreError>;
}

#[async_trait]
pub trait TutorDirectory: Send + Sync {
    async fn tutor(&self, id: u64) -> Result<Option<Tutor>, StoreError>;

    /// Active and pending tutors, optionally narrowed by assigned center or id.
    async fn reportable_tutors(
        &self,
        center_id: Option<u64>,
        tutor_id: Option<u64>,
    ) -> Result<Vec<Tutor>, StoreError>;
}

#[async_trait]
pub trait CenterDirectory: Send + Sync {
    async fn center(&self, id: u64) -> Result<Option<Center>, StoreError>;
}
