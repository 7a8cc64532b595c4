use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};
use tracing::debug;

use super::{
    AttendanceStore, ButtonStore, CenterDirectory, RecentQuery, ReportFilter, StoreError,
    TutorDirectory,
};
use crate::{
    model::{
        attendance::{
            AttendanceRecord, AttendanceStatus, DailyAttendance, EmbeddedAttendanceEntry, GeoPoint,
        },
        attendance_button::AttendanceButton,
        tutor::{Center, Tutor, TutorStatus},
    },
    utils::calendar::DayRange,
};

const ATTENDANCE_COLUMNS: &str = "id, tutor_id, center_id, date, status, marked_by, \
     latitude, longitude, is_archived, created_at, updated_at";

const BUTTON_ID: u8 = 1;

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn location(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
        _ => None,
    }
}

fn parse_status(raw: &str) -> Result<AttendanceStatus, StoreError> {
    AttendanceStatus::from_str(raw)
        .map_err(|_| StoreError::Corrupt(format!("unknown attendance status {raw:?}")))
}

#[derive(FromRow)]
struct AttendanceRow {
    id: u64,
    tutor_id: u64,
    center_id: u64,
    date: NaiveDate,
    status: String,
    marked_by: u64,
    latitude: Option<f64>,
    longitude: Option<f64>,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(AttendanceRecord {
            id: row.id,
            tutor_id: row.tutor_id,
            center_id: row.center_id,
            date: row.date,
            status: parse_status(&row.status)?,
            marked_by: row.marked_by,
            location: location(row.latitude, row.longitude),
            is_archived: row.is_archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct HistoryRow {
    date: NaiveDate,
    status: String,
    center_id: u64,
    center_name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    marked_by: u64,
    record_created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for EmbeddedAttendanceEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(EmbeddedAttendanceEntry {
            date: row.date,
            status: parse_status(&row.status)?,
            location: location(row.latitude, row.longitude),
            center: row.center_id,
            center_name: row.center_name,
            marked_by: row.marked_by,
            created_at: row.record_created_at,
        })
    }
}

#[derive(FromRow)]
struct TutorRow {
    id: u64,
    name: String,
    phone: String,
    email: Option<String>,
    assigned_center_id: Option<u64>,
    status: String,
}

impl TryFrom<TutorRow> for Tutor {
    type Error = StoreError;

    fn try_from(row: TutorRow) -> Result<Self, Self::Error> {
        let status = TutorStatus::from_str(&row.status)
            .map_err(|_| StoreError::Corrupt(format!("unknown tutor status {:?}", row.status)))?;
        Ok(Tutor {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            assigned_center: row.assigned_center_id,
            status,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct CenterRow {
    pub id: u64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<CenterRow> for Center {
    fn from(row: CenterRow) -> Self {
        Center {
            id: row.id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn upsert_daily(
        &self,
        tutor_id: u64,
        day: NaiveDate,
        write: DailyAttendance,
    ) -> Result<(AttendanceRecord, EmbeddedAttendanceEntry), StoreError> {
        let latitude = write.location.map(|p| p.latitude);
        let longitude = write.location.map(|p| p.longitude);
        let status = write.status.to_string();

        let mut tx = self.pool.begin().await?;

        // the (tutor_id, date) unique key turns a concurrent second insert into an update
        sqlx::query(
            r#"
            INSERT INTO attendance
                (tutor_id, center_id, date, status, marked_by, latitude, longitude,
                 is_archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, FALSE, ?, ?)
            ON DUPLICATE KEY UPDATE
                center_id = VALUES(center_id),
                status = VALUES(status),
                marked_by = VALUES(marked_by),
                latitude = VALUES(latitude),
                longitude = VALUES(longitude),
                is_archived = FALSE,
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(tutor_id)
        .bind(write.center_id)
        .bind(day)
        .bind(&status)
        .bind(write.marked_by)
        .bind(latitude)
        .bind(longitude)
        .bind(write.at)
        .bind(write.at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE tutor_id = ? AND date = ? FOR UPDATE"
        ))
        .bind(tutor_id)
        .bind(day)
        .fetch_one(&mut *tx)
        .await?;
        let record = AttendanceRecord::try_from(row)?;

        sqlx::query(
            r#"
            INSERT INTO tutor_attendance_history
                (tutor_id, date, status, center_id, center_name, latitude, longitude,
                 marked_by, record_created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                status = VALUES(status),
                center_id = VALUES(center_id),
                center_name = VALUES(center_name),
                latitude = VALUES(latitude),
                longitude = VALUES(longitude),
                marked_by = VALUES(marked_by),
                record_created_at = VALUES(record_created_at)
            "#,
        )
        .bind(tutor_id)
        .bind(day)
        .bind(&status)
        .bind(write.center_id)
        .bind(&write.center_name)
        .bind(latitude)
        .bind(longitude)
        .bind(write.marked_by)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(tutor_id, %day, record_id = record.id, "Attendance upserted");

        let entry = EmbeddedAttendanceEntry::mirror(&record, &write.center_name);
        Ok((record, entry))
    }

    async fn find_recent(&self, query: RecentQuery) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE 1 = 1"
        ));

        if let Some(tutor_id) = query.tutor_id {
            qb.push(" AND tutor_id = ").push_bind(tutor_id);
        }
        if let Some(day) = query.day {
            qb.push(" AND date = ").push_bind(day);
        }
        if query.exclude_archived {
            qb.push(" AND is_archived = FALSE");
        }
        qb.push(" ORDER BY updated_at DESC LIMIT ")
            .push_bind(query.limit);

        let rows = qb
            .build_query_as::<AttendanceRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AttendanceRecord::try_from).collect()
    }

    async fn archive_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance
            SET is_archived = TRUE
            WHERE created_at >= ?
            AND is_archived = FALSE
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_for_report(
        &self,
        filter: &ReportFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE date BETWEEN "
        ));
        qb.push_bind(filter.range.start)
            .push(" AND ")
            .push_bind(filter.range.end);

        if let Some(center_id) = filter.center_id {
            qb.push(" AND center_id = ").push_bind(center_id);
        }
        if let Some(tutor_id) = filter.tutor_id {
            qb.push(" AND tutor_id = ").push_bind(tutor_id);
        }
        qb.push(" ORDER BY tutor_id, date");

        let rows = qb
            .build_query_as::<AttendanceRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AttendanceRecord::try_from).collect()
    }

    async fn tutor_history(
        &self,
        tutor_id: u64,
        range: Option<DayRange>,
    ) -> Result<Vec<EmbeddedAttendanceEntry>, StoreError> {
        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT date, status, center_id, center_name, latitude, longitude, marked_by, \
             record_created_at FROM tutor_attendance_history WHERE tutor_id = ",
        );
        qb.push_bind(tutor_id);

        if let Some(range) = range {
            qb.push(" AND date BETWEEN ")
                .push_bind(range.start)
                .push(" AND ")
                .push_bind(range.end);
        }
        qb.push(" ORDER BY date");

        let rows = qb
            .build_query_as::<HistoryRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(EmbeddedAttendanceEntry::try_from)
            .collect()
    }
}

#[async_trait]
impl ButtonStore for MySqlStore {
    async fn current(&self) -> Result<AttendanceButton, StoreError> {
        let row = sqlx::query_as::<_, (bool, Option<u64>, Option<DateTime<Utc>>)>(
            "SELECT enabled, last_changed_by, last_changed_at FROM attendance_button WHERE id = ?",
        )
        .bind(BUTTON_ID)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((enabled, last_changed_by, last_changed_at)) => AttendanceButton {
                enabled,
                last_changed_by,
                last_changed_at,
            },
            None => AttendanceButton::default(),
        })
    }

    async fn set(
        &self,
        enabled: bool,
        changed_by: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceButton, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attendance_button (id, enabled, last_changed_by, last_changed_at)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                enabled = VALUES(enabled),
                last_changed_by = VALUES(last_changed_by),
                last_changed_at = VALUES(last_changed_at)
            "#,
        )
        .bind(BUTTON_ID)
        .bind(enabled)
        .bind(changed_by)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(AttendanceButton {
            enabled,
            last_changed_by: Some(changed_by),
            last_changed_at: Some(at),
        })
    }
}

#[async_trait]
impl TutorDirectory for MySqlStore {
    async fn tutor(&self, id: u64) -> Result<Option<Tutor>, StoreError> {
        sqlx::query_as::<_, TutorRow>(
            r#"
            SELECT id, name, phone, email, assigned_center_id, status
            FROM tutors
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Tutor::try_from)
        .transpose()
    }

    async fn reportable_tutors(
        &self,
        center_id: Option<u64>,
        tutor_id: Option<u64>,
    ) -> Result<Vec<Tutor>, StoreError> {
        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT id, name, phone, email, assigned_center_id, status FROM tutors \
             WHERE status IN ('active', 'pending')",
        );
        if let Some(center_id) = center_id {
            qb.push(" AND assigned_center_id = ").push_bind(center_id);
        }
        if let Some(tutor_id) = tutor_id {
            qb.push(" AND id = ").push_bind(tutor_id);
        }
        qb.push(" ORDER BY name");

        let rows = qb.build_query_as::<TutorRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Tutor::try_from).collect()
    }
}

#[async_trait]
impl CenterDirectory for MySqlStore {
    async fn center(&self, id: u64) -> Result<Option<Center>, StoreError> {
        let row = sqlx::query_as::<_, CenterRow>(
            "SELECT id, name, latitude, longitude FROM centers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Center::from))
    }
}
