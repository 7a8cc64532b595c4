//! In-process store used by the handler and service tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    AttendanceStore, ButtonStore, CenterDirectory, RecentQuery, ReportFilter, StoreError,
    TutorDirectory,
};
use crate::{
    model::{
        attendance::{AttendanceRecord, DailyAttendance, EmbeddedAttendanceEntry},
        attendance_button::AttendanceButton,
        tutor::{Center, Tutor},
    },
    utils::calendar::DayRange,
};

#[derive(Default)]
struct State {
    next_id: u64,
    records: BTreeMap<(u64, NaiveDate), AttendanceRecord>,
    history: HashMap<u64, BTreeMap<NaiveDate, EmbeddedAttendanceEntry>>,
    button: Option<AttendanceButton>,
    tutors: BTreeMap<u64, Tutor>,
    centers: HashMap<u64, Center>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tutor(&self, tutor: Tutor) {
        self.state.lock().unwrap().tutors.insert(tutor.id, tutor);
    }

    pub fn add_center(&self, center: Center) {
        self.state.lock().unwrap().centers.insert(center.id, center);
    }

    /// Makes every following write fail, as a lost database connection would.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.state.lock().unwrap().records.values().cloned().collect()
    }

    pub fn history_of(&self, tutor_id: u64) -> Vec<EmbeddedAttendanceEntry> {
        self.state
            .lock()
            .unwrap()
            .history
            .get(&tutor_id)
            .map(|days| days.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Back-dates a record, for archive window tests.
    pub fn set_created_at(&self, tutor_id: u64, day: NaiveDate, at: DateTime<Utc>) {
        if let Some(record) = self.state.lock().unwrap().records.get_mut(&(tutor_id, day)) {
            record.created_at = at;
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn upsert_daily(
        &self,
        tutor_id: u64,
        day: NaiveDate,
        write: DailyAttendance,
    ) -> Result<(AttendanceRecord, EmbeddedAttendanceEntry), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let next_id = state.next_id;

        let record = state
            .records
            .entry((tutor_id, day))
            .and_modify(|existing| {
                existing.center_id = write.center_id;
                existing.status = write.status;
                existing.marked_by = write.marked_by;
                existing.location = write.location;
                existing.is_archived = false;
                existing.updated_at = write.at;
            })
            .or_insert_with(|| AttendanceRecord {
                id: next_id,
                tutor_id,
                center_id: write.center_id,
                date: day,
                status: write.status,
                marked_by: write.marked_by,
                location: write.location,
                is_archived: false,
                created_at: write.at,
                updated_at: write.at,
            })
            .clone();

        let entry = EmbeddedAttendanceEntry::mirror(&record, &write.center_name);
        state
            .history
            .entry(tutor_id)
            .or_default()
            .insert(day, entry.clone());

        Ok((record, entry))
    }

    async fn find_recent(&self, query: RecentQuery) -> Result<Vec<AttendanceRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut matched: Vec<_> = state
            .records
            .values()
            .filter(|r| query.tutor_id.is_none_or(|t| r.tutor_id == t))
            .filter(|r| query.day.is_none_or(|d| r.date == d))
            .filter(|r| !(query.exclude_archived && r.is_archived))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matched.truncate(query.limit as usize);
        Ok(matched)
    }

    async fn archive_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().unwrap();
        let mut changed = 0;
        for record in state.records.values_mut() {
            if record.created_at >= cutoff && !record.is_archived {
                record.is_archived = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn find_for_report(
        &self,
        filter: &ReportFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .values()
            .filter(|r| filter.range.contains(r.date))
            .filter(|r| filter.center_id.is_none_or(|c| r.center_id == c))
            .filter(|r| filter.tutor_id.is_none_or(|t| r.tutor_id == t))
            .cloned()
            .collect())
    }

    async fn tutor_history(
        &self,
        tutor_id: u64,
        range: Option<DayRange>,
    ) -> Result<Vec<EmbeddedAttendanceEntry>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .history
            .get(&tutor_id)
            .map(|days| {
                days.values()
                    .filter(|e| range.is_none_or(|r| r.contains(e.date)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ButtonStore for MemoryStore {
    async fn current(&self) -> Result<AttendanceButton, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .button
            .clone()
            .unwrap_or_default())
    }

    async fn set(
        &self,
        enabled: bool,
        changed_by: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceButton, StoreError> {
        self.check_writable()?;
        let button = AttendanceButton {
            enabled,
            last_changed_by: Some(changed_by),
            last_changed_at: Some(at),
        };
        self.state.lock().unwrap().button = Some(button.clone());
        Ok(button)
    }
}

#[async_trait]
impl TutorDirectory for MemoryStore {
    async fn tutor(&self, id: u64) -> Result<Option<Tutor>, StoreError> {
        Ok(self.state.lock().unwrap().tutors.get(&id).cloned())
    }

    async fn reportable_tutors(
        &self,
        center_id: Option<u64>,
        tutor_id: Option<u64>,
    ) -> Result<Vec<Tutor>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tutors
            .values()
            .filter(|t| t.status.is_reportable())
            .filter(|t| center_id.is_none_or(|c| t.assigned_center == Some(c)))
            .filter(|t| tutor_id.is_none_or(|id| t.id == id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CenterDirectory for MemoryStore {
    async fn center(&self, id: u64) -> Result<Option<Center>, StoreError> {
        Ok(self.state.lock().unwrap().centers.get(&id).cloned())
    }
}
