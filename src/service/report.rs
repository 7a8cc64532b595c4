use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    model::{
        attendance::{AttendanceRecord, AttendanceStatus},
        tutor::Tutor,
    },
    state::AppState,
    store::ReportFilter,
    utils::calendar::{DayRange, day_key, local_time},
};

/// Longest window accepted by the free-range coordinate query.
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorRef {
    pub id: u64,
    pub name: String,
    pub phone: String,
}

/// Assigned center of a tutor; `id` is absent and `name` is `N/A` when none.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CenterRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorMonthlyAttendance {
    pub tutor: TutorRef,
    pub center: CenterRef,
    /// One key per calendar day, `true` when present
    #[schema(value_type = Object, example = json!({"2025-10-01": true, "2025-10-02": false}))]
    pub attendance: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatePoint {
    #[schema(example = "2025-10-14")]
    pub date: String,
    #[schema(example = "09:30")]
    pub time: String,
    pub lat: f64,
    pub lng: f64,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorCoordinates {
    pub tutor: TutorRef,
    pub center: CenterRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub points: Vec<CoordinatePoint>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total_expected_sessions: usize,
    pub attended_sessions: usize,
    pub absent_sessions: usize,
    #[schema(example = 87.5)]
    pub attendance_percentage: f64,
}

impl AttendanceStats {
    fn from_counts(attended: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            (attended as f64 / total as f64 * 10_000.0).round() / 100.0
        };
        Self {
            total_expected_sessions: total,
            attended_sessions: attended,
            absent_sessions: total - attended,
            attendance_percentage: percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorAttendanceReport {
    pub tutor_id: u64,
    pub name: String,
    pub filter: ReportWindow,
    pub attendance_stats: AttendanceStats,
}

/// Validated month selector.
pub fn month_range(month: u32, year: i32) -> Result<DayRange, AppError> {
    DayRange::month(year, month).ok_or_else(|| AppError::validation("Invalid month or year format."))
}

/// Read-only views over stored attendance. Archived records still count.
pub struct ReportAggregator<'a> {
    state: &'a AppState,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Every reportable tutor with a present/absent flag for each day of the month.
    pub async fn monthly_matrix(
        &self,
        month: u32,
        year: i32,
        center_id: Option<u64>,
    ) -> Result<Vec<TutorMonthlyAttendance>, AppError> {
        let range = month_range(month, year)?;
        let tutors = self.state.tutors.reportable_tutors(center_id, None).await?;

        let records = self
            .state
            .attendance
            .find_for_report(&ReportFilter {
                range,
                center_id: None,
                tutor_id: None,
            })
            .await?;

        let mut present: HashMap<u64, HashMap<NaiveDate, bool>> = HashMap::new();
        for r in &records {
            present
                .entry(r.tutor_id)
                .or_default()
                .insert(r.date, r.status == AttendanceStatus::Present);
        }

        let mut rows = Vec::with_capacity(tutors.len());
        for tutor in tutors {
            let days = present.get(&tutor.id);
            let attendance = range
                .days()
                .map(|day| {
                    let flag = days.and_then(|d| d.get(&day)).copied().unwrap_or(false);
                    (day_key(day), flag)
                })
                .collect();

            rows.push(TutorMonthlyAttendance {
                center: self.center_ref(&tutor).await?,
                tutor: tutor_ref(&tutor),
                attendance,
            });
        }

        debug!(month, year, tutors = rows.len(), "Built monthly attendance matrix");
        Ok(rows)
    }

    pub async fn monthly_coordinates(
        &self,
        month: u32,
        year: i32,
        tutor_id: Option<u64>,
        center_id: Option<u64>,
    ) -> Result<Vec<TutorCoordinates>, AppError> {
        let range = month_range(month, year)?;
        let mut out = self.coordinates(range, tutor_id, center_id).await?;
        for row in &mut out {
            row.month = Some(month);
            row.year = Some(year);
        }
        Ok(out)
    }

    /// Same as [`Self::monthly_coordinates`] over an arbitrary inclusive range.
    pub async fn coordinates_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tutor_id: Option<u64>,
        center_id: Option<u64>,
    ) -> Result<Vec<TutorCoordinates>, AppError> {
        let range = DayRange::new(start, end)
            .ok_or_else(|| AppError::validation("startDate must not be after endDate."))?;
        if range.len_days() > MAX_RANGE_DAYS {
            return Err(AppError::validation(format!(
                "Date range cannot exceed {MAX_RANGE_DAYS} days."
            )));
        }
        self.coordinates(range, tutor_id, center_id).await
    }

    /// Attended over total history entries, optionally limited to one month.
    pub async fn attendance_report(
        &self,
        tutor_id: u64,
        month: Option<u32>,
        year: Option<i32>,
    ) -> Result<TutorAttendanceReport, AppError> {
        let tutor = self
            .state
            .tutors
            .tutor(tutor_id)
            .await?
            .ok_or_else(|| AppError::not_found("Tutor not found"))?;

        // a lone month or year is ignored
        let window = match (month, year) {
            (Some(m), Some(y)) => Some(month_range(m, y)?),
            _ => None,
        };

        let entries = self.state.attendance.tutor_history(tutor.id, window).await?;
        let attended = entries
            .iter()
            .filter(|e| e.status == AttendanceStatus::Present)
            .count();

        Ok(TutorAttendanceReport {
            tutor_id: tutor.id,
            name: tutor.name,
            filter: ReportWindow { month, year },
            attendance_stats: AttendanceStats::from_counts(attended, entries.len()),
        })
    }

    async fn coordinates(
        &self,
        range: DayRange,
        tutor_id: Option<u64>,
        center_id: Option<u64>,
    ) -> Result<Vec<TutorCoordinates>, AppError> {
        let tutors = self
            .state
            .tutors
            .reportable_tutors(center_id, tutor_id)
            .await?;

        let records = self
            .state
            .attendance
            .find_for_report(&ReportFilter {
                range,
                center_id: None,
                tutor_id,
            })
            .await?;

        let mut by_tutor: HashMap<u64, Vec<&AttendanceRecord>> = HashMap::new();
        for r in &records {
            if r.status == AttendanceStatus::Present && r.location.is_some() {
                by_tutor.entry(r.tutor_id).or_default().push(r);
            }
        }

        let offset = self.state.policy.utc_offset;
        let mut out = Vec::with_capacity(tutors.len());
        for tutor in tutors {
            let mut mine = by_tutor.remove(&tutor.id).unwrap_or_default();
            mine.sort_by_key(|r| r.date);

            let points = mine
                .into_iter()
                .filter_map(|r| {
                    let loc = r.location?;
                    Some(CoordinatePoint {
                        date: day_key(r.date),
                        time: local_time(r.updated_at, offset),
                        lat: loc.latitude,
                        lng: loc.longitude,
                        status: r.status,
                    })
                })
                .collect();

            out.push(TutorCoordinates {
                center: self.center_ref(&tutor).await?,
                tutor: tutor_ref(&tutor),
                month: None,
                year: None,
                start_date: range.start,
                end_date: range.end,
                points,
            });
        }
        Ok(out)
    }

    async fn center_ref(&self, tutor: &Tutor) -> Result<CenterRef, AppError> {
        let center = match tutor.assigned_center {
            Some(id) => self.state.centers.center(id).await?,
            None => None,
        };
        Ok(match center {
            Some(c) => CenterRef {
                id: Some(c.id),
                name: c.name,
            },
            None => CenterRef {
                id: None,
                name: "N/A".to_string(),
            },
        })
    }
}

fn tutor_ref(tutor: &Tutor) -> TutorRef {
    TutorRef {
        id: tutor.id,
        name: tutor.name.clone(),
        phone: tutor.phone.clone(),
    }
}
