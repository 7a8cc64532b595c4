use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{
        auth::AuthUser,
        permission::{Access, Section},
    },
    error::AppError,
    model::{
        attendance::{AttendanceRecord, EmbeddedAttendanceEntry},
        attendance_button::AttendanceButton,
    },
    service::{gate::MarkAttendance, report::TutorCoordinates, report::TutorMonthlyAttendance},
    state::AppState,
    store::RecentQuery,
    utils::calendar::{local_day, parse_day},
};

#[derive(Deserialize, ToSchema)]
pub struct ToggleButton {
    /// New state; the switch is flipped when omitted
    #[schema(value_type = Option<bool>, example = false)]
    pub status: Option<Value>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ButtonResponse {
    #[schema(example = "Attendance button disabled")]
    pub message: String,
    pub button: AttendanceButton,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    #[schema(example = "Attendance marked successfully")]
    pub message: String,
    pub attendance: EmbeddedAttendanceEntry,
}

/// Attendance record with display names resolved.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    #[serde(flatten)]
    pub record: AttendanceRecord,
    #[schema(example = "Abdul Rahman")]
    pub tutor_name: Option<String>,
    #[schema(example = "Jama Masjid Center")]
    pub center_name: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearRecentResponse {
    #[schema(example = "Recent activity cleared successfully")]
    pub message: String,
    #[schema(example = 12)]
    pub cleared_count: u64,
}

/// Month selector shared by the report endpoints. Kept as raw strings so a
/// malformed value gets the same message as an out-of-range one.
#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct MonthQuery {
    #[param(example = "10")]
    pub month: Option<String>,
    #[param(example = "2025")]
    pub year: Option<String>,
    /// Only tutors assigned to this center
    pub center_id: Option<u64>,
    /// Only this tutor (coordinates only)
    pub tutor_id: Option<u64>,
}

impl MonthQuery {
    fn month_year(&self) -> Result<(u32, i32), AppError> {
        let (Some(month), Some(year)) = (self.month.as_deref(), self.year.as_deref()) else {
            return Err(AppError::validation(
                "Month and year are required query parameters.",
            ));
        };
        match (month.trim().parse::<u32>(), year.trim().parse::<i32>()) {
            (Ok(m), Ok(y)) if (1..=12).contains(&m) => Ok((m, y)),
            _ => Err(AppError::validation("Invalid month or year format.")),
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateRange {
    #[schema(example = "2025-10-01")]
    pub start_date: Option<String>,
    #[schema(example = "2025-10-31")]
    pub end_date: Option<String>,
    pub tutor_id: Option<u64>,
    pub center_id: Option<u64>,
}

async fn with_names(
    state: &AppState,
    records: Vec<AttendanceRecord>,
) -> Result<Vec<AttendanceView>, AppError> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let tutor_name = state.tutors.tutor(record.tutor_id).await?.map(|t| t.name);
        let center_name = state.centers.center(record.center_id).await?.map(|c| c.name);
        out.push(AttendanceView {
            record,
            tutor_name,
            center_name,
        });
    }
    Ok(out)
}

/// Enable, disable or flip the attendance button
#[utoipa::path(
    post,
    path = "/api/attendance/buttonToggle",
    request_body = ToggleButton,
    responses(
        (status = 200, description = "New button state", body = ButtonResponse),
        (status = 400, description = "Status is not a boolean", body = Object, example = json!({
            "message": "Status must be boolean"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing tutorAttendance write permission"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn toggle_button(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: Option<web::Json<ToggleButton>>,
) -> Result<HttpResponse, AppError> {
    auth.require(Section::TutorAttendance, Access::Write)?;

    let desired = match body.and_then(|b| b.into_inner().status) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(b),
        Some(_) => return Err(AppError::validation("Status must be boolean")),
    };

    let button = state.gate().set_button(auth.user_id, desired).await?;
    let message = if button.enabled {
        "Attendance button enabled"
    } else {
        "Attendance button disabled"
    };

    Ok(HttpResponse::Ok().json(ButtonResponse {
        message: message.to_string(),
        button,
    }))
}

/// Current attendance button state
#[utoipa::path(
    get,
    path = "/api/attendance/buttonStatus",
    responses(
        (status = 200, description = "Button state", body = AttendanceButton),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing tutorAttendance read permission"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn button_status(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth.require(Section::TutorAttendance, Access::Read)?;
    let button = state.button.current().await?;
    Ok(HttpResponse::Ok().json(button))
}

/// Mark a tutor present or absent for a day
#[utoipa::path(
    post,
    path = "/api/attendance/mark",
    request_body = MarkAttendance,
    responses(
        (status = 200, description = "Attendance marked", body = EntryResponse),
        (status = 400, description = "Missing or invalid fields", body = Object, example = json!({
            "message": "Missing required fields: tutorId, centerId, date, status."
        })),
        (status = 403, description = "Missing tutorAttendance write permission"),
        (status = 404, description = "Tutor or center not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn mark_attendance(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<MarkAttendance>,
) -> Result<HttpResponse, AppError> {
    auth.require(Section::TutorAttendance, Access::Write)?;

    let (_, entry) = state.gate().mark(auth.user_id, body.into_inner()).await?;

    Ok(HttpResponse::Ok().json(EntryResponse {
        message: "Attendance marked successfully".to_string(),
        attendance: entry,
    }))
}

/// Recent attendance: a tutor gets their own record for today, others the latest non-archived records
#[utoipa::path(
    get,
    path = "/api/attendance/recent",
    responses(
        (status = 200, description = "Most recent first", body = [AttendanceView]),
        (status = 403, description = "Missing tutorAttendance read permission"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn recent_attendance(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth.require(Section::TutorAttendance, Access::Read)?;

    let query = if auth.is_tutor() {
        RecentQuery {
            tutor_id: Some(auth.user_id),
            day: Some(local_day(state.clock.now(), state.policy.utc_offset)),
            limit: 1,
            exclude_archived: false,
        }
    } else {
        RecentQuery::latest(state.policy.recent_limit)
    };

    let records = state.attendance.find_recent(query).await?;
    Ok(HttpResponse::Ok().json(with_names(&state, records).await?))
}

/// Today's records across all tutors
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Most recent first", body = [AttendanceView]),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today_attendance(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;

    let query = RecentQuery {
        day: Some(local_day(state.clock.now(), state.policy.utc_offset)),
        exclude_archived: false,
        ..RecentQuery::latest(state.policy.recent_limit)
    };

    let records = state.attendance.find_recent(query).await?;
    Ok(HttpResponse::Ok().json(with_names(&state, records).await?))
}

/// Archive everything created in the last 24 hours
#[utoipa::path(
    post,
    path = "/api/attendance/clear-recent",
    responses(
        (status = 200, description = "Records archived", body = ClearRecentResponse),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clear_recent(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;

    let cutoff = state.clock.now() - Duration::hours(24);
    let cleared = state.attendance.archive_since(cutoff).await?;
    info!(cleared, admin_id = auth.user_id, "Cleared recent attendance");

    Ok(HttpResponse::Ok().json(ClearRecentResponse {
        message: "Recent activity cleared successfully".to_string(),
        cleared_count: cleared,
    }))
}

/// Monthly present/absent matrix for every active or pending tutor
#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(MonthQuery),
    responses(
        (status = 200, description = "One row per tutor", body = [TutorMonthlyAttendance]),
        (status = 400, description = "Missing or invalid month/year"),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_report(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<MonthQuery>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let (month, year) = query.month_year()?;

    let rows = state
        .reports()
        .monthly_matrix(month, year, query.center_id)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Check-in coordinates per tutor for one month
#[utoipa::path(
    get,
    path = "/api/attendance/tutor-coordinates",
    params(MonthQuery),
    responses(
        (status = 200, description = "Points per tutor, in day order", body = [TutorCoordinates]),
        (status = 400, description = "Missing or invalid month/year"),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn tutor_coordinates(
    auth: AuthUser,
    state: web::Data<AppState>,
    query: web::Query<MonthQuery>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let (month, year) = query.month_year()?;

    let rows = state
        .reports()
        .monthly_coordinates(month, year, query.tutor_id, query.center_id)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Check-in coordinates per tutor for an inclusive date range
#[utoipa::path(
    post,
    path = "/api/attendance/tutor-coordinates-range",
    request_body = CoordinateRange,
    responses(
        (status = 200, description = "Points per tutor, in day order", body = [TutorCoordinates]),
        (status = 400, description = "Missing, invalid or too long range"),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn tutor_coordinates_range(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<CoordinateRange>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;

    let offset = state.policy.utc_offset;
    let parse = |raw: Option<&str>| -> Result<NaiveDate, AppError> {
        let raw = raw.ok_or_else(|| AppError::validation("startDate and endDate are required."))?;
        parse_day(raw, offset).ok_or_else(|| AppError::validation("Invalid date format."))
    };
    let start = parse(body.start_date.as_deref())?;
    let end = parse(body.end_date.as_deref())?;

    let rows = state
        .reports()
        .coordinates_in_range(start, end, body.tutor_id, body.center_id)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}
