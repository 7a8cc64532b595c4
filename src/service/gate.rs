use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    model::{
        attendance::{
            AttendanceRecord, AttendanceStatus, DailyAttendance, EmbeddedAttendanceEntry, GeoPoint,
        },
        attendance_button::AttendanceButton,
        tutor::{Center, Tutor},
    },
    notify::{AttendanceConfirmation, NotificationPayload, queue::JobId},
    state::AppState,
    utils::{
        calendar::{local_day, parse_day},
        geo::{distance_meters, is_valid_coordinate, is_within_radius},
    },
};

/// Read verbatim by the attendance app. Do not reword.
pub const SUBMITTED_MESSAGE: &str = "Attendance submitted successfully";
/// Read verbatim by the attendance app. Do not reword.
pub const DISABLED_MESSAGE: &str = "Attendance disabled by Admin";

/// Why a self check-in was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    InvalidInput,
    Disabled,
    WeeklyOff(Weekday),
    OutOfRange {
        distance: f64,
        radius: f64,
        tutor_location: [f64; 2],
        center_location: [f64; 2],
    },
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

impl GateRejection {
    pub fn message(&self) -> String {
        match self {
            GateRejection::InvalidInput => "Invalid location data provided".to_string(),
            GateRejection::Disabled => DISABLED_MESSAGE.to_string(),
            GateRejection::WeeklyOff(day) => format!(
                "Attendance cannot be submitted on {}s as it is a weekly off day.",
                weekday_name(*day)
            ),
            GateRejection::OutOfRange { radius, .. } => format!(
                "You must be within {radius} meters of the center to submit attendance"
            ),
        }
    }

    pub fn to_body(&self) -> Value {
        match self {
            GateRejection::OutOfRange {
                distance,
                tutor_location,
                center_location,
                ..
            } => json!({
                "message": self.message(),
                "distance": distance,
                "tutorLocation": tutor_location,
                "centerLocation": center_location,
            }),
            _ => json!({ "message": self.message() }),
        }
    }
}

/// Accepts only a `[latitude, longitude]` pair of in-range numbers.
pub fn parse_location(raw: Option<&Value>) -> Result<GeoPoint, GateRejection> {
    let pair = raw
        .and_then(Value::as_array)
        .filter(|a| a.len() == 2)
        .ok_or(GateRejection::InvalidInput)?;

    let lat = pair[0].as_f64().ok_or(GateRejection::InvalidInput)?;
    let lon = pair[1].as_f64().ok_or(GateRejection::InvalidInput)?;

    if !is_valid_coordinate(lat, lon) {
        return Err(GateRejection::InvalidInput);
    }

    Ok(GeoPoint::new(lat, lon))
}

/// Body of an admin marking request, before validation.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendance {
    #[schema(example = 42)]
    pub tutor_id: Option<u64>,
    #[schema(example = 7)]
    pub center_id: Option<u64>,
    #[schema(example = "2025-10-14")]
    pub date: Option<String>,
    #[schema(example = "present")]
    pub status: Option<String>,
}

struct MarkRequest {
    tutor_id: u64,
    center_id: u64,
    day: NaiveDate,
    status: AttendanceStatus,
}

/// Result of an accepted self check-in.
#[derive(Debug)]
pub struct Submission {
    pub record: AttendanceRecord,
    pub entry: EmbeddedAttendanceEntry,
    pub notification: Option<JobId>,
}

/// Decides whether attendance may be written today and writes it.
pub struct AttendanceGate<'a> {
    state: &'a AppState,
}

impl<'a> AttendanceGate<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Tutor self check-in. Checks run in a fixed order and the first failing
    /// one decides the answer; nothing is written on rejection.
    #[instrument(name = "attendance_submit", skip(self, raw_location))]
    pub async fn submit(
        &self,
        tutor_id: u64,
        raw_location: Option<&Value>,
    ) -> Result<Submission, AppError> {
        let policy = &self.state.policy;

        let point = parse_location(raw_location).map_err(AppError::Rejected)?;

        let button = self.state.button.current().await?;
        if !button.enabled {
            info!("Rejected: attendance button disabled");
            return Err(AppError::Rejected(GateRejection::Disabled));
        }

        let now = self.state.clock.now();
        let today = local_day(now, policy.utc_offset);
        if today.weekday() == policy.weekly_off {
            info!(%today, "Rejected: weekly off day");
            return Err(AppError::Rejected(GateRejection::WeeklyOff(policy.weekly_off)));
        }

        let tutor = self.tutor(tutor_id).await?;
        let center = self.assigned_center(&tutor).await?;

        if !is_within_radius(
            point.latitude,
            point.longitude,
            center.latitude,
            center.longitude,
            policy.radius_meters,
        ) {
            let distance =
                distance_meters(point.latitude, point.longitude, center.latitude, center.longitude);
            info!(distance, radius = policy.radius_meters, "Rejected: outside geofence");
            return Err(AppError::Rejected(GateRejection::OutOfRange {
                distance,
                radius: policy.radius_meters,
                tutor_location: point.as_lat_lon(),
                center_location: [center.latitude, center.longitude],
            }));
        }

        let (record, entry) = self
            .state
            .attendance
            .upsert_daily(
                tutor.id,
                today,
                DailyAttendance {
                    center_id: center.id,
                    center_name: center.name.clone(),
                    status: AttendanceStatus::Present,
                    marked_by: tutor.id,
                    location: Some(point),
                    at: now,
                },
            )
            .await?;

        info!(record_id = record.id, %today, "Attendance accepted");

        let notification = self.queue_confirmation(&tutor, &center, &record, now);

        Ok(Submission {
            record,
            entry,
            notification,
        })
    }

    /// Admin marking: same day-keyed write, without weekly-off or geofence checks.
    #[instrument(name = "attendance_mark", skip(self, body))]
    pub async fn mark(
        &self,
        admin_id: u64,
        body: MarkAttendance,
    ) -> Result<(AttendanceRecord, EmbeddedAttendanceEntry), AppError> {
        let req = self.validate_mark(body)?;

        let tutor = self.tutor(req.tutor_id).await?;
        let center = self
            .state
            .centers
            .center(req.center_id)
            .await?
            .ok_or_else(|| AppError::not_found("Center not found"))?;

        let (record, entry) = self
            .state
            .attendance
            .upsert_daily(
                tutor.id,
                req.day,
                DailyAttendance {
                    center_id: center.id,
                    center_name: center.name,
                    status: req.status,
                    marked_by: admin_id,
                    location: None,
                    at: self.state.clock.now(),
                },
            )
            .await?;

        info!(
            tutor_id = tutor.id,
            day = %req.day,
            status = %req.status,
            "Attendance marked by admin"
        );

        Ok((record, entry))
    }

    /// Sets the switch to `desired`, or flips it when no value is given.
    pub async fn set_button(
        &self,
        admin_id: u64,
        desired: Option<bool>,
    ) -> Result<AttendanceButton, AppError> {
        let enabled = match desired {
            Some(value) => value,
            None => !self.state.button.current().await?.enabled,
        };

        let button = self
            .state
            .button
            .set(enabled, admin_id, self.state.clock.now())
            .await?;

        info!(enabled, admin_id, "Attendance button changed");
        Ok(button)
    }

    fn validate_mark(&self, body: MarkAttendance) -> Result<MarkRequest, AppError> {
        let (Some(tutor_id), Some(center_id), Some(date), Some(status)) =
            (body.tutor_id, body.center_id, body.date, body.status)
        else {
            return Err(AppError::validation(
                "Missing required fields: tutorId, centerId, date, status.",
            ));
        };

        let day = parse_day(&date, self.state.policy.utc_offset)
            .ok_or_else(|| AppError::validation("Invalid date format."))?;
        let status = AttendanceStatus::from_str(&status)
            .map_err(|_| AppError::validation("Status must be 'present' or 'absent'."))?;

        Ok(MarkRequest {
            tutor_id,
            center_id,
            day,
            status,
        })
    }

    async fn tutor(&self, tutor_id: u64) -> Result<Tutor, AppError> {
        self.state
            .tutors
            .tutor(tutor_id)
            .await?
            .ok_or_else(|| AppError::not_found("Tutor not found"))
    }

    async fn assigned_center(&self, tutor: &Tutor) -> Result<Center, AppError> {
        let Some(center_id) = tutor.assigned_center else {
            return Err(AppError::not_found("Assigned center not found"));
        };
        self.state
            .centers
            .center(center_id)
            .await?
            .ok_or_else(|| AppError::not_found("Assigned center not found"))
    }

    /// Fire-and-forget; a queue failure never fails the check-in.
    fn queue_confirmation(
        &self,
        tutor: &Tutor,
        center: &Center,
        record: &AttendanceRecord,
        now: DateTime<Utc>,
    ) -> Option<JobId> {
        let Some(to) = tutor.email.clone() else {
            debug!(tutor_id = tutor.id, "No email on file, skipping confirmation");
            return None;
        };

        let payload = NotificationPayload {
            to,
            confirmation: AttendanceConfirmation {
                tutor_name: tutor.name.clone(),
                date: record.date,
                time: now
                    .with_timezone(&self.state.policy.utc_offset)
                    .format("%H:%M:%S")
                    .to_string(),
                center_name: center.name.clone(),
                location: record.location,
            },
        };

        match self.state.notifications.enqueue(payload) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, tutor_id = tutor.id, "Could not queue confirmation");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::state::testing::{Fixture, delhi_center, tutor};

    // 2025-10-14 is a Tuesday; 2025-10-19 a Sunday
    fn tuesday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 4, 0, 0).unwrap()
    }

    fn loc(lat: f64, lon: f64) -> Value {
        json!([lat, lon])
    }

    fn rejection(err: AppError) -> GateRejection {
        match err {
            AppError::Rejected(r) => r,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn location_shape_is_validated() {
        assert!(parse_location(Some(&json!([28.6, 77.2]))).is_ok());
        assert_eq!(parse_location(None), Err(GateRejection::InvalidInput));
        assert_eq!(parse_location(Some(&json!([28.6]))), Err(GateRejection::InvalidInput));
        assert_eq!(
            parse_location(Some(&json!(["28.6", 77.2]))),
            Err(GateRejection::InvalidInput)
        );
        assert_eq!(
            parse_location(Some(&json!({"lat": 28.6, "lon": 77.2}))),
            Err(GateRejection::InvalidInput)
        );
        assert_eq!(
            parse_location(Some(&json!([128.6, 77.2]))),
            Err(GateRejection::InvalidInput)
        );
    }

    #[tokio::test]
    async fn concurrent_same_day_submissions_keep_one_record() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        let gate = fx.state.gate();

        let points: Vec<(f64, f64)> = (0..8)
            .map(|i| (28.6139 + 0.0001 * i as f64, 77.2090))
            .collect();
        let bodies: Vec<Value> = points.iter().map(|&(lat, lon)| loc(lat, lon)).collect();

        let results =
            futures::future::join_all(bodies.iter().map(|body| gate.submit(42, Some(body)))).await;
        assert!(results.iter().all(Result::is_ok));

        let records = fx.store.records();
        assert_eq!(records.len(), 1);
        let stored = records[0].location.expect("location stored");
        assert!(points.iter().any(|&(lat, lon)| stored == GeoPoint::new(lat, lon)));

        let history = fx.store.history_of(42);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].location, Some(stored));
    }

    #[tokio::test]
    async fn nearby_submission_is_accepted_and_repeat_overwrites() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        let gate = fx.state.gate();

        let first = gate.submit(42, Some(&loc(28.6140, 77.2091))).await.unwrap();
        assert_eq!(first.record.status, AttendanceStatus::Present);
        assert_eq!(first.record.marked_by, 42);
        assert!(first.notification.is_some());

        // widen the fence so the second, distant check-in is accepted too
        let mut wide = Fixture::with_store(fx.store.clone(), tuesday_morning());
        wide.state.policy.radius_meters = 50_000.0;
        let second = wide
            .state
            .gate()
            .submit(42, Some(&loc(28.7000, 77.3000)))
            .await
            .unwrap();

        assert_eq!(second.record.id, first.record.id);
        let records = fx.store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].location, Some(GeoPoint::new(28.7000, 77.3000)));

        let history = fx.store.history_of(42);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].location, Some(GeoPoint::new(28.7000, 77.3000)));
        assert_eq!(history[0].created_at, first.record.created_at);
    }

    #[tokio::test]
    async fn each_day_gets_its_own_record() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        let here = loc(28.6140, 77.2091);

        fx.state.gate().submit(42, Some(&here)).await.unwrap();
        fx.clock.set(tuesday_morning() + chrono::Duration::days(1));
        fx.state.gate().submit(42, Some(&here)).await.unwrap();

        let days: Vec<_> = fx.store.history_of(42).iter().map(|e| e.date).collect();
        assert_eq!(
            days,
            [
                NaiveDate::from_ymd_opt(2025, 10, 14).unwrap(),
                NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn out_of_range_reports_distance_and_writes_nothing() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));

        let err = fx
            .state
            .gate()
            .submit(42, Some(&loc(28.7000, 77.3000)))
            .await
            .unwrap_err();

        match rejection(err) {
            GateRejection::OutOfRange {
                distance,
                radius,
                tutor_location,
                center_location,
            } => {
                assert!(distance > radius);
                assert_eq!(tutor_location, [28.7000, 77.3000]);
                assert_eq!(center_location, [28.6139, 77.2090]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(fx.store.records().is_empty());
        assert!(fx.store.history_of(42).is_empty());
    }

    #[tokio::test]
    async fn disabled_button_wins_over_location() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        fx.state.gate().set_button(1, Some(false)).await.unwrap();

        let err = fx
            .state
            .gate()
            .submit(42, Some(&loc(28.6140, 77.2091)))
            .await
            .unwrap_err();

        let r = rejection(err);
        assert_eq!(r, GateRejection::Disabled);
        assert_eq!(r.message(), "Attendance disabled by Admin");
        assert!(fx.store.records().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_checked_before_the_button() {
        let fx = Fixture::new(tuesday_morning());
        fx.state.gate().set_button(1, Some(false)).await.unwrap();

        let err = fx.state.gate().submit(42, Some(&json!([1]))).await.unwrap_err();
        assert_eq!(rejection(err), GateRejection::InvalidInput);
    }

    #[tokio::test]
    async fn weekly_off_day_is_rejected_regardless_of_location() {
        let sunday = Utc.with_ymd_and_hms(2025, 10, 19, 4, 0, 0).unwrap();
        let fx = Fixture::new(sunday);
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));

        let err = fx
            .state
            .gate()
            .submit(42, Some(&loc(28.6139, 77.2090)))
            .await
            .unwrap_err();

        let r = rejection(err);
        assert_eq!(r, GateRejection::WeeklyOff(Weekday::Sun));
        assert_eq!(
            r.message(),
            "Attendance cannot be submitted on Sundays as it is a weekly off day."
        );
        assert!(fx.store.records().is_empty());
    }

    #[tokio::test]
    async fn weekly_off_follows_service_time_zone() {
        // Saturday 20:00 UTC is already Sunday 01:30 at +05:30
        let late_saturday = Utc.with_ymd_and_hms(2025, 10, 18, 20, 0, 0).unwrap();
        let fx = Fixture::new(late_saturday);
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));

        let err = fx
            .state
            .gate()
            .submit(42, Some(&loc(28.6139, 77.2090)))
            .await
            .unwrap_err();
        assert_eq!(rejection(err), GateRejection::WeeklyOff(Weekday::Sun));
    }

    #[tokio::test]
    async fn missing_center_is_not_found() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_tutor(tutor(42, None));

        let err = fx
            .state
            .gate()
            .submit(42, Some(&loc(28.6139, 77.2090)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_write_is_an_error_and_queues_nothing() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        fx.store.fail_writes(true);

        let err = fx
            .state
            .gate()
            .submit(42, Some(&loc(28.6140, 77.2091)))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(fx.state.notifications.status().pending, 0);
        assert_eq!(fx.state.notifications.status().completed, 0);
    }

    #[tokio::test]
    async fn tutor_without_email_is_accepted_without_notification() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        let mut silent = tutor(42, Some(7));
        silent.email = None;
        fx.store.add_tutor(silent);

        let accepted = fx
            .state
            .gate()
            .submit(42, Some(&loc(28.6140, 77.2091)))
            .await
            .unwrap();
        assert!(accepted.notification.is_none());
    }

    #[tokio::test]
    async fn admin_mark_skips_geofence_and_weekly_off() {
        let sunday = Utc.with_ymd_and_hms(2025, 10, 19, 4, 0, 0).unwrap();
        let fx = Fixture::new(sunday);
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));

        let (record, entry) = fx
            .state
            .gate()
            .mark(
                1,
                MarkAttendance {
                    tutor_id: Some(42),
                    center_id: Some(7),
                    date: Some("2025-10-19".into()),
                    status: Some("absent".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.marked_by, 1);
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert_eq!(record.location, None);
        assert_eq!(entry.center_name, "Jama Masjid Center");
    }

    #[tokio::test]
    async fn admin_mark_overwrites_self_submission() {
        let fx = Fixture::new(tuesday_morning());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        fx.state
            .gate()
            .submit(42, Some(&loc(28.6140, 77.2091)))
            .await
            .unwrap();

        fx.state
            .gate()
            .mark(
                1,
                MarkAttendance {
                    tutor_id: Some(42),
                    center_id: Some(7),
                    date: Some("2025-10-14".into()),
                    status: Some("absent".into()),
                },
            )
            .await
            .unwrap();

        let records = fx.store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Absent);
        assert_eq!(fx.store.history_of(42).len(), 1);
    }

    #[tokio::test]
    async fn admin_mark_validates_fields() {
        let fx = Fixture::new(tuesday_morning());
        let gate = fx.state.gate();

        let missing = gate.mark(1, MarkAttendance::default()).await.unwrap_err();
        assert!(matches!(missing, AppError::Validation(_)));

        let bad_status = gate
            .mark(
                1,
                MarkAttendance {
                    tutor_id: Some(42),
                    center_id: Some(7),
                    date: Some("2025-10-14".into()),
                    status: Some("late".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(bad_status, AppError::Validation(_)));

        let unknown_tutor = gate
            .mark(
                1,
                MarkAttendance {
                    tutor_id: Some(404),
                    center_id: Some(7),
                    date: Some("2025-10-14".into()),
                    status: Some("present".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(unknown_tutor, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn button_flips_without_explicit_value() {
        let fx = Fixture::new(tuesday_morning());
        let gate = fx.state.gate();

        assert!(!gate.set_button(9, None).await.unwrap().enabled);
        let button = gate.set_button(9, None).await.unwrap();
        assert!(button.enabled);
        assert_eq!(button.last_changed_by, Some(9));
        assert_eq!(button.last_changed_at, Some(tuesday_morning()));
    }
}
