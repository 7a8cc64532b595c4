use crate::api::attendance::{
    AttendanceView, ButtonResponse, ClearRecentResponse, CoordinateRange, EntryResponse,
    ToggleButton,
};
use crate::api::notification::{
    ClearFailedResponse, QueueStatusResponse, TestNotification, TestNotificationResponse,
};
use crate::api::tutor::{SubmitAttendance, SubmitResponse};
use crate::model::attendance::{
    AttendanceRecord, AttendanceStatus, EmbeddedAttendanceEntry, GeoPoint,
};
use crate::model::attendance_button::AttendanceButton;
use crate::model::tutor::{Center, Tutor, TutorStatus};
use crate::notify::QueueStatus;
use crate::service::gate::MarkAttendance;
use crate::service::report::{
    AttendanceStats, CenterRef, CoordinatePoint, ReportWindow, TutorAttendanceReport,
    TutorCoordinates, TutorMonthlyAttendance, TutorRef,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tutor Attendance API",
        version = "1.0.0",
        description = r#"
## Tutor Attendance

Geofenced daily check-in for tutors working at community centers.

### Key features
- **Self check-in**: a tutor submits the device location; it is accepted only
  within the configured radius of the assigned center, on working days, while
  the admin switch is on
- **Admin marking**: mark any tutor present or absent for any day
- **Reports**: monthly day-by-day matrix, check-in coordinates, per-tutor percentage
- **Confirmations**: accepted check-ins queue an email, retried in the background

### Security
Every endpoint requires a **JWT Bearer** access token.
"#,
    ),
    paths(
        crate::api::attendance::toggle_button,
        crate::api::attendance::button_status,
        crate::api::attendance::mark_attendance,
        crate::api::attendance::recent_attendance,
        crate::api::attendance::today_attendance,
        crate::api::attendance::clear_recent,
        crate::api::attendance::attendance_report,
        crate::api::attendance::tutor_coordinates,
        crate::api::attendance::tutor_coordinates_range,

        crate::api::tutor::submit_attendance,
        crate::api::tutor::my_center,
        crate::api::tutor::tutor_attendance_report,

        crate::api::notification::queue_status,
        crate::api::notification::clear_failed,
        crate::api::notification::send_test
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceStatus,
            AttendanceView,
            AttendanceButton,
            ButtonResponse,
            ToggleButton,
            MarkAttendance,
            EntryResponse,
            EmbeddedAttendanceEntry,
            GeoPoint,
            ClearRecentResponse,
            CoordinateRange,
            SubmitAttendance,
            SubmitResponse,
            Tutor,
            TutorStatus,
            Center,
            TutorRef,
            CenterRef,
            TutorMonthlyAttendance,
            CoordinatePoint,
            TutorCoordinates,
            ReportWindow,
            AttendanceStats,
            TutorAttendanceReport,
            QueueStatus,
            QueueStatusResponse,
            ClearFailedResponse,
            TestNotification,
            TestNotificationResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance switch, marking and reports"),
        (name = "Tutor", description = "Tutor self check-in and personal report"),
        (name = "Notifications", description = "Confirmation email queue"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in [
            "/api/attendance/buttonToggle",
            "/api/attendance/report",
            "/api/tutors/attendance",
            "/api/tutors/{id}/attendance",
            "/api/attendance/notifications/status",
        ] {
            assert!(paths.iter().any(|p| p == expected), "missing {expected}");
        }
        assert!(doc.components.unwrap().security_schemes.contains_key("bearer_auth"));
    }
}
