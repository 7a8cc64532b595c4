use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::AppError,
    model::{attendance::EmbeddedAttendanceEntry, tutor::Center},
    service::{gate::SUBMITTED_MESSAGE, report::TutorAttendanceReport},
    state::AppState,
};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttendance {
    /// `[latitude, longitude]`
    #[schema(value_type = Vec<f64>, example = json!([28.6140, 77.2091]))]
    pub current_location: Option<Value>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[schema(example = "Attendance submitted successfully")]
    pub message: String,
    pub attendance: EmbeddedAttendanceEntry,
}

/// Optional month filter. The month applies only when both values are given;
/// a malformed pair is a 400 with the usual message.
#[derive(Deserialize, IntoParams)]
pub struct ReportQuery {
    #[param(example = "10")]
    pub month: Option<String>,
    #[param(example = "2025")]
    pub year: Option<String>,
}

impl ReportQuery {
    fn parsed(&self) -> Result<(Option<u32>, Option<i32>), AppError> {
        let month = self.month.as_deref().map(str::trim).filter(|m| !m.is_empty());
        let year = self.year.as_deref().map(str::trim).filter(|y| !y.is_empty());

        match (month, year) {
            (Some(month), Some(year)) => match (month.parse::<u32>(), year.parse::<i32>()) {
                (Ok(m), Ok(y)) if (1..=12).contains(&m) => Ok((Some(m), Some(y))),
                _ => Err(AppError::validation("Invalid month or year format.")),
            },
            // a lone value is echoed back but does not filter
            (month, year) => Ok((
                month.and_then(|m| m.parse().ok()),
                year.and_then(|y| y.parse().ok()),
            )),
        }
    }
}

/// Tutor self check-in from the current device location
#[utoipa::path(
    post,
    path = "/api/tutors/attendance",
    request_body = SubmitAttendance,
    responses(
        (status = 200, description = "Attendance recorded for today", body = SubmitResponse),
        (status = 400, description = "Invalid location, button disabled, weekly off or out of range", body = Object, example = json!({
            "message": "You must be within 100 meters of the center to submit attendance",
            "distance": 1234.5,
            "tutorLocation": [28.7, 77.3],
            "centerLocation": [28.6139, 77.209]
        })),
        (status = 403, description = "Tutor only"),
        (status = 404, description = "Tutor or assigned center not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Tutor"
)]
pub async fn submit_attendance(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<SubmitAttendance>,
) -> Result<HttpResponse, AppError> {
    auth.require_tutor()?;

    let accepted = state
        .gate()
        .submit(auth.user_id, body.current_location.as_ref())
        .await?;

    Ok(HttpResponse::Ok().json(SubmitResponse {
        message: SUBMITTED_MESSAGE.to_string(),
        attendance: accepted.entry,
    }))
}

/// Center the calling tutor is assigned to
#[utoipa::path(
    get,
    path = "/api/tutors/my-center",
    responses(
        (status = 200, description = "Assigned center", body = Center),
        (status = 403, description = "Tutor only"),
        (status = 404, description = "No center assigned"),
    ),
    security(("bearer_auth" = [])),
    tag = "Tutor"
)]
pub async fn my_center(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth.require_tutor()?;

    let tutor = state
        .tutors
        .tutor(auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Tutor not found"))?;

    let center = match tutor.assigned_center {
        Some(id) => state.centers.center(id).await?,
        None => None,
    }
    .ok_or_else(|| AppError::not_found("No center assigned to this tutor"))?;

    Ok(HttpResponse::Ok().json(center))
}

/// Attendance percentage of one tutor, optionally for a single month
#[utoipa::path(
    get,
    path = "/api/tutors/{id}/attendance",
    params(
        ("id" = u64, Path, description = "Tutor id"),
        ReportQuery
    ),
    responses(
        (status = 200, description = "Attendance statistics", body = TutorAttendanceReport),
        (status = 400, description = "Invalid month or year"),
        (status = 403, description = "Not the tutor and not an admin"),
        (status = 404, description = "Tutor not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Tutor"
)]
pub async fn tutor_attendance_report(
    auth: AuthUser,
    state: web::Data<AppState>,
    path: web::Path<u64>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, AppError> {
    let tutor_id = path.into_inner();
    auth.require_self_or_admin(tutor_id)?;
    let (month, year) = query.parsed()?;

    let report = state
        .reports()
        .attendance_report(tutor_id, month, year)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test, web::Data};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::{
        auth::jwt::testing::access_token,
        config::Config,
        model::role::Role,
        routes,
        state::testing::{Fixture, delhi_center, tutor},
    };

    use super::*;

    fn seeded() -> Fixture {
        let fx = Fixture::new(Utc.with_ymd_and_hms(2025, 10, 14, 4, 0, 0).unwrap());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        fx
    }

    macro_rules! app {
        ($fx:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new(Config::for_tests()))
                    .app_data(Data::new($fx.state))
                    .configure(|cfg| routes::protected_routes(cfg, "/api")),
            )
            .await
        };
    }

    fn submit(token: &str, location: Value) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/tutors/attendance")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_json(json!({ "currentLocation": location }))
    }

    #[actix_web::test]
    async fn nearby_check_in_succeeds_with_verbatim_message() {
        let fx = seeded();
        let store = fx.store.clone();
        let app = app!(fx);

        let resp = test::call_service(
            &app,
            submit(&access_token(42, Role::Tutor), json!([28.6140, 77.2091])).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Attendance submitted successfully");
        assert_eq!(body["attendance"]["date"], "2025-10-14");
        assert_eq!(body["attendance"]["status"], "present");
        assert_eq!(store.records().len(), 1);
    }

    #[actix_web::test]
    async fn far_check_in_reports_distance() {
        let fx = seeded();
        let store = fx.store.clone();
        let app = app!(fx);

        let resp = test::call_service(
            &app,
            submit(&access_token(42, Role::Tutor), json!([28.7000, 77.3000])).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["message"],
            "You must be within 100 meters of the center to submit attendance"
        );
        assert!(body["distance"].as_f64().unwrap() > 100.0);
        assert_eq!(body["tutorLocation"], json!([28.7, 77.3]));
        assert_eq!(body["centerLocation"], json!([28.6139, 77.209]));
        assert!(store.records().is_empty());
    }

    #[actix_web::test]
    async fn malformed_location_is_bad_request() {
        let fx = seeded();
        let app = app!(fx);

        let resp = test::call_service(
            &app,
            submit(&access_token(42, Role::Tutor), json!(["north", 77.2])).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Invalid location data provided");
    }

    #[actix_web::test]
    async fn admin_cannot_self_check_in() {
        let fx = seeded();
        let app = app!(fx);

        let resp = test::call_service(
            &app,
            submit(&access_token(1, Role::Admin), json!([28.6140, 77.2091])).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn my_center_returns_assignment() {
        let fx = seeded();
        fx.store.add_tutor(tutor(43, None));
        let app = app!(fx);

        let req = test::TestRequest::get()
            .uri("/api/tutors/my-center")
            .insert_header(("Authorization", format!("Bearer {}", access_token(42, Role::Tutor))))
            .to_request();
        let center: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(center["name"], "Jama Masjid Center");

        let req = test::TestRequest::get()
            .uri("/api/tutors/my-center")
            .insert_header(("Authorization", format!("Bearer {}", access_token(43, Role::Tutor))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn report_is_visible_to_self_and_admin_only() {
        let fx = seeded();
        fx.store.add_tutor(tutor(43, Some(7)));
        let app = app!(fx);

        test::call_service(
            &app,
            submit(&access_token(42, Role::Tutor), json!([28.6140, 77.2091])).to_request(),
        )
        .await;

        let get = |token: String, id: u64| {
            test::TestRequest::get()
                .uri(&format!("/api/tutors/{id}/attendance?month=10&year=2025"))
                .insert_header(("Authorization", format!("Bearer {token}")))
                .to_request()
        };

        let own: Value =
            test::call_and_read_body_json(&app, get(access_token(42, Role::Tutor), 42)).await;
        assert_eq!(own["tutorId"], 42);
        assert_eq!(own["filter"]["month"], 10);
        assert_eq!(own["attendanceStats"]["attendedSessions"], 1);
        assert_eq!(own["attendanceStats"]["attendancePercentage"], 100.0);

        let other = test::call_service(&app, get(access_token(43, Role::Tutor), 42)).await;
        assert_eq!(other.status(), StatusCode::FORBIDDEN);

        let admin = test::call_service(&app, get(access_token(1, Role::Admin), 42)).await;
        assert_eq!(admin.status(), StatusCode::OK);

        let missing = test::call_service(&app, get(access_token(1, Role::Admin), 999)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn malformed_report_month_is_a_json_400() {
        let fx = seeded();
        let app = app!(fx);
        let get = |query: &str| {
            test::TestRequest::get()
                .uri(&format!("/api/tutors/42/attendance?{query}"))
                .insert_header(("Authorization", format!("Bearer {}", access_token(1, Role::Admin))))
                .to_request()
        };

        for query in ["month=abc&year=2025", "month=13&year=2025", "month=10&year=20x5"] {
            let resp = test::call_service(&app, get(query)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{query}");
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["message"], "Invalid month or year format.");
        }

        // a lone month does not filter and is echoed back
        let lone: Value = test::call_and_read_body_json(&app, get("month=10")).await;
        assert_eq!(lone["filter"]["month"], 10);
        assert!(lone["filter"]["year"].is_null());

        let lone_bad: Value = test::call_and_read_body_json(&app, get("month=abc")).await;
        assert!(lone_bad["filter"]["month"].is_null());
    }
}
