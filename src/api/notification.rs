use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::AppError,
    model::attendance::GeoPoint,
    notify::{AttendanceConfirmation, NotificationPayload, QueueStatus, queue::JobId},
    state::AppState,
    utils::calendar::local_day,
};

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    pub email_queue: QueueStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearFailedResponse {
    #[schema(example = "Cleared 2 failed email jobs")]
    pub message: String,
    pub cleared_count: usize,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestNotification {
    #[schema(example = 42)]
    pub tutor_id: u64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationResponse {
    pub message: String,
    #[schema(value_type = String, example = "5b0f8c7e-3f4a-4c1e-9a53-1d2f0e6b7a90")]
    pub email_job_id: JobId,
    pub sent_to: String,
}

/// Notification queue counters
#[utoipa::path(
    get,
    path = "/api/attendance/notifications/status",
    responses(
        (status = 200, description = "Queue snapshot", body = QueueStatusResponse),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn queue_status(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(QueueStatusResponse {
        email_queue: state.notifications.status(),
        timestamp: state.clock.now(),
    }))
}

/// Drop jobs that exhausted their retries
#[utoipa::path(
    post,
    path = "/api/attendance/notifications/clear-failed",
    responses(
        (status = 200, description = "Failed jobs removed", body = ClearFailedResponse),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn clear_failed(
    auth: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;
    let cleared = state.notifications.clear_failed();
    info!(cleared, admin_id = auth.user_id, "Cleared failed notifications");

    Ok(HttpResponse::Ok().json(ClearFailedResponse {
        message: format!("Cleared {cleared} failed email jobs"),
        cleared_count: cleared,
    }))
}

/// Queue a sample confirmation to a tutor, to check the delivery path
#[utoipa::path(
    post,
    path = "/api/attendance/notifications/test",
    request_body = TestNotification,
    responses(
        (status = 200, description = "Job queued", body = TestNotificationResponse),
        (status = 400, description = "Tutor has no email"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Tutor not found"),
        (status = 503, description = "Notification queue is shut down"),
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn send_test(
    auth: AuthUser,
    state: web::Data<AppState>,
    body: web::Json<TestNotification>,
) -> Result<HttpResponse, AppError> {
    auth.require_admin()?;

    let tutor = state
        .tutors
        .tutor(body.tutor_id)
        .await?
        .ok_or_else(|| AppError::not_found("Tutor not found"))?;
    let to = tutor
        .email
        .clone()
        .ok_or_else(|| AppError::validation("Tutor email not available"))?;

    let center = match tutor.assigned_center {
        Some(id) => state.centers.center(id).await?,
        None => None,
    };

    let now = state.clock.now();
    let local = now.with_timezone(&state.policy.utc_offset);
    let payload = NotificationPayload {
        to: to.clone(),
        confirmation: AttendanceConfirmation {
            tutor_name: tutor.name,
            date: local_day(now, state.policy.utc_offset),
            time: local.format("%H:%M:%S").to_string(),
            location: center.as_ref().map(|c| GeoPoint::new(c.latitude, c.longitude)),
            center_name: center.map(|c| c.name).unwrap_or_else(|| "Test Center".to_string()),
        },
    };

    let job_id = state
        .notifications
        .enqueue(payload)
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    Ok(HttpResponse::Ok().json(TestNotificationResponse {
        message: "Test attendance confirmation email queued successfully".to_string(),
        email_job_id: job_id,
        sent_to: to,
    }))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test, web::Data};
    use chrono::TimeZone;
    use serde_json::{Value, json};

    use crate::{
        auth::jwt::testing::access_token,
        config::Config,
        model::role::Role,
        routes,
        state::testing::{Fixture, delhi_center, tutor},
    };

    use super::*;

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

    fn seeded() -> Fixture {
        let fx = Fixture::new(Utc.with_ymd_and_hms(2025, 10, 14, 4, 0, 0).unwrap());
        fx.store.add_center(delhi_center());
        fx.store.add_tutor(tutor(42, Some(7)));
        fx
    }

    #[actix_web::test]
    async fn status_and_clear_are_admin_only() {
        let fx = seeded();
        let app = app!(fx);
        let tutor_token = access_token(42, Role::Tutor);

        for (method, uri) in [
            ("GET", "/api/attendance/notifications/status"),
            ("POST", "/api/attendance/notifications/clear-failed"),
        ] {
            let req = match method {
                "GET" => test::TestRequest::get(),
                _ => test::TestRequest::post(),
            }
            .uri(uri)
            .insert_header(("Authorization", format!("Bearer {tutor_token}")))
            .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
        }
    }

    #[actix_web::test]
    async fn status_reports_queue_counters() {
        let fx = seeded();
        let app = app!(fx);

        let req = test::TestRequest::get()
            .uri("/api/attendance/notifications/status")
            .insert_header(("Authorization", format!("Bearer {}", access_token(1, Role::Admin))))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["emailQueue"]["failed"], 0);
        assert!(body["emailQueue"]["queueSize"].is_u64());
        assert_eq!(body["timestamp"], "2025-10-14T04:00:00Z");
    }

    #[actix_web::test]
    async fn clear_failed_reports_count() {
        let fx = seeded();
        let app = app!(fx);

        let req = test::TestRequest::post()
            .uri("/api/attendance/notifications/clear-failed")
            .insert_header(("Authorization", format!("Bearer {}", access_token(1, Role::Admin))))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["clearedCount"], 0);
        assert_eq!(body["message"], "Cleared 0 failed email jobs");
    }

    #[actix_web::test]
    async fn test_message_needs_an_email() {
        let fx = seeded();
        let mut silent = tutor(43, Some(7));
        silent.email = None;
        fx.store.add_tutor(silent);
        let app = app!(fx);
        let admin = access_token(1, Role::Admin);

        let req = test::TestRequest::post()
            .uri("/api/attendance/notifications/test")
            .insert_header(("Authorization", format!("Bearer {admin}")))
            .set_json(json!({ "tutorId": 42 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["sentTo"], "tutor42@example.com");
        assert!(body["emailJobId"].is_string());

        let req = test::TestRequest::post()
            .uri("/api/attendance/notifications/test")
            .insert_header(("Authorization", format!("Bearer {admin}")))
            .set_json(json!({ "tutorId": 43 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
