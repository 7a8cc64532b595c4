use crate::{
    api::{attendance, notification, tutor},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-IP limiter: `requests_per_min` tokens refilled evenly over a minute
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        // only fails for a zero period or burst, both excluded above
        .expect("valid governor configuration");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .configure(api_routes),
    );
}

/// Same tree as [`configure`] without the per-IP limiter, which needs a peer
/// address the test harness does not provide.
#[cfg(test)]
pub fn protected_routes(cfg: &mut web::ServiceConfig, prefix: &str) {
    cfg.service(
        web::scope(prefix)
            .wrap(from_fn(auth_middleware))
            .configure(api_routes),
    );
}

fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            .service(
                web::resource("/buttonToggle").route(web::post().to(attendance::toggle_button)),
            )
            .service(
                web::resource("/buttonStatus").route(web::get().to(attendance::button_status)),
            )
            .service(web::resource("/mark").route(web::post().to(attendance::mark_attendance)))
            .service(
                web::resource("/recent").route(web::get().to(attendance::recent_attendance)),
            )
            .service(web::resource("/today").route(web::get().to(attendance::today_attendance)))
            .service(
                web::resource("/clear-recent").route(web::post().to(attendance::clear_recent)),
            )
            .service(
                web::resource("/report").route(web::get().to(attendance::attendance_report)),
            )
            .service(
                web::resource("/tutor-coordinates")
                    .route(web::get().to(attendance::tutor_coordinates)),
            )
            .service(
                web::resource("/tutor-coordinates-range")
                    .route(web::post().to(attendance::tutor_coordinates_range)),
            )
            // /attendance/notifications/*
            .service(
                web::scope("/notifications")
                    .service(
                        web::resource("/status").route(web::get().to(notification::queue_status)),
                    )
                    .service(
                        web::resource("/clear-failed")
                            .route(web::post().to(notification::clear_failed)),
                    )
                    .service(web::resource("/test").route(web::post().to(notification::send_test))),
            ),
    )
    .service(
        web::scope("/tutors")
            .service(web::resource("/attendance").route(web::post().to(tutor::submit_attendance)))
            .service(web::resource("/my-center").route(web::get().to(tutor::my_center)))
            // /tutors/{id}/attendance
            .service(
                web::resource("/{id}/attendance")
                    .route(web::get().to(tutor::tutor_attendance_report)),
            ),
    );
}
