use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::AttendancePolicy,
    notify::NotificationQueue,
    service::{AttendanceGate, ReportAggregator},
    store::{AttendanceStore, ButtonStore, CenterDirectory, TutorDirectory},
};

/// Source of "now"; swapped for a fixed instant in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared by every handler through `web::Data`.
pub struct AppState {
    pub attendance: Arc<dyn AttendanceStore>,
    pub button: Arc<dyn ButtonStore>,
    pub tutors: Arc<dyn TutorDirectory>,
    pub centers: Arc<dyn CenterDirectory>,
    pub notifications: NotificationQueue,
    pub clock: Arc<dyn Clock>,
    pub policy: AttendancePolicy,
}

impl AppState {
    pub fn gate(&self) -> AttendanceGate<'_> {
        AttendanceGate::new(self)
    }

    pub fn reports(&self) -> ReportAggregator<'_> {
        ReportAggregator::new(self)
    }
}
