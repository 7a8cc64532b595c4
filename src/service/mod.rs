//! Attendance rules and read-side aggregation, built on the store traits.

pub mod gate;
pub mod report;

pub use gate::{AttendanceGate, GateRejection};
pub use report::ReportAggregator;
