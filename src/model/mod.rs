pub mod attendance;
pub mod attendance_button;
pub mod role;
pub mod tutor;
