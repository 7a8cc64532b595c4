pub mod calendar;
pub mod center_cache;
pub mod geo;
