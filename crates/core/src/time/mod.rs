pub mod schedule;
pub mod target_date;
