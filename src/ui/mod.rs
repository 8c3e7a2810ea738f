pub mod board;
pub mod icons;

pub use board::{BoardUI, format_duration, format_job_line, format_summary};
