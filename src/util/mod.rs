mod format;
pub mod path;

pub use format::{format_elapsed, format_timestamp, plural};
