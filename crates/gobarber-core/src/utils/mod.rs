//! Date helpers for picking booking days.

pub mod date;

pub use date::{is_business_day, next_valid_day, parse_day};
