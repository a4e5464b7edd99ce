//! Input plugins

pub mod fake;
