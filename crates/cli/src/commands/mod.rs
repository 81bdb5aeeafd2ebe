//! CLI command implementations

pub mod check;
pub mod estimate;
pub mod live;
