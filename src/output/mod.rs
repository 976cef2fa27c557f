//! Result reporting
//!
//! - [`text`]: console summary
//! - [`json`]: machine-readable report file

pub mod json;
pub mod text;
