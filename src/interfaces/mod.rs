//! Input and output formats used by the command-line surface.

pub mod csv;
pub mod json;
