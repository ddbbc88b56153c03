//! Utility functions and supporting infrastructure.
//!
//! Provides the error taxonomy, CHIME/FRB instrument constants and the
//! natural file-name ordering used when reading a sequence of chunks.

pub mod errors;
pub mod instrument;
pub mod natural;
