//! Utility macros shared by the rest of the crate.

#[macro_use]
pub mod logger;
