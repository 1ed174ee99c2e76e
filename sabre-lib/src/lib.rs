//! sabre-lib: interprocedural stack and ABI analysis over lifted binary IR.
//!
//! Given functions already lifted to a simplified stack-relative IR (the
//! `middle::ir` module), this crate infers, per candidate function entry
//! point, which registers the function clobbers, whether it returns at all,
//! and which of its call sites use stack slots incoherently. The heart of the
//! crate is a generic monotone dataflow engine (`analysis::monotone`); the
//! concrete analyses are small policies plugged into it.
//!
//! Lifting, CFG recovery and report serialization are not handled here; the
//! expected input is a `frontend::containers::ModuleIr` built by those
//! stages.
//!
//! To enable trace logging, compile with the `trace_log` feature and
//! initialize `env_logger` in the consumer.

#[macro_use]
extern crate log;

#[macro_use]
pub mod utils;

pub mod analysis;
pub mod frontend;
pub mod middle;
