//! Dataflow analyses over the ABI IR and their interprocedural driver.

pub mod clobber;
pub mod incoherent_calls;
pub mod interproc;
pub mod monotone;
