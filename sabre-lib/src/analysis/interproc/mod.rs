//! Interprocedural layer: function summaries, the write-once oracle, and
//! the per-CFEP orchestration driving the intraprocedural analyses.

pub mod cfep;
pub mod oracle;
