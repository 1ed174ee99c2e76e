//! Forward analysis computing a function's clobbered registers and its ABI
//! kind.
//!
//! The element is the set of registers written on some path so far. Stores
//! into the `Cpu` address space insert the written register; a direct call
//! unions in the callee's published clobbered set, since a caller's
//! observable clobber set is a superset of its own writes plus everything
//! inherited from callees. Calls to no-return callees cut the block's
//! outgoing edges. A call whose callee has no published summary yet
//! interrupts the run so the orchestrator can resolve the dependency first.

use petgraph::graph::NodeIndex;

use std::collections::HashSet;

use crate::analysis::interproc::oracle::{Func, FunctionKind, FunctionOracle};
use crate::analysis::monotone::{Direction, Engine, Interrupt, MonotoneAnalysis};
use crate::middle::ir::{AbiFunction, AbiOp, Address, RegisterId};
use crate::middle::lattice::{Lattice, UnionSet};

pub struct ClobberAnalysis<'o, O: FunctionOracle> {
    oracle: &'o O,
    /// Blocks whose tail is unreachable because of a call to a no-return
    /// callee; their outgoing edges are dead.
    noreturn_cuts: HashSet<NodeIndex>,
    missing: Option<Address>,
}

impl<'o, O: FunctionOracle> ClobberAnalysis<'o, O> {
    pub fn new(oracle: &'o O) -> ClobberAnalysis<'o, O> {
        ClobberAnalysis {
            oracle,
            noreturn_cuts: HashSet::new(),
            missing: None,
        }
    }

    /// The callee whose missing summary interrupted the run, if any.
    pub fn missing_callee(&self) -> Option<Address> {
        self.missing
    }
}

impl<'o, O: FunctionOracle> MonotoneAnalysis for ClobberAnalysis<'o, O> {
    type Element = UnionSet<RegisterId>;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn extremal_value(&self, _: &AbiFunction, _: NodeIndex) -> UnionSet<RegisterId> {
        UnionSet::new()
    }

    fn transfer(
        &mut self,
        func: &AbiFunction,
        block: NodeIndex,
        state: UnionSet<RegisterId>,
    ) -> Interrupt<UnionSet<RegisterId>> {
        let mut result = state;
        self.noreturn_cuts.remove(&block);

        for op in func.block(block).ops() {
            match op {
                AbiOp::Store(tgt) => {
                    if let Some(reg) = tgt.register_id() {
                        result.insert(reg);
                    }
                }
                AbiOp::DirectCall { callee, .. } => match self.oracle.lookup(*callee) {
                    Some(summary) => {
                        result.join(&summary.clobbered);
                        if summary.kind == FunctionKind::NoReturn {
                            // Nothing past this call executes.
                            sabre_trace!(
                                "block {:#x} ends in no-return call to {:#x}",
                                func.block(block).addr,
                                callee
                            );
                            self.noreturn_cuts.insert(block);
                            break;
                        }
                    }
                    None => {
                        sabre_trace!("summary for callee {:#x} not yet available", callee);
                        self.missing = Some(*callee);
                        return Interrupt::Summary(result);
                    }
                },
                _ => {}
            }
        }

        if self.noreturn_cuts.contains(&block) {
            // Dead end: not a return, nothing to fold.
            Interrupt::Regular(result)
        } else if func.succs_of(block).is_empty() {
            Interrupt::Return(result)
        } else {
            Interrupt::Regular(result)
        }
    }

    fn successors(
        &self,
        func: &AbiFunction,
        block: NodeIndex,
        _: &Interrupt<UnionSet<RegisterId>>,
    ) -> Vec<NodeIndex> {
        if self.noreturn_cuts.contains(&block) {
            Vec::new()
        } else {
            func.succs_of(block)
        }
    }
}

/// Outcome of one clobber run over a function.
#[derive(Debug)]
pub enum ClobberResult {
    /// The function was fully summarized.
    Summarized(Func),
    /// A callee summary was unavailable; the orchestrator must provide it
    /// (or a bootstrap stand-in) and run again.
    MissingSummary(Address),
}

/// Computes the register-clobber summary of `func`, resolving direct calls
/// through `oracle`.
pub fn compute_register_clobbers<O: FunctionOracle>(
    func: &AbiFunction,
    oracle: &O,
) -> ClobberResult {
    let mut engine = Engine::new(func, ClobberAnalysis::new(oracle));
    if let Some(entry) = func.entry_node() {
        engine.register_extremal(entry);
    }
    engine.initialize();

    let interrupt = engine.run();
    let analysis = engine.into_analysis();
    if let Some(callee) = analysis.missing_callee() {
        return ClobberResult::MissingSummary(callee);
    }

    match interrupt {
        Interrupt::Summary(clobbered) => {
            ClobberResult::Summarized(Func::new(FunctionKind::Regular, clobbered))
        }
        // No normal return path was ever folded.
        Interrupt::NoReturn => {
            ClobberResult::Summarized(Func::new(FunctionKind::NoReturn, UnionSet::bottom()))
        }
        Interrupt::Regular(_) | Interrupt::Return(_) => {
            // run() never hands these back.
            unreachable!("engine returned a non-terminal interrupt")
        }
    }
}
