//! Backward analysis flagging call sites whose stack arguments are read by
//! the caller before being rewritten.
//!
//! The element is the set of SP0-relative offsets "read since the end of the
//! block", so each block is scanned in reverse instruction order: a stack
//! load marks its slot as read, a stack store resets coherency tracking for
//! the slot, and a direct call whose stack arguments intersect the current
//! set is incoherent — the caller passes the slot as an outgoing argument
//! yet later reads it without an intervening rewrite, so the slot was not
//! purely a call argument.

use petgraph::graph::NodeIndex;

use std::collections::BTreeSet;

use crate::analysis::monotone::{Direction, Engine, Interrupt, MonotoneAnalysis};
use crate::middle::ir::{AbiFunction, AbiOp, AddressSpace, FunctionCall};
use crate::middle::lattice::UnionSet;

#[derive(Debug, Default)]
pub struct IncoherentCalls {
    incoherent: BTreeSet<FunctionCall>,
}

impl IncoherentCalls {
    pub fn new() -> IncoherentCalls {
        IncoherentCalls {
            incoherent: BTreeSet::new(),
        }
    }

    pub fn incoherent_calls(&self) -> &BTreeSet<FunctionCall> {
        &self.incoherent
    }
}

impl MonotoneAnalysis for IncoherentCalls {
    type Element = UnionSet<i64>;

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn extremal_value(&self, _: &AbiFunction, _: NodeIndex) -> UnionSet<i64> {
        UnionSet::new()
    }

    fn transfer(
        &mut self,
        func: &AbiFunction,
        block: NodeIndex,
        state: UnionSet<i64>,
    ) -> Interrupt<UnionSet<i64>> {
        let mut result = state;
        sabre_trace!("analyzing block at {:#x}", func.block(block).addr);

        for op in func.block(block).ops().iter().rev() {
            match op {
                AbiOp::Load(tgt) if tgt.space == AddressSpace::Stack => {
                    // The last thing we know about this stack slot is that
                    // it has been read.
                    sabre_trace!("reading SP0+{}", tgt.offset);
                    result.insert(tgt.offset);
                }
                AbiOp::Store(tgt) if tgt.space == AddressSpace::Stack => {
                    // The last thing we know about this stack slot is that
                    // it has been written to.
                    sabre_trace!("writing SP0+{}", tgt.offset);
                    result.remove(&tgt.offset);
                }
                AbiOp::DirectCall { callee, stack_args } => {
                    // A stack argument read after the call but before a
                    // store is incoherent.
                    if result.contains_any_of(stack_args.iter()) {
                        sabre_warn!(
                            "call to {:#x} in block {:#x} is incoherent",
                            callee,
                            func.block(block).addr
                        );
                        self.incoherent.insert(FunctionCall {
                            caller: block,
                            callee: *callee,
                        });
                    }
                }
                _ => {}
            }
        }

        // "No predecessors" doubles as the terminal condition here. For CFGs
        // with unreachable-but-connected dead code this can misclassify
        // terminal blocks; kept as-is for compatibility with the original
        // behavior.
        if func.preds_of(block).is_empty() {
            Interrupt::Return(result)
        } else {
            Interrupt::Regular(result)
        }
    }

    fn successors(
        &self,
        func: &AbiFunction,
        block: NodeIndex,
        _: &Interrupt<UnionSet<i64>>,
    ) -> Vec<NodeIndex> {
        func.preds_of(block)
    }
}

/// Runs the analysis over one function and returns the flagged call sites.
pub fn compute_incoherent_calls(func: &AbiFunction) -> BTreeSet<FunctionCall> {
    sabre_trace!("checking coherency of stack arguments");
    let mut engine = Engine::new(func, IncoherentCalls::new());
    for block in func.exit_blocks() {
        engine.register_extremal(block);
    }
    engine.initialize();
    // The interrupt never requires interprocedural handling here; only the
    // set accumulated by the analysis matters.
    let _ = engine.run();
    engine.into_analysis().incoherent
}
