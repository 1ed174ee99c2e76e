//! Generic monotone dataflow framework.
//!
//! One engine, parameterized over a `MonotoneAnalysis` policy, drives every
//! analysis in this crate: a worklist of blocks is processed in post-order
//! over the chosen traversal direction, each popped block goes through the
//! policy's transfer function, and the produced value is joined into the
//! pending input of every direction-appropriate successor. Successors whose
//! input strictly grows are re-enqueued. The lattices involved have finite
//! height per function and every transfer is monotone, so the loop
//! terminates.
//!
//! Analyzing a block yields an `Interrupt`. `Regular` and `Return` stay
//! inside the engine; `NoReturn` and `Summary` escape `run()` immediately
//! because resolving them (an unavailable callee summary, the function's own
//! recursion) is the orchestrator's job, not the engine's.

use petgraph::graph::NodeIndex;

use std::collections::{BTreeSet, HashMap};

use crate::middle::ir::AbiFunction;
use crate::middle::lattice::Lattice;

/// Traversal direction of an analysis over the CFG.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Result of analyzing one basic block (or of a whole `run()`).
///
/// `Regular` and `Return` carry the post-block lattice value; `Return`
/// additionally folds into the analysis' final result (several terminal
/// blocks are possible). `NoReturn` and `Summary` signal that
/// interprocedural handling, not local merging, is required.
#[derive(Clone, Debug)]
pub enum Interrupt<E> {
    Regular(E),
    Return(E),
    NoReturn,
    Summary(E),
}

impl<E> Interrupt<E> {
    pub fn requires_interprocedural_handling(&self) -> bool {
        match self {
            Interrupt::Regular(_) | Interrupt::Return(_) => false,
            Interrupt::NoReturn | Interrupt::Summary(_) => true,
        }
    }

    pub fn is_part_of_final_results(&self) -> bool {
        matches!(self, Interrupt::Return(_))
    }

    pub fn extract_result(self) -> Option<E> {
        match self {
            Interrupt::Regular(e) | Interrupt::Return(e) | Interrupt::Summary(e) => Some(e),
            Interrupt::NoReturn => None,
        }
    }
}

/// Policy implemented by each concrete analysis.
///
/// A value satisfying this trait is handed to `Engine::new`; no dispatch
/// hierarchy is involved. `successors` receives the interrupt `transfer`
/// produced for the block so an analysis can cut edges that the interrupt
/// proves dead (e.g. past a call to a no-return function).
pub trait MonotoneAnalysis {
    type Element: Lattice;

    fn direction(&self) -> Direction;

    /// Initial value for an extremal block.
    fn extremal_value(&self, func: &AbiFunction, block: NodeIndex) -> Self::Element;

    /// Computes the post-state of `block` starting from `state`.
    ///
    /// `state` is a copy of the block's recorded input; the engine keeps the
    /// original, so the transfer is free to mutate and move its copy out.
    fn transfer(
        &mut self,
        func: &AbiFunction,
        block: NodeIndex,
        state: Self::Element,
    ) -> Interrupt<Self::Element>;

    /// Blocks the value produced for `block` flows into, in the traversal
    /// direction.
    fn successors(
        &self,
        func: &AbiFunction,
        block: NodeIndex,
        interrupt: &Interrupt<Self::Element>,
    ) -> Vec<NodeIndex>;
}

/// The fixpoint engine. One instance processes exactly one function's IR.
#[derive(Debug)]
pub struct Engine<'f, A: MonotoneAnalysis> {
    func: &'f AbiFunction,
    analysis: A,
    extremals: Vec<NodeIndex>,
    /// Pending input value per block.
    state: HashMap<NodeIndex, A::Element>,
    /// Worklist keyed by post-order rank, so ties pop in traversal order.
    worklist: BTreeSet<(usize, NodeIndex)>,
    rank: HashMap<NodeIndex, usize>,
    final_result: Option<A::Element>,
}

impl<'f, A: MonotoneAnalysis> Engine<'f, A> {
    pub fn new(func: &'f AbiFunction, analysis: A) -> Engine<'f, A> {
        Engine {
            func,
            analysis,
            extremals: Vec::new(),
            state: HashMap::new(),
            worklist: BTreeSet::new(),
            rank: HashMap::new(),
            final_result: None,
        }
    }

    /// Registers `block` as a source of the initial value.
    pub fn register_extremal(&mut self, block: NodeIndex) {
        self.extremals.push(block);
    }

    /// Seeds the worklist with the extremal blocks at their initial values.
    pub fn initialize(&mut self) {
        self.compute_ranks();
        for i in 0..self.extremals.len() {
            let block = self.extremals[i];
            let value = self.analysis.extremal_value(self.func, block);
            self.state.insert(block, value);
            self.enqueue(block);
        }
    }

    /// Runs to a fixpoint.
    ///
    /// Returns `Summary` with the join of all `Return` values once the
    /// worklist empties, `NoReturn` if no block ever returned, or the first
    /// interrupt a transfer raised that requires interprocedural handling.
    pub fn run(&mut self) -> Interrupt<A::Element> {
        while let Some(&(rank, block)) = self.worklist.iter().next() {
            self.worklist.remove(&(rank, block));

            let input = match self.state.get(&block) {
                Some(s) => s.clone(),
                None => {
                    sabre_err!("block {:?} queued without a pending input", block);
                    A::Element::bottom()
                }
            };

            sabre_trace!("transfer of block {:?}", block);
            let interrupt = self.analysis.transfer(self.func, block, input);

            if interrupt.requires_interprocedural_handling() {
                return interrupt;
            }

            if interrupt.is_part_of_final_results() {
                if let Interrupt::Return(value) = interrupt {
                    match self.final_result.as_mut() {
                        Some(result) => {
                            result.join(&value);
                        }
                        None => self.final_result = Some(value),
                    }
                }
                continue;
            }

            let value = match interrupt {
                Interrupt::Regular(ref v) => v.clone(),
                _ => unreachable!(),
            };
            for succ in self.analysis.successors(self.func, block, &interrupt) {
                self.propagate(succ, &value);
            }
        }

        match self.final_result.take() {
            Some(result) => Interrupt::Summary(result),
            None => Interrupt::NoReturn,
        }
    }

    /// Consumes the engine, handing back the analysis with whatever it
    /// accumulated (flagged calls, missing callees, ...).
    pub fn into_analysis(self) -> A {
        self.analysis
    }

    fn propagate(&mut self, block: NodeIndex, value: &A::Element) {
        let first_visit = !self.state.contains_key(&block);
        let pending = self
            .state
            .entry(block)
            .or_insert_with(A::Element::bottom);
        let grew = pending.join(value);
        // A join that is not an upper bound of its inputs breaks the
        // termination argument; catch it right away in debug builds.
        debug_assert!(
            value.lower_or_equal(pending),
            "join produced a value not >= its input"
        );
        if first_visit || grew {
            self.enqueue(block);
        }
    }

    fn enqueue(&mut self, block: NodeIndex) {
        let rank = *self.rank.get(&block).unwrap_or(&usize::MAX);
        self.worklist.insert((rank, block));
    }

    /// Iterative DFS post-order over the traversal direction, starting from
    /// the registered extremals. Blocks unreachable from any extremal keep
    /// rank `usize::MAX` and pop last if they are ever enqueued.
    fn compute_ranks(&mut self) {
        let mut next_rank = 0usize;
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = Vec::new();
        for &root in &self.extremals {
            if self.rank.contains_key(&root) {
                continue;
            }
            stack.push((root, self.directed_succs(root)));
            while let Some((node, mut pending)) = stack.pop() {
                match pending.pop() {
                    Some(next) => {
                        stack.push((node, pending));
                        if !self.rank.contains_key(&next)
                            && !stack.iter().any(|&(n, _)| n == next)
                        {
                            stack.push((next, self.directed_succs(next)));
                        }
                    }
                    None => {
                        self.rank.entry(node).or_insert_with(|| {
                            let r = next_rank;
                            next_rank += 1;
                            r
                        });
                    }
                }
            }
        }
    }

    fn directed_succs(&self, block: NodeIndex) -> Vec<NodeIndex> {
        match self.analysis.direction() {
            Direction::Forward => self.func.succs_of(block),
            Direction::Backward => self.func.preds_of(block),
        }
    }
}
