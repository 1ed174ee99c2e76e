//! Orchestrates the analysis of candidate function entry points (CFEPs).
//!
//! Entry points are processed callee-first over the call graph, so that a
//! caller usually finds every callee summary already published. When the
//! clobber analysis still interrupts on a missing summary — a recursive
//! chain, or a call graph that under-approximates the IR — the orchestrator
//! resolves the dependency with a conservative bootstrap summary ("assume
//! nothing proven safe") held in a side table, which keeps the published
//! store write-once. Malformed input fails the single entry point being
//! analyzed and the worklist moves on.

use petgraph::visit::{DfsPostOrder, Walker};
use thiserror::Error;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::analysis::clobber::{compute_register_clobbers, ClobberResult};
use crate::analysis::incoherent_calls::compute_incoherent_calls;
use crate::analysis::interproc::oracle::{Func, FunctionKind, FunctionOracle, SummaryStore};
use crate::frontend::containers::ModuleIr;
use crate::middle::ir::{Address, FunctionCall};

/// Why one entry point could not be summarized. Never aborts the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("no IR available for entry point {0:#x}")]
    MissingIr(Address),
    #[error("function at {0:#x} has no entry block")]
    EmptyFunction(Address),
    #[error("call from {caller:#x} to unresolvable target {callee:#x}")]
    UnknownCallee { caller: Address, callee: Address },
}

/// Everything the analyses produced for one entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionReport {
    pub summary: Func,
    pub incoherent_calls: BTreeSet<FunctionCall>,
}

/// Oracle view handed to the clobber analysis: published summaries first,
/// bootstrap stand-ins second.
struct OracleView<'a> {
    store: &'a SummaryStore,
    bootstrap: &'a BTreeMap<Address, Func>,
}

impl<'a> FunctionOracle for OracleView<'a> {
    fn lookup(&self, entry: Address) -> Option<&Func> {
        self.store.lookup(entry).or_else(|| self.bootstrap.get(&entry))
    }
}

pub struct CfepAnalyzer<'m> {
    module: &'m ModuleIr,
    store: SummaryStore,
    /// Conservative summaries injected for recursive chains and failed
    /// callees. Never published.
    bootstrap: BTreeMap<Address, Func>,
    reports: BTreeMap<Address, FunctionReport>,
    failures: BTreeMap<Address, AnalysisError>,
    /// Entry points currently on the analysis stack.
    active: HashSet<Address>,
}

impl<'m> CfepAnalyzer<'m> {
    pub fn new(module: &'m ModuleIr) -> CfepAnalyzer<'m> {
        CfepAnalyzer {
            module,
            store: SummaryStore::new(),
            bootstrap: BTreeMap::new(),
            reports: BTreeMap::new(),
            failures: BTreeMap::new(),
            active: HashSet::new(),
        }
    }

    /// Analyzes every known entry point, callees before callers where the
    /// call graph is acyclic.
    pub fn analyze_all(&mut self) {
        let module = self.module;
        let mut dfs_wi = DfsPostOrder::empty(&module.callgraph).iter(&module.callgraph);
        for ni in module.callgraph.node_indices() {
            dfs_wi.inner_mut().move_to(ni);
            while let Some(n) = dfs_wi.next() {
                let entry = module.callgraph[n];
                self.analyze_entry(entry);
            }
        }
    }

    /// Analyzes one entry point (and, transitively, the callees it still
    /// needs). Idempotent.
    pub fn analyze_entry(&mut self, entry: Address) {
        if self.reports.contains_key(&entry) || self.failures.contains_key(&entry) {
            return;
        }
        if !self.active.insert(entry) {
            return;
        }
        sabre_trace!("analyzing CFEP {:#x}", entry);
        let outcome = self.analyze_one(entry);
        self.active.remove(&entry);

        match outcome {
            Ok(report) => {
                if !self.store.try_publish(entry, report.summary.clone()) {
                    sabre_warn!("entry point {:#x} summarized twice", entry);
                }
                self.reports.insert(entry, report);
            }
            Err(err) => {
                sabre_err!("could not summarize {:#x}: {}", entry, err);
                // Callers of a failed entry point still need something to
                // look up; give them the conservative stand-in.
                let fallback = self.conservative_summary();
                self.bootstrap.entry(entry).or_insert(fallback);
                self.failures.insert(entry, err);
            }
        }
    }

    pub fn report(&self, entry: Address) -> Option<&FunctionReport> {
        self.reports.get(&entry)
    }

    pub fn reports(&self) -> &BTreeMap<Address, FunctionReport> {
        &self.reports
    }

    pub fn failures(&self) -> &BTreeMap<Address, AnalysisError> {
        &self.failures
    }

    pub fn oracle(&self) -> &SummaryStore {
        &self.store
    }

    pub fn into_results(
        self,
    ) -> (
        BTreeMap<Address, FunctionReport>,
        BTreeMap<Address, AnalysisError>,
    ) {
        (self.reports, self.failures)
    }

    fn analyze_one(&mut self, entry: Address) -> Result<FunctionReport, AnalysisError> {
        let module = self.module;

        if module.is_fake(entry) {
            // Placeholder for an unresolved indirect target: assume it
            // clobbers everything.
            return Ok(FunctionReport {
                summary: Func::new(FunctionKind::Fake, module.regfile.all_registers()),
                incoherent_calls: BTreeSet::new(),
            });
        }

        let func = module
            .function(entry)
            .ok_or(AnalysisError::MissingIr(entry))?;
        if func.entry_node().is_none() {
            return Err(AnalysisError::EmptyFunction(entry));
        }

        loop {
            let result = {
                let view = OracleView {
                    store: &self.store,
                    bootstrap: &self.bootstrap,
                };
                compute_register_clobbers(func, &view)
            };

            match result {
                ClobberResult::Summarized(summary) => {
                    return Ok(FunctionReport {
                        summary,
                        incoherent_calls: compute_incoherent_calls(func),
                    });
                }
                ClobberResult::MissingSummary(callee) => {
                    self.resolve_dependency(entry, callee)?;
                }
            }
        }
    }

    /// Makes `callee` resolvable through the oracle view, or fails the
    /// caller. Each callee needs this at most once, so the retry loop in
    /// `analyze_one` terminates.
    fn resolve_dependency(&mut self, caller: Address, callee: Address) -> Result<(), AnalysisError> {
        if !self.module.is_known(callee) {
            return Err(AnalysisError::UnknownCallee { caller, callee });
        }

        if callee == caller || self.active.contains(&callee) {
            // Recursive chain; bootstrap it conservatively.
            sabre_trace!(
                "recursion through {:#x}, injecting bootstrap summary",
                callee
            );
            let bootstrap = self.conservative_summary();
            self.bootstrap.entry(callee).or_insert(bootstrap);
            return Ok(());
        }

        // The call graph missed this dependency; analyze the callee now.
        self.analyze_entry(callee);
        if self.store.lookup(callee).is_none() && !self.bootstrap.contains_key(&callee) {
            let fallback = self.conservative_summary();
            self.bootstrap.insert(callee, fallback);
        }
        Ok(())
    }

    /// "Assume nothing proven safe": a regular function clobbering the whole
    /// register file.
    fn conservative_summary(&self) -> Func {
        Func::new(FunctionKind::Regular, self.module.regfile.all_registers())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::middle::ir::{
        AbiBlock, AbiFunction, AbiOp, BlockKind, RegisterFile, RegisterId, Target,
    };

    fn regfile() -> RegisterFile {
        RegisterFile::new(vec!["r0", "r1", "r2", "r3", "r4", "r5"])
    }

    fn store_reg(r: u16) -> AbiOp {
        AbiOp::Store(Target::register(RegisterId(r)))
    }

    fn call(callee: Address) -> AbiOp {
        AbiOp::DirectCall {
            callee,
            stack_args: Default::default(),
        }
    }

    fn single_block_fn(addr: Address, ops: Vec<AbiOp>) -> AbiFunction {
        let mut f = AbiFunction::new();
        let mut b = AbiBlock::new(BlockKind::Entry, addr);
        for op in ops {
            b.push(op);
        }
        f.add_block(b);
        f
    }

    /// Single entry block with a self edge: the function never returns.
    fn looping_fn(addr: Address) -> AbiFunction {
        let mut f = AbiFunction::new();
        let entry = f.add_block(AbiBlock::new(BlockKind::Entry, addr));
        f.add_edge(entry, entry);
        f
    }

    #[test]
    fn clobbers_propagate_from_callee_to_caller() {
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x2000, single_block_fn(0x2000, vec![store_reg(1)]));
        module.add_function(0x1000, single_block_fn(0x1000, vec![store_reg(2), call(0x2000)]));
        module.add_call_edge(0x1000, 0x2000);

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        let h = &analyzer.report(0x1000).unwrap().summary;
        assert_eq!(h.kind, FunctionKind::Regular);
        assert!(h.clobbered.contains(&RegisterId(1)));
        assert!(h.clobbered.contains(&RegisterId(2)));
    }

    #[test]
    fn missing_callgraph_edge_still_resolves() {
        // Same shape, but the call graph never records h -> g.
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x2000, single_block_fn(0x2000, vec![store_reg(1)]));
        module.add_function(0x1000, single_block_fn(0x1000, vec![call(0x2000)]));

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        let h = &analyzer.report(0x1000).unwrap().summary;
        assert!(h.clobbered.contains(&RegisterId(1)));
    }

    #[test]
    fn self_recursion_bootstraps_and_terminates() {
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x1000, single_block_fn(0x1000, vec![store_reg(0), call(0x1000)]));
        module.add_call_edge(0x1000, 0x1000);

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        let f = &analyzer.report(0x1000).unwrap().summary;
        // The bootstrap assumes the whole register file is clobbered.
        assert_eq!(f.clobbered.len(), module.regfile.len());
        assert!(analyzer.failures().is_empty());
    }

    #[test]
    fn mutual_recursion_terminates() {
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x1000, single_block_fn(0x1000, vec![call(0x2000)]));
        module.add_function(0x2000, single_block_fn(0x2000, vec![call(0x1000)]));
        module.add_call_edge(0x1000, 0x2000);
        module.add_call_edge(0x2000, 0x1000);

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        assert!(analyzer.report(0x1000).is_some());
        assert!(analyzer.report(0x2000).is_some());
        assert!(analyzer.failures().is_empty());
    }

    #[test]
    fn fake_entry_points_clobber_everything() {
        let mut module = ModuleIr::new(regfile());
        module.mark_fake(0x3000);
        module.add_function(0x1000, single_block_fn(0x1000, vec![call(0x3000)]));
        module.add_call_edge(0x1000, 0x3000);

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        let fake = &analyzer.report(0x3000).unwrap().summary;
        assert_eq!(fake.kind, FunctionKind::Fake);
        assert_eq!(fake.clobbered.len(), module.regfile.len());

        // The caller inherits the maximal set.
        let caller = &analyzer.report(0x1000).unwrap().summary;
        assert_eq!(caller.clobbered.len(), module.regfile.len());
    }

    #[test]
    fn calls_into_noreturn_helpers_classify_noreturn() {
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x2000, looping_fn(0x2000));
        module.add_function(0x1000, single_block_fn(0x1000, vec![call(0x2000)]));
        module.add_call_edge(0x1000, 0x2000);

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        let helper = &analyzer.report(0x2000).unwrap().summary;
        assert_eq!(helper.kind, FunctionKind::NoReturn);
        let caller = &analyzer.report(0x1000).unwrap().summary;
        assert_eq!(caller.kind, FunctionKind::NoReturn);
    }

    #[test]
    fn unknown_callee_fails_only_that_entry_point() {
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x1000, single_block_fn(0x1000, vec![call(0xdead)]));
        module.add_function(0x2000, single_block_fn(0x2000, vec![store_reg(3)]));

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        assert_eq!(
            analyzer.failures().get(&0x1000),
            Some(&AnalysisError::UnknownCallee {
                caller: 0x1000,
                callee: 0xdead
            })
        );
        assert!(analyzer.report(0x2000).is_some());
    }

    #[test]
    fn failed_callee_degrades_the_caller_conservatively() {
        // g calls an unresolvable target and fails; h calls g and still gets
        // a summary, with the bootstrap's maximal clobber set.
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x2000, single_block_fn(0x2000, vec![call(0xdead)]));
        module.add_function(0x1000, single_block_fn(0x1000, vec![call(0x2000)]));
        module.add_call_edge(0x1000, 0x2000);

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        assert!(analyzer.failures().contains_key(&0x2000));
        let h = &analyzer.report(0x1000).unwrap().summary;
        assert_eq!(h.clobbered.len(), module.regfile.len());
    }

    #[test]
    fn incoherent_calls_surface_in_the_report() {
        let mut module = ModuleIr::new(regfile());
        module.add_function(0x2000, single_block_fn(0x2000, vec![]));
        module.add_function(
            0x1000,
            single_block_fn(
                0x1000,
                vec![
                    AbiOp::Store(Target::stack(0)),
                    AbiOp::DirectCall {
                        callee: 0x2000,
                        stack_args: vec![0].into_iter().collect(),
                    },
                    AbiOp::Load(Target::stack(0)),
                ],
            ),
        );
        module.add_call_edge(0x1000, 0x2000);

        let mut analyzer = CfepAnalyzer::new(&module);
        analyzer.analyze_all();

        let report = analyzer.report(0x1000).unwrap();
        assert_eq!(report.incoherent_calls.len(), 1);
        assert_eq!(
            report.incoherent_calls.iter().next().map(|c| c.callee),
            Some(0x2000)
        );
    }
}
