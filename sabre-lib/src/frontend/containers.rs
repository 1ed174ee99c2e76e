//! Whole-module container for the ABI IR of every candidate function entry
//! point, plus the call graph the orchestrator walks.
//!
//! Built by the external lifter/CFG-recovery stages; this crate only reads
//! it. Synthetic placeholders standing in for unresolved indirect targets
//! are marked fake instead of carrying IR.

use petgraph::graph::{Graph, NodeIndex};

use std::collections::{BTreeMap, BTreeSet};

use crate::middle::ir::{AbiFunction, Address, RegisterFile};

#[derive(Debug)]
pub struct ModuleIr {
    /// ABI IR per candidate entry point.
    pub functions: BTreeMap<Address, AbiFunction>,
    /// Call graph over entry points. Dependency order for the orchestrator;
    /// may under-approximate the calls actually present in the IR.
    pub callgraph: Graph<Address, ()>,
    /// Register file of the analyzed architecture.
    pub regfile: RegisterFile,
    cg_nodes: BTreeMap<Address, NodeIndex>,
    fake: BTreeSet<Address>,
}

impl ModuleIr {
    pub fn new(regfile: RegisterFile) -> ModuleIr {
        ModuleIr {
            functions: BTreeMap::new(),
            callgraph: Graph::new(),
            regfile,
            cg_nodes: BTreeMap::new(),
            fake: BTreeSet::new(),
        }
    }

    /// Registers the IR of the function at `entry` and gives it a call-graph
    /// node.
    pub fn add_function(&mut self, entry: Address, func: AbiFunction) {
        self.functions.insert(entry, func);
        self.callgraph_node(entry);
    }

    /// Marks `entry` as a synthetic placeholder for an unresolved indirect
    /// target.
    pub fn mark_fake(&mut self, entry: Address) {
        self.fake.insert(entry);
        self.callgraph_node(entry);
    }

    pub fn is_fake(&self, entry: Address) -> bool {
        self.fake.contains(&entry)
    }

    pub fn function(&self, entry: Address) -> Option<&AbiFunction> {
        self.functions.get(&entry)
    }

    /// Whether `entry` names anything the module knows about.
    pub fn is_known(&self, entry: Address) -> bool {
        self.functions.contains_key(&entry) || self.fake.contains(&entry)
    }

    pub fn add_call_edge(&mut self, caller: Address, callee: Address) {
        let c = self.callgraph_node(caller);
        let t = self.callgraph_node(callee);
        self.callgraph.update_edge(c, t, ());
    }

    fn callgraph_node(&mut self, entry: Address) -> NodeIndex {
        if let Some(&n) = self.cg_nodes.get(&entry) {
            return n;
        }
        let n = self.callgraph.add_node(entry);
        self.cg_nodes.insert(entry, n);
        n
    }
}
