//! The simplified ABI IR the analyses run over.
//!
//! Every function arrives as a small CFG of `AbiBlock`s whose instructions
//! are reduced to the four shapes the analyses care about: loads and stores
//! in an abstract (address space, offset) space, direct calls carrying their
//! stack arguments, and everything else. The IR is built once per analyzed
//! entry point by the lifter/CFG-recovery collaborators and discarded when
//! that entry point's analyses finish.

use petgraph::graph::{Graph, NodeIndex};
use petgraph::Direction;

use std::collections::BTreeSet;

use crate::middle::lattice::UnionSet;

pub type Address = u64;

/// Index of a slot in the architecture's register file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterId(pub u16);

/// Names of the architecture's register-file slots.
///
/// The analyses only ever deal in `RegisterId`s; the names exist for
/// diagnostics and to bound the "clobbers everything" set used for fake
/// functions and bootstrap summaries.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    names: Vec<String>,
}

impl RegisterFile {
    pub fn new<I, S>(names: I) -> RegisterFile
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegisterFile {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self, id: RegisterId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = RegisterId> {
        (0..self.names.len() as u16).map(RegisterId)
    }

    /// The maximal clobber set: every register in the file.
    pub fn all_registers(&self) -> UnionSet<RegisterId> {
        self.iter_ids().collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Address space of a load/store target.
///
/// `Stack` offsets are relative to the function's initial stack pointer
/// ("SP0"); `Cpu` offsets index the register file; `Global` covers
/// everything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSpace {
    Stack,
    Cpu,
    Global,
}

/// Abstract location accessed by a load or store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    pub space: AddressSpace,
    pub offset: i64,
}

impl Target {
    pub fn stack(offset: i64) -> Target {
        Target {
            space: AddressSpace::Stack,
            offset,
        }
    }

    pub fn register(id: RegisterId) -> Target {
        Target {
            space: AddressSpace::Cpu,
            offset: id.0 as i64,
        }
    }

    pub fn global(offset: i64) -> Target {
        Target {
            space: AddressSpace::Global,
            offset,
        }
    }

    /// The register this target names, if it is in the `Cpu` space.
    pub fn register_id(&self) -> Option<RegisterId> {
        if self.space == AddressSpace::Cpu {
            Some(RegisterId(self.offset as u16))
        } else {
            None
        }
    }
}

/// One ABI IR instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiOp {
    Load(Target),
    Store(Target),
    /// Direct call to `callee`, passing the stack slots in `stack_args`
    /// (SP0-relative offsets) as arguments.
    DirectCall {
        callee: Address,
        stack_args: BTreeSet<i64>,
    },
    Other,
}

/// A call site, identified by the caller block and the callee entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionCall {
    pub caller: NodeIndex,
    pub callee: Address,
}

/// Classification of a basic block, as tagged by the lifter.
///
/// Carried directly on the CFG node so the analyses never have to consult
/// the lifter's internal encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Entry,
    JumpTarget,
    Translated,
    Dispatcher,
}

/// A basic block of ABI IR: an ordered instruction sequence plus its kind.
#[derive(Clone, Debug)]
pub struct AbiBlock {
    pub kind: BlockKind,
    /// Address of the first lifted instruction, for diagnostics only.
    pub addr: Address,
    ops: Vec<AbiOp>,
}

impl AbiBlock {
    pub fn new(kind: BlockKind, addr: Address) -> AbiBlock {
        AbiBlock {
            kind,
            addr,
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self, op: AbiOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[AbiOp] {
        &self.ops
    }
}

/// The CFG of one function in ABI IR form.
#[derive(Clone, Debug, Default)]
pub struct AbiFunction {
    g: Graph<AbiBlock, ()>,
    entry: Option<NodeIndex>,
}

impl AbiFunction {
    pub fn new() -> AbiFunction {
        AbiFunction {
            g: Graph::new(),
            entry: None,
        }
    }

    /// Adds a block. The first block with `BlockKind::Entry` becomes the
    /// function entry.
    pub fn add_block(&mut self, block: AbiBlock) -> NodeIndex {
        let is_entry = block.kind == BlockKind::Entry;
        let n = self.g.add_node(block);
        if self.entry.is_none() && is_entry {
            self.entry = Some(n);
        }
        n
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        self.g.update_edge(from, to, ());
    }

    pub fn entry_node(&self) -> Option<NodeIndex> {
        self.entry
    }

    pub fn block(&self, node: NodeIndex) -> &AbiBlock {
        &self.g[node]
    }

    pub fn blocks(&self) -> Vec<NodeIndex> {
        self.g.node_indices().collect()
    }

    pub fn succs_of(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.g.neighbors_directed(node, Direction::Outgoing).collect()
    }

    pub fn preds_of(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.g.neighbors_directed(node, Direction::Incoming).collect()
    }

    /// Blocks with no outgoing edges. These act as the extremal blocks of a
    /// backward analysis.
    pub fn exit_blocks(&self) -> Vec<NodeIndex> {
        self.g
            .node_indices()
            .filter(|&n| self.succs_of(n).is_empty())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entry_and_adjacency() {
        let mut f = AbiFunction::new();
        let e = f.add_block(AbiBlock::new(BlockKind::Entry, 0x1000));
        let a = f.add_block(AbiBlock::new(BlockKind::Translated, 0x1010));
        let b = f.add_block(AbiBlock::new(BlockKind::JumpTarget, 0x1020));
        f.add_edge(e, a);
        f.add_edge(e, b);
        f.add_edge(a, b);

        assert_eq!(f.entry_node(), Some(e));
        assert_eq!(f.succs_of(e).len(), 2);
        assert_eq!(f.preds_of(b).len(), 2);
        assert_eq!(f.exit_blocks(), vec![b]);
    }

    #[test]
    fn register_targets_round_trip() {
        let t = Target::register(RegisterId(3));
        assert_eq!(t.register_id(), Some(RegisterId(3)));
        assert_eq!(Target::stack(-8).register_id(), None);
    }
}
