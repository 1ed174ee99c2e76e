//! Runs the full CFEP pipeline on a small hand-built module: a leaf callee,
//! a no-return helper, and a caller exercising clobber inheritance and an
//! incoherent stack argument.

use sabre_lib::analysis::interproc::cfep::CfepAnalyzer;
use sabre_lib::analysis::interproc::oracle::{FunctionKind, FunctionOracle};
use sabre_lib::frontend::containers::ModuleIr;
use sabre_lib::middle::ir::{
    AbiBlock, AbiFunction, AbiOp, BlockKind, RegisterFile, RegisterId, Target,
};

const LEAF: u64 = 0x2000;
const PANIC_HELPER: u64 = 0x3000;
const MAIN: u64 = 0x1000;

fn build_module() -> ModuleIr {
    let mut module = ModuleIr::new(RegisterFile::new(vec![
        "r0", "r1", "r2", "r3", "sp", "lr",
    ]));

    // Leaf: writes r1, returns.
    let mut leaf = AbiFunction::new();
    let mut b = AbiBlock::new(BlockKind::Entry, LEAF);
    b.push(AbiOp::Store(Target::register(RegisterId(1))));
    leaf.add_block(b);
    module.add_function(LEAF, leaf);

    // Panic helper: spins forever, never returns.
    let mut helper = AbiFunction::new();
    let entry = helper.add_block(AbiBlock::new(BlockKind::Entry, PANIC_HELPER));
    helper.add_edge(entry, entry);
    module.add_function(PANIC_HELPER, helper);

    // Main: entry stores a stack argument and calls leaf, then either
    // reloads the same slot (incoherent) and returns, or calls the panic
    // helper.
    let mut main = AbiFunction::new();
    let mut b = AbiBlock::new(BlockKind::Entry, MAIN);
    b.push(AbiOp::Store(Target::register(RegisterId(2))));
    b.push(AbiOp::Store(Target::stack(0)));
    b.push(AbiOp::DirectCall {
        callee: LEAF,
        stack_args: vec![0].into_iter().collect(),
    });
    let entry = main.add_block(b);
    let mut b = AbiBlock::new(BlockKind::JumpTarget, MAIN + 0x10);
    b.push(AbiOp::Load(Target::stack(0)));
    let ret = main.add_block(b);
    let mut b = AbiBlock::new(BlockKind::JumpTarget, MAIN + 0x20);
    b.push(AbiOp::DirectCall {
        callee: PANIC_HELPER,
        stack_args: Default::default(),
    });
    let dead = main.add_block(b);
    main.add_edge(entry, ret);
    main.add_edge(entry, dead);
    module.add_function(MAIN, main);

    module.add_call_edge(MAIN, LEAF);
    module.add_call_edge(MAIN, PANIC_HELPER);
    module
}

#[test]
fn summarizes_a_three_function_module() {
    let module = build_module();
    let mut analyzer = CfepAnalyzer::new(&module);
    analyzer.analyze_all();

    assert!(analyzer.failures().is_empty());

    let leaf = analyzer.report(LEAF).expect("leaf summarized");
    assert_eq!(leaf.summary.kind, FunctionKind::Regular);
    assert!(leaf.summary.clobbered.contains(&RegisterId(1)));

    let helper = analyzer.report(PANIC_HELPER).expect("helper summarized");
    assert_eq!(helper.summary.kind, FunctionKind::NoReturn);

    let main = analyzer.report(MAIN).expect("main summarized");
    // Main returns through `ret`, so the helper's dead end does not make it
    // no-return.
    assert_eq!(main.summary.kind, FunctionKind::Regular);
    // Own write plus the leaf's clobber.
    assert!(main.summary.clobbered.contains(&RegisterId(1)));
    assert!(main.summary.clobbered.contains(&RegisterId(2)));

    // The reload of SP0+0 after passing it to leaf flags the call site.
    assert_eq!(main.incoherent_calls.len(), 1);
    let call = main.incoherent_calls.iter().next().unwrap();
    assert_eq!(call.callee, LEAF);

    // Summaries were published to the oracle as well.
    assert!(analyzer.oracle().lookup(MAIN).is_some());
    assert_eq!(analyzer.oracle().len(), 3);
}
