//! End-to-end optimize scenarios.

use indexmap::IndexMap;
use slothy::isa::armv81m::Armv81m;
use slothy::isa::{Reg, RegClass, TableUarch, Target};
use slothy::{Config, Error, ScheduleKind, Slothy, Window};

/// The reference test model: single issue, two-cycle loads and multiplies.
fn scalar_uarch() -> TableUarch {
    TableUarch::new(1)
        .latency("vldrw", 2)
        .latency("vmla", 2)
        .latency("vstrw", 1)
}

fn engine(uarch: TableUarch, config: Config) -> Slothy {
    let target = Target {
        arch: Box::new(Armv81m),
        uarch: Box::new(uarch),
    };
    Slothy::new(target, config).expect("valid configuration")
}

#[test]
fn simple1_renames_and_schedules() {
    let source = "\
vldrw.u32 q0, [r0]
vmla.s32 q0, q1, const
vmla.s32 q0, q1, const
vstrw.u32 q0, [r1]
";
    let mut config = Config::new();
    config
        .typing_hints
        .insert("const".to_string(), RegClass::Gpr);
    let out = engine(scalar_uarch(), config)
        .optimize(source)
        .expect("optimizes");

    // The fully serial chain needs three stalls at single issue.
    assert_eq!(out.schedule.stalls, 3);
    let ScheduleKind::Straight(lines) = &out.schedule.kind else {
        panic!("straight-line schedule expected");
    };
    assert_eq!(lines.len(), 4);
    // `const` was renamed to some general-purpose register, consistently.
    let renamed: Vec<&str> = out
        .schedule
        .renames
        .iter()
        .filter(|r| r.name == "const")
        .map(|r| r.reg.as_str())
        .collect();
    assert_eq!(renamed.len(), 1);
    assert!(renamed[0].starts_with('r'));
    assert!(out.text.contains(renamed[0]));
    assert!(!out.text.contains("const"));
}

#[test]
fn simple0_straight_line_16_instructions() {
    let source = "\
vldrw.u32 q0, [inA]
vldrw.u32 q1, [inA, #16]
vldrw.u32 q2, [inB]
vldrw.u32 q3, [inB, #16]
vmla.s32 q0, q1, r2
vmla.s32 q2, q3, r2
vadd.i32 q4, q0, q2
veor.i32 q5, q0, q2
vadd.i32 q6, q4, q5
veor.i32 q7, q4, q5
vstrw.u32 q4, [r1]
vstrw.u32 q5, [r1, #16]
vstrw.u32 q6, [r3]
vstrw.u32 q7, [r3, #16]
eor r4, r2, r2
add r4, r4, r2
";
    let mut config = Config::new();
    config
        .inputs
        .insert("inA".to_string(), Some(Reg::new(RegClass::Gpr, 5)));
    config
        .inputs
        .insert("inB".to_string(), Some(Reg::new(RegClass::Gpr, 0)));
    let out = engine(scalar_uarch(), config)
        .optimize(source)
        .expect("optimizes");

    let ScheduleKind::Straight(lines) = &out.schedule.kind else {
        panic!("straight-line schedule expected");
    };
    assert_eq!(lines.len(), 16);
    assert_eq!(out.schedule.stalls, 0);

    // The permutation maps every input index to a distinct position.
    let mut positions = out.schedule.permutation.clone();
    positions.sort_unstable();
    assert_eq!(positions, (0..16).collect::<Vec<_>>());

    // The declared inputs were bound to their pinned registers.
    let ina = out
        .schedule
        .renames
        .iter()
        .find(|r| r.name == "inA")
        .expect("inA in rename table");
    assert_eq!(ina.reg, "r5");
    let inb = out
        .schedule
        .renames
        .iter()
        .find(|r| r.name == "inB")
        .expect("inB in rename table");
    assert_eq!(inb.reg, "r0");
}

#[test]
fn ambiguous_class_is_a_fatal_input_error() {
    let source = "\
vdup.u32 foo, r1
eor foo, foo, foo
";
    let result = engine(scalar_uarch(), Config::new()).optimize(source);
    assert!(matches!(result, Err(Error::AmbiguousClass { name, .. }) if name == "foo"));
}

#[test]
fn empty_window_is_returned_unchanged() {
    let out = engine(scalar_uarch(), Config::new())
        .optimize("// nothing here\n")
        .expect("optimizes");
    assert_eq!(out.schedule.stalls, 0);
    assert_eq!(out.text, "// nothing here\n");
}

#[test]
fn single_instruction_round_trips() {
    let out = engine(scalar_uarch(), Config::new())
        .optimize("vldrw.u32 q0, [r0]\n")
        .expect("optimizes");
    assert_eq!(out.schedule.stalls, 0);
    assert!(out.text.contains("vldrw.u32 q0, [r0]"));
}

#[test]
fn dependent_pair_needs_latency_minus_one_stalls() {
    let source = "vldrw.u32 q0, [r0]\nvstrw.u32 q0, [r1]\n";
    let out = engine(scalar_uarch(), Config::new())
        .optimize(source)
        .expect("optimizes");
    assert_eq!(out.schedule.stalls, 1);
}

#[test]
fn stalls_budget_is_monotonic() {
    let source = "vldrw.u32 q0, [r0]\nvstrw.u32 q0, [r1]\n";
    // Infeasible when capped below the minimum.
    let mut config = Config::new();
    config.stalls.cap = 0;
    let result = engine(scalar_uarch(), config).optimize(source);
    assert!(matches!(result, Err(Error::Infeasible { cap: 0 })));
    // Feasible at the minimum and at every larger starting budget.
    for initial in 1..4 {
        let mut config = Config::new();
        config.stalls.initial = initial;
        let out = engine(scalar_uarch(), config)
            .optimize(source)
            .expect("optimizes");
        assert_eq!(out.schedule.stalls, 1);
    }
}

#[test]
fn zero_latency_model_needs_no_stalls() {
    let source = "\
vldrw.u32 q0, [r0]
vmla.s32 q0, q1, r2
vstrw.u32 q0, [r1]
";
    let uarch = TableUarch::new(u32::MAX).default_latency(0);
    let out = engine(uarch, Config::new()).optimize(source).expect("optimizes");
    assert_eq!(out.schedule.stalls, 0);
}

#[test]
fn marked_region_leaves_surroundings_alone() {
    let source = "\
prologue:
    mov r0, r1
// slothy:start
    vldrw.u32 q0, [r0]
    vstrw.u32 q0, [r1]
// slothy:end
    bx lr
";
    let mut config = Config::new();
    config.window = Window::Markers;
    let out = engine(scalar_uarch(), config).optimize(source).expect("optimizes");
    assert!(out.text.contains("prologue:"));
    assert!(out.text.contains("mov r0, r1"));
    assert!(out.text.contains("bx lr"));
    assert!(out.text.contains("vldrw.u32 q0, [r0]"));
}

#[test]
fn loop_without_pipelining_behaves_like_straight_line() {
    let source = "\
loop:
    vldrw.u32 q0, [r0], #16
    vmla.s32 q1, q0, r2
    le lr, loop
";
    let out = engine(scalar_uarch(), Config::new())
        .optimize_loop(source, "loop")
        .expect("optimizes");
    assert!(matches!(out.schedule.kind, ScheduleKind::Straight(_)));
    assert!(out.text.contains("loop:"));
    assert!(out.text.contains("le lr, loop"));
}

#[test]
fn pipelined_loop_partitions_into_kernel() {
    let source = "\
loop:
    vldrw.u32 q0, [r0], #16
    vmla.s32 q1, q0, r2
    vstrw.u32 q1, [r1], #16
    le lr, loop
";
    let mut config = Config::new();
    config.sw_pipelining.enabled = true;
    let out = engine(scalar_uarch(), config)
        .optimize_loop(source, "loop")
        .expect("optimizes");
    let ScheduleKind::Loop {
        preamble,
        kernel,
        postamble,
    } = &out.schedule.kind
    else {
        panic!("pipelined schedule expected");
    };
    // The kernel holds exactly one copy of the body; preamble and
    // postamble hold the early instructions and their complement.
    assert_eq!(kernel.len(), 3);
    assert_eq!(preamble.len(), out.schedule.early_count as usize);
    assert_eq!(preamble.len() + postamble.len(), 3);
    // Conservative aliasing chains each store to the next iteration's
    // load, so the steady state is load, multiply, store plus two stalls.
    assert_eq!(out.schedule.stalls, 2);
    assert!(out.text.contains("loop:"));
    assert!(out.text.contains("le lr, loop"));
    // Loop-carried registers are exposed for inter-loop optimization.
    assert!(out
        .schedule
        .kernel_input_output
        .iter()
        .any(|reg| reg == "r0"));
}

#[test]
fn unrolled_pipelined_loop_doubles_the_kernel() {
    let source = "\
loop:
    vldrw.u32 q0, [r0], #16
    vstrw.u32 q0, [r1], #16
    le lr, loop
";
    let mut config = Config::new();
    config.sw_pipelining.enabled = true;
    config.sw_pipelining.unroll = 2;
    let uarch = TableUarch::new(1);
    let out = engine(uarch, config)
        .optimize_loop(source, "loop")
        .expect("optimizes");
    let ScheduleKind::Loop { kernel, .. } = &out.schedule.kind else {
        panic!("pipelined schedule expected");
    };
    assert_eq!(kernel.len(), 4);
    assert_eq!(out.schedule.stalls, 0);
}

#[test]
fn pipelined_16_instruction_chain_has_five_early_instructions() {
    // One serial dependency chain of sixteen instructions. The two long
    // latencies put the chain's span at 26 cycles against a 16-cycle
    // kernel, so the five instructions ahead of the first long edge can
    // never reach the steady-state window: exactly five must issue during
    // the previous iteration.
    let source = "\
loop:
    vldrw.u32 x0, [r0]
    vadd.i32 x1, x0, cst
    vadd.i32 x2, x1, cst
    vadd.i32 x3, x2, cst
    vqdmulh.s32 x4, x3, cst
    vadd.i32 x5, x4, cst
    vadd.i32 x6, x5, cst
    vadd.i32 x7, x6, cst
    vadd.i32 x8, x7, cst
    vqrdmulh.s32 x9, x8, cst
    vadd.i32 x10, x9, cst
    vadd.i32 x11, x10, cst
    vadd.i32 x12, x11, cst
    vadd.i32 x13, x12, cst
    vadd.i32 x14, x13, cst
    veor.i32 x15, x14, cst
    le lr, loop
";
    let mut config = Config::new();
    config.sw_pipelining.enabled = true;
    let uarch = TableUarch::new(1)
        .latency("vqdmulh", 7)
        .latency("vqrdmulh", 6);
    let out = engine(uarch, config)
        .optimize_loop(source, "loop")
        .expect("optimizes");
    let ScheduleKind::Loop {
        preamble, kernel, ..
    } = &out.schedule.kind
    else {
        panic!("pipelined schedule expected");
    };
    assert_eq!(kernel.len(), 16);
    assert_eq!(out.schedule.stalls, 0);
    // The objective value is the early-instruction count.
    assert_eq!(out.schedule.early_count, 5);
    assert_eq!(preamble.len(), 5);
}

#[test]
fn deep_chain_loop_needs_three_stalls() {
    // The body is a single chain spanning 12 cycles of latency; a period of
    // at least 7 is needed for the chain to fit in two adjacent windows, so
    // the ladder runs 0, 1, 2, 4 and the tightening descent settles on 3.
    let source = "\
loop:
    vldrw.u32 t, [r0]
    vmul.i32 u, t, cst
    vadd.i32 v, u, cst
    vshr.s32 w, v, #1
    le lr, loop
";
    let mut config = Config::new();
    config.sw_pipelining.enabled = true;
    config
        .typing_hints
        .insert("cst".to_string(), RegClass::Vec);
    let uarch = TableUarch::new(1)
        .latency("vldrw", 5)
        .latency("vmul", 4)
        .latency("vadd", 3);
    let out = engine(uarch, config)
        .optimize_loop(source, "loop")
        .expect("optimizes");
    let ScheduleKind::Loop { kernel, .. } = &out.schedule.kind else {
        panic!("pipelined schedule expected");
    };
    assert_eq!(kernel.len(), 4);
    assert_eq!(out.schedule.stalls, 3);
    // The load and the multiply sit ahead of the long edges: both must
    // issue during the previous iteration.
    assert_eq!(out.schedule.early_count, 2);
}

#[test]
fn unrolling_the_deep_chain_removes_all_stalls() {
    // The same body as above: two unrolled copies interleave, the window
    // doubles, and the 12-cycle chain fits with no stalls at all.
    let source = "\
loop:
    vldrw.u32 t, [r0]
    vmul.i32 u, t, cst
    vadd.i32 v, u, cst
    vshr.s32 w, v, #1
    le lr, loop
";
    let mut config = Config::new();
    config.sw_pipelining.enabled = true;
    config.sw_pipelining.unroll = 2;
    config
        .typing_hints
        .insert("cst".to_string(), RegClass::Vec);
    let uarch = TableUarch::new(1)
        .latency("vldrw", 5)
        .latency("vmul", 4)
        .latency("vadd", 3);
    let out = engine(uarch, config)
        .optimize_loop(source, "loop")
        .expect("optimizes");
    let ScheduleKind::Loop { kernel, .. } = &out.schedule.kind else {
        panic!("pipelined schedule expected");
    };
    assert_eq!(kernel.len(), 8);
    assert_eq!(out.schedule.stalls, 0);
}

#[test]
fn forwarding_exception_tightens_the_chain() {
    // Two chained multiply-accumulates: two-cycle latency normally, but a
    // one-cycle accumulator forwarding path removes the stall.
    let source = "\
vmla.s32 q0, q1, r2
vmla.s32 q0, q3, r4
";
    let plain = scalar_uarch();
    let out = engine(plain, Config::new()).optimize(source).expect("optimizes");
    assert_eq!(out.schedule.stalls, 1);

    let forwarding = scalar_uarch().forward("vmla", "vmla", 1);
    let out = engine(forwarding, Config::new())
        .optimize(source)
        .expect("optimizes");
    assert_eq!(out.schedule.stalls, 0);
}
