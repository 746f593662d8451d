//! Lowering the data-flow graph into a constraint model.
//!
//! One call describes *all* valid schedules, renamings, and (in loop mode)
//! pipelinings of the graph under the microarchitecture tables and the
//! current stalls budget. The solver picks one; the decoder reads it back.
//!
//! Loop mode uses a two-iteration window: every body node gets an absolute
//! position `A ∈ [0, 2N)` with its periodic copies hard-wired at `A ± N`,
//! and an absolute cycle in `[0, 2T)` for the kernel period `T`. A node is
//! `early` when `A < N` and, equivalently, when its cycle is below `T`: the
//! position window and the issue window agree, so an early node is one that
//! issues during the previous iteration's cycles and whose iteration-0 copy
//! lands before the loop (the preamble).

use crate::error::{Error, Result};
use crate::ir::{Dfg, EdgeKind, Node, Value};
use crate::isa::{ArchModel, Role, UarchModel};
use rustc_hash::FxHashMap;
use slothy_cp::{Con, LifeVal, Lifetimes, Loc, Model, UnitCap, UnitItem, Var};
use smallvec::SmallVec;

/// Solver variables of one scheduled node.
#[derive(Copy, Clone)]
pub struct NodeVars {
    /// Emission position (absolute, loop mode).
    pub pos: Var,
    /// Issue cycle (absolute, loop mode).
    pub cycle: Var,
    /// Functional-unit alternative.
    pub alt: Var,
    /// `A < N` reification, loop mode only.
    pub early: Option<Var>,
}

/// The variable maps the decoder needs to read a solution back.
pub struct Encoding {
    /// Per-node variables.
    pub node_vars: FxHashMap<Node, NodeVars>,
    /// Per-value renaming variables.
    pub value_vars: FxHashMap<Value, Var>,
    /// Number of scheduled nodes.
    pub n: usize,
    /// Kernel period in cycles (loop), or the cycle bound (straight-line).
    pub cycle_period: i32,
    /// Encoded for software pipelining.
    pub loop_mode: bool,
}

/// Encoder options for one pass.
#[derive(Copy, Clone, Default)]
pub struct EncodeOpts {
    /// Two-iteration pipelined encoding.
    pub loop_mode: bool,
    /// Minimize the number of early instructions (loop mode).
    pub minimize_early: bool,
    /// Minimize the maximum cycle instead (straight-line; rarely used, the
    /// outer stalls search is preferred).
    pub minimize_depth: bool,
}

/// Lower `dfg` into a constraint model under a stalls budget.
pub fn encode(
    dfg: &Dfg,
    arch: &dyn ArchModel,
    uarch: &dyn UarchModel,
    stalls: u32,
    opts: EncodeOpts,
) -> Result<(Model, Encoding)> {
    let nodes: Vec<Node> = dfg.real_nodes().collect();
    let n = nodes.len() as i32;
    debug_assert!(n > 0, "empty windows are handled by the driver");
    let width = uarch.issue_width();
    // Wider issue than the window is just "unbounded".
    let eff_width = width.clamp(1, n as u32) as i32;
    let period = if opts.loop_mode {
        (n + eff_width - 1) / eff_width + stalls as i32
    } else {
        n + stalls as i32
    };

    let mut model = Model::new();
    let mut node_vars: FxHashMap<Node, NodeVars> = FxHashMap::default();
    let mut alts_of: FxHashMap<Node, crate::isa::UnitAlts> = FxHashMap::default();

    // Variables: position, cycle, unit alternative, and the early flag.
    for &node in &nodes {
        let idx = dfg.nodes[node].src_index;
        let (pos_hi, cyc_hi) = if opts.loop_mode {
            (2 * n - 1, 2 * period - 1)
        } else {
            (n - 1, period - 1)
        };
        let pos = model.int_var(format!("pos[{idx}]"), 0, pos_hi);
        let cycle = model.int_var(format!("cycle[{idx}]"), 0, cyc_hi);
        let alts = uarch.units(dfg.inst(node).base());
        let alt = model.int_var(format!("unit[{idx}]"), 0, alts.len() as i32 - 1);
        let early = if opts.loop_mode {
            let early = model.bool_var(format!("early[{idx}]"));
            model.post(Con::ReifyLeq {
                b: early,
                x: pos,
                k: n - 1,
            });
            // The same flag reifies the issue window, so position and cycle
            // windows agree for every node.
            model.post(Con::ReifyLeq {
                b: early,
                x: cycle,
                k: period - 1,
            });
            Some(early)
        } else {
            None
        };
        alts_of.insert(node, alts);
        node_vars.insert(
            node,
            NodeVars {
                pos,
                cycle,
                alt,
                early,
            },
        );
    }

    // Permutation: positions are all-different (per window in loop mode).
    model.post(Con::AllDifferent {
        vars: nodes.iter().map(|&x| node_vars[&x].pos).collect(),
        modulus: opts.loop_mode.then_some(n),
    });

    // Ordering along every dependence edge.
    for edge in &dfg.edges {
        if !dfg.is_real(edge.from) || !dfg.is_real(edge.to) {
            continue;
        }
        let pv = node_vars[&edge.from];
        let cv = node_vars[&edge.to];
        model.post(Con::OffsetLeq {
            a: pv.pos,
            b: cv.pos,
            k: if edge.cross { 1 - n } else { 1 },
        });
        match edge.kind {
            EdgeKind::Register | EdgeKind::Flag | EdgeKind::Memory => {
                let producer = dfg.inst(edge.from).base();
                let consumer = dfg.inst(edge.to).base();
                let latency = uarch
                    .forward_latency(producer, consumer)
                    .unwrap_or_else(|| uarch.latency(producer))
                    as i32;
                model.post(Con::OffsetLeq {
                    a: pv.cycle,
                    b: cv.cycle,
                    k: if edge.cross { latency - period } else { latency },
                });
            }
            EdgeKind::Address => {}
        }
    }

    // Emission order refines cycle order.
    for (i, &a) in nodes.iter().enumerate() {
        for &b in nodes.iter().skip(i + 1) {
            let (va, vb) = (node_vars[&a], node_vars[&b]);
            model.post(Con::Channel {
                ca: va.cycle,
                cb: vb.cycle,
                pa: va.pos,
                pb: vb.pos,
            });
            model.post(Con::Channel {
                ca: vb.cycle,
                cb: va.cycle,
                pa: vb.pos,
                pb: va.pos,
            });
        }
    }

    // Issue width.
    if (width as i64) < n as i64 {
        model.post(Con::Capacity {
            vars: nodes.iter().map(|&x| node_vars[&x].cycle).collect(),
            cap: width,
            modulus: opts.loop_mode.then_some(period),
        });
    }

    // Functional units.
    for unit in 0..uarch.unit_count() {
        let mut items = Vec::new();
        for &node in &nodes {
            let alts = &alts_of[&node];
            let mut uses = 0u64;
            for (a, mask) in alts.iter().enumerate() {
                if mask & (1 << unit) != 0 {
                    uses |= 1 << a;
                }
            }
            if uses != 0 {
                let vars = node_vars[&node];
                items.push(UnitItem {
                    cycle: vars.cycle,
                    alt: vars.alt,
                    uses,
                });
            }
        }
        let cap = uarch.unit_capacity(unit);
        if items.len() as u32 > cap {
            model.post(Con::UnitCap(UnitCap {
                cap,
                modulus: opts.loop_mode.then_some(period),
                items,
            }));
        }
    }

    // Renaming variables, one per value.
    let mut value_vars: FxHashMap<Value, Var> = FxHashMap::default();
    for (value, data) in dfg.values.iter() {
        let var = match data.pin {
            Some(reg) => model.int_var(
                format!("reg[{value}]"),
                i32::from(reg.unit),
                i32::from(reg.unit),
            ),
            None => {
                let units: Vec<i32> = arch
                    .reg_info()
                    .allocatable(data.class)
                    .into_iter()
                    .map(i32::from)
                    .collect();
                if units.is_empty() {
                    return Err(Error::Config(format!(
                        "no allocatable {} registers for renaming",
                        data.class
                    )));
                }
                model.int_var_in(format!("reg[{value}]"), &units)
            }
        };
        value_vars.insert(value, var);
    }

    // In-place constraints: read-modify-write slots and table-tied pairs.
    for &node in &nodes {
        let inst = dfg.inst(node);
        for (slot, od) in inst.desc.operands.iter().enumerate() {
            let slot = slot as u8;
            let produced = dfg
                .produced_by(node)
                .find(|&v| dfg.values[v].slot == slot);
            let Some(produced) = produced else { continue };
            let rmw = od.role == Role::ReadWrite || od.role == Role::AddrBase;
            if rmw {
                if let Some(consumed) = dfg.consumed_at(node, slot) {
                    model.post(Con::Eq {
                        a: value_vars[&produced],
                        b: value_vars[&consumed],
                    });
                }
            }
            if let Some(tied) = od.tied {
                if let Some(consumed) = dfg.consumed_at(node, tied) {
                    model.post(Con::Eq {
                        a: value_vars[&produced],
                        b: value_vars[&consumed],
                    });
                }
            }
        }
    }

    // Register lifetimes: values sharing a unit must not overlap.
    let end_sentinel = if opts.loop_mode { 2 * n } else { n };
    let mut vals = Vec::new();
    let mut val_index: FxHashMap<Value, u32> = FxHashMap::default();
    for (value, data) in dfg.values.iter() {
        let external = data.producer == dfg.source;
        let start = if external {
            Loc::fixed(-1)
        } else {
            Loc::at(node_vars[&data.producer].pos)
        };
        let mut ends: SmallVec<[Loc; 4]> = SmallVec::new();
        for edge in dfg.consumers_of(value) {
            if edge.to == dfg.sink {
                ends.push(Loc::fixed(end_sentinel));
            } else if dfg.is_real(edge.to) {
                let pos = node_vars[&edge.to].pos;
                ends.push(if edge.cross {
                    Loc::shifted(pos, n)
                } else {
                    Loc::at(pos)
                });
            }
        }
        if opts.loop_mode && external {
            // Loop invariants stay live through every iteration.
            ends.push(Loc::fixed(end_sentinel));
        }
        if opts.loop_mode && data.output {
            ends.push(Loc::fixed(end_sentinel));
        }
        val_index.insert(value, vals.len() as u32);
        vals.push(LifeVal {
            reg: value_vars[&value],
            start,
            ends,
            external,
        });
    }
    let mut handoff = Vec::new();
    for edge in &dfg.edges {
        let Some(consumed) = edge.value else { continue };
        if !dfg.is_real(edge.to) {
            continue;
        }
        let shift = if edge.cross { n } else { 0 };
        for produced in dfg.produced_by(edge.to) {
            handoff.push((val_index[&consumed], val_index[&produced], shift));
        }
    }
    model.post(Con::Lifetimes(Lifetimes {
        period: opts.loop_mode.then_some(n),
        vals,
        handoff,
    }));

    // Objective.
    if opts.loop_mode && opts.minimize_early {
        let earlies: Vec<Var> = nodes
            .iter()
            .filter_map(|&x| node_vars[&x].early)
            .collect();
        let total = model.int_var("early_count", 0, n);
        model.post(Con::SumEq {
            vars: earlies,
            total,
        });
        model.minimize(total);
    } else if !opts.loop_mode && opts.minimize_depth {
        let makespan = model.int_var("makespan", 0, period - 1);
        for &node in &nodes {
            model.post(Con::OffsetLeq {
                a: node_vars[&node].cycle,
                b: makespan,
                k: 0,
            });
        }
        model.minimize(makespan);
    }

    log::debug!(
        "encoded {} nodes, {} values, {} constraints (stalls {stalls}, period {period})",
        nodes.len(),
        dfg.values.len(),
        model.cons.len(),
    );
    Ok((
        model,
        Encoding {
            node_vars,
            value_vars,
            n: nodes.len(),
            cycle_period: period,
            loop_mode: opts.loop_mode,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemPolicy;
    use crate::ir::{self, BuildParams, Instruction};
    use crate::isa::armv81m::Armv81m;
    use crate::isa::TableUarch;
    use indexmap::IndexMap;
    use slothy_cp::{Backtrack, Limits, Outcome, Solve};

    fn build_dfg(lines: &[&str], loop_mode: bool) -> Dfg {
        let insts: Vec<Instruction> = lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Instruction::classify(&Armv81m, text, i + 1).expect("test input classifies")
            })
            .collect();
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        ir::build(
            &Armv81m,
            insts,
            &BuildParams {
                hints: &hints,
                inputs: &inputs,
                outputs: &[],
                policy: MemPolicy::Conservative,
                keep_load_order: false,
                loop_mode,
            },
        )
        .expect("test input builds")
    }

    #[test]
    fn dependent_pair_needs_latency_minus_one_stalls() {
        let dfg = build_dfg(&["vldrw.u32 q0, [r0]", "vstrw.u32 q0, [r1]"], false);
        let uarch = TableUarch::new(1).latency("vldrw", 2).latency("vstrw", 1);
        let solver = Backtrack::new();

        let (model, _) =
            encode(&dfg, &Armv81m, &uarch, 0, EncodeOpts::default()).expect("encodes");
        assert!(matches!(
            solver.solve(&model, &Limits::default()),
            Outcome::Unsat
        ));

        let (model, enc) =
            encode(&dfg, &Armv81m, &uarch, 1, EncodeOpts::default()).expect("encodes");
        let Outcome::Sat(sol) = solver.solve(&model, &Limits::default()) else {
            panic!("expected SAT at one stall");
        };
        let nodes: Vec<Node> = dfg.real_nodes().collect();
        let c0 = sol.value(enc.node_vars[&nodes[0]].cycle);
        let c1 = sol.value(enc.node_vars[&nodes[1]].cycle);
        assert!(c1 >= c0 + 2);
    }

    #[test]
    fn independent_pair_reorders_under_unit_pressure() {
        // Both want the memory unit; issue width two alone cannot help.
        let dfg = build_dfg(&["vldrw.u32 q0, [r0]", "vldrw.u32 q1, [r1]"], false);
        let uarch = TableUarch::new(2)
            .latency("vldrw", 2)
            .units("vldrw", &[0b1]);
        let (model, enc) =
            encode(&dfg, &Armv81m, &uarch, 0, EncodeOpts::default()).expect("encodes");
        let Outcome::Sat(sol) = Backtrack::new().solve(&model, &Limits::default()) else {
            panic!("expected SAT");
        };
        let nodes: Vec<Node> = dfg.real_nodes().collect();
        let c0 = sol.value(enc.node_vars[&nodes[0]].cycle);
        let c1 = sol.value(enc.node_vars[&nodes[1]].cycle);
        assert_ne!(c0, c1);
    }

    #[test]
    fn rmw_destination_keeps_its_register() {
        let dfg = build_dfg(&["vldrw.u32 q0, [r0]", "vmla.s32 q0, q1, r2"], false);
        let uarch = TableUarch::new(1).default_latency(1);
        let (model, enc) =
            encode(&dfg, &Armv81m, &uarch, 2, EncodeOpts::default()).expect("encodes");
        let Outcome::Sat(sol) = Backtrack::new().solve(&model, &Limits::default()) else {
            panic!("expected SAT");
        };
        let nodes: Vec<Node> = dfg.real_nodes().collect();
        let consumed = dfg.consumed_at(nodes[1], 0).expect("accumulator in");
        let produced = dfg
            .produced_by(nodes[1])
            .next()
            .expect("accumulator out");
        assert_eq!(
            sol.value(enc.value_vars[&consumed]),
            sol.value(enc.value_vars[&produced])
        );
    }

    #[test]
    fn null_uarch_schedules_with_zero_stalls() {
        let dfg = build_dfg(
            &[
                "vldrw.u32 q0, [r0]",
                "vadd.i32 q1, q0, q0",
                "vstrw.u32 q1, [r1]",
            ],
            false,
        );
        let uarch = TableUarch::new(u32::MAX).default_latency(0);
        let (model, _) =
            encode(&dfg, &Armv81m, &uarch, 0, EncodeOpts::default()).expect("encodes");
        assert!(matches!(
            Backtrack::new().solve(&model, &Limits::default()),
            Outcome::Sat(_)
        ));
    }

    #[test]
    fn depth_objective_compresses_the_schedule() {
        // Two independent instructions, dual issue: minimizing the maximum
        // cycle packs them into one.
        let dfg = build_dfg(&["vadd.i32 q0, q1, q2", "veor.i32 q3, q4, q5"], false);
        let uarch = TableUarch::new(2);
        let opts = EncodeOpts {
            loop_mode: false,
            minimize_early: false,
            minimize_depth: true,
        };
        let (model, enc) = encode(&dfg, &Armv81m, &uarch, 1, opts).expect("encodes");
        let Outcome::Sat(sol) = Backtrack::new().solve(&model, &Limits::default()) else {
            panic!("expected SAT");
        };
        for node in dfg.real_nodes() {
            assert_eq!(sol.value(enc.node_vars[&node].cycle), 0);
        }
    }

    #[test]
    fn loop_encoding_is_satisfiable() {
        let dfg = build_dfg(
            &["vldrw.u32 q0, [r0], #16", "vmla.s32 q1, q0, r2"],
            true,
        );
        let uarch = TableUarch::new(1).default_latency(1);
        let opts = EncodeOpts {
            loop_mode: true,
            minimize_early: true,
            minimize_depth: false,
        };
        let (model, enc) = encode(&dfg, &Armv81m, &uarch, 1, opts).expect("encodes");
        let Outcome::Sat(sol) = Backtrack::new().solve(&model, &Limits::default()) else {
            panic!("expected SAT");
        };
        // Positions occupy distinct slots modulo the body length.
        let nodes: Vec<Node> = dfg.real_nodes().collect();
        let p0 = sol.value(enc.node_vars[&nodes[0]].pos);
        let p1 = sol.value(enc.node_vars[&nodes[1]].pos);
        assert_ne!(p0.rem_euclid(2), p1.rem_euclid(2));
    }
}
