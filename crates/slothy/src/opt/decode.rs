//! Turning a satisfying assignment back into concrete assembly.
//!
//! The decoder substitutes every register operand with the unit the solver
//! chose for its value, re-emits instructions in position order, and
//! attaches a cycle-glyph comment per line (`*` issue slot, `.` idle, `e`
//! early instruction). In loop mode it also partitions the two-iteration
//! window into preamble, kernel, and postamble.

use crate::ir::{Dfg, Instruction, Node, Operand, RegName};
use crate::isa::{ArchModel, Reg};
use crate::opt::model::Encoding;
use slothy_cp::Assignment;

/// One emitted instruction.
pub struct ScheduledInst {
    /// Index of the instruction in the input window (body index in loop
    /// mode).
    pub src_index: usize,
    /// Which modeled iteration this occurrence belongs to (loop mode).
    pub iteration: u8,
    /// Rendered assembly text, registers substituted.
    pub text: String,
    /// Cycle glyph string.
    pub glyph: String,
    /// Issue cycle (residue within the kernel period in loop mode).
    pub cycle: i32,
    /// Lifted into the previous iteration's window.
    pub early: bool,
}

/// The emitted program shape.
pub enum ScheduleKind {
    /// A straight-line block.
    Straight(Vec<ScheduledInst>),
    /// A software-pipelined loop.
    Loop {
        /// Early instructions of iteration 0, before the loop.
        preamble: Vec<ScheduledInst>,
        /// The steady-state body.
        kernel: Vec<ScheduledInst>,
        /// Late instructions of the final iteration, after the loop.
        postamble: Vec<ScheduledInst>,
    },
}

/// One renamed symbolic register.
pub struct RenameEntry {
    /// The symbolic name.
    pub name: String,
    /// Window index of the defining instruction; `None` for inputs.
    pub def_index: Option<usize>,
    /// The chosen architectural register.
    pub reg: String,
}

/// The durable artifact of one successful optimize call.
pub struct Schedule {
    /// The emitted shape.
    pub kind: ScheduleKind,
    /// Stalls budget the schedule was found at.
    pub stalls: u32,
    /// Highest issue cycle (kernel period in loop mode).
    pub makespan: i32,
    /// Input window index to output listing (kernel) index.
    pub permutation: Vec<usize>,
    /// Number of early instructions (loop mode).
    pub early_count: u32,
    /// Renaming table for symbolic registers.
    pub renames: Vec<RenameEntry>,
    /// Registers live into and out of the kernel (loop mode).
    pub kernel_input_output: Vec<String>,
}

impl Schedule {
    /// The schedule of an empty window.
    pub fn empty() -> Self {
        Schedule {
            kind: ScheduleKind::Straight(Vec::new()),
            stalls: 0,
            makespan: 0,
            permutation: Vec::new(),
            early_count: 0,
            renames: Vec::new(),
            kernel_input_output: Vec::new(),
        }
    }

    /// All emitted instructions in listing order.
    pub fn listing(&self) -> Vec<&ScheduledInst> {
        match &self.kind {
            ScheduleKind::Straight(lines) => lines.iter().collect(),
            ScheduleKind::Loop {
                preamble,
                kernel,
                postamble,
            } => preamble
                .iter()
                .chain(kernel.iter())
                .chain(postamble.iter())
                .collect(),
        }
    }
}

/// Substitute the assigned registers into one node's instruction.
fn renamed_inst(
    dfg: &Dfg,
    enc: &Encoding,
    asg: &Assignment,
    node: Node,
) -> Instruction {
    let mut inst = dfg.inst(node).clone();
    for slot in 0..inst.desc.operands.len() {
        let slot = slot as u8;
        // A written slot takes its produced value's unit; a read-only slot
        // its consumed value's. Read-modify-write slots agree by
        // construction.
        let value = dfg
            .produced_by(node)
            .find(|&v| dfg.values[v].slot == slot)
            .or_else(|| dfg.consumed_at(node, slot));
        let Some(value) = value else { continue };
        let unit = asg.value(enc.value_vars[&value]) as u8;
        let reg = Reg::new(dfg.values[value].class, unit);
        match &mut inst.operands[slot as usize] {
            Operand::Reg(name) => *name = RegName::Arch(reg),
            Operand::Addr { base, .. } => *base = RegName::Arch(reg),
            Operand::Imm(_) | Operand::Sym(_) => {}
        }
    }
    inst
}

fn rename_table(dfg: &Dfg, enc: &Encoding, asg: &Assignment, arch: &dyn ArchModel) -> Vec<RenameEntry> {
    let mut renames = Vec::new();
    for (value, data) in dfg.values.iter() {
        let RegName::Symbolic(name) = &data.name else {
            continue;
        };
        let unit = asg.value(enc.value_vars[&value]) as u8;
        let reg = Reg::new(data.class, unit);
        renames.push(RenameEntry {
            name: name.clone(),
            def_index: dfg
                .is_real(data.producer)
                .then(|| dfg.nodes[data.producer].src_index),
            reg: arch.reg_info().display(reg).to_string(),
        });
    }
    renames
}

/// Decode a straight-line solution.
pub fn decode_straight(
    dfg: &Dfg,
    arch: &dyn ArchModel,
    enc: &Encoding,
    asg: &Assignment,
) -> Schedule {
    let mut order: Vec<Node> = dfg.real_nodes().collect();
    order.sort_by_key(|node| asg.value(enc.node_vars[node].pos));
    let makespan = order
        .iter()
        .map(|node| asg.value(enc.node_vars[node].cycle))
        .max()
        .unwrap_or(0);

    let mut permutation = vec![0; order.len()];
    let mut lines = Vec::with_capacity(order.len());
    for (listing_idx, &node) in order.iter().enumerate() {
        let src_index = dfg.nodes[node].src_index;
        permutation[src_index] = listing_idx;
        let cycle = asg.value(enc.node_vars[&node].cycle);
        let glyph: String = (0..=makespan)
            .map(|c| if c == cycle { '*' } else { '.' })
            .collect();
        lines.push(ScheduledInst {
            src_index,
            iteration: 0,
            text: renamed_inst(dfg, enc, asg, node).render(arch.reg_info()),
            glyph,
            cycle,
            early: false,
        });
    }

    Schedule {
        kind: ScheduleKind::Straight(lines),
        stalls: 0,
        makespan,
        permutation,
        early_count: 0,
        renames: rename_table(dfg, enc, asg, arch),
        kernel_input_output: Vec::new(),
    }
}

/// Decode a software-pipelined solution.
pub fn decode_loop(
    dfg: &Dfg,
    arch: &dyn ArchModel,
    enc: &Encoding,
    asg: &Assignment,
) -> Schedule {
    let n = enc.n as i32;
    let period = enc.cycle_period;
    let nodes: Vec<Node> = dfg.real_nodes().collect();

    let emit = |node: Node, iteration: u8| -> ScheduledInst {
        let vars = &enc.node_vars[&node];
        let a = asg.value(vars.pos);
        let early = a < n;
        let cycle = asg.value(vars.cycle).rem_euclid(period);
        let glyph: String = (0..period)
            .map(|c| {
                if c == cycle {
                    if early {
                        'e'
                    } else {
                        '*'
                    }
                } else {
                    '.'
                }
            })
            .collect();
        ScheduledInst {
            src_index: dfg.nodes[node].src_index,
            iteration,
            text: renamed_inst(dfg, enc, asg, node).render(arch.reg_info()),
            glyph,
            cycle,
            early,
        }
    };

    let abs = |node: &Node| asg.value(enc.node_vars[node].pos);

    let mut early_nodes: Vec<Node> = nodes.iter().copied().filter(|x| abs(x) < n).collect();
    early_nodes.sort_by_key(|x| abs(x));
    let mut late_nodes: Vec<Node> = nodes.iter().copied().filter(|x| abs(x) >= n).collect();
    late_nodes.sort_by_key(|x| abs(x));

    // Kernel: every body instruction once, ordered by position within the
    // window. Early nodes appear as the *next* iteration's occurrences.
    let mut kernel_nodes: Vec<Node> = nodes.clone();
    kernel_nodes.sort_by_key(|x| abs(x).rem_euclid(n));
    let mut permutation = vec![0; nodes.len()];
    let kernel: Vec<ScheduledInst> = kernel_nodes
        .iter()
        .enumerate()
        .map(|(idx, &node)| {
            permutation[dfg.nodes[node].src_index] = idx;
            emit(node, u8::from(abs(&node) < n))
        })
        .collect();

    let preamble: Vec<ScheduledInst> = early_nodes.iter().map(|&x| emit(x, 0)).collect();
    let postamble: Vec<ScheduledInst> = late_nodes.iter().map(|&x| emit(x, 1)).collect();
    let early_count = preamble.len() as u32;

    // Registers live across the kernel boundary: loop-carried values plus
    // loop invariants.
    let mut kernel_io: Vec<String> = Vec::new();
    for (value, data) in dfg.values.iter() {
        let carried = dfg.consumers_of(value).any(|e| e.cross);
        let invariant = data.producer == dfg.source;
        if carried || invariant {
            let unit = asg.value(enc.value_vars[&value]) as u8;
            let reg = Reg::new(data.class, unit);
            let shown = arch.reg_info().display(reg).to_string();
            if !kernel_io.contains(&shown) {
                kernel_io.push(shown);
            }
        }
    }

    Schedule {
        kind: ScheduleKind::Loop {
            preamble,
            kernel,
            postamble,
        },
        stalls: 0,
        makespan: period,
        permutation,
        early_count,
        renames: rename_table(dfg, enc, asg, arch),
        kernel_input_output: kernel_io,
    }
}
