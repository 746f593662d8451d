//! Independent verification of a decoded result.
//!
//! The check rebuilds a data-flow graph from the *emitted text* and
//! verifies, against a reference graph built from the input instructions,
//! that the output is a permutation of the input with an isomorphic graph
//! and a consistent renaming. Nothing from the solver or the encoder is
//! trusted here; any failure rejects the output as an internal bug.

use crate::config::MemPolicy;
use crate::error::{Error, Result};
use crate::ir::{self, BuildParams, Dfg, Instruction, Node, Operand, RegName};
use crate::isa::ArchModel;
use crate::opt::decode::{Schedule, ScheduleKind};
use indexmap::IndexMap;

fn fail(message: impl Into<String>) -> Error {
    Error::SelfCheck(message.into())
}

fn rebuild(
    arch: &dyn ArchModel,
    insts: Vec<Instruction>,
    hints: &IndexMap<String, crate::isa::RegClass>,
    policy: MemPolicy,
    keep_load_order: bool,
) -> Result<Dfg> {
    let inputs = IndexMap::new();
    ir::build(
        arch,
        insts,
        &BuildParams {
            hints,
            inputs: &inputs,
            outputs: &[],
            policy,
            keep_load_order,
            loop_mode: false,
        },
    )
    .map_err(|err| fail(format!("rebuilding the output graph: {err}")))
}

fn operand_reg_text(inst: &Instruction, slot: u8) -> Option<&RegName> {
    match inst.operands.get(slot as usize)? {
        Operand::Reg(name) => Some(name),
        Operand::Addr { base, .. } => Some(base),
        _ => None,
    }
}

/// Verify `schedule` against the graph of the input window.
pub fn check(
    arch: &dyn ArchModel,
    policy: MemPolicy,
    keep_load_order: bool,
    original: &Dfg,
    schedule: &Schedule,
) -> Result<()> {
    let n_body = original.num_real();
    let listing = schedule.listing();
    let copies = match schedule.kind {
        ScheduleKind::Straight(_) => 1,
        ScheduleKind::Loop { .. } => 2,
    };
    if listing.len() != copies * n_body {
        return Err(fail(format!(
            "output has {} instructions, expected {}",
            listing.len(),
            copies * n_body
        )));
    }

    // Reference graph: the input window (twice, for the two modeled
    // iterations of a pipelined loop).
    let body: Vec<Instruction> = original
        .real_nodes()
        .map(|node| original.inst(node).clone())
        .collect();
    let mut expected_insts = Vec::with_capacity(copies * n_body);
    for _ in 0..copies {
        expected_insts.extend(body.iter().cloned());
    }
    let expected = rebuild(
        arch,
        expected_insts,
        &original.classes,
        policy,
        keep_load_order,
    )?;

    // Output graph, from the emitted text.
    let mut actual_insts = Vec::with_capacity(listing.len());
    for (idx, line) in listing.iter().enumerate() {
        let inst = Instruction::classify(arch, &line.text, idx + 1)
            .map_err(|err| fail(format!("emitted line `{}`: {err}", line.text)))?;
        actual_insts.push(inst);
    }

    // Permutation: multiset equality on (mnemonic, immediates, shape).
    let mut expected_ids: Vec<String> = expected
        .real_nodes()
        .map(|node| expected.inst(node).identity())
        .collect();
    let mut actual_ids: Vec<String> = actual_insts.iter().map(Instruction::identity).collect();
    expected_ids.sort_unstable();
    actual_ids.sort_unstable();
    if expected_ids != actual_ids {
        return Err(fail("output is not a permutation of the input"));
    }

    // The decoder's bijection: (iteration, source index) -> listing position.
    let mut pos_of = vec![usize::MAX; copies * n_body];
    for (listing_pos, line) in listing.iter().enumerate() {
        let idx = line.iteration as usize * n_body + line.src_index;
        if idx >= pos_of.len() || pos_of[idx] != usize::MAX {
            return Err(fail("decoder emitted an invalid instruction mapping"));
        }
        pos_of[idx] = listing_pos;
    }

    let actual = rebuild(arch, actual_insts.clone(), &IndexMap::new(), policy, keep_load_order)?;
    let actual_nodes: Vec<Node> = actual.real_nodes().collect();
    let map_node = |node: Node| -> Node {
        if node == expected.source {
            actual.source
        } else {
            actual_nodes[pos_of[expected.nodes[node].src_index]]
        }
    };

    // Every dependence of the reference graph must appear between the
    // mapped endpoints, with the same kind and consumer slot.
    for edge in &expected.edges {
        if edge.to == expected.sink {
            continue;
        }
        let from = map_node(edge.from);
        let to = map_node(edge.to);
        let from_real = expected.is_real(edge.from);
        let found = actual.edges.iter().any(|cand| {
            cand.from == from
                && cand.to == to
                && cand.kind == edge.kind
                && cand.value.is_some() == edge.value.is_some()
                && (edge.value.is_none() || cand.to_slot == edge.to_slot)
                && (!from_real || edge.value.is_none() || cand.from_slot == edge.from_slot)
        });
        if !found {
            return Err(fail(format!(
                "dependence {:?} from input node {} to {} is not preserved",
                edge.kind, expected.nodes[edge.from].src_index, expected.nodes[edge.to].src_index
            )));
        }
    }

    // Renaming consistency: every occurrence of one value uses one register.
    for (value, data) in expected.values.iter() {
        let mut seen: Option<&RegName> = None;
        let mut occurrences: Vec<(Node, u8)> = Vec::new();
        if expected.is_real(data.producer) {
            occurrences.push((data.producer, data.slot));
        }
        for edge in expected.consumers_of(value) {
            if expected.is_real(edge.to) {
                occurrences.push((edge.to, edge.to_slot));
            }
        }
        for (node, slot) in occurrences {
            let inst = &actual_insts[pos_of[expected.nodes[node].src_index]];
            let Some(reg) = operand_reg_text(inst, slot) else {
                return Err(fail(format!(
                    "missing register operand in emitted `{}`",
                    inst.mnemonic
                )));
            };
            if !matches!(reg, RegName::Arch(_)) {
                return Err(fail(format!(
                    "emitted instruction still has symbolic operand `{}`",
                    inst.render(arch.reg_info())
                )));
            }
            match seen {
                None => seen = Some(reg),
                Some(prev) if prev != reg => {
                    return Err(fail(format!(
                        "value {value} is renamed inconsistently across its live range"
                    )));
                }
                Some(_) => {}
            }
        }
    }

    log::debug!("self-check passed ({} instructions)", listing.len());
    Ok(())
}
