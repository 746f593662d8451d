//! The loop transformer: locating a loop body, unrolling it with per-copy
//! renaming of locally-defined symbolic registers, and the bookkeeping the
//! emitter needs to stitch preamble, kernel, and postamble back around the
//! loop label and its branch.

use crate::error::{Error, Result};
use crate::ir::{Instruction, Operand, RegName};
use crate::isa::{ArchModel, Role};
use crate::parse::{split_line, SourceFile};
use rustc_hash::FxHashMap;

/// A located loop in the source file.
pub struct LoopShape {
    /// The loop label.
    pub label: String,
    /// Line index of the label.
    pub label_idx: usize,
    /// Line indexes of the body's instruction lines.
    pub body_lines: Vec<usize>,
    /// Line index of the backwards branch.
    pub branch_idx: usize,
}

/// Find the loop starting at `label`: its body runs to the first branch
/// targeting the label again.
pub fn locate(file: &SourceFile, arch: &dyn ArchModel, label: &str) -> Result<LoopShape> {
    let label_idx = file
        .find_label(label)
        .ok_or_else(|| Error::Config(format!("loop label `{label}` not found")))?;
    let mut body_lines = Vec::new();
    for (offset, line) in file.lines[label_idx..].iter().enumerate() {
        let idx = label_idx + offset;
        let Some(code) = &line.code else { continue };
        let (mnemonic, operands) = split_line(code);
        let base = mnemonic.split('.').next().unwrap_or(&mnemonic);
        if arch.is_branch(base) {
            if operands.last().map(String::as_str) == Some(label) {
                return Ok(LoopShape {
                    label: label.to_string(),
                    label_idx,
                    body_lines,
                    branch_idx: idx,
                });
            }
            return Err(Error::parse(
                line.line,
                format!("branch inside loop `{label}` targets somewhere else"),
            ));
        }
        body_lines.push(idx);
    }
    Err(Error::Config(format!(
        "loop `{label}` has no branch back to its label"
    )))
}

fn rename_in(op: &mut Operand, map: &FxHashMap<String, String>) {
    let name = match op {
        Operand::Reg(RegName::Symbolic(s)) => s,
        Operand::Addr {
            base: RegName::Symbolic(s),
            ..
        } => s,
        _ => return,
    };
    if let Some(new) = map.get(name.as_str()) {
        *name = new.clone();
    }
}

/// Concatenate `factor` copies of the body, renaming symbolic registers
/// that are freshly defined inside it so the copies do not share them.
/// Loop-carried names (read before their write, or updated in place) keep
/// one name per carried chain so the final copy feeds the next iteration.
pub fn unroll(body: &[Instruction], factor: u32) -> Vec<Instruction> {
    if factor <= 1 {
        return body.to_vec();
    }
    let mut out = Vec::with_capacity(body.len() * factor as usize);
    let mut current: FxHashMap<String, String> = FxHashMap::default();
    for copy in 0..factor {
        let last = copy == factor - 1;
        for inst in body {
            let mut inst = inst.clone();
            // Reads see the most recent definition.
            for (od, op) in inst.desc.operands.iter().zip(inst.operands.iter_mut()) {
                if od.role.is_read() {
                    rename_in(op, &current);
                }
            }
            // Plain writes get a per-copy name; in-place updates keep the
            // carried name.
            for (slot, od) in inst.desc.operands.iter().enumerate() {
                if od.role != Role::Write {
                    continue;
                }
                let Operand::Reg(RegName::Symbolic(name)) = &inst.operands[slot] else {
                    continue;
                };
                let base = name.clone();
                let fresh = if last {
                    base.clone()
                } else {
                    format!("{base}_u{copy}")
                };
                inst.operands[slot] = Operand::Reg(RegName::Symbolic(fresh.clone()));
                current.insert(base, fresh);
            }
            out.push(inst);
        }
    }
    out
}
