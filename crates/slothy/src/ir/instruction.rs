//! Instructions: parsed lines matched against the architecture's operand
//! shape tables.

use crate::error::{Error, Result};
use crate::isa::{ArchModel, InstDesc, RegInfo, Role};
use crate::parse::{self, RawOperand};
use smallvec::SmallVec;

/// A register operand: either an architectural register or a symbolic name
/// awaiting renaming.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegName {
    /// A concrete architectural register; pre-pinned.
    Arch(crate::isa::Reg),
    /// A symbolic name.
    Symbolic(String),
}

/// One operand slot's contents, aligned with the instruction's `InstDesc`.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A register.
    Reg(RegName),
    /// A memory address.
    Addr {
        /// Base register.
        base: RegName,
        /// Constant offset.
        offset: i64,
        /// The base is written back (pre/post indexing).
        writeback: bool,
    },
    /// A literal immediate.
    Imm(i64),
    /// A symbolic immediate or label, passed through unchanged.
    Sym(String),
}

/// An immutable instruction: mnemonic, shape, and operands. Built once by
/// matching a source line against the architecture tables.
#[derive(Clone)]
pub struct Instruction {
    /// The mnemonic as written, including any width suffix.
    pub mnemonic: String,
    /// The matched shape table entry.
    pub desc: &'static InstDesc,
    /// Operands, one per `desc` slot; implicit slots hold their pins.
    pub operands: SmallVec<[Operand; 4]>,
    /// Source line, for diagnostics.
    pub line: usize,
}

impl Instruction {
    /// Base mnemonic (width suffix stripped).
    pub fn base(&self) -> &'static str {
        self.desc.mnemonic
    }

    /// Match one instruction line against the architecture tables.
    pub fn classify(arch: &dyn ArchModel, text: &str, line: usize) -> Result<Instruction> {
        let (mnemonic, op_texts) = parse::split_line(text);
        let base = mnemonic.split('.').next().unwrap_or(&mnemonic);
        let desc = arch
            .inst_desc(base)
            .ok_or_else(|| Error::UnknownMnemonic {
                line,
                mnemonic: base.to_string(),
            })?;
        let info = arch.reg_info();

        let mut raws = Vec::with_capacity(op_texts.len());
        for text in &op_texts {
            raws.push(parse::parse_operand(text, line)?);
        }

        let explicit: Vec<&crate::isa::OperandDesc> =
            desc.operands.iter().filter(|o| !o.implicit).collect();

        // Post-index addressing splits into two textual operands
        // (`[r0], #16`); fold the trailing immediate back into the address.
        if raws.len() == explicit.len() + 1 {
            let fold = raws.iter().zip(raws.iter().skip(1)).position(|(a, b)| {
                matches!(a, RawOperand::Addr { writeback: false, .. })
                    && matches!(b, RawOperand::Imm(_))
            });
            if let Some(i) = fold {
                let RawOperand::Imm(step) = raws.remove(i + 1) else {
                    unreachable!("checked above");
                };
                if let RawOperand::Addr {
                    offset, writeback, ..
                } = &mut raws[i]
                {
                    *offset = step;
                    *writeback = true;
                }
            }
        }
        if raws.len() != explicit.len() {
            return Err(Error::parse(
                line,
                format!(
                    "`{base}` expects {} operands, got {}",
                    explicit.len(),
                    raws.len()
                ),
            ));
        }

        let mut operands: SmallVec<[Operand; 4]> = SmallVec::new();
        let mut raw_iter = raws.into_iter();
        for od in desc.operands {
            if od.implicit {
                let pin = od.pin.expect("implicit slots are pinned");
                operands.push(Operand::Reg(RegName::Arch(pin)));
                continue;
            }
            let raw = raw_iter.next().expect("operand counts match");
            let op = match (od.role, raw) {
                (Role::Imm, RawOperand::Imm(v)) => Operand::Imm(v),
                (Role::Imm, RawOperand::Name(s)) => Operand::Sym(s),
                (Role::AddrBase, RawOperand::Addr { base, offset, writeback }) => {
                    let base = resolve_reg(info, base, od, line)?;
                    Operand::Addr {
                        base,
                        offset,
                        writeback,
                    }
                }
                (Role::AddrBase, raw) => {
                    return Err(Error::parse(
                        line,
                        format!("slot `{}` of `{base}` needs an address, got `{raw:?}`", od.name),
                    ));
                }
                (_, RawOperand::Imm(v)) if od.flexible => Operand::Imm(v),
                (_, RawOperand::Name(s)) if od.class.is_some() => {
                    Operand::Reg(resolve_reg(info, s, od, line)?)
                }
                (_, raw) => {
                    return Err(Error::parse(
                        line,
                        format!("operand `{raw:?}` does not fit slot `{}` of `{base}`", od.name),
                    ));
                }
            };
            operands.push(op);
        }

        Ok(Instruction {
            mnemonic,
            desc,
            operands,
            line,
        })
    }

    /// Render the instruction back to assembly text, with registers shown
    /// through `info`.
    pub fn render(&self, info: &RegInfo) -> String {
        let mut out = self.mnemonic.clone();
        let mut first = true;
        for (od, op) in self.desc.operands.iter().zip(&self.operands) {
            if od.implicit {
                continue;
            }
            out.push_str(if first { " " } else { ", " });
            first = false;
            match op {
                Operand::Reg(r) => out.push_str(&reg_text(info, r)),
                Operand::Imm(v) => out.push_str(&format!("#{v}")),
                Operand::Sym(s) => out.push_str(s),
                Operand::Addr {
                    base,
                    offset,
                    writeback,
                } => {
                    let base = reg_text(info, base);
                    match (offset, writeback) {
                        (0, false) => out.push_str(&format!("[{base}]")),
                        (0, true) => out.push_str(&format!("[{base}]!")),
                        (off, false) => out.push_str(&format!("[{base}, #{off}]")),
                        (off, true) => out.push_str(&format!("[{base}], #{off}")),
                    }
                }
            }
        }
        out
    }

    /// A renaming-independent identity key: mnemonic, immediates, and
    /// operand shape. Two instructions are "the same" for the permutation
    /// invariant exactly when their keys match.
    pub fn identity(&self) -> String {
        let mut key = self.mnemonic.clone();
        for op in &self.operands {
            key.push(';');
            match op {
                Operand::Reg(_) => key.push('r'),
                Operand::Imm(v) => key.push_str(&format!("#{v}")),
                Operand::Sym(s) => key.push_str(s),
                Operand::Addr {
                    offset, writeback, ..
                } => key.push_str(&format!("m{offset}w{}", u8::from(*writeback))),
            }
        }
        key
    }
}

fn reg_text(info: &RegInfo, reg: &RegName) -> String {
    match reg {
        RegName::Arch(r) => info.display(*r).to_string(),
        RegName::Symbolic(s) => s.clone(),
    }
}

fn resolve_reg(
    info: &RegInfo,
    name: String,
    od: &crate::isa::OperandDesc,
    line: usize,
) -> Result<RegName> {
    let class = od.class.expect("register slots have a class");
    match info.parse_reg(&name) {
        Some(reg) => {
            if reg.class != class {
                return Err(Error::parse(
                    line,
                    format!(
                        "`{name}` is a {} register but slot `{}` needs {class}",
                        reg.class, od.name
                    ),
                ));
            }
            if let Some(pin) = od.pin {
                if reg != pin {
                    return Err(Error::parse(
                        line,
                        format!("slot `{}` is pinned to {}", od.name, info.display(pin)),
                    ));
                }
            }
            Ok(RegName::Arch(reg))
        }
        None => Ok(RegName::Symbolic(name)),
    }
}
