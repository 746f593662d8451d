//! Armv8.1-M (M-profile with MVE) architecture tables and the Cortex-M55
//! microarchitecture model.
//!
//! This is a subset of the instruction set: the load/store, multiply-
//! accumulate, and bit-manipulation shapes that dominate the inner loops
//! this tool is pointed at. Extending the subset means adding table rows.

use super::{
    ArchModel, InstDesc, MemAccess, OperandDesc, Reg, RegBank, RegClass, RegInfo, Role, UarchModel,
    UnitAlts,
};
use smallvec::SmallVec;

/// The flags register.
pub const APSR: Reg = Reg::new(RegClass::Flags, 0);

static BANKS: [RegBank; 4] = [
    RegBank {
        class: RegClass::Gpr,
        units: 16,
        prefix: "r",
        names: &[],
        // r13 is the stack pointer and r15 the program counter; neither is
        // handed out by the renamer.
        allocatable: 0x5fff,
    },
    RegBank {
        class: RegClass::Vec,
        units: 8,
        prefix: "q",
        names: &[],
        allocatable: 0x00ff,
    },
    RegBank {
        class: RegClass::Pred,
        units: 1,
        prefix: "vpr",
        names: &["vpr"],
        allocatable: 0x1,
    },
    RegBank {
        class: RegClass::Flags,
        units: 1,
        prefix: "apsr",
        names: &["apsr"],
        allocatable: 0x1,
    },
];

/// Register tables of the architecture.
pub static REG_INFO: RegInfo = RegInfo { banks: &BANKS };

use Role::{AddrBase, Read, ReadWrite, Write};

static INSTS: &[InstDesc] = &[
    // Vector loads and stores.
    InstDesc {
        mnemonic: "vldrw",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("rn", AddrBase, RegClass::Gpr),
        ],
        memory: MemAccess::Load,
    },
    InstDesc {
        mnemonic: "vldrh",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("rn", AddrBase, RegClass::Gpr),
        ],
        memory: MemAccess::Load,
    },
    InstDesc {
        mnemonic: "vstrw",
        operands: &[
            OperandDesc::reg("qs", Read, RegClass::Vec),
            OperandDesc::reg("rn", AddrBase, RegClass::Gpr),
        ],
        memory: MemAccess::Store,
    },
    InstDesc {
        mnemonic: "vstrh",
        operands: &[
            OperandDesc::reg("qs", Read, RegClass::Vec),
            OperandDesc::reg("rn", AddrBase, RegClass::Gpr),
        ],
        memory: MemAccess::Store,
    },
    // Vector arithmetic.
    InstDesc {
        mnemonic: "vmla",
        operands: &[
            OperandDesc::reg("qda", ReadWrite, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vfma",
        operands: &[
            OperandDesc::reg("qda", ReadWrite, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vmul",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vqdmulh",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vqrdmulh",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vadd",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vsub",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vand",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "veor",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::reg("qm", Read, RegClass::Vec),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vshr",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::imm("imm"),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vshl",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("qn", Read, RegClass::Vec),
            OperandDesc::imm("imm"),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "vdup",
        operands: &[
            OperandDesc::reg("qd", Write, RegClass::Vec),
            OperandDesc::reg("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    // Scalar loads and stores.
    InstDesc {
        mnemonic: "ldr",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", AddrBase, RegClass::Gpr),
        ],
        memory: MemAccess::Load,
    },
    InstDesc {
        mnemonic: "str",
        operands: &[
            OperandDesc::reg("rs", Read, RegClass::Gpr),
            OperandDesc::reg("rn", AddrBase, RegClass::Gpr),
        ],
        memory: MemAccess::Store,
    },
    // Scalar arithmetic and logic.
    InstDesc {
        mnemonic: "mov",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "movw",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::imm("imm"),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "add",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "sub",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "and",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "orr",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "eor",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "lsl",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::imm("imm"),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "lsr",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::imm("imm"),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "ror",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::imm("imm"),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "cmp",
        operands: &[
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
            OperandDesc::implicit("flags", Write, APSR),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "adc",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
            OperandDesc::implicit("flags", Read, APSR),
        ],
        memory: MemAccess::None,
    },
    InstDesc {
        mnemonic: "adds",
        operands: &[
            OperandDesc::reg("rd", Write, RegClass::Gpr),
            OperandDesc::reg("rn", Read, RegClass::Gpr),
            OperandDesc::reg_or_imm("rm", Read, RegClass::Gpr),
            OperandDesc::implicit("flags", Write, APSR),
        ],
        memory: MemAccess::None,
    },
];

/// The Armv8.1-M architecture model.
pub struct Armv81m;

impl ArchModel for Armv81m {
    fn name(&self) -> &'static str {
        "armv81m"
    }

    fn reg_info(&self) -> &'static RegInfo {
        &REG_INFO
    }

    fn inst_desc(&self, mnemonic: &str) -> Option<&'static InstDesc> {
        INSTS.iter().find(|d| d.mnemonic == mnemonic)
    }

    fn is_branch(&self, mnemonic: &str) -> bool {
        matches!(
            mnemonic,
            "b" | "beq" | "bne" | "bx" | "cbz" | "cbnz" | "le" | "letp" | "wls" | "wlstp"
        )
    }
}

/// Functional units of the Cortex-M55 model.
mod unit {
    /// MVE pipeline.
    pub const VEC: u64 = 1 << 0;
    /// Load/store pipeline.
    pub const MEM: u64 = 1 << 1;
    /// Scalar ALU.
    pub const ALU: u64 = 1 << 2;
}

/// A Cortex-M55 flavored microarchitecture model: dual issue of one scalar
/// and one vector/memory instruction per cycle, two-cycle vector results,
/// and accumulator forwarding between multiply-accumulate instructions.
pub struct CortexM55;

impl UarchModel for CortexM55 {
    fn name(&self) -> &'static str {
        "cortex-m55"
    }

    fn latency(&self, mnemonic: &str) -> u32 {
        match mnemonic {
            "vldrw" | "vldrh" | "ldr" => 2,
            "vmla" | "vfma" | "vmul" | "vqdmulh" | "vqrdmulh" | "vdup" => 2,
            _ => 1,
        }
    }

    fn units(&self, mnemonic: &str) -> UnitAlts {
        let mask = match mnemonic {
            "vldrw" | "vldrh" | "vstrw" | "vstrh" | "ldr" | "str" => unit::MEM,
            m if m.starts_with('v') => unit::VEC,
            _ => unit::ALU,
        };
        SmallVec::from_slice(&[mask])
    }

    fn unit_count(&self) -> u8 {
        3
    }

    fn issue_width(&self) -> u32 {
        2
    }

    fn forward_latency(&self, producer: &str, consumer: &str) -> Option<u32> {
        // The MVE multiply-accumulate chain forwards the accumulator.
        if producer == "vmla" && consumer == "vmla" {
            Some(1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_shapes() {
        let arch = Armv81m;
        let vmla = arch.inst_desc("vmla").expect("vmla in table");
        assert_eq!(vmla.operands.len(), 3);
        assert_eq!(vmla.operands[0].role, Role::ReadWrite);
        assert_eq!(vmla.operands[2].class, Some(RegClass::Gpr));
        assert!(arch.inst_desc("vmla.u32").is_none());
        assert!(arch.is_branch("le"));
        assert!(!arch.is_branch("vmla"));
    }

    #[test]
    fn flags_are_implicit() {
        let arch = Armv81m;
        let cmp = arch.inst_desc("cmp").expect("cmp in table");
        let flags = cmp.operands.last().expect("has operands");
        assert!(flags.implicit);
        assert_eq!(flags.pin, Some(APSR));
    }

    #[test]
    fn m55_timing() {
        let uarch = CortexM55;
        assert_eq!(uarch.latency("vldrw"), 2);
        assert_eq!(uarch.latency("vstrw"), 1);
        assert_eq!(uarch.forward_latency("vmla", "vmla"), Some(1));
        assert_eq!(uarch.forward_latency("vmul", "vmla"), None);
        assert_eq!(uarch.units("vstrw")[0], 1 << 1);
        assert_eq!(uarch.units("eor")[0], 1 << 2);
    }
}
