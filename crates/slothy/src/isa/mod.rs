//! Architecture and microarchitecture models.
//!
//! The engine is target-independent: everything it knows about an
//! instruction set comes through [`ArchModel`] (operand shapes, register
//! banks, semantic pins) and [`UarchModel`] (latency, functional units,
//! issue width, forwarding exceptions). Adding a target means providing two
//! new description tables; the engine does not change.
//!
//! Use [`lookup_by_name`] to obtain a [`Builder`], select a
//! microarchitecture, and `finish` it into a [`Target`].

pub mod armv81m;
pub mod registers;

pub use registers::{DisplayReg, Reg, RegBank, RegClass, RegInfo, RegUnit};

use core::fmt;
use smallvec::SmallVec;

/// The role an operand slot plays in its instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// The slot is read.
    Read,
    /// The slot is written.
    Write,
    /// The slot is read, then written (accumulators).
    ReadWrite,
    /// Base register of a memory address (read; written too with
    /// post-index writeback).
    AddrBase,
    /// Register offset of a memory address (read).
    AddrOffset,
    /// An immediate; never renamed.
    Imm,
}

impl Role {
    /// Does the slot consume a value?
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Role::Read | Role::ReadWrite | Role::AddrBase | Role::AddrOffset
        )
    }

    /// Does the slot produce a value?
    pub fn is_write(self) -> bool {
        matches!(self, Role::Write | Role::ReadWrite)
    }
}

/// Static description of one operand slot.
pub struct OperandDesc {
    /// Slot name, for diagnostics.
    pub name: &'static str,
    /// The slot's role.
    pub role: Role,
    /// Required register class; `None` for immediates.
    pub class: Option<RegClass>,
    /// The architecture pins this slot to a fixed register.
    pub pin: Option<Reg>,
    /// In-place constraint: the destination must equal the source in the
    /// given slot index.
    pub tied: Option<u8>,
    /// The slot has no textual operand (implicitly-read/written flags).
    pub implicit: bool,
    /// The slot also accepts an immediate (assembler-flexible operands);
    /// an immediate there contributes no data-flow edge.
    pub flexible: bool,
}

impl OperandDesc {
    /// A plain register slot.
    pub const fn reg(name: &'static str, role: Role, class: RegClass) -> Self {
        Self {
            name,
            role,
            class: Some(class),
            pin: None,
            tied: None,
            implicit: false,
            flexible: false,
        }
    }

    /// A register slot that also accepts an immediate.
    pub const fn reg_or_imm(name: &'static str, role: Role, class: RegClass) -> Self {
        Self {
            name,
            role,
            class: Some(class),
            pin: None,
            tied: None,
            implicit: false,
            flexible: true,
        }
    }

    /// An immediate slot.
    pub const fn imm(name: &'static str) -> Self {
        Self {
            name,
            role: Role::Imm,
            class: None,
            pin: None,
            tied: None,
            implicit: false,
            flexible: false,
        }
    }

    /// A slot with no textual operand, pinned to a fixed register.
    pub const fn implicit(name: &'static str, role: Role, pin: Reg) -> Self {
        Self {
            name,
            role,
            class: Some(pin.class),
            pin: Some(pin),
            tied: None,
            implicit: true,
            flexible: false,
        }
    }
}

/// Memory behavior of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemAccess {
    /// Does not touch memory.
    None,
    /// Reads memory.
    Load,
    /// Writes memory.
    Store,
}

/// Static description of one mnemonic: its operand shape and memory kind.
pub struct InstDesc {
    /// The base mnemonic (width suffixes stripped).
    pub mnemonic: &'static str,
    /// Operand slots, in assembly order.
    pub operands: &'static [OperandDesc],
    /// Memory behavior.
    pub memory: MemAccess,
}

/// An architecture model: registers and instruction shapes.
pub trait ArchModel: Send + Sync {
    /// Name of the architecture.
    fn name(&self) -> &'static str;

    /// The register description tables.
    fn reg_info(&self) -> &'static RegInfo;

    /// The operand-shape table entry for a base mnemonic.
    fn inst_desc(&self, mnemonic: &str) -> Option<&'static InstDesc>;

    /// Is this mnemonic a branch? Branches delimit loop bodies and are
    /// never scheduled.
    fn is_branch(&self, mnemonic: &str) -> bool;
}

/// Alternative functional-unit assignments of one instruction. Each element
/// is a bit mask of the units one alternative occupies.
pub type UnitAlts = SmallVec<[u64; 4]>;

/// A microarchitecture model: timing and resources.
pub trait UarchModel: Send + Sync {
    /// Name of the microarchitecture.
    fn name(&self) -> &'static str;

    /// Result latency of a mnemonic, in cycles.
    fn latency(&self, mnemonic: &str) -> u32;

    /// Alternative unit assignments of a mnemonic. At least one alternative;
    /// an empty mask means the instruction contends for nothing.
    fn units(&self, mnemonic: &str) -> UnitAlts {
        let _ = mnemonic;
        SmallVec::from_slice(&[0])
    }

    /// Number of functional units in the tables.
    fn unit_count(&self) -> u8 {
        0
    }

    /// How many instructions may hold `unit` in one cycle.
    fn unit_capacity(&self, unit: u8) -> u32 {
        let _ = unit;
        1
    }

    /// Instructions issued per cycle.
    fn issue_width(&self) -> u32;

    /// Pairwise forwarding exception: overrides `latency(producer)` on the
    /// edge from `producer` to `consumer` when present.
    fn forward_latency(&self, producer: &str, consumer: &str) -> Option<u32> {
        let _ = (producer, consumer);
        None
    }
}

/// Reason a target lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No such architecture.
    Unsupported(String),
    /// The architecture exists but the microarchitecture name is unknown.
    UnknownUarch(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::Unsupported(name) => write!(f, "unsupported architecture `{name}`"),
            LookupError::UnknownUarch(name) => {
                write!(f, "unknown microarchitecture `{name}`")
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// A configured architecture/microarchitecture pair.
pub struct Target {
    /// The architecture tables.
    pub arch: Box<dyn ArchModel>,
    /// The microarchitecture tables.
    pub uarch: Box<dyn UarchModel>,
}

/// Builder for a [`Target`]: pick the microarchitecture, then `finish`.
pub struct Builder {
    arch: &'static str,
    uarch: Option<String>,
}

impl Builder {
    /// Select a microarchitecture by name. The architecture's default is
    /// used otherwise.
    pub fn uarch(mut self, name: &str) -> Self {
        self.uarch = Some(name.to_string());
        self
    }

    /// Build the target.
    pub fn finish(self) -> Result<Target, LookupError> {
        match self.arch {
            "armv81m" => {
                let arch: Box<dyn ArchModel> = Box::new(armv81m::Armv81m);
                let uarch_name = self.uarch.as_deref().unwrap_or("cortex-m55");
                let uarch: Box<dyn UarchModel> = match uarch_name {
                    "cortex-m55" => Box::new(armv81m::CortexM55),
                    other => return Err(LookupError::UnknownUarch(other.to_string())),
                };
                Ok(Target { arch, uarch })
            }
            other => Err(LookupError::Unsupported(other.to_string())),
        }
    }
}

/// Look up an architecture by name.
pub fn lookup_by_name(name: &str) -> Result<Builder, LookupError> {
    match name {
        "armv81m" => Ok(Builder {
            arch: "armv81m",
            uarch: None,
        }),
        other => Err(LookupError::Unsupported(other.to_string())),
    }
}

/// A table-driven microarchitecture, for tests and experiments: per-mnemonic
/// latencies and unit masks with configurable defaults.
pub struct TableUarch {
    name: &'static str,
    width: u32,
    default_latency: u32,
    latencies: Vec<(String, u32)>,
    units: Vec<(String, UnitAlts)>,
    unit_count: u8,
    forwards: Vec<(String, String, u32)>,
}

impl TableUarch {
    /// A table with the given issue width, default latency 1, no units.
    pub fn new(width: u32) -> Self {
        Self {
            name: "table",
            width,
            default_latency: 1,
            latencies: Vec::new(),
            units: Vec::new(),
            unit_count: 0,
            forwards: Vec::new(),
        }
    }

    /// Override the latency applied to mnemonics without an entry.
    pub fn default_latency(mut self, cycles: u32) -> Self {
        self.default_latency = cycles;
        self
    }

    /// Set the latency of one mnemonic.
    pub fn latency(mut self, mnemonic: &str, cycles: u32) -> Self {
        self.latencies.push((mnemonic.to_string(), cycles));
        self
    }

    /// Set the unit alternatives of one mnemonic.
    pub fn units(mut self, mnemonic: &str, alts: &[u64]) -> Self {
        for &mask in alts {
            let top = 64 - mask.leading_zeros() as u8;
            self.unit_count = self.unit_count.max(top);
        }
        self.units
            .push((mnemonic.to_string(), SmallVec::from_slice(alts)));
        self
    }

    /// Add a pairwise forwarding exception.
    pub fn forward(mut self, producer: &str, consumer: &str, cycles: u32) -> Self {
        self.forwards
            .push((producer.to_string(), consumer.to_string(), cycles));
        self
    }
}

impl UarchModel for TableUarch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn latency(&self, mnemonic: &str) -> u32 {
        self.latencies
            .iter()
            .find(|(m, _)| m == mnemonic)
            .map_or(self.default_latency, |&(_, l)| l)
    }

    fn units(&self, mnemonic: &str) -> UnitAlts {
        self.units
            .iter()
            .find(|(m, _)| m == mnemonic)
            .map_or_else(|| SmallVec::from_slice(&[0]), |(_, alts)| alts.clone())
    }

    fn unit_count(&self) -> u8 {
        self.unit_count
    }

    fn issue_width(&self) -> u32 {
        self.width
    }

    fn forward_latency(&self, producer: &str, consumer: &str) -> Option<u32> {
        self.forwards
            .iter()
            .find(|(p, c, _)| p == producer && c == consumer)
            .map(|&(_, _, l)| l)
    }
}
