//! Architectural registers, register classes, and the static register
//! description tables provided by each architecture model.

use core::fmt;

/// A register index within its bank.
pub type RegUnit = u8;

/// The class of a register or operand slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    /// General-purpose registers.
    Gpr,
    /// Vector registers.
    Vec,
    /// Predicate registers.
    Pred,
    /// The flags register.
    Flags,
}

impl fmt::Display for RegClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            RegClass::Gpr => "GPR",
            RegClass::Vec => "vector",
            RegClass::Pred => "predicate",
            RegClass::Flags => "flags",
        })
    }
}

impl core::str::FromStr for RegClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "gpr" | "GPR" => Ok(RegClass::Gpr),
            "vec" | "vector" => Ok(RegClass::Vec),
            "pred" | "predicate" => Ok(RegClass::Pred),
            "flags" => Ok(RegClass::Flags),
            _ => Err(()),
        }
    }
}

/// An architectural register: a class and a unit within the class's bank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg {
    /// The register's class.
    pub class: RegClass,
    /// The register's unit within its bank.
    pub unit: RegUnit,
}

impl Reg {
    /// Shorthand constructor.
    pub const fn new(class: RegClass, unit: RegUnit) -> Self {
        Self { class, unit }
    }
}

/// Static description of one register bank.
pub struct RegBank {
    /// The bank's class.
    pub class: RegClass,
    /// Number of units in the bank.
    pub units: RegUnit,
    /// Name prefix for units not covered by `names` (`r` gives `r0`, `r1`…).
    pub prefix: &'static str,
    /// Special names, indexed by unit, overriding the prefixed form.
    /// May be shorter than `units`.
    pub names: &'static [&'static str],
    /// Bit mask of units the renamer may hand out. Reserved units (stack
    /// pointer, program counter) are cleared here but still parse.
    pub allocatable: u32,
}

impl RegBank {
    fn parse_unit(&self, name: &str) -> Option<RegUnit> {
        if let Some(pos) = self.names.iter().position(|&n| n == name) {
            return Some(pos as RegUnit);
        }
        let rest = name.strip_prefix(self.prefix)?;
        let unit: u32 = rest.parse().ok()?;
        if unit < u32::from(self.units) {
            Some(unit as RegUnit)
        } else {
            None
        }
    }

    fn write_unit(&self, f: &mut fmt::Formatter, unit: RegUnit) -> fmt::Result {
        if let Some(name) = self.names.get(unit as usize) {
            f.write_str(name)
        } else {
            write!(f, "{}{}", self.prefix, unit)
        }
    }
}

/// The full register description of an architecture.
pub struct RegInfo {
    /// All banks, one per class.
    pub banks: &'static [RegBank],
}

impl RegInfo {
    /// The bank for `class`, if the architecture has one.
    pub fn bank(&self, class: RegClass) -> Option<&RegBank> {
        self.banks.iter().find(|b| b.class == class)
    }

    /// Parse an architectural register name.
    pub fn parse_reg(&self, name: &str) -> Option<Reg> {
        for bank in self.banks {
            if let Some(unit) = bank.parse_unit(name) {
                return Some(Reg::new(bank.class, unit));
            }
        }
        None
    }

    /// Units the renamer may choose from for `class`, in ascending order.
    pub fn allocatable(&self, class: RegClass) -> Vec<RegUnit> {
        match self.bank(class) {
            None => Vec::new(),
            Some(bank) => (0..bank.units)
                .filter(|&u| bank.allocatable & (1 << u) != 0)
                .collect(),
        }
    }

    /// Displayable wrapper for `reg`.
    pub fn display(&self, reg: Reg) -> DisplayReg<'_> {
        DisplayReg { reg, info: self }
    }
}

/// Temporary object displaying a register with its architectural name.
pub struct DisplayReg<'a> {
    reg: Reg,
    info: &'a RegInfo,
}

impl fmt::Display for DisplayReg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.info.bank(self.reg.class) {
            Some(bank) => bank.write_unit(f, self.reg.unit),
            None => write!(f, "%INVALID{}", self.reg.unit),
        }
    }
}
