//! The constraint model: variables, constraints, objective, and the textual
//! dump format used for per-pass debugging artifacts.

use crate::domain::{Domain, Var};
use crate::prop::Con;
use cranelift_entity::PrimaryMap;
use core::fmt;

/// Declared bounds and debug name of one variable.
#[derive(Clone, Debug)]
pub struct VarData {
    /// Debug name, shown in dumps.
    pub name: String,
    /// Smallest candidate value.
    pub lo: i32,
    /// Largest candidate value.
    pub hi: i32,
    /// Explicit candidate set, when the domain is not a full interval.
    pub allowed: Option<Vec<i32>>,
}

/// A complete constraint model for one solver call.
#[derive(Default)]
pub struct Model {
    vars: PrimaryMap<Var, VarData>,
    /// Posted constraints.
    pub cons: Vec<Con>,
    /// Variable to minimize, if any.
    pub objective: Option<Var>,
}

impl Model {
    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// New integer variable over `[lo, hi]`.
    pub fn int_var(&mut self, name: impl Into<String>, lo: i32, hi: i32) -> Var {
        debug_assert!(lo <= hi);
        self.vars.push(VarData {
            name: name.into(),
            lo,
            hi,
            allowed: None,
        })
    }

    /// New integer variable over an explicit non-empty value set.
    pub fn int_var_in(&mut self, name: impl Into<String>, values: &[i32]) -> Var {
        debug_assert!(!values.is_empty());
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let lo = sorted[0];
        let hi = *sorted.last().expect("non-empty");
        self.vars.push(VarData {
            name: name.into(),
            lo,
            hi,
            allowed: Some(sorted),
        })
    }

    /// New 0/1 variable.
    pub fn bool_var(&mut self, name: impl Into<String>) -> Var {
        self.int_var(name, 0, 1)
    }

    /// Post a constraint.
    pub fn post(&mut self, con: Con) {
        self.cons.push(con);
    }

    /// Minimize `var`.
    pub fn minimize(&mut self, var: Var) {
        self.objective = Some(var);
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Bounds and name of `var`.
    pub fn var_data(&self, var: Var) -> &VarData {
        &self.vars[var]
    }

    /// The initial domain of every variable, in variable order.
    pub fn initial_domains(&self) -> Vec<Domain> {
        self.vars
            .values()
            .map(|vd| match &vd.allowed {
                Some(set) => Domain::from_values(set),
                None => Domain::range(vd.lo, vd.hi),
            })
            .collect()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "model: {} vars, {} constraints",
            self.vars.len(),
            self.cons.len()
        )?;
        for (var, vd) in self.vars.iter() {
            match &vd.allowed {
                Some(set) => {
                    write!(f, "  {var} {} in {{", vd.name)?;
                    for (i, v) in set.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{v}")?;
                    }
                    writeln!(f, "}}")?;
                }
                None => writeln!(f, "  {var} {} in [{}, {}]", vd.name, vd.lo, vd.hi)?,
            }
        }
        for con in &self.cons {
            match con {
                Con::OffsetLeq { a, b, k } => writeln!(f, "  {a} + {k} <= {b}")?,
                Con::Eq { a, b } => writeln!(f, "  {a} == {b}")?,
                Con::ReifyLeq { b, x, k } => writeln!(f, "  {b} <=> ({x} <= {k})")?,
                Con::AllDifferent { vars, modulus } => {
                    write!(f, "  alldifferent")?;
                    if let Some(m) = modulus {
                        write!(f, " mod {m}")?;
                    }
                    write!(f, ":")?;
                    for v in vars {
                        write!(f, " {v}")?;
                    }
                    writeln!(f)?;
                }
                Con::Capacity { vars, cap, modulus } => {
                    write!(f, "  capacity {cap}")?;
                    if let Some(m) = modulus {
                        write!(f, " mod {m}")?;
                    }
                    write!(f, ":")?;
                    for v in vars {
                        write!(f, " {v}")?;
                    }
                    writeln!(f)?;
                }
                Con::UnitCap(uc) => {
                    write!(f, "  unitcap {}", uc.cap)?;
                    if let Some(m) = uc.modulus {
                        write!(f, " mod {m}")?;
                    }
                    write!(f, ":")?;
                    for it in &uc.items {
                        write!(f, " ({}, {}, {:#x})", it.cycle, it.alt, it.uses)?;
                    }
                    writeln!(f)?;
                }
                Con::Channel { ca, cb, pa, pb } => {
                    writeln!(f, "  ({ca} < {cb}) => ({pa} < {pb})")?
                }
                Con::SumEq { vars, total } => {
                    write!(f, "  sum(")?;
                    for (i, v) in vars.iter().enumerate() {
                        if i > 0 {
                            write!(f, " + ")?;
                        }
                        write!(f, "{v}")?;
                    }
                    writeln!(f, ") == {total}")?;
                }
                Con::Lifetimes(lt) => {
                    write!(f, "  lifetimes")?;
                    if let Some(p) = lt.period {
                        write!(f, " period {p}")?;
                    }
                    writeln!(f, ": {} values, {} handoffs", lt.vals.len(), lt.handoff.len())?;
                }
            }
        }
        if let Some(obj) = self.objective {
            writeln!(f, "  minimize {obj}")?;
        }
        Ok(())
    }
}
