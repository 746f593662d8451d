//! Constraints and their propagators.
//!
//! Each constraint filters candidate values from the domains it watches.
//! Filtering strength varies: the binary orderings do full bounds
//! propagation, the global constraints do forward checking plus a complete
//! violation check once their variables are assigned. That is enough for
//! soundness and completeness under the exhaustive search in `solve`.

use crate::domain::{DomainStore, Empty, PropResult, Var};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// A program point: a position/cycle variable plus a constant offset, or a
/// constant alone (virtual producers and required-output sentinels).
#[derive(Clone, Copy, Debug)]
pub struct Loc {
    /// The underlying variable, if the point is scheduled by the solver.
    pub var: Option<Var>,
    /// Constant offset added to the variable (or the absolute point).
    pub off: i32,
}

impl Loc {
    /// A point tied to a variable.
    pub fn at(var: Var) -> Self {
        Self {
            var: Some(var),
            off: 0,
        }
    }

    /// A point tied to a variable, displaced by `off`.
    pub fn shifted(var: Var, off: i32) -> Self {
        Self {
            var: Some(var),
            off,
        }
    }

    /// A fixed point.
    pub fn fixed(off: i32) -> Self {
        Self { var: None, off }
    }

    fn bounds(&self, store: &DomainStore) -> (i32, i32) {
        match self.var {
            None => (self.off, self.off),
            Some(v) => (store.lo(v) + self.off, store.hi(v) + self.off),
        }
    }
}

/// One value's register lifetime: the chosen unit, the defining point, and
/// the points of its consumers. The live interval is
/// `[start, max(start, ends...)]`, closed on both sides.
#[derive(Clone, Debug)]
pub struct LifeVal {
    /// Register-unit variable of the value.
    pub reg: Var,
    /// Defining point.
    pub start: Loc,
    /// Consumer points.
    pub ends: SmallVec<[Loc; 4]>,
    /// The value is defined outside the scheduled window (virtual source)
    /// and is exempt from the periodic self-overlap check.
    pub external: bool,
}

/// Pairwise disjointness of register lifetimes mapped to the same unit.
///
/// With `period = Some(p)`, intervals are also compared against their
/// neighbours' copies shifted by `±p` (periodic schedules), and each value is
/// checked against its own next-period copy.
#[derive(Clone, Debug)]
pub struct Lifetimes {
    /// Periodic shift, for pipelined kernels.
    pub period: Option<i32>,
    /// The tracked values.
    pub vals: Vec<LifeVal>,
    /// `(i, j, shift)`: value `j`'s copy shifted by `shift` is produced by a
    /// consumer of value `i`, so it may begin exactly where `i` ends.
    pub handoff: Vec<(u32, u32, i32)>,
}

/// Per-unit occupancy limit for one functional unit.
#[derive(Clone, Debug)]
pub struct UnitCap {
    /// How many instructions may hold the unit in one cycle.
    pub cap: u32,
    /// Compare cycles modulo this period, if set.
    pub modulus: Option<i32>,
    /// The instructions that can use the unit.
    pub items: Vec<UnitItem>,
}

/// One instruction competing for a functional unit.
#[derive(Clone, Copy, Debug)]
pub struct UnitItem {
    /// The instruction's cycle variable.
    pub cycle: Var,
    /// The instruction's unit-alternative variable.
    pub alt: Var,
    /// Bit `a` set: alternative `a` occupies this unit.
    pub uses: u64,
}

/// A constraint over finite-domain variables.
#[derive(Clone, Debug)]
pub enum Con {
    /// `a + k <= b`.
    OffsetLeq {
        /// Left variable.
        a: Var,
        /// Right variable.
        b: Var,
        /// Offset added to `a`.
        k: i32,
    },
    /// `a == b`.
    Eq {
        /// Left variable.
        a: Var,
        /// Right variable.
        b: Var,
    },
    /// `b = 1` iff `x <= k` (`b` is a 0/1 variable).
    ReifyLeq {
        /// The reifying boolean.
        b: Var,
        /// The tested variable.
        x: Var,
        /// The threshold.
        k: i32,
    },
    /// All variables take pairwise distinct values; with `modulus`,
    /// pairwise distinct residues.
    AllDifferent {
        /// The variables.
        vars: Vec<Var>,
        /// Compare residues modulo this, if set.
        modulus: Option<i32>,
    },
    /// At most `cap` variables share any one value (or residue).
    Capacity {
        /// The variables.
        vars: Vec<Var>,
        /// The per-value limit.
        cap: u32,
        /// Compare residues modulo this, if set.
        modulus: Option<i32>,
    },
    /// Functional-unit occupancy.
    UnitCap(UnitCap),
    /// `(ca < cb) => (pa < pb)`: position order follows cycle order.
    Channel {
        /// Cycle of the first node.
        ca: Var,
        /// Cycle of the second node.
        cb: Var,
        /// Position of the first node.
        pa: Var,
        /// Position of the second node.
        pb: Var,
    },
    /// `total = sum(vars)` over 0/1 variables.
    SumEq {
        /// The 0/1 variables.
        vars: Vec<Var>,
        /// The sum.
        total: Var,
    },
    /// Register-lifetime disjointness.
    Lifetimes(Lifetimes),
}

/// Run one filtering pass of `con` against `store`.
pub fn propagate(con: &Con, store: &mut DomainStore) -> PropResult {
    match con {
        Con::OffsetLeq { a, b, k } => {
            let mut ch = store.remove_below(*b, store.lo(*a) + k)?;
            ch |= store.remove_above(*a, store.hi(*b) - k)?;
            Ok(ch)
        }
        Con::Eq { a, b } => store.equalize(*a, *b),
        Con::ReifyLeq { b, x, k } => {
            let mut ch = false;
            if store.hi(*x) <= *k {
                ch |= store.assign(*b, 1)?;
            } else if store.lo(*x) > *k {
                ch |= store.assign(*b, 0)?;
            }
            match store.assigned(*b) {
                Some(1) => ch |= store.remove_above(*x, *k)?,
                Some(0) => ch |= store.remove_below(*x, *k + 1)?,
                _ => {}
            }
            Ok(ch)
        }
        Con::AllDifferent { vars, modulus } => {
            let mut ch = false;
            for (i, &x) in vars.iter().enumerate() {
                let Some(val) = store.assigned(x) else {
                    continue;
                };
                for (j, &y) in vars.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    ch |= match modulus {
                        None => store.remove(y, val)?,
                        Some(m) => store.remove_class(y, val.rem_euclid(*m), *m)?,
                    };
                }
            }
            Ok(ch)
        }
        Con::Capacity { vars, cap, modulus } => {
            let key = |v: i32| modulus.map_or(v, |m| v.rem_euclid(m));
            let mut counts: FxHashMap<i32, u32> = FxHashMap::default();
            for &x in vars {
                if let Some(v) = store.assigned(x) {
                    *counts.entry(key(v)).or_insert(0) += 1;
                }
            }
            let mut ch = false;
            for (&k, &n) in &counts {
                if n > *cap {
                    return Err(Empty);
                }
                if n < *cap {
                    continue;
                }
                for &x in vars {
                    match store.assigned(x) {
                        Some(v) if key(v) == k => {}
                        _ => {
                            ch |= match modulus {
                                None => store.remove(x, k)?,
                                Some(m) => store.remove_class(x, k, *m)?,
                            };
                        }
                    }
                }
            }
            Ok(ch)
        }
        Con::UnitCap(uc) => propagate_unit_cap(uc, store),
        Con::Channel { ca, cb, pa, pb } => {
            let mut ch = false;
            if store.hi(*ca) < store.lo(*cb) {
                ch |= store.remove_below(*pb, store.lo(*pa) + 1)?;
                ch |= store.remove_above(*pa, store.hi(*pb) - 1)?;
            }
            if store.lo(*pa) > store.hi(*pb) {
                // Position order is fixed the other way, so the cycles may
                // not be strictly increasing.
                ch |= store.remove_above(*cb, store.hi(*ca))?;
                ch |= store.remove_below(*ca, store.lo(*cb))?;
            }
            Ok(ch)
        }
        Con::SumEq { vars, total } => {
            let mut smin = 0i32;
            let mut smax = 0i32;
            for &x in vars {
                smin += store.lo(x);
                smax += store.hi(x);
            }
            let mut ch = store.remove_below(*total, smin)?;
            ch |= store.remove_above(*total, smax)?;
            if store.hi(*total) == smin {
                for &x in vars {
                    if store.assigned(x).is_none() {
                        let lo = store.lo(x);
                        ch |= store.assign(x, lo)?;
                    }
                }
            } else if store.lo(*total) == smax {
                for &x in vars {
                    if store.assigned(x).is_none() {
                        let hi = store.hi(x);
                        ch |= store.assign(x, hi)?;
                    }
                }
            }
            Ok(ch)
        }
        Con::Lifetimes(lt) => propagate_lifetimes(lt, store),
    }
}

fn propagate_unit_cap(uc: &UnitCap, store: &mut DomainStore) -> PropResult {
    let key = |v: i32| uc.modulus.map_or(v, |m| v.rem_euclid(m));
    let mut counts: FxHashMap<i32, u32> = FxHashMap::default();
    for it in &uc.items {
        if let (Some(c), Some(a)) = (store.assigned(it.cycle), store.assigned(it.alt)) {
            if it.uses >> a & 1 == 1 {
                *counts.entry(key(c)).or_insert(0) += 1;
            }
        }
    }
    let mut ch = false;
    for (&t, &n) in &counts {
        if n > uc.cap {
            return Err(Empty);
        }
        if n < uc.cap {
            continue;
        }
        for it in &uc.items {
            let committed = matches!(
                (store.assigned(it.cycle), store.assigned(it.alt)),
                (Some(c), Some(a)) if key(c) == t && it.uses >> a & 1 == 1
            );
            if committed {
                continue;
            }
            let must_use = store.dom(it.alt).iter().all(|a| it.uses >> a & 1 == 1);
            if must_use {
                ch |= match uc.modulus {
                    None => store.remove(it.cycle, t)?,
                    Some(m) => store.remove_class(it.cycle, t, m)?,
                };
            } else if store.assigned(it.cycle).map(key) == Some(t) {
                let bad: SmallVec<[i32; 8]> = store
                    .dom(it.alt)
                    .iter()
                    .filter(|&a| it.uses >> a & 1 == 1)
                    .collect();
                for a in bad {
                    ch |= store.remove(it.alt, a)?;
                }
            }
        }
    }
    Ok(ch)
}

/// Interval bounds of one lifetime: start and end, each as (lo, hi).
fn life_bounds(val: &LifeVal, store: &DomainStore) -> (i32, i32, i32, i32) {
    let (s_lo, s_hi) = val.start.bounds(store);
    let mut e_lo = s_lo;
    let mut e_hi = s_hi;
    for end in &val.ends {
        let (lo, hi) = end.bounds(store);
        e_lo = e_lo.max(lo);
        e_hi = e_hi.max(hi);
    }
    (s_lo, s_hi, e_lo, e_hi)
}

fn propagate_lifetimes(lt: &Lifetimes, store: &mut DomainStore) -> PropResult {
    let handed = |i: u32, j: u32, d: i32| lt.handoff.iter().any(|&h| h == (i, j, d));
    let bounds: Vec<(i32, i32, i32, i32)> =
        lt.vals.iter().map(|v| life_bounds(v, store)).collect();

    // Can interval i still be placed entirely before j's copy shifted by d?
    // With a handoff the intervals may share the boundary point.
    let fits_before = |i: usize, j: usize, d: i32| {
        let (_, _, ei_lo, _) = bounds[i];
        let (_, sj_hi, _, _) = bounds[j];
        if handed(i as u32, j as u32, d) {
            ei_lo <= sj_hi + d
        } else {
            ei_lo < sj_hi + d
        }
    };

    let shifts: SmallVec<[i32; 3]> = match lt.period {
        None => SmallVec::from_slice(&[0]),
        Some(p) => SmallVec::from_slice(&[-p, 0, p]),
    };

    let mut ch = false;
    for i in 0..lt.vals.len() {
        // Self check: a periodic value must fit within one period.
        if let Some(p) = lt.period {
            if !lt.vals[i].external && !fits_before(i, i, p) {
                return Err(Empty);
            }
        }
        for j in i + 1..lt.vals.len() {
            for &d in &shifts {
                // j's copy shifted by d: conflict is certain when neither
                // "i before j" nor "j before i" can still hold.
                if fits_before(i, j, d) || fits_before(j, i, -d) {
                    continue;
                }
                match (store.assigned(lt.vals[i].reg), store.assigned(lt.vals[j].reg)) {
                    (Some(a), Some(b)) => {
                        if a == b {
                            return Err(Empty);
                        }
                    }
                    (Some(a), None) => ch |= store.remove(lt.vals[j].reg, a)?,
                    (None, Some(b)) => ch |= store.remove(lt.vals[i].reg, b)?,
                    (None, None) => {}
                }
            }
        }
    }
    Ok(ch)
}

/// Propagate all constraints to a fixpoint.
pub fn fixpoint(cons: &[Con], store: &mut DomainStore) -> Result<(), Empty> {
    loop {
        let mut changed = false;
        for con in cons {
            changed |= propagate(con, store)?;
        }
        if !changed {
            return Ok(());
        }
    }
}
