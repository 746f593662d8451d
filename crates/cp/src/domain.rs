//! Finite-domain variables and bit-set domains.
//!
//! A variable's domain is a set of `i32` values stored as a bit vector with a
//! base offset, so domains over negative ranges cost nothing extra. Domains
//! are small (schedule positions, cycles, register units), so whole-domain
//! scans are cheap and the store is cloned at every search decision instead
//! of keeping an undo trail.

use cranelift_entity::{entity_impl, EntityRef};
use smallvec::{smallvec, SmallVec};

/// A finite-domain integer variable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);
entity_impl!(Var, "x");

/// Marker for a propagation step that emptied a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

/// Result of one propagation step: `Ok(true)` when some domain shrank.
pub type PropResult = Result<bool, Empty>;

/// Set of candidate values for one variable.
#[derive(Clone, PartialEq)]
pub struct Domain {
    base: i32,
    nbits: u32,
    words: SmallVec<[u64; 4]>,
}

impl Domain {
    /// The full interval `[lo, hi]`.
    pub fn range(lo: i32, hi: i32) -> Self {
        debug_assert!(lo <= hi, "empty initial range {lo}..={hi}");
        let nbits = (hi - lo + 1) as u32;
        let nwords = ((nbits + 63) / 64) as usize;
        let mut words: SmallVec<[u64; 4]> = smallvec![!0u64; nwords];
        let tail = nbits % 64;
        if tail != 0 {
            words[nwords - 1] = (1u64 << tail) - 1;
        }
        Self {
            base: lo,
            nbits,
            words,
        }
    }

    /// An explicit value set. `values` must be non-empty.
    pub fn from_values(values: &[i32]) -> Self {
        let lo = values.iter().copied().min().expect("empty value set");
        let hi = values.iter().copied().max().expect("empty value set");
        let mut dom = Self::range(lo, hi);
        for w in &mut dom.words {
            *w = 0;
        }
        for &v in values {
            let bit = (v - lo) as u32;
            dom.words[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
        dom
    }

    fn bit(&self, v: i32) -> Option<(usize, u64)> {
        if v < self.base {
            return None;
        }
        let i = (v as i64 - self.base as i64) as u64;
        if i >= u64::from(self.nbits) {
            return None;
        }
        Some(((i / 64) as usize, 1u64 << (i % 64)))
    }

    /// Is `v` still a candidate?
    pub fn contains(&self, v: i32) -> bool {
        self.bit(v).map_or(false, |(w, m)| self.words[w] & m != 0)
    }

    /// No candidates left.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of candidates.
    pub fn size(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Smallest candidate.
    pub fn min(&self) -> Option<i32> {
        for (wi, &w) in self.words.iter().enumerate() {
            if w != 0 {
                return Some(self.base + wi as i32 * 64 + w.trailing_zeros() as i32);
            }
        }
        None
    }

    /// Largest candidate.
    pub fn max(&self) -> Option<i32> {
        for (wi, &w) in self.words.iter().enumerate().rev() {
            if w != 0 {
                return Some(self.base + wi as i32 * 64 + 63 - w.leading_zeros() as i32);
            }
        }
        None
    }

    /// The single remaining value, if the domain is a singleton.
    pub fn value(&self) -> Option<i32> {
        if self.size() == 1 {
            self.min()
        } else {
            None
        }
    }

    /// Remove `v`. Returns whether anything changed.
    pub fn remove(&mut self, v: i32) -> bool {
        if let Some((w, m)) = self.bit(v) {
            if self.words[w] & m != 0 {
                self.words[w] &= !m;
                return true;
            }
        }
        false
    }

    /// Remove every value strictly below `v`.
    pub fn remove_below(&mut self, v: i32) -> bool {
        if v <= self.base {
            return false;
        }
        let cut = ((v as i64 - self.base as i64) as u64).min(u64::from(self.nbits)) as u32;
        let full = (cut / 64) as usize;
        let mut changed = false;
        for w in self.words.iter_mut().take(full) {
            if *w != 0 {
                *w = 0;
                changed = true;
            }
        }
        let rem = cut % 64;
        if rem != 0 && full < self.words.len() {
            let masked = self.words[full] & !((1u64 << rem) - 1);
            if masked != self.words[full] {
                self.words[full] = masked;
                changed = true;
            }
        }
        changed
    }

    /// Remove every value strictly above `v`.
    pub fn remove_above(&mut self, v: i32) -> bool {
        if v >= self.base + self.nbits as i32 - 1 {
            return false;
        }
        let mut changed = false;
        if v < self.base {
            for w in self.words.iter_mut() {
                if *w != 0 {
                    *w = 0;
                    changed = true;
                }
            }
            return changed;
        }
        let keep = (v as i64 - self.base as i64) as u64 as u32 + 1;
        let full = (keep / 64) as usize;
        let rem = keep % 64;
        let mut first_cleared = full;
        if rem != 0 {
            let masked = self.words[full] & ((1u64 << rem) - 1);
            if masked != self.words[full] {
                self.words[full] = masked;
                changed = true;
            }
            first_cleared = full + 1;
        }
        for w in self.words.iter_mut().skip(first_cleared) {
            if *w != 0 {
                *w = 0;
                changed = true;
            }
        }
        changed
    }

    /// Remove every value congruent to `rem` modulo `m`. `rem` must already
    /// be normalized to `[0, m)`.
    pub fn remove_class(&mut self, rem: i32, m: i32) -> bool {
        debug_assert!(m > 0 && (0..m).contains(&rem));
        let doomed: SmallVec<[i32; 8]> = self.iter().filter(|v| v.rem_euclid(m) == rem).collect();
        let mut changed = false;
        for v in doomed {
            changed |= self.remove(v);
        }
        changed
    }

    /// Drop values not present in `other`.
    pub fn retain_in(&mut self, other: &Domain) -> bool {
        let doomed: SmallVec<[i32; 8]> = self.iter().filter(|&v| !other.contains(v)).collect();
        let mut changed = false;
        for v in doomed {
            changed |= self.remove(v);
        }
        changed
    }

    /// Iterate candidates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        let base = self.base;
        self.words.iter().enumerate().flat_map(move |(wi, &w)| {
            let mut bits = w;
            core::iter::from_fn(move || {
                if bits == 0 {
                    None
                } else {
                    let b = bits.trailing_zeros();
                    bits &= bits - 1;
                    Some(base + wi as i32 * 64 + b as i32)
                }
            })
        })
    }
}

/// All domains of a model, indexed by `Var`. Cloned wholesale on every
/// search decision; every mutating operation reports emptiness via
/// `PropResult` so the non-empty invariant holds after any `Ok`.
#[derive(Clone)]
pub struct DomainStore {
    doms: Vec<Domain>,
}

impl DomainStore {
    /// Wrap the initial domains of a model.
    pub fn new(doms: Vec<Domain>) -> Self {
        Self { doms }
    }

    /// The current domain of `x`.
    pub fn dom(&self, x: Var) -> &Domain {
        &self.doms[x.index()]
    }

    /// Lower bound of `x`.
    pub fn lo(&self, x: Var) -> i32 {
        self.doms[x.index()].min().expect("domain invariant: non-empty")
    }

    /// Upper bound of `x`.
    pub fn hi(&self, x: Var) -> i32 {
        self.doms[x.index()].max().expect("domain invariant: non-empty")
    }

    /// The assigned value of `x`, if any.
    pub fn assigned(&self, x: Var) -> Option<i32> {
        self.doms[x.index()].value()
    }

    /// Every variable is down to one value.
    pub fn all_assigned(&self) -> bool {
        self.doms.iter().all(|d| d.size() == 1)
    }

    /// Snapshot all singleton values, by variable index.
    pub fn values(&self) -> Vec<i32> {
        self.doms
            .iter()
            .map(|d| d.value().expect("values() on partial assignment"))
            .collect()
    }

    /// Lowest-indexed unassigned variable with the smallest domain.
    pub fn pick_branch_var(&self) -> Option<Var> {
        use cranelift_entity::EntityRef;
        let mut best: Option<(u32, usize)> = None;
        for (i, d) in self.doms.iter().enumerate() {
            let size = d.size();
            if size > 1 && best.map_or(true, |(bs, _)| size < bs) {
                best = Some((size, i));
            }
        }
        best.map(|(_, i)| Var::new(i))
    }

    fn check(&self, x: Var, changed: bool) -> PropResult {
        if self.doms[x.index()].is_empty() {
            Err(Empty)
        } else {
            Ok(changed)
        }
    }

    /// Remove one value.
    pub fn remove(&mut self, x: Var, v: i32) -> PropResult {
        let ch = self.doms[x.index()].remove(v);
        self.check(x, ch)
    }

    /// Tighten the lower bound to `v`.
    pub fn remove_below(&mut self, x: Var, v: i32) -> PropResult {
        let ch = self.doms[x.index()].remove_below(v);
        self.check(x, ch)
    }

    /// Tighten the upper bound to `v`.
    pub fn remove_above(&mut self, x: Var, v: i32) -> PropResult {
        let ch = self.doms[x.index()].remove_above(v);
        self.check(x, ch)
    }

    /// Remove a whole residue class.
    pub fn remove_class(&mut self, x: Var, rem: i32, m: i32) -> PropResult {
        let ch = self.doms[x.index()].remove_class(rem, m);
        self.check(x, ch)
    }

    /// Fix `x` to `v`.
    pub fn assign(&mut self, x: Var, v: i32) -> PropResult {
        if !self.doms[x.index()].contains(v) {
            return Err(Empty);
        }
        if self.doms[x.index()].size() == 1 {
            return Ok(false);
        }
        self.doms[x.index()] = Domain::from_values(&[v]);
        Ok(true)
    }

    /// Intersect the domains of `a` and `b` (both directions).
    pub fn equalize(&mut self, a: Var, b: Var) -> PropResult {
        let other = self.doms[b.index()].clone();
        let mut ch = self.doms[a.index()].retain_in(&other);
        self.check(a, ch)?;
        let this = self.doms[a.index()].clone();
        ch |= self.doms[b.index()].retain_in(&this);
        self.check(b, ch)
    }
}
