//! The solver interface and the built-in backtracking solver.
//!
//! The engine only depends on the `Solve` trait; `Backtrack` is the default
//! implementation. It runs depth-first search with propagation to fixpoint
//! at every node, branching on the smallest unassigned domain and trying
//! values in ascending order, which makes results deterministic. Objectives
//! are minimized by re-solving with a tightened bound until infeasible.

use crate::domain::{DomainStore, Var};
use crate::model::Model;
use crate::prop::fixpoint;
use cranelift_entity::EntityRef;
use std::time::Instant;

/// Search budget for one solver call.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Maximum number of branching decisions.
    pub max_steps: u64,
    /// Wall-clock cutoff.
    pub deadline: Option<Instant>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 2_000_000,
            deadline: None,
        }
    }
}

/// A satisfying assignment, indexed by variable.
#[derive(Clone, Debug)]
pub struct Assignment {
    values: Vec<i32>,
}

impl Assignment {
    /// The value of `var`.
    pub fn value(&self, var: Var) -> i32 {
        self.values[var.index()]
    }
}

/// Result of a solver call.
pub enum Outcome {
    /// A (for objectives: best found) solution.
    Sat(Assignment),
    /// Proven infeasible.
    Unsat,
    /// Search budget exhausted with no solution.
    Unknown,
}

/// The engine's view of a constraint solver.
pub trait Solve {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Solve `model` within `limits`.
    fn solve(&self, model: &Model, limits: &Limits) -> Outcome;
}

/// The built-in deterministic backtracking solver.
#[derive(Default)]
pub struct Backtrack;

impl Backtrack {
    /// A new solver handle.
    pub fn new() -> Self {
        Self
    }
}

enum Search {
    Sat(Vec<i32>),
    Unsat,
    Limit,
}

struct Dfs<'a> {
    model: &'a Model,
    limits: &'a Limits,
    steps: u64,
}

impl<'a> Dfs<'a> {
    fn out_of_budget(&self) -> bool {
        if self.steps > self.limits.max_steps {
            return true;
        }
        // Only poll the clock occasionally.
        if self.steps % 64 == 0 {
            if let Some(deadline) = self.limits.deadline {
                return Instant::now() > deadline;
            }
        }
        false
    }

    fn run(&mut self, mut store: DomainStore) -> Search {
        if fixpoint(&self.model.cons, &mut store).is_err() {
            return Search::Unsat;
        }
        let Some(var) = store.pick_branch_var() else {
            return Search::Sat(store.values());
        };
        let vals: Vec<i32> = store.dom(var).iter().collect();
        for v in vals {
            self.steps += 1;
            if self.out_of_budget() {
                return Search::Limit;
            }
            let mut child = store.clone();
            if child.assign(var, v).is_err() {
                continue;
            }
            match self.run(child) {
                Search::Sat(sol) => return Search::Sat(sol),
                Search::Limit => return Search::Limit,
                Search::Unsat => {}
            }
        }
        Search::Unsat
    }
}

impl Solve for Backtrack {
    fn name(&self) -> &'static str {
        "backtrack"
    }

    fn solve(&self, model: &Model, limits: &Limits) -> Outcome {
        let initial = model.initial_domains();
        let mut dfs = Dfs {
            model,
            limits,
            steps: 0,
        };
        let Some(obj) = model.objective else {
            return match dfs.run(DomainStore::new(initial)) {
                Search::Sat(values) => Outcome::Sat(Assignment { values }),
                Search::Unsat => Outcome::Unsat,
                Search::Limit => Outcome::Unknown,
            };
        };

        // Branch and bound: re-solve with a tightened objective bound until
        // the bound is proven infeasible.
        let mut best: Option<Vec<i32>> = None;
        let mut limit_hit = false;
        loop {
            let mut store = DomainStore::new(initial.clone());
            if let Some(prev) = &best {
                let bound = prev[obj.index()] - 1;
                if store.remove_above(obj, bound).is_err() {
                    break;
                }
            }
            match dfs.run(store) {
                Search::Sat(values) => {
                    log::debug!(
                        "objective {} improved to {} after {} steps",
                        obj,
                        values[obj.index()],
                        dfs.steps
                    );
                    let at_floor = values[obj.index()] <= model.var_data(obj).lo;
                    best = Some(values);
                    if at_floor {
                        break;
                    }
                }
                Search::Unsat => break,
                Search::Limit => {
                    limit_hit = true;
                    break;
                }
            }
        }
        match best {
            Some(values) => Outcome::Sat(Assignment { values }),
            None if limit_hit => Outcome::Unknown,
            None => Outcome::Unsat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prop::{Con, LifeVal, Lifetimes, Loc, UnitCap, UnitItem};
    use smallvec::smallvec;

    fn solve(model: &Model) -> Outcome {
        Backtrack::new().solve(model, &Limits::default())
    }

    #[test]
    fn chain_of_orderings() {
        let mut m = Model::new();
        let a = m.int_var("a", 0, 3);
        let b = m.int_var("b", 0, 3);
        let c = m.int_var("c", 0, 3);
        m.post(Con::OffsetLeq { a, b, k: 2 });
        m.post(Con::OffsetLeq { a: b, b: c, k: 1 });
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        assert_eq!(sol.value(a), 0);
        assert_eq!(sol.value(b), 2);
        assert_eq!(sol.value(c), 3);
    }

    #[test]
    fn ordering_infeasible() {
        let mut m = Model::new();
        let a = m.int_var("a", 0, 3);
        let b = m.int_var("b", 0, 3);
        m.post(Con::OffsetLeq { a, b, k: 4 });
        assert!(matches!(solve(&m), Outcome::Unsat));
    }

    #[test]
    fn alldifferent_permutation() {
        let mut m = Model::new();
        let vars: Vec<Var> = (0..4).map(|i| m.int_var(format!("p{i}"), 0, 3)).collect();
        m.post(Con::AllDifferent {
            vars: vars.clone(),
            modulus: None,
        });
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        let mut seen: Vec<i32> = vars.iter().map(|&v| sol.value(v)).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn alldifferent_modular() {
        // Three variables, residues mod 2: only two classes available.
        let mut m = Model::new();
        let vars: Vec<Var> = (0..3).map(|i| m.int_var(format!("p{i}"), 0, 5)).collect();
        m.post(Con::AllDifferent {
            vars,
            modulus: Some(2),
        });
        assert!(matches!(solve(&m), Outcome::Unsat));
    }

    #[test]
    fn capacity_limits_sharing() {
        let mut m = Model::new();
        let vars: Vec<Var> = (0..4).map(|i| m.int_var(format!("c{i}"), 0, 1)).collect();
        m.post(Con::Capacity {
            vars: vars.clone(),
            cap: 2,
            modulus: None,
        });
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        let zeros = vars.iter().filter(|&&v| sol.value(v) == 0).count();
        assert_eq!(zeros, 2);
    }

    #[test]
    fn reify_threshold() {
        // A false reifier pushes the tested variable above the threshold.
        let mut m = Model::new();
        let x = m.int_var("x", 0, 9);
        let b = m.int_var("b", 0, 0);
        m.post(Con::ReifyLeq { b, x, k: 4 });
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        assert_eq!(sol.value(x), 5);

        // And a low upper bound forces the reifier to true.
        let mut m = Model::new();
        let x = m.int_var("x", 0, 3);
        let b = m.bool_var("b");
        m.post(Con::ReifyLeq { b, x, k: 4 });
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        assert_eq!(sol.value(b), 1);
    }

    #[test]
    fn unit_capacity_spreads_cycles() {
        // Two single-alternative instructions on the same unit cannot share
        // a cycle.
        let mut m = Model::new();
        let c0 = m.int_var("c0", 0, 1);
        let c1 = m.int_var("c1", 0, 1);
        let a0 = m.int_var("a0", 0, 0);
        let a1 = m.int_var("a1", 0, 0);
        m.post(Con::UnitCap(UnitCap {
            cap: 1,
            modulus: None,
            items: vec![
                UnitItem {
                    cycle: c0,
                    alt: a0,
                    uses: 0b1,
                },
                UnitItem {
                    cycle: c1,
                    alt: a1,
                    uses: 0b1,
                },
            ],
        }));
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        assert_ne!(sol.value(c0), sol.value(c1));
    }

    #[test]
    fn minimize_sum() {
        let mut m = Model::new();
        let bools: Vec<Var> = (0..3).map(|i| m.bool_var(format!("b{i}"))).collect();
        let total = m.int_var("total", 0, 3);
        // b0 must be 1; the rest are free.
        m.post(Con::OffsetLeq {
            a: total,
            b: bools[0],
            k: -2,
        });
        m.post(Con::SumEq {
            vars: bools.clone(),
            total,
        });
        m.minimize(total);
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        // total - 2 <= b0 forces b0 = 1 only when total > 2; minimization
        // drives everything to zero instead.
        assert_eq!(sol.value(total), 0);
    }

    #[test]
    fn lifetimes_force_distinct_registers() {
        // Two values with overlapping intervals must get distinct units.
        let mut m = Model::new();
        let s0 = m.int_var("s0", 0, 0);
        let e0 = m.int_var("e0", 3, 3);
        let s1 = m.int_var("s1", 1, 1);
        let e1 = m.int_var("e1", 2, 2);
        let r0 = m.int_var_in("r0", &[0, 1]);
        let r1 = m.int_var_in("r1", &[0, 1]);
        m.post(Con::Lifetimes(Lifetimes {
            period: None,
            vals: vec![
                LifeVal {
                    reg: r0,
                    start: Loc::at(s0),
                    ends: smallvec![Loc::at(e0)],
                    external: false,
                },
                LifeVal {
                    reg: r1,
                    start: Loc::at(s1),
                    ends: smallvec![Loc::at(e1)],
                    external: false,
                },
            ],
            handoff: vec![],
        }));
        let Outcome::Sat(sol) = solve(&m) else {
            panic!("expected SAT");
        };
        assert_ne!(sol.value(r0), sol.value(r1));
    }

    #[test]
    fn lifetimes_handoff_allows_boundary_reuse() {
        // Value 1 is produced by the consumer of value 0 at the same point;
        // with a single register available only the handoff makes it SAT.
        let mut m = Model::new();
        let s0 = m.int_var("s0", 0, 0);
        let e0 = m.int_var("e0", 2, 2);
        let s1 = m.int_var("s1", 2, 2);
        let e1 = m.int_var("e1", 3, 3);
        let r0 = m.int_var_in("r0", &[5]);
        let r1 = m.int_var_in("r1", &[5]);
        let vals = vec![
            LifeVal {
                reg: r0,
                start: Loc::at(s0),
                ends: smallvec![Loc::at(e0)],
                external: false,
            },
            LifeVal {
                reg: r1,
                start: Loc::at(s1),
                ends: smallvec![Loc::at(e1)],
                external: false,
            },
        ];
        m.post(Con::Lifetimes(Lifetimes {
            period: None,
            vals: vals.clone(),
            handoff: vec![(0, 1, 0)],
        }));
        assert!(matches!(solve(&m), Outcome::Sat(_)));

        let mut m2 = Model::new();
        let s0 = m2.int_var("s0", 0, 0);
        let e0 = m2.int_var("e0", 2, 2);
        let s1 = m2.int_var("s1", 2, 2);
        let e1 = m2.int_var("e1", 3, 3);
        let r0 = m2.int_var_in("r0", &[5]);
        let r1 = m2.int_var_in("r1", &[5]);
        m2.post(Con::Lifetimes(Lifetimes {
            period: None,
            vals: vec![
                LifeVal {
                    reg: r0,
                    start: Loc::at(s0),
                    ends: smallvec![Loc::at(e0)],
                    external: false,
                },
                LifeVal {
                    reg: r1,
                    start: Loc::at(s1),
                    ends: smallvec![Loc::at(e1)],
                    external: false,
                },
            ],
            handoff: vec![],
        }));
        assert!(matches!(solve(&m2), Outcome::Unsat));
    }

    #[test]
    fn step_limit_reports_unknown() {
        let mut m = Model::new();
        let vars: Vec<Var> = (0..8).map(|i| m.int_var(format!("v{i}"), 0, 7)).collect();
        m.post(Con::AllDifferent {
            vars: vars.clone(),
            modulus: None,
        });
        // Unsatisfiable pigeonhole on top: nine variables into eight values.
        let extra = m.int_var("v8", 0, 7);
        let mut all = vars;
        all.push(extra);
        m.post(Con::AllDifferent {
            vars: all,
            modulus: None,
        });
        let limits = Limits {
            max_steps: 1,
            deadline: None,
        };
        assert!(matches!(
            Backtrack::new().solve(&m, &limits),
            Outcome::Unknown
        ));
    }
}
