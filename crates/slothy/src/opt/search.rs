//! The stalls search: grow the budget until the model is satisfiable, then
//! tighten back down to the smallest budget that still is.
//!
//! Every attempt builds a fresh model; the only state carried between
//! attempts is the best schedule so far. Solver timeouts and budget
//! exhaustion are treated as infeasibility of that one attempt.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::Dfg;
use crate::isa::{ArchModel, UarchModel};
use crate::opt::decode::{self, Schedule};
use crate::opt::model::{encode, EncodeOpts};
use slothy_cp::{Limits, Outcome, Solve};
use std::time::Instant;

/// The budget ladder: the initial budget, then doubling, clamped to the cap.
fn budgets(initial: u32, cap: u32) -> Vec<u32> {
    let mut out = vec![initial.min(cap)];
    let mut b = initial;
    while b < cap {
        b = if b == 0 { 1 } else { b.saturating_mul(2) };
        out.push(b.min(cap));
    }
    out.dedup();
    out
}

/// Run the search and return the schedule at the lowest feasible budget.
pub fn run(
    dfg: &Dfg,
    arch: &dyn ArchModel,
    uarch: &dyn UarchModel,
    config: &Config,
    solver: &dyn Solve,
    loop_mode: bool,
    pass_tag: &str,
) -> Result<Schedule> {
    let opts = EncodeOpts {
        loop_mode,
        minimize_early: config.sw_pipelining.minimize_overlapping,
        minimize_depth: false,
    };
    let mut pass_seq = 0usize;

    let mut attempt = |stalls: u32| -> Result<Option<Schedule>> {
        pass_seq += 1;
        let (model, enc) = encode(dfg, arch, uarch, stalls, opts)?;
        if let Some(dir) = &config.dump_dir {
            let path = dir.join(format!("{pass_tag}_pass{pass_seq}_stalls{stalls}.model"));
            if let Err(err) = std::fs::write(&path, model.to_string()) {
                log::warn!("could not write model dump {}: {err}", path.display());
            }
        }
        let limits = Limits {
            max_steps: config.max_steps,
            deadline: config.timeout.map(|budget| Instant::now() + budget),
        };
        match solver.solve(&model, &limits) {
            Outcome::Sat(asg) => {
                let mut schedule = if loop_mode {
                    decode::decode_loop(dfg, arch, &enc, &asg)
                } else {
                    decode::decode_straight(dfg, arch, &enc, &asg)
                };
                schedule.stalls = stalls;
                log::info!("stalls {stalls}: feasible (makespan {})", schedule.makespan);
                Ok(Some(schedule))
            }
            Outcome::Unsat => {
                log::info!("stalls {stalls}: infeasible");
                Ok(None)
            }
            Outcome::Unknown => {
                log::info!("stalls {stalls}: solver budget exhausted, treating as infeasible");
                Ok(None)
            }
        }
    };

    let ladder = budgets(config.stalls.initial, config.stalls.cap);
    log::debug!("stalls search over {ladder:?}");
    let mut best = None;
    for &stalls in &ladder {
        if let Some(schedule) = attempt(stalls)? {
            best = Some(schedule);
            break;
        }
    }
    let Some(mut best) = best else {
        return Err(Error::Infeasible {
            cap: config.stalls.cap,
        });
    };

    // Tighten: walk back down while still feasible.
    while best.stalls > 0 {
        match attempt(best.stalls - 1)? {
            Some(schedule) => best = schedule,
            None => break,
        }
    }
    log::info!("accepted schedule at {} stalls", best.stalls);
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_ladder() {
        assert_eq!(budgets(0, 64), vec![0, 1, 2, 4, 8, 16, 32, 64]);
        assert_eq!(budgets(0, 5), vec![0, 1, 2, 4, 5]);
        assert_eq!(budgets(3, 3), vec![3]);
        assert_eq!(budgets(8, 4), vec![4]);
    }
}
