//! Slothy: an assembly-level superoptimizer.
//!
//! Given a block of hand-written assembly and a pair of architecture /
//! microarchitecture tables, Slothy jointly performs instruction
//! scheduling, architectural register renaming, and (in loop mode)
//! software pipelining. It never rewrites or replaces instructions: the
//! output is a permutation and renaming of the input whose data-flow graph
//! is provably unchanged, checked independently before anything is
//! returned.
//!
//! ```no_run
//! use slothy::{Config, Slothy};
//!
//! let target = slothy::isa::lookup_by_name("armv81m")?.finish()?;
//! let engine = Slothy::new(target, Config::new())?;
//! let out = engine.optimize("vldrw.u32 q0, [r0]\nvstrw.u32 q0, [r1]\n")?;
//! println!("{}", out.text);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod ir;
pub mod isa;
pub mod opt;
pub mod parse;

pub use crate::config::{Config, MemPolicy, Window};
pub use crate::error::{Error, Result};
pub use crate::isa::Target;
pub use crate::opt::{Schedule, ScheduleKind};

use crate::ir::{BuildParams, Instruction};
use crate::opt::decode::ScheduledInst;
use crate::parse::SourceFile;
use slothy_cp::{Backtrack, Solve};

/// An optimized block: the rewritten source text plus the schedule that
/// produced it.
pub struct Optimized {
    /// The full output file.
    pub text: String,
    /// The durable result artifact.
    pub schedule: Schedule,
}

/// The engine: a configured target plus one solver handle.
pub struct Slothy {
    target: Target,
    config: Config,
    solver: Box<dyn Solve>,
}

impl Slothy {
    /// Bind a target and configuration. Configuration errors surface here.
    pub fn new(target: Target, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            target,
            config,
            solver: Box::new(Backtrack::new()),
        })
    }

    /// Swap in a different solver implementation.
    pub fn with_solver(mut self, solver: Box<dyn Solve>) -> Self {
        self.solver = solver;
        self
    }

    /// The bound configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn build_params(&self, loop_mode: bool) -> BuildParams<'_> {
        BuildParams {
            hints: &self.config.typing_hints,
            inputs: &self.config.inputs,
            outputs: &self.config.outputs,
            policy: self.config.memory_aliasing,
            keep_load_order: !self.config.allow_reordering_of_loads,
            loop_mode,
        }
    }

    fn window_bounds(&self, file: &SourceFile) -> Result<(usize, usize)> {
        match &self.config.window {
            Window::All => Ok((0, file.lines.len())),
            Window::Labels { start, end } => {
                let s = file
                    .find_label(start)
                    .ok_or_else(|| Error::Config(format!("start label `{start}` not found")))?;
                let e = file
                    .find_label(end)
                    .ok_or_else(|| Error::Config(format!("end label `{end}` not found")))?;
                if e < s + 1 {
                    return Err(Error::Config(format!(
                        "end label `{end}` precedes start label `{start}`"
                    )));
                }
                Ok((s + 1, e))
            }
            Window::Markers => file.marked_region().ok_or_else(|| {
                Error::Config("missing slothy:start / slothy:end markers".to_string())
            }),
        }
    }

    fn classify_lines(&self, file: &SourceFile, idxs: impl Iterator<Item = usize>) -> Result<Vec<Instruction>> {
        let mut insts = Vec::new();
        for idx in idxs {
            let line = &file.lines[idx];
            if let Some(code) = &line.code {
                insts.push(Instruction::classify(
                    self.target.arch.as_ref(),
                    code,
                    line.line,
                )?);
            }
        }
        Ok(insts)
    }

    /// Optimize the configured window of a straight-line block.
    pub fn optimize(&self, source: &str) -> Result<Optimized> {
        let file = parse::parse_source(source)?;
        let (start, end) = self.window_bounds(&file)?;
        let insts = self.classify_lines(&file, start..end)?;
        if insts.is_empty() {
            return Ok(Optimized {
                text: source.to_string(),
                schedule: Schedule::empty(),
            });
        }
        log::info!("optimizing {} instructions", insts.len());
        let arch = self.target.arch.as_ref();
        let dfg = ir::build(arch, insts, &self.build_params(false))?;
        let schedule = opt::search::run(
            &dfg,
            arch,
            self.target.uarch.as_ref(),
            &self.config,
            self.solver.as_ref(),
            false,
            "optimize",
        )?;
        if self.config.selfcheck {
            opt::selfcheck::check(
                arch,
                self.config.memory_aliasing,
                !self.config.allow_reordering_of_loads,
                &dfg,
                &schedule,
            )?;
        }

        let mut text = String::new();
        for line in &file.lines[..start] {
            text.push_str(&line.raw);
            text.push('\n');
        }
        if let ScheduleKind::Straight(lines) = &schedule.kind {
            for line in lines {
                push_scheduled(&mut text, line);
            }
        }
        for line in &file.lines[end..] {
            text.push_str(&line.raw);
            text.push('\n');
        }
        Ok(Optimized { text, schedule })
    }

    /// Optimize the loop starting at `label`, software-pipelining it when
    /// `sw_pipelining.enabled` is set.
    pub fn optimize_loop(&self, source: &str, label: &str) -> Result<Optimized> {
        let file = parse::parse_source(source)?;
        let arch = self.target.arch.as_ref();
        let shape = opt::pipeline::locate(&file, arch, label)?;
        let body = self.classify_lines(&file, shape.body_lines.iter().copied())?;
        if body.is_empty() {
            return Ok(Optimized {
                text: source.to_string(),
                schedule: Schedule::empty(),
            });
        }
        let pipelined = self.config.sw_pipelining.enabled;
        let insts = if pipelined {
            opt::pipeline::unroll(&body, self.config.sw_pipelining.unroll)
        } else {
            body
        };
        log::info!(
            "optimizing loop `{label}`: {} instructions{}",
            insts.len(),
            if pipelined { ", pipelined" } else { "" }
        );
        let dfg = ir::build(arch, insts, &self.build_params(pipelined))?;
        let schedule = opt::search::run(
            &dfg,
            arch,
            self.target.uarch.as_ref(),
            &self.config,
            self.solver.as_ref(),
            pipelined,
            &format!("loop_{label}"),
        )?;
        if self.config.selfcheck {
            opt::selfcheck::check(
                arch,
                self.config.memory_aliasing,
                !self.config.allow_reordering_of_loads,
                &dfg,
                &schedule,
            )?;
        }
        if !schedule.kernel_input_output.is_empty() {
            log::info!(
                "kernel inputs/outputs: {}",
                schedule.kernel_input_output.join(", ")
            );
        }

        let mut text = String::new();
        for line in &file.lines[..shape.label_idx] {
            text.push_str(&line.raw);
            text.push('\n');
        }
        match &schedule.kind {
            ScheduleKind::Loop {
                preamble,
                kernel,
                postamble,
            } => {
                for line in preamble {
                    push_scheduled(&mut text, line);
                }
                text.push_str(&format!("{label}:\n"));
                for line in kernel {
                    push_scheduled(&mut text, line);
                }
                text.push_str(&file.lines[shape.branch_idx].raw);
                text.push('\n');
                for line in postamble {
                    push_scheduled(&mut text, line);
                }
            }
            ScheduleKind::Straight(lines) => {
                text.push_str(&format!("{label}:\n"));
                for line in lines {
                    push_scheduled(&mut text, line);
                }
                text.push_str(&file.lines[shape.branch_idx].raw);
                text.push('\n');
            }
        }
        for line in &file.lines[shape.branch_idx + 1..] {
            text.push_str(&line.raw);
            text.push('\n');
        }
        Ok(Optimized { text, schedule })
    }
}

fn push_scheduled(out: &mut String, line: &ScheduledInst) {
    out.push_str(&format!("        {:<40}// {}\n", line.text, line.glyph));
}

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
