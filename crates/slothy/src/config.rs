//! Engine configuration, bound and validated before an optimize call.

use crate::error::{Error, Result};
use crate::isa::{Reg, RegClass};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::time::Duration;

/// How memory dependencies are inferred between load/store pairs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum MemPolicy {
    /// Every load aliases every store.
    #[default]
    Conservative,
    /// Accesses through the same base value with distinct constant offsets
    /// are proven disjoint; everything else aliases.
    BaseOffset,
}

/// The region of the input to optimize.
#[derive(Clone, Debug, Default)]
pub enum Window {
    /// Every instruction in the file.
    #[default]
    All,
    /// Instructions strictly between two labels.
    Labels {
        /// Label before the first instruction of the window.
        start: String,
        /// Label after the last instruction of the window.
        end: String,
    },
    /// The region delimited by `slothy:start` / `slothy:end` markers.
    Markers,
}

/// Software-pipelining settings.
#[derive(Clone, Debug)]
pub struct SwPipelining {
    /// Enable periodic loop interleaving.
    pub enabled: bool,
    /// Replicate the loop body this many times before pipelining.
    pub unroll: u32,
    /// Minimize the number of early instructions.
    pub minimize_overlapping: bool,
}

impl Default for SwPipelining {
    fn default() -> Self {
        Self {
            enabled: false,
            unroll: 1,
            minimize_overlapping: true,
        }
    }
}

/// Stalls-search budgets.
#[derive(Copy, Clone, Debug)]
pub struct Stalls {
    /// First budget attempted.
    pub initial: u32,
    /// Largest budget attempted before giving up.
    pub cap: u32,
}

impl Default for Stalls {
    fn default() -> Self {
        Self {
            initial: 0,
            cap: 64,
        }
    }
}

/// All configuration the engine honors.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Software pipelining.
    pub sw_pipelining: SwPipelining,
    /// Stalls budgets.
    pub stalls: Stalls,
    /// Allow load/load pairs to reorder.
    pub allow_reordering_of_loads: bool,
    /// Memory alias policy.
    pub memory_aliasing: MemPolicy,
    /// Symbolic name to register class hints.
    pub typing_hints: IndexMap<String, RegClass>,
    /// Declared input registers, optionally pinned. When non-empty, reads
    /// of undeclared symbolic names are fatal.
    pub inputs: IndexMap<String, Option<Reg>>,
    /// Required output registers, optionally pinned.
    pub outputs: Vec<(String, Option<Reg>)>,
    /// Verify every result before returning it.
    pub selfcheck: bool,
    /// The optimize window.
    pub window: Window,
    /// Per-solver-call wall-clock budget.
    pub timeout: Option<Duration>,
    /// Per-solver-call decision budget.
    pub max_steps: u64,
    /// Where to write per-pass model dumps.
    pub dump_dir: Option<PathBuf>,
}

impl Config {
    /// A configuration with the documented defaults.
    pub fn new() -> Self {
        Self {
            allow_reordering_of_loads: true,
            selfcheck: true,
            max_steps: 2_000_000,
            ..Self::default()
        }
    }

    /// Check cross-field consistency. Called once when the engine is built.
    pub fn validate(&self) -> Result<()> {
        if self.sw_pipelining.unroll < 1 {
            return Err(Error::Config("sw_pipelining.unroll must be >= 1".to_string()));
        }
        if self.stalls.cap < self.stalls.initial {
            return Err(Error::Config(format!(
                "constraints.stalls.cap ({}) below constraints.stalls.initial ({})",
                self.stalls.cap, self.stalls.initial
            )));
        }
        if self.max_steps == 0 {
            return Err(Error::Config("solver step budget must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::new().validate().is_ok());
    }

    #[test]
    fn bad_unroll_rejected() {
        let mut config = Config::new();
        config.sw_pipelining.unroll = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn inverted_stalls_rejected() {
        let mut config = Config::new();
        config.stalls.initial = 8;
        config.stalls.cap = 4;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
