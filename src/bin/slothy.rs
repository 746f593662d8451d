//! The `slothy` command-line interface.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use slothy::isa::{lookup_by_name, Reg, RegClass, Target};
use slothy::{Config, MemPolicy, Optimized, Slothy, Window};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

/// Assembly-level superoptimizer: instruction scheduling, register
/// renaming, and software pipelining.
#[derive(Parser)]
#[command(name = "slothy", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize a straight-line region.
    Optimize(OptimizeArgs),
    /// Optimize the loop starting at a label.
    OptimizeLoop(LoopArgs),
}

#[derive(Copy, Clone, ValueEnum)]
enum AliasPolicy {
    /// Every load aliases every store.
    Conservative,
    /// Same base with distinct constant offsets is proven disjoint.
    BaseOffset,
}

#[derive(Args)]
struct CommonArgs {
    /// Input assembly file.
    input: PathBuf,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target architecture.
    #[arg(long, default_value = "armv81m")]
    target: String,

    /// Microarchitecture model.
    #[arg(long, default_value = "cortex-m55")]
    uarch: String,

    /// Typing hint `name=class` (gpr, vector, predicate, flags).
    #[arg(long = "hint", value_name = "NAME=CLASS")]
    hints: Vec<String>,

    /// Declared input register `name[=reg]`.
    #[arg(long = "input-reg", value_name = "NAME[=REG]")]
    inputs: Vec<String>,

    /// Required output register `name[=reg]`.
    #[arg(long = "output-reg", value_name = "NAME[=REG]")]
    outputs: Vec<String>,

    /// First stalls budget to try.
    #[arg(long, default_value_t = 0)]
    stalls_initial: u32,

    /// Largest stalls budget to try before giving up.
    #[arg(long, default_value_t = 64)]
    stalls_cap: u32,

    /// Keep all loads in program order.
    #[arg(long)]
    keep_load_order: bool,

    /// Memory alias policy.
    #[arg(long, value_enum, default_value = "conservative")]
    alias_policy: AliasPolicy,

    /// Skip the output self-check.
    #[arg(long)]
    no_selfcheck: bool,

    /// Per-attempt solver timeout, in seconds.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Write per-pass constraint-model dumps into this directory.
    #[arg(long, value_name = "DIR")]
    dump_models: Option<PathBuf>,
}

#[derive(Args)]
struct OptimizeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Label before the first instruction of the window.
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// Label after the last instruction of the window.
    #[arg(long, requires = "start")]
    end: Option<String>,

    /// Use `slothy:start` / `slothy:end` comment markers as the window.
    #[arg(long, conflicts_with_all = ["start", "end"])]
    markers: bool,
}

#[derive(Args)]
struct LoopArgs {
    /// The loop label.
    label: String,

    #[command(flatten)]
    common: CommonArgs,

    /// Enable software pipelining (periodic loop interleaving).
    #[arg(long)]
    pipelining: bool,

    /// Unroll the body this many times before pipelining.
    #[arg(long, default_value_t = 1)]
    unroll: u32,

    /// Do not minimize the number of early instructions.
    #[arg(long)]
    no_minimize_overlap: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("slothy: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    use slothy::Error;
    match err.downcast_ref::<Error>() {
        Some(Error::Infeasible { .. }) => 1,
        Some(Error::Solver(_)) => 3,
        Some(Error::SelfCheck(_)) => 4,
        // Malformed input and configuration binding errors.
        Some(_) | None => 2,
    }
}

fn parse_pair(text: &str) -> (&str, Option<&str>) {
    match text.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (text, None),
    }
}

fn parse_reg(target: &Target, text: &str) -> Result<Reg> {
    target
        .arch
        .reg_info()
        .parse_reg(text)
        .ok_or_else(|| anyhow!("unknown register `{text}`"))
}

fn bind_config(target: &Target, common: &CommonArgs) -> Result<Config> {
    let mut config = Config::new();
    config.stalls.initial = common.stalls_initial;
    config.stalls.cap = common.stalls_cap;
    config.allow_reordering_of_loads = !common.keep_load_order;
    config.memory_aliasing = match common.alias_policy {
        AliasPolicy::Conservative => MemPolicy::Conservative,
        AliasPolicy::BaseOffset => MemPolicy::BaseOffset,
    };
    config.selfcheck = !common.no_selfcheck;
    config.timeout = common.timeout.map(Duration::from_secs);
    config.dump_dir = common.dump_models.clone();
    if let Some(dir) = &config.dump_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating dump directory {}", dir.display()))?;
    }
    for hint in &common.hints {
        let (name, class) = parse_pair(hint);
        let class = class.ok_or_else(|| anyhow!("hint `{hint}` is missing `=class`"))?;
        let class = RegClass::from_str(class)
            .map_err(|()| anyhow!("unknown register class `{class}` in `{hint}`"))?;
        config.typing_hints.insert(name.to_string(), class);
    }
    for input in &common.inputs {
        let (name, reg) = parse_pair(input);
        let pin = reg.map(|r| parse_reg(target, r)).transpose()?;
        config.inputs.insert(name.to_string(), pin);
    }
    for output in &common.outputs {
        let (name, reg) = parse_pair(output);
        let pin = reg.map(|r| parse_reg(target, r)).transpose()?;
        config.outputs.push((name.to_string(), pin));
    }
    Ok(config)
}

fn emit(common: &CommonArgs, optimized: &Optimized) -> Result<()> {
    match &common.output {
        Some(path) => std::fs::write(path, &optimized.text)
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{}", optimized.text),
    }
    log::info!("done: {} stalls", optimized.schedule.stalls);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Optimize(args) => {
            let target = lookup_by_name(&args.common.target)?
                .uarch(&args.common.uarch)
                .finish()?;
            let mut config = bind_config(&target, &args.common)?;
            config.window = match (&args.start, &args.end, args.markers) {
                (Some(start), Some(end), _) => Window::Labels {
                    start: start.clone(),
                    end: end.clone(),
                },
                (_, _, true) => Window::Markers,
                _ => Window::All,
            };
            let source = std::fs::read_to_string(&args.common.input)
                .with_context(|| format!("reading {}", args.common.input.display()))?;
            let engine = Slothy::new(target, config)?;
            let optimized = engine.optimize(&source)?;
            emit(&args.common, &optimized)
        }
        Command::OptimizeLoop(args) => {
            let target = lookup_by_name(&args.common.target)?
                .uarch(&args.common.uarch)
                .finish()?;
            let mut config = bind_config(&target, &args.common)?;
            config.sw_pipelining.enabled = args.pipelining;
            config.sw_pipelining.unroll = args.unroll;
            config.sw_pipelining.minimize_overlapping = !args.no_minimize_overlap;
            let source = std::fs::read_to_string(&args.common.input)
                .with_context(|| format!("reading {}", args.common.input.display()))?;
            let engine = Slothy::new(target, config)?;
            let optimized = engine.optimize_loop(&source, &args.label)?;
            emit(&args.common, &optimized)
        }
    }
}
