mod machine;
mod scenario;
mod tree;

use std::fmt;
use std::io::Write;

use clap::{Parser, Subcommand};
use exosim::SimConfig;
use log::LevelFilter;
use syscall::UserLogger;

/// Run user-level fork scenarios on the simulated exokernel.
#[derive(Parser)]
#[command(name = "exofork-dev", version, author = "Wenyu Zhao")]
struct Opts {
    /// Most verbose log level to print (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,
    /// Physical frames available to the machine
    #[arg(long, global = true, default_value_t = SimConfig::DEFAULT_MAX_FRAMES)]
    max_frames: usize,
    /// Size of the env table
    #[arg(long, global = true, default_value_t = syscall::NENV)]
    max_envs: usize,
    #[command(subcommand)]
    sub_command: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Run one of the fixed fork scenarios
    #[command(name = "scenario")]
    Scenario(scenario::Scenario),
    /// Fork a chain of envs and report frame usage
    #[command(name = "tree")]
    Tree(tree::Tree),
}

struct StderrWriter;

impl fmt::Write for StderrWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        std::io::stderr()
            .write_all(s.as_bytes())
            .map_err(|_| fmt::Error)
    }
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    UserLogger::init(Box::new(StderrWriter), opts.log_level)?;
    let config = SimConfig::default()
        .with_max_envs(opts.max_envs)
        .with_max_frames(opts.max_frames);
    match opts.sub_command {
        SubCommand::Scenario(t) => t.run(config),
        SubCommand::Tree(t) => t.run(config),
    }
}
