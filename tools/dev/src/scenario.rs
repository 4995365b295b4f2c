use anyhow::{ensure, Result};
use clap::{Args, Subcommand};
use exosim::SimConfig;

use crate::machine::{Machine, HEAP};

#[derive(Args)]
pub struct Scenario {
    #[command(subcommand)]
    which: Which,
}

#[derive(Subcommand, Clone, Copy)]
enum Which {
    /// A forks B; A overwrites "hello" with "world"; B keeps "hello"
    Hello,
    /// A forks B forks C; C writes a zero page; A and B still see zeros
    Chain,
}

impl Scenario {
    pub fn run(&self, config: SimConfig) -> Result<()> {
        match self.which {
            Which::Hello => hello(config),
            Which::Chain => chain(config),
        }
    }
}

fn hello(config: SimConfig) -> Result<()> {
    let mut m = Machine::boot(config, 1)?;
    let a = m.current()?;
    m.write(a, HEAP, b"hello")?;
    let b = m.fork()?;
    m.enter(b)?;
    println!("forked {a} -> {b}");

    for env in [a, b] {
        let seen = m.read(env, HEAP, 5)?;
        println!("{env} reads {:?}", String::from_utf8_lossy(&seen));
        ensure!(seen == b"hello", "{env} does not see the pre-fork contents");
    }
    m.write(a, HEAP, b"world")?;
    println!("{a} writes \"world\"");
    let in_a = m.read(a, HEAP, 5)?;
    let in_b = m.read(b, HEAP, 5)?;
    println!("{a} reads {:?}", String::from_utf8_lossy(&in_a));
    println!("{b} reads {:?}", String::from_utf8_lossy(&in_b));
    ensure!(in_a == b"world", "{a} lost its own write");
    ensure!(in_b == b"hello", "{a}'s write leaked into {b}");
    println!("{:?}", m.sim.stats());
    Ok(())
}

fn chain(config: SimConfig) -> Result<()> {
    let mut m = Machine::boot(config, 1)?;
    let a = m.current()?;
    let b = m.fork()?;
    m.enter(b)?;
    let c = m.fork()?;
    m.enter(c)?;
    println!("forked {a} -> {b} -> {c}");

    let pattern: Vec<u8> = (1..=64).collect();
    m.write(c, HEAP, &pattern)?;
    println!("{c} writes {} bytes", pattern.len());
    for env in [a, b] {
        let seen = m.read(env, HEAP, pattern.len())?;
        let zeroed = seen.iter().all(|&byte| byte == 0);
        ensure!(zeroed, "{c}'s write leaked into {env}");
        println!("{env} reads zeros");
    }
    let own = m.read(c, HEAP, pattern.len())?;
    ensure!(own == pattern, "{c} lost its own write");
    println!("{c} reads its own bytes");
    println!("{:?}", m.sim.stats());
    Ok(())
}
