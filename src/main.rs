use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use regex_pebble::{Automaton, Backtracker, SimulationMemory};

/// Compile patterns into epsilon-NFAs and match inputs against them.
#[derive(Debug, Parser)]
#[command(name = "repeb", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Output DOT (Graphviz) representation of the automaton
    Dot { pattern: String },
    /// Match pattern against one or more inputs
    Match {
        /// Matcher used to decide each input
        #[arg(long, value_enum, default_value_t = Engine::Simulate)]
        engine: Engine,
        /// Epsilon-recursion budget for the backtracking matcher
        /// [default: 43, or the state count when the pattern has no epsilon cycle]
        #[arg(long)]
        budget: Option<usize>,
        /// Print simulation state after each byte
        #[arg(long)]
        debug: bool,
        pattern: String,
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Engine {
    Backtrack,
    Simulate,
    /// Run both matchers and report disagreements
    Both,
}

fn parse_pattern(pattern: &str) -> anyhow::Result<Automaton> {
    regex_pebble::compile(pattern)
        .with_context(|| format!("failed to compile pattern {pattern:?}"))
}

fn run_dot(pattern: &str) -> anyhow::Result<ExitCode> {
    let automaton = parse_pattern(pattern)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    automaton.to_dot(&mut out)?;
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn simulate(
    automaton: &Automaton,
    memory: &mut SimulationMemory,
    input: &str,
    debug: bool,
) -> bool {
    let mut sim = memory.simulation(automaton);
    if debug {
        eprintln!("--- input: {:?} ---", input);
        eprintln!("[init] {:?}", sim);
    }
    for &b in input.as_bytes() {
        sim.step(b);
        if debug {
            eprintln!("[after {:?}] {:?}", b as char, sim);
        }
    }
    sim.finish()
}

fn run_match(
    pattern: &str,
    inputs: &[String],
    engine: Engine,
    budget: Option<usize>,
    debug: bool,
) -> anyhow::Result<ExitCode> {
    let automaton = parse_pattern(pattern)?;
    let budget = budget.unwrap_or_else(|| automaton.default_budget());
    let mut memory = SimulationMemory::default();
    let mut backtracker = Backtracker::new(&automaton, budget);

    let mut any_rejected = false;
    for input in inputs {
        let accepted = match engine {
            Engine::Simulate => simulate(&automaton, &mut memory, input, debug),
            Engine::Backtrack => backtracker.accepts(input.as_bytes()),
            Engine::Both => {
                let sim = simulate(&automaton, &mut memory, input, debug);
                let bt = backtracker.accepts(input.as_bytes());
                if sim != bt {
                    eprintln!(
                        "warning: matchers disagree on {:?}: simulation={}, backtracking={}{}",
                        input,
                        sim,
                        bt,
                        if backtracker.budget_exhausted() {
                            " (budget exhausted)"
                        } else {
                            ""
                        }
                    );
                }
                sim
            }
        };

        if engine == Engine::Backtrack && !accepted && backtracker.budget_exhausted() {
            eprintln!("note: budget of {budget} exhausted while matching {input:?}");
        }

        if accepted {
            println!("{pattern} accepts {input}");
        } else {
            println!("{pattern} does not accept {input}");
            any_rejected = true;
        }
    }

    Ok(if any_rejected {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Dot { pattern } => run_dot(&pattern),
        Command::Match {
            engine,
            budget,
            debug,
            pattern,
            inputs,
        } => run_match(&pattern, &inputs, engine, budget, debug),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
