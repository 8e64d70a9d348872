//! Lattice demonstration CLI (spec §6.2): batch-runs the built-in sample
//! programs through either backend, disassembles their compiled bytecode,
//! or runs their `test` items. Command shape grounded on the teacher's
//! `compiler::main` (`clap` derive `Commands` enum), pruned to the entry
//! points spec §6.2 actually names — no REPL loop, no language-server
//! client, no shell-completion generation.

mod demos;

use std::process;

use clap::{Parser as ClapParser, Subcommand, ValueEnum};

use lattice_compiler::Compiler;
use lattice_core::RuntimeFlags;

#[derive(ClapParser)]
#[command(name = "lattice")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lattice demonstration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, ValueEnum)]
enum Backend {
    Eval,
    Vm,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a built-in sample program (spec §6.2(a) batch run)
    Run {
        /// Sample program name (see `lattice list`)
        demo: String,

        /// Execution backend: tree-walking evaluator or bytecode VM
        #[arg(long, value_enum, default_value = "eval")]
        backend: Backend,

        /// Enable GC-stress / no-regions / assertions overrides
        #[arg(long)]
        stress: bool,
    },

    /// Run a sample program's `test` items and report pass/fail (spec §6.2(c))
    Test {
        /// Sample program name (see `lattice list`)
        demo: String,

        /// Only run tests whose name contains this substring
        #[arg(short, long)]
        filter: Option<String>,

        /// Print each test's duration
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compile a sample program and print its bytecode
    Disassemble {
        /// Sample program name (see `lattice list`)
        demo: String,
    },

    /// List the built-in sample program names
    List,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { demo, backend, stress } => run(&demo, backend, stress),
        Commands::Test { demo, filter, verbose } => run_test(&demo, filter.as_deref(), verbose),
        Commands::Disassemble { demo } => run_disassemble(&demo),
        Commands::List => {
            for name in demos::NAMES {
                println!("{name}");
            }
        }
    }
}

fn load_demo(name: &str) -> lattice_ast::Program {
    demos::by_name(name).unwrap_or_else(|| {
        eprintln!("no such demo `{name}` (see `lattice list`)");
        process::exit(1);
    })
}

fn run(demo: &str, backend: Backend, stress: bool) {
    let program = load_demo(demo);
    let mut flags = RuntimeFlags::from_env();
    flags.stress = flags.stress || stress;

    let result = match backend {
        Backend::Eval => {
            let mut evaluator = lattice_evaluator::Evaluator::new(flags);
            evaluator.eval_program(&program)
        }
        Backend::Vm => match Compiler::compile(&program) {
            Ok(chunk) => {
                let linked = lattice_vm::load(chunk);
                let mut vm = lattice_vm::Vm::new(flags);
                vm.run(linked)
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run_test(demo: &str, filter: Option<&str>, verbose: bool) {
    let program = load_demo(demo);
    let flags = RuntimeFlags::from_env();
    let summary = lattice_evaluator::test_run(&program, flags);

    let mut ran = 0usize;
    for result in &summary.results {
        if let Some(f) = filter {
            if !result.name.contains(f) {
                continue;
            }
        }
        ran += 1;
        let status = if result.passed { "ok" } else { "FAILED" };
        if verbose {
            println!("test {} ... {status} ({}ms)", result.name, result.duration_ms);
        } else {
            println!("test {} ... {status}", result.name);
        }
        if let Some(msg) = &result.error_output {
            println!("  {msg}");
        }
    }

    println!("{} run, {} passed, {} failed", ran, summary.passed, summary.failed);
    if summary.failed > 0 {
        process::exit(1);
    }
}

fn run_disassemble(demo: &str) {
    let program = load_demo(demo);
    match Compiler::compile(&program) {
        Ok(chunk) => println!("{}", lattice_compiler::disassemble::disassemble_chunk(&chunk, demo)),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
