//! Processor description tools CLI.
//!
//! Provides the `hadl` binary with subcommands for working with
//! JSON-serialized processor specifications: `verify` checks every
//! behavior graph, `simplify` rewrites them to fixpoint, `dot` renders
//! behaviors as Graphviz, and `cpp` emits C++ for a pure function.
//!
//! Machine-readable output goes to stdout; diagnostics go to stderr.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use hadl_codegen::{CodegenError, CppFunctionGenerator};
use hadl_passes::{
    AlgebraicSimplificationPass, CanonicalizationPass, PassError, PassKey, PassManager, PassOrder,
    Specification, VerificationPass,
};

/// Processor description compiler and tools.
#[derive(Parser)]
#[command(name = "hadl", about = "Processor description compiler and tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Check every behavior graph for consistency violations.
    Verify {
        /// Path to the specification JSON file.
        input: PathBuf,
    },

    /// Fold constants and apply algebraic rewrites to fixpoint.
    Simplify {
        /// Path to the specification JSON file.
        input: PathBuf,

        /// Where to write the simplified specification (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render behavior graphs in Graphviz dot format.
    Dot {
        /// Path to the specification JSON file.
        input: PathBuf,

        /// Render only the named instruction (default: every behavior).
        #[arg(short, long)]
        instruction: Option<String>,
    },

    /// Emit a C++ rendition of one pure function.
    Cpp {
        /// Path to the specification JSON file.
        input: PathBuf,

        /// Name of the function to emit.
        #[arg(short, long)]
        function: String,
    },
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Verify { input } => run_verify(&input),
        Commands::Simplify { input, output } => run_simplify(&input, output),
        Commands::Dot { input, instruction } => run_dot(&input, instruction),
        Commands::Cpp { input, function } => run_cpp(&input, &function),
    };
    process::exit(exit_code);
}

/// Load a specification from a JSON file.
///
/// Returns the I/O exit code (3) on failure.
fn load_spec(path: &PathBuf) -> Result<Specification, i32> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", path.display(), e);
            return Err(3);
        }
    };
    match serde_json::from_str(&text) {
        Ok(spec) => Ok(spec),
        Err(e) => {
            eprintln!("Error: failed to parse '{}': {}", path.display(), e);
            Err(3)
        }
    }
}

/// Execute the verify subcommand.
///
/// Returns exit code: 0 = consistent, 2 = violations found, 3 = I/O error.
fn run_verify(input: &PathBuf) -> i32 {
    let mut spec = match load_spec(input) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let mut order = PassOrder::new();
    order.add(VerificationPass);
    match PassManager::run(order, &mut spec) {
        Ok(_) => {
            println!("{{\"status\": \"ok\"}}");
            0
        }
        Err(PassError::Execution { message, .. }) => {
            let lines: Vec<&str> = message.lines().collect();
            eprintln!("Verification failed with {} violation(s):", lines.len());
            for line in &lines {
                eprintln!("  - {}", line);
            }
            2
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Execute the simplify subcommand.
///
/// Returns exit code: 0 = success, 1 = pass error, 3 = I/O error.
fn run_simplify(input: &PathBuf, output: Option<PathBuf>) -> i32 {
    let mut spec = match load_spec(input) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let mut order = PassOrder::new();
    order.add(CanonicalizationPass);
    order.add(AlgebraicSimplificationPass::default());
    let results = match PassManager::run(order, &mut spec) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let folded = results
        .get_as::<usize>(&PassKey::new("canonicalization"))
        .copied()
        .unwrap_or(0);
    let rewritten = results
        .get_as::<usize>(&PassKey::new("algebraic-simplification"))
        .copied()
        .unwrap_or(0);
    eprintln!("Folded {} constant(s), applied {} rewrite(s)", folded, rewritten);

    let json = match serde_json::to_string_pretty(&spec) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: failed to serialize specification: {}", e);
            return 1;
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, json) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return 3;
            }
            0
        }
        None => {
            println!("{}", json);
            0
        }
    }
}

/// Execute the dot subcommand.
///
/// Returns exit code: 0 = success, 1 = unknown instruction, 3 = I/O error.
fn run_dot(input: &PathBuf, instruction: Option<String>) -> i32 {
    let spec = match load_spec(input) {
        Ok(s) => s,
        Err(code) => return code,
    };

    match instruction {
        Some(name) => match spec.instruction(&name) {
            Some(instr) => {
                println!("{}", hadl_ir::dot::dot(&instr.behavior));
                0
            }
            None => {
                eprintln!("Error: no instruction named '{}'", name);
                1
            }
        },
        None => {
            for behavior in spec.behaviors() {
                println!("{}", hadl_ir::dot::dot(behavior));
            }
            0
        }
    }
}

/// Execute the cpp subcommand.
///
/// Returns exit code: 0 = success, 1 = generation error, 3 = I/O error.
fn run_cpp(input: &PathBuf, function: &str) -> i32 {
    let spec = match load_spec(input) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let def = match spec.function(function) {
        Some(f) => f,
        None => {
            eprintln!("Error: no function named '{}'", function);
            return 1;
        }
    };

    let generator = match CppFunctionGenerator::new() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let params: Vec<(String, hadl_ir::Type)> = def
        .params
        .iter()
        .map(|p| (p.name.clone(), p.ty))
        .collect();
    match generator.generate_function(&def.name, &params, def.return_type, &def.behavior) {
        Ok(code) => {
            println!("{}", code);
            0
        }
        Err(CodegenError::NotPure { name }) => {
            eprintln!("Error: behavior '{}' is not a pure function", name);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
