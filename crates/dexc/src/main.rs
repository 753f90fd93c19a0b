//! Command-line front end: reads a source file, compiles it, and either
//! reports the diagnostics or writes out the linked IR.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;

use dexc::config::{CompilerConfig, OptimizationLevel};
use dexc::CompileResult;

#[derive(Clone, Copy, clap::ValueEnum)]
enum OptArg {
    #[value(name = "0")]
    Zero,
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

impl From<OptArg> for OptimizationLevel {
    fn from(a: OptArg) -> Self {
        match a {
            OptArg::Zero => OptimizationLevel::O0,
            OptArg::One => OptimizationLevel::O1,
            OptArg::Two => OptimizationLevel::O2,
        }
    }
}

#[derive(ClapParser)]
#[command(name = "dexc")]
#[command(about = "Compiles a declarative expression-language source file", long_about = None)]
struct Cli {
    /// Optimization level applied before JIT linking
    #[arg(short = 'O')]
    opt_level: Option<OptArg>,

    /// Disable inline intrinsic code generation; every call goes through
    /// its external entry point
    #[arg(short = 'i', long = "no-intrinsics")]
    no_intrinsics: bool,

    /// Disable constant folding for `expr`/`var` initializers (`const`
    /// initializers must still fold)
    #[arg(short = 'c', long = "no-const-folding")]
    no_const_folding: bool,

    /// Source file to compile
    #[arg(short = 'f', long = "input-file")]
    input_file: PathBuf,

    /// Write the generated LLVM IR to the output path instead of just
    /// reporting success
    #[arg(short = 'l', long = "emit-llvm")]
    emit_llvm: bool,

    /// Output path (required with --emit-llvm)
    #[arg(short = 'o')]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input_file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read {}: {e}", cli.input_file.display());
            process::exit(1);
        }
    };

    let config = CompilerConfig::new()
        .with_opt_level(cli.opt_level.map(Into::into).unwrap_or_default())
        .with_intrinsics(!cli.no_intrinsics)
        .with_const_folding(!cli.no_const_folding)
        .with_emit_llvm(cli.emit_llvm);

    match dexc::compile(&source, &config, &[]) {
        CompileResult::Success { entries, ir, .. } => {
            if cli.emit_llvm {
                let Some(text) = ir else {
                    eprintln!("error: internal: --emit-llvm set but no IR was kept");
                    process::exit(1);
                };
                match &cli.output {
                    Some(path) => {
                        if let Err(e) = fs::write(path, text) {
                            eprintln!("error: could not write {}: {e}", path.display());
                            process::exit(1);
                        }
                        println!("Wrote IR to {}", path.display());
                    }
                    None => println!("{text}"),
                }
            } else {
                println!("Compiled {} declaration(s).", entries.len());
                for entry in &entries {
                    println!("  {} -> @{}", entry.name, entry.symbol);
                }
            }
        }
        CompileResult::Failure(diags) => {
            eprintln!("{diags}");
            process::exit(1);
        }
    }
}
