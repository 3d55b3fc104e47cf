//! RV16 simulator - CLI entry point
//!
//! Commands:
//! - `rv16-sim run <program>` - Run an ASM, binary or hex-dump program
//! - `rv16-sim asm <source>` - Assemble to a binary image or hex dump
//! - `rv16-sim disasm <program>` - Disassemble a program image
//! - `rv16-sim isa` - Print the instruction set table

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rv16::asm::{self, hex_dump, listing, load_binary, parse_hex_dump, save_binary};
use rv16::isa::{Layout, ISA_TABLE};
use rv16::{Cpu, ErrorPolicy, SimConfig, SimError};

#[derive(Parser)]
#[command(name = "rv16-sim")]
#[command(version)]
#[command(about = "Instruction-set simulator and assembler for the RV16 16-bit CPU")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the .asm source, .hex dump or binary image
        program: PathBuf,
        /// Maximum number of cycles to run (default: from config, 1000)
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Stop on the first fault instead of recovering
        #[arg(long)]
        strict: bool,
        /// Print every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Assemble source to a program image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output file (prints a listing when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write a hex dump instead of a binary image
        #[arg(long)]
        hex: bool,
    },
    /// Disassemble a program image to readable text
    Disasm {
        /// Path to the binary image or hex dump
        program: PathBuf,
    },
    /// Print the instruction set
    Isa,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Run { program, max_cycles, strict, trace, json, config }) => {
            run_program(&program, max_cycles, strict, trace, json, config.as_deref());
        }
        Some(Commands::Asm { source, output, hex }) => {
            assemble_file(&source, output.as_deref(), hex);
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program);
        }
        Some(Commands::Isa) | None => {
            print_isa();
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

/// Load a program from `.asm` source, a `.hex`/`.txt` dump or a binary image.
fn load_words(path: &Path) -> Vec<u16> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match extension {
        "asm" | "s" => {
            let source = std::fs::read_to_string(path)
                .unwrap_or_else(|e| fail(format!("Failed to read {}: {}", path.display(), e)));
            let assembly = asm::assemble(&source);
            for err in &assembly.errors {
                eprintln!("⚠️  {}", err);
            }
            match assembly.into_result() {
                Ok(words) => words,
                Err(errors) => fail(format!("Assembly failed with {} error(s)", errors.len())),
            }
        }
        "hex" | "txt" => {
            let text = std::fs::read_to_string(path)
                .unwrap_or_else(|e| fail(format!("Failed to read {}: {}", path.display(), e)));
            parse_hex_dump(&text).unwrap_or_else(|e| fail(e))
        }
        _ => load_binary(path).unwrap_or_else(|e| fail(e)),
    }
}

fn run_program(
    path: &Path,
    max_cycles: Option<u64>,
    strict: bool,
    trace: bool,
    json: bool,
    config: Option<&Path>,
) {
    let mut config = match config {
        Some(file) => SimConfig::from_json_file(file).unwrap_or_else(|e| fail(e)),
        None => SimConfig::default(),
    };
    if strict {
        config.policy = ErrorPolicy::Strict;
    }
    let budget = max_cycles.unwrap_or(config.max_cycles);

    let words = load_words(path);
    if words.is_empty() {
        fail("No instructions to execute");
    }

    let mut cpu = Cpu::with_config(config).unwrap_or_else(|e| fail(e));
    if let Err(e) = cpu.load_program(&words) {
        fail(format!("Failed to load program: {}", e));
    }

    let outcome = if trace { run_traced(&mut cpu, budget) } else { cpu.run(budget) };

    if json {
        match serde_json::to_string_pretty(&cpu.snapshot()) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(e),
        }
    } else {
        println!();
        println!("━━━ Result ━━━");
        print!("{}", cpu.snapshot());
        if cpu.errors().total() > 0 {
            println!("{}", cpu.errors().summary());
        }
    }

    match outcome {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", budget);
        }
        Err(e) => fail(format!("CPU error: {}", e)),
    }
}

/// Step through the program, printing each instruction as it retires.
fn run_traced(cpu: &mut Cpu, budget: u64) -> Result<bool, SimError> {
    println!("━━━ Execution ━━━");
    for _ in 0..budget {
        let before = cpu.cycles();
        let running = cpu.step()?;
        if cpu.cycles() != before {
            if let Some(entry) = cpu.history().last() {
                println!("{}  [{}]", entry, cpu.flags());
            }
        }
        if !running {
            return Ok(true);
        }
    }
    Ok(cpu.is_halted())
}

fn assemble_file(source: &Path, output: Option<&Path>, hex: bool) {
    let text = std::fs::read_to_string(source)
        .unwrap_or_else(|e| fail(format!("Failed to read {}: {}", source.display(), e)));
    let assembly = asm::assemble(&text);

    for err in &assembly.errors {
        eprintln!("⚠️  {}", err);
    }
    if !assembly.is_ok() {
        fail(format!("Assembly failed with {} error(s)", assembly.errors.len()));
    }

    match output {
        Some(out) if hex => {
            if let Err(e) = std::fs::write(out, hex_dump(&assembly.words)) {
                fail(format!("Failed to write {}: {}", out.display(), e));
            }
            println!("✅ Wrote {} words to {}", assembly.words.len(), out.display());
        }
        Some(out) => {
            if let Err(e) = save_binary(out, &assembly.words) {
                fail(e);
            }
            println!("✅ Wrote {} words to {}", assembly.words.len(), out.display());
        }
        None if hex => print!("{}", hex_dump(&assembly.words)),
        None => print!("{}", listing(&assembly)),
    }
}

fn disassemble_file(path: &Path) {
    let words = load_words(path);
    print!("{}", asm::disassemble(&words));
}

fn print_isa() {
    println!("RV16 instruction set");
    println!();
    println!("{:<6} {:<6} {:<8} {}", "CODE", "NAME", "FORMAT", "DESCRIPTION");
    for (code, entry) in ISA_TABLE.iter().enumerate() {
        match entry {
            Some(op) => {
                let layout = Layout::of(op.format());
                let imm = layout
                    .imm
                    .map(|f| {
                        let (lo, hi) = f.range();
                        format!(" [{}..{}]", lo, hi)
                    })
                    .unwrap_or_default();
                println!(
                    "{:#x}    {:<6} {:<8} {}{}",
                    code,
                    op.mnemonic(),
                    op.format().tag(),
                    op.description(),
                    imm
                );
            }
            None => println!("{:#x}    {:<6} {:<8} reserved", code, "-", "-"),
        }
    }
}
