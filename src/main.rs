//! sysyc CLI
//!
//! `sysyc <-koopa|-riscv> <input> -o <output>` (spec §6.1).

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;
use sysyc::driver::Mode;
use sysyc::parser::Parser as SysyParser;

#[derive(ClapParser)]
#[command(name = "sysyc")]
#[command(about = "Whole-program SysY compiler: lowers to Koopa IR or RISC-V assembly", long_about = None)]
struct Cli {
    /// Compilation mode: `-koopa` emits textual Koopa IR, `-riscv` emits RV32 assembly.
    #[arg(value_parser = parse_mode, allow_hyphen_values = true)]
    mode: Mode,

    /// SysY source file.
    input: PathBuf,

    /// Output path.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Print the parsed AST to stderr before codegen.
    #[arg(long)]
    dump_ast: bool,

    /// Echo each compilation stage to stderr.
    #[arg(long)]
    verbose: bool,
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    match s {
        "-koopa" => Ok(Mode::Koopa),
        "-riscv" => Ok(Mode::Riscv),
        other => Err(format!("unknown mode '{}': expected -koopa or -riscv", other)),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("sysyc: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), sysyc::CompileError> {
    if cli.verbose {
        eprintln!("sysyc: reading {}", cli.input.display());
    }
    let source = std::fs::read_to_string(&cli.input)?;

    if cli.dump_ast {
        let mut parser = SysyParser::new(&source).map_err(sysyc::CompileError::Parse)?;
        let program = parser
            .parse_program()
            .map_err(sysyc::CompileError::Parse)?;
        eprintln!("{:#?}", program);
    }

    let output_text = match cli.mode {
        Mode::Koopa => {
            if cli.verbose {
                eprintln!("sysyc: lowering to Koopa IR");
            }
            sysyc::compile_to_koopa(&source)?
        }
        Mode::Riscv => {
            if cli.verbose {
                eprintln!("sysyc: lowering to Koopa IR, then to RISC-V");
            }
            sysyc::compile_to_riscv(&source)?
        }
    };

    std::fs::write(&cli.output, output_text)?;
    if cli.verbose {
        eprintln!("sysyc: wrote {}", cli.output.display());
    }
    Ok(())
}
