//! Driver (spec §4.6): read input, parse, emit Koopa to a buffer, then
//! either write it out directly or feed it through the RISC-V backend.
//!
//! The only module that touches the filesystem; `compile_to_koopa` and
//! `compile_to_riscv` are pure string-in/string-out and are what the
//! integration tests in `tests/e2e.rs` call directly.

use crate::codegen;
use crate::error::CompileError;
use crate::parser::Parser;
use crate::riscv;
use koopa::front::Driver as KoopaFrontDriver;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Koopa,
    Riscv,
}

/// Lowers SysY source text to textual Koopa IR.
pub fn compile_to_koopa(source: &str) -> Result<String, CompileError> {
    let mut parser = Parser::new(source).map_err(CompileError::Parse)?;
    let program = parser.parse_program().map_err(CompileError::Parse)?;
    codegen::emit_program(&program)
}

/// Lowers SysY source text all the way to RISC-V assembly, round-tripping
/// the intermediate Koopa text through the upstream `koopa` parser to
/// obtain the in-memory `Program` the backend walks.
pub fn compile_to_riscv(source: &str) -> Result<String, CompileError> {
    let koopa_text = compile_to_koopa(source)?;
    let front = KoopaFrontDriver::from(koopa_text.as_str());
    let program = front
        .generate_program()
        .map_err(|e| CompileError::Internal(format!("koopa parser rejected our own IR: {:?}", e)))?;
    riscv::emit_riscv(&program)
}

pub fn run(mode: Mode, input: &Path, output: &Path) -> Result<(), CompileError> {
    let source = fs::read_to_string(input)?;
    let text = match mode {
        Mode::Koopa => compile_to_koopa(&source)?,
        Mode::Riscv => compile_to_riscv(&source)?,
    };
    fs::write(output, text)?;
    Ok(())
}
