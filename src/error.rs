//! Compiler-wide error type.
//!
//! A small hand-written enum with explicit `From` impls feeding `?`, the
//! same shape as `seq-compiler`'s `CodeGenError` (`codegen.rs`): neither
//! `thiserror` nor `anyhow` appears in the teacher's own dependency tree for
//! this kind of module, so this crate doesn't pull either in.

use std::fmt;

#[derive(Debug)]
pub enum CompileError {
    Io(String),
    /// Lex failures surface through here too: the parser wraps them into its
    /// own `Result<_, String>` before they ever reach this type.
    Parse(String),
    /// A semantic violation caught during AST->Koopa lowering: duplicate
    /// declaration, use of an undeclared identifier, indexing a non-array,
    /// assigning through a const, a type mismatch, or calling an undeclared
    /// function. `kind` names the rule violated, `ident` the offending name.
    Semantic { kind: String, ident: String },
    /// An internal-invariant failure: unexpected Koopa shape, or the frame
    /// planner encountering a value it never sized. Treated as a bug in this
    /// compiler, not a user error.
    Internal(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io(s) => write!(f, "I/O error: {}", s),
            CompileError::Parse(s) => write!(f, "parse error: {}", s),
            CompileError::Semantic { kind, ident } => {
                write!(f, "semantic error: {} '{}'", kind, ident)
            }
            CompileError::Internal(s) => write!(f, "internal compiler error: {}", s),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e.to_string())
    }
}

impl CompileError {
    pub fn semantic(kind: impl Into<String>, ident: impl Into<String>) -> Self {
        CompileError::Semantic {
            kind: kind.into(),
            ident: ident.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}
