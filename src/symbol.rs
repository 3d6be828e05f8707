//! Symbol table stack (spec §4.1).
//!
//! A process-wide directory of per-block tables keyed by namespace id
//! (the parsed `Block::id`, plus the synthetic `GLOBAL_NAMESPACE` for
//! file-scope declarations and `ROOT_NAMESPACE` sentinel for "no parent").
//! Lookup walks the parent chain; `insert_local` refuses a redefinition
//! within the same table, matching the original's `SymbolTable::bool_symbol_exist_local`.

use crate::ast::FuncRetType;
use crate::error::CompileError;
use std::collections::HashMap;

pub const ROOT_NAMESPACE: i64 = -1;
pub const GLOBAL_NAMESPACE: i64 = 0;

#[derive(Debug, Clone)]
pub enum Entry {
    ConstInt(i32),
    /// Holds the Koopa pointer name, e.g. `@n_3` or `%n_7` for a parameter slot.
    VarInt(String),
    /// Pointer name plus the array's dimension sizes (outermost first).
    /// `is_const` marks a `const` array, whose elements `codegen` refuses
    /// to assign through (spec §7: "assigning through a non-variable").
    ArrayInt {
        ptr: String,
        dims: Vec<i32>,
        is_const: bool,
    },
    /// An array-decayed function parameter. `rank` counts the parameter
    /// pointer itself: a bare `int a[]` has rank 1, `int a[][N]` has rank 2.
    /// `trailing_dims` holds the sizes after the first (unspecified) extent.
    PtrInt {
        ptr: String,
        rank: u32,
        trailing_dims: Vec<i32>,
    },
    Function { ret_ty: FuncRetType },
}

#[derive(Default)]
struct Table {
    parent: i64,
    map: HashMap<String, Entry>,
}

/// The symbol-table directory: one `Table` per namespace id, chained by
/// `parent`. Owned for the lifetime of one compilation.
pub struct Symbols {
    tables: HashMap<i64, Table>,
}

impl Symbols {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            GLOBAL_NAMESPACE,
            Table {
                parent: ROOT_NAMESPACE,
                map: HashMap::new(),
            },
        );
        Symbols { tables }
    }

    /// Opens a new scope whose lookups fall back to `parent`. Block ids are
    /// assigned by the parser and are already globally unique, so this is
    /// idempotent if called twice for the same id (re-opens an empty table).
    ///
    /// `namespace` must never be `GLOBAL_NAMESPACE`: the parser's block ids
    /// start at 1 precisely so that a function body's scope can never
    /// collide with (and silently overwrite) the global table.
    pub fn open_scope(&mut self, namespace: i64, parent: i64) {
        debug_assert_ne!(
            namespace, GLOBAL_NAMESPACE,
            "a block scope must never reuse the global namespace id"
        );
        self.tables.insert(
            namespace,
            Table {
                parent,
                map: HashMap::new(),
            },
        );
    }

    pub fn insert_local(
        &mut self,
        namespace: i64,
        ident: &str,
        entry: Entry,
    ) -> Result<(), CompileError> {
        let table = self
            .tables
            .get_mut(&namespace)
            .expect("namespace must be opened before use");
        if table.map.contains_key(ident) {
            return Err(CompileError::semantic("duplicate declaration", ident));
        }
        table.map.insert(ident.to_string(), entry);
        Ok(())
    }

    pub fn lookup(&self, namespace: i64, ident: &str) -> Option<&Entry> {
        let mut ns = namespace;
        loop {
            let table = self.tables.get(&ns)?;
            if let Some(e) = table.map.get(ident) {
                return Some(e);
            }
            if table.parent == ROOT_NAMESPACE {
                return None;
            }
            ns = table.parent;
        }
    }

    pub fn lookup_or_err(&self, namespace: i64, ident: &str) -> Result<&Entry, CompileError> {
        self.lookup(namespace, ident)
            .ok_or_else(|| CompileError::semantic("use of undeclared identifier", ident))
    }
}

/// Koopa pointer-name convention (spec §4.1): `@ident_blockid` for
/// user-declared variables/arrays, `%ident_blockid` for the temporary
/// pointer synthesized for a function-parameter slot. Guarantees
/// uniqueness across nested scopes since block ids never repeat.
pub fn user_pointer_name(ident: &str, namespace: i64) -> String {
    format!("@{}_{}", ident, namespace)
}

pub fn param_pointer_name(ident: &str, namespace: i64) -> String {
    format!("%{}_{}", ident, namespace)
}

/// The eight library functions, injected into the global namespace once per
/// compilation and matched by a `decl` line emitted exactly once.
pub const LIB_FUNCS: &[(&str, FuncRetType)] = &[
    ("getint", FuncRetType::Int),
    ("getch", FuncRetType::Int),
    ("getarray", FuncRetType::Int),
    ("putint", FuncRetType::Void),
    ("putch", FuncRetType::Void),
    ("putarray", FuncRetType::Void),
    ("starttime", FuncRetType::Void),
    ("stoptime", FuncRetType::Void),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain() {
        let mut syms = Symbols::new();
        syms.insert_local(GLOBAL_NAMESPACE, "g", Entry::ConstInt(7))
            .unwrap();
        syms.open_scope(1, GLOBAL_NAMESPACE);
        assert!(matches!(syms.lookup(1, "g"), Some(Entry::ConstInt(7))));
    }

    #[test]
    fn duplicate_local_declaration_errors() {
        let mut syms = Symbols::new();
        syms.insert_local(GLOBAL_NAMESPACE, "x", Entry::ConstInt(1))
            .unwrap();
        let err = syms
            .insert_local(GLOBAL_NAMESPACE, "x", Entry::ConstInt(2))
            .unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        let mut syms = Symbols::new();
        syms.insert_local(GLOBAL_NAMESPACE, "x", Entry::ConstInt(1))
            .unwrap();
        syms.open_scope(1, GLOBAL_NAMESPACE);
        syms.insert_local(1, "x", Entry::ConstInt(2)).unwrap();
        assert!(matches!(syms.lookup(1, "x"), Some(Entry::ConstInt(2))));
    }

    #[test]
    fn pointer_names_are_unique_per_scope() {
        assert_eq!(user_pointer_name("n", 3), "@n_3");
        assert_eq!(param_pointer_name("n", 7), "%n_7");
    }
}
