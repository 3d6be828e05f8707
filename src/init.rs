//! Array initializer expansion (spec §4.2's brace-partial-fill rule).
//!
//! Given a shape `(d_0, ..., d_{D-1})` and a brace-enclosed initializer list,
//! a nested brace need not line up with a full dimension boundary: the rule
//! determines, for each sub-brace, the largest dimension boundary it aligns
//! to that is strictly below the enclosing level, fills that sub-range, and
//! zero-pads the remainder before returning to the enclosing level. This is
//! the single source of truth shared by both the global aggregate emitter
//! (`codegen::emit_global_init`) and the local per-element store emitter
//! (`codegen::emit_local_array_init`).

use crate::ast::InitVal;

/// Flattens `init` against `dims` (outermost first) into exactly
/// `dims.iter().product()` scalar elements, applying the brace-partial-fill
/// rule. `fold` evaluates a leaf expression to a constant (for `const`
/// arrays) or returns `None` for expressions that must be lowered as a
/// runtime store instead (only used for local non-const variable inits,
/// where `fold` always succeeds since non-constant array initializers are
/// expanded into per-element stores of evaluated expressions, not folded
/// here — callers needing runtime values use [`flatten_exprs`] instead).
pub fn flatten_const(dims: &[i32], init: &InitVal, fold: &mut impl FnMut(&crate::ast::Expr) -> Result<i32, String>) -> Result<Vec<i32>, String> {
    let items = match init {
        InitVal::Exp(e) => return Ok(vec![fold(e)?]),
        InitVal::List(items) => items,
    };
    fill_const(dims, items, fold)
}

fn suffix_product(dims: &[i32], from: usize) -> i32 {
    dims[from..].iter().product()
}

fn fill_const(
    dims: &[i32],
    items: &[InitVal],
    fold: &mut impl FnMut(&crate::ast::Expr) -> Result<i32, String>,
) -> Result<Vec<i32>, String> {
    let total = suffix_product(dims, 0) as usize;
    let mut result = Vec::with_capacity(total);
    for item in items {
        if result.len() >= total {
            return Err("initializer has more elements than the declared shape".to_string());
        }
        match item {
            InitVal::Exp(e) => result.push(fold(e)?),
            InitVal::List(sub_items) => {
                let pos = result.len() as i32;
                // Largest boundary strictly below the current level that `pos` aligns to.
                let mut chosen = dims.len();
                for j in (1..dims.len()).rev() {
                    let s = suffix_product(dims, j);
                    if pos % s == 0 {
                        chosen = j;
                        break;
                    }
                }
                let sub_dims = &dims[chosen..];
                let mut sub = fill_const(sub_dims, sub_items, fold)?;
                let sub_total = suffix_product(sub_dims, 0) as usize;
                sub.resize(sub_total, 0);
                result.extend(sub);
            }
        }
    }
    result.resize(total, 0);
    Ok(result)
}

/// Element descriptor for a non-const local array initializer: each leaf is
/// either a compile-time literal or a source expression to evaluate and
/// store at emission time.
#[derive(Debug, Clone)]
pub enum InitElem {
    Const(i32),
    Expr(crate::ast::Expr),
}

/// As [`flatten_const`], but for local variable initializers: literal leaves
/// stay literal, non-constant leaves are kept as expressions to be emitted
/// as runtime stores. `is_const` reports whether an expression is a
/// compile-time constant (typically: folds with no non-const identifiers).
pub fn flatten_exprs(
    dims: &[i32],
    init: &InitVal,
    try_fold: &mut impl FnMut(&crate::ast::Expr) -> Option<i32>,
) -> Vec<InitElem> {
    let items = match init {
        InitVal::Exp(e) => {
            return vec![match try_fold(e) {
                Some(v) => InitElem::Const(v),
                None => InitElem::Expr(e.clone()),
            }];
        }
        InitVal::List(items) => items,
    };
    fill_exprs(dims, items, try_fold)
}

fn fill_exprs(
    dims: &[i32],
    items: &[InitVal],
    try_fold: &mut impl FnMut(&crate::ast::Expr) -> Option<i32>,
) -> Vec<InitElem> {
    let total = suffix_product(dims, 0) as usize;
    let mut result = Vec::with_capacity(total);
    for item in items {
        if result.len() >= total {
            break;
        }
        match item {
            InitVal::Exp(e) => result.push(match try_fold(e) {
                Some(v) => InitElem::Const(v),
                None => InitElem::Expr(e.clone()),
            }),
            InitVal::List(sub_items) => {
                let pos = result.len() as i32;
                let mut chosen = dims.len();
                for j in (1..dims.len()).rev() {
                    let s = suffix_product(dims, j);
                    if pos % s == 0 {
                        chosen = j;
                        break;
                    }
                }
                let sub_dims = &dims[chosen..];
                let mut sub = fill_exprs(sub_dims, sub_items, try_fold);
                let sub_total = suffix_product(sub_dims, 0) as usize;
                sub.resize(sub_total, InitElem::Const(0));
                result.extend(sub);
            }
        }
    }
    result.resize(total, InitElem::Const(0));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn num(n: i32) -> InitVal {
        InitVal::Exp(Expr::Number(n))
    }

    fn fold_number(e: &Expr) -> Result<i32, String> {
        match e {
            Expr::Number(n) => Ok(*n),
            _ => Err("not a literal".to_string()),
        }
    }

    #[test]
    fn fully_specified_nested_braces() {
        let init = InitVal::List(vec![
            InitVal::List(vec![num(1), num(2), num(3)]),
            InitVal::List(vec![num(4), num(5), num(6)]),
        ]);
        let flat = flatten_const(&[2, 3], &init, &mut fold_number).unwrap();
        assert_eq!(flat, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn partial_brace_pads_with_zeros() {
        // int a[2][3] = {{1}, {4, 5}};
        let init = InitVal::List(vec![
            InitVal::List(vec![num(1)]),
            InitVal::List(vec![num(4), num(5)]),
        ]);
        let flat = flatten_const(&[2, 3], &init, &mut fold_number).unwrap();
        assert_eq!(flat, vec![1, 0, 0, 4, 5, 0]);
    }

    #[test]
    fn flat_list_aligns_to_inner_dimension_boundaries() {
        // int a[2][3] = {1, 2, 3, 4}; -> row 0 fully specified, row1 starts at 4
        let init = InitVal::List(vec![num(1), num(2), num(3), num(4)]);
        let flat = flatten_const(&[2, 3], &init, &mut fold_number).unwrap();
        assert_eq!(flat, vec![1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn empty_braces_is_all_zeros() {
        let init = InitVal::List(vec![]);
        let flat = flatten_const(&[2, 3], &init, &mut fold_number).unwrap();
        assert_eq!(flat, vec![0, 0, 0, 0, 0, 0]);
    }
}
