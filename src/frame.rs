//! Frame planner (spec §4.4): one pass per function that assigns every
//! non-unit-typed instruction a fixed byte offset in its stack frame.
//!
//! Grounded directly on the original `frame.cpp`'s `func_alloc_frame`: same
//! three passes (scan calls for the outgoing-args area, walk every
//! instruction assigning offsets by its *result* type, then reserve `ra`
//! and round to 16), just keyed by `koopa::ir::Value` and walked through
//! `FunctionData::layout()`/`dfg()` instead of a
//! `std::map<koopa_raw_value_t, frame_entry_t>` over a `koopa_raw_*` tree.

use crate::error::CompileError;
use koopa::ir::{FunctionData, Type, TypeKind, Value, ValueKind};
use std::collections::HashMap;

pub const STACK_ALIGNMENT: i32 = 16;
pub const SIZE_I32: i32 = 4;

/// Size in bytes of a Koopa type, per spec §3: `i32` = 4, `pointer` = 4,
/// `array(T, n)` = `n * size_of(T)`.
pub fn size_of_type(ty: &Type) -> i32 {
    match ty.kind() {
        TypeKind::Int32 => SIZE_I32,
        TypeKind::Unit => 0,
        TypeKind::Pointer(_) => SIZE_I32,
        TypeKind::Array(elem, len) => *len as i32 * size_of_type(elem),
        TypeKind::Function(..) => {
            unreachable!("a function type is never sized by the frame planner")
        }
    }
}

/// One function's stack layout: outgoing-args area at offset 0, then a slot
/// per non-unit instruction result, then (if the function calls out) 4
/// bytes for `ra` at the very top of the rounded frame.
pub struct FramePlan {
    slots: HashMap<Value, i32>,
    pub frame_size: i32,
    pub is_with_call: bool,
}

impl FramePlan {
    pub fn slot_offset(&self, v: Value) -> Result<i32, CompileError> {
        self.slots.get(&v).copied().ok_or_else(|| {
            CompileError::internal("frame planner has no slot for a value the backend needs")
        })
    }

    /// Offset of the saved `ra` slot, at the top of the frame. Only valid
    /// when `is_with_call`.
    pub fn ra_offset(&self) -> i32 {
        self.frame_size - SIZE_I32
    }
}

/// Every `inst` walked here comes from `func_data`'s own layout, so it is
/// always local to this function (never a reference into the program's
/// global value pool) — no `Value::is_global` check is needed.
pub fn plan_function(func_data: &FunctionData) -> FramePlan {
    let dfg = func_data.dfg();

    let mut max_call_args: usize = 0;
    let mut is_with_call = false;
    for (_, node) in func_data.layout().bbs() {
        for &inst in node.insts().keys() {
            if let ValueKind::Call(call) = dfg.value(inst).kind() {
                is_with_call = true;
                max_call_args = max_call_args.max(call.args().len());
            }
        }
    }

    let mut frame_size = if max_call_args > 8 {
        (max_call_args - 8) as i32 * SIZE_I32
    } else {
        0
    };

    let mut slots = HashMap::new();
    for (_, node) in func_data.layout().bbs() {
        for &inst in node.insts().keys() {
            let data = dfg.value(inst);
            match data.ty().kind() {
                TypeKind::Unit => {}
                TypeKind::Int32 => {
                    slots.insert(inst, frame_size);
                    frame_size += SIZE_I32;
                }
                TypeKind::Pointer(pointee) => {
                    slots.insert(inst, frame_size);
                    frame_size += match data.kind() {
                        ValueKind::Alloc(_) => size_of_type(pointee),
                        _ => SIZE_I32,
                    };
                }
                other => unreachable!(
                    "an instruction result never carries type {:?}; the parser rejects it earlier",
                    other
                ),
            }
        }
    }

    if is_with_call {
        frame_size += SIZE_I32;
    }
    frame_size = (frame_size + STACK_ALIGNMENT - 1) / STACK_ALIGNMENT * STACK_ALIGNMENT;

    FramePlan {
        slots,
        frame_size,
        is_with_call,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_of_array_multiplies_through_nesting() {
        let elem = Type::get_i32();
        let inner = Type::get_array(elem, 4);
        let outer = Type::get_array(inner, 3);
        assert_eq!(size_of_type(&outer), 3 * 4 * SIZE_I32);
    }

    #[test]
    fn frame_size_is_always_a_multiple_of_sixteen() {
        // 5 int32 slots (20 bytes) with no call rounds up to 32.
        let mut slots = HashMap::new();
        let _ = &mut slots;
        let frame_size = {
            let raw = 5 * SIZE_I32;
            (raw + STACK_ALIGNMENT - 1) / STACK_ALIGNMENT * STACK_ALIGNMENT
        };
        assert_eq!(frame_size % STACK_ALIGNMENT, 0);
        assert_eq!(frame_size, 32);
    }
}
