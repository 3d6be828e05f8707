//! Koopa `Program` -> RISC-V backend (spec §4.5).
//!
//! Visits each instruction in declaration order and emits RV32IM,
//! GNU-assembler syntax. No register allocation: every non-unit value gets
//! its frame-planner slot (`src/frame.rs`) and round-trips through it -
//! values never live in a register across more than the one instruction
//! that produces or consumes them, mirroring the original `riscv.cpp`'s
//! `gen_*` calls driven straight off the Koopa visitor.
//!
//! Grounded on the DFG/Layout traversal the course's own public backend
//! examples use (`Program::func_layout()`, `Program::func()`,
//! `FunctionData::layout().bbs()`, `FunctionData::dfg().value()`) rather
//! than a `koopa::ir::raw` tree — that module is FFI-shaped (`RawProgram`,
//! `RawValue`, ... as buffers/pointers) and isn't what a Rust backend walks.

mod inst;

use crate::error::CompileError;
use crate::frame::{self, FramePlan};
use inst::InstWriter;
use koopa::ir::dfg::DataFlowGraph;
use koopa::ir::entities::{BorrowedValue, ValueData};
use koopa::ir::{BasicBlock, BinaryOp, Function, FunctionData, Program, TypeKind, Value, ValueKind};

pub fn emit_riscv(program: &Program) -> Result<String, CompileError> {
    let mut w = InstWriter::new();
    emit_data_section(&mut w, program)?;
    emit_text_section(&mut w, program)?;
    Ok(w.out)
}

/// A resolved `ValueData`, from either a function-local `DataFlowGraph` or
/// the program's global value pool. A `Value` operand referenced inside a
/// function body can point at either (e.g. a `store` into a global array),
/// distinguished by `Value::is_global`.
enum VData<'a> {
    Local(&'a ValueData),
    Global(BorrowedValue<'a>),
}

impl<'a> std::ops::Deref for VData<'a> {
    type Target = ValueData;

    fn deref(&self) -> &ValueData {
        match self {
            VData::Local(d) => d,
            VData::Global(d) => d,
        }
    }
}

// --- globals / .data -----------------------------------------------------

fn global_label(data: &ValueData) -> String {
    data.name()
        .as_ref()
        .expect("a global_alloc value is always named")
        .trim_start_matches('@')
        .to_string()
}

fn emit_data_section(w: &mut InstWriter, program: &Program) -> Result<(), CompileError> {
    let globals = program.inst_layout();
    if globals.is_empty() {
        return Ok(());
    }
    w.raw("\t.data");
    for &v in globals {
        let data = program.borrow_value(v);
        let ValueKind::GlobalAlloc(alloc) = data.kind() else {
            return Err(CompileError::internal(
                "a program-level value that isn't a global_alloc",
            ));
        };
        let label = global_label(&data);
        let init = alloc.init();
        drop(data);
        w.raw(&format!("\t.globl {}", label));
        w.label(&label);
        emit_global_init(w, program, init)?;
        w.raw("");
    }
    Ok(())
}

fn emit_global_init(w: &mut InstWriter, program: &Program, init: Value) -> Result<(), CompileError> {
    let data = program.borrow_value(init);
    match data.kind() {
        ValueKind::ZeroInit(_) => {
            w.raw(&format!("\t.zero {}", frame::size_of_type(data.ty())));
        }
        ValueKind::Integer(i) => {
            w.raw(&format!("\t.word {}", i.value()));
        }
        ValueKind::Aggregate(agg) => {
            let elems: Vec<Value> = agg.elems().to_vec();
            drop(data);
            for elem in elems {
                emit_global_init(w, program, elem)?;
            }
        }
        _ => return Err(CompileError::internal("unsupported global initializer shape")),
    }
    Ok(())
}

// --- functions / .text ----------------------------------------------------

fn func_label(func_data: &FunctionData) -> String {
    func_data.name().trim_start_matches('@').to_string()
}

fn bb_label(dfg: &DataFlowGraph, bb: BasicBlock) -> String {
    dfg.bb(bb)
        .name()
        .as_ref()
        .map(|s| s.trim_start_matches('%').to_string())
        .unwrap_or_else(|| "anon_bb".to_string())
}

fn emit_text_section(w: &mut InstWriter, program: &Program) -> Result<(), CompileError> {
    w.raw("\t.text");
    for &func in program.func_layout() {
        let func_data = program.func(func);
        // A `decl`-only library function has no basic blocks to emit.
        if func_data.layout().bbs().len() == 0 {
            continue;
        }
        w.raw(&format!("\t.globl {}", func_label(func_data)));
    }
    for &func in program.func_layout() {
        let func_data = program.func(func);
        if func_data.layout().bbs().len() == 0 {
            continue;
        }
        emit_function(w, program, func_data)?;
    }
    Ok(())
}

struct FuncCtx<'a> {
    program: &'a Program,
    dfg: &'a DataFlowGraph,
    plan: FramePlan,
}

impl<'a> FuncCtx<'a> {
    /// Resolves a `Value` operand to its defining `ValueData`, whether it
    /// was produced inside this function or is a reference to a program-
    /// scope `global_alloc`.
    fn kind(&self, v: Value) -> VData<'a> {
        if v.is_global() {
            VData::Global(self.program.borrow_value(v))
        } else {
            VData::Local(self.dfg.value(v))
        }
    }

    /// Where to find the i-th incoming argument to the *current* function:
    /// registers `a0..a7` for the first 8, else the caller's outgoing-args
    /// slot sitting just above this function's own frame.
    fn arg_location(&self, idx: usize) -> ArgLoc {
        if idx < 8 {
            ArgLoc::Reg(format!("a{}", idx))
        } else {
            ArgLoc::Stack(self.plan.frame_size + frame::SIZE_I32 * (idx as i32 - 8))
        }
    }
}

enum ArgLoc {
    Reg(String),
    Stack(i32),
}

fn emit_function(
    w: &mut InstWriter,
    program: &Program,
    func_data: &FunctionData,
) -> Result<(), CompileError> {
    let plan = frame::plan_function(func_data);
    let dfg = func_data.dfg();
    let ctx = FuncCtx { program, dfg, plan };

    w.label(&func_label(func_data));
    emit_prologue(w, &ctx);

    for (&bb, node) in func_data.layout().bbs() {
        w.label(&bb_label(dfg, bb));
        for &inst in node.insts().keys() {
            emit_instruction(w, &ctx, inst)?;
        }
    }
    Ok(())
}

fn emit_prologue(w: &mut InstWriter, ctx: &FuncCtx) {
    if ctx.plan.frame_size > 0 {
        w.addi("sp", "sp", -ctx.plan.frame_size);
    }
    if ctx.plan.is_with_call {
        w.sw("ra", ctx.plan.ra_offset(), "sp");
    }
}

fn emit_epilogue(w: &mut InstWriter, ctx: &FuncCtx) {
    if ctx.plan.is_with_call {
        w.lw("ra", ctx.plan.ra_offset(), "sp");
    }
    if ctx.plan.frame_size > 0 {
        w.addi("sp", "sp", ctx.plan.frame_size);
    }
}

// --- per-instruction lowering ----------------------------------------------

fn emit_instruction(w: &mut InstWriter, ctx: &FuncCtx, inst: Value) -> Result<(), CompileError> {
    match ctx.kind(inst).kind() {
        ValueKind::Integer(_)
        | ValueKind::ZeroInit(_)
        | ValueKind::Undef(_)
        | ValueKind::Aggregate(_)
        | ValueKind::FuncArgRef(_)
        | ValueKind::BlockArgRef(_)
        | ValueKind::GlobalAlloc(_) => {
            // Constants and refs are never walked as standalone instructions;
            // they only ever appear as operands of the instructions below.
            Ok(())
        }
        ValueKind::Alloc(_) => Ok(()), // the frame plan already reserved its slot.
        ValueKind::Load(load) => {
            let src = load.src();
            emit_load(w, ctx, inst, src)
        }
        ValueKind::Store(store) => {
            let (value, dest) = (store.value(), store.dest());
            emit_store(w, ctx, value, dest)
        }
        ValueKind::GetPtr(gp) => {
            let (src, index) = (gp.src(), gp.index());
            emit_index(w, ctx, inst, src, index)
        }
        ValueKind::GetElemPtr(gep) => {
            let (src, index) = (gep.src(), gep.index());
            emit_index(w, ctx, inst, src, index)
        }
        ValueKind::Binary(bin) => {
            let (op, lhs, rhs) = (bin.op(), bin.lhs(), bin.rhs());
            emit_binary(w, ctx, inst, op, lhs, rhs)
        }
        ValueKind::Branch(br) => {
            let (cond, true_bb, false_bb) = (br.cond(), br.true_bb(), br.false_bb());
            emit_branch(w, ctx, cond, true_bb, false_bb);
            Ok(())
        }
        ValueKind::Jump(jump) => {
            let target = jump.target();
            w.j(&bb_label(ctx.dfg, target));
            Ok(())
        }
        ValueKind::Call(call) => {
            let (callee, args) = (call.callee(), call.args().to_vec());
            emit_call(w, ctx, inst, callee, &args)
        }
        ValueKind::Return(ret) => {
            let value = ret.value();
            emit_return(w, ctx, value)
        }
    }
}

/// Materializes an i32-valued operand into `reg`: a folded constant, a
/// `func_arg_ref`, or the result of a prior instruction sitting in its
/// frame slot.
fn load_value(w: &mut InstWriter, ctx: &FuncCtx, v: Value, reg: &str) -> Result<(), CompileError> {
    match ctx.kind(v).kind() {
        ValueKind::Integer(i) => {
            w.li(reg, i.value());
            Ok(())
        }
        ValueKind::FuncArgRef(arg) => {
            match ctx.arg_location(arg.index()) {
                ArgLoc::Reg(r) => w.mv(reg, &r),
                ArgLoc::Stack(off) => w.lw(reg, off, "sp"),
            }
            Ok(())
        }
        _ => {
            let off = ctx.plan.slot_offset(v)?;
            w.lw(reg, off, "sp");
            Ok(())
        }
    }
}

/// Computes an address into `reg`: the stack address of a local `alloc`,
/// `la` of a global, or (for any other pointer-typed value - a `getelemptr`/
/// `getptr`/`load` result) the pointer value itself, fetched from its slot.
fn compute_address(w: &mut InstWriter, ctx: &FuncCtx, ptr: Value, reg: &str) -> Result<(), CompileError> {
    match ctx.kind(ptr).kind() {
        ValueKind::Alloc(_) => {
            let off = ctx.plan.slot_offset(ptr)?;
            w.addi(reg, "sp", off);
            Ok(())
        }
        ValueKind::GlobalAlloc(_) => {
            let label = global_label(&ctx.kind(ptr));
            w.la(reg, &label);
            Ok(())
        }
        _ => {
            let off = ctx.plan.slot_offset(ptr)?;
            w.lw(reg, off, "sp");
            Ok(())
        }
    }
}

fn spill(w: &mut InstWriter, ctx: &FuncCtx, inst: Value, reg: &str) -> Result<(), CompileError> {
    let off = ctx.plan.slot_offset(inst)?;
    w.sw(reg, off, "sp");
    Ok(())
}

fn emit_load(w: &mut InstWriter, ctx: &FuncCtx, inst: Value, src: Value) -> Result<(), CompileError> {
    match ctx.kind(src).kind() {
        ValueKind::Alloc(_) => {
            let off = ctx.plan.slot_offset(src)?;
            w.lw("t0", off, "sp");
        }
        ValueKind::GlobalAlloc(_) => {
            let label = global_label(&ctx.kind(src));
            w.la("t0", &label);
            w.lw("t0", 0, "t0");
        }
        _ => {
            let off = ctx.plan.slot_offset(src)?;
            w.lw("t0", off, "sp");
            w.lw("t0", 0, "t0");
        }
    }
    spill(w, ctx, inst, "t0")
}

fn emit_store(w: &mut InstWriter, ctx: &FuncCtx, value: Value, dest: Value) -> Result<(), CompileError> {
    load_value(w, ctx, value, "t0")?;
    match ctx.kind(dest).kind() {
        ValueKind::Alloc(_) => {
            let off = ctx.plan.slot_offset(dest)?;
            w.sw("t0", off, "sp");
        }
        ValueKind::GlobalAlloc(_) => {
            let label = global_label(&ctx.kind(dest));
            w.la("t1", &label);
            w.sw("t0", 0, "t1");
        }
        _ => {
            let off = ctx.plan.slot_offset(dest)?;
            w.lw("t1", off, "sp");
            w.sw("t0", 0, "t1");
        }
    }
    Ok(())
}

/// `getelemptr`/`getptr` (spec §4.5): `base_addr + index * size_of(elem)`.
/// The instruction's own result type is already `*elem`, so `elem`'s size
/// comes straight from `inst`'s own type rather than re-deriving it from
/// `src`.
fn emit_index(
    w: &mut InstWriter,
    ctx: &FuncCtx,
    inst: Value,
    src: Value,
    index: Value,
) -> Result<(), CompileError> {
    let data = ctx.kind(inst);
    let elem_size = match data.ty().kind() {
        TypeKind::Pointer(elem) => frame::size_of_type(elem),
        other => {
            return Err(CompileError::internal(format!(
                "getelemptr/getptr result must be a pointer type, found {:?}",
                other
            )))
        }
    };
    drop(data);

    compute_address(w, ctx, src, "t0")?;
    load_value(w, ctx, index, "t1")?;
    if let Some(shift) = power_of_two_log2(elem_size) {
        if shift > 0 {
            w.sll("t1", "t1", shift);
        }
    } else {
        w.li("t2", elem_size);
        w.mul("t1", "t1", "t2");
    }
    w.add("t0", "t0", "t1");
    spill(w, ctx, inst, "t0")
}

fn power_of_two_log2(n: i32) -> Option<u32> {
    if n > 0 && (n & (n - 1)) == 0 {
        Some(n.trailing_zeros())
    } else {
        None
    }
}

/// Binary-op table (spec §4.5): `ne`/`eq` special-case a literal-zero
/// operand to a single `seqz`/`snez`; `le`/`ge` synthesize from `slt` since
/// RV32I has no `sle`/`sge`.
fn emit_binary(
    w: &mut InstWriter,
    ctx: &FuncCtx,
    inst: Value,
    op: BinaryOp,
    lhs: Value,
    rhs: Value,
) -> Result<(), CompileError> {
    let lhs_is_zero = matches!(ctx.kind(lhs).kind(), ValueKind::Integer(i) if i.value() == 0);
    let rhs_is_zero = matches!(ctx.kind(rhs).kind(), ValueKind::Integer(i) if i.value() == 0);

    match op {
        BinaryOp::NotEq => {
            if rhs_is_zero {
                load_value(w, ctx, lhs, "t0")?;
            } else if lhs_is_zero {
                load_value(w, ctx, rhs, "t0")?;
            } else {
                load_value(w, ctx, lhs, "t0")?;
                load_value(w, ctx, rhs, "t1")?;
                w.xor("t0", "t0", "t1");
            }
            w.snez("t0", "t0");
        }
        BinaryOp::Eq => {
            if rhs_is_zero {
                load_value(w, ctx, lhs, "t0")?;
            } else if lhs_is_zero {
                load_value(w, ctx, rhs, "t0")?;
            } else {
                load_value(w, ctx, lhs, "t0")?;
                load_value(w, ctx, rhs, "t1")?;
                w.xor("t0", "t0", "t1");
            }
            w.seqz("t0", "t0");
        }
        BinaryOp::Lt => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.slt("t0", "t0", "t1");
        }
        BinaryOp::Gt => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.slt("t0", "t1", "t0");
        }
        BinaryOp::Le => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.slt("t0", "t1", "t0");
            w.xori("t0", "t0", 1);
        }
        BinaryOp::Ge => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.slt("t0", "t0", "t1");
            w.xori("t0", "t0", 1);
        }
        BinaryOp::Add => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.add("t0", "t0", "t1");
        }
        BinaryOp::Sub => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.sub("t0", "t0", "t1");
        }
        BinaryOp::Mul => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.mul("t0", "t0", "t1");
        }
        BinaryOp::Div => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.div("t0", "t0", "t1");
        }
        BinaryOp::Mod => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.rem("t0", "t0", "t1");
        }
        BinaryOp::And => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.and("t0", "t0", "t1");
        }
        BinaryOp::Or => {
            load_value(w, ctx, lhs, "t0")?;
            load_value(w, ctx, rhs, "t1")?;
            w.or("t0", "t0", "t1");
        }
        other => {
            return Err(CompileError::internal(format!(
                "binary op {:?} is outside the 16-op table this backend supports",
                other
            )))
        }
    }
    spill(w, ctx, inst, "t0")
}

fn emit_branch(
    w: &mut InstWriter,
    ctx: &FuncCtx,
    cond: Value,
    true_bb: BasicBlock,
    false_bb: BasicBlock,
) {
    // Errors loading `cond` can't actually occur (every branch condition is
    // a previously-spilled value or a constant); a malformed program here
    // is an internal-invariant failure the frame planner would have already
    // caught.
    load_value(w, ctx, cond, "t0").expect("branch condition is always a sized value");
    w.safe_bnez("t0", &bb_label(ctx.dfg, true_bb));
    w.j(&bb_label(ctx.dfg, false_bb));
}

fn emit_call(
    w: &mut InstWriter,
    ctx: &FuncCtx,
    inst: Value,
    callee: Function,
    args: &[Value],
) -> Result<(), CompileError> {
    for (i, &arg) in args.iter().enumerate() {
        if i < 8 {
            load_value(w, ctx, arg, &format!("a{}", i))?;
        }
    }
    for (i, &arg) in args.iter().enumerate().skip(8) {
        load_value(w, ctx, arg, "t0")?;
        w.sw("t0", frame::SIZE_I32 * (i as i32 - 8), "sp");
    }
    let callee_data = ctx.program.func(callee);
    w.call(&func_label(callee_data));
    if !matches!(ctx.kind(inst).ty().kind(), TypeKind::Unit) {
        spill(w, ctx, inst, "a0")?;
    }
    Ok(())
}

fn emit_return(w: &mut InstWriter, ctx: &FuncCtx, value: Option<Value>) -> Result<(), CompileError> {
    if let Some(v) = value {
        load_value(w, ctx, v, "a0")?;
    }
    emit_epilogue(w, ctx);
    w.ret();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::power_of_two_log2;

    #[test]
    fn power_of_two_detection() {
        assert_eq!(power_of_two_log2(1), Some(0));
        assert_eq!(power_of_two_log2(4), Some(2));
        assert_eq!(power_of_two_log2(3), None);
        assert_eq!(power_of_two_log2(0), None);
    }
}
