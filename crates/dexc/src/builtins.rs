//! The built-in host module: registers `Bool`, `Integer`, `Float`,
//! `String`, and the full operator set, with intrinsic emitters for
//! arithmetic and comparison on the three `Value` types.
//!
//! String's representation (`{ptr, len, cap}` over a heap-owned byte
//! buffer, cloned rather than shared on copy) mirrors the arena/global
//! split the runtime's own string type uses, simplified down to a single
//! owning representation since this module has no arena to borrow from.

use crate::codegen::expr::{IntrinsicCtx, Value};
use crate::functions::{IntrinsicEmitter, Param, WrapperFn};
use crate::registry::{Module, Registry};
use crate::types::{CallConv, DefaultConstruct, Lifetime, NativeFn, TypeId, TypeKind};

pub struct BuiltinModule;

// ---------------------------------------------------------------------
// String representation and lifetime callbacks
// ---------------------------------------------------------------------

#[repr(C)]
struct DexString {
    ptr: *mut u8,
    len: i64,
    cap: i64,
}

extern "C" fn dex_string_default_ctor(out: *mut u8) {
    unsafe {
        let out = out as *mut DexString;
        (*out).ptr = std::ptr::null_mut();
        (*out).len = 0;
        (*out).cap = 0;
    }
}

extern "C" fn dex_string_destructor(target: *mut u8) {
    unsafe {
        let target = target as *mut DexString;
        if !(*target).ptr.is_null() {
            let _ = Vec::from_raw_parts((*target).ptr, (*target).len as usize, (*target).cap as usize);
        }
    }
}

extern "C" fn dex_string_copy_ctor(dst: *mut u8, src: *const u8) {
    unsafe {
        let src = src as *const DexString;
        write_owned_bytes(dst, std::slice::from_raw_parts((*src).ptr, (*src).len as usize));
    }
}

extern "C" fn dex_string_move_ctor(dst: *mut u8, src: *mut u8) {
    unsafe {
        std::ptr::copy_nonoverlapping(src, dst, std::mem::size_of::<DexString>());
    }
}

/// Called directly from generated IR for string literals (bypasses the
/// function library: this is compiler machinery, not a source-callable
/// function). Always copies, since the literal's global bytes are not
/// heap-owned and must not be freed by the string's destructor.
pub extern "C" fn dex_string_from_static(src: *const u8, len: i64, out: *mut u8) {
    unsafe {
        write_owned_bytes(out, std::slice::from_raw_parts(src, len as usize));
    }
}

unsafe fn write_owned_bytes(dst: *mut u8, bytes: &[u8]) {
    let mut owned = bytes.to_vec();
    let out = dst as *mut DexString;
    (*out).ptr = owned.as_mut_ptr();
    (*out).len = owned.len() as i64;
    (*out).cap = owned.capacity() as i64;
    std::mem::forget(owned);
}

unsafe fn dex_string_as_str<'a>(ptr: *const u8) -> &'a str {
    let s = ptr as *const DexString;
    let bytes = std::slice::from_raw_parts((*s).ptr, (*s).len as usize);
    std::str::from_utf8_unchecked(bytes)
}

/// `substr(s, start, len)`: character-index slice, clamped at both ends;
/// out-of-range indices yield an empty string rather than an error.
extern "C" fn dex_substr(out: *mut u8, s: *const u8, start: i64, len: i64) {
    let result: String = if start < 0 || len < 0 {
        String::new()
    } else {
        unsafe { dex_string_as_str(s) }
            .chars()
            .skip(start as usize)
            .take(len as usize)
            .collect()
    };
    unsafe { write_owned_bytes(out, result.as_bytes()) };
}

extern "C" fn wrapper_substr(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut u8, *const u8, i64, i64) = std::mem::transmute(entry);
        let out = *args;
        let s = *args.add(1);
        let start = *(*args.add(2) as *const i64);
        let len = *(*args.add(3) as *const i64);
        f(out, s, start, len);
    }
}

// ---------------------------------------------------------------------
// Type-erased wrappers for the operator set, grouped by argument shape.
// Each casts `entry` to the concrete `void F(Tret*, argN...)` signature
// the generated IR itself calls, so folding (which goes through this
// wrapper) and JIT-compiled code (which calls `entry` directly) agree.
// ---------------------------------------------------------------------

extern "C" fn wrapper_int_binop(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut i64, i64, i64) = std::mem::transmute(entry);
        let a = *(*args.add(1) as *const i64);
        let b = *(*args.add(2) as *const i64);
        f(*args as *mut i64, a, b);
    }
}

extern "C" fn wrapper_int_cmp(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut u8, i64, i64) = std::mem::transmute(entry);
        let a = *(*args.add(1) as *const i64);
        let b = *(*args.add(2) as *const i64);
        f(*args, a, b);
    }
}

extern "C" fn wrapper_int_unop(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut i64, i64) = std::mem::transmute(entry);
        let a = *(*args.add(1) as *const i64);
        f(*args as *mut i64, a);
    }
}

extern "C" fn wrapper_float_binop(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut f64, f64, f64) = std::mem::transmute(entry);
        let a = *(*args.add(1) as *const f64);
        let b = *(*args.add(2) as *const f64);
        f(*args as *mut f64, a, b);
    }
}

extern "C" fn wrapper_float_cmp(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut u8, f64, f64) = std::mem::transmute(entry);
        let a = *(*args.add(1) as *const f64);
        let b = *(*args.add(2) as *const f64);
        f(*args, a, b);
    }
}

extern "C" fn wrapper_float_unop(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut f64, f64) = std::mem::transmute(entry);
        let a = *(*args.add(1) as *const f64);
        f(*args as *mut f64, a);
    }
}

extern "C" fn wrapper_bool_binop(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut u8, u8, u8) = std::mem::transmute(entry);
        let a = *(*args.add(1));
        let b = *(*args.add(2));
        f(*args, a, b);
    }
}

extern "C" fn wrapper_bool_unop(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut u8, u8) = std::mem::transmute(entry);
        let a = *(*args.add(1));
        f(*args, a);
    }
}

// ---------------------------------------------------------------------
// Native entries
// ---------------------------------------------------------------------

macro_rules! int_binop {
    ($fn_name:ident, $op:tt) => {
        extern "C" fn $fn_name(ret: *mut i64, a: i64, b: i64) {
            unsafe { *ret = a $op b; }
        }
    };
}
int_binop!(dex_int_add, +);
int_binop!(dex_int_sub, -);
int_binop!(dex_int_mul, *);
int_binop!(dex_int_bitand, &);
int_binop!(dex_int_bitor, |);
int_binop!(dex_int_bitxor, ^);

extern "C" fn dex_int_div(ret: *mut i64, a: i64, b: i64) {
    unsafe { *ret = a.wrapping_div(b) };
}
extern "C" fn dex_int_mod(ret: *mut i64, a: i64, b: i64) {
    unsafe { *ret = a.wrapping_rem(b) };
}
extern "C" fn dex_int_shl(ret: *mut i64, a: i64, b: i64) {
    unsafe { *ret = a.wrapping_shl(b as u32) };
}
extern "C" fn dex_int_shrs(ret: *mut i64, a: i64, b: i64) {
    unsafe { *ret = a.wrapping_shr(b as u32) };
}
extern "C" fn dex_int_shrz(ret: *mut i64, a: i64, b: i64) {
    unsafe { *ret = ((a as u64).wrapping_shr(b as u32)) as i64 };
}
extern "C" fn dex_int_uminus(ret: *mut i64, a: i64) {
    unsafe { *ret = a.wrapping_neg() };
}

macro_rules! int_cmp {
    ($fn_name:ident, $op:tt) => {
        extern "C" fn $fn_name(ret: *mut u8, a: i64, b: i64) {
            unsafe { *ret = (a $op b) as u8; }
        }
    };
}
int_cmp!(dex_int_eq, ==);
int_cmp!(dex_int_ne, !=);
int_cmp!(dex_int_lt, <);
int_cmp!(dex_int_le, <=);
int_cmp!(dex_int_gt, >);
int_cmp!(dex_int_ge, >=);

macro_rules! float_binop {
    ($fn_name:ident, $op:tt) => {
        extern "C" fn $fn_name(ret: *mut f64, a: f64, b: f64) {
            unsafe { *ret = a $op b; }
        }
    };
}
float_binop!(dex_float_add, +);
float_binop!(dex_float_sub, -);
float_binop!(dex_float_mul, *);
float_binop!(dex_float_div, /);

extern "C" fn dex_float_mod(ret: *mut f64, a: f64, b: f64) {
    unsafe { *ret = a % b };
}
extern "C" fn dex_float_uminus(ret: *mut f64, a: f64) {
    unsafe { *ret = -a };
}

macro_rules! float_cmp {
    ($fn_name:ident, $op:tt) => {
        extern "C" fn $fn_name(ret: *mut u8, a: f64, b: f64) {
            unsafe { *ret = (a $op b) as u8; }
        }
    };
}
float_cmp!(dex_float_eq, ==);
float_cmp!(dex_float_ne, !=);
float_cmp!(dex_float_lt, <);
float_cmp!(dex_float_le, <=);
float_cmp!(dex_float_gt, >);
float_cmp!(dex_float_ge, >=);

extern "C" fn dex_bool_and(ret: *mut u8, a: u8, b: u8) {
    unsafe { *ret = (a != 0 && b != 0) as u8 };
}
extern "C" fn dex_bool_or(ret: *mut u8, a: u8, b: u8) {
    unsafe { *ret = (a != 0 || b != 0) as u8 };
}
extern "C" fn dex_bool_not(ret: *mut u8, a: u8) {
    unsafe { *ret = (a == 0) as u8 };
}
extern "C" fn dex_bool_eq(ret: *mut u8, a: u8, b: u8) {
    unsafe { *ret = (a == b) as u8 };
}
extern "C" fn dex_bool_ne(ret: *mut u8, a: u8, b: u8) {
    unsafe { *ret = (a != b) as u8 };
}

// ---------------------------------------------------------------------
// Intrinsic emitters: inline IR instead of a call, for Value-type
// arithmetic and comparisons.
// ---------------------------------------------------------------------

fn binary_intrinsic(ctx: &mut IntrinsicCtx, ir_ty: &str, op: &str) -> Result<(), String> {
    let a = ctx.arg(0).text.clone();
    let b = ctx.arg(1).text.clone();
    let t = ctx.fresh_temp();
    ctx.emit(format!("{t} = {op} {ir_ty} {a}, {b}"));
    ctx.set_result(Value::by_value(t, ctx.arg(0).ty));
    Ok(())
}

fn cmp_intrinsic(ctx: &mut IntrinsicCtx, ir_ty: &str, pred: &str, is_float: bool) -> Result<(), String> {
    let a = ctx.arg(0).text.clone();
    let b = ctx.arg(1).text.clone();
    let instr = if is_float { "fcmp" } else { "icmp" };
    let t = ctx.fresh_temp();
    ctx.emit(format!("{t} = {instr} {pred} {ir_ty} {a}, {b}"));
    ctx.set_result(Value::by_value(t, ctx.arg(0).ty));
    Ok(())
}

fn unary_intrinsic(ctx: &mut IntrinsicCtx, ir_ty: &str, op: &str) -> Result<(), String> {
    let a = ctx.arg(0).text.clone();
    let t = ctx.fresh_temp();
    ctx.emit(format!("{t} = {op} {ir_ty} {a}"));
    ctx.set_result(Value::by_value(t, ctx.arg(0).ty));
    Ok(())
}

fn int_uminus_intrinsic(ctx: &mut IntrinsicCtx) -> Result<(), String> {
    let a = ctx.arg(0).text.clone();
    let t = ctx.fresh_temp();
    ctx.emit(format!("{t} = sub nsw i64 0, {a}"));
    ctx.set_result(Value::by_value(t, ctx.arg(0).ty));
    Ok(())
}

fn bool_not_intrinsic(ctx: &mut IntrinsicCtx) -> Result<(), String> {
    let a = ctx.arg(0).text.clone();
    let t = ctx.fresh_temp();
    ctx.emit(format!("{t} = xor i1 {a}, true"));
    ctx.set_result(Value::by_value(t, ctx.arg(0).ty));
    Ok(())
}

macro_rules! intrinsic_fn {
    ($name:ident, $body:expr) => {
        fn $name(ctx: &mut IntrinsicCtx) -> Result<(), String> {
            $body(ctx)
        }
    };
}

intrinsic_fn!(intrinsic_int_add, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "add"));
intrinsic_fn!(intrinsic_int_sub, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "sub"));
intrinsic_fn!(intrinsic_int_mul, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "mul"));
intrinsic_fn!(intrinsic_int_div, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "sdiv"));
intrinsic_fn!(intrinsic_int_mod, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "srem"));
intrinsic_fn!(intrinsic_int_bitand, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "and"));
intrinsic_fn!(intrinsic_int_bitor, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "or"));
intrinsic_fn!(intrinsic_int_bitxor, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "xor"));
intrinsic_fn!(intrinsic_int_shl, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "shl"));
intrinsic_fn!(intrinsic_int_shrs, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "ashr"));
intrinsic_fn!(intrinsic_int_shrz, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i64", "lshr"));
intrinsic_fn!(intrinsic_int_uminus, |ctx: &mut IntrinsicCtx| int_uminus_intrinsic(ctx));

intrinsic_fn!(intrinsic_int_eq, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i64", "eq", false));
intrinsic_fn!(intrinsic_int_ne, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i64", "ne", false));
intrinsic_fn!(intrinsic_int_lt, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i64", "slt", false));
intrinsic_fn!(intrinsic_int_le, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i64", "sle", false));
intrinsic_fn!(intrinsic_int_gt, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i64", "sgt", false));
intrinsic_fn!(intrinsic_int_ge, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i64", "sge", false));

intrinsic_fn!(intrinsic_float_add, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "double", "fadd"));
intrinsic_fn!(intrinsic_float_sub, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "double", "fsub"));
intrinsic_fn!(intrinsic_float_mul, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "double", "fmul"));
intrinsic_fn!(intrinsic_float_div, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "double", "fdiv"));
intrinsic_fn!(intrinsic_float_mod, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "double", "frem"));
intrinsic_fn!(intrinsic_float_uminus, |ctx: &mut IntrinsicCtx| unary_intrinsic(ctx, "double", "fneg"));

intrinsic_fn!(intrinsic_float_eq, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "double", "oeq", true));
intrinsic_fn!(intrinsic_float_ne, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "double", "one", true));
intrinsic_fn!(intrinsic_float_lt, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "double", "olt", true));
intrinsic_fn!(intrinsic_float_le, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "double", "ole", true));
intrinsic_fn!(intrinsic_float_gt, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "double", "ogt", true));
intrinsic_fn!(intrinsic_float_ge, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "double", "oge", true));

intrinsic_fn!(intrinsic_bool_and, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i1", "and"));
intrinsic_fn!(intrinsic_bool_or, |ctx: &mut IntrinsicCtx| binary_intrinsic(ctx, "i1", "or"));
intrinsic_fn!(intrinsic_bool_not, |ctx: &mut IntrinsicCtx| bool_not_intrinsic(ctx));
intrinsic_fn!(intrinsic_bool_eq, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i1", "eq", false));
intrinsic_fn!(intrinsic_bool_ne, |ctx: &mut IntrinsicCtx| cmp_intrinsic(ctx, "i1", "ne", false));

// ---------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------

impl Module for BuiltinModule {
    fn register_types(&self, registry: &mut Registry) {
        registry
            .register_type(
                "Bool",
                TypeKind::Value,
                1,
                1,
                CallConv::ByValue,
                Lifetime::trivial(),
                Some(Box::new(|| "i1".to_string())),
            )
            .expect("Bool registration cannot fail on a fresh table");

        registry
            .register_type(
                "Integer",
                TypeKind::Value,
                8,
                8,
                CallConv::ByValue,
                Lifetime::trivial(),
                Some(Box::new(|| "i64".to_string())),
            )
            .expect("Integer registration cannot fail on a fresh table");

        registry
            .register_type(
                "Float",
                TypeKind::Value,
                8,
                8,
                CallConv::ByValue,
                Lifetime::trivial(),
                Some(Box::new(|| "double".to_string())),
            )
            .expect("Float registration cannot fail on a fresh table");

        registry
            .register_type(
                "String",
                TypeKind::Complex,
                std::mem::size_of::<DexString>() as u32,
                std::mem::align_of::<DexString>() as u32,
                CallConv::ByPointer,
                Lifetime {
                    destructor: Some(NativeFn { symbol: "dex_string_destructor".into(), entry: dex_string_destructor }),
                    copy_ctor: Some(NativeFn { symbol: "dex_string_copy_ctor".into(), entry: dex_string_copy_ctor }),
                    move_ctor: Some(NativeFn { symbol: "dex_string_move_ctor".into(), entry: dex_string_move_ctor }),
                    default_ctor: DefaultConstruct::Call(NativeFn {
                        symbol: "dex_string_default_ctor".into(),
                        entry: dex_string_default_ctor,
                    }),
                },
                Some(Box::new(|| "{ i8*, i64, i64 }".to_string())),
            )
            .expect("String registration cannot fail on a fresh table");
    }

    fn register_functions(&self, registry: &mut Registry) {
        let bool_ty = registry.types.lookup("Bool").expect("Bool registered in register_types");
        let int_ty = registry.types.lookup("Integer").expect("Integer registered in register_types");
        let float_ty = registry.types.lookup("Float").expect("Float registered in register_types");
        let string_ty = registry.types.lookup("String").expect("String registered in register_types");

        register_int_ops(registry, int_ty, bool_ty);
        register_float_ops(registry, float_ty, bool_ty);
        register_bool_ops(registry, bool_ty);
        register_string_ops(registry, string_ty, int_ty);
    }
}

fn p(ty: TypeId) -> Param {
    Param { ty, variadic: false }
}

#[allow(clippy::too_many_arguments)]
fn reg(
    registry: &mut Registry,
    name: &str,
    ret: TypeId,
    params: Vec<Param>,
    entry: *const (),
    wrapper: WrapperFn,
    intrinsic: Option<IntrinsicEmitter>,
) {
    registry
        .register_function(name, ret, params, entry, wrapper, intrinsic, true)
        .unwrap_or_else(|e| panic!("builtin registration failed: {e}"));
}

fn register_int_ops(registry: &mut Registry, int_ty: TypeId, bool_ty: TypeId) {
    let ii = vec![p(int_ty), p(int_ty)];
    reg(registry, "operator_add", int_ty, ii.clone(), dex_int_add as *const (), wrapper_int_binop, Some(intrinsic_int_add));
    reg(registry, "operator_sub", int_ty, ii.clone(), dex_int_sub as *const (), wrapper_int_binop, Some(intrinsic_int_sub));
    reg(registry, "operator_mul", int_ty, ii.clone(), dex_int_mul as *const (), wrapper_int_binop, Some(intrinsic_int_mul));
    reg(registry, "operator_div", int_ty, ii.clone(), dex_int_div as *const (), wrapper_int_binop, Some(intrinsic_int_div));
    reg(registry, "operator_mod", int_ty, ii.clone(), dex_int_mod as *const (), wrapper_int_binop, Some(intrinsic_int_mod));
    reg(registry, "operator_bitand", int_ty, ii.clone(), dex_int_bitand as *const (), wrapper_int_binop, Some(intrinsic_int_bitand));
    reg(registry, "operator_bitor", int_ty, ii.clone(), dex_int_bitor as *const (), wrapper_int_binop, Some(intrinsic_int_bitor));
    reg(registry, "operator_bitxor", int_ty, ii.clone(), dex_int_bitxor as *const (), wrapper_int_binop, Some(intrinsic_int_bitxor));
    reg(registry, "operator_shl", int_ty, ii.clone(), dex_int_shl as *const (), wrapper_int_binop, Some(intrinsic_int_shl));
    reg(registry, "operator_shrs", int_ty, ii.clone(), dex_int_shrs as *const (), wrapper_int_binop, Some(intrinsic_int_shrs));
    reg(registry, "operator_shrz", int_ty, ii.clone(), dex_int_shrz as *const (), wrapper_int_binop, Some(intrinsic_int_shrz));
    reg(registry, "operator_uminus", int_ty, vec![p(int_ty)], dex_int_uminus as *const (), wrapper_int_unop, Some(intrinsic_int_uminus));

    reg(registry, "operator_eq", bool_ty, ii.clone(), dex_int_eq as *const (), wrapper_int_cmp, Some(intrinsic_int_eq));
    reg(registry, "operator_ne", bool_ty, ii.clone(), dex_int_ne as *const (), wrapper_int_cmp, Some(intrinsic_int_ne));
    reg(registry, "operator_lt", bool_ty, ii.clone(), dex_int_lt as *const (), wrapper_int_cmp, Some(intrinsic_int_lt));
    reg(registry, "operator_le", bool_ty, ii.clone(), dex_int_le as *const (), wrapper_int_cmp, Some(intrinsic_int_le));
    reg(registry, "operator_gt", bool_ty, ii.clone(), dex_int_gt as *const (), wrapper_int_cmp, Some(intrinsic_int_gt));
    reg(registry, "operator_ge", bool_ty, ii, dex_int_ge as *const (), wrapper_int_cmp, Some(intrinsic_int_ge));
}

fn register_float_ops(registry: &mut Registry, float_ty: TypeId, bool_ty: TypeId) {
    let ff = vec![p(float_ty), p(float_ty)];
    reg(registry, "operator_add", float_ty, ff.clone(), dex_float_add as *const (), wrapper_float_binop, Some(intrinsic_float_add));
    reg(registry, "operator_sub", float_ty, ff.clone(), dex_float_sub as *const (), wrapper_float_binop, Some(intrinsic_float_sub));
    reg(registry, "operator_mul", float_ty, ff.clone(), dex_float_mul as *const (), wrapper_float_binop, Some(intrinsic_float_mul));
    reg(registry, "operator_div", float_ty, ff.clone(), dex_float_div as *const (), wrapper_float_binop, Some(intrinsic_float_div));
    reg(registry, "operator_mod", float_ty, ff.clone(), dex_float_mod as *const (), wrapper_float_binop, Some(intrinsic_float_mod));
    reg(registry, "operator_uminus", float_ty, vec![p(float_ty)], dex_float_uminus as *const (), wrapper_float_unop, Some(intrinsic_float_uminus));

    reg(registry, "operator_eq", bool_ty, ff.clone(), dex_float_eq as *const (), wrapper_float_cmp, Some(intrinsic_float_eq));
    reg(registry, "operator_ne", bool_ty, ff.clone(), dex_float_ne as *const (), wrapper_float_cmp, Some(intrinsic_float_ne));
    reg(registry, "operator_lt", bool_ty, ff.clone(), dex_float_lt as *const (), wrapper_float_cmp, Some(intrinsic_float_lt));
    reg(registry, "operator_le", bool_ty, ff.clone(), dex_float_le as *const (), wrapper_float_cmp, Some(intrinsic_float_le));
    reg(registry, "operator_gt", bool_ty, ff.clone(), dex_float_gt as *const (), wrapper_float_cmp, Some(intrinsic_float_gt));
    reg(registry, "operator_ge", bool_ty, ff, dex_float_ge as *const (), wrapper_float_cmp, Some(intrinsic_float_ge));
}

fn register_bool_ops(registry: &mut Registry, bool_ty: TypeId) {
    let bb = vec![p(bool_ty), p(bool_ty)];
    reg(registry, "operator_and", bool_ty, bb.clone(), dex_bool_and as *const (), wrapper_bool_binop, Some(intrinsic_bool_and));
    reg(registry, "operator_or", bool_ty, bb.clone(), dex_bool_or as *const (), wrapper_bool_binop, Some(intrinsic_bool_or));
    reg(registry, "operator_not", bool_ty, vec![p(bool_ty)], dex_bool_not as *const (), wrapper_bool_unop, Some(intrinsic_bool_not));
    reg(registry, "operator_eq", bool_ty, bb.clone(), dex_bool_eq as *const (), wrapper_bool_binop, Some(intrinsic_bool_eq));
    reg(registry, "operator_ne", bool_ty, bb, dex_bool_ne as *const (), wrapper_bool_binop, Some(intrinsic_bool_ne));
}

fn register_string_ops(registry: &mut Registry, string_ty: TypeId, int_ty: TypeId) {
    reg(
        registry,
        "substr",
        string_ty,
        vec![p(string_ty), p(int_ty), p(int_ty)],
        dex_substr as *const (),
        wrapper_substr,
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::register_all;
    use crate::types::TypeTable;
    use crate::functions::FunctionLibrary;

    fn build() -> (TypeTable, FunctionLibrary) {
        let mut types = TypeTable::new();
        let mut functions = FunctionLibrary::new();
        let builtin = BuiltinModule;
        register_all(&mut types, &mut functions, &[&builtin as &dyn Module]);
        (types, functions)
    }

    #[test]
    fn registers_all_four_value_types() {
        let (types, _functions) = build();
        for name in ["Bool", "Integer", "Float", "String"] {
            assert!(types.lookup(name).is_some(), "missing type {name}");
        }
    }

    #[test]
    fn integer_add_overload_resolves() {
        let (types, functions) = build();
        let int_ty = types.lookup("Integer").unwrap();
        let id = functions.resolve("operator_add", &[int_ty, int_ty], &types).unwrap();
        assert_eq!(functions.get(id).return_type, int_ty);
    }

    #[test]
    fn wrapper_int_binop_matches_native_entry() {
        let mut out: i64 = 0;
        let mut a: i64 = 3;
        let mut b: i64 = 4;
        let mut args: [*mut u8; 3] = [
            &mut out as *mut i64 as *mut u8,
            &mut a as *mut i64 as *mut u8,
            &mut b as *mut i64 as *mut u8,
        ];
        wrapper_int_binop(dex_int_add as *const (), args.as_mut_ptr());
        assert_eq!(out, 7);
    }

    #[test]
    fn substr_clamps_out_of_range_to_empty() {
        let s = "Hello World!".to_string();
        let mut dex = DexString { ptr: std::ptr::null_mut(), len: 0, cap: 0 };
        unsafe { write_owned_bytes(&mut dex as *mut DexString as *mut u8, s.as_bytes()) };

        let mut out = DexString { ptr: std::ptr::null_mut(), len: 0, cap: 0 };
        dex_substr(&mut out as *mut DexString as *mut u8, &dex as *const DexString as *const u8, 6, 5);
        let result = unsafe { dex_string_as_str(&out as *const DexString as *const u8) };
        assert_eq!(result, "World");

        dex_string_destructor(&mut dex as *mut DexString as *mut u8);
        dex_string_destructor(&mut out as *mut DexString as *mut u8);
    }
}
