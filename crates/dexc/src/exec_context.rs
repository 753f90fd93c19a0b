//! Runtime execution contexts: the packed tail storage every compiled
//! declaration indexes into, plus the allocate/init/destroy lifecycle
//! around it.
//!
//! The header carries nothing but the two cached function pointers and
//! the tail size; every slot's state lives in the tail, at the offsets
//! `codegen::layout` computed.

use std::alloc::{alloc, dealloc, Layout};
use std::fmt;

use crate::backend::{BackendError, CompiledProgram};
use crate::codegen::ContextLayout;

type InitFn = unsafe extern "C" fn(*mut u8);
type DestructFn = unsafe extern "C" fn(*mut u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecContextError(pub String);

impl fmt::Display for ExecContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for ExecContextError {}

impl From<BackendError> for ExecContextError {
    fn from(e: BackendError) -> Self {
        ExecContextError(e.0)
    }
}

const HEADER_ALIGN: usize = std::mem::align_of::<usize>();

struct Header {
    init: InitFn,
    destruct: DestructFn,
    tail_size: u32,
}

/// One allocation: a small header followed immediately by the tail
/// storage every declaration entry point receives as its `context*`.
///
/// Every registered default constructor in this compiler is infallible
/// (`ZeroInit`, `Skip`, or a native callback that cannot fail), so the
/// high-water-mark unwind `__init_rctx` would otherwise need on a
/// partial failure never triggers in practice — there is no partial
/// state to tear down. This holds only as long as host modules keep
/// that invariant; a default constructor that can fail cannot
/// propagate the failure across the JIT boundary (an `extern "C"` panic
/// there aborts the process rather than unwinding), so it is a
/// documented constraint on host modules, not something this type
/// detects at runtime.
pub struct ExecutionContext<'p> {
    program: &'p CompiledProgram,
    destruct: DestructFn,
    tail_size: u32,
    /// The alignment `new` actually allocated with — `(layout.tail_align as
    /// usize).max(HEADER_ALIGN)`. `as_ptr`/`drop` must reuse this exact
    /// value rather than recomputing from `HEADER_ALIGN` alone: a type
    /// needing more than pointer alignment shifts the tail offset, and
    /// `dealloc` requires the same `Layout` it was allocated with.
    align: usize,
    ptr: *mut u8,
}

impl<'p> ExecutionContext<'p> {
    /// Allocate a fresh context against `program`/`layout` and run init.
    pub fn new(program: &'p CompiledProgram, layout: &ContextLayout) -> Result<Self, ExecContextError> {
        let header = Header {
            init: lookup_init(program)?,
            destruct: lookup_destruct(program)?,
            tail_size: layout.tail_size,
        };

        let header_size = std::mem::size_of::<Header>();
        let align = (layout.tail_align as usize).max(HEADER_ALIGN);
        let total = round_up(header_size, align) + layout.tail_size as usize;
        let alloc_layout = Layout::from_size_align(total, align)
            .map_err(|e| ExecContextError(format!("invalid context layout: {e}")))?;

        // SAFETY: `alloc_layout` has non-zero size (a header always exists).
        let ptr = unsafe { alloc(alloc_layout) };
        if ptr.is_null() {
            return Err(ExecContextError("allocation failure".to_string()));
        }

        let tail_offset = round_up(header_size, align);
        let tail_ptr = unsafe { ptr.add(tail_offset) };
        // SAFETY: `header.init` is the JIT-linked `__init_rctx`, which
        // default-constructs every slot in `tail_ptr`'s `layout.tail_size`
        // bytes; the allocation above reserves exactly that much room.
        unsafe { (header.init)(tail_ptr) };

        Ok(ExecutionContext { program, destruct: header.destruct, tail_size: header.tail_size, align, ptr })
    }

    /// Pointer to the tail storage, as every declaration entry point
    /// expects for its `context*` parameter.
    pub fn as_ptr(&self) -> *mut u8 {
        let header_size = std::mem::size_of::<Header>();
        unsafe { self.ptr.add(round_up(header_size, self.align)) }
    }

    pub fn program(&self) -> &'p CompiledProgram {
        self.program
    }
}

impl Drop for ExecutionContext<'_> {
    fn drop(&mut self) {
        let tail_ptr = self.as_ptr();
        // SAFETY: the tail was fully constructed in `new` and nothing
        // else holds a live reference into it at drop time.
        unsafe { (self.destruct)(tail_ptr) };

        let header_size = std::mem::size_of::<Header>();
        let total = round_up(header_size, self.align) + self.tail_size as usize;
        let layout = Layout::from_size_align(total, self.align).expect("layout was valid at construction");
        unsafe { dealloc(self.ptr, layout) };
    }
}

fn lookup_init(program: &CompiledProgram) -> Result<InitFn, ExecContextError> {
    let addr = program.lookup("__init_rctx")?;
    // SAFETY: the generated module always defines `__init_rctx` with this
    // exact signature (`codegen::expr::emit_init_rctx`).
    Ok(unsafe { std::mem::transmute::<usize, InitFn>(addr) })
}

fn lookup_destruct(program: &CompiledProgram) -> Result<DestructFn, ExecContextError> {
    let addr = program.lookup("__destruct_rctx")?;
    // SAFETY: the generated module always defines `__destruct_rctx` with
    // this exact signature (`codegen::expr::emit_destruct_rctx`).
    Ok(unsafe { std::mem::transmute::<usize, DestructFn>(addr) })
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}
