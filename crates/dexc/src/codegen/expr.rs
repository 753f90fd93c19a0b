//! Per-declaration IR body emission: lowers one definition's initializer
//! into textual LLVM IR, inserting destructor calls for complex
//! temporaries via the unwind planner as it goes.

use dex_core::Literal;

use crate::ast::{DeclKind, Node, NodeKind, Slot};
use crate::codegen::unwind::{Scope, UnwindPlanner};
use crate::codegen::{CodeGenError, ContextLayout};
use crate::fold::ConstantStore;
use crate::functions::{FuncId, FunctionDescriptor, FunctionLibrary};
use crate::types::{DefaultConstruct, TypeId, TypeTable};

/// A lowered expression result: either an SSA value of its own IR type
/// (`is_ptr == false`) or a pointer to storage of that type (`is_ptr ==
/// true`, `ByPointer`/`Complex` results). `owned` is only meaningful for
/// pointers: whether this emitter allocated the storage itself (so it
/// must eventually be destroyed or moved) versus borrowing a slot/global
/// it does not own.
#[derive(Debug, Clone)]
pub struct Value {
    pub text: String,
    pub ty: TypeId,
    pub is_ptr: bool,
    pub owned: bool,
    ir_override: Option<String>,
}

impl Value {
    pub fn by_value(text: impl Into<String>, ty: TypeId) -> Self {
        Value { text: text.into(), ty, is_ptr: false, owned: false, ir_override: None }
    }

    pub fn by_pointer(text: impl Into<String>, ty: TypeId, owned: bool) -> Self {
        Value { text: text.into(), ty, is_ptr: true, owned, ir_override: None }
    }

    /// Like `by_pointer`, but the pointee's IR type does not match `ty`'s
    /// registered lowering (used for the synthetic `VarArg` header).
    pub fn by_pointer_as(text: impl Into<String>, ty: TypeId, owned: bool, ir_type: impl Into<String>) -> Self {
        Value { text: text.into(), ty, is_ptr: true, owned, ir_override: Some(ir_type.into()) }
    }

    fn base_ir_type(&self, types: &TypeTable) -> String {
        self.ir_override.clone().unwrap_or_else(|| types.ir_type(self.ty))
    }
}

/// The state an [`crate::functions::IntrinsicEmitter`] is handed: the
/// already-lowered arguments and a place to append IR lines and name the
/// result. Deliberately lifetime-free (everything owned) so it stays
/// compatible with the bare `fn` pointer type intrinsics are stored as.
pub struct IntrinsicCtx {
    args: Vec<Value>,
    lines: Vec<String>,
    temp_seed: u32,
    result: Option<Value>,
}

impl IntrinsicCtx {
    fn new(args: Vec<Value>, temp_seed: u32) -> Self {
        IntrinsicCtx { args, lines: Vec::new(), temp_seed, result: None }
    }

    pub fn arg(&self, index: usize) -> &Value {
        &self.args[index]
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn fresh_temp(&mut self) -> String {
        self.temp_seed += 1;
        format!("%t{}", self.temp_seed)
    }

    pub fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn set_result(&mut self, value: Value) {
        self.result = Some(value);
    }
}

/// Drives IR-text emission for a single declaration's body.
struct Emitter<'e> {
    layout: &'e ContextLayout,
    types: &'e TypeTable,
    functions: &'e FunctionLibrary,
    constants: &'e ConstantStore,
    use_intrinsics: bool,
    temp_seed: u32,
    label_seed: u32,
    current_block: String,
    body: String,
    globals: String,
    unwind: UnwindPlanner,
}

impl<'e> Emitter<'e> {
    fn new(
        layout: &'e ContextLayout,
        types: &'e TypeTable,
        functions: &'e FunctionLibrary,
        constants: &'e ConstantStore,
        use_intrinsics: bool,
    ) -> Self {
        Emitter {
            layout,
            types,
            functions,
            constants,
            use_intrinsics,
            temp_seed: 0,
            label_seed: 0,
            current_block: "entry".to_string(),
            body: String::new(),
            globals: String::new(),
            unwind: UnwindPlanner::new(),
        }
    }

    fn fresh_temp(&mut self) -> String {
        self.temp_seed += 1;
        format!("%t{}", self.temp_seed)
    }

    fn fresh_label_id(&mut self) -> u32 {
        self.label_seed += 1;
        self.label_seed
    }

    fn emit_line(&mut self, line: &str) {
        self.body.push_str("  ");
        self.body.push_str(line);
        self.body.push('\n');
    }

    fn emit_label(&mut self, label: &str) {
        self.body.push_str(label);
        self.body.push_str(":\n");
        self.current_block = label.to_string();
    }

    fn arg_fragment(&self, v: &Value) -> String {
        let base = v.base_ir_type(self.types);
        if v.is_ptr {
            format!("{base}* {}", v.text)
        } else {
            format!("{base} {}", v.text)
        }
    }

    fn arg_type_only(&self, v: &Value) -> String {
        let base = v.base_ir_type(self.types);
        if v.is_ptr { format!("{base}*") } else { base }
    }

    /// Every external symbol this function's body calls must also be
    /// declared in the module; textual IR doesn't infer signatures from
    /// call sites the way the in-memory builder would.
    fn declare_void(&mut self, symbol: &str, params: &[String]) {
        self.globals.push_str(&format!("declare void @{symbol}({})\n", params.join(", ")));
    }

    /// Computes a declaration's storage pointer as `ctx base + offset`,
    /// bit-cast to its type.
    fn slot_ptr(&mut self, name: &str, ty: TypeId) -> String {
        let offset = self
            .layout
            .offset_of(name)
            .unwrap_or_else(|| panic!("identifier '{name}' does not name a context slot"));
        let ir_ty = self.types.ir_type(ty);
        let raw = self.fresh_temp();
        self.emit_line(&format!("{raw} = getelementptr i8, i8* %ctx, i64 {offset}"));
        let ptr = self.fresh_temp();
        self.emit_line(&format!("{ptr} = bitcast i8* {raw} to {ir_ty}*"));
        ptr
    }

    fn emit_expr(&mut self, node: &Node<'_>) -> Value {
        let ty = node.result_type.get();
        match &node.kind {
            NodeKind::Literal(lit) => self.emit_literal(node, lit, ty),
            NodeKind::Identifier { name, .. } => self.emit_identifier(name, ty),
            NodeKind::Binary { lhs, rhs, descriptor, .. } => {
                let lv = self.emit_expr(lhs.get());
                let rv = self.emit_expr(rhs.get());
                let id = descriptor.get().expect("binary node lowered before inference ran");
                self.emit_call(id, vec![lv, rv])
            }
            NodeKind::Unary { operand, descriptor, .. } => {
                let v = self.emit_expr(operand.get());
                let id = descriptor.get().expect("unary node lowered before inference ran");
                self.emit_call(id, vec![v])
            }
            NodeKind::Call { args, descriptor, .. } => {
                let vals: Vec<Value> = args.iter().map(|a| self.emit_expr(a.get())).collect();
                let id = descriptor.get().expect("call node lowered before inference ran");
                self.emit_call(id, vals)
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                self.emit_if(cond, then_branch, else_branch)
            }
            NodeKind::VarArg { elem_type, elements } => self.emit_vararg(*elem_type, elements),
            NodeKind::ConstRef { name } => self.emit_const_ref(name, ty),
            NodeKind::Definition { .. } => {
                panic!("a definition node cannot appear inside an expression")
            }
        }
    }

    fn emit_literal(&mut self, node: &Node<'_>, lit: &Literal<'_>, ty: TypeId) -> Value {
        match lit {
            Literal::Bool(b) => Value::by_value(if *b { "true" } else { "false" }, ty),
            Literal::Int64(i) => Value::by_value(i.to_string(), ty),
            Literal::Float64(f) => Value::by_value(format!("{:?}", f), ty),
            Literal::StringRef(s) => self.emit_string_literal(node, s, ty),
        }
    }

    fn emit_string_literal(&mut self, node: &Node<'_>, s: &str, ty: TypeId) -> Value {
        let line = node.span.begin.line;
        let col = node.span.begin.column;
        let (escaped, byte_len) = escape_c_string(s);
        let array_len = byte_len + 1;
        let global = format!("@strLit_l{line}_c{col}");
        self.globals.push_str(&format!(
            "{global} = private unnamed_addr constant [{array_len} x i8] c\"{escaped}\"\n"
        ));

        let ir_ty = self.types.ir_type(ty);
        self.declare_void("dex_string_from_static", &["i8*".to_string(), "i64".to_string(), format!("{ir_ty}*")]);
        let temp = self.fresh_temp();
        self.emit_line(&format!("{temp} = alloca {ir_ty}"));
        let decayed = self.fresh_temp();
        self.emit_line(&format!(
            "{decayed} = getelementptr [{array_len} x i8], [{array_len} x i8]* {global}, i64 0, i64 0"
        ));
        self.emit_line(&format!(
            "call void @dex_string_from_static(i8* {decayed}, i64 {byte_len}, {ir_ty}* {temp})"
        ));

        let dtor_sym = self
            .types
            .get(ty)
            .lifetime
            .destructor
            .as_ref()
            .map(|d| d.symbol.clone())
            .unwrap_or_default();
        self.unwind.record_temp(dtor_sym, temp.clone(), ir_ty);
        Value::by_pointer(temp, ty, true)
    }

    fn emit_identifier(&mut self, name: &str, ty: TypeId) -> Value {
        let ptr = self.slot_ptr(name, ty);
        if self.types.is_complex(ty) {
            Value::by_pointer(ptr, ty, false)
        } else {
            let ir_ty = self.types.ir_type(ty);
            let val = self.fresh_temp();
            self.emit_line(&format!("{val} = load {ir_ty}, {ir_ty}* {ptr}"));
            Value::by_value(val, ty)
        }
    }

    fn emit_const_ref(&mut self, name: &str, ty: TypeId) -> Value {
        if self.types.is_complex(ty) {
            Value::by_pointer(format!("@{name}"), ty, false)
        } else {
            let ir_ty = self.types.ir_type(ty);
            let val = self.fresh_temp();
            self.emit_line(&format!("{val} = load {ir_ty}, {ir_ty}* @{name}"));
            Value::by_value(val, ty)
        }
    }

    /// Lowers a call: inline via the descriptor's intrinsic emitter when
    /// enabled and present, otherwise an external call through the
    /// always-out-parameter return convention.
    fn emit_call(&mut self, id: FuncId, args: Vec<Value>) -> Value {
        let desc = self.functions.get(id).clone();
        if self.use_intrinsics {
            if let Some(v) = self.try_emit_intrinsic(&desc, &args) {
                return v;
            }
        }
        self.emit_external_call(&desc, &args)
    }

    fn try_emit_intrinsic(&mut self, desc: &FunctionDescriptor, args: &[Value]) -> Option<Value> {
        let emitter_fn = desc.intrinsic?;
        let mut ctx = IntrinsicCtx::new(args.to_vec(), self.temp_seed);
        emitter_fn(&mut ctx).ok()?;
        self.temp_seed = ctx.temp_seed;
        for line in &ctx.lines {
            self.emit_line(line);
        }
        // The emitter only knows the IR it wrote, not the descriptor it was
        // invoked for; stamp the declared return type here so downstream
        // `base_ir_type` lookups (e.g. an `if` join over two intrinsic
        // results) see the real type rather than whatever the emitter
        // happened to tag its `Value` with.
        ctx.result.map(|mut v| {
            v.ty = desc.return_type;
            v
        })
    }

    fn emit_external_call(&mut self, desc: &FunctionDescriptor, args: &[Value]) -> Value {
        let ret_ty = self.types.ir_type(desc.return_type);
        let mut params = vec![format!("{ret_ty}*")];
        params.extend(args.iter().map(|a| self.arg_type_only(a)));
        self.declare_void(&desc.symbol, &params);

        let ret_slot = self.fresh_temp();
        self.emit_line(&format!("{ret_slot} = alloca {ret_ty}"));

        let mut call = format!("call void @{}({ret_ty}* {ret_slot}", desc.symbol);
        for a in args {
            call.push_str(", ");
            call.push_str(&self.arg_fragment(a));
        }
        call.push(')');
        self.emit_line(&call);

        if self.types.is_complex(desc.return_type) {
            let dtor_sym = self
                .types
                .get(desc.return_type)
                .lifetime
                .destructor
                .as_ref()
                .map(|d| d.symbol.clone())
                .unwrap_or_default();
            self.unwind.record_temp(dtor_sym, ret_slot.clone(), ret_ty);
            Value::by_pointer(ret_slot, desc.return_type, true)
        } else {
            let val = self.fresh_temp();
            self.emit_line(&format!("{val} = load {ret_ty}, {ret_ty}* {ret_slot}"));
            Value::by_value(val, desc.return_type)
        }
    }

    /// Copies a borrowed `Complex` pointer into a fresh, owned temporary.
    /// Forces every value a conditional branch forwards to the join point
    /// to be a disposable temp, never an alias into a declaration's own
    /// permanent storage.
    fn ensure_owned_complex(&mut self, v: Value) -> Value {
        if !v.is_ptr || v.owned {
            return v;
        }
        let ir_ty = self.types.ir_type(v.ty);
        let temp = self.fresh_temp();
        self.emit_line(&format!("{temp} = alloca {ir_ty}"));
        let copy_sym = self
            .types
            .get(v.ty)
            .lifetime
            .copy_ctor
            .as_ref()
            .map(|c| c.symbol.clone())
            .unwrap_or_default();
        self.declare_void(&copy_sym, &["i8*".to_string(), "i8*".to_string()]);
        let dst = self.fresh_temp();
        let src = self.fresh_temp();
        self.emit_line(&format!("{dst} = bitcast {ir_ty}* {temp} to i8*"));
        self.emit_line(&format!("{src} = bitcast {ir_ty}* {} to i8*", v.text));
        self.emit_line(&format!("call void @{copy_sym}(i8* {dst}, i8* {src})"));

        let dtor_sym = self
            .types
            .get(v.ty)
            .lifetime
            .destructor
            .as_ref()
            .map(|d| d.symbol.clone())
            .unwrap_or_default();
        self.unwind.record_temp(dtor_sym, temp.clone(), ir_ty);
        Value::by_pointer(temp, v.ty, true)
    }

    fn emit_if(&mut self, cond: &Slot<'_>, then_branch: &Slot<'_>, else_branch: &Slot<'_>) -> Value {
        let cv = self.emit_expr(cond.get());
        let id = self.fresh_label_id();
        let then_label = format!("if.then.{id}");
        let else_label = format!("if.else.{id}");
        let join_label = format!("if.join.{id}");
        let flag_then = format!("%if.flag.then.{id}");
        let flag_else = format!("%if.flag.else.{id}");

        self.emit_line(&format!("{flag_then} = alloca i1"));
        self.emit_line(&format!("{flag_else} = alloca i1"));
        self.emit_line(&format!("store i1 false, i1* {flag_then}"));
        self.emit_line(&format!("store i1 false, i1* {flag_else}"));
        self.emit_line(&format!("br i1 {}, label %{then_label}, label %{else_label}", cv.text));

        self.emit_label(&then_label);
        self.emit_line(&format!("store i1 true, i1* {flag_then}"));
        self.unwind.push_scope();
        let then_val = self.emit_expr(then_branch.get());
        let then_val = self.ensure_owned_complex(then_val);
        let then_scope = self.unwind.pop_scope();
        let then_forward = then_val.is_ptr.then(|| then_val.text.clone());
        let then_pred = self.current_block.clone();
        self.emit_line(&format!("br label %{join_label}"));

        self.emit_label(&else_label);
        self.emit_line(&format!("store i1 true, i1* {flag_else}"));
        self.unwind.push_scope();
        let else_val = self.emit_expr(else_branch.get());
        let else_val = self.ensure_owned_complex(else_val);
        let else_scope = self.unwind.pop_scope();
        let else_forward = else_val.is_ptr.then(|| else_val.text.clone());
        let else_pred = self.current_block.clone();
        self.emit_line(&format!("br label %{join_label}"));

        self.emit_label(&join_label);
        let result = self.join_values(&then_val, &then_pred, &else_val, &else_pred);

        self.emit_unwind_cascade(&flag_then, &then_scope, then_forward.as_deref(), id, "then");
        self.emit_unwind_cascade(&flag_else, &else_scope, else_forward.as_deref(), id, "else");

        if result.is_ptr {
            let dtor_sym = self
                .types
                .get(result.ty)
                .lifetime
                .destructor
                .as_ref()
                .map(|d| d.symbol.clone())
                .unwrap_or_default();
            self.unwind.record_temp(dtor_sym, result.text.clone(), result.base_ir_type(self.types));
        }
        result
    }

    fn join_values(&mut self, then_val: &Value, then_pred: &str, else_val: &Value, else_pred: &str) -> Value {
        let base = then_val.base_ir_type(self.types);
        let temp = self.fresh_temp();
        if then_val.is_ptr {
            self.emit_line(&format!(
                "{temp} = phi {base}* [ {}, %{then_pred} ], [ {}, %{else_pred} ]",
                then_val.text, else_val.text
            ));
            Value::by_pointer(temp, then_val.ty, true)
        } else {
            self.emit_line(&format!(
                "{temp} = phi {base} [ {}, %{then_pred} ], [ {}, %{else_pred} ]",
                then_val.text, else_val.text
            ));
            Value::by_value(temp, then_val.ty)
        }
    }

    /// Emits the post-dominating unwind chain for one branch's scope: a
    /// check that the branch actually ran, then its destructors in
    /// reverse order, skipping the one forwarded out as the join result.
    /// A scope with nothing constructed contributes no blocks at all.
    fn emit_unwind_cascade(&mut self, flag: &str, scope: &Scope, skip_ptr: Option<&str>, id: u32, tag: &str) {
        if scope.is_empty() {
            return;
        }
        let check_label = format!("unwind.{tag}.check.{id}");
        let body_label = format!("unwind.{tag}.body.{id}");
        let skip_label = format!("unwind.{tag}.skip.{id}");

        self.emit_line(&format!("br label %{check_label}"));
        self.emit_label(&check_label);
        let flag_val = self.fresh_temp();
        self.emit_line(&format!("{flag_val} = load i1, i1* {flag}"));
        self.emit_line(&format!("br i1 {flag_val}, label %{body_label}, label %{skip_label}"));

        self.emit_label(&body_label);
        for temp in scope.temps_reverse() {
            if Some(temp.ptr.as_str()) == skip_ptr {
                continue;
            }
            self.declare_void(&temp.dtor_symbol, &["i8*".to_string()]);
            let cast = self.fresh_temp();
            self.emit_line(&format!("{cast} = bitcast {}* {} to i8*", temp.ir_type, temp.ptr));
            self.emit_line(&format!("call void @{}(i8* {cast})", temp.dtor_symbol));
        }
        self.emit_line(&format!("br label %{skip_label}"));
        self.emit_label(&skip_label);
    }

    fn emit_vararg(&mut self, elem_type: TypeId, elements: &[Slot<'_>]) -> Value {
        let elem_ir = self.types.ir_type(elem_type);
        let count = elements.len();
        let array_ty = format!("[{count} x {elem_ir}]");
        let array_temp = self.fresh_temp();
        self.emit_line(&format!("{array_temp} = alloca {array_ty}"));

        for (i, e) in elements.iter().enumerate() {
            let v = self.emit_expr(e.get());
            let slot = self.fresh_temp();
            self.emit_line(&format!(
                "{slot} = getelementptr {array_ty}, {array_ty}* {array_temp}, i64 0, i64 {i}"
            ));
            if v.is_ptr {
                let copy_sym = self
                    .types
                    .get(elem_type)
                    .lifetime
                    .copy_ctor
                    .as_ref()
                    .map(|c| c.symbol.clone())
                    .unwrap_or_default();
                self.declare_void(&copy_sym, &["i8*".to_string(), "i8*".to_string()]);
                let dst = self.fresh_temp();
                let src = self.fresh_temp();
                self.emit_line(&format!("{dst} = bitcast {elem_ir}* {slot} to i8*"));
                self.emit_line(&format!("{src} = bitcast {elem_ir}* {} to i8*", v.text));
                self.emit_line(&format!("call void @{copy_sym}(i8* {dst}, i8* {src})"));
            } else {
                self.emit_line(&format!("store {elem_ir} {}, {elem_ir}* {slot}", v.text));
            }
        }

        let header_ty = format!("{{ {elem_ir}*, i64 }}");
        let header_temp = self.fresh_temp();
        self.emit_line(&format!("{header_temp} = alloca {header_ty}"));
        let ptr_field = self.fresh_temp();
        self.emit_line(&format!(
            "{ptr_field} = getelementptr {header_ty}, {header_ty}* {header_temp}, i32 0, i32 0"
        ));
        let decayed = self.fresh_temp();
        self.emit_line(&format!(
            "{decayed} = getelementptr {array_ty}, {array_ty}* {array_temp}, i64 0, i64 0"
        ));
        self.emit_line(&format!("store {elem_ir}* {decayed}, {elem_ir}** {ptr_field}"));
        let count_field = self.fresh_temp();
        self.emit_line(&format!(
            "{count_field} = getelementptr {header_ty}, {header_ty}* {header_temp}, i32 0, i32 1"
        ));
        self.emit_line(&format!("store i64 {count}, i64* {count_field}"));

        Value::by_pointer_as(header_temp, elem_type, true, header_ty)
    }
}

fn escape_c_string(s: &str) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut out = String::new();
    for b in bytes {
        match b {
            b'"' => out.push_str("\\22"),
            b'\\' => out.push_str("\\5C"),
            0x20..=0x7e => out.push(*b as char),
            _ => out.push_str(&format!("\\{:02X}", b)),
        }
    }
    out.push_str("\\00");
    (out, bytes.len())
}

/// Emits one declaration's entry point: `T* NAME(context*)` for `const`/
/// `expr`, or `void NAME(context*, T*)` for an uninitialized `var`.
/// Returns the emitted symbol name.
#[allow(clippy::too_many_arguments)]
pub fn emit_declaration(
    body: &mut String,
    globals: &mut String,
    name: &str,
    decl_kind: DeclKind,
    declared_type: TypeId,
    initializer: Option<&Slot<'_>>,
    layout: &ContextLayout,
    types: &TypeTable,
    functions: &FunctionLibrary,
    constants: &ConstantStore,
    use_intrinsics: bool,
) -> Result<String, CodeGenError> {
    let ir_ty = types.ir_type(declared_type);
    let offset = layout
        .offset_of(name)
        .ok_or_else(|| CodeGenError(format!("declaration '{name}' missing from context layout")))?;

    if decl_kind == DeclKind::Var {
        return emit_var_setter(body, globals, name, declared_type, &ir_ty, offset, types);
    }

    let init = initializer
        .ok_or_else(|| CodeGenError(format!("declaration '{name}' is missing its initializer")))?;

    let mut emitter = Emitter::new(layout, types, functions, constants, use_intrinsics);
    let result = emitter.emit_expr(init.get());

    emitter.emit_line(&format!("%raw = getelementptr i8, i8* %ctx, i64 {offset}"));
    emitter.emit_line(&format!("%slot = bitcast i8* %raw to {ir_ty}*"));

    if types.is_complex(declared_type) {
        emitter.unwind.disown(&result.text);
        let (verb, symbol) = if result.owned {
            ("move", types.get(declared_type).lifetime.move_ctor.as_ref().map(|m| m.symbol.clone()))
        } else {
            ("copy", types.get(declared_type).lifetime.copy_ctor.as_ref().map(|c| c.symbol.clone()))
        };
        let symbol = symbol.ok_or_else(|| {
            CodeGenError(format!(
                "type '{}' has no {verb} constructor to initialize '{name}'",
                types.name_of(declared_type)
            ))
        })?;
        emitter.declare_void(&symbol, &["i8*".to_string(), "i8*".to_string()]);
        emitter.emit_line(&format!("%sraw = bitcast {ir_ty}* %slot to i8*"));
        emitter.emit_line(&format!("%vraw = bitcast {ir_ty}* {} to i8*", result.text));
        emitter.emit_line(&format!("call void @{symbol}(i8* %sraw, i8* %vraw)"));
    } else {
        emitter.emit_line(&format!("store {ir_ty} {}, {ir_ty}* %slot", result.text));
    }

    let root_scope = emitter.unwind.finish_root();
    for temp in root_scope.temps_reverse() {
        emitter.declare_void(&temp.dtor_symbol, &["i8*".to_string()]);
        let cast = emitter.fresh_temp();
        emitter.emit_line(&format!("{cast} = bitcast {}* {} to i8*", temp.ir_type, temp.ptr));
        emitter.emit_line(&format!("call void @{}(i8* {cast})", temp.dtor_symbol));
    }
    emitter.emit_line(&format!("ret {ir_ty}* %slot"));

    body.push_str(&format!("define {ir_ty}* @{name}(i8* %ctx) {{\nentry:\n"));
    body.push_str(&emitter.body);
    body.push_str("}\n\n");
    globals.push_str(&emitter.globals);

    Ok(name.to_string())
}

fn emit_var_setter(
    body: &mut String,
    globals: &mut String,
    name: &str,
    declared_type: TypeId,
    ir_ty: &str,
    offset: u32,
    types: &TypeTable,
) -> Result<String, CodeGenError> {
    body.push_str(&format!("define void @{name}(i8* %ctx, {ir_ty}* %value) {{\nentry:\n"));
    body.push_str(&format!("  %raw = getelementptr i8, i8* %ctx, i64 {offset}\n"));
    body.push_str(&format!("  %slot = bitcast i8* %raw to {ir_ty}*\n"));

    if types.is_complex(declared_type) {
        let symbol = types
            .get(declared_type)
            .lifetime
            .move_ctor
            .as_ref()
            .map(|m| m.symbol.clone())
            .ok_or_else(|| {
                CodeGenError(format!(
                    "type '{}' has no move constructor for a var setter",
                    types.name_of(declared_type)
                ))
            })?;
        globals.push_str(&format!("declare void @{symbol}(i8*, i8*)\n"));
        body.push_str(&format!("  %sraw = bitcast {ir_ty}* %slot to i8*\n"));
        body.push_str(&format!("  %vraw = bitcast {ir_ty}* %value to i8*\n"));
        body.push_str(&format!("  call void @{symbol}(i8* %sraw, i8* %vraw)\n"));
    } else {
        body.push_str(&format!("  %v = load {ir_ty}, {ir_ty}* %value\n"));
        body.push_str(&format!("  store {ir_ty} %v, {ir_ty}* %slot\n"));
    }
    body.push_str("  ret void\n}\n\n");
    Ok(name.to_string())
}

/// `__init_rctx(context*)`: default-construct every slot in layout order.
pub fn emit_init_rctx(body: &mut String, globals: &mut String, layout: &ContextLayout, types: &TypeTable) {
    body.push_str("define void @__init_rctx(i8* %ctx) {\nentry:\n");
    for slot in &layout.slots {
        let ir_ty = types.ir_type(slot.ty);
        let info = types.get(slot.ty);
        body.push_str(&format!("  %raw.{0} = getelementptr i8, i8* %ctx, i64 {1}\n", slot.name, slot.offset));
        match &info.lifetime.default_ctor {
            DefaultConstruct::ZeroInit => {
                body.push_str(&format!("  %p.{0} = bitcast i8* %raw.{0} to {1}*\n", slot.name, ir_ty));
                body.push_str(&format!("  store {ir_ty} zeroinitializer, {ir_ty}* %p.{}\n", slot.name));
            }
            DefaultConstruct::Skip => {}
            DefaultConstruct::Call(native) => {
                globals.push_str(&format!("declare void @{}(i8*)\n", native.symbol));
                body.push_str(&format!("  call void @{}(i8* %raw.{})\n", native.symbol, slot.name));
            }
        }
    }
    body.push_str("  ret void\n}\n\n");
}

/// `__destruct_rctx(context*)`: destroy every `Complex` slot in reverse
/// layout order.
pub fn emit_destruct_rctx(body: &mut String, globals: &mut String, layout: &ContextLayout, types: &TypeTable) {
    body.push_str("define void @__destruct_rctx(i8* %ctx) {\nentry:\n");
    for slot in layout.slots.iter().rev() {
        let info = types.get(slot.ty);
        let Some(dtor) = &info.lifetime.destructor else { continue };
        globals.push_str(&format!("declare void @{}(i8*)\n", dtor.symbol));
        body.push_str(&format!("  %raw.{0} = getelementptr i8, i8* %ctx, i64 {1}\n", slot.name, slot.offset));
        body.push_str(&format!("  call void @{}(i8* %raw.{})\n", dtor.symbol, slot.name));
    }
    body.push_str("  ret void\n}\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CompileEnv;
    use crate::builtins::BuiltinModule;
    use crate::codegen::generate_module;
    use crate::fold::fold_program;
    use crate::registry::{register_all, Module};
    use crate::symbols::SymbolTable;

    fn compile_ir(src: &str) -> String {
        let mut types = TypeTable::new();
        let mut functions = FunctionLibrary::new();
        let builtin = BuiltinModule;
        register_all(&mut types, &mut functions, &[&builtin as &dyn Module]);
        let env = CompileEnv::new(types.unresolved());
        let mut symbols = SymbolTable::seeded(&types, &functions, types.unresolved());

        let parser = crate::parser::Parser::new(src, &env, &types, &functions, &mut symbols).unwrap();
        let (program, diags) = parser.parse().unwrap();
        assert!(diags.is_empty(), "unexpected parse diagnostics: {diags}");
        let infer_diags = crate::infer::infer_program(&env, &program, &types, &functions, &symbols);
        assert!(infer_diags.is_empty(), "unexpected inference diagnostics: {infer_diags}");

        // Not folding non-const initializers keeps the arithmetic/call
        // live so codegen actually emits it, rather than a ConstRef.
        let constants = fold_program(&env, &program, &types, &functions, false).unwrap();
        generate_module(&program, &types, &functions, &constants, false).unwrap().ir
    }

    #[test]
    fn integer_declaration_emits_external_call_store_and_ret() {
        let ir = compile_ir("expr a: Integer = 1 + 2;");
        assert!(ir.contains("call void @_operator_add_Integer_Integer"), "{ir}");
        assert!(ir.contains("store i64"), "{ir}");
        assert!(ir.contains("ret i64* %slot"), "{ir}");
    }

    #[test]
    fn string_temporary_gets_one_destructor_call() {
        let ir = compile_ir(r#"expr a: String = substr("x", 0, 1);"#);
        let count = ir.matches("call void @dex_string_destructor").count();
        // One destructor call for the `"x"` literal's temporary; the
        // `substr` call's own result is moved into the slot and disowned,
        // so it is never separately destroyed.
        assert_eq!(count, 1, "{ir}");
    }
}
