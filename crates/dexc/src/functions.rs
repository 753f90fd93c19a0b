//! The function library: overload sets keyed by name, with greedy-variadic
//! matching and deterministic link-name mangling.

use crate::types::{TypeId, TypeTable};
use std::fmt;

/// A single formal parameter.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub ty: TypeId,
    pub variadic: bool,
}

/// Flag bits on a descriptor. Currently only purity is tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    pub pure_: bool,
}

/// Inline code-generation hook: given the IR builder state and the already
///-lowered argument values, emits the operation inline instead of a call.
/// Defined generically over the codegen module's expression-emission
/// context to avoid a dependency cycle between `functions.rs` and
/// `codegen/`; see `codegen::expr::IntrinsicCtx`.
pub type IntrinsicEmitter = fn(&mut crate::codegen::expr::IntrinsicCtx) -> Result<(), String>;

/// Type-erased call: `args[0]` is the return slot, `args[1..]` are argument
/// pointers (ByPointer types) or pointers-to-values (ByValue types) — the
/// host integration ABI.
pub type WrapperFn = extern "C" fn(entry: *const (), args: *mut *mut u8);

#[derive(Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub symbol: String,
    pub params: Vec<Param>,
    pub return_type: TypeId,
    pub entry: *const (),
    pub wrapper: WrapperFn,
    pub intrinsic: Option<IntrinsicEmitter>,
    pub flags: FunctionFlags,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("symbol", &self.symbol)
            .field("params", &self.params.len())
            .field("pure", &self.flags.pure_)
            .field("has_intrinsic", &self.intrinsic.is_some())
            .finish()
    }
}

impl FunctionDescriptor {
    pub fn is_pure(&self) -> bool {
        self.flags.pure_
    }

    pub fn has_variadic_tail(&self) -> bool {
        matches!(self.params.last(), Some(p) if p.variadic)
    }

    /// Whether this descriptor's parameter pattern matches `arg_types`
    /// under the greedy-variadic rule.
    fn matches(&self, arg_types: &[TypeId]) -> bool {
        if self.has_variadic_tail() {
            let fixed = &self.params[..self.params.len() - 1];
            let tail = self.params.last().unwrap();
            if arg_types.len() < fixed.len() + 1 {
                return false;
            }
            if !fixed
                .iter()
                .zip(arg_types.iter())
                .all(|(p, a)| p.ty == *a)
            {
                return false;
            }
            arg_types[fixed.len()..].iter().all(|a| *a == tail.ty)
        } else {
            if self.params.len() != arg_types.len() {
                return false;
            }
            self.params
                .iter()
                .zip(arg_types.iter())
                .all(|(p, a)| p.ty == *a)
        }
    }
}

/// Deterministic mangled link name.
pub fn mangle_name(name: &str, params: &[Param], types: &TypeTable) -> String {
    let mut out = format!("_{name}");
    for p in params {
        if p.variadic {
            out.push_str("_vararg_");
        } else {
            out.push('_');
        }
        out.push_str(types.name_of(p.ty));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadError(pub String);

impl fmt::Display for OverloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for OverloadError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationError(pub String);
impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for RegistrationError {}

/// Stable index of a resolved descriptor, cached on the call-site AST node
/// so codegen doesn't need to re-run overload resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(usize);

/// Stores overloads keyed by name; performs signature matching including
/// variadic tails.
#[derive(Default)]
pub struct FunctionLibrary {
    descriptors: Vec<FunctionDescriptor>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        FunctionLibrary::default()
    }

    pub fn register(&mut self, desc: FunctionDescriptor) -> Result<(), RegistrationError> {
        let dup = self.descriptors.iter().any(|d| {
            d.name == desc.name
                && d.params.len() == desc.params.len()
                && d.params.iter().zip(desc.params.iter()).all(|(a, b)| {
                    a.ty == b.ty && a.variadic == b.variadic
                })
        });
        if dup {
            return Err(RegistrationError(format!(
                "duplicate overload for function '{}'",
                desc.name
            )));
        }
        self.descriptors.push(desc);
        Ok(())
    }

    pub fn overloads(&self, name: &str) -> impl Iterator<Item = &FunctionDescriptor> {
        self.descriptors.iter().filter(move |d| d.name == name)
    }

    /// Resolve a call: exact (non-variadic) matches win over variadic ones.
    /// A fixed overload and a variadic overload can both match when the
    /// fixed overload's arity equals the variadic one's required prefix
    /// plus one tail argument — the fixed overload wins that tie.
    pub fn resolve(
        &self,
        name: &str,
        arg_types: &[TypeId],
        types: &TypeTable,
    ) -> Result<FuncId, OverloadError> {
        let candidates: Vec<(usize, &FunctionDescriptor)> = self
            .descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.name == name)
            .collect();
        if candidates.is_empty() {
            return Err(OverloadError(format!("no function named '{name}'")));
        }

        let mut exact = candidates
            .iter()
            .filter(|(_, d)| !d.has_variadic_tail() && d.matches(arg_types));
        if let Some((i, _)) = exact.next() {
            return Ok(FuncId(*i));
        }

        let mut variadic = candidates
            .iter()
            .filter(|(_, d)| d.has_variadic_tail() && d.matches(arg_types));
        if let Some((i, _)) = variadic.next() {
            return Ok(FuncId(*i));
        }

        let mut msg = format!("no overload of '{name}' matches argument types (");
        let names: Vec<&str> = arg_types.iter().map(|t| types.name_of(*t)).collect();
        msg.push_str(&names.join(", "));
        msg.push_str("); candidates:");
        for (_, d) in &candidates {
            msg.push_str("\n  ");
            msg.push_str(&signature_string(d, types));
        }
        Err(OverloadError(msg))
    }

    pub fn get(&self, id: FuncId) -> &FunctionDescriptor {
        &self.descriptors[id.0]
    }

    /// Every registered overload, for the backend's symbol-table binding.
    pub fn all(&self) -> impl Iterator<Item = &FunctionDescriptor> {
        self.descriptors.iter()
    }

    /// Distinct function names across all overloads, in first-registered
    /// order, for symbol-table seeding.
    pub fn all_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        for d in &self.descriptors {
            if seen.insert(d.name.clone()) {
                names.push(d.name.clone());
            }
        }
        names
    }
}

fn signature_string(d: &FunctionDescriptor, types: &TypeTable) -> String {
    let params: Vec<String> = d
        .params
        .iter()
        .map(|p| {
            if p.variadic {
                format!("...{}", types.name_of(p.ty))
            } else {
                types.name_of(p.ty).to_string()
            }
        })
        .collect();
    format!(
        "{}({}) -> {}",
        d.name,
        params.join(", "),
        types.name_of(d.return_type)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallConv, Lifetime, TypeInfo, TypeKind};

    extern "C" fn noop_wrapper(_entry: *const (), _args: *mut *mut u8) {}

    fn int_type(table: &mut TypeTable) -> TypeId {
        table
            .register(TypeInfo {
                name: "Integer".into(),
                kind: TypeKind::Value,
                size: 8,
                align: 8,
                call_conv: CallConv::ByValue,
                lifetime: Lifetime::trivial(),
                lower: None,
            })
            .unwrap()
    }

    fn desc(name: &str, params: Vec<Param>, ret: TypeId) -> FunctionDescriptor {
        FunctionDescriptor {
            name: name.to_string(),
            symbol: format!("_{name}"),
            params,
            return_type: ret,
            entry: std::ptr::null(),
            wrapper: noop_wrapper,
            intrinsic: None,
            flags: FunctionFlags::default(),
        }
    }

    #[test]
    fn fixed_overload_wins_over_variadic_tie() {
        let mut types = TypeTable::new();
        let int_ty = int_type(&mut types);
        let mut lib = FunctionLibrary::new();
        lib.register(desc(
            "max",
            vec![
                Param { ty: int_ty, variadic: false },
                Param { ty: int_ty, variadic: false },
            ],
            int_ty,
        ))
        .unwrap();
        lib.register(desc(
            "max",
            vec![Param { ty: int_ty, variadic: true }],
            int_ty,
        ))
        .unwrap();

        let two = lib.resolve("max", &[int_ty, int_ty], &types).unwrap();
        assert!(!lib.get(two).has_variadic_tail());

        let three = lib.resolve("max", &[int_ty, int_ty, int_ty], &types).unwrap();
        assert!(lib.get(three).has_variadic_tail());

        let one = lib.resolve("max", &[int_ty], &types).unwrap();
        assert!(lib.get(one).has_variadic_tail());
    }

    #[test]
    fn unknown_overload_lists_all_candidates() {
        let mut types = TypeTable::new();
        let int_ty = int_type(&mut types);
        let mut lib = FunctionLibrary::new();
        lib.register(desc(
            "operator_add",
            vec![
                Param { ty: int_ty, variadic: false },
                Param { ty: int_ty, variadic: false },
            ],
            int_ty,
        ))
        .unwrap();
        let err = lib.resolve("operator_add", &[int_ty], &types).unwrap_err();
        assert!(err.0.contains("candidates:"));
        assert!(err.0.contains("operator_add(Integer, Integer) -> Integer"));
    }

    #[test]
    fn mangled_names_mark_variadic_params() {
        let mut types = TypeTable::new();
        let int_ty = int_type(&mut types);
        let params = vec![Param { ty: int_ty, variadic: true }];
        assert_eq!(mangle_name("max", &params, &types), "_max_vararg_Integer");
    }
}
