//! Host registration surface: a template/trait-style façade letting host
//! code register value types, object types and typed functions, optionally
//! with an inline intrinsic emitter.

use crate::functions::{FunctionDescriptor, FunctionLibrary, IntrinsicEmitter, Param, RegistrationError, WrapperFn, mangle_name};
use crate::types::{CallConv, Lifetime, LowerTypeFn, TypeId, TypeKind, TypeRegistrationError, TypeTable};

/// A host module: the two hooks a host implements to extend the language.
pub trait Module {
    fn register_types(&self, registry: &mut Registry);
    fn register_functions(&self, registry: &mut Registry);
}

/// The registry a [`Module`] is handed during registration. Wraps the
/// shared [`TypeTable`]/[`FunctionLibrary`] with duplicate-rejection rules.
pub struct Registry<'a> {
    pub types: &'a mut TypeTable,
    pub functions: &'a mut FunctionLibrary,
}

impl<'a> Registry<'a> {
    pub fn new(types: &'a mut TypeTable, functions: &'a mut FunctionLibrary) -> Self {
        Registry { types, functions }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_type(
        &mut self,
        name: &str,
        kind: TypeKind,
        size: u32,
        align: u32,
        call_conv: CallConv,
        lifetime: Lifetime,
        lower: Option<LowerTypeFn>,
    ) -> Result<TypeId, TypeRegistrationError> {
        self.types.register(crate::types::TypeInfo {
            name: name.to_string(),
            kind,
            size,
            align,
            call_conv,
            lifetime,
            lower,
        })
    }

    /// Register a function. The last entry in `params` may be marked
    /// variadic, matching one or more trailing arguments greedily.
    pub fn register_function(
        &mut self,
        name: &str,
        return_type: TypeId,
        params: Vec<Param>,
        entry: *const (),
        wrapper: WrapperFn,
        intrinsic: Option<IntrinsicEmitter>,
        pure: bool,
    ) -> Result<(), RegistrationError> {
        if let Some((last, rest)) = params.split_last() {
            if rest.iter().any(|p| p.variadic) && !last.variadic {
                return Err(RegistrationError(format!(
                    "only the last parameter of '{name}' may be variadic"
                )));
            }
        }
        let symbol = mangle_name(name, &params, self.types);
        let symbol = if intrinsic.is_some() {
            format!("{symbol}__intrinsic")
        } else {
            symbol
        };
        self.functions.register(FunctionDescriptor {
            name: name.to_string(),
            symbol,
            params,
            return_type,
            entry,
            wrapper,
            intrinsic,
            flags: crate::functions::FunctionFlags { pure_: pure },
        })
    }
}

/// Runs every module's two hooks in order: all types across all modules
/// first, then all functions (functions may reference types from any
/// module, including ones registered after their own `register_types`).
pub fn register_all(types: &mut TypeTable, functions: &mut FunctionLibrary, modules: &[&dyn Module]) {
    for m in modules {
        let mut registry = Registry::new(types, functions);
        m.register_types(&mut registry);
    }
    for m in modules {
        let mut registry = Registry::new(types, functions);
        m.register_functions(&mut registry);
    }
}
