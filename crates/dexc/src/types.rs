//! The type system: named types with pointer-stable identities.
//!
//! A [`TypeId`] is an opaque token whose equality is reference equality on
//! an entry in a [`TypeTable`]. We implement that as an index into the
//! table's backing `Vec` rather than a raw pointer:
//! the table never reallocates entries out from under a live `TypeId`
//! because registration is append-only and the table itself is owned for
//! the whole compilation (mirrors the arena-index style used for AST
//! cross-references, see `ast.rs`).

use std::fmt;

/// Opaque, pointer-stable type identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(usize);

/// The kind tag for a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Unresolved,
    Value,
    Complex,
    Function,
}

/// How a value of this type is passed across the generated call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    ByValue,
    ByPointer,
}

/// A native lifetime callback: a link-time symbol name (for IR emission)
/// paired with the actual native entry (for JIT symbol resolution).
#[derive(Clone)]
pub struct NativeFn<F> {
    pub symbol: String,
    pub entry: F,
}

impl<F> fmt::Debug for NativeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("symbol", &self.symbol).finish()
    }
}

pub type DtorFn = extern "C" fn(*mut u8);
pub type CopyCtorFn = extern "C" fn(*mut u8, *const u8);
pub type MoveCtorFn = extern "C" fn(*mut u8, *mut u8);
pub type DefaultCtorFn = extern "C" fn(*mut u8);

/// Whether/how a slot of this type is default-constructed by `__init_rctx`.
#[derive(Debug, Clone)]
pub enum DefaultConstruct {
    /// Slot is zero-filled; no call is emitted.
    ZeroInit,
    /// Slot's zero state is never touched (the first store sets it).
    Skip,
    Call(NativeFn<DefaultCtorFn>),
}

/// The four lifetime callbacks a complex type may register.
#[derive(Debug, Clone)]
pub struct Lifetime {
    pub destructor: Option<NativeFn<DtorFn>>,
    pub copy_ctor: Option<NativeFn<CopyCtorFn>>,
    pub move_ctor: Option<NativeFn<MoveCtorFn>>,
    pub default_ctor: DefaultConstruct,
}

impl Lifetime {
    /// Value kinds are trivially destructible.
    pub fn trivial() -> Self {
        Lifetime {
            destructor: None,
            copy_ctor: None,
            move_ctor: None,
            default_ctor: DefaultConstruct::ZeroInit,
        }
    }

    pub fn is_trivial(&self) -> bool {
        self.destructor.is_none() && self.copy_ctor.is_none() && self.move_ctor.is_none()
    }
}

/// How a host-registered type spells itself in emitted IR text (e.g. `i64`,
/// `double`, `%struct.String`). `Value`/`Complex` built-ins supply this
/// directly; a `Complex` type without one falls back to an opaque `i8`
/// pointer.
pub type LowerTypeFn = Box<dyn Fn() -> String>;

pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
    pub size: u32,
    pub align: u32,
    pub call_conv: CallConv,
    pub lifetime: Lifetime,
    pub lower: Option<LowerTypeFn>,
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("call_conv", &self.call_conv)
            .finish()
    }
}

/// Registers named types and hands back stable [`TypeId`]s.
///
/// Invariants enforced at registration:
/// - `size % align == 0`
/// - `Value` kinds are trivially destructible and `ByValue`
/// - `Complex` kinds are `ByPointer`
/// - exactly one `Unresolved` entry exists (the sentinel, always index 0)
pub struct TypeTable {
    entries: Vec<TypeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistrationError(pub String);

impl fmt::Display for TypeRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for TypeRegistrationError {}

impl TypeTable {
    pub fn new() -> Self {
        let sentinel = TypeInfo {
            name: "<unresolved>".to_string(),
            kind: TypeKind::Unresolved,
            size: 0,
            align: 1,
            call_conv: CallConv::ByValue,
            lifetime: Lifetime::trivial(),
            lower: None,
        };
        TypeTable {
            entries: vec![sentinel],
        }
    }

    /// The always-present sentinel.
    pub fn unresolved(&self) -> TypeId {
        TypeId(0)
    }

    pub fn register(&mut self, info: TypeInfo) -> Result<TypeId, TypeRegistrationError> {
        if info.size % info.align.max(1) != 0 {
            return Err(TypeRegistrationError(format!(
                "type '{}' has size {} not a multiple of alignment {}",
                info.name, info.size, info.align
            )));
        }
        match info.kind {
            TypeKind::Value => {
                if !info.lifetime.is_trivial() {
                    return Err(TypeRegistrationError(format!(
                        "Value type '{}' must be trivially destructible",
                        info.name
                    )));
                }
                if info.call_conv != CallConv::ByValue {
                    return Err(TypeRegistrationError(format!(
                        "Value type '{}' must be passed ByValue",
                        info.name
                    )));
                }
            }
            TypeKind::Complex => {
                if info.call_conv != CallConv::ByPointer {
                    return Err(TypeRegistrationError(format!(
                        "Complex type '{}' must be passed ByPointer",
                        info.name
                    )));
                }
            }
            TypeKind::Unresolved | TypeKind::Function => {}
        }
        if self.lookup(&info.name).is_some() {
            return Err(TypeRegistrationError(format!(
                "duplicate type name '{}'",
                info.name
            )));
        }
        let id = TypeId(self.entries.len());
        self.entries.push(info);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.entries
            .iter()
            .position(|t| t.name == name)
            .map(TypeId)
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.entries[id.0]
    }

    pub fn is_complex(&self, id: TypeId) -> bool {
        self.get(id).kind == TypeKind::Complex
    }

    pub fn name_of(&self, id: TypeId) -> &str {
        &self.get(id).name
    }

    /// All registered type names, excluding the `Unresolved` sentinel.
    pub fn all_names(&self) -> Vec<String> {
        self.entries[1..].iter().map(|t| t.name.clone()).collect()
    }

    /// Every registered type's info, excluding the `Unresolved` sentinel,
    /// for the backend's symbol-table binding.
    pub fn all(&self) -> impl Iterator<Item = &TypeInfo> {
        self.entries[1..].iter()
    }

    /// How `id` spells itself in emitted IR text. Falls back to an opaque
    /// `i8*` for a `Complex` type that didn't supply a lowering, `i64`
    /// otherwise (only reached for host types that skipped registration
    /// hygiene; every built-in sets `lower`).
    pub fn ir_type(&self, id: TypeId) -> String {
        let info = self.get(id);
        match &info.lower {
            Some(lower) => lower(),
            None if info.kind == TypeKind::Complex => "i8*".to_string(),
            None => "i64".to_string(),
        }
    }

    /// The pointer spelling of `id`'s IR type (`Ty*`), used for slot
    /// addresses and `ByPointer` argument passing.
    pub fn ir_ptr_type(&self, id: TypeId) -> String {
        format!("{}*", self.ir_type(id))
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_type(name: &str, size: u32, align: u32) -> TypeInfo {
        TypeInfo {
            name: name.to_string(),
            kind: TypeKind::Value,
            size,
            align,
            call_conv: CallConv::ByValue,
            lifetime: Lifetime::trivial(),
            lower: None,
        }
    }

    #[test]
    fn unresolved_is_always_index_zero() {
        let table = TypeTable::new();
        assert_eq!(table.unresolved(), TypeId(0));
        assert_eq!(table.get(table.unresolved()).kind, TypeKind::Unresolved);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut table = TypeTable::new();
        table.register(value_type("Integer", 8, 8)).unwrap();
        let err = table.register(value_type("Integer", 8, 8));
        assert!(err.is_err());
    }

    #[test]
    fn size_must_be_multiple_of_align() {
        let mut table = TypeTable::new();
        let bad = value_type("Bad", 5, 8);
        assert!(table.register(bad).is_err());
    }

    #[test]
    fn value_kind_must_be_trivial_and_by_value() {
        let mut table = TypeTable::new();
        let mut complex_as_value = value_type("Weird", 8, 8);
        complex_as_value.call_conv = CallConv::ByPointer;
        assert!(table.register(complex_as_value).is_err());
    }

    #[test]
    fn type_ids_are_stable_across_further_registrations() {
        let mut table = TypeTable::new();
        let a = table.register(value_type("A", 8, 8)).unwrap();
        let _b = table.register(value_type("B", 4, 4)).unwrap();
        assert_eq!(table.name_of(a), "A");
    }
}
