//! The base type system (§6.2). Out of scope as an implementation — real
//! YANG type restriction checking (range/pattern/length facets, derived
//! type chains) lives behind [`TypeSystem`] — but this crate owns the
//! `TypeDef` value shape and ships a [`BuiltinTypeSystem`] covering the
//! RFC 6020 built-in base types, so every phase downstream of the resolver
//! can be driven end to end without a real plugin.

use crate::xpath::Pcb;
use std::fmt;

/// The YANG built-in base types (RFC 6020 §9), plus `Unresolved` for a type
/// reference the resolver hasn't looked up yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64,
    String,
    Boolean,
    Enumeration,
    Bits,
    Binary,
    Leafref,
    Identityref,
    InstanceIdentifier,
    Empty,
    Union,
    /// A type name P2 could not resolve on the spot (an as-yet-unparsed
    /// forward-referenced `typedef`, or an `identityref`/`instance-identifier`
    /// base the external type subsystem doesn't recognize by bare name).
    /// Carries no data itself; the name lives on [`TypeDef::raw_name`].
    Unresolved,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseType::Int8 => "int8",
            BaseType::Int16 => "int16",
            BaseType::Int32 => "int32",
            BaseType::Int64 => "int64",
            BaseType::Uint8 => "uint8",
            BaseType::Uint16 => "uint16",
            BaseType::Uint32 => "uint32",
            BaseType::Uint64 => "uint64",
            BaseType::Decimal64 => "decimal64",
            BaseType::String => "string",
            BaseType::Boolean => "boolean",
            BaseType::Enumeration => "enumeration",
            BaseType::Bits => "bits",
            BaseType::Binary => "binary",
            BaseType::Leafref => "leafref",
            BaseType::Identityref => "identityref",
            BaseType::InstanceIdentifier => "instance-identifier",
            BaseType::Empty => "empty",
            BaseType::Union => "union",
            BaseType::Unresolved => "unresolved",
        };
        f.write_str(name)
    }
}

impl BaseType {
    pub fn from_name(name: &str) -> Option<BaseType> {
        Some(match name {
            "int8" => BaseType::Int8,
            "int16" => BaseType::Int16,
            "int32" => BaseType::Int32,
            "int64" => BaseType::Int64,
            "uint8" => BaseType::Uint8,
            "uint16" => BaseType::Uint16,
            "uint32" => BaseType::Uint32,
            "uint64" => BaseType::Uint64,
            "decimal64" => BaseType::Decimal64,
            "string" => BaseType::String,
            "boolean" => BaseType::Boolean,
            "enumeration" => BaseType::Enumeration,
            "bits" => BaseType::Bits,
            "binary" => BaseType::Binary,
            "leafref" => BaseType::Leafref,
            "identityref" => BaseType::Identityref,
            "instance-identifier" => BaseType::InstanceIdentifier,
            "empty" => BaseType::Empty,
            "union" => BaseType::Union,
            _ => return None,
        })
    }
}

/// A resolved (or not-yet-resolved) `type` statement's body, owned by a leaf
/// or leaf-list. Restriction facets (range, pattern, length, bit/enum
/// assignments) are deliberately not modeled here: parsing and checking them
/// is the external type subsystem's job (§6.2); this struct carries only
/// what the compiler core itself needs to dispatch on.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub base: BaseType,
    /// Present only when `base == Leafref`: the parsed (but not yet
    /// validated) path expression, as handed back by the external XPath
    /// subsystem's `xpath_yang_parse_path`.
    pub leafref_path: Option<Pcb>,
    /// Present only when `base == Union`: the member types.
    pub union_members: Vec<TypeDef>,
    /// Present only when `base == Unresolved`: the type name as written,
    /// for the resolver (§4.3) to retry once every typedef in scope has
    /// been registered.
    pub raw_name: Option<String>,
}

impl TypeDef {
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            leafref_path: None,
            union_members: Vec::new(),
            raw_name: None,
        }
    }

    pub fn leafref(path: Pcb) -> Self {
        Self {
            base: BaseType::Leafref,
            leafref_path: Some(path),
            union_members: Vec::new(),
            raw_name: None,
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            base: BaseType::Unresolved,
            leafref_path: None,
            union_members: Vec::new(),
            raw_name: Some(name.into()),
        }
    }
}

/// The external type subsystem's interface (§6.2). A real implementation
/// understands the full restriction-facet grammar; [`BuiltinTypeSystem`]
/// understands only base-type names, enough to drive every other phase.
pub trait TypeSystem {
    /// Resolve a bare type name (no restrictions) to a `TypeDef`. Returns
    /// `None` if the name is neither a YANG built-in nor a typedef this
    /// type system otherwise knows about.
    fn resolve_named_type(&self, name: &str) -> Option<TypeDef>;

    /// `ok_for_index`: whether this base type may be used as a list key or
    /// unique component.
    fn ok_for_index(&self, base: BaseType) -> bool {
        !matches!(
            base,
            BaseType::Empty
                | BaseType::Leafref
                | BaseType::Union
                | BaseType::Binary
                | BaseType::Unresolved
        )
    }

    /// `ok_for_metadata`: whether this base type may be used for an
    /// `ncx:metadata` XML-attribute binding (§4.3).
    fn ok_for_metadata(&self, base: BaseType) -> bool {
        matches!(
            base,
            BaseType::String
                | BaseType::Boolean
                | BaseType::Enumeration
                | BaseType::Int8
                | BaseType::Int16
                | BaseType::Int32
                | BaseType::Int64
                | BaseType::Uint8
                | BaseType::Uint16
                | BaseType::Uint32
                | BaseType::Uint64
        )
    }

    /// Cross-check a default value string against a resolved type. The real
    /// subsystem parses/range-checks the literal; the builtin only checks
    /// the coarse shape (numeric vs boolean vs arbitrary string).
    fn default_matches_type(&self, typedef: &TypeDef, default: &str) -> bool {
        match typedef.base {
            BaseType::Boolean => default == "true" || default == "false",
            BaseType::Int8
            | BaseType::Int16
            | BaseType::Int32
            | BaseType::Int64
            | BaseType::Uint8
            | BaseType::Uint16
            | BaseType::Uint32
            | BaseType::Uint64 => default.parse::<i64>().is_ok() || default.parse::<u64>().is_ok(),
            BaseType::Empty => false,
            _ => true,
        }
    }
}

/// The reference `TypeSystem` covering only RFC 6020 built-ins: no
/// typedef chain, no restriction facets. Sufficient to drive the resolver,
/// uses expander, and final phase end to end in this crate's own tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTypeSystem;

impl TypeSystem for BuiltinTypeSystem {
    fn resolve_named_type(&self, name: &str) -> Option<TypeDef> {
        BaseType::from_name(name).map(TypeDef::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_resolves_known_base_types() {
        let sys = BuiltinTypeSystem;
        assert_eq!(sys.resolve_named_type("int32").unwrap().base, BaseType::Int32);
        assert!(sys.resolve_named_type("not-a-type").is_none());
    }

    #[test]
    fn ok_for_index_excludes_empty_and_leafref() {
        let sys = BuiltinTypeSystem;
        assert!(!sys.ok_for_index(BaseType::Empty));
        assert!(!sys.ok_for_index(BaseType::Leafref));
        assert!(sys.ok_for_index(BaseType::String));
        assert!(sys.ok_for_index(BaseType::Int32));
    }

    #[test]
    fn default_matches_type_checks_coarse_shape() {
        let sys = BuiltinTypeSystem;
        let int_type = TypeDef::new(BaseType::Int32);
        assert!(sys.default_matches_type(&int_type, "42"));
        assert!(!sys.default_matches_type(&int_type, "nope"));

        let bool_type = TypeDef::new(BaseType::Boolean);
        assert!(sys.default_matches_type(&bool_type, "true"));
        assert!(!sys.default_matches_type(&bool_type, "yes"));
    }
}
