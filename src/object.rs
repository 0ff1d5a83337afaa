//! The schema object model (§3.1): a tagged union over the thirteen kinds
//! of YANG statement that participate in the compiled tree, plus the
//! bookkeeping every kind carries regardless of payload (location,
//! conditionals, clone back-pointers, flags).
//!
//! Forbidden combinations (a `case` holding a `must`, a `choice` holding a
//! value) are impossible states rather than runtime checks wherever the
//! kind-specific payload can express that directly, following the
//! tagged-union-with-payloads shape of the teacher's `Keyword<A>`
//! (`json::schema::keywords`).

use crate::arena::{GroupingId, ObjectId, TypeDefId};
use crate::location::Location;
use crate::typedef::TypeDef;
use crate::xpath::Pcb;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Current,
    Deprecated,
    Obsolete,
}

impl Default for Status {
    fn default() -> Self {
        Status::Current
    }
}

/// A vendor extension (appinfo) clause attached inside a statement's body,
/// e.g. `ex:some-extension "value";`.
#[derive(Debug, Clone)]
pub struct Appinfo {
    pub prefix: String,
    pub name: String,
    pub value: Option<String>,
    pub location: Location,
}

/// The parsed form of the `ncx:metadata` vendor extension (§4.3): binds an
/// XML-attribute-valued side-channel name to a type.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub name: String,
    pub type_def: TypeDef,
}

/// The closed set of schema object kinds (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Anyxml,
    Container,
    Leaf,
    LeafList,
    List,
    Choice,
    Case,
    Uses,
    Refine,
    Augment,
    Rpc,
    Rpcio,
    Notification,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Anyxml => "anyxml",
            ObjectKind::Container => "container",
            ObjectKind::Leaf => "leaf",
            ObjectKind::LeafList => "leaf-list",
            ObjectKind::List => "list",
            ObjectKind::Choice => "choice",
            ObjectKind::Case => "case",
            ObjectKind::Uses => "uses",
            ObjectKind::Refine => "refine",
            ObjectKind::Augment => "augment",
            ObjectKind::Rpc => "rpc",
            ObjectKind::Rpcio => "rpcio",
            ObjectKind::Notification => "notification",
        }
    }

    /// Whether instances of this kind appear in the instance data tree
    /// (the glossary's definition of "schema node"). `uses`, `refine`, and
    /// `augment` are compile-time-only constructs.
    pub fn is_schema_node(&self) -> bool {
        !matches!(self, ObjectKind::Uses | ObjectKind::Refine | ObjectKind::Augment)
    }

    pub fn has_children(&self) -> bool {
        matches!(
            self,
            ObjectKind::Container
                | ObjectKind::List
                | ObjectKind::Case
                | ObjectKind::Rpcio
                | ObjectKind::Notification
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContainerPayload {
    /// `Some(description)` if this is a presence container.
    pub presence: Option<String>,
    pub children: Vec<ObjectId>,
    pub typedefs: Vec<TypeDefId>,
    pub groupings: Vec<GroupingId>,
}

#[derive(Debug, Clone, Default)]
pub struct LeafPayload {
    pub type_def: Option<TypeDef>,
    pub units: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LeafListPayload {
    pub type_def: Option<TypeDef>,
    pub units: Option<String>,
    pub min_elements: u32,
    pub max_elements: Option<u32>,
    pub user_ordered: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListPayload {
    pub children: Vec<ObjectId>,
    pub typedefs: Vec<TypeDefId>,
    pub groupings: Vec<GroupingId>,
    /// The raw `key` statement's argument, e.g. `"name address"`.
    pub key_str: Option<String>,
    /// Resolved by `final_check::resolve_list_final` (§4.7.4): the ordered
    /// leaf children the key string names.
    pub keys: Vec<ObjectId>,
    pub unique_strs: Vec<String>,
    /// Resolved alongside `keys`, one entry per `unique_strs` member.
    pub uniques: Vec<Vec<ObjectId>>,
    pub min_elements: u32,
    pub max_elements: Option<u32>,
    pub user_ordered: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChoicePayload {
    pub cases: Vec<ObjectId>,
    pub default_case: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CasePayload {
    pub children: Vec<ObjectId>,
}

/// A `refine` clause living inside a `uses` body (§4.4.1). Holds whichever
/// sub-statements were present; applicability against the target kind is
/// checked before expansion, not encoded in the type, because the set of
/// allowed sub-statements per target kind is itself part of the semantics
/// under test (§4.4.1's table), not a static invariant the compiler can
/// assume a priori while parsing.
#[derive(Debug, Clone, Default)]
pub struct RefinePayload {
    pub target_path: String,
    /// Resolved during `resolve_uses` (§4.4.1 step 4) to a node inside the
    /// grouping's own (unexpanded) body.
    pub resolved_target: Option<ObjectId>,
    pub config: Option<bool>,
    pub mandatory: Option<bool>,
    pub presence: Option<String>,
    pub default: Option<String>,
    pub must: Vec<Pcb>,
    pub min_elements: Option<u32>,
    pub max_elements: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct UsesPayload {
    pub grouping_prefix: Option<String>,
    pub grouping_name: String,
    /// Resolved during `resolve_uses`; cleared on nesting-loop detection
    /// (§4.4.1 step 2) so the expander cannot recurse into it.
    pub grouping: Option<GroupingId>,
    pub refines: Vec<ObjectId>,
    pub augments: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default)]
pub struct AugmentPayload {
    pub target_path: String,
    pub resolved_target: Option<ObjectId>,
    pub children: Vec<ObjectId>,
    /// True when this augment's module differs from the target's owning
    /// module (§4.5 step 3's "external augment").
    pub external: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RpcPayload {
    pub input: Option<ObjectId>,
    pub output: Option<ObjectId>,
    pub typedefs: Vec<TypeDefId>,
    pub groupings: Vec<GroupingId>,
}

#[derive(Debug, Clone, Default)]
pub struct RpcioPayload {
    pub children: Vec<ObjectId>,
    pub typedefs: Vec<TypeDefId>,
    pub groupings: Vec<GroupingId>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationPayload {
    pub children: Vec<ObjectId>,
    pub typedefs: Vec<TypeDefId>,
    pub groupings: Vec<GroupingId>,
}

#[derive(Debug, Clone, Default)]
pub struct AnyxmlPayload {}

#[derive(Debug, Clone)]
pub enum ObjectPayload {
    Anyxml(AnyxmlPayload),
    Container(ContainerPayload),
    Leaf(LeafPayload),
    LeafList(LeafListPayload),
    List(ListPayload),
    Choice(ChoicePayload),
    Case(CasePayload),
    Uses(UsesPayload),
    Refine(RefinePayload),
    Augment(AugmentPayload),
    Rpc(RpcPayload),
    Rpcio(RpcioPayload),
    Notification(NotificationPayload),
}

impl ObjectPayload {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectPayload::Anyxml(_) => ObjectKind::Anyxml,
            ObjectPayload::Container(_) => ObjectKind::Container,
            ObjectPayload::Leaf(_) => ObjectKind::Leaf,
            ObjectPayload::LeafList(_) => ObjectKind::LeafList,
            ObjectPayload::List(_) => ObjectKind::List,
            ObjectPayload::Choice(_) => ObjectKind::Choice,
            ObjectPayload::Case(_) => ObjectKind::Case,
            ObjectPayload::Uses(_) => ObjectKind::Uses,
            ObjectPayload::Refine(_) => ObjectKind::Refine,
            ObjectPayload::Augment(_) => ObjectKind::Augment,
            ObjectPayload::Rpc(_) => ObjectKind::Rpc,
            ObjectPayload::Rpcio(_) => ObjectKind::Rpcio,
            ObjectPayload::Notification(_) => ObjectKind::Notification,
        }
    }

    /// The object's own child queue (datadefQ), if this kind has one.
    /// `uses`/`refine` do not have a datadefQ of schema-node children (their
    /// "children" are refinements/nested augments, reached via the payload
    /// directly), nor do `leaf`/`leaf-list`/`anyxml`.
    pub fn children(&self) -> Option<&[ObjectId]> {
        match self {
            ObjectPayload::Container(c) => Some(&c.children),
            ObjectPayload::List(l) => Some(&l.children),
            ObjectPayload::Case(c) => Some(&c.children),
            ObjectPayload::Rpcio(r) => Some(&r.children),
            ObjectPayload::Notification(n) => Some(&n.children),
            ObjectPayload::Choice(c) => Some(&c.cases),
            ObjectPayload::Augment(a) => Some(&a.children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<ObjectId>> {
        match self {
            ObjectPayload::Container(c) => Some(&mut c.children),
            ObjectPayload::List(l) => Some(&mut l.children),
            ObjectPayload::Case(c) => Some(&mut c.children),
            ObjectPayload::Rpcio(r) => Some(&mut r.children),
            ObjectPayload::Notification(n) => Some(&mut n.children),
            ObjectPayload::Choice(c) => Some(&mut c.cases),
            ObjectPayload::Augment(a) => Some(&mut a.children),
            _ => None,
        }
    }
}

/// The inheritance-flag word (§3.1): whether config/mandatory were
/// explicitly stated versus inherited, plus the handful of independent
/// marker bits used by later phases.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectFlags {
    pub config_set: bool,
    pub config: bool,
    pub mandatory_set: bool,
    pub mandatory: bool,
    /// This object is a list key leaf.
    pub key: bool,
    /// This object is named by some `unique` statement on its list.
    pub unique: bool,
    /// This object (or an ancestor) was produced by augment-expansion.
    pub augment_clone: bool,
    /// Marked by a `not-supported` deviate; garbage-collected at the end
    /// of P5 (§4.6.5).
    pub deleted: bool,
    /// This object sits directly under the module (or a top-level rpc's
    /// input/output, or a notification) rather than under another data
    /// node.
    pub top: bool,
    /// No instance data of its own (choice, case) — carried as an explicit
    /// flag, mirroring the original's bitword, even though `ObjectKind`
    /// already implies it, because deviation/augment bookkeeping consults
    /// the flag directly rather than re-deriving it from the kind.
    pub empty: bool,
}

/// One node of the compiled schema tree (§3.1).
#[derive(Debug, Clone)]
pub struct SchemaObject {
    pub name: String,
    pub payload: ObjectPayload,
    pub parent: Option<ObjectId>,
    /// Namespace id of the module that owns this object's definition (not
    /// necessarily the module being compiled, for clones: §3.5 "Clone
    /// linkage").
    pub nsid: u32,
    pub location: Location,
    pub flags: ObjectFlags,
    pub status: Status,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub appinfo: Vec<Appinfo>,
    pub metadata: Option<Metadata>,
    pub if_features: Vec<String>,
    pub when: Option<Pcb>,
    pub must: Vec<Pcb>,
    /// Handles to the uses/augment/choice/case ancestors whose own
    /// if-feature/when this object inherits, stored *by reference* rather
    /// than copied (§9 design notes: "Shared inherited conditionals").
    pub inherited_conditionals: Vec<ObjectId>,
    /// Set exactly when this object entered the tree via uses-expansion.
    pub usesobj: Option<ObjectId>,
    /// Set exactly when this object entered the tree via augment-expansion.
    pub augobj: Option<ObjectId>,
}

impl SchemaObject {
    pub fn new(name: impl Into<String>, payload: ObjectPayload, location: Location) -> Self {
        Self {
            name: name.into(),
            payload,
            parent: None,
            nsid: 0,
            location,
            flags: ObjectFlags::default(),
            status: Status::Current,
            description: None,
            reference: None,
            appinfo: Vec::new(),
            metadata: None,
            if_features: Vec::new(),
            when: None,
            must: Vec::new(),
            inherited_conditionals: Vec::new(),
            usesobj: None,
            augobj: None,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.payload.kind()
    }

    /// Whether this object (or the uses/augment it was cloned through) is
    /// a clone, per the §3.5 XOR invariant.
    pub fn is_clone(&self) -> bool {
        self.usesobj.is_some() || self.augobj.is_some()
    }
}
