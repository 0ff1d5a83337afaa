//! Shared state across all six phases (§4.1): the arena backing a single
//! compilation unit, the module record(s) it holds, and the mailbox that
//! lets a deviation-only module stage its deviations ahead of the main
//! module they target ever being compiled (§4.6.1).
//!
//! Grounded on the teacher's top-level-state pattern in
//! `models::validation::mod::Tables`/`validate()`: one struct owns every
//! table a multi-pass validator threads through, and its methods are the
//! only way downstream phases reach into it.

use crate::arena::{GroupingId, ObjectId, Slab, TypeDefId};
use crate::deviation::Deviation;
use crate::grouping::Grouping;
use crate::location::Location;
use crate::object::SchemaObject;
use crate::typedef::TypeDef;

/// A named, reusable `typedef` statement's body, interned once per owning
/// module/grouping/container and referenced elsewhere by [`TypeDefId`].
#[derive(Debug, Clone)]
pub struct NamedTypeDef {
    pub name: String,
    pub def: TypeDef,
    pub location: Location,
    pub description: Option<String>,
    pub reference: Option<String>,
}

/// A `feature` statement (§1: forward-referenced by `if-feature`).
#[derive(Debug, Clone)]
pub struct Feature {
    pub name: String,
    pub if_features: Vec<String>,
    pub location: Location,
}

/// An `identity` statement. Substitution-group resolution against
/// `identityref` values is the external type subsystem's concern (§6.2);
/// this crate only records the declaration itself so `base` references can
/// at least be checked for existence.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub base: Option<String>,
    pub location: Location,
}

/// An `import` statement.
#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub prefix: String,
    pub revision: Option<String>,
}

/// One compiled module or submodule's own record (§4.1): everything that
/// belongs to it specifically, as opposed to the arena storage it shares
/// with its siblings.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub namespace: String,
    pub prefix: String,
    pub yang_version: String,
    pub revision: Option<String>,
    pub organization: Option<String>,
    pub contact: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub imports: Vec<Import>,
    pub includes: Vec<String>,
    pub features: Vec<Feature>,
    pub identities: Vec<Identity>,
    pub typedefs: Vec<TypeDefId>,
    pub groupings: Vec<GroupingId>,
    /// The top-level datadefQ (§3.1): direct children of the module itself.
    pub datadefs: Vec<ObjectId>,
    pub deviations: Vec<Deviation>,
    /// Registration order of every top-level statement (datadefs, rpcs,
    /// notifications, augments interleaved), kept distinct from `datadefs`
    /// because augments and deviations do not live in `datadefs` but do
    /// need a stable position for deterministic-order consumers (§9 notes).
    pub statement_order: Vec<ObjectId>,
    pub augments: Vec<ObjectId>,
    pub belongs_to: Option<String>,
}

impl Module {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            prefix: prefix.into(),
            yang_version: "1".to_string(),
            revision: None,
            organization: None,
            contact: None,
            description: None,
            reference: None,
            imports: Vec::new(),
            includes: Vec::new(),
            features: Vec::new(),
            identities: Vec::new(),
            typedefs: Vec::new(),
            groupings: Vec::new(),
            datadefs: Vec::new(),
            deviations: Vec::new(),
            statement_order: Vec::new(),
            augments: Vec::new(),
            belongs_to: None,
        }
    }

    pub fn is_submodule(&self) -> bool {
        self.belongs_to.is_some()
    }
}

/// Arena storage for one compilation unit (a main module plus however many
/// submodules it `include`s). Every [`ObjectId`]/[`GroupingId`]/[`TypeDefId`]
/// handed out by any phase indexes into exactly one of these three slabs.
#[derive(Debug, Default)]
pub struct ModuleArena {
    pub objects: Slab<SchemaObject>,
    pub groupings: Slab<Grouping>,
    pub typedefs: Slab<NamedTypeDef>,
}

impl ModuleArena {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The parser control block (§4.1): the work unit spanning a main module and
/// all of its submodules, shared across all six phases of one compile.
pub struct ModuleContext {
    pub arena: ModuleArena,
    pub main: Module,
    pub submodules: Vec<Module>,
    next_nsid: u32,
    next_grpindex: u32,
}

impl ModuleContext {
    pub fn new(main: Module) -> Self {
        Self {
            arena: ModuleArena::new(),
            main,
            submodules: Vec::new(),
            next_nsid: 1,
            next_grpindex: 0,
        }
    }

    /// Assemble a context from an arena and nsid/grpindex counters already
    /// advanced by parsing the main module (and, possibly, its submodules)
    /// via [`crate::parser::consume_module`] directly, bypassing
    /// [`ModuleContext::new`]'s own fresh-arena allocation. Used by
    /// [`crate::compile_unit`], the only caller that must parse P2 before a
    /// `ModuleContext` exists to own the result.
    pub fn from_parts(main: Module, arena: ModuleArena, next_nsid: u32, next_grpindex: u32) -> Self {
        Self {
            arena,
            main,
            submodules: Vec::new(),
            next_nsid,
            next_grpindex,
        }
    }

    pub fn add_submodule(&mut self, submodule: Module) {
        self.submodules.push(submodule);
    }

    pub fn allocate_nsid(&mut self) -> u32 {
        let id = self.next_nsid;
        self.next_nsid += 1;
        id
    }

    pub fn allocate_grpindex(&mut self) -> u32 {
        let id = self.next_grpindex;
        self.next_grpindex += 1;
        id
    }

    /// All modules in this compilation unit: the main module followed by
    /// its submodules, in `include` order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        std::iter::once(&self.main).chain(self.submodules.iter())
    }

    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        std::iter::once(&mut self.main).chain(self.submodules.iter_mut())
    }

    /// `find_template_top` (§4.1): look up a top-level grouping by name in
    /// the named module — the main module itself, or one of its
    /// submodules, addressed by the `belongs-to`/module name actually
    /// being compiled. Does not search imported modules; callers resolving
    /// a prefixed `uses` go through [`ModuleContext::find_imp_grouping`]
    /// instead.
    pub fn find_template_top(&self, modname: &str, name: &str) -> Option<GroupingId> {
        let module = self.modules().find(|m| m.name == modname)?;
        module
            .groupings
            .iter()
            .copied()
            .find(|&id| self.arena.groupings[id].top && self.arena.groupings[id].name == name)
    }

    /// `find_imp_grouping` (§4.1): resolve a `uses prefix:name` reference
    /// where `prefix` names an imported module. The compiler core does not
    /// itself hold other modules' compiled arenas — multi-module linking is
    /// the caller's responsibility — so this only resolves unprefixed
    /// references (local groupings) and returns `None` for any prefix that
    /// isn't this compilation unit's own prefix, leaving prefixed
    /// cross-module lookups to whatever driver owns the module graph.
    pub fn find_imp_grouping(&self, prefix: Option<&str>, name: &str) -> Option<GroupingId> {
        match prefix {
            None => self.find_grouping_in_scope(&self.main.name, name),
            Some(p) if p == self.main.prefix => self.find_grouping_in_scope(&self.main.name, name),
            Some(_) => None,
        }
    }

    fn find_grouping_in_scope(&self, modname: &str, name: &str) -> Option<GroupingId> {
        self.find_template_top(modname, name).or_else(|| {
            self.arena
                .groupings
                .iter()
                .find(|(_, g)| g.name == name)
                .map(|(id, _)| id)
        })
    }
}

/// Staged deviations from deviation-only modules, keyed by the module name
/// they target (§4.6.1, §9 design notes: "a mailbox indexed by target
/// module name"). Owned by whatever drives compilation across more than
/// one module, and threaded into [`crate::compile_module`] so that
/// `transfer_my_deviations` can drain it once the targeted module's own
/// tree has been resolved.
#[derive(Debug, Default)]
pub struct DeviationMailbox {
    staged: std::collections::HashMap<String, Vec<Deviation>>,
}

impl DeviationMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a deviation declared in some other module, to be applied once
    /// `target_module` is compiled.
    pub fn stage(&mut self, target_module: impl Into<String>, deviation: Deviation) {
        self.staged.entry(target_module.into()).or_default().push(deviation);
    }

    /// `transfer_my_deviations` (§4.6.1): drain every deviation staged
    /// against `module_name`, handing ownership to the caller.
    pub fn drain_for(&mut self, module_name: &str) -> Vec<Deviation> {
        self.staged.remove(module_name).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;

    #[test]
    fn find_template_top_locates_registered_top_grouping() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let idx = ctx.allocate_grpindex();
        let mut grouping = Grouping::new("g", Location::new("m", 1, 1), idx);
        grouping.top = true;
        let id = ctx.arena.groupings.insert(grouping);
        ctx.main.groupings.push(id);

        let found = ctx.find_template_top("m", "g");
        assert_eq!(found, Some(id));
        assert!(ctx.find_template_top("m", "missing").is_none());
    }

    #[test]
    fn find_imp_grouping_resolves_unprefixed_local_reference() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let idx = ctx.allocate_grpindex();
        let grouping = Grouping::new("g", Location::new("m", 1, 1), idx);
        let id = ctx.arena.groupings.insert(grouping);
        ctx.main.groupings.push(id);

        assert_eq!(ctx.find_imp_grouping(None, "g"), Some(id));
        assert_eq!(ctx.find_imp_grouping(Some("other"), "g"), None);
    }

    #[test]
    fn mailbox_stages_and_drains_by_target_module() {
        let mut mailbox = DeviationMailbox::new();
        let deviation = Deviation {
            target_path: "/m:x".into(),
            resolved_target: None,
            deviates: vec![],
            location: Location::new("dev", 1, 1),
            declaring_module: "dev".into(),
        };
        mailbox.stage("m", deviation);
        assert!(mailbox.drain_for("other").is_empty());
        let drained = mailbox.drain_for("m");
        assert_eq!(drained.len(), 1);
        assert!(mailbox.drain_for("m").is_empty());
    }
}
