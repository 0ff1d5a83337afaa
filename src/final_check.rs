//! The final / XPath phase (P6, §4.7): runs once the tree is fully
//! expanded and deviated, doing the validation work that can only happen
//! against the finished shape — key/unique binding, cross-field checks that
//! need sibling context, XPath re-validation of clones, and leafref loop
//! detection.
//!
//! Grounded on the teacher's `models::validation::mod` final-pass shape:
//! one function per node kind, called from a single recursive walk, same
//! as [`crate::resolve::Resolver`]'s P3 walk but over the now-static tree.

use crate::arena::ObjectId;
use crate::config::CompilerConfig;
use crate::diagnostics::{CompileError, DiagnosticKind, Diagnostics};
use crate::module::ModuleContext;
use crate::object::{ObjectKind, ObjectPayload};
use crate::schema_path;
use crate::typedef::TypeSystem;
use crate::xpath::{ExprSource, SchemaNodeId, XPathEngine};

pub struct FinalChecker<'a> {
    ctx: &'a mut ModuleContext,
    diags: &'a mut Diagnostics,
    types: &'a dyn TypeSystem,
    xpath: &'a dyn XPathEngine,
    config: &'a CompilerConfig,
}

impl<'a> FinalChecker<'a> {
    pub fn new(ctx: &'a mut ModuleContext, diags: &'a mut Diagnostics, types: &'a dyn TypeSystem, xpath: &'a dyn XPathEngine, config: &'a CompilerConfig) -> Self {
        Self { ctx, diags, types, xpath, config }
    }

    #[tracing::instrument(skip_all)]
    pub fn run(&mut self) -> Result<(), CompileError> {
        let module_names: Vec<String> = self.ctx.modules().map(|m| m.name.clone()).collect();
        for name in &module_names {
            let top_ids: Vec<ObjectId> = self.ctx.modules().find(|m| m.name == *name).map(|m| m.datadefs.clone()).unwrap_or_default();
            for id in &top_ids {
                self.check_object(*id)?;
            }
        }
        self.check_unused_groupings(&module_names);
        self.check_leafref_loops();
        Ok(())
    }

    fn check_unused_groupings(&mut self, module_names: &[String]) {
        for name in module_names {
            let grouping_ids: Vec<_> = self.ctx.modules().find(|m| m.name == *name).map(|m| m.groupings.clone()).unwrap_or_default();
            for gid in grouping_ids {
                if !self.ctx.arena.groupings[gid].used {
                    let loc = self.ctx.arena.groupings[gid].location.clone();
                    let name = self.ctx.arena.groupings[gid].name.clone();
                    self.diags.push(loc, DiagnosticKind::StmtIgnored(format!("grouping '{name}' is never used")));
                }
            }
        }
    }

    fn check_object(&mut self, id: ObjectId) -> Result<(), CompileError> {
        self.validate_xpath(id);
        let kind = self.ctx.arena.objects[id].kind();
        match kind {
            ObjectKind::Anyxml => {
                self.check_top_level_mandatory(id);
            }
            ObjectKind::Container => {
                let children = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Container(c) => c.children.clone(),
                    _ => unreachable!(),
                };
                for child in children {
                    self.check_object(child)?;
                }
            }
            ObjectKind::List => {
                self.check_list_final(id);
                let children = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::List(l) => l.children.clone(),
                    _ => unreachable!(),
                };
                for child in children {
                    self.check_object(child)?;
                }
            }
            ObjectKind::Choice => {
                self.check_choice_final(id);
                let cases = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Choice(c) => c.cases.clone(),
                    _ => unreachable!(),
                };
                for case in cases {
                    self.check_object(case)?;
                }
            }
            ObjectKind::Case => {
                let children = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Case(c) => c.children.clone(),
                    _ => unreachable!(),
                };
                for child in children {
                    self.check_object(child)?;
                }
            }
            ObjectKind::Leaf => {
                self.check_leaf_final(id);
            }
            ObjectKind::LeafList => {
                self.check_leaf_list_final(id);
            }
            ObjectKind::Rpc => {
                let (input, output) = match &self.ctx.arena.objects[id].payload {
                    ObjectPayload::Rpc(r) => (r.input, r.output),
                    _ => unreachable!(),
                };
                if let Some(input) = input {
                    self.check_object(input)?;
                }
                if let Some(output) = output {
                    self.check_object(output)?;
                }
            }
            ObjectKind::Rpcio | ObjectKind::Notification => {
                let children = self.ctx.arena.objects[id].payload.children().map(|c| c.to_vec()).unwrap_or_default();
                for child in children {
                    self.check_object(child)?;
                }
            }
            ObjectKind::Uses | ObjectKind::Refine | ObjectKind::Augment => {
                // Not schema nodes by the time P6 runs; expanded uses are
                // removed from every datadefQ by P4, and augment/refine
                // objects never live in one to begin with.
            }
        }
        Ok(())
    }

    /// §4.7.1/4.7.2: a `mandatory` object sitting directly under the module
    /// root (no parent to make its presence conditional on anything but its
    /// own if-feature/when) must be flagged, since NETCONF clients cannot
    /// negotiate a value for it ahead of time. Resolved Open Question #3:
    /// the message always names whether the node is conditionally present,
    /// never the bare (potentially malformed) name alone.
    fn check_top_level_mandatory(&mut self, id: ObjectId) {
        let obj = &self.ctx.arena.objects[id];
        if !obj.flags.top || !obj.flags.mandatory {
            return;
        }
        let conditional = obj.when.is_some() || !obj.if_features.is_empty() || !obj.inherited_conditionals.is_empty();
        let message = if conditional {
            format!("(conditionally present) {}", obj.name)
        } else {
            obj.name.clone()
        };
        self.diags.push_with_severity(obj.location.clone(), DiagnosticKind::TopLevelMandatory(message), self.config.top_level_mandatory_severity);
    }

    fn check_leaf_final(&mut self, id: ObjectId) {
        let obj = &self.ctx.arena.objects[id];
        let default = match &obj.payload {
            ObjectPayload::Leaf(l) => l.default.clone(),
            _ => unreachable!(),
        };
        if default.is_some() && obj.flags.mandatory {
            self.diags.push(
                obj.location.clone(),
                DiagnosticKind::InvalidValue(format!("leaf '{}' cannot have both 'default' and 'mandatory true'", obj.name)),
            );
        }
        self.check_top_level_mandatory(id);
    }

    fn check_leaf_list_final(&mut self, id: ObjectId) {
        let obj = &self.ctx.arena.objects[id];
        let (min, max) = match &obj.payload {
            ObjectPayload::LeafList(l) => (l.min_elements, l.max_elements),
            _ => unreachable!(),
        };
        if let Some(max) = max {
            if min > max {
                self.diags.push(
                    obj.location.clone(),
                    DiagnosticKind::InvalidValue(format!("leaf-list '{}': min-elements {min} exceeds max-elements {max}", obj.name)),
                );
            }
        }
    }

    /// §4.7.4: resolve the key string and each unique expression into
    /// sequences of direct-child leaf targets, checking index-capability,
    /// mandatoriness, and config agreement along the way.
    fn check_list_final(&mut self, id: ObjectId) {
        let loc = self.ctx.arena.objects[id].location.clone();
        let list_name = self.ctx.arena.objects[id].name.clone();
        let list_config = self.ctx.arena.objects[id].flags.config;
        let (children, key_str, unique_strs) = match &self.ctx.arena.objects[id].payload {
            ObjectPayload::List(l) => (l.children.clone(), l.key_str.clone(), l.unique_strs.clone()),
            _ => unreachable!(),
        };

        let mut keys = Vec::new();
        if let Some(key_str) = &key_str {
            let mut seen_names = Vec::new();
            for part in key_str.split_whitespace() {
                if seen_names.contains(&part) {
                    self.diags.push(loc.clone(), DiagnosticKind::DupEntry(format!("key '{part}' in list '{list_name}'")));
                    continue;
                }
                seen_names.push(part);
                let Some(leaf) = children.iter().copied().find(|&c| self.ctx.arena.objects[c].name == part) else {
                    self.diags.push(loc.clone(), DiagnosticKind::MissingRefTarget(format!("key '{part}' in list '{list_name}'")));
                    continue;
                };
                if !self.validate_index_leaf(leaf, part, &loc, list_config) {
                    continue;
                }
                self.ctx.arena.objects[leaf].flags.key = true;
                keys.push(leaf);
            }
        }
        if let ObjectPayload::List(l) = &mut self.ctx.arena.objects[id].payload {
            l.keys = keys;
        }

        let mut uniques = Vec::new();
        for unique_str in &unique_strs {
            let mut parts = Vec::new();
            let mut ok = true;
            let mut first_config = None;
            for token in unique_str.split_whitespace() {
                let Ok(parsed) = SchemaNodeId::parse(token) else {
                    self.diags.push(loc.clone(), DiagnosticKind::InvalidValue(format!("malformed unique component '{token}' on list '{list_name}'")));
                    ok = false;
                    continue;
                };
                let Some(leaf) = schema_path::resolve(self.ctx, &parsed, &children) else {
                    self.diags.push(loc.clone(), DiagnosticKind::MissingRefTarget(format!("unique component '{token}' on list '{list_name}'")));
                    ok = false;
                    continue;
                };
                if self.ctx.arena.objects[leaf].kind() != ObjectKind::Leaf {
                    self.diags.push(loc.clone(), DiagnosticKind::WrongIndexType(format!("unique component '{token}' on list '{list_name}'")));
                    ok = false;
                    continue;
                }
                let leaf_config = self.ctx.arena.objects[leaf].flags.config;
                match first_config {
                    None => first_config = Some(leaf_config),
                    Some(fc) if fc != leaf_config => {
                        self.diags.push(
                            loc.clone(),
                            DiagnosticKind::InvalidConditional(format!("unique components of list '{list_name}' do not all share the same config flag")),
                        );
                        ok = false;
                    }
                    _ => {}
                }
                self.ctx.arena.objects[leaf].flags.unique = true;
                parts.push(leaf);
            }
            if ok {
                uniques.push(parts);
            }
        }
        if let ObjectPayload::List(l) = &mut self.ctx.arena.objects[id].payload {
            l.uniques = uniques;
        }

        self.check_conditional_mismatch(id, list_config);
    }

    /// One key leaf's structural validity: must be a direct child (checked
    /// by the caller's `children` search), of an index-capable base type,
    /// not explicitly `mandatory false`, with its own config flag matching
    /// the list's.
    fn validate_index_leaf(&mut self, leaf: ObjectId, name: &str, loc: &crate::location::Location, list_config: bool) -> bool {
        if self.ctx.arena.objects[leaf].kind() != ObjectKind::Leaf {
            self.diags.push(loc.clone(), DiagnosticKind::WrongIndexType(format!("key '{name}' is not a leaf")));
            return false;
        }
        let (base, base_ok) = match &self.ctx.arena.objects[leaf].payload {
            ObjectPayload::Leaf(l) => match &l.type_def {
                Some(t) => (Some(t.base), self.types.ok_for_index(t.base)),
                None => (None, true),
            },
            _ => unreachable!(),
        };
        if let Some(base) = base {
            if !base_ok {
                self.diags.push(loc.clone(), DiagnosticKind::TypeNotIndex(format!("{base}' used as key '{name}")));
                return false;
            }
        }
        let obj = &self.ctx.arena.objects[leaf];
        if obj.flags.mandatory_set && !obj.flags.mandatory {
            self.diags.push(loc.clone(), DiagnosticKind::InvalidValue(format!("key leaf '{name}' may not be 'mandatory false'")));
            return false;
        }
        if obj.flags.config != list_config {
            self.diags.push(loc.clone(), DiagnosticKind::InvalidConditional(format!("key leaf '{name}' config does not match its list")));
            return false;
        }
        true
    }

    /// §4.7.8: a key or unique leaf may not introduce a conditional
    /// (if-feature/when) absent from the list itself, since that would let
    /// an instance satisfy the list's own schema while failing to carry one
    /// of its keys. Error for keys, warning (via default severity) for
    /// unique components.
    fn check_conditional_mismatch(&mut self, list_id: ObjectId, _list_config: bool) {
        let loc = self.ctx.arena.objects[list_id].location.clone();
        let list_conditional = self.ctx.arena.objects[list_id].when.is_some() || !self.ctx.arena.objects[list_id].if_features.is_empty();
        let (keys, uniques) = match &self.ctx.arena.objects[list_id].payload {
            ObjectPayload::List(l) => (l.keys.clone(), l.uniques.clone()),
            _ => unreachable!(),
        };
        for key in keys {
            let has_own_conditional = self.ctx.arena.objects[key].when.is_some() || !self.ctx.arena.objects[key].if_features.is_empty();
            if has_own_conditional && !list_conditional {
                let name = self.ctx.arena.objects[key].name.clone();
                self.diags.push(loc.clone(), DiagnosticKind::UniqueConditionalMismatch(format!("key '{name}'")));
            }
        }
        for part in uniques.into_iter().flatten() {
            let has_own_conditional = self.ctx.arena.objects[part].when.is_some() || !self.ctx.arena.objects[part].if_features.is_empty();
            if has_own_conditional && !list_conditional {
                let name = self.ctx.arena.objects[part].name.clone();
                self.diags.push_with_severity(loc.clone(), DiagnosticKind::UniqueConditionalMismatch(format!("unique part '{name}'")), crate::diagnostics::Severity::Warning);
            }
        }
    }

    /// §4.7.5: a choice may not be both `mandatory true` and carry a
    /// `default`; a stated default must name a case whose own body has no
    /// mandatory data.
    fn check_choice_final(&mut self, id: ObjectId) {
        let obj = &self.ctx.arena.objects[id];
        let (default_case, cases) = match &obj.payload {
            ObjectPayload::Choice(c) => (c.default_case.clone(), c.cases.clone()),
            _ => unreachable!(),
        };
        if let Some(default_case) = &default_case {
            if obj.flags.mandatory {
                self.diags.push(
                    obj.location.clone(),
                    DiagnosticKind::InvalidValue(format!("choice '{}' cannot have both 'default' and 'mandatory true'", obj.name)),
                );
            }
            let Some(&case_id) = cases.iter().find(|&&c| self.ctx.arena.objects[c].name == *default_case) else {
                self.diags.push(obj.location.clone(), DiagnosticKind::DefchoiceNotOptional(default_case.clone()));
                return;
            };
            let case_children = match &self.ctx.arena.objects[case_id].payload {
                ObjectPayload::Case(c) => c.children.clone(),
                _ => unreachable!(),
            };
            if case_children.iter().any(|&c| self.ctx.arena.objects[c].flags.mandatory) {
                self.diags.push(obj.location.clone(), DiagnosticKind::DefchoiceNotOptional(default_case.clone()));
            }
        }
        self.check_top_level_mandatory(id);
    }

    /// §4.7.7: re-validate `must`/`when` on every clone whose PCB is a bare
    /// (unexpanded) copy of its source's, and resolve/record the target of
    /// any leafref type.
    fn validate_xpath(&mut self, id: ObjectId) {
        let is_clone = self.ctx.arena.objects[id].is_clone();
        if is_clone {
            let must: Vec<_> = self.ctx.arena.objects[id].must.clone();
            let mut revalidated = Vec::with_capacity(must.len());
            for pcb in must {
                let pcb = if pcb.resolved_target.is_none() { self.xpath.clone_pcb(&pcb) } else { pcb };
                let _ = self.xpath.validate_expr(&pcb, id);
                revalidated.push(pcb);
            }
            self.ctx.arena.objects[id].must = revalidated;

            if let Some(when) = self.ctx.arena.objects[id].when.clone() {
                let when = if when.resolved_target.is_none() { self.xpath.clone_pcb(&when) } else { when };
                let _ = self.xpath.validate_expr(&when, id);
                self.ctx.arena.objects[id].when = Some(when);
            }
        } else {
            let must: Vec<_> = self.ctx.arena.objects[id].must.clone();
            for pcb in &must {
                let _ = self.xpath.validate_expr(pcb, id);
            }
            if let Some(when) = self.ctx.arena.objects[id].when.clone() {
                let _ = self.xpath.validate_expr(&when, id);
            }
        }
        let _ = ExprSource::Must;

        if let ObjectKind::Leaf = self.ctx.arena.objects[id].kind() {
            let leafref_path = match &self.ctx.arena.objects[id].payload {
                ObjectPayload::Leaf(l) => l.type_def.as_ref().and_then(|t| t.leafref_path.clone()),
                _ => None,
            };
            if let Some(pcb) = leafref_path {
                let Ok(parsed) = SchemaNodeId::parse(&pcb.expr) else { return };
                if let Some(target) = schema_path::resolve(self.ctx, &parsed, &[]) {
                    let mut resolved_pcb = pcb;
                    resolved_pcb.resolved_target = Some(target);
                    if let ObjectPayload::Leaf(l) = &mut self.ctx.arena.objects[id].payload {
                        if let Some(t) = &mut l.type_def {
                            t.leafref_path = Some(resolved_pcb);
                        }
                    }
                }
            }
        }
    }

    /// §4.7.9: walk `leafref → target → leafref → …`, rejecting any chain
    /// that revisits a leaf it has already passed through.
    fn check_leafref_loops(&mut self) {
        let leaf_ids: Vec<ObjectId> = self
            .ctx
            .arena
            .objects
            .iter()
            .filter(|(_, o)| o.kind() == ObjectKind::Leaf)
            .map(|(id, _)| id)
            .collect();

        for start in leaf_ids {
            let mut visited = vec![start];
            let mut current = start;
            loop {
                let next = match &self.ctx.arena.objects[current].payload {
                    ObjectPayload::Leaf(l) => l.type_def.as_ref().and_then(|t| t.leafref_path.as_ref()).and_then(|p| p.resolved_target),
                    _ => None,
                };
                let Some(next) = next else { break };
                if next == start {
                    let path_name = self.ctx.arena.objects[start].name.clone();
                    let revisited_name = self.ctx.arena.objects[current].name.clone();
                    self.diags.push(
                        self.ctx.arena.objects[start].location.clone(),
                        DiagnosticKind::LeafrefLoop { path: path_name, revisited: revisited_name },
                    );
                    break;
                }
                if visited.contains(&next) {
                    break;
                }
                visited.push(next);
                current = next;
            }
        }
    }
}

/// Entry point used by [`crate::compile_module`]: run the final/XPath phase
/// over every module in `ctx` (§4.7).
#[tracing::instrument(skip_all)]
pub fn run_final_checks(ctx: &mut ModuleContext, diags: &mut Diagnostics, types: &dyn TypeSystem, xpath: &dyn XPathEngine, config: &CompilerConfig) -> Result<(), CompileError> {
    let mut checker = FinalChecker::new(ctx, diags, types, xpath, config);
    checker.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::module::Module;
    use crate::object::{ListPayload, LeafPayload, SchemaObject};
    use crate::typedef::{BaseType, BuiltinTypeSystem, TypeDef};
    use crate::xpath::SchemaPathResolver;

    #[test]
    fn list_final_resolves_keys_and_rejects_duplicates() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let mut key_leaf = SchemaObject::new("name", ObjectPayload::Leaf(LeafPayload { type_def: Some(TypeDef::new(BaseType::String)), ..Default::default() }), Location::new("m", 2, 1));
        key_leaf.flags.config = true;
        let key_id = ctx.arena.objects.insert(key_leaf);
        let list_id = ctx.arena.objects.insert(SchemaObject::new(
            "entries",
            ObjectPayload::List(ListPayload { children: vec![key_id], key_str: Some("name name".into()), ..Default::default() }),
            Location::new("m", 1, 1),
        ));
        ctx.arena.objects[list_id].flags.config = true;
        ctx.main.datadefs.push(list_id);

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        let xpath = SchemaPathResolver;
        let config = CompilerConfig::default();
        run_final_checks(&mut ctx, &mut diags, &types, &xpath, &config).unwrap();

        assert!(diags.has_errors());
        let ObjectPayload::List(l) = &ctx.arena.objects[list_id].payload else { panic!() };
        assert_eq!(l.keys.len(), 1);
        assert!(ctx.arena.objects[key_id].flags.key);
    }

    #[test]
    fn leafref_loop_between_two_leaves_is_detected() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let a_id = ctx.arena.objects.insert(SchemaObject::new("a", ObjectPayload::Leaf(LeafPayload::default()), Location::new("m", 1, 1)));
        let b_id = ctx.arena.objects.insert(SchemaObject::new("b", ObjectPayload::Leaf(LeafPayload::default()), Location::new("m", 2, 1)));

        if let ObjectPayload::Leaf(l) = &mut ctx.arena.objects[a_id].payload {
            let mut td = TypeDef::leafref(crate::xpath::Pcb::new("/m:b"));
            td.leafref_path.as_mut().unwrap().resolved_target = Some(b_id);
            l.type_def = Some(td);
        }
        if let ObjectPayload::Leaf(l) = &mut ctx.arena.objects[b_id].payload {
            let mut td = TypeDef::leafref(crate::xpath::Pcb::new("/m:a"));
            td.leafref_path.as_mut().unwrap().resolved_target = Some(a_id);
            l.type_def = Some(td);
        }
        ctx.main.datadefs.push(a_id);
        ctx.main.datadefs.push(b_id);

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        let xpath = SchemaPathResolver;
        let config = CompilerConfig::default();
        run_final_checks(&mut ctx, &mut diags, &types, &xpath, &config).unwrap();

        assert!(diags.has_errors());
    }
}
