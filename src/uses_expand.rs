//! The uses expander (P4, §4.4): `resolve_uses` runs the pre-expansion
//! checks during P3's object walk (grouping lookup, nesting-loop detection,
//! refine-target resolution and applicability), and `expand_uses_in`
//! performs the clone-and-splice expansion proper once every object in the
//! tree has been resolved.
//!
//! Grounded on the teacher's `walk_all_*` phase-function style
//! (`models::validation::mod`) for the pre-check pass, and its tagged-clone
//! fabrication in `json::schema::build::Builder` (copy the static shape,
//! rewrite the handful of fields that differ per instantiation site) for
//! expansion proper.

use crate::arena::{GroupingId, ObjectId};
use crate::diagnostics::{CompileError, DiagnosticKind, Diagnostics};
use crate::module::ModuleContext;
use crate::object::{ObjectKind, ObjectPayload, SchemaObject, Status};
use crate::schema_path;
use crate::typedef::TypeSystem;
use crate::xpath::SchemaNodeId;

/// Sub-statements a `refine` may carry per target kind (§4.4.1's table).
/// `case` allows none besides description/reference, which `RefinePayload`
/// doesn't even model, so its entry is empty.
fn allowed_refine_fields(kind: ObjectKind) -> &'static [&'static str] {
    match kind {
        ObjectKind::Leaf => &["config", "mandatory", "must", "default"],
        ObjectKind::Anyxml => &["mandatory"],
        ObjectKind::LeafList => &["config", "must", "min-elements", "max-elements"],
        ObjectKind::Container => &["must", "presence", "config"],
        ObjectKind::List => &["must", "config", "min-elements", "max-elements"],
        ObjectKind::Choice => &["default", "mandatory"],
        _ => &[],
    }
}

/// `resolve_uses` (§4.4.1): the pre-expansion checks run for every `uses`
/// object as part of P3's tree walk. `enclosing` is the stack of grouping
/// templates the uses object's containing chain currently walks through
/// (innermost last); used for nesting-loop detection.
pub fn resolve_uses(
    ctx: &mut ModuleContext,
    diags: &mut Diagnostics,
    types: &dyn TypeSystem,
    id: ObjectId,
    enclosing: &[GroupingId],
) -> Result<(), CompileError> {
    // §4.4.3: obsolete uses are skipped entirely, no lookups at all.
    if ctx.arena.objects[id].status == Status::Obsolete {
        return Ok(());
    }

    let loc = ctx.arena.objects[id].location.clone();
    let (prefix, name, refines, augments) = match &ctx.arena.objects[id].payload {
        ObjectPayload::Uses(u) => (u.grouping_prefix.clone(), u.grouping_name.clone(), u.refines.clone(), u.augments.clone()),
        _ => unreachable!(),
    };

    // Step 1: look up the grouping (local scope, then module scope, then
    // imported — all folded into `find_imp_grouping`'s own search order).
    let Some(grouping_id) = ctx.find_imp_grouping(prefix.as_deref(), &name) else {
        diags.push(loc, DiagnosticKind::DefNotFound(format!("grouping '{name}'")));
        return Ok(());
    };

    // Step 2: mark used, check nesting loops.
    ctx.arena.groupings[grouping_id].used = true;
    if enclosing.contains(&grouping_id) {
        diags.push(
            loc,
            DiagnosticKind::InvalidValue(format!("grouping '{name}' cannot use itself (nesting loop)")),
        );
        if let ObjectPayload::Uses(u) = &mut ctx.arena.objects[id].payload {
            u.grouping = None;
        }
        return Ok(());
    }
    if let ObjectPayload::Uses(u) = &mut ctx.arena.objects[id].payload {
        u.grouping = Some(grouping_id);
    }

    // Step 3: resolve the uses's own augment children (syntax only — full
    // splicing happens in P5 once the grouping has actually been expanded
    // into this uses's parent).
    for &aug_id in &augments {
        ctx.arena.objects[aug_id].parent = Some(id);
        let target_path = match &ctx.arena.objects[aug_id].payload {
            ObjectPayload::Augment(a) => a.target_path.clone(),
            _ => unreachable!(),
        };
        if let Err(e) = SchemaNodeId::parse(&target_path) {
            diags.push(
                ctx.arena.objects[aug_id].location.clone(),
                DiagnosticKind::InvalidAugTarget(format!("{target_path}: {e}")),
            );
        }
    }

    // Steps 4-7: walk the refines, resolve each against the grouping's own
    // (unexpanded) body, check applicability, validate defaults, and merge
    // refines sharing the same target.
    let grouping_body = ctx.arena.groupings[grouping_id].datadefs.clone();
    let mut merged: Vec<(ObjectId, Vec<&'static str>)> = Vec::new();
    for &refine_id in &refines {
        let (target_path, refine_loc) = {
            let obj = &ctx.arena.objects[refine_id];
            (match &obj.payload {
                ObjectPayload::Refine(r) => r.target_path.clone(),
                _ => unreachable!(),
            }, obj.location.clone())
        };
        let Ok(parsed) = SchemaNodeId::parse(&target_path) else {
            diags.push(refine_loc, DiagnosticKind::MissingRefTarget(target_path));
            continue;
        };
        let Some(target) = schema_path::resolve(ctx, &parsed, &grouping_body) else {
            diags.push(refine_loc, DiagnosticKind::MissingRefTarget(target_path));
            continue;
        };
        if let ObjectPayload::Refine(r) = &mut ctx.arena.objects[refine_id].payload {
            r.resolved_target = Some(target);
        }

        let target_kind = ctx.arena.objects[target].kind();
        let allowed = allowed_refine_fields(target_kind);
        let present = present_refine_fields(ctx, refine_id);
        for field in &present {
            if !allowed.contains(field) {
                diags.push(
                    refine_loc.clone(),
                    DiagnosticKind::RefineNotAllowed {
                        sub_statement: field.to_string(),
                        target_kind: target_kind.as_str().to_string(),
                    },
                );
            }
        }

        // Validate a refined default against the target's type (leaf) or
        // against a case name (choice).
        if let ObjectPayload::Refine(r) = &ctx.arena.objects[refine_id].payload.clone() {
            if let Some(default) = &r.default {
                match &ctx.arena.objects[target].payload {
                    ObjectPayload::Leaf(l) => {
                        if let Some(type_def) = &l.type_def {
                            if !types.default_matches_type(type_def, default) {
                                diags.push(
                                    refine_loc.clone(),
                                    DiagnosticKind::WrongType(format!("refined default '{default}' does not match leaf's type")),
                                );
                            }
                        }
                    }
                    ObjectPayload::Choice(c) => {
                        let case_exists = c.cases.iter().any(|&cid| ctx.arena.objects[cid].name == *default);
                        if !case_exists {
                            diags.push(
                                refine_loc.clone(),
                                DiagnosticKind::DefchoiceNotOptional(default.clone()),
                            );
                        }
                    }
                    _ => {}
                }
            }
        }

        match merged.iter_mut().find(|(t, _)| *t == target) {
            Some((_, seen_fields)) => {
                for field in &present {
                    if seen_fields.contains(field) {
                        diags.push(refine_loc.clone(), DiagnosticKind::DupRefineStmt(field.to_string()));
                    } else {
                        seen_fields.push(field);
                    }
                }
            }
            None => merged.push((target, present)),
        }
    }

    Ok(())
}

/// Which of a refine's optional clauses are actually present, by name, for
/// applicability-table checking and duplicate-merge detection.
fn present_refine_fields(ctx: &ModuleContext, refine_id: ObjectId) -> Vec<&'static str> {
    let ObjectPayload::Refine(r) = &ctx.arena.objects[refine_id].payload else {
        unreachable!()
    };
    let mut fields = Vec::new();
    if r.config.is_some() {
        fields.push("config");
    }
    if r.mandatory.is_some() {
        fields.push("mandatory");
    }
    if r.presence.is_some() {
        fields.push("presence");
    }
    if r.default.is_some() {
        fields.push("default");
    }
    if !r.must.is_empty() {
        fields.push("must");
    }
    if r.min_elements.is_some() {
        fields.push("min-elements");
    }
    if r.max_elements.is_some() {
        fields.push("max-elements");
    }
    fields
}

/// Apply a refine's clauses onto a freshly-cloned object (part of expansion
/// proper, §4.4.2's "refinements are applied during clone fabrication").
fn apply_refines(ctx: &mut ModuleContext, refines: &[ObjectId], source: ObjectId, clone: ObjectId) {
    for &refine_id in refines {
        let ObjectPayload::Refine(r) = ctx.arena.objects[refine_id].payload.clone() else {
            unreachable!()
        };
        if r.resolved_target != Some(source) {
            continue;
        }
        if let Some(config) = r.config {
            ctx.arena.objects[clone].flags.config = config;
            ctx.arena.objects[clone].flags.config_set = true;
        }
        if let Some(mandatory) = r.mandatory {
            ctx.arena.objects[clone].flags.mandatory = mandatory;
            ctx.arena.objects[clone].flags.mandatory_set = true;
        }
        if !r.must.is_empty() {
            ctx.arena.objects[clone].must.extend(r.must.clone());
        }
        match &mut ctx.arena.objects[clone].payload {
            ObjectPayload::Container(c) => {
                if let Some(presence) = &r.presence {
                    c.presence = Some(presence.clone());
                }
            }
            ObjectPayload::Leaf(l) => {
                if let Some(default) = &r.default {
                    l.default = Some(default.clone());
                }
            }
            ObjectPayload::Choice(c) => {
                if let Some(default) = &r.default {
                    c.default_case = Some(default.clone());
                }
            }
            ObjectPayload::List(list) => {
                if let Some(min) = r.min_elements {
                    list.min_elements = min;
                }
                if let Some(max) = r.max_elements {
                    list.max_elements = Some(max);
                }
            }
            ObjectPayload::LeafList(ll) => {
                if let Some(min) = r.min_elements {
                    ll.min_elements = min;
                }
                if let Some(max) = r.max_elements {
                    ll.max_elements = Some(max);
                }
            }
            _ => {}
        }
    }
}

/// Clone `source` into a new arena slot with minimal copied data, following
/// the shared clone-fabrication shape used by both uses-expansion (§4.4.2.b)
/// and augment-expansion (§4.5's `augclone`): same payload and static
/// fields, fresh parent/usesobj/augobj linkage, config flag recomputed
/// unless explicitly set on the source.
pub(crate) fn clone_object(ctx: &mut ModuleContext, source: ObjectId, parent: Option<ObjectId>, effective_config: bool) -> ObjectId {
    let mut clone: SchemaObject = ctx.arena.objects[source].clone();
    clone.parent = parent;
    clone.usesobj = None;
    clone.augobj = None;
    clone.inherited_conditionals = Vec::new();
    if !clone.flags.config_set {
        clone.flags.config = effective_config;
    }
    // A cloned container/list/case/choice/rpcio/notification's own children
    // are themselves re-cloned recursively by the caller before being
    // attached here; start the clone with an empty child queue so the
    // caller controls fan-out order (uses vs. augment expand children
    // differently: uses clones the whole subtree up front, augment only
    // clones the top-level child being spliced in and leaves its
    // descendants to be found by a later pass over the same grouping/target).
    ctx.arena.objects.insert(clone)
}

/// Recursively clone an entire subtree rooted at `source` (§4.4.2.b: a
/// grouping's top-level child may itself be a container with children,
/// and the whole subtree must be duplicated, not just the top node).
pub(crate) fn clone_subtree(ctx: &mut ModuleContext, source: ObjectId, parent: Option<ObjectId>, effective_config: bool) -> ObjectId {
    let clone = clone_object(ctx, source, parent, effective_config);
    let child_ids: Vec<ObjectId> = ctx.arena.objects[source]
        .payload
        .children()
        .map(|c| c.to_vec())
        .unwrap_or_default();
    if !child_ids.is_empty() {
        let clone_config = ctx.arena.objects[clone].flags.config;
        let mut new_children = Vec::with_capacity(child_ids.len());
        for child in child_ids {
            new_children.push(clone_subtree(ctx, child, Some(clone), clone_config));
        }
        if let Some(children) = ctx.arena.objects[clone].payload.children_mut() {
            *children = new_children;
        }
    }
    clone
}

/// Propagate inherited conditionals by reference, not by value (§4.4.2.d,
/// §9 "Shared inherited conditionals"): every if-feature/when-bearing
/// ancestor from the uses/augment U up to the root of U's own containing
/// scope gets one entry appended to the clone's own inherited list, as an
/// `ObjectId` back-reference rather than a copy of the expression.
///
/// `U` itself is always included first (its own if-feature/when, if any).
/// Beyond that, `U`'s enclosing `choice`/`case` ancestors matter too: a
/// `uses` (or `augment`) statement sitting inside `choice c { case x {
/// uses g; } }` makes every clone of `g`'s body conditionally present on
/// `c`'s own if-feature/when, even though `c` and `x` stay in the tree
/// (the clone's real `.parent` still points at `x`) — nothing downstream
/// re-derives a conditional by walking an object's real ancestor chain,
/// so the only way `c`'s if-feature reaches the clone at all is by
/// copying it in here, same as `U`'s own conditional.
pub(crate) fn propagate_inherited(ctx: &mut ModuleContext, owner: ObjectId, clone: ObjectId) {
    let mut chain = ctx.arena.objects[owner].inherited_conditionals.clone();
    if ctx.arena.objects[owner].when.is_some() || !ctx.arena.objects[owner].if_features.is_empty() {
        chain.push(owner);
    }

    let mut cursor = ctx.arena.objects[owner].parent;
    while let Some(anc) = cursor {
        let anc_obj = &ctx.arena.objects[anc];
        if matches!(anc_obj.kind(), ObjectKind::Choice | ObjectKind::Case) && (anc_obj.when.is_some() || !anc_obj.if_features.is_empty()) {
            chain.push(anc);
        }
        cursor = anc_obj.parent;
    }

    ctx.arena.objects[clone].inherited_conditionals.extend(chain);
}

/// Expand every `uses` directly inside `queue` (§4.4.2), mutating it in
/// place: each expanded uses is replaced by its grouping body's top-level
/// children, inserted just before the uses's own former position, and the
/// uses itself is then removed from `queue` (§3.1: `uses` "eliminated after
/// P4 but retained for traceability" — the arena slot itself is never
/// freed, and every clone it produced still carries a `usesobj`
/// back-reference to it, which is what "traceability" means here).
///
/// `max_depth` guards nested `uses` (a grouping whose body itself contains
/// `uses`) against runaway recursion (§4.4.1 step 2's loop detection covers
/// direct self-reference; this bounds indirect cycles the identity check
/// can't see, e.g. A uses B, B uses A).
pub fn expand_uses_in(
    ctx: &mut ModuleContext,
    diags: &mut Diagnostics,
    parent: Option<ObjectId>,
    queue: &mut Vec<ObjectId>,
    max_depth: usize,
    depth: usize,
) -> Result<(), CompileError> {
    if depth > max_depth {
        return Err(CompileError::UsesDepthExceeded(max_depth));
    }

    let mut i = 0;
    while i < queue.len() {
        let id = queue[i];
        if ctx.arena.objects[id].kind() != ObjectKind::Uses || ctx.arena.objects[id].status == Status::Obsolete {
            i += 1;
            continue;
        }

        let (grouping_id, refines, uses_augments) = match &ctx.arena.objects[id].payload {
            ObjectPayload::Uses(u) => (u.grouping, u.refines.clone(), u.augments.clone()),
            _ => unreachable!(),
        };
        let Some(grouping_id) = grouping_id else {
            // Grouping lookup failed or a nesting loop cleared it in P3;
            // the diagnostic was already raised there.
            i += 1;
            continue;
        };

        // Step 1: expand the grouping's own body first, so nested `uses`
        // are already flattened before we clone from it.
        if !ctx.arena.groupings[grouping_id].expand_done {
            // The grouping's own body is a template, not yet attached
            // anywhere in the final tree, so its self-expansion pass has
            // no real parent to record — only the deep copy made below for
            // *this* uses site gets a concrete parent.
            let mut body = ctx.arena.groupings[grouping_id].datadefs.clone();
            expand_uses_in(ctx, diags, None, &mut body, max_depth, depth + 1)?;
            ctx.arena.groupings[grouping_id].datadefs = body;
            ctx.arena.groupings[grouping_id].expand_done = true;
        }

        let effective_config = ctx.arena.objects[id].flags.config;
        let body = ctx.arena.groupings[grouping_id].datadefs.clone();
        let top_children: Vec<ObjectId> = body
            .into_iter()
            .filter(|&c| {
                !matches!(
                    ctx.arena.objects[c].kind(),
                    ObjectKind::Uses | ObjectKind::Augment | ObjectKind::Refine
                )
            })
            .collect();

        let mut inserted = Vec::with_capacity(top_children.len());
        for &child in &top_children {
            let child_name = ctx.arena.objects[child].name.clone();
            if queue.iter().any(|&q| q != id && ctx.arena.objects[q].name == child_name) {
                diags.push(
                    ctx.arena.objects[id].location.clone(),
                    DiagnosticKind::DupEntry(child_name),
                );
                continue;
            }
            let clone = clone_subtree(ctx, child, parent, effective_config);
            apply_refines(ctx, &refines, child, clone);
            propagate_inherited(ctx, id, clone);
            ctx.arena.objects[clone].usesobj = Some(id);
            inserted.push(clone);
        }

        queue.splice(i..i, inserted.iter().copied());
        i += inserted.len();

        // Step 3: expand this uses's own nested augments against the
        // just-spliced body (the uses's target scope).
        for &aug_id in &uses_augments {
            crate::augment::expand_augment(ctx, diags, aug_id, queue.as_slice())?;
        }

        // The uses statement itself is not a schema node (§3.1); once its
        // effect has been spliced into the parent's queue it is dropped
        // from the queue entirely rather than left as a dead marker. The
        // object stays alive in the arena (handles are never freed) since
        // every clone it produced still carries a `usesobj` back-reference
        // to it.
        queue.remove(i);
    }
    Ok(())
}

/// Whole-tree P4 entry point used by [`crate::compile_module`]:
/// `expand_uses_in` only flattens the `uses` statements directly inside one
/// queue, so this walks every module's top-level datadefQ and then every
/// nested container/list/case/choice/rpcio/notification/rpc queue beneath
/// it, in source order, calling `expand_uses_in` at each level.
#[tracing::instrument(skip_all)]
pub fn expand_all_uses(ctx: &mut ModuleContext, diags: &mut Diagnostics, max_depth: usize) -> Result<(), CompileError> {
    let module_names: Vec<String> = ctx.modules().map(|m| m.name.clone()).collect();
    for name in module_names {
        let mut queue = ctx
            .modules()
            .find(|m| m.name == name)
            .map(|m| m.datadefs.clone())
            .unwrap_or_default();
        expand_uses_in(ctx, diags, None, &mut queue, max_depth, 0)?;
        expand_uses_in_children(ctx, diags, &queue, max_depth)?;
        if let Some(module) = ctx.modules_mut().find(|m| m.name == name) {
            module.datadefs = queue;
        }
    }
    Ok(())
}

/// Recurse into every object in `ids` that owns a nested datadefQ (or, for
/// `rpc`, its synthetic input/output), expanding `uses` one level down.
fn expand_uses_in_children(ctx: &mut ModuleContext, diags: &mut Diagnostics, ids: &[ObjectId], max_depth: usize) -> Result<(), CompileError> {
    for &id in ids {
        if ctx.arena.objects[id].kind() == ObjectKind::Rpc {
            let (input, output) = match &ctx.arena.objects[id].payload {
                ObjectPayload::Rpc(r) => (r.input, r.output),
                _ => unreachable!(),
            };
            if let Some(input) = input {
                expand_uses_in_subtree(ctx, diags, input, max_depth)?;
            }
            if let Some(output) = output {
                expand_uses_in_subtree(ctx, diags, output, max_depth)?;
            }
        } else if ctx.arena.objects[id].payload.children().is_some() {
            expand_uses_in_subtree(ctx, diags, id, max_depth)?;
        }
    }
    Ok(())
}

fn expand_uses_in_subtree(ctx: &mut ModuleContext, diags: &mut Diagnostics, id: ObjectId, max_depth: usize) -> Result<(), CompileError> {
    let mut queue = ctx.arena.objects[id].payload.children().map(|c| c.to_vec()).unwrap_or_default();
    expand_uses_in(ctx, diags, Some(id), &mut queue, max_depth, 0)?;
    expand_uses_in_children(ctx, diags, &queue, max_depth)?;
    if let Some(children) = ctx.arena.objects[id].payload.children_mut() {
        *children = queue;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::location::Location;
    use crate::module::Module;
    use crate::object::{ContainerPayload, LeafPayload, RefinePayload, UsesPayload};
    use crate::typedef::BuiltinTypeSystem;

    fn new_grouping(ctx: &mut ModuleContext, name: &str) -> GroupingId {
        let idx = ctx.allocate_grpindex();
        let grouping = crate::grouping::Grouping::new(name, Location::new("m", 1, 1), idx);
        let gid = ctx.arena.groupings.insert(grouping);
        ctx.main.groupings.push(gid);
        gid
    }

    #[test]
    fn resolve_uses_marks_grouping_used_and_resolves_refine_target() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let gid = new_grouping(&mut ctx, "g");
        let leaf_id = ctx.arena.objects.insert(SchemaObject::new(
            "x",
            ObjectPayload::Leaf(LeafPayload::default()),
            Location::new("m", 2, 1),
        ));
        ctx.arena.groupings[gid].datadefs.push(leaf_id);

        let refine_id = ctx.arena.objects.insert(SchemaObject::new(
            "x",
            ObjectPayload::Refine(RefinePayload { target_path: "x".into(), mandatory: Some(true), ..Default::default() }),
            Location::new("m", 3, 1),
        ));
        let uses_id = ctx.arena.objects.insert(SchemaObject::new(
            "g",
            ObjectPayload::Uses(UsesPayload { grouping_prefix: None, grouping_name: "g".into(), grouping: None, refines: vec![refine_id], augments: vec![] }),
            Location::new("m", 4, 1),
        ));

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        resolve_uses(&mut ctx, &mut diags, &types, uses_id, &[]).unwrap();

        assert!(!diags.has_errors());
        assert!(ctx.arena.groupings[gid].used);
        let ObjectPayload::Refine(r) = &ctx.arena.objects[refine_id].payload else { panic!() };
        assert_eq!(r.resolved_target, Some(leaf_id));
    }

    #[test]
    fn self_referencing_grouping_is_rejected_without_recursing() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let gid = new_grouping(&mut ctx, "a");
        let uses_id = ctx.arena.objects.insert(SchemaObject::new(
            "a",
            ObjectPayload::Uses(UsesPayload { grouping_prefix: None, grouping_name: "a".into(), grouping: None, refines: vec![], augments: vec![] }),
            Location::new("m", 2, 1),
        ));
        ctx.arena.groupings[gid].datadefs.push(uses_id);

        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        resolve_uses(&mut ctx, &mut diags, &types, uses_id, &[gid]).unwrap();

        assert!(diags.has_errors());
        let ObjectPayload::Uses(u) = &ctx.arena.objects[uses_id].payload else { panic!() };
        assert!(u.grouping.is_none());
    }

    #[test]
    fn expand_uses_splices_grouping_body_before_uses_node() {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let gid = new_grouping(&mut ctx, "g");
        let leaf_id = ctx.arena.objects.insert(SchemaObject::new(
            "x",
            ObjectPayload::Leaf(LeafPayload::default()),
            Location::new("m", 2, 1),
        ));
        ctx.arena.groupings[gid].datadefs.push(leaf_id);

        let container_id = ctx.arena.objects.insert(SchemaObject::new(
            "top",
            ObjectPayload::Container(ContainerPayload::default()),
            Location::new("m", 1, 1),
        ));
        let uses_id = ctx.arena.objects.insert(SchemaObject::new(
            "g",
            ObjectPayload::Uses(UsesPayload { grouping_prefix: None, grouping_name: "g".into(), grouping: Some(gid), refines: vec![], augments: vec![] }),
            Location::new("m", 3, 1),
        ));
        let mut queue = vec![uses_id];

        let mut diags = Diagnostics::new();
        expand_uses_in(&mut ctx, &mut diags, Some(container_id), &mut queue, 100, 0).unwrap();

        assert!(!diags.has_errors());
        // The uses statement itself is removed from the queue once spliced
        // (§3.1); only its clone remains, still linked back via `usesobj`.
        assert_eq!(queue.len(), 1);
        assert_eq!(ctx.arena.objects[queue[0]].name, "x");
        assert_eq!(ctx.arena.objects[queue[0]].usesobj, Some(uses_id));
    }

    #[test]
    fn expand_uses_inherits_enclosing_choice_and_case_conditionals() {
        use crate::object::{CasePayload, ChoicePayload};

        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let gid = new_grouping(&mut ctx, "g");
        let leaf_id = ctx.arena.objects.insert(SchemaObject::new(
            "x",
            ObjectPayload::Leaf(LeafPayload::default()),
            Location::new("m", 2, 1),
        ));
        ctx.arena.groupings[gid].datadefs.push(leaf_id);

        let mut choice_obj = SchemaObject::new("c", ObjectPayload::Choice(ChoicePayload::default()), Location::new("m", 1, 1));
        choice_obj.if_features.push("f".into());
        let choice_id = ctx.arena.objects.insert(choice_obj);

        let uses_id = ctx.arena.objects.insert(SchemaObject::new(
            "g",
            ObjectPayload::Uses(UsesPayload { grouping_prefix: None, grouping_name: "g".into(), grouping: Some(gid), refines: vec![], augments: vec![] }),
            Location::new("m", 3, 1),
        ));
        let case_obj = SchemaObject::new("x", ObjectPayload::Case(CasePayload { children: vec![uses_id] }), Location::new("m", 1, 1));
        let case_id = ctx.arena.objects.insert(case_obj);
        ctx.arena.objects[uses_id].parent = Some(case_id);
        ctx.arena.objects[case_id].parent = Some(choice_id);

        let mut queue = vec![uses_id];
        let mut diags = Diagnostics::new();
        expand_uses_in(&mut ctx, &mut diags, Some(case_id), &mut queue, 100, 0).unwrap();

        assert!(!diags.has_errors());
        assert_eq!(queue.len(), 1);
        let clone_id = queue[0];
        assert_eq!(ctx.arena.objects[clone_id].name, "x");
        // The enclosing case itself carries no if-feature/when of its own,
        // but its parent choice does; the clone's real `.parent` is the
        // case (still reachable directly), so only the choice's if-feature
        // needs to ride along in `inherited_conditionals`.
        assert_eq!(ctx.arena.objects[clone_id].inherited_conditionals, vec![choice_id]);
    }
}
