//! The augment expander (P5, §4.5): splices an `augment` statement's
//! children into its target node's own datadef queue, honoring absolute-vs-
//! descendant path requirements, forbidden target kinds, cross-module and
//! default-choice-case mandatory-child rejection, per-namespace name
//! uniqueness, and choice-of-data shorthand wrapping.
//!
//! Grounded on the same clone-and-splice shape as [`crate::uses_expand`]
//! (§4.4.2), reusing its clone fabrication and inherited-conditional
//! propagation rather than re-deriving them.

use crate::arena::ObjectId;
use crate::diagnostics::{CompileError, DiagnosticKind, Diagnostics, Severity};
use crate::location::Location;
use crate::module::ModuleContext;
use crate::object::{CasePayload, ObjectKind, ObjectPayload, SchemaObject, Status};
use crate::schema_path;
use crate::uses_expand::{clone_subtree, propagate_inherited};
use crate::xpath::SchemaNodeId;

fn is_effectively_mandatory(ctx: &ModuleContext, id: ObjectId) -> bool {
    let obj = &ctx.arena.objects[id];
    if obj.flags.mandatory {
        return true;
    }
    match &obj.payload {
        ObjectPayload::List(l) => l.min_elements > 0,
        ObjectPayload::LeafList(l) => l.min_elements > 0,
        _ => false,
    }
}

/// Whether `target` is a `case` that happens to be its parent choice's
/// declared default (§4.5 step 3's "default case of a choice").
fn is_default_case(ctx: &ModuleContext, target: ObjectId) -> bool {
    if ctx.arena.objects[target].kind() != ObjectKind::Case {
        return false;
    }
    let Some(parent) = ctx.arena.objects[target].parent else {
        return false;
    };
    match &ctx.arena.objects[parent].payload {
        ObjectPayload::Choice(c) => c.default_case.as_deref() == Some(ctx.arena.objects[target].name.as_str()),
        _ => false,
    }
}

fn wrap_in_case(ctx: &mut ModuleContext, clone: ObjectId, parent: ObjectId) -> ObjectId {
    let name = ctx.arena.objects[clone].name.clone();
    let loc = Location::derived_from(&ctx.arena.objects[clone].location);
    let mut case_obj = SchemaObject::new(name, ObjectPayload::Case(CasePayload { children: vec![clone] }), loc);
    case_obj.parent = Some(parent);
    case_obj.nsid = ctx.arena.objects[clone].nsid;
    let case_id = ctx.arena.objects.insert(case_obj);
    ctx.arena.objects[clone].parent = Some(case_id);
    case_id
}

/// Expand one augment statement against its target (§4.5). `relative_start`
/// is the scope a descendant target path (nested inside a `uses`) resolves
/// against; top-level augments pass an empty slice and must use an absolute
/// path instead.
pub fn expand_augment(ctx: &mut ModuleContext, diags: &mut Diagnostics, aug_id: ObjectId, relative_start: &[ObjectId]) -> Result<(), CompileError> {
    if ctx.arena.objects[aug_id].status == Status::Obsolete {
        return Ok(());
    }
    let loc = ctx.arena.objects[aug_id].location.clone();
    let (target_path, children, declaring_nsid) = match &ctx.arena.objects[aug_id].payload {
        ObjectPayload::Augment(a) => (a.target_path.clone(), a.children.clone(), ctx.arena.objects[aug_id].nsid),
        _ => unreachable!(),
    };

    let Ok(parsed) = SchemaNodeId::parse(&target_path) else {
        diags.push(loc, DiagnosticKind::InvalidAugTarget(target_path));
        return Ok(());
    };
    if relative_start.is_empty() && !parsed.absolute {
        diags.push(loc, DiagnosticKind::InvalidAugTarget(format!("top-level augment '{target_path}' must use an absolute path")));
        return Ok(());
    }
    if !relative_start.is_empty() && parsed.absolute {
        diags.push(loc, DiagnosticKind::InvalidAugTarget(format!("augment '{target_path}' nested inside a uses must use a descendant path")));
        return Ok(());
    }

    let Some(target) = schema_path::resolve(ctx, &parsed, relative_start) else {
        diags.push(loc, DiagnosticKind::MissingRefTarget(target_path));
        return Ok(());
    };
    if let ObjectPayload::Augment(a) = &mut ctx.arena.objects[aug_id].payload {
        a.resolved_target = Some(target);
    }

    let target_kind = ctx.arena.objects[target].kind();
    if target_kind == ObjectKind::Rpc {
        diags.push(loc, DiagnosticKind::InvalidAugTarget(format!("'{target_path}' is an rpc; augment its input or output instead")));
        return Ok(());
    }
    if target_kind == ObjectKind::Anyxml {
        diags.push(loc, DiagnosticKind::InvalidAugTarget(format!("'{target_path}' is anyxml and cannot take children")));
        return Ok(());
    }

    let target_nsid = ctx.arena.objects[target].nsid;
    let external = declaring_nsid != target_nsid;
    if let ObjectPayload::Augment(a) = &mut ctx.arena.objects[aug_id].payload {
        a.external = external;
    }
    let forbid_mandatory = external || is_default_case(ctx, target);

    let effective_config = ctx.arena.objects[target].flags.config;
    let mut target_children: Vec<ObjectId> = ctx.arena.objects[target].payload.children().map(|c| c.to_vec()).unwrap_or_default();

    for &child in &children {
        let child_name = ctx.arena.objects[child].name.clone();
        if let Some(&existing) = target_children.iter().find(|&&e| ctx.arena.objects[e].name == child_name) {
            let existing_nsid = ctx.arena.objects[existing].nsid;
            if existing_nsid == declaring_nsid {
                diags.push(loc.clone(), DiagnosticKind::DupAugNode(child_name));
            } else {
                diags.push_with_severity(loc.clone(), DiagnosticKind::DupAugNode(child_name), Severity::Warning);
            }
            continue;
        }

        if forbid_mandatory && is_effectively_mandatory(ctx, child) {
            diags.push(loc.clone(), DiagnosticKind::MandatoryNotAllowed(child_name));
            continue;
        }

        let clone = clone_subtree(ctx, child, Some(target), effective_config);
        let spliced = if target_kind == ObjectKind::Choice && ctx.arena.objects[clone].kind() != ObjectKind::Case {
            wrap_in_case(ctx, clone, target)
        } else {
            clone
        };
        ctx.arena.objects[spliced].flags.augment_clone = true;
        ctx.arena.objects[spliced].augobj = Some(aug_id);
        if spliced != clone {
            ctx.arena.objects[clone].flags.augment_clone = true;
            ctx.arena.objects[clone].augobj = Some(aug_id);
        }
        propagate_inherited(ctx, aug_id, spliced);
        target_children.push(spliced);
    }

    if let Some(children_mut) = ctx.arena.objects[target].payload.children_mut() {
        *children_mut = target_children;
    }
    Ok(())
}

/// Expand every top-level augment of every module in the compilation unit
/// (§4.5, P5 entry point). Augments nested inside a `uses` are expanded by
/// [`crate::uses_expand::expand_uses_in`] as part of that uses's own
/// expansion and never reach this function.
pub fn expand_all_augments(ctx: &mut ModuleContext, diags: &mut Diagnostics) -> Result<(), CompileError> {
    let augment_ids: Vec<ObjectId> = ctx.modules().flat_map(|m| m.augments.clone()).collect();
    for aug_id in augment_ids {
        expand_augment(ctx, diags, aug_id, &[])?;
    }
    Ok(())
}

// `resolve_augment_final` (§4.5): a list spliced into place by an external
// augment needs its key/unique leaf references bound against its own
// (now final) child set, not whatever it looked like before it had a real
// parent. No separate pass is needed for this: `final_check::FinalChecker`
// runs after augment-expansion (P5) and walks every list via its own final
// `children` field regardless of how that list arrived at its current
// position, so a freshly spliced list's keys resolve correctly the first
// and only time P6 visits it.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::module::Module;
    use crate::object::{ContainerPayload, LeafPayload};

    fn new_ctx_with_target(mandatory_child_allowed: bool) -> (ModuleContext, ObjectId) {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let target = ctx.arena.objects.insert(SchemaObject::new(
            "top",
            ObjectPayload::Container(ContainerPayload::default()),
            Location::new("m", 1, 1),
        ));
        ctx.main.datadefs.push(target);
        let _ = mandatory_child_allowed;
        (ctx, target)
    }

    #[test]
    fn top_level_augment_with_relative_path_is_rejected() {
        let (mut ctx, _target) = new_ctx_with_target(true);
        let aug = ctx.arena.objects.insert(SchemaObject::new(
            "top",
            ObjectPayload::Augment(crate::object::AugmentPayload { target_path: "top".into(), ..Default::default() }),
            Location::new("m", 2, 1),
        ));
        let mut diags = Diagnostics::new();
        expand_augment(&mut ctx, &mut diags, aug, &[]).unwrap();
        assert!(diags.has_errors());
    }

    #[test]
    fn splices_child_and_recomputes_config() {
        let (mut ctx, target) = new_ctx_with_target(true);
        let leaf = ctx.arena.objects.insert(SchemaObject::new(
            "x",
            ObjectPayload::Leaf(LeafPayload::default()),
            Location::new("m2", 1, 1),
        ));
        let aug = ctx.arena.objects.insert(SchemaObject::new(
            "top",
            ObjectPayload::Augment(crate::object::AugmentPayload { target_path: "/m:top".into(), children: vec![leaf], ..Default::default() }),
            Location::new("m2", 2, 1),
        ));
        ctx.arena.objects[target].flags.config = true;
        ctx.arena.objects[target].flags.config_set = true;

        let mut diags = Diagnostics::new();
        expand_augment(&mut ctx, &mut diags, aug, &[]).unwrap();
        assert!(!diags.has_errors());
        let ObjectPayload::Container(c) = &ctx.arena.objects[target].payload else { panic!() };
        assert_eq!(c.children.len(), 1);
        let spliced = c.children[0];
        assert_ne!(spliced, leaf);
        assert_eq!(ctx.arena.objects[spliced].augobj, Some(aug));
        assert!(ctx.arena.objects[spliced].flags.config);
    }

    #[test]
    fn external_mandatory_child_is_rejected() {
        let (mut ctx, target) = new_ctx_with_target(true);
        let mut leaf_obj = SchemaObject::new("x", ObjectPayload::Leaf(LeafPayload::default()), Location::new("other", 1, 1));
        leaf_obj.flags.mandatory = true;
        leaf_obj.flags.mandatory_set = true;
        leaf_obj.nsid = 99;
        let leaf = ctx.arena.objects.insert(leaf_obj);
        let mut aug_obj = SchemaObject::new(
            "top",
            ObjectPayload::Augment(crate::object::AugmentPayload { target_path: "/m:top".into(), children: vec![leaf], ..Default::default() }),
            Location::new("other", 2, 1),
        );
        aug_obj.nsid = 99;
        let aug = ctx.arena.objects.insert(aug_obj);

        let mut diags = Diagnostics::new();
        expand_augment(&mut ctx, &mut diags, aug, &[]).unwrap();
        assert!(diags.has_errors());
        let ObjectPayload::Container(c) = &ctx.arena.objects[target].payload else { panic!() };
        assert!(c.children.is_empty());
    }
}
