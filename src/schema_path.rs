//! Schema-node-id resolution against the compiled object tree: walking a
//! parsed path's steps against a starting set of objects (a module's
//! top-level datadefs, a grouping's own body, or a single object's own
//! children). Shared by the uses expander's refine-target resolution
//! (§4.4.1), the augment expander's target resolution (§4.5), and deviation
//! target resolution, rather than reimplemented three times.
//!
//! Grounded on the teacher's `json::schema::index::Index::fetch` walk: chase
//! one path segment at a time through a mutable "current candidate set",
//! narrowing on each step rather than building the whole target subtree up
//! front.

use crate::arena::ObjectId;
use crate::module::ModuleContext;
use crate::xpath::{PathStep, SchemaNodeId};

/// Walk `steps` against `start`, matching each step's bare name against the
/// current candidate set's objects by name, descending into each match's
/// own children for the next step. Namespace prefixes on steps after the
/// first are not distinguished from one another here — cross-module
/// disambiguation of a *non-first* step would require each step's owning
/// module's import table, which isn't threaded through this call; real
/// schema-node-id resolution for same-compilation-unit targets never needs
/// it in practice, since descendant steps name children already scoped to
/// one tree.
pub fn find_in_set(ctx: &ModuleContext, start: &[ObjectId], steps: &[PathStep]) -> Option<ObjectId> {
    let mut candidates: Vec<ObjectId> = start.to_vec();
    let mut result = None;
    for step in steps {
        let found = candidates.iter().copied().find(|&id| ctx.arena.objects[id].name == step.name)?;
        result = Some(found);
        candidates = ctx
            .arena
            .objects[found]
            .payload
            .children()
            .map(|c| c.to_vec())
            .unwrap_or_default();
    }
    result
}

/// Resolve a full [`SchemaNodeId`] to an [`ObjectId`]. Absolute paths whose
/// first step names this compilation unit's own namespace (no prefix, or the
/// main module's own prefix — which every submodule shares via its
/// `belongs-to`) are rooted at the *combined* top-level datadefs of the main
/// module and every submodule it includes, since submodules don't carry a
/// namespace of their own: an augment declared in one submodule can target a
/// list defined in a sibling submodule, and both are reachable only by
/// searching the whole unit rather than a single module's `datadefs`.
/// Descendant paths are rooted at `relative_start`, which the caller
/// supplies as whatever scope the path is declared relative to (a uses's
/// grouping body, an object's own children).
pub fn resolve(ctx: &ModuleContext, node_id: &SchemaNodeId, relative_start: &[ObjectId]) -> Option<ObjectId> {
    if node_id.steps.is_empty() {
        return None;
    }
    if node_id.absolute {
        let first_prefix = node_id.steps[0].prefix.as_deref();
        let in_unit_namespace = match first_prefix {
            None => true,
            Some(p) => p == ctx.main.prefix,
        };
        if !in_unit_namespace {
            return None;
        }
        let start: Vec<ObjectId> = ctx.modules().flat_map(|m| m.datadefs.iter().copied()).collect();
        find_in_set(ctx, &start, &node_id.steps)
    } else {
        find_in_set(ctx, relative_start, &node_id.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::module::Module;
    use crate::object::{ContainerPayload, LeafPayload, ObjectPayload, SchemaObject};

    fn build_ctx() -> (ModuleContext, ObjectId, ObjectId) {
        let mut ctx = ModuleContext::new(Module::new("m", "urn:m", "m"));
        let leaf_id = ctx.arena.objects.insert(SchemaObject::new(
            "addr",
            ObjectPayload::Leaf(LeafPayload::default()),
            Location::new("m", 2, 1),
        ));
        let container_id = ctx.arena.objects.insert(SchemaObject::new(
            "top",
            ObjectPayload::Container(ContainerPayload {
                children: vec![leaf_id],
                ..Default::default()
            }),
            Location::new("m", 1, 1),
        ));
        ctx.main.datadefs.push(container_id);
        (ctx, container_id, leaf_id)
    }

    #[test]
    fn resolves_absolute_path_through_nested_container() {
        let (ctx, _container, leaf_id) = build_ctx();
        let parsed = SchemaNodeId::parse("/m:top/m:addr").unwrap();
        assert_eq!(resolve(&ctx, &parsed, &[]), Some(leaf_id));
    }

    #[test]
    fn resolves_descendant_path_relative_to_supplied_start() {
        let (ctx, container, leaf_id) = build_ctx();
        let parsed = SchemaNodeId::parse("addr").unwrap();
        let start = match &ctx.arena.objects[container].payload {
            ObjectPayload::Container(c) => c.children.clone(),
            _ => unreachable!(),
        };
        assert_eq!(resolve(&ctx, &parsed, &start), Some(leaf_id));
    }

    #[test]
    fn unmatched_step_resolves_to_none() {
        let (ctx, _container, _leaf) = build_ctx();
        let parsed = SchemaNodeId::parse("/m:top/m:missing").unwrap();
        assert_eq!(resolve(&ctx, &parsed, &[]), None);
    }
}
