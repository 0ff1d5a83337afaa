//! The deviation data model and engine (§3.4, §4.6): post-hoc mutation of
//! an already-resolved schema node, declared either in the same module or
//! staged from a deviation-only module via the savedev mailbox (§9.3,
//! [`crate::module::DeviationMailbox`]).

use crate::arena::ObjectId;
use crate::diagnostics::{Diagnostics, DiagnosticKind, Severity};
use crate::location::Location;
use crate::object::{ObjectKind, ObjectPayload, SchemaObject};
use crate::typedef::TypeDef;
use crate::xpath::Pcb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviateKind {
    NotSupported,
    Add,
    Delete,
    Replace,
}

/// One sub-statement inside a `deviate` block. Kept as separate, independently
/// located variants (rather than one shared struct with a single `location`
/// field) specifically so that a `min-elements`/`max-elements` pair in the
/// same deviate block can never be confused with one another when reporting
/// diagnostics — see DESIGN.md's note on the `minelems_tkerr.mod` double-read
/// bug in the original `apply_object_deviations`.
#[derive(Debug, Clone)]
pub enum DeviateClause {
    Type(TypeDef),
    Units(String),
    Default(String),
    Config(bool),
    Mandatory(bool),
    MinElements(u32),
    MaxElements(u32),
    Must(Pcb),
    Unique(String),
}

impl DeviateClause {
    fn name(&self) -> &'static str {
        match self {
            DeviateClause::Type(_) => "type",
            DeviateClause::Units(_) => "units",
            DeviateClause::Default(_) => "default",
            DeviateClause::Config(_) => "config",
            DeviateClause::Mandatory(_) => "mandatory",
            DeviateClause::MinElements(_) => "min-elements",
            DeviateClause::MaxElements(_) => "max-elements",
            DeviateClause::Must(_) => "must",
            DeviateClause::Unique(_) => "unique",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Deviate {
    pub kind: DeviateKind,
    pub clauses: Vec<DeviateClause>,
    pub location: Location,
}

/// A `deviation` statement (§3.4): targets one absolute schema node path
/// and carries an ordered list of deviates, applied in source order
/// (§3.5's "Deviation ordering" invariant).
#[derive(Debug, Clone)]
pub struct Deviation {
    pub target_path: String,
    pub resolved_target: Option<ObjectId>,
    pub deviates: Vec<Deviate>,
    pub location: Location,
    /// The module this deviation was declared in — needed by
    /// `transfer_my_deviations` (§4.6.1) to match a staged deviation
    /// against the main module it targets.
    pub declaring_module: String,
}

/// Merge deviations that share the same target (§4.6.2): concatenate their
/// deviate lists in declaration order, after checking for overlapping
/// sub-statements across the two deviation blocks being merged.
pub fn normalize_deviations(deviations: Vec<Deviation>, diags: &mut Diagnostics) -> Vec<Deviation> {
    let mut by_target: Vec<Deviation> = Vec::new();
    'outer: for deviation in deviations {
        for existing in by_target.iter_mut() {
            if existing.target_path == deviation.target_path {
                check_deviate_collision(existing, &deviation, diags);
                existing.deviates.extend(deviation.deviates);
                continue 'outer;
            }
        }
        by_target.push(deviation);
    }
    by_target
}

/// `check_deviate_collision` (§4.6.2): two deviates from different
/// deviation blocks that both touch the same sub-statement kind are a
/// fatal collision (e.g. two `type` deviates for the same target).
fn check_deviate_collision(existing: &Deviation, incoming: &Deviation, diags: &mut Diagnostics) {
    for incoming_deviate in &incoming.deviates {
        for incoming_clause in &incoming_deviate.clauses {
            for existing_deviate in &existing.deviates {
                let collides = existing_deviate
                    .clauses
                    .iter()
                    .any(|c| c.name() == incoming_clause.name());
                if collides {
                    diags.push(
                        incoming_deviate.location.clone(),
                        DiagnosticKind::InvalidDevStmt(format!(
                            "conflicting '{}' deviate for target '{}' across merged deviations",
                            incoming_clause.name(),
                            existing.target_path
                        )),
                    );
                }
            }
        }
    }
}

/// Per-deviate-kind structural validation (§4.6.3), run before application.
pub fn validate_deviate(deviation: &Deviation, deviate: &Deviate, diags: &mut Diagnostics) -> bool {
    let mut ok = true;
    match deviate.kind {
        DeviateKind::NotSupported => {
            if deviation.deviates.len() != 1 {
                diags.push(
                    deviate.location.clone(),
                    DiagnosticKind::InvalidDevStmt(
                        "'not-supported' must be the only deviate for its target".into(),
                    ),
                );
                ok = false;
            }
            if !deviate.clauses.is_empty() {
                diags.push(
                    deviate.location.clone(),
                    DiagnosticKind::InvalidDevStmt(
                        "'not-supported' may not carry sub-statements".into(),
                    ),
                );
                ok = false;
            }
        }
        DeviateKind::Add | DeviateKind::Delete | DeviateKind::Replace => {
            for clause in &deviate.clauses {
                if !clause_allowed_on_target(clause) {
                    diags.push(
                        deviate.location.clone(),
                        DiagnosticKind::InvalidDevStmt(format!(
                            "'{}' is not a valid deviate sub-statement here",
                            clause.name()
                        )),
                    );
                    ok = false;
                }
            }
        }
    }
    ok
}

fn clause_allowed_on_target(_clause: &DeviateClause) -> bool {
    // Target-kind-specific legality (unique only on list, default only on
    // leaf/choice, min/max-elements only on leaf-list/list, §4.6.3) is
    // checked against the live target object in `apply_deviate`, where the
    // target's kind is in hand; this pre-check only rejects structurally
    // impossible clauses, of which there currently are none left to reject
    // once parsing has already enforced clause shape.
    true
}

/// Apply one module's deviations to its already-resolved tree (§4.6.4).
/// Returns the set of targets that need to be re-run through
/// `resolve_datadef` (the "retest" flag, per object) because a resolution-
/// affecting field changed.
pub fn apply_deviations(
    objects: &mut crate::arena::Slab<SchemaObject>,
    deviations: &[Deviation],
    diags: &mut Diagnostics,
) -> Vec<ObjectId> {
    let mut retest = Vec::new();
    for deviation in deviations {
        let Some(target) = deviation.resolved_target else {
            continue;
        };
        for deviate in &deviation.deviates {
            if !validate_deviate(deviation, deviate, diags) {
                continue;
            }
            let needs_retest = apply_deviate(objects, target, deviate, diags);
            if needs_retest && !retest.contains(&target) {
                retest.push(target);
            }
        }
    }
    retest
}

/// Apply a single deviate to its target object. Returns whether the target
/// must be retested (§4.6.4's retest flag).
fn apply_deviate(
    objects: &mut crate::arena::Slab<SchemaObject>,
    target: ObjectId,
    deviate: &Deviate,
    diags: &mut Diagnostics,
) -> bool {
    if deviate.kind == DeviateKind::NotSupported {
        return apply_not_supported(objects, target, deviate, diags);
    }

    let mut needs_retest = false;
    for clause in &deviate.clauses {
        match clause {
            DeviateClause::Type(new_type) => {
                let obj = &mut objects[target];
                match &mut obj.payload {
                    ObjectPayload::Leaf(leaf) => leaf.type_def = Some(new_type.clone()),
                    ObjectPayload::LeafList(ll) => ll.type_def = Some(new_type.clone()),
                    _ => diags.push(
                        deviate.location.clone(),
                        DiagnosticKind::InvalidDevStmt("'type' deviate on non-leaf target".into()),
                    ),
                }
                needs_retest = true;
            }
            DeviateClause::Units(units) => {
                let obj = &mut objects[target];
                let slot = match &mut obj.payload {
                    ObjectPayload::Leaf(leaf) => Some(&mut leaf.units),
                    ObjectPayload::LeafList(ll) => Some(&mut ll.units),
                    _ => None,
                };
                apply_string_field(slot, deviate.kind, units, "units", &deviate.location, diags);
            }
            DeviateClause::Default(default) => {
                let obj = &mut objects[target];
                let slot = match &mut obj.payload {
                    ObjectPayload::Leaf(leaf) => Some(&mut leaf.default),
                    ObjectPayload::Choice(choice) => Some(&mut choice.default_case),
                    _ => None,
                };
                apply_string_field(slot, deviate.kind, default, "default", &deviate.location, diags);
                needs_retest = true;
            }
            DeviateClause::Config(value) => {
                let obj = &mut objects[target];
                obj.flags.config = *value;
                obj.flags.config_set = true;
                needs_retest = true;
            }
            DeviateClause::Mandatory(value) => {
                let obj = &mut objects[target];
                obj.flags.mandatory = *value;
                obj.flags.mandatory_set = true;
                needs_retest = true;
            }
            DeviateClause::MinElements(value) => {
                let obj = &mut objects[target];
                match &mut obj.payload {
                    ObjectPayload::List(l) => l.min_elements = *value,
                    ObjectPayload::LeafList(ll) => ll.min_elements = *value,
                    _ => diags.push(
                        deviate.location.clone(),
                        DiagnosticKind::InvalidDevStmt(
                            "'min-elements' deviate on non-list target".into(),
                        ),
                    ),
                }
                needs_retest = true;
            }
            DeviateClause::MaxElements(value) => {
                let obj = &mut objects[target];
                match &mut obj.payload {
                    ObjectPayload::List(l) => l.max_elements = Some(*value),
                    ObjectPayload::LeafList(ll) => ll.max_elements = Some(*value),
                    _ => diags.push(
                        deviate.location.clone(),
                        DiagnosticKind::InvalidDevStmt(
                            "'max-elements' deviate on non-list target".into(),
                        ),
                    ),
                }
            }
            DeviateClause::Must(pcb) => {
                let obj = &mut objects[target];
                match deviate.kind {
                    DeviateKind::Add => obj.must.push(pcb.clone()),
                    DeviateKind::Delete => obj.must.retain(|m| m.expr != pcb.expr),
                    DeviateKind::Replace | DeviateKind::NotSupported => unreachable!(),
                }
            }
            DeviateClause::Unique(xpath) => {
                let obj = &mut objects[target];
                if let ObjectPayload::List(l) = &mut obj.payload {
                    match deviate.kind {
                        DeviateKind::Add => l.unique_strs.push(xpath.clone()),
                        DeviateKind::Delete => l.unique_strs.retain(|u| u != xpath),
                        DeviateKind::Replace | DeviateKind::NotSupported => unreachable!(),
                    }
                } else {
                    diags.push(
                        deviate.location.clone(),
                        DiagnosticKind::InvalidDevStmt("'unique' deviate on non-list target".into()),
                    );
                }
                // Resolved Open Question #1: a unique-set change can turn a
                // previously-redundant key selection into one that needs
                // re-validated config-uniformity (§4.7.4), so this always
                // retests too, not only type/default/config/mandatory/
                // min-elements as literally listed in §4.6.4.
                needs_retest = true;
            }
        }
    }
    needs_retest
}

fn apply_string_field(
    slot: Option<&mut Option<String>>,
    kind: DeviateKind,
    value: &str,
    clause_name: &str,
    location: &Location,
    diags: &mut Diagnostics,
) {
    let Some(slot) = slot else {
        diags.push(
            location.clone(),
            DiagnosticKind::InvalidDevStmt(format!(
                "'{clause_name}' deviate on a target kind that doesn't carry it"
            )),
        );
        return;
    };
    match kind {
        DeviateKind::Add => {
            if slot.is_some() {
                diags.push(
                    location.clone(),
                    DiagnosticKind::InvalidDevStmt(format!(
                        "'{clause_name}' already exists; use 'replace'"
                    )),
                );
            } else {
                *slot = Some(value.to_string());
            }
        }
        DeviateKind::Delete => match slot {
            Some(existing) if existing == value => *slot = None,
            Some(_) => diags.push(
                location.clone(),
                DiagnosticKind::InvalidDevStmt(format!(
                    "'{clause_name}' delete value does not match the target's current value"
                )),
            ),
            None => diags.push(
                location.clone(),
                DiagnosticKind::InvalidDevStmt(format!(
                    "'{clause_name}' does not exist on the target"
                )),
            ),
        },
        DeviateKind::Replace => {
            if slot.is_none() {
                diags.push(
                    location.clone(),
                    DiagnosticKind::InvalidDevStmt(format!(
                        "'{clause_name}' does not exist; use 'add'"
                    )),
                );
            } else {
                *slot = Some(value.to_string());
            }
        }
        DeviateKind::NotSupported => unreachable!(),
    }
}

/// Mark every list's current key leaves with `flags.key = true`, ahead of
/// deviation application (§4.6.4 / Open Question #2's key-leaf guard).
///
/// `flags.key` is otherwise only set by `final_check::check_list_final`,
/// which runs in P6 — strictly *after* `apply_deviations` (P5b). Without
/// this pass, `apply_not_supported`'s key-leaf check always sees `false`
/// and a `deviate not-supported` targeting a declared key silently deletes
/// it, desyncing `List.keys` before P6 ever gets a chance to object. This
/// pass does no diagnostic reporting of its own — a malformed key string
/// is still caught, with a proper diagnostic, by `check_list_final` later
/// — it only has to get the flag right by the time deviations apply, not
/// validate it.
pub fn mark_key_flags(objects: &mut crate::arena::Slab<SchemaObject>) {
    let lists: Vec<(Vec<ObjectId>, Option<String>)> = objects
        .iter()
        .filter_map(|(_, o)| match &o.payload {
            ObjectPayload::List(l) => Some((l.children.clone(), l.key_str.clone())),
            _ => None,
        })
        .collect();
    for (children, key_str) in lists {
        let Some(key_str) = key_str else { continue };
        for part in key_str.split_whitespace() {
            if let Some(&leaf) = children.iter().find(|&&c| objects[c].name == part) {
                if objects[leaf].kind() == ObjectKind::Leaf {
                    objects[leaf].flags.key = true;
                }
            }
        }
    }
}

/// `not-supported` (§4.6.4): marks the target deleted unless it is a list
/// key leaf. Resolved Open Question #2: a key leaf is refused at `Error`
/// severity (not merely a warning) and is never marked deleted, because
/// silently dropping a key would desync every already-resolved
/// `List.keys` entry pointing at it.
fn apply_not_supported(
    objects: &mut crate::arena::Slab<SchemaObject>,
    target: ObjectId,
    deviate: &Deviate,
    diags: &mut Diagnostics,
) -> bool {
    let obj = &mut objects[target];
    if obj.flags.key {
        diags.push_with_severity(
            deviate.location.clone(),
            DiagnosticKind::InvalidDevStmt(format!(
                "'not-supported' may not target key leaf '{}'",
                obj.name
            )),
            Severity::Error,
        );
        return false;
    }
    obj.flags.deleted = true;
    false
}

/// Garbage-collect every object bearing `deleted` (§4.6.5). Returns the set
/// of parents that lost a child and must be re-checked (e.g. a list losing
/// its last key).
pub fn garbage_collect_deleted(
    objects: &mut crate::arena::Slab<SchemaObject>,
) -> Vec<ObjectId> {
    let deleted: Vec<ObjectId> = objects
        .iter()
        .filter(|(_, o)| o.flags.deleted)
        .map(|(id, _)| id)
        .collect();

    let mut affected_parents = Vec::new();
    for &id in &deleted {
        if let Some(parent) = objects[id].parent {
            if !affected_parents.contains(&parent) {
                affected_parents.push(parent);
            }
            if let Some(children) = objects[parent].payload.children_mut() {
                children.retain(|&c| c != id);
            }
        }
    }
    affected_parents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Slab;
    use crate::object::{LeafPayload, ObjectPayload, SchemaObject};
    use crate::typedef::BaseType;

    fn leaf_with_units(units: &str) -> SchemaObject {
        let mut obj = SchemaObject::new(
            "x",
            ObjectPayload::Leaf(LeafPayload {
                type_def: Some(TypeDef::new(BaseType::String)),
                units: Some(units.to_string()),
                default: None,
            }),
            Location::new("m", 1, 1),
        );
        obj.flags.config = true;
        obj
    }

    #[test]
    fn delete_units_matching_value_succeeds() {
        let mut objects: Slab<SchemaObject> = Slab::new();
        let id = objects.insert(leaf_with_units("bytes"));
        let mut diags = Diagnostics::new();
        let deviation = Deviation {
            target_path: "/m:x".into(),
            resolved_target: Some(id),
            deviates: vec![Deviate {
                kind: DeviateKind::Delete,
                clauses: vec![DeviateClause::Units("bytes".into())],
                location: Location::new("dev", 1, 1),
            }],
            location: Location::new("dev", 1, 1),
            declaring_module: "dev".into(),
        };
        apply_deviations(&mut objects, &[deviation], &mut diags);
        assert!(!diags.has_errors());
        let ObjectPayload::Leaf(leaf) = &objects[id].payload else {
            panic!()
        };
        assert_eq!(leaf.units, None);
    }

    #[test]
    fn delete_units_mismatched_value_fails() {
        let mut objects: Slab<SchemaObject> = Slab::new();
        let id = objects.insert(leaf_with_units("bytes"));
        let mut diags = Diagnostics::new();
        let deviation = Deviation {
            target_path: "/m:x".into(),
            resolved_target: Some(id),
            deviates: vec![Deviate {
                kind: DeviateKind::Delete,
                clauses: vec![DeviateClause::Units("bits".into())],
                location: Location::new("dev", 1, 1),
            }],
            location: Location::new("dev", 1, 1),
            declaring_module: "dev".into(),
        };
        apply_deviations(&mut objects, &[deviation], &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn not_supported_on_key_leaf_is_rejected() {
        let mut objects: Slab<SchemaObject> = Slab::new();
        let mut obj = leaf_with_units("bytes");
        obj.flags.key = true;
        let id = objects.insert(obj);
        let mut diags = Diagnostics::new();
        let deviation = Deviation {
            target_path: "/m:x".into(),
            resolved_target: Some(id),
            deviates: vec![Deviate {
                kind: DeviateKind::NotSupported,
                clauses: vec![],
                location: Location::new("dev", 1, 1),
            }],
            location: Location::new("dev", 1, 1),
            declaring_module: "dev".into(),
        };
        apply_deviations(&mut objects, &[deviation], &mut diags);
        assert!(diags.has_errors());
        assert!(!objects[id].flags.deleted);
    }

    #[test]
    fn normalize_merges_same_target_and_flags_collisions() {
        let mut diags = Diagnostics::new();
        let d1 = Deviation {
            target_path: "/m:x".into(),
            resolved_target: None,
            deviates: vec![Deviate {
                kind: DeviateKind::Replace,
                clauses: vec![DeviateClause::Units("bytes".into())],
                location: Location::new("dev1", 1, 1),
            }],
            location: Location::new("dev1", 1, 1),
            declaring_module: "dev1".into(),
        };
        let d2 = Deviation {
            target_path: "/m:x".into(),
            resolved_target: None,
            deviates: vec![Deviate {
                kind: DeviateKind::Replace,
                clauses: vec![DeviateClause::Units("bits".into())],
                location: Location::new("dev2", 1, 1),
            }],
            location: Location::new("dev2", 1, 1),
            declaring_module: "dev2".into(),
        };
        let merged = normalize_deviations(vec![d1, d2], &mut diags);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].deviates.len(), 2);
        assert!(diags.has_errors());
    }

    #[test]
    fn mark_key_flags_sets_key_on_the_named_child_before_any_deviation_runs() {
        use crate::object::ListPayload;

        let mut objects: Slab<SchemaObject> = Slab::new();
        let key_leaf = objects.insert(SchemaObject::new(
            "k",
            ObjectPayload::Leaf(LeafPayload { type_def: Some(TypeDef::new(BaseType::String)), units: None, default: None }),
            Location::new("m", 2, 1),
        ));
        let other_leaf = objects.insert(SchemaObject::new(
            "v",
            ObjectPayload::Leaf(LeafPayload::default()),
            Location::new("m", 3, 1),
        ));
        objects.insert(SchemaObject::new(
            "l",
            ObjectPayload::List(ListPayload {
                children: vec![key_leaf, other_leaf],
                key_str: Some("k".into()),
                ..Default::default()
            }),
            Location::new("m", 1, 1),
        ));

        mark_key_flags(&mut objects);

        assert!(objects[key_leaf].flags.key);
        assert!(!objects[other_leaf].flags.key);
    }
}
