//! The grouping template (§3.2), grounded directly on the original's
//! `grp_template_t` (`examples/original_source/netconf/src/ncx/grp.h`):
//! a named, reusable fragment of schema that is never itself instantiated,
//! only expanded in place by `uses` (§4.4).

use crate::arena::{GroupingId, ObjectId, TypeDefId};
use crate::location::Location;
use crate::object::Status;

/// A `grouping` statement's body.
#[derive(Debug, Clone)]
pub struct Grouping {
    pub name: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub location: Location,
    pub status: Status,
    /// Back-pointer to the enclosing grouping, if this grouping is nested
    /// inside another (`grp_template_t.parentgrp` in the original).
    pub parent_grouping: Option<GroupingId>,
    pub nsid: u32,
    /// Whether any `uses` statement anywhere has referenced this grouping.
    /// Drives the unused-grouping warning in the final phase (§4.7.6).
    pub used: bool,
    /// Whether this grouping sits directly under the module (as opposed to
    /// nested inside a container/list/rpc/etc).
    pub top: bool,
    /// Set once this grouping's own body has had its internal `uses`
    /// statements expanded (§4.4.2 step 1); prevents re-expansion and is
    /// the basis of nesting-loop detection (§4.4.1 step 2, §8 invariant 4).
    pub expand_done: bool,
    /// Stable ordinal assigned at registration time, used by deterministic-
    /// order consumers (documentation/XSD back-ends) that are themselves
    /// out of scope here but which the ordinal costs nothing to preserve.
    pub grpindex: u32,
    pub typedefs: Vec<TypeDefId>,
    pub groupings: Vec<GroupingId>,
    pub datadefs: Vec<ObjectId>,
}

impl Grouping {
    pub fn new(name: impl Into<String>, location: Location, grpindex: u32) -> Self {
        Self {
            name: name.into(),
            description: None,
            reference: None,
            location,
            status: Status::Current,
            parent_grouping: None,
            nsid: 0,
            used: false,
            top: false,
            expand_done: false,
            grpindex,
            typedefs: Vec::new(),
            groupings: Vec::new(),
            datadefs: Vec::new(),
        }
    }

    pub fn has_typedefs(&self) -> bool {
        !self.typedefs.is_empty()
    }
}
