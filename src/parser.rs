//! The parser (P2, §4.2): turns a token stream into a partially validated
//! AST of schema objects. Follows the teacher's `Builder` shape
//! (`json::schema::build::Builder`) — walk statement bodies, track
//! per-field "seen" flags for duplicate detection, accumulate non-fatal
//! errors into the shared sink, and only bail out with `?` on a genuinely
//! unrecoverable condition (here: running out of tokens mid-body, §4.2.2's
//! "fatal" tier).
//!
//! Every one of the thirteen object-kind handlers shares the same skeleton
//! (read keyword, read argument, enter or skip the body, dispatch each
//! sub-statement, register) but differs in its permitted sub-statement set
//! and mandatory clauses (§4.2.3's table) — so rather than abstracting that
//! skeleton behind a closure (which fights the borrow checker once the
//! handler also needs to recurse into nested data-defs), each handler below
//! just writes the loop out, the way the original's per-kind `*_consume`
//! functions do.

use crate::arena::{GroupingId, ModuleArena, ObjectId, TypeDefId};
use crate::diagnostics::{CompileError, DiagnosticKind, Diagnostics};
use crate::grouping::Grouping;
use crate::location::Location;
use crate::module::{Feature, Identity, Import, Module, NamedTypeDef};
use crate::object::{
    Appinfo, AugmentPayload, AnyxmlPayload, CasePayload, ChoicePayload, ContainerPayload,
    LeafListPayload, LeafPayload, ListPayload, NotificationPayload, ObjectKind, ObjectPayload,
    RefinePayload, RpcPayload, RpcioPayload, SchemaObject, Status, UsesPayload,
};
use crate::token::{TokenKind, TokenStream};
use crate::typedef::{TypeDef, TypeSystem};
use crate::xpath::{ExprSource, Pcb, XPathEngine};

/// What the body loop found at the start of one iteration (§4.2.1 steps
/// 2-6): either the body closed, an appinfo clause was fully consumed
/// inline, a bare keyword is waiting to be dispatched by the caller, or an
/// unrecognized token kind was skipped with a diagnostic.
enum BodyStep {
    Done,
    Appinfo(Appinfo),
    Keyword(String),
    Unexpected,
}

/// Doc-ish sub-statements legal on almost every one of the thirteen kinds
/// (`description`, `reference`, `status`, `if-feature`), factored out so
/// each per-kind handler doesn't repeat the same four-way match.
#[derive(Debug, Default)]
struct CommonDoc {
    description: Option<String>,
    reference: Option<String>,
    status: Status,
    if_features: Vec<String>,
    appinfo: Vec<Appinfo>,
}

pub struct Parser<'a, T: TokenStream> {
    tokens: &'a mut T,
    arena: &'a mut ModuleArena,
    diags: &'a mut Diagnostics,
    types: &'a dyn TypeSystem,
    xpath: &'a dyn XPathEngine,
    module_name: String,
    nsid: u32,
    /// Next ordinal to hand out via [`Self::alloc_grpindex`] (§3.2's
    /// `grpindex`, shared across the whole module so every grouping —
    /// top-level or nested inside a container/list/rpc/etc — gets a value
    /// unique within the module, not just within its own parent's body).
    next_grpindex: u32,
}

impl<'a, T: TokenStream> Parser<'a, T> {
    fn cur_loc(&self) -> Location {
        Location::new(self.module_name.clone(), self.tokens.current_line(), self.tokens.current_column())
    }

    fn alloc_grpindex(&mut self) -> u32 {
        let v = self.next_grpindex;
        self.next_grpindex += 1;
        v
    }

    fn current_argument(&mut self) -> (String, Location) {
        // Called with the keyword token current; advances onto the
        // argument token and returns its text plus the keyword's location.
        let loc = self.cur_loc();
        self.tokens.advance();
        (self.tokens.current_value().to_string(), loc)
    }

    /// §4.2.1 step after the argument: semicolon ⇒ no body, left-brace ⇒
    /// enter it. Assumes the argument token is current.
    fn body_enter(&mut self) -> Result<bool, CompileError> {
        self.tokens.advance();
        match self.tokens.current_kind() {
            TokenKind::Semicolon => {
                self.tokens.advance();
                Ok(false)
            }
            TokenKind::LeftBrace => {
                self.tokens.advance();
                Ok(true)
            }
            TokenKind::Eof => {
                self.diags.push(self.cur_loc(), DiagnosticKind::Eof);
                Err(CompileError::UnexpectedEof { context: "statement" })
            }
            _ => {
                self.diags.push(
                    self.cur_loc(),
                    DiagnosticKind::StmtIgnored("expected ';' or '{'".into()),
                );
                Ok(false)
            }
        }
    }

    /// One iteration of a body loop (§4.2.1 steps 2-6). Must only be called
    /// when a body was actually entered (`body_enter` returned `true`).
    fn body_step(&mut self) -> Result<BodyStep, CompileError> {
        match self.tokens.current_kind() {
            TokenKind::Eof => {
                self.diags.push(self.cur_loc(), DiagnosticKind::Eof);
                Err(CompileError::UnexpectedEof { context: "statement body" })
            }
            TokenKind::RightBrace => {
                self.tokens.advance();
                Ok(BodyStep::Done)
            }
            TokenKind::PrefixedIdentifier => Ok(BodyStep::Appinfo(self.consume_appinfo()?)),
            TokenKind::Identifier => Ok(BodyStep::Keyword(self.tokens.current_value().to_string())),
            _ => {
                self.diags.push(
                    self.cur_loc(),
                    DiagnosticKind::StmtIgnored("expected a keyword".into()),
                );
                self.tokens.advance();
                Ok(BodyStep::Unexpected)
            }
        }
    }

    /// Consume a namespaced extension clause in full. The extension's own
    /// argument (if any) is kept verbatim on the `Appinfo`; nested bodies
    /// (e.g. a vendor extension with structured children) are not
    /// recursively modeled here — `ncx:metadata` is the one extension P3
    /// gives further meaning to (§4.3), by re-parsing `Appinfo::value` as a
    /// whitespace-separated `name type` pair.
    fn consume_appinfo(&mut self) -> Result<Appinfo, CompileError> {
        let raw = self.tokens.current_value().to_string();
        let loc = self.cur_loc();
        let (prefix, name) = match raw.split_once(':') {
            Some((p, n)) => (p.to_string(), n.to_string()),
            None => (String::new(), raw),
        };
        self.tokens.advance();
        let mut value = None;
        match self.tokens.current_kind() {
            TokenKind::Semicolon => {
                self.tokens.advance();
            }
            TokenKind::LeftBrace => self.skip_balanced_body()?,
            TokenKind::Eof => {
                self.diags.push(self.cur_loc(), DiagnosticKind::Eof);
                return Err(CompileError::UnexpectedEof { context: "appinfo clause" });
            }
            _ => {
                value = Some(self.tokens.current_value().to_string());
                self.tokens.advance();
                match self.tokens.current_kind() {
                    TokenKind::Semicolon => {
                        self.tokens.advance();
                    }
                    TokenKind::LeftBrace => self.skip_balanced_body()?,
                    _ => {}
                }
            }
        }
        Ok(Appinfo { prefix, name, value, location: loc })
    }

    /// Skip a statement this handler doesn't recognize, end to end
    /// (keyword + argument + body), recording `STMT_IGNORED`. Assumes the
    /// keyword token is current.
    fn skip_unknown(&mut self, keyword: &str) -> Result<(), CompileError> {
        let loc = self.cur_loc();
        self.diags.push(loc, DiagnosticKind::StmtIgnored(format!("unexpected statement '{keyword}'")));
        self.tokens.advance();
        match self.tokens.current_kind() {
            TokenKind::Semicolon | TokenKind::Identifier | TokenKind::String | TokenKind::PrefixedIdentifier => {
                self.tokens.advance();
            }
            _ => {}
        }
        match self.tokens.current_kind() {
            TokenKind::Semicolon => {
                self.tokens.advance();
            }
            TokenKind::LeftBrace => self.skip_balanced_body()?,
            _ => {}
        }
        Ok(())
    }

    /// Consume a balanced `{ ... }` region token-by-token without
    /// interpreting any of it — used to skip type-restriction bodies and
    /// unrecognized nested statements regardless of their internal grammar.
    /// Assumes the left brace is current.
    fn skip_balanced_body(&mut self) -> Result<(), CompileError> {
        let mut depth = 0i32;
        loop {
            match self.tokens.current_kind() {
                TokenKind::LeftBrace => {
                    depth += 1;
                    self.tokens.advance();
                }
                TokenKind::RightBrace => {
                    depth -= 1;
                    self.tokens.advance();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                TokenKind::Eof => {
                    self.diags.push(self.cur_loc(), DiagnosticKind::Eof);
                    return Err(CompileError::UnexpectedEof { context: "skipped statement body" });
                }
                _ => {
                    self.tokens.advance();
                }
            }
        }
    }

    /// Try to interpret `kw` as one of the four near-universal doc clauses;
    /// returns whether it matched.
    fn try_common_doc(&mut self, kw: &str, common: &mut CommonDoc) -> Result<bool, CompileError> {
        match kw {
            "description" => {
                let (value, loc) = self.current_argument();
                if common.description.is_some() {
                    self.diags.push(loc, DiagnosticKind::DupEntry("description".into()));
                }
                common.description = Some(value);
                self.body_enter()?;
                Ok(true)
            }
            "reference" => {
                let (value, loc) = self.current_argument();
                if common.reference.is_some() {
                    self.diags.push(loc, DiagnosticKind::DupEntry("reference".into()));
                }
                common.reference = Some(value);
                self.body_enter()?;
                Ok(true)
            }
            "status" => {
                let (value, loc) = self.current_argument();
                common.status = match value.as_str() {
                    "current" => Status::Current,
                    "deprecated" => Status::Deprecated,
                    "obsolete" => Status::Obsolete,
                    other => {
                        self.diags.push(loc, DiagnosticKind::InvalidValue(format!("status '{other}'")));
                        Status::Current
                    }
                };
                self.body_enter()?;
                Ok(true)
            }
            "if-feature" => {
                let (value, _loc) = self.current_argument();
                common.if_features.push(value);
                self.body_enter()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn parse_when(&mut self) -> Result<Pcb, CompileError> {
        let (expr, _loc) = self.current_argument();
        self.body_enter()?;
        Ok(self.xpath.parse_expr(&expr, ExprSource::When))
    }

    fn parse_must(&mut self) -> Result<Pcb, CompileError> {
        let (expr, _loc) = self.current_argument();
        self.body_enter()?;
        Ok(self.xpath.parse_expr(&expr, ExprSource::Must))
    }

    fn parse_bool_arg(&mut self, what: &'static str) -> Result<bool, CompileError> {
        let (value, loc) = self.current_argument();
        let parsed = match value.as_str() {
            "true" => true,
            "false" => false,
            other => {
                self.diags.push(loc, DiagnosticKind::InvalidValue(format!("{what} '{other}'")));
                false
            }
        };
        self.body_enter()?;
        Ok(parsed)
    }

    fn parse_string_arg(&mut self) -> Result<String, CompileError> {
        let (value, _loc) = self.current_argument();
        self.body_enter()?;
        Ok(value)
    }

    fn parse_uint_arg(&mut self, what: &'static str) -> Result<u32, CompileError> {
        let (value, loc) = self.current_argument();
        let parsed = value.parse::<u32>().unwrap_or_else(|_| {
            self.diags.push(loc, DiagnosticKind::InvalidValue(format!("{what} '{value}'")));
            0
        });
        self.body_enter()?;
        Ok(parsed)
    }

    /// `max-elements` additionally accepts the literal `unbounded`.
    fn parse_max_elements_arg(&mut self) -> Result<Option<u32>, CompileError> {
        let (value, loc) = self.current_argument();
        let parsed = if value == "unbounded" {
            None
        } else {
            match value.parse::<u32>() {
                Ok(n) => Some(n),
                Err(_) => {
                    self.diags.push(loc, DiagnosticKind::InvalidValue(format!("max-elements '{value}'")));
                    None
                }
            }
        };
        self.body_enter()?;
        Ok(parsed)
    }

    fn finish_common(&self, obj: &mut SchemaObject, common: CommonDoc) {
        obj.description = common.description;
        obj.reference = common.reference;
        obj.status = common.status;
        obj.if_features = common.if_features;
        obj.appinfo = common.appinfo;
        obj.nsid = self.nsid;
    }

    // ---- type ----------------------------------------------------------

    /// `consume_type` (§6.2): parse a `type` statement's body. Restriction
    /// facets are the external type subsystem's concern and are skipped
    /// unparsed; the two shapes this crate's own phases need to see
    /// through — `leafref`'s `path` and `union`'s member `type`s — are
    /// special-cased.
    fn consume_type(&mut self) -> Result<TypeDef, CompileError> {
        let (name, _loc) = self.current_argument();
        let has_body = self.body_enter()?;
        if !has_body {
            return Ok(self.resolve_named_type(&name));
        }
        match name.as_str() {
            "leafref" => {
                let mut path: Option<String> = None;
                loop {
                    match self.body_step()? {
                        BodyStep::Done => break,
                        BodyStep::Appinfo(_) => {}
                        BodyStep::Keyword(kw) if kw == "path" => {
                            path = Some(self.parse_string_arg()?);
                        }
                        BodyStep::Keyword(kw) => self.skip_unknown(&kw)?,
                        BodyStep::Unexpected => {}
                    }
                }
                match path {
                    Some(p) => match self.xpath.parse_leafref_path(&p) {
                        Ok(pcb) => Ok(TypeDef::leafref(pcb)),
                        Err(e) => {
                            self.diags.push(
                                self.cur_loc(),
                                DiagnosticKind::InvalidValue(format!("leafref path: {e}")),
                            );
                            Ok(TypeDef::leafref(Pcb::new(p)))
                        }
                    },
                    None => {
                        self.diags.push(self.cur_loc(), DiagnosticKind::DataMissing("leafref 'path'".into()));
                        Ok(TypeDef::leafref(Pcb::new("")))
                    }
                }
            }
            "union" => {
                let mut members = Vec::new();
                loop {
                    match self.body_step()? {
                        BodyStep::Done => break,
                        BodyStep::Appinfo(_) => {}
                        BodyStep::Keyword(kw) if kw == "type" => members.push(self.consume_type()?),
                        BodyStep::Keyword(kw) => self.skip_unknown(&kw)?,
                        BodyStep::Unexpected => {}
                    }
                }
                Ok(TypeDef { base: crate::typedef::BaseType::Union, leafref_path: None, union_members: members, raw_name: Some(name) })
            }
            _ => {
                // Restriction facets (range/pattern/length/enum/bit) are
                // out of scope; skip the body generically.
                loop {
                    match self.body_step()? {
                        BodyStep::Done => break,
                        BodyStep::Appinfo(_) => {}
                        BodyStep::Keyword(kw) => self.skip_unknown(&kw)?,
                        BodyStep::Unexpected => {}
                    }
                }
                Ok(self.resolve_named_type(&name))
            }
        }
    }

    fn resolve_named_type(&mut self, name: &str) -> TypeDef {
        let bare = name.rsplit(':').next().unwrap_or(name);
        self.types.resolve_named_type(bare).unwrap_or_else(|| TypeDef::unresolved(name))
    }

    // ---- typedef / grouping --------------------------------------------

    fn parse_typedef(&mut self) -> Result<TypeDefId, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut def = None;
        let mut units = None;
        let mut default = None;
        let mut common = CommonDoc::default();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "type" => {
                                if def.is_some() {
                                    self.diags.push(self.cur_loc(), DiagnosticKind::DupEntry("type".into()));
                                }
                                def = Some(self.consume_type()?);
                            }
                            "units" => units = Some(self.parse_string_arg()?),
                            "default" => default = Some(self.parse_string_arg()?),
                            _ => self.skip_unknown(&kw)?,
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let def = def.unwrap_or_else(|| {
            self.diags.push(loc.clone(), DiagnosticKind::DataMissing("typedef 'type'".into()));
            TypeDef::unresolved("unknown")
        });
        let _ = (units, default);
        Ok(self.arena.typedefs.insert(NamedTypeDef {
            name,
            def,
            location: loc,
            description: common.description,
            reference: common.reference,
        }))
    }

    /// `grouping` (§3.2): recurse fully, building nested typedefs/groupings
    /// and the grouping's own datadefQ, the same way a container does.
    fn parse_grouping(&mut self, top: bool) -> Result<GroupingId, CompileError> {
        let (name, loc) = self.current_argument();
        let idx = self.alloc_grpindex();
        let has_body = self.body_enter()?;
        let mut grouping = Grouping::new(name, loc, idx);
        grouping.top = top;
        grouping.nsid = self.nsid;
        if has_body {
            let mut common = CommonDoc::default();
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(_) => {}
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "typedef" => {
                                let id = self.parse_typedef()?;
                                grouping.typedefs.push(id);
                            }
                            "grouping" => {
                                let id = self.parse_grouping(false)?;
                                grouping.groupings.push(id);
                            }
                            _ => {
                                if let Some(obj) = self.try_parse_datadef(&kw)? {
                                    grouping.datadefs.push(self.register_new(obj, None));
                                } else {
                                    self.skip_unknown(&kw)?;
                                }
                            }
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
            grouping.description = common.description;
            grouping.reference = common.reference;
            grouping.status = common.status;
        }
        Ok(self.arena.groupings.insert(grouping))
    }

    fn register_new(&mut self, obj: SchemaObject, parent: Option<ObjectId>) -> ObjectId {
        let mut obj = obj;
        obj.parent = parent;
        self.arena.objects.insert(obj)
    }

    // ---- data-def dispatch ----------------------------------------------

    /// Attempt to parse `kw` as one of the six object kinds that can appear
    /// directly as a data-def child (container, leaf, leaf-list, list,
    /// choice, uses) or anyxml. Returns `None` if `kw` isn't one of those
    /// keywords, without consuming anything.
    fn try_parse_datadef(&mut self, kw: &str) -> Result<Option<SchemaObject>, CompileError> {
        Ok(Some(match kw {
            "container" => self.parse_container()?,
            "leaf" => self.parse_leaf()?,
            "leaf-list" => self.parse_leaf_list()?,
            "list" => self.parse_list()?,
            "choice" => self.parse_choice()?,
            "uses" => self.parse_uses()?,
            "anyxml" => self.parse_anyxml()?,
            _ => return Ok(None),
        }))
    }

    fn parse_container(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = ContainerPayload::default();
        let mut common = CommonDoc::default();
        let mut config = None;
        let mut when = None;
        let mut must = Vec::new();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "presence" => payload.presence = Some(self.parse_string_arg()?),
                            "config" => config = Some(self.parse_bool_arg("config")?),
                            "when" => when = Some(self.parse_when()?),
                            "must" => must.push(self.parse_must()?),
                            "typedef" => payload.typedefs.push(self.parse_typedef()?),
                            "grouping" => {
                                payload.groupings.push(self.parse_grouping(false)?);
                            }
                            _ => {
                                if let Some(child) = self.try_parse_datadef(&kw)? {
                                    payload.children.push(self.register_new(child, None));
                                } else {
                                    self.skip_unknown(&kw)?;
                                }
                            }
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::Container(payload), loc);
        if let Some(c) = config {
            obj.flags.config = c;
            obj.flags.config_set = true;
        }
        obj.when = when;
        obj.must = must;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_leaf(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = LeafPayload::default();
        let mut common = CommonDoc::default();
        let mut config = None;
        let mut mandatory = None;
        let mut when = None;
        let mut must = Vec::new();
        let mut seen_type = false;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "type" => {
                                if seen_type {
                                    self.diags.push(self.cur_loc(), DiagnosticKind::DupEntry("type".into()));
                                }
                                payload.type_def = Some(self.consume_type()?);
                                seen_type = true;
                            }
                            "units" => payload.units = Some(self.parse_string_arg()?),
                            "default" => payload.default = Some(self.parse_string_arg()?),
                            "config" => config = Some(self.parse_bool_arg("config")?),
                            "mandatory" => mandatory = Some(self.parse_bool_arg("mandatory")?),
                            "when" => when = Some(self.parse_when()?),
                            "must" => must.push(self.parse_must()?),
                            _ => self.skip_unknown(&kw)?,
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        if !seen_type {
            self.diags.push(loc.clone(), DiagnosticKind::DataMissing(format!("leaf '{name}' missing 'type'")));
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::Leaf(payload), loc);
        if let Some(c) = config {
            obj.flags.config = c;
            obj.flags.config_set = true;
        }
        if let Some(m) = mandatory {
            obj.flags.mandatory = m;
            obj.flags.mandatory_set = true;
        }
        obj.when = when;
        obj.must = must;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_leaf_list(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = LeafListPayload::default();
        let mut common = CommonDoc::default();
        let mut config = None;
        let mut when = None;
        let mut must = Vec::new();
        let mut seen_type = false;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "type" => {
                                if seen_type {
                                    self.diags.push(self.cur_loc(), DiagnosticKind::DupEntry("type".into()));
                                }
                                payload.type_def = Some(self.consume_type()?);
                                seen_type = true;
                            }
                            "units" => payload.units = Some(self.parse_string_arg()?),
                            "config" => config = Some(self.parse_bool_arg("config")?),
                            "min-elements" => payload.min_elements = self.parse_uint_arg("min-elements")?,
                            "max-elements" => payload.max_elements = self.parse_max_elements_arg()?,
                            "ordered-by" => {
                                let (v, loc2) = self.current_argument();
                                payload.user_ordered = match v.as_str() {
                                    "user" => true,
                                    "system" => false,
                                    other => {
                                        self.diags.push(loc2, DiagnosticKind::InvalidValue(format!("ordered-by '{other}'")));
                                        false
                                    }
                                };
                                self.body_enter()?;
                            }
                            "when" => when = Some(self.parse_when()?),
                            "must" => must.push(self.parse_must()?),
                            _ => self.skip_unknown(&kw)?,
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        if !seen_type {
            self.diags.push(loc.clone(), DiagnosticKind::DataMissing(format!("leaf-list '{name}' missing 'type'")));
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::LeafList(payload), loc);
        if let Some(c) = config {
            obj.flags.config = c;
            obj.flags.config_set = true;
        }
        obj.when = when;
        obj.must = must;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_list(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = ListPayload::default();
        let mut common = CommonDoc::default();
        let mut config = None;
        let mut when = None;
        let mut must = Vec::new();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "key" => payload.key_str = Some(self.parse_string_arg()?),
                            "unique" => payload.unique_strs.push(self.parse_string_arg()?),
                            "config" => config = Some(self.parse_bool_arg("config")?),
                            "min-elements" => payload.min_elements = self.parse_uint_arg("min-elements")?,
                            "max-elements" => payload.max_elements = self.parse_max_elements_arg()?,
                            "ordered-by" => {
                                let (v, loc2) = self.current_argument();
                                payload.user_ordered = match v.as_str() {
                                    "user" => true,
                                    "system" => false,
                                    other => {
                                        self.diags.push(loc2, DiagnosticKind::InvalidValue(format!("ordered-by '{other}'")));
                                        false
                                    }
                                };
                                self.body_enter()?;
                            }
                            "when" => when = Some(self.parse_when()?),
                            "must" => must.push(self.parse_must()?),
                            "typedef" => payload.typedefs.push(self.parse_typedef()?),
                            "grouping" => {
                                payload.groupings.push(self.parse_grouping(false)?);
                            }
                            _ => {
                                if let Some(child) = self.try_parse_datadef(&kw)? {
                                    payload.children.push(self.register_new(child, None));
                                } else {
                                    self.skip_unknown(&kw)?;
                                }
                            }
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        // Mandatory clause (§4.2.3 table): `key` is required when
        // config=true and the list isn't inside a grouping. We can't know
        // "inside a grouping" here (parser has no ambient scope-kind
        // threaded through); the resolver re-checks this with full context
        // (§4.3 step 4) and is authoritative. A list syntactically missing
        // `key` is otherwise legal to parse.
        let mut obj = SchemaObject::new(name, ObjectPayload::List(payload), loc);
        if let Some(c) = config {
            obj.flags.config = c;
            obj.flags.config_set = true;
        }
        obj.when = when;
        obj.must = must;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_choice(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = ChoicePayload::default();
        let mut common = CommonDoc::default();
        let mut mandatory = None;
        let mut when = None;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "default" => payload.default_case = Some(self.parse_string_arg()?),
                            "mandatory" => mandatory = Some(self.parse_bool_arg("mandatory")?),
                            "when" => when = Some(self.parse_when()?),
                            "case" => {
                                let case_obj = self.parse_case()?;
                                payload.cases.push(self.register_new(case_obj, None));
                            }
                            _ => {
                                // §4.2.5 shorthand: a bare data-def keyword
                                // inside a choice is wrapped in a
                                // synthesized case named after it.
                                if let Some(child) = self.try_parse_datadef(&kw)? {
                                    let case_name = child.name.clone();
                                    let case_loc = child.location.clone();
                                    let child_id = self.register_new(child, None);
                                    let mut case_obj = SchemaObject::new(
                                        case_name,
                                        ObjectPayload::Case(CasePayload { children: vec![child_id] }),
                                        case_loc,
                                    );
                                    case_obj.nsid = self.nsid;
                                    payload.cases.push(self.register_new(case_obj, None));
                                } else {
                                    self.skip_unknown(&kw)?;
                                }
                            }
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::Choice(payload), loc);
        if let Some(m) = mandatory {
            obj.flags.mandatory = m;
            obj.flags.mandatory_set = true;
        }
        obj.when = when;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_case(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = CasePayload::default();
        let mut common = CommonDoc::default();
        let mut when = None;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "when" => when = Some(self.parse_when()?),
                            _ => {
                                if let Some(child) = self.try_parse_datadef(&kw)? {
                                    payload.children.push(self.register_new(child, None));
                                } else {
                                    self.skip_unknown(&kw)?;
                                }
                            }
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::Case(payload), loc);
        obj.when = when;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_anyxml(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut common = CommonDoc::default();
        let mut config = None;
        let mut mandatory = None;
        let mut when = None;
        let mut must = Vec::new();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "config" => config = Some(self.parse_bool_arg("config")?),
                            "mandatory" => mandatory = Some(self.parse_bool_arg("mandatory")?),
                            "when" => when = Some(self.parse_when()?),
                            "must" => must.push(self.parse_must()?),
                            _ => self.skip_unknown(&kw)?,
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::Anyxml(AnyxmlPayload {}), loc);
        if let Some(c) = config {
            obj.flags.config = c;
            obj.flags.config_set = true;
        }
        if let Some(m) = mandatory {
            obj.flags.mandatory = m;
            obj.flags.mandatory_set = true;
        }
        obj.when = when;
        obj.must = must;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_uses(&mut self) -> Result<SchemaObject, CompileError> {
        let (arg, loc) = self.current_argument();
        let (grouping_prefix, grouping_name) = match arg.split_once(':') {
            Some((p, n)) => (Some(p.to_string()), n.to_string()),
            None => (None, arg),
        };
        let has_body = self.body_enter()?;
        let mut payload = UsesPayload { grouping_prefix, grouping_name, grouping: None, refines: Vec::new(), augments: Vec::new() };
        let mut common = CommonDoc::default();
        let mut when = None;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "when" => when = Some(self.parse_when()?),
                            "refine" => {
                                let refine_obj = self.parse_refine()?;
                                payload.refines.push(self.register_new(refine_obj, None));
                            }
                            "augment" => {
                                let aug_obj = self.parse_augment()?;
                                payload.augments.push(self.register_new(aug_obj, None));
                            }
                            _ => self.skip_unknown(&kw)?,
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let mut obj = SchemaObject::new(payload.grouping_name.clone(), ObjectPayload::Uses(payload), loc);
        obj.when = when;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    /// `refine` (§4.4.1): sub-statement legality against the target kind
    /// is checked later, once the target is resolved inside `uses`
    /// expansion pre-checks — the parser only records whichever clauses
    /// were written.
    fn parse_refine(&mut self) -> Result<SchemaObject, CompileError> {
        let (target_path, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = RefinePayload { target_path, ..Default::default() };
        let mut common = CommonDoc::default();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "config" => {
                                if payload.config.is_some() {
                                    self.diags.push(self.cur_loc(), DiagnosticKind::DupRefineStmt("config".into()));
                                }
                                payload.config = Some(self.parse_bool_arg("config")?);
                            }
                            "mandatory" => {
                                if payload.mandatory.is_some() {
                                    self.diags.push(self.cur_loc(), DiagnosticKind::DupRefineStmt("mandatory".into()));
                                }
                                payload.mandatory = Some(self.parse_bool_arg("mandatory")?);
                            }
                            "presence" => payload.presence = Some(self.parse_string_arg()?),
                            "default" => {
                                if payload.default.is_some() {
                                    self.diags.push(self.cur_loc(), DiagnosticKind::DupRefineStmt("default".into()));
                                }
                                payload.default = Some(self.parse_string_arg()?);
                            }
                            "must" => payload.must.push(self.parse_must()?),
                            "min-elements" => payload.min_elements = Some(self.parse_uint_arg("min-elements")?),
                            "max-elements" => payload.max_elements = self.parse_max_elements_arg()?,
                            _ => self.skip_unknown(&kw)?,
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let name = payload.target_path.clone();
        let mut obj = SchemaObject::new(name, ObjectPayload::Refine(payload), loc);
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    /// `augment` (§4.5). Children are parsed now; whether they're legal at
    /// the (not-yet-resolved) target is entirely P5's concern.
    fn parse_augment(&mut self) -> Result<SchemaObject, CompileError> {
        let (target_path, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = AugmentPayload { target_path, ..Default::default() };
        let mut common = CommonDoc::default();
        let mut when = None;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "when" => when = Some(self.parse_when()?),
                            "case" => {
                                let case_obj = self.parse_case()?;
                                payload.children.push(self.register_new(case_obj, None));
                            }
                            _ => {
                                if let Some(child) = self.try_parse_datadef(&kw)? {
                                    payload.children.push(self.register_new(child, None));
                                } else {
                                    self.skip_unknown(&kw)?;
                                }
                            }
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let name = payload.target_path.clone();
        let mut obj = SchemaObject::new(name, ObjectPayload::Augment(payload), loc);
        obj.when = when;
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    // ---- rpc / notification --------------------------------------------

    fn parse_rpc(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = RpcPayload::default();
        let mut common = CommonDoc::default();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "typedef" => payload.typedefs.push(self.parse_typedef()?),
                            "grouping" => {
                                payload.groupings.push(self.parse_grouping(false)?);
                            }
                            "input" => payload.input = Some(self.parse_rpcio("input")?),
                            "output" => payload.output = Some(self.parse_rpcio("output")?),
                            _ => self.skip_unknown(&kw)?,
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        // §4.2.6: synthesize empty input/output when absent, so later
        // augment paths can target them uniformly.
        if payload.input.is_none() {
            let synth = SchemaObject::new("input", ObjectPayload::Rpcio(RpcioPayload::default()), Location::derived_from(&loc));
            payload.input = Some(self.register_new(synth, None));
        }
        if payload.output.is_none() {
            let synth = SchemaObject::new("output", ObjectPayload::Rpcio(RpcioPayload::default()), Location::derived_from(&loc));
            payload.output = Some(self.register_new(synth, None));
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::Rpc(payload), loc);
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    fn parse_rpcio(&mut self, which: &'static str) -> Result<ObjectId, CompileError> {
        let loc = self.cur_loc();
        let has_body = self.body_enter()?;
        let mut payload = RpcioPayload::default();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(_) => {}
                    BodyStep::Keyword(kw) => match kw.as_str() {
                        "typedef" => payload.typedefs.push(self.parse_typedef()?),
                        "grouping" => {
                            payload.groupings.push(self.parse_grouping(false)?);
                        }
                        _ => {
                            if let Some(child) = self.try_parse_datadef(&kw)? {
                                payload.children.push(self.register_new(child, None));
                            } else {
                                self.skip_unknown(&kw)?;
                            }
                        }
                    },
                    BodyStep::Unexpected => {}
                }
            }
        }
        let obj = SchemaObject::new(which, ObjectPayload::Rpcio(payload), loc);
        Ok(self.register_new(obj, None))
    }

    fn parse_notification(&mut self) -> Result<SchemaObject, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut payload = NotificationPayload::default();
        let mut common = CommonDoc::default();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(a) => common.appinfo.push(a),
                    BodyStep::Keyword(kw) => {
                        if self.try_common_doc(&kw, &mut common)? {
                            continue;
                        }
                        match kw.as_str() {
                            "typedef" => payload.typedefs.push(self.parse_typedef()?),
                            "grouping" => {
                                payload.groupings.push(self.parse_grouping(false)?);
                            }
                            _ => {
                                if let Some(child) = self.try_parse_datadef(&kw)? {
                                    payload.children.push(self.register_new(child, None));
                                } else {
                                    self.skip_unknown(&kw)?;
                                }
                            }
                        }
                    }
                    BodyStep::Unexpected => {}
                }
            }
        }
        let mut obj = SchemaObject::new(name, ObjectPayload::Notification(payload), loc);
        self.finish_common(&mut obj, common);
        Ok(obj)
    }

    // ---- deviation ------------------------------------------------------

    fn parse_deviation(&mut self) -> Result<crate::deviation::Deviation, CompileError> {
        use crate::deviation::{Deviate, DeviateClause, DeviateKind};
        let (target_path, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut deviates = Vec::new();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(_) => {}
                    BodyStep::Keyword(kw) if kw == "description" || kw == "reference" => {
                        let _ = self.parse_string_arg()?;
                    }
                    BodyStep::Keyword(kw) if kw == "deviate" => {
                        let (arg, dev_loc) = self.current_argument();
                        let deviate_kind = match arg.as_str() {
                            "not-supported" => DeviateKind::NotSupported,
                            "add" => DeviateKind::Add,
                            "delete" => DeviateKind::Delete,
                            "replace" => DeviateKind::Replace,
                            other => {
                                self.diags.push(dev_loc.clone(), DiagnosticKind::InvalidDevStmt(format!("unknown deviate kind '{other}'")));
                                DeviateKind::Add
                            }
                        };
                        let dev_has_body = self.body_enter()?;
                        let mut clauses = Vec::new();
                        if dev_has_body {
                            loop {
                                match self.body_step()? {
                                    BodyStep::Done => break,
                                    BodyStep::Appinfo(_) => {}
                                    BodyStep::Keyword(k) => match k.as_str() {
                                        "type" => clauses.push(DeviateClause::Type(self.consume_type()?)),
                                        "units" => clauses.push(DeviateClause::Units(self.parse_string_arg()?)),
                                        "default" => clauses.push(DeviateClause::Default(self.parse_string_arg()?)),
                                        "config" => clauses.push(DeviateClause::Config(self.parse_bool_arg("config")?)),
                                        "mandatory" => clauses.push(DeviateClause::Mandatory(self.parse_bool_arg("mandatory")?)),
                                        "min-elements" => clauses.push(DeviateClause::MinElements(self.parse_uint_arg("min-elements")?)),
                                        "max-elements" => {
                                            if let Some(n) = self.parse_max_elements_arg()? {
                                                clauses.push(DeviateClause::MaxElements(n));
                                            }
                                        }
                                        "must" => clauses.push(DeviateClause::Must(self.parse_must()?)),
                                        "unique" => clauses.push(DeviateClause::Unique(self.parse_string_arg()?)),
                                        _ => self.skip_unknown(&k)?,
                                    },
                                    BodyStep::Unexpected => {}
                                }
                            }
                        }
                        deviates.push(Deviate { kind: deviate_kind, clauses, location: dev_loc });
                    }
                    BodyStep::Keyword(kw) => self.skip_unknown(&kw)?,
                    BodyStep::Unexpected => {}
                }
            }
        }
        Ok(crate::deviation::Deviation {
            target_path,
            resolved_target: None,
            deviates,
            location: loc,
            declaring_module: self.module_name.clone(),
        })
    }

    // ---- module -----------------------------------------------------------

    fn parse_import(&mut self) -> Result<Import, CompileError> {
        let (module, _loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut prefix = String::new();
        let mut revision = None;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(_) => {}
                    BodyStep::Keyword(kw) if kw == "prefix" => prefix = self.parse_string_arg()?,
                    BodyStep::Keyword(kw) if kw == "revision-date" => revision = Some(self.parse_string_arg()?),
                    BodyStep::Keyword(kw) => self.skip_unknown(&kw)?,
                    BodyStep::Unexpected => {}
                }
            }
        }
        Ok(Import { module, prefix, revision })
    }

    fn parse_feature(&mut self) -> Result<Feature, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut if_features = Vec::new();
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(_) => {}
                    BodyStep::Keyword(kw) if kw == "if-feature" => if_features.push(self.parse_string_arg()?),
                    BodyStep::Keyword(kw) if kw == "description" || kw == "reference" || kw == "status" => {
                        let _ = self.parse_string_arg()?;
                    }
                    BodyStep::Keyword(kw) => self.skip_unknown(&kw)?,
                    BodyStep::Unexpected => {}
                }
            }
        }
        Ok(Feature { name, if_features, location: loc })
    }

    fn parse_identity(&mut self) -> Result<Identity, CompileError> {
        let (name, loc) = self.current_argument();
        let has_body = self.body_enter()?;
        let mut base = None;
        if has_body {
            loop {
                match self.body_step()? {
                    BodyStep::Done => break,
                    BodyStep::Appinfo(_) => {}
                    BodyStep::Keyword(kw) if kw == "base" => base = Some(self.parse_string_arg()?),
                    BodyStep::Keyword(kw) if kw == "description" || kw == "reference" || kw == "status" => {
                        let _ = self.parse_string_arg()?;
                    }
                    BodyStep::Keyword(kw) => self.skip_unknown(&kw)?,
                    BodyStep::Unexpected => {}
                }
            }
        }
        Ok(Identity { name, base, location: loc })
    }
}

/// Top-level entry point (§4.2): parse a `module` or `submodule` statement
/// from the current position of `tokens` into a [`Module`] plus its
/// contribution to `arena`. The caller (`compile_module`) positions the
/// stream at the `module`/`submodule` keyword and assigns `nsid` (the
/// module's namespace id, §3.1).
pub fn consume_module<T: TokenStream>(
    tokens: &mut T,
    arena: &mut ModuleArena,
    diags: &mut Diagnostics,
    types: &dyn TypeSystem,
    xpath: &dyn XPathEngine,
    nsid: u32,
    grpindex_start: &mut u32,
) -> Result<Module, CompileError> {
    let is_submodule = tokens.current_value() == "submodule";
    if tokens.current_kind() != TokenKind::Identifier || (tokens.current_value() != "module" && !is_submodule) {
        diags.push(
            Location::new("<unknown>", tokens.current_line(), tokens.current_column()),
            DiagnosticKind::InvalidValue("expected 'module' or 'submodule'".into()),
        );
        return Err(CompileError::UnexpectedEof { context: "module header" });
    }
    tokens.advance();
    let module_name = tokens.current_value().to_string();
    let mut parser = Parser {
        tokens,
        arena,
        diags,
        types,
        xpath,
        module_name: module_name.clone(),
        nsid,
        next_grpindex: *grpindex_start,
    };
    let mut module = Module::new(module_name, "", "");
    let has_body = parser.body_enter()?;
    if !has_body {
        *grpindex_start = parser.next_grpindex;
        return Ok(module);
    }
    loop {
        match parser.body_step()? {
            BodyStep::Done => break,
            BodyStep::Appinfo(_) => {}
            BodyStep::Keyword(kw) => match kw.as_str() {
                "namespace" => module.namespace = parser.parse_string_arg()?,
                "prefix" => module.prefix = parser.parse_string_arg()?,
                "yang-version" => module.yang_version = parser.parse_string_arg()?,
                "belongs-to" => {
                    let (parent, loc2) = parser.current_argument();
                    module.belongs_to = Some(parent);
                    let sub_has_body = parser.body_enter()?;
                    if sub_has_body {
                        loop {
                            match parser.body_step()? {
                                BodyStep::Done => break,
                                BodyStep::Appinfo(_) => {}
                                BodyStep::Keyword(k) if k == "prefix" => module.prefix = parser.parse_string_arg()?,
                                BodyStep::Keyword(k) => parser.skip_unknown(&k)?,
                                BodyStep::Unexpected => {}
                            }
                        }
                    }
                    let _ = loc2;
                }
                "organization" => module.organization = Some(parser.parse_string_arg()?),
                "contact" => module.contact = Some(parser.parse_string_arg()?),
                "description" => module.description = Some(parser.parse_string_arg()?),
                "reference" => module.reference = Some(parser.parse_string_arg()?),
                "revision" => {
                    let (date, _loc) = parser.current_argument();
                    let has_rev_body = parser.body_enter()?;
                    if has_rev_body {
                        parser.tokens.advance();
                        parser.skip_balanced_body_from_open()?;
                    }
                    if module.revision.is_none() {
                        module.revision = Some(date);
                    }
                }
                "import" => module.imports.push(parser.parse_import()?),
                "include" => {
                    let (name, _loc) = parser.current_argument();
                    let has_inc_body = parser.body_enter()?;
                    if has_inc_body {
                        loop {
                            match parser.body_step()? {
                                BodyStep::Done => break,
                                BodyStep::Appinfo(_) => {}
                                BodyStep::Keyword(k) => parser.skip_unknown(&k)?,
                                BodyStep::Unexpected => {}
                            }
                        }
                    }
                    module.includes.push(name);
                }
                "feature" => module.features.push(parser.parse_feature()?),
                "identity" => module.identities.push(parser.parse_identity()?),
                "typedef" => module.typedefs.push(parser.parse_typedef()?),
                "grouping" => module.groupings.push(parser.parse_grouping(true)?),
                "rpc" => {
                    let obj = parser.parse_rpc()?;
                    let id = parser.register_top(obj, &mut module);
                    let _ = id;
                }
                "notification" => {
                    let obj = parser.parse_notification()?;
                    let _ = parser.register_top(obj, &mut module);
                }
                "augment" => {
                    let obj = parser.parse_augment()?;
                    let id = parser.register_new(obj, None);
                    module.augments.push(id);
                    module.statement_order.push(id);
                }
                "deviation" => {
                    let deviation = parser.parse_deviation()?;
                    module.deviations.push(deviation);
                }
                _ => {
                    if let Some(obj) = parser.try_parse_datadef(&kw)? {
                        let _ = parser.register_top(obj, &mut module);
                    } else {
                        parser.skip_unknown(&kw)?;
                    }
                }
            },
            BodyStep::Unexpected => {}
        }
    }
    *grpindex_start = parser.next_grpindex;
    Ok(module)
}

impl<'a, T: TokenStream> Parser<'a, T> {
    /// Register a new top-level object (§4.2.4): duplicate-name detection
    /// against the module's own `datadefs`, append to both `datadefs` and
    /// `statement_order`, and mark the `top` flag.
    fn register_top(&mut self, obj: SchemaObject, module: &mut Module) -> ObjectId {
        let duplicate = module
            .datadefs
            .iter()
            .any(|&id| self.arena.objects[id].name == obj.name);
        if duplicate {
            self.diags.push(obj.location.clone(), DiagnosticKind::DupEntry(obj.name.clone()));
        }
        let mut obj = obj;
        obj.flags.top = true;
        let id = self.arena.objects.insert(obj);
        module.datadefs.push(id);
        module.statement_order.push(id);
        id
    }

    /// Skip the remainder of an already-opened balanced body (used by
    /// `revision`'s description/reference sub-clauses, which this crate
    /// doesn't otherwise need structured).
    fn skip_balanced_body_from_open(&mut self) -> Result<(), CompileError> {
        let mut depth = 1i32;
        loop {
            match self.tokens.current_kind() {
                TokenKind::LeftBrace => {
                    depth += 1;
                    self.tokens.advance();
                }
                TokenKind::RightBrace => {
                    depth -= 1;
                    self.tokens.advance();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                TokenKind::Eof => {
                    self.diags.push(self.cur_loc(), DiagnosticKind::Eof);
                    return Err(CompileError::UnexpectedEof { context: "revision body" });
                }
                _ => {
                    self.tokens.advance();
                }
            }
        }
    }
}

#[allow(unused)]
fn assert_kind_is_schema_node(kind: ObjectKind) -> bool {
    kind.is_schema_node()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Token, TokenCursor};
    use crate::typedef::BuiltinTypeSystem;
    use crate::xpath::SchemaPathResolver;

    fn tok(kind: TokenKind, value: &str) -> Token {
        Token { kind, value: value.to_string(), line: 1, column: 1 }
    }

    fn lex(src: &str) -> Vec<Token> {
        // A tiny hand-rolled lexer for the parser's own tests: splits on
        // whitespace/punctuation, quoting strings with `"`. Stands in for
        // the external lexer collaborator (§6.1), which this crate never
        // implements itself.
        let mut out = Vec::new();
        let mut chars = src.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                }
                ';' => {
                    chars.next();
                    out.push(tok(TokenKind::Semicolon, ";"));
                }
                '{' => {
                    chars.next();
                    out.push(tok(TokenKind::LeftBrace, "{"));
                }
                '}' => {
                    chars.next();
                    out.push(tok(TokenKind::RightBrace, "}"));
                }
                '"' => {
                    chars.next();
                    let mut s = String::new();
                    while let Some(&c2) = chars.peek() {
                        if c2 == '"' {
                            chars.next();
                            break;
                        }
                        s.push(c2);
                        chars.next();
                    }
                    out.push(tok(TokenKind::String, &s));
                }
                _ => {
                    let mut s = String::new();
                    while let Some(&c2) = chars.peek() {
                        if c2.is_whitespace() || c2 == ';' || c2 == '{' || c2 == '}' {
                            break;
                        }
                        s.push(c2);
                        chars.next();
                    }
                    let kind = if s.contains(':') { TokenKind::PrefixedIdentifier } else { TokenKind::Identifier };
                    out.push(tok(kind, &s));
                }
            }
        }
        out
    }

    fn parse(src: &str) -> (Module, ModuleArena, Diagnostics) {
        let tokens = lex(src);
        let mut cursor = TokenCursor::new(tokens);
        let mut arena = ModuleArena::new();
        let mut diags = Diagnostics::new();
        let types = BuiltinTypeSystem;
        let xpath = SchemaPathResolver;
        let mut grpindex = 0;
        let module = consume_module(&mut cursor, &mut arena, &mut diags, &types, &xpath, 1, &mut grpindex).unwrap();
        (module, arena, diags)
    }

    #[test]
    fn parses_minimal_module_with_one_leaf() {
        let (module, arena, diags) = parse(
            r#"module m { namespace "urn:m"; prefix m; leaf x { type int32; } }"#,
        );
        assert!(!diags.has_errors());
        assert_eq!(module.namespace, "urn:m");
        assert_eq!(module.datadefs.len(), 1);
        let leaf = &arena.objects[module.datadefs[0]];
        assert_eq!(leaf.name, "x");
        assert_eq!(leaf.kind(), ObjectKind::Leaf);
    }

    #[test]
    fn leaf_missing_type_is_data_missing() {
        let (_module, _arena, diags) = parse(r#"module m { leaf x; }"#);
        assert!(diags.has_errors());
    }

    #[test]
    fn duplicate_top_level_name_is_dup_entry() {
        let (_module, _arena, diags) = parse(
            r#"module m { leaf x { type string; } leaf x { type string; } }"#,
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn choice_shorthand_wraps_bare_dataref_in_synthesized_case() {
        let (_module, arena, diags) = parse(
            r#"module m { choice c { leaf a { type string; } } }"#,
        );
        assert!(!diags.has_errors());
        let choice_id = arena
            .objects
            .iter()
            .find(|(_, o)| o.kind() == ObjectKind::Choice)
            .unwrap()
            .0;
        let ObjectPayload::Choice(choice) = &arena.objects[choice_id].payload else { panic!() };
        assert_eq!(choice.cases.len(), 1);
        let case = &arena.objects[choice.cases[0]];
        assert_eq!(case.name, "a");
        assert_eq!(case.kind(), ObjectKind::Case);
    }

    #[test]
    fn rpc_without_io_gets_synthetic_input_and_output() {
        let (_module, arena, diags) = parse(r#"module m { rpc r; }"#);
        assert!(!diags.has_errors());
        let rpc_id = arena.objects.iter().find(|(_, o)| o.kind() == ObjectKind::Rpc).unwrap().0;
        let ObjectPayload::Rpc(rpc) = &arena.objects[rpc_id].payload else { panic!() };
        assert!(rpc.input.is_some());
        assert!(rpc.output.is_some());
        assert_eq!(arena.objects[rpc.input.unwrap()].name, "input");
        assert_eq!(arena.objects[rpc.output.unwrap()].name, "output");
    }

    #[test]
    fn uses_with_refine_is_parsed() {
        let (_module, arena, diags) = parse(
            r#"module m {
                grouping g { leaf x { type int32; mandatory true; } }
                uses g { refine x { mandatory false; } }
            }"#,
        );
        assert!(!diags.has_errors());
        let uses_id = arena.objects.iter().find(|(_, o)| o.kind() == ObjectKind::Uses).unwrap().0;
        let ObjectPayload::Uses(uses) = &arena.objects[uses_id].payload else { panic!() };
        assert_eq!(uses.grouping_name, "g");
        assert_eq!(uses.refines.len(), 1);
        let ObjectPayload::Refine(refine) = &arena.objects[uses.refines[0]].payload else { panic!() };
        assert_eq!(refine.mandatory, Some(false));
    }
}
