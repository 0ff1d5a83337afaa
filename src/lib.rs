//! Top-level entry point: wires the six phases of §2 into one
//! `compile_unit`/`compile_module` call over a shared [`ModuleContext`],
//! the way the teacher's `validation::validate<D: Drivers>(...)` takes the
//! whole `Tables` plus its external collaborators and runs every pass in
//! sequence, returning a `tables::Errors` alongside the validated value
//! rather than bailing on the first problem (§9.4: `tracing::instrument`
//! spans one per phase).
//!
//! This crate is a library, not a CLI: callers own the token stream(s),
//! the [`TypeSystem`]/[`XPathEngine`] collaborators, and — for multi-module
//! compiles — the [`DeviationMailbox`] that carries staged deviations
//! across separate `compile_unit` invocations (§4.6.1).

pub mod arena;
pub mod augment;
pub mod config;
pub mod deviation;
pub mod diagnostics;
pub mod final_check;
pub mod grouping;
pub mod location;
pub mod module;
pub mod object;
pub mod parser;
pub mod resolve;
pub mod schema_path;
pub mod token;
pub mod typedef;
pub mod uses_expand;
pub mod xpath;

use arena::ModuleArena;
use config::CompilerConfig;
use diagnostics::{CompileError, Diagnostics};
use module::{DeviationMailbox, Module, ModuleContext};
use token::TokenStream;
use typedef::TypeSystem;
use xpath::{SchemaNodeId, XPathEngine};

/// The result of one `compile_unit`/`compile_module` call: the fully
/// resolved, expanded, and validated object tree (even if invalid —
/// callers inspecting *why* a module failed still want the partial tree)
/// plus every diagnostic surfaced across all six phases (§7: "if any
/// phase's aggregated retres is non-OK, the compiled module is marked
/// invalid and not published to the consumer").
#[derive(Debug)]
pub struct CompiledModule {
    pub ctx: ModuleContext,
    pub diagnostics: Diagnostics,
}

impl CompiledModule {
    /// Whether this compile produced no error-severity diagnostic. Mirrors
    /// the "retres" check a parent phase performs before deciding whether
    /// to proceed (§7) — here applied once, at the very end, to decide
    /// whether the caller should publish the tree to a consumer.
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Find the module name a deviation's absolute target path resolves
/// against, using the *declaring* module's own import table rather than
/// the (possibly not-yet-compiled) target module — this is exactly what
/// lets a deviation-only module be compiled standalone and still know
/// which main module to stage itself against (§4.6.1, §9 design notes'
/// "message-style staging").
fn deviation_target_module(declaring: &Module, target_path: &str) -> Option<String> {
    let parsed = SchemaNodeId::parse(target_path).ok()?;
    let first = parsed.steps.first()?;
    match &first.prefix {
        None => Some(declaring.name.clone()),
        Some(prefix) if *prefix == declaring.prefix => Some(declaring.name.clone()),
        Some(prefix) => declaring
            .imports
            .iter()
            .find(|imp| imp.prefix == *prefix)
            .map(|imp| imp.module.clone()),
    }
}

/// Parse a main module (and, if given, its submodules, all sharing one
/// [`ModuleArena`]) from token streams into a fresh [`ModuleContext`] (P1
/// is the caller-supplied `TokenStream`; P2 is [`parser::consume_module`]).
/// `submodule_tokens` must be supplied in `include` order; this function
/// does not itself cross-check that every `include` in the main module has
/// a corresponding entry here — that bookkeeping belongs to whatever
/// driver resolves submodule file names to token streams.
fn parse_unit<T: TokenStream>(
    main_tokens: &mut T,
    submodule_tokens: &mut [T],
    diags: &mut Diagnostics,
    types: &dyn TypeSystem,
    xpath: &dyn XPathEngine,
) -> Result<ModuleContext, CompileError> {
    let mut arena = ModuleArena::new();
    let mut grpindex = 0u32;
    let mut nsid = 1u32;

    let main = parser::consume_module(main_tokens, &mut arena, diags, types, xpath, nsid, &mut grpindex)?;
    let mut submodules = Vec::with_capacity(submodule_tokens.len());
    for sub_tokens in submodule_tokens.iter_mut() {
        nsid += 1;
        let submodule = parser::consume_module(sub_tokens, &mut arena, diags, types, xpath, nsid, &mut grpindex)?;
        submodules.push(submodule);
    }

    let mut ctx = ModuleContext::from_parts(main, arena, nsid + 1, grpindex);
    for submodule in submodules {
        ctx.add_submodule(submodule);
    }
    Ok(ctx)
}

/// Collect every deviation declared inside this compilation unit (the main
/// module plus its submodules), moving out-of-unit targets into `mailbox`
/// (§4.6.1's savedev staging) and pulling in anything previously staged
/// against this unit's main module. Returns the deviations to apply
/// locally, not yet normalized (§4.6.2 runs in the caller).
fn collect_local_deviations(ctx: &mut ModuleContext, mailbox: &mut DeviationMailbox) -> Vec<deviation::Deviation> {
    let mut local = Vec::new();
    let module_names: Vec<String> = ctx.modules().map(|m| m.name.clone()).collect();
    for name in &module_names {
        let Some(module) = ctx.modules_mut().find(|m| m.name == *name) else { continue };
        let declared = std::mem::take(&mut module.deviations);
        let declaring = module.clone();
        for deviation in declared {
            match deviation_target_module(&declaring, &deviation.target_path) {
                Some(target) if target == ctx.main.name => local.push(deviation),
                Some(target) => mailbox.stage(target, deviation),
                None => local.push(deviation),
            }
        }
    }
    local.extend(mailbox.drain_for(&ctx.main.name));
    local
}

/// Run P3 through P6 over an already-parsed [`ModuleContext`] (§2's
/// pipeline, minus P1/P2). Exposed separately from [`compile_unit`] so a
/// deviation-only module — which has no data definitions of its own to
/// resolve, only deviations to stage — can still be run through the same
/// pipeline shape without special-casing it at the call site: an empty
/// datadefQ makes every phase below a no-op except deviation collection.
#[tracing::instrument(skip_all)]
fn run_pipeline(
    ctx: &mut ModuleContext,
    diags: &mut Diagnostics,
    config: &CompilerConfig,
    types: &dyn TypeSystem,
    xpath: &dyn XPathEngine,
    mailbox: &mut DeviationMailbox,
) -> Result<(), CompileError> {
    // P3: resolve datadefs (types, if-features, local structural checks).
    resolve::resolve_datadefs(ctx, diags, types, xpath)?;

    // P4: expand uses (clone grouping bodies, apply refinements, recurse).
    uses_expand::expand_all_uses(ctx, diags, config.max_uses_depth)?;

    // P5a: expand augments (splice into targets; obsolete ones are skipped
    // by expand_augment itself). Augments nested inside a uses were already
    // expanded as part of that uses's own expansion in P4.
    augment::expand_all_augments(ctx, diags)?;

    // Mark each list's current key leaves before deviations apply (§4.6.4
    // Open Question #2): `apply_not_supported`'s key-leaf guard needs
    // `flags.key` to already be right, and P6 — the only other place that
    // sets it — doesn't run until after deviation application below.
    deviation::mark_key_flags(&mut ctx.arena.objects);

    // P5b: collect, normalize, resolve targets, and apply deviations.
    let local_deviations = collect_local_deviations(ctx, mailbox);
    let mut normalized = deviation::normalize_deviations(local_deviations, diags);
    for dev in &mut normalized {
        if let Ok(parsed) = SchemaNodeId::parse(&dev.target_path) {
            dev.resolved_target = schema_path::resolve(ctx, &parsed, &[]);
        }
        if dev.resolved_target.is_none() {
            diags.push(
                dev.location.clone(),
                diagnostics::DiagnosticKind::MissingRefTarget(dev.target_path.clone()),
            );
        }
    }
    let retest = deviation::apply_deviations(&mut ctx.arena.objects, &normalized, diags);
    ctx.main.deviations = normalized;

    // §4.6.4: a deviate that mutates a resolution-affecting field (type,
    // default, config, mandatory, min-elements, unique — Open Question #1)
    // raises a retest flag. Re-running the whole resolver is the simplest
    // correct way to redo the validation-only work the spec calls for,
    // since every one-shot piece it also does (typedef/grouping lookup) is
    // already idempotent by construction (§3.5 "Expansion idempotence"
    // applies equally to typedef interning here).
    if !retest.is_empty() {
        resolve::resolve_datadefs(ctx, diags, types, xpath)?;
    }

    // §4.6.5: garbage-collect deleted subtrees. A parent that lost its
    // last key or only child is caught by P6's own checks below, which
    // walk every surviving object fresh.
    deviation::garbage_collect_deleted(&mut ctx.arena.objects);

    // P6: keys/uniques, must/when/leafref XPath, mandatory-at-root,
    // leafref loops.
    final_check::run_final_checks(ctx, diags, types, xpath, config)?;

    diags.apply_config(config);
    Ok(())
}

/// Compile a main module plus its submodules (§4.1: one parser control
/// block spans a main module and every submodule it includes) into a
/// [`CompiledModule`]. `mailbox` carries deviations staged by (or for)
/// other compilation units; pass a fresh [`DeviationMailbox::new`] for a
/// one-shot compile, or thread the same mailbox across a batch of related
/// modules so deviation-only modules can target modules compiled either
/// before or after them.
#[tracing::instrument(skip_all, fields(submodules = submodule_tokens.len()))]
pub fn compile_unit<T: TokenStream>(
    main_tokens: &mut T,
    submodule_tokens: &mut [T],
    config: &CompilerConfig,
    types: &dyn TypeSystem,
    xpath: &dyn XPathEngine,
    mailbox: &mut DeviationMailbox,
) -> Result<CompiledModule, CompileError> {
    let mut diags = Diagnostics::new();
    let mut ctx = parse_unit(main_tokens, submodule_tokens, &mut diags, types, xpath)?;
    run_pipeline(&mut ctx, &mut diags, config, types, xpath, mailbox)?;
    Ok(CompiledModule { ctx, diagnostics: diags })
}

/// Compile a single standalone module (no submodules, a fresh, throwaway
/// deviation mailbox) — the common case, and what every scenario test in
/// this crate's own suite drives.
pub fn compile_module<T: TokenStream>(
    tokens: &mut T,
    config: &CompilerConfig,
    types: &dyn TypeSystem,
    xpath: &dyn XPathEngine,
) -> Result<CompiledModule, CompileError> {
    let mut mailbox = DeviationMailbox::new();
    compile_unit(tokens, &mut [], config, types, xpath, &mut mailbox)
}
