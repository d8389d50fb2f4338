//! Verification pipeline (spec §4.7) — Component G. Orchestrates every
//! other component in the order spec §4.7 fixes:
//!
//! 1. Check the layout's own signature(s) against the supplied root keys.
//! 2. Check the layout has not expired.
//! 3. Substitute `{NAME}` parameters into a working copy.
//! 4. For each step, load its candidate links, keep only those with a
//!    valid signature from an authorized key, cluster the survivors by
//!    agreement, and require at least `threshold` links in one cluster.
//! 5. Warn (do not fail) when a link's recorded command does not match
//!    the step's `expected_command`.
//! 6. Evaluate each step's and inspection's artifact rules.
//! 7. Run inspections (spec §4.7: inspections execute against the
//!    verifier's own working tree, not the step's).
//! 8. Recurse into any step whose product is itself a sub-layout.
//!
//! Verification stops at the first fatal error per step (spec §7); the
//! error's [`Kind`] tells the caller which phase failed.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use thiserror::Error;

use crate::context::VerificationContext;
use crate::crypto::PublicKey;
use crate::error::{Classify, Kind};
use crate::filesystem::FileSource;
use crate::model::{Link, Metadata, Payload, Step};
use crate::resolvers::{self, ResolveContext, ResolveError};
use crate::ruleengine::{self, RuleError};
use crate::runner::{CommandRunner, RunError};
use crate::substitution::{self, UndefinedParameter};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("layout signature threshold not met: {0} of {1} required root keys signed")]
    LayoutSignature(usize, usize),
    #[error("layout expired at {0}")]
    Expired(chrono::DateTime<Utc>),
    #[error("step {0:?}: only {1} of {2} required links agree")]
    Threshold(String, usize, usize),
    #[error("step {0:?}: {1}")]
    Rule(String, #[source] RuleError),
    #[error("inspection {0:?} failed: {1}")]
    Inspection(String, #[source] RunError),
    #[error("step {0:?}: failed to load link: {1}")]
    LinkLoad(String, std::io::Error),
    #[error("step {0:?}: malformed link: {1}")]
    LinkSchema(String, String),
    #[error("step {0:?}: {1}")]
    Substitution(String, #[source] UndefinedParameter),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl Classify for VerifyError {
    fn kind(&self) -> Kind {
        match self {
            VerifyError::LayoutSignature(..) => Kind::Crypto,
            VerifyError::Expired(_) => Kind::Expired,
            VerifyError::Threshold(..) => Kind::Threshold,
            VerifyError::Rule(_, e) => e.kind(),
            VerifyError::Inspection(_, e) => e.kind(),
            VerifyError::LinkLoad(..) => Kind::Io,
            VerifyError::LinkSchema(..) => Kind::Schema,
            VerifyError::Substitution(..) => Kind::Schema,
            VerifyError::Resolve(e) => e.kind(),
        }
    }
}

/// Non-fatal observations collected during verification (spec §4.7 step
/// 5: a command mismatch is a warning, not a failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub step: String,
    pub message: String,
}

/// The outcome of a successful verification run.
pub struct Report {
    pub warnings: Vec<Warning>,
    /// The link selected to satisfy each step's threshold, keyed by step
    /// name — fed to dependent steps' MATCH rules and to sublayout
    /// recursion.
    pub accepted_links: BTreeMap<String, Link>,
}

/// Load every candidate link for `step` from `ctx.link_dir`, named by the
/// `<step>.<keyid-prefix>.link` convention (spec §4.5). Returns the
/// matched filename alongside each parsed [`Metadata`] so sublayout
/// recursion (spec §4.7 step 8) can recover the `<keyid-prefix>` that
/// names the nested evidence subdirectory.
fn candidate_links(step: &str, ctx: &VerificationContext) -> Result<Vec<(String, Metadata)>, VerifyError> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(&ctx.link_dir) {
        Ok(e) => e,
        Err(e) => return Err(VerifyError::LinkLoad(step.to_string(), e)),
    };
    let prefix = format!("{step}.");
    for entry in entries {
        let entry = entry.map_err(|e| VerifyError::LinkLoad(step.to_string(), e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(".link") {
            let bytes = std::fs::read(entry.path()).map_err(|e| VerifyError::LinkLoad(step.to_string(), e))?;
            let metadata: Metadata = serde_json::from_slice(&bytes)
                .map_err(|e| VerifyError::LinkSchema(step.to_string(), e.to_string()))?;
            out.push((name, metadata));
        }
    }
    Ok(out)
}

/// The `<keyid-prefix>` segment of a `<step>.<keyid-prefix>.link` filename.
fn keyid_prefix_from_filename(step: &str, filename: &str) -> Result<String, VerifyError> {
    filename
        .strip_prefix(&format!("{step}."))
        .and_then(|rest| rest.strip_suffix(".link"))
        .map(str::to_string)
        .ok_or_else(|| VerifyError::LinkSchema(step.to_string(), format!("malformed link filename {filename:?}")))
}

/// Filter to links with a valid signature from one of `step`'s authorized
/// keys, then cluster by (command, materials, products) agreement (spec
/// §4.7 step 4). Ties between equally-sized clusters are broken by
/// preferring the cluster whose earliest-loaded link sorts first by
/// keyid, so the choice is deterministic rather than depending on
/// filesystem enumeration order.
fn select_threshold_link(
    step: &Step,
    candidates: &[(String, Metadata)],
    layout_keys: &BTreeMap<String, PublicKey>,
) -> Result<(Link, Vec<Warning>), VerifyError> {
    let authorized: BTreeMap<String, PublicKey> =
        step.pubkeys.iter().filter_map(|id| layout_keys.get(id).map(|k| (id.clone(), k.clone()))).collect();

    let mut accepted: Vec<(String, Link)> = Vec::new();
    for (_, metadata) in candidates {
        let valid_keyids = metadata.valid_signer_keyids(&authorized);
        if valid_keyids.is_empty() {
            continue;
        }
        let Ok(payload) = metadata.payload() else { continue };
        let Some(link) = payload.as_link() else { continue };
        for keyid in valid_keyids {
            accepted.push((keyid, link.clone()));
        }
    }

    if accepted.is_empty() {
        return Err(VerifyError::Threshold(step.name.clone(), 0, step.threshold));
    }

    let mut clusters: Vec<(Link, Vec<String>)> = Vec::new();
    for (keyid, link) in accepted {
        if let Some((_, signers)) = clusters.iter_mut().find(|(existing, _)| existing.agrees_with(&link)) {
            signers.push(keyid);
        } else {
            clusters.push((link, vec![keyid]));
        }
    }

    clusters.sort_by(|a, b| {
        b.1.len().cmp(&a.1.len()).then_with(|| a.1.iter().min().cmp(&b.1.iter().min()))
    });

    let (winner, signers) = clusters.into_iter().next().expect("at least one cluster since accepted is non-empty");
    let mut unique_signers = signers.clone();
    unique_signers.sort();
    unique_signers.dedup();

    if unique_signers.len() < step.threshold {
        return Err(VerifyError::Threshold(step.name.clone(), unique_signers.len(), step.threshold));
    }

    let mut warnings = Vec::new();
    if winner.command != step.expected_command {
        warnings.push(Warning {
            step: step.name.clone(),
            message: format!("recorded command {:?} does not match expected {:?}", winner.command, step.expected_command),
        });
    }

    Ok((winner, warnings))
}

/// Recurse into a step whose link is itself a sub-layout (spec §4.7 step
/// 8): the sub-layout's evidence lives in `<step>.<keyid-prefix>/`, where
/// `<keyid-prefix>` is recovered from the candidate's own filename, and
/// the parent step's `pubkeys` become the sub-layout's owner keys. The
/// sub-layout's terminal step supplies the products reported back to the
/// parent as a summary link (its own materials are left empty — the
/// parent layout only ever inspects the sub-layout's final output).
#[allow(clippy::too_many_arguments)]
fn verify_sublayout_step(
    step: &Step,
    filename: &str,
    sub_layout_metadata: &Metadata,
    parent_keys: &BTreeMap<String, PublicKey>,
    ctx: &VerificationContext,
    source: &dyn FileSource,
    runner: &dyn CommandRunner,
    now: chrono::DateTime<Utc>,
) -> Result<(Link, Vec<Warning>), VerifyError> {
    let prefix = keyid_prefix_from_filename(&step.name, filename)?;
    let sub_dir = ctx.link_dir.join(format!("{}.{}", step.name, prefix));

    let owner_keys: BTreeMap<String, PublicKey> =
        step.pubkeys.iter().filter_map(|id| parent_keys.get(id).map(|k| (id.clone(), k.clone()))).collect();

    let mut sub_ctx = VerificationContext::new(sub_dir);
    sub_ctx.base_path = ctx.base_path.clone();
    sub_ctx.excludes = ctx.excludes.clone();
    sub_ctx.algorithms = ctx.algorithms.clone();
    sub_ctx.parameters = ctx.parameters.clone();

    let sub_report = verify(sub_layout_metadata, &owner_keys, step.threshold, &sub_ctx, source, runner, now)?;

    let payload =
        sub_layout_metadata.payload().map_err(|e| VerifyError::LinkSchema(step.name.clone(), e.to_string()))?;
    let sub_layout = payload
        .as_layout()
        .ok_or_else(|| VerifyError::LinkSchema(step.name.clone(), "sublayout payload is not a layout".into()))?;
    let last_step_name = sub_layout
        .steps
        .last()
        .map(|s| &s.name)
        .ok_or_else(|| VerifyError::LinkSchema(step.name.clone(), "sublayout has no steps".into()))?;
    let terminal_link = sub_report
        .accepted_links
        .get(last_step_name)
        .ok_or_else(|| VerifyError::LinkSchema(step.name.clone(), "sublayout terminal step link missing".into()))?;

    let mut summary = Link::new(&step.name);
    summary.command = terminal_link.command.clone();
    summary.products = terminal_link.products.clone();

    Ok((summary, sub_report.warnings))
}

/// Run the full pipeline against an already-loaded, already-validated
/// layout and its signatures.
pub fn verify(
    layout_metadata: &Metadata,
    root_keys: &BTreeMap<String, PublicKey>,
    threshold: usize,
    ctx: &VerificationContext,
    source: &dyn FileSource,
    runner: &dyn CommandRunner,
    now: chrono::DateTime<Utc>,
) -> Result<Report, VerifyError> {
    tracing::debug!(threshold, "checking layout signature threshold");
    let valid = layout_metadata.valid_signer_keyids(root_keys);
    let mut unique = valid.clone();
    unique.sort();
    unique.dedup();
    if unique.len() < threshold {
        return Err(VerifyError::LayoutSignature(unique.len(), threshold));
    }

    let payload = layout_metadata.payload().map_err(|e| VerifyError::LinkSchema("<layout>".into(), e.to_string()))?;
    let layout = payload.as_layout().ok_or_else(|| VerifyError::LinkSchema("<layout>".into(), "not a layout".into()))?;

    tracing::debug!(expires = %layout.expires, "checking layout expiry");
    if layout.is_expired(now) {
        return Err(VerifyError::Expired(layout.expires));
    }

    let layout = substitution::substitute_layout(layout, &ctx.parameters)
        .map_err(|e| VerifyError::Substitution("<layout>".into(), e))?;

    let mut warnings = Vec::new();
    let mut accepted_links: BTreeMap<String, Link> = BTreeMap::new();

    for step in &layout.steps {
        tracing::debug!(step = %step.name, threshold = step.threshold, "loading candidate links");
        let candidates = candidate_links(&step.name, ctx)?;
        let sublayout_candidate =
            candidates.iter().find(|(_, metadata)| matches!(metadata.payload(), Ok(Payload::Layout(_))));

        let (link, step_warnings) = if let Some((filename, sub_metadata)) = sublayout_candidate {
            tracing::info!(step = %step.name, "recursing into sublayout");
            verify_sublayout_step(step, filename, sub_metadata, &layout.keys, ctx, source, runner, now)?
        } else {
            select_threshold_link(step, &candidates, &layout.keys)?
        };
        for w in &step_warnings {
            tracing::warn!(step = %w.step, message = %w.message, "command alignment warning");
        }
        warnings.extend(step_warnings);
        accepted_links.insert(step.name.clone(), link);
    }

    for step in &layout.steps {
        tracing::debug!(step = %step.name, "evaluating artifact rules");
        let link = &accepted_links[&step.name];
        ruleengine::evaluate_against_links(
            &step.expected_materials,
            ruleengine::Side::Materials,
            &link.materials,
            &link.products,
            &accepted_links,
        )
        .map_err(|e| VerifyError::Rule(step.name.clone(), e))?;
        ruleengine::evaluate_against_links(
            &step.expected_products,
            ruleengine::Side::Products,
            &link.products,
            &link.materials,
            &accepted_links,
        )
        .map_err(|e| VerifyError::Rule(step.name.clone(), e))?;
    }

    let resolve_ctx = ResolveContext {
        base_path: ctx.base_path.clone(),
        excludes: &ctx.excludes,
        algorithms: &ctx.algorithms,
        normalize_line_endings: ctx.normalize_line_endings,
    };

    for inspection in &layout.inspect {
        tracing::info!(inspection = %inspection.name, run = ?inspection.run, "running inspection");
        let cwd = ctx.base_path.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
        let materials = hash_inspection_tree(&cwd, &resolve_ctx, source)?;
        let byproducts = runner
            .run(&inspection.run, &cwd, &BTreeMap::new(), None)
            .map_err(|e| VerifyError::Inspection(inspection.name.clone(), e))?;
        let products = hash_inspection_tree(&cwd, &resolve_ctx, source)?;

        let mut link = Link::new(&inspection.name);
        link.command = inspection.run.clone();
        link.materials = materials;
        link.products = products;
        link.byproducts = byproducts;

        ruleengine::evaluate_against_links(
            &inspection.expected_materials,
            ruleengine::Side::Materials,
            &link.materials,
            &link.products,
            &accepted_links,
        )
        .map_err(|e| VerifyError::Rule(inspection.name.clone(), e))?;
        ruleengine::evaluate_against_links(
            &inspection.expected_products,
            ruleengine::Side::Products,
            &link.products,
            &link.materials,
            &accepted_links,
        )
        .map_err(|e| VerifyError::Rule(inspection.name.clone(), e))?;

        accepted_links.insert(inspection.name.clone(), link);
    }

    Ok(Report { warnings, accepted_links })
}

fn hash_inspection_tree(
    cwd: &Path,
    resolve_ctx: &ResolveContext,
    source: &dyn FileSource,
) -> Result<crate::model::ArtifactMap, VerifyError> {
    let declared = cwd.to_string_lossy().to_string();
    Ok(resolvers::resolve(&declared, resolve_ctx, source)?)
}
