//! `mock` — like `run`, but produces an unsigned link (no `--key` needed).
//! Useful for drafting a layout's expected materials/products before
//! signing keys are provisioned.
//!
//! Usage:
//!   mock --step NAME [--material PATH]... [--product PATH]...
//!       [--base-path DIR] [--out FILE] -- COMMAND...

#![forbid(unsafe_code)]

#[path = "cli_support.rs"]
mod cli_support;

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use intoto_core::exclude::ExcludeSet;
use intoto_core::filesystem::StdFileSource;
use intoto_core::resolvers::{self, DigestAlgorithm, ResolveContext};
use intoto_core::runner::{CommandRunner, ProcessRunner};
use intoto_core::{ArtifactMap, Link, Metadata, Payload};

fn hash_artifacts(
    declared: &[String],
    resolve_ctx: &ResolveContext<'_>,
) -> anyhow::Result<ArtifactMap> {
    let mut combined = ArtifactMap::new();
    for entry in declared {
        combined.extend(resolvers::resolve(entry, resolve_ctx, &StdFileSource)?);
    }
    Ok(combined)
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    cli_support::finish(run());
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let step = cli_support::parse_flag(&args, "--step").ok_or_else(|| anyhow::anyhow!("--step is required"))?;
    let materials = cli_support::parse_flag_multi(&args, "--material");
    let products = cli_support::parse_flag_multi(&args, "--product");
    let base_path = cli_support::parse_flag(&args, "--base-path").map(PathBuf::from);
    let out = cli_support::parse_flag(&args, "--out").unwrap_or_else(|| format!("{step}.mock.link"));

    let command: Vec<String> = args
        .iter()
        .position(|a| a == "--")
        .map(|i| args[i + 1..].to_vec())
        .ok_or_else(|| anyhow::anyhow!("pass the command to run after `--`"))?;
    if command.is_empty() {
        anyhow::bail!("no command given after `--`");
    }

    let excludes = ExcludeSet::empty();
    let algorithms = vec![DigestAlgorithm::Sha256];
    let resolve_ctx = ResolveContext {
        base_path: base_path.clone(),
        excludes: &excludes,
        algorithms: &algorithms,
        normalize_line_endings: false,
    };

    let materials_map = hash_artifacts(&materials, &resolve_ctx)?;

    let cwd = base_path.unwrap_or_else(|| PathBuf::from("."));
    let byproducts = ProcessRunner.run(&command, &cwd, &BTreeMap::new(), None)?;

    let products_map = hash_artifacts(&products, &resolve_ctx)?;

    let mut link = Link::new(&step);
    link.command = command;
    link.materials = materials_map;
    link.products = products_map;
    link.byproducts = byproducts;
    link.validate()?;

    let metadata = Metadata::classic(Payload::Link(link), Vec::new());
    cli_support::write_metadata(&PathBuf::from(&out), &metadata)?;
    println!("wrote {out} (unsigned)");
    Ok(())
}
