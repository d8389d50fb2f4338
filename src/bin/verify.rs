//! `verify` — run the full verification pipeline (spec §4.7) against a
//! signed layout and a directory of link/sublayout evidence.
//!
//! Usage:
//!   verify --layout FILE --link-dir DIR [--threshold N] [--base-path DIR]
//!       [--exclude PATTERN]... [--param NAME=VALUE]...
//!
//! `--threshold` is the number of the layout's own embedded keys that must
//! have signed it (defaults to 1); the layout's `keys` map is taken as the
//! root of trust, matching how a layout file self-describes its owners'
//! public keys once it has been obtained over a trusted channel.

#![forbid(unsafe_code)]

#[path = "cli_support.rs"]
mod cli_support;

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use intoto_core::exclude::ExcludeSet;
use intoto_core::filesystem::StdFileSource;
use intoto_core::runner::ProcessRunner;
use intoto_core::{verify as run_verify, VerificationContext};

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    cli_support::finish(run());
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let layout_path =
        cli_support::parse_flag(&args, "--layout").ok_or_else(|| anyhow::anyhow!("--layout is required"))?;
    let link_dir =
        cli_support::parse_flag(&args, "--link-dir").ok_or_else(|| anyhow::anyhow!("--link-dir is required"))?;
    let threshold: usize =
        cli_support::parse_flag(&args, "--threshold").map(|s| s.parse()).transpose()?.unwrap_or(1);
    let base_path = cli_support::parse_flag(&args, "--base-path").map(PathBuf::from);
    let excludes = cli_support::parse_flag_multi(&args, "--exclude");

    let mut parameters = BTreeMap::new();
    for raw in cli_support::parse_flag_multi(&args, "--param") {
        let (name, value) =
            raw.split_once('=').ok_or_else(|| anyhow::anyhow!("--param must be NAME=VALUE, got {raw:?}"))?;
        parameters.insert(name.to_string(), value.to_string());
    }

    let layout_metadata = cli_support::read_metadata(&layout_path)?;
    let root_keys = cli_support::layout_root_keys(&layout_metadata)?;

    let mut ctx = VerificationContext::new(PathBuf::from(&link_dir)).with_parameters(parameters);
    ctx.excludes = ExcludeSet::new(&excludes);
    if let Some(base) = base_path {
        ctx = ctx.with_base_path(base);
    }

    let report = run_verify(
        &layout_metadata,
        &root_keys,
        threshold,
        &ctx,
        &StdFileSource,
        &ProcessRunner,
        chrono::Utc::now(),
    )?;

    for warning in &report.warnings {
        eprintln!("warning: step {:?}: {}", warning.step, warning.message);
    }
    println!("verification passed: {} step/inspection links accepted", report.accepted_links.len());
    Ok(())
}
