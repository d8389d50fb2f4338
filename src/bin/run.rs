//! `run` — wrap a command, record its materials/products, sign the link.
//!
//! Usage:
//!   run --step NAME --key SEED_FILE [--material PATH]... [--product PATH]...
//!       [--base-path DIR] [--out FILE] -- COMMAND...

#![forbid(unsafe_code)]

#[path = "cli_support.rs"]
mod cli_support;

use std::env;
use std::path::PathBuf;

use intoto_core::crypto::Signer as _;
use intoto_core::filesystem::StdFileSource;
use intoto_core::recording::{link_filename, wrap_and_run};
use intoto_core::resolvers::DigestAlgorithm;
use intoto_core::runner::ProcessRunner;
use intoto_core::RecordingContext;

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    cli_support::finish(run());
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let step = cli_support::parse_flag(&args, "--step").ok_or_else(|| anyhow::anyhow!("--step is required"))?;
    let key_path = cli_support::parse_flag(&args, "--key").ok_or_else(|| anyhow::anyhow!("--key is required"))?;
    let materials = cli_support::parse_flag_multi(&args, "--material");
    let products = cli_support::parse_flag_multi(&args, "--product");
    let base_path = cli_support::parse_flag(&args, "--base-path").map(PathBuf::from);
    let out = cli_support::parse_flag(&args, "--out");

    let command: Vec<String> = args
        .iter()
        .position(|a| a == "--")
        .map(|i| args[i + 1..].to_vec())
        .ok_or_else(|| anyhow::anyhow!("pass the command to run after `--`"))?;
    if command.is_empty() {
        anyhow::bail!("no command given after `--`");
    }

    let signer = cli_support::load_ed25519_signer(&key_path)?;

    let mut ctx = RecordingContext::new().with_algorithms(vec![DigestAlgorithm::Sha256]);
    if let Some(base) = base_path {
        ctx = ctx.with_base_path(base);
    }

    let (_link, metadata) =
        wrap_and_run(&step, &command, &materials, &products, &ctx, &StdFileSource, &ProcessRunner, &signer)?;

    let keyid = signer.key_id().map_err(|e| anyhow::anyhow!("{e}"))?;
    let out_path = out.unwrap_or_else(|| link_filename(&step, &keyid));
    cli_support::write_metadata(&PathBuf::from(&out_path), &metadata)?;
    println!("wrote {out_path}");
    Ok(())
}
