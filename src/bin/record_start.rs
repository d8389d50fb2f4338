//! `record_start` — hash a step's materials and persist the in-progress
//! link for a later `record_stop` (spec §4.5 "record-start" mode).
//!
//! Usage:
//!   record_start --step NAME [--material PATH]... [--command WORD]...
//!       [--base-path DIR]

#![forbid(unsafe_code)]

#[path = "cli_support.rs"]
mod cli_support;

use std::env;
use std::path::PathBuf;

use intoto_core::filesystem::StdFileSource;
use intoto_core::recording::{record_start, save_unfinished, unfinished_filename};
use intoto_core::resolvers::DigestAlgorithm;
use intoto_core::RecordingContext;

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    cli_support::finish(run());
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let step = cli_support::parse_flag(&args, "--step").ok_or_else(|| anyhow::anyhow!("--step is required"))?;
    let materials = cli_support::parse_flag_multi(&args, "--material");
    let command = cli_support::parse_flag_multi(&args, "--command");
    let base_path = cli_support::parse_flag(&args, "--base-path").map(PathBuf::from);

    let mut ctx = RecordingContext::new().with_algorithms(vec![DigestAlgorithm::Sha256]);
    if let Some(base) = base_path {
        ctx = ctx.with_base_path(base);
    }

    let link = record_start(&step, &command, &materials, &ctx, &StdFileSource)?;

    let path = PathBuf::from(unfinished_filename(&step));
    save_unfinished(&link, &path)?;
    println!("wrote {}", path.display());
    Ok(())
}
