//! `sign` — (re-)sign an existing layout or link metadata file.
//!
//! Usage:
//!   sign --in FILE --key SEED_FILE [--key SEED_FILE]... [--replace] [--out FILE]
//!
//! By default new signatures are appended to whatever signatures the file
//! already carries (multi-party layout signing); `--replace` discards the
//! existing signatures first.

#![forbid(unsafe_code)]

#[path = "cli_support.rs"]
mod cli_support;

use std::env;
use std::path::PathBuf;

use intoto_core::crypto::Signer as _;
use intoto_core::Metadata;

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    cli_support::finish(run());
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let in_path = cli_support::parse_flag(&args, "--in").ok_or_else(|| anyhow::anyhow!("--in is required"))?;
    let key_paths = cli_support::parse_flag_multi(&args, "--key");
    if key_paths.is_empty() {
        anyhow::bail!("at least one --key is required");
    }
    let replace = args.iter().any(|a| a == "--replace");
    let out = cli_support::parse_flag(&args, "--out").unwrap_or_else(|| in_path.clone());

    let metadata = cli_support::read_metadata(&in_path)?;
    let bytes = metadata.signable_bytes().map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut signatures = if replace { Vec::new() } else { metadata.signatures().to_vec() };
    for key_path in &key_paths {
        let signer = cli_support::load_ed25519_signer(key_path)?;
        signatures.push(signer.sign(&bytes).map_err(|e| anyhow::anyhow!("{e}"))?);
    }

    let resigned = match metadata {
        Metadata::Classic { signed, .. } => Metadata::Classic { signed, signatures },
        Metadata::Envelope { payload_b64, payload_type, .. } => {
            Metadata::Envelope { payload_b64, payload_type, signatures }
        }
    };

    cli_support::write_metadata(&PathBuf::from(&out), &resigned)?;
    println!("wrote {out}");
    Ok(())
}
