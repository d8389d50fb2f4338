//! Crate root: public surface and module map for this in-toto-style
//! software-supply-chain-integrity framework.
//!
//! This module is the single canonical entry point for downstream users.
//! It re-exports the pieces a caller typically needs — the data model,
//! the crypto adapter, canonical encoding, and the recording/verification
//! entry points — while leaving the fine-grained machinery (resolvers,
//! rule engine, glob matcher) addressable via their own modules for
//! callers that need to reach in further.
//!
//! ## Invariants
//!
//! - **No unsafe.** This crate forbids `unsafe_code` outright; every
//!   cryptographic operation goes through the `rust-crypto`-ecosystem
//!   crates named in `Cargo.toml`, never hand-rolled arithmetic.
//! - **Canonical bytes before signing.** Every payload that gets signed
//!   or verified is first rendered through [`canonical::encode`] (or, for
//!   the DSSE envelope shape, through [`model::pae`]) — there is exactly
//!   one definition of "the bytes that were signed," in [`model::Metadata::signable_bytes`].
//! - **No global mutable state.** Recording and verification each take an
//!   explicit context value ([`context::RecordingContext`],
//!   [`context::VerificationContext`]) rather than reading from process
//!   environment or a shared singleton.
//! - **Collaborators are traits.** The filesystem ([`filesystem::FileSource`])
//!   and process execution ([`runner::CommandRunner`]) are both abstracted
//!   behind traits with a `std`-backed default, so recording and
//!   verification can be exercised against in-memory doubles in tests.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod canonical;
pub mod context;
pub mod crypto;
pub mod error;
pub mod exclude;
pub mod filesystem;
pub mod glob;
pub mod model;
pub mod recording;
pub mod resolvers;
pub mod ruleengine;
pub mod runner;
pub mod substitution;
pub mod verify;

pub use context::{RecordingContext, VerificationContext};
pub use crypto::{PublicKey, Scheme, Signature, Signer};
pub use error::{Classify, Kind};
pub use model::{ArtifactMap, ArtifactRule, DigestSet, Inspection, Layout, Link, Metadata, Payload, Step};
pub use recording::{record_start, record_stop, wrap_and_run};
pub use resolvers::DigestAlgorithm;
pub use verify::{verify, Report, VerifyError, Warning};
