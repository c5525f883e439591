//! Reference verification capabilities for the function gateway.
//!
//! The "proof" for a request is a 32-byte challenge squeezed from a BLAKE3
//! transcript that binds the verification key, the input digest and the
//! output digest. Verifying means rebuilding the same transcript and
//! comparing bytes. The aggregate variant binds the batch inputs and
//! outputs roots instead.
//!
//! ⚠️ Anyone holding the key can attest, so this is a stand-in for a real
//! proof system, useful for tests and local pipelines.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

use anyhow::{ensure, Result};
use fngate_core::VerificationCapability;
use fngate_crypto::{Blake3Transcript, Digest, Digester, Label, Sha256Digester, Transcript};
use serde::{Deserialize, Serialize};

const SINGLE_DOMAIN: &str = "fngate-verifier-v0/single";
const AGGREGATE_DOMAIN: &str = "fngate-verifier-v0/aggregate";

/// Length of every attestation in bytes.
pub const ATTESTATION_LEN: usize = 32;

fn challenge(domain: &str, key: &Digest, a: (Label, &Digest), b: (Label, &Digest)) -> Vec<u8> {
    let mut tr = Blake3Transcript::new(domain);
    tr.absorb_digest(Label::FunctionKey, key);
    tr.absorb_digest(a.0, a.1);
    tr.absorb_digest(b.0, b.1);
    tr.challenge_bytes(Label::Attestation, ATTESTATION_LEN)
}

/// Derive a verification key from seed bytes.
#[must_use]
pub fn key_from_seed(seed: &[u8]) -> Digest {
    Sha256Digester::digest_parts(&[b"fngate-verifier-key".as_slice(), seed])
}

/// Per-function verifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptVerifier {
    key: Digest,
}

impl TranscriptVerifier {
    /// Verifier for `key`.
    #[must_use]
    pub const fn new(key: Digest) -> Self {
        Self { key }
    }

    /// Verifier keyed by [`key_from_seed`].
    #[must_use]
    pub fn from_seed(seed: &[u8]) -> Self {
        Self::new(key_from_seed(seed))
    }

    /// The verification key.
    #[must_use]
    pub const fn key(&self) -> &Digest {
        &self.key
    }

    /// Produce the attestation this verifier accepts for `(input, output)`.
    #[must_use]
    pub fn attest(&self, input_hash: &Digest, output_hash: &Digest) -> Vec<u8> {
        challenge(
            SINGLE_DOMAIN,
            &self.key,
            (Label::Input, input_hash),
            (Label::Output, output_hash),
        )
    }

    /// Recompute the transcript and compare.
    pub fn check(&self, input_hash: &Digest, output_hash: &Digest, proof: &[u8]) -> Result<()> {
        ensure!(
            proof.len() == ATTESTATION_LEN,
            "attestation must be {ATTESTATION_LEN} bytes, got {}",
            proof.len()
        );
        ensure!(
            self.attest(input_hash, output_hash) == proof,
            "transcript challenge mismatch"
        );
        Ok(())
    }
}

impl VerificationCapability for TranscriptVerifier {
    fn verify(&self, a: &Digest, b: &Digest, proof: &[u8]) -> bool {
        self.check(a, b, proof).is_ok()
    }

    fn key_digest(&self) -> Digest {
        self.key
    }
}

/// Aggregation verifier over `(inputs_root, outputs_root)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptAggregator {
    key: Digest,
}

impl TranscriptAggregator {
    /// Aggregator for `key`.
    #[must_use]
    pub const fn new(key: Digest) -> Self {
        Self { key }
    }

    /// Aggregator keyed by [`key_from_seed`].
    #[must_use]
    pub fn from_seed(seed: &[u8]) -> Self {
        Self::new(key_from_seed(seed))
    }

    /// The aggregation key.
    #[must_use]
    pub const fn key(&self) -> &Digest {
        &self.key
    }

    /// Produce the aggregate attestation for a batch's roots.
    #[must_use]
    pub fn attest(&self, inputs_root: &Digest, outputs_root: &Digest) -> Vec<u8> {
        challenge(
            AGGREGATE_DOMAIN,
            &self.key,
            (Label::InputsRoot, inputs_root),
            (Label::OutputsRoot, outputs_root),
        )
    }
}

impl VerificationCapability for TranscriptAggregator {
    fn verify(&self, a: &Digest, b: &Digest, proof: &[u8]) -> bool {
        proof.len() == ATTESTATION_LEN && self.attest(a, b) == proof
    }

    fn key_digest(&self) -> Digest {
        self.key
    }
}
