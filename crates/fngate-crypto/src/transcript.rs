//! BLAKE3 transcript with a simple absorb/challenge API.
//!
//! ⚠️ **Security note:** this models a domain-separated random oracle and is
//! used by the *reference* verification capability only. Production
//! verifiers plug their own proof system in behind
//! `fngate_core::VerificationCapability`.

use crate::{Digest, DIGEST_LEN};
use blake3::Hasher;

/// Fixed domain prefix to seed transcripts.
const TRANSCRIPT_PREFIX: &[u8] = b"fngate.transcript.v1";

/// Transcript interface.
///
/// Implementations apply domain separation for both absorbs and challenges.
pub trait Transcript {
    /// Add raw bytes under a label (domain-separated).
    fn absorb(&mut self, label: Label, bytes: &[u8]);

    /// Convenience: absorb a digest.
    fn absorb_digest(&mut self, label: Label, d: &Digest) {
        self.absorb(label, d.as_bytes());
    }

    /// Squeeze `n` bytes as a challenge under `label`.
    #[must_use]
    fn challenge_bytes(&mut self, label: Label, n: usize) -> Vec<u8>;

    /// Squeeze one digest-sized challenge.
    #[must_use]
    fn challenge_digest(&mut self, label: Label) -> Digest {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&self.challenge_bytes(label, DIGEST_LEN));
        Digest(out)
    }
}

/// Canonical transcript labels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Label {
    /// Verification key of the function being attested.
    FunctionKey,
    /// Input digest of a single request.
    Input,
    /// Output digest of a single request.
    Output,
    /// Root over a batch's input digests.
    InputsRoot,
    /// Root over a batch's output digests.
    OutputsRoot,
    /// Final attestation challenge.
    Attestation,
}

impl Label {
    /// Borrow the canonical string.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FunctionKey => "fngate/function_key",
            Self::Input => "fngate/input",
            Self::Output => "fngate/output",
            Self::InputsRoot => "fngate/inputs_root",
            Self::OutputsRoot => "fngate/outputs_root",
            Self::Attestation => "fngate/attestation",
        }
    }
}

/// BLAKE3-based transcript.
#[derive(Clone, Debug)]
pub struct Blake3Transcript {
    st: Hasher,
}

impl Blake3Transcript {
    /// Create a new transcript bound to `domain_sep`.
    #[must_use]
    pub fn new(domain_sep: &str) -> Self {
        let mut st = Hasher::new();
        st.update(TRANSCRIPT_PREFIX);
        st.update(&len_prefix(domain_sep.len()));
        st.update(domain_sep.as_bytes());
        Self { st }
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
fn len_prefix(n: usize) -> [u8; 4] {
    (n as u32).to_le_bytes()
}

impl Transcript for Blake3Transcript {
    fn absorb(&mut self, label: Label, bytes: &[u8]) {
        let label = label.as_str();
        self.st.update(b"absorb");
        self.st.update(&len_prefix(label.len()));
        self.st.update(label.as_bytes());
        self.st.update(&len_prefix(bytes.len()));
        self.st.update(bytes);
    }

    fn challenge_bytes(&mut self, label: Label, n: usize) -> Vec<u8> {
        let label = label.as_str();
        let mut st = self.st.clone();
        st.update(b"challenge");
        st.update(&len_prefix(label.len()));
        st.update(label.as_bytes());

        let mut out = vec![0u8; n];
        st.finalize_xof().fill(&mut out);

        // Forward progress after a challenge.
        self.st.update(b"after_challenge");
        self.st.update(&len_prefix(label.len()));
        self.st.update(label.as_bytes());

        out
    }
}
