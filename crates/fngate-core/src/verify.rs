//! Verification gateway: per-function verifier lookup and proof adjudication.
//!
//! Verifiers are external collaborators. The gateway only needs
//! `verify(a, b, proof) -> bool` and a key digest from each one; how a
//! capability checks a proof is its own business.
//!
//! Batch adjudication recomputes the three roots (inputs, outputs,
//! verification keys) and compares them in that order, failing on the first
//! mismatch. The aggregation verifier is only consulted once all three match.

use crate::error::{GatewayError, GatewayResult};
use crate::types::{FunctionId, FunctionRequest, RequestId};
use fngate_crypto::{list_root, Digest, Digester};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A proof-verification capability.
pub trait VerificationCapability {
    /// Check `proof` against the public pair `(a, b)`: `(input, output)` for a
    /// function verifier, `(inputs_root, outputs_root)` for the aggregator.
    fn verify(&self, a: &Digest, b: &Digest, proof: &[u8]) -> bool;

    /// Digest of the verification key.
    fn key_digest(&self) -> Digest;
}

/// Lookup of verification capabilities.
pub trait VerifierRegistry {
    /// Verifier currently registered for `function_id`.
    fn verifier_for(&self, function_id: &FunctionId) -> Option<&dyn VerificationCapability>;

    /// Verifier for aggregate proofs.
    fn aggregation_verifier(&self) -> Option<&dyn VerificationCapability>;
}

type BoxedCapability = Box<dyn VerificationCapability + Send + Sync>;

/// In-memory [`VerifierRegistry`].
///
/// Registration replaces any previous verifier for the same function; there
/// is no ownership model.
#[derive(Default)]
pub struct FunctionRegistry {
    verifiers: BTreeMap<FunctionId, BoxedCapability>,
    aggregator: Option<BoxedCapability>,
}

impl FunctionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the verifier for `function_id`.
    pub fn register<V>(&mut self, function_id: FunctionId, verifier: V)
    where
        V: VerificationCapability + Send + Sync + 'static,
    {
        self.verifiers.insert(function_id, Box::new(verifier));
    }

    /// Remove the verifier for `function_id`; returns whether one existed.
    pub fn deregister(&mut self, function_id: &FunctionId) -> bool {
        self.verifiers.remove(function_id).is_some()
    }

    /// Install the aggregation verifier.
    pub fn set_aggregator<V>(&mut self, verifier: V)
    where
        V: VerificationCapability + Send + Sync + 'static,
    {
        self.aggregator = Some(Box::new(verifier));
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.verifiers.keys().collect::<Vec<_>>())
            .field("aggregator", &self.aggregator.is_some())
            .finish()
    }
}

impl VerifierRegistry for FunctionRegistry {
    fn verifier_for(&self, function_id: &FunctionId) -> Option<&dyn VerificationCapability> {
        self.verifiers
            .get(function_id)
            .map(|b| &**b as &dyn VerificationCapability)
    }

    fn aggregation_verifier(&self) -> Option<&dyn VerificationCapability> {
        self.aggregator
            .as_ref()
            .map(|b| &**b as &dyn VerificationCapability)
    }
}

/// The three roots an aggregate proof is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchRoots {
    /// Root over input hashes.
    pub inputs_root: Digest,
    /// Root over output hashes.
    pub outputs_root: Digest,
    /// Root over verification key digests.
    pub verification_key_root: Digest,
}

/// Adjudicates proofs against a registry.
#[derive(Debug, Clone, Copy)]
pub struct VerificationGateway<'r, R: VerifierRegistry + ?Sized> {
    registry: &'r R,
}

impl<'r, R: VerifierRegistry + ?Sized> VerificationGateway<'r, R> {
    /// Wrap a registry.
    #[must_use]
    pub const fn new(registry: &'r R) -> Self {
        Self { registry }
    }

    fn verifier(&self, function_id: &FunctionId) -> GatewayResult<&'r dyn VerificationCapability> {
        let registry: &'r R = self.registry;
        registry
            .verifier_for(function_id)
            .ok_or(GatewayError::VerifierNotFound {
                function_id: *function_id,
            })
    }

    /// Check a single proof for `record`.
    pub fn adjudicate_single(
        &self,
        request_id: &RequestId,
        record: &FunctionRequest,
        output_hash: &Digest,
        proof: &[u8],
    ) -> GatewayResult<()> {
        let v = self.verifier(&record.function_id)?;
        if v.verify(&record.input_hash, output_hash, proof) {
            debug!(request = %request_id, function = %record.function_id, "proof verified");
            Ok(())
        } else {
            Err(GatewayError::InvalidProof {
                request_id: Some(*request_id),
            })
        }
    }

    /// Root over the current verification key digests of `records`.
    pub fn verification_key_root<H: Digester>(
        &self,
        records: &[&FunctionRequest],
    ) -> GatewayResult<Digest> {
        let keys = records
            .iter()
            .map(|r| self.verifier(&r.function_id).map(|v| v.key_digest()))
            .collect::<GatewayResult<Vec<_>>>()?;
        Ok(list_root::<H>(&keys))
    }

    /// Compute the roots a prover must bind an aggregate proof to.
    pub fn batch_roots<H: Digester>(
        &self,
        records: &[&FunctionRequest],
        output_hashes: &[Digest],
    ) -> GatewayResult<BatchRoots> {
        let inputs: Vec<Digest> = records.iter().map(|r| r.input_hash).collect();
        Ok(BatchRoots {
            inputs_root: list_root::<H>(&inputs),
            outputs_root: list_root::<H>(output_hashes),
            verification_key_root: self.verification_key_root::<H>(records)?,
        })
    }

    /// Check an aggregate proof for `records` / `output_hashes` against the
    /// supplied roots. Roots are compared before the aggregation verifier runs.
    pub fn adjudicate_batch<H: Digester>(
        &self,
        records: &[&FunctionRequest],
        output_hashes: &[Digest],
        aggregate_proof: &[u8],
        supplied: &BatchRoots,
    ) -> GatewayResult<()> {
        let inputs: Vec<Digest> = records.iter().map(|r| r.input_hash).collect();
        let inputs_root = list_root::<H>(&inputs);
        if inputs_root != supplied.inputs_root {
            return Err(GatewayError::InputsRootMismatch {
                expected: inputs_root,
                actual: supplied.inputs_root,
            });
        }

        let outputs_root = list_root::<H>(output_hashes);
        if outputs_root != supplied.outputs_root {
            return Err(GatewayError::OutputsRootMismatch {
                expected: outputs_root,
                actual: supplied.outputs_root,
            });
        }

        let key_root = self.verification_key_root::<H>(records)?;
        if key_root != supplied.verification_key_root {
            return Err(GatewayError::VerificationKeyRootMismatch {
                expected: key_root,
                actual: supplied.verification_key_root,
            });
        }
        debug!(n = records.len(), "batch roots match");

        let registry: &'r R = self.registry;
        let aggregator = registry
            .aggregation_verifier()
            .ok_or(GatewayError::AggregatorNotConfigured)?;
        if aggregator.verify(&inputs_root, &outputs_root, aggregate_proof) {
            Ok(())
        } else {
            debug!(%inputs_root, %outputs_root, "aggregate proof rejected");
            Err(GatewayError::InvalidProof { request_id: None })
        }
    }
}
