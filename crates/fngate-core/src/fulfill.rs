//! Fulfillment engine: single and batch proof acceptance.
//!
//! Both paths validate everything before mutating anything. A batch either
//! commits every `(request, output)` pair or none of them.

use crate::error::{GatewayError, GatewayResult};
use crate::ledger::RequestLedger;
use crate::types::{BatchFulfillment, FulfillmentStage, FunctionRequest, RequestId};
use crate::verify::{BatchRoots, VerificationGateway, VerifierRegistry};
use fngate_crypto::{Digest, Digester};
use std::collections::BTreeSet;
use tracing::debug;

/// Orchestrates fulfillment against a ledger and a verifier registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FulfillmentEngine;

fn unfulfilled<'l, H: Digester>(
    ledger: &'l RequestLedger<H>,
    id: &RequestId,
) -> GatewayResult<&'l FunctionRequest> {
    let r = ledger.get(id)?;
    if r.proof_fulfilled {
        return Err(GatewayError::AlreadyFulfilled {
            request_id: *id,
            stage: FulfillmentStage::Proof,
        });
    }
    Ok(r)
}

impl FulfillmentEngine {
    /// Verify `proof` for one request and commit `output_hash`.
    pub fn fulfill_single<H, R>(
        ledger: &mut RequestLedger<H>,
        registry: &R,
        request_id: &RequestId,
        output_hash: Digest,
        proof: &[u8],
    ) -> GatewayResult<()>
    where
        H: Digester,
        R: VerifierRegistry + ?Sized,
    {
        let record = unfulfilled(ledger, request_id)?;
        VerificationGateway::new(registry).adjudicate_single(
            request_id,
            record,
            &output_hash,
            proof,
        )?;
        ledger.commit_proof(request_id, output_hash)
    }

    /// Verify one aggregate proof for a batch and commit every output.
    pub fn fulfill_batch<H, R>(
        ledger: &mut RequestLedger<H>,
        registry: &R,
        batch: &BatchFulfillment,
    ) -> GatewayResult<()>
    where
        H: Digester,
        R: VerifierRegistry + ?Sized,
    {
        if batch.request_ids.len() != batch.output_hashes.len() {
            return Err(GatewayError::LengthMismatch {
                request_ids: batch.request_ids.len(),
                output_hashes: batch.output_hashes.len(),
            });
        }
        if batch.request_ids.is_empty() {
            return Err(GatewayError::EmptyBatch);
        }

        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(batch.request_ids.len());
        for id in &batch.request_ids {
            if !seen.insert(*id) {
                return Err(GatewayError::DuplicateRequest { request_id: *id });
            }
            records.push(unfulfilled(ledger, id)?);
        }

        VerificationGateway::new(registry).adjudicate_batch::<H>(
            &records,
            &batch.output_hashes,
            &batch.aggregate_proof,
            &BatchRoots {
                inputs_root: batch.inputs_root,
                outputs_root: batch.outputs_root,
                verification_key_root: batch.verification_key_root,
            },
        )?;
        debug!(n = records.len(), "aggregate proof verified");

        // Every id was checked present, unique and unfulfilled above, so no
        // commit below can fail.
        for (id, out) in batch.request_ids.iter().zip(&batch.output_hashes) {
            ledger.commit_proof(id, *out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallbackTarget;
    use crate::verify::{FunctionRegistry, VerificationCapability};
    use fngate_crypto::Sha256Digester;

    /// Accepts iff the proof equals `b`'s bytes.
    struct EchoOutput;

    impl VerificationCapability for EchoOutput {
        fn verify(&self, _a: &Digest, b: &Digest, proof: &[u8]) -> bool {
            proof == b.as_bytes()
        }

        fn key_digest(&self) -> Digest {
            Digest([0x42; 32])
        }
    }

    fn setup(n: u8) -> (RequestLedger<Sha256Digester>, FunctionRegistry, Vec<RequestId>) {
        let mut ledger = RequestLedger::new();
        let mut reg = FunctionRegistry::new();
        reg.register(Digest([1; 32]), EchoOutput);
        reg.set_aggregator(EchoOutput);
        let ids = (0..n)
            .map(|i| {
                ledger
                    .create(
                        Digest([1; 32]),
                        Digest([i; 32]),
                        Digest::ZERO,
                        CallbackTarget::new("c", [0; 4]),
                    )
                    .unwrap()
                    .1
            })
            .collect();
        (ledger, reg, ids)
    }

    fn batch_for(
        ledger: &RequestLedger<Sha256Digester>,
        reg: &FunctionRegistry,
        ids: &[RequestId],
        outs: &[Digest],
    ) -> BatchFulfillment {
        let recs: Vec<_> = ids.iter().map(|id| ledger.get(id).unwrap()).collect();
        let roots = VerificationGateway::new(reg)
            .batch_roots::<Sha256Digester>(&recs, outs)
            .unwrap();
        BatchFulfillment {
            request_ids: ids.to_vec(),
            aggregate_proof: roots.outputs_root.0.to_vec(),
            inputs_root: roots.inputs_root,
            output_hashes: outs.to_vec(),
            outputs_root: roots.outputs_root,
            verification_key_root: roots.verification_key_root,
        }
    }

    #[test]
    fn invalid_single_proof_leaves_record_untouched() {
        let (mut l, reg, ids) = setup(1);
        let before = l.get(&ids[0]).unwrap().clone();
        let err = FulfillmentEngine::fulfill_single(&mut l, &reg, &ids[0], Digest([5; 32]), b"nope")
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::InvalidProof {
                request_id: Some(ids[0])
            }
        );
        assert_eq!(l.get(&ids[0]).unwrap(), &before);
    }

    #[test]
    fn batch_commits_all() {
        let (mut l, reg, ids) = setup(3);
        let outs: Vec<_> = (10..13).map(|i| Digest([i; 32])).collect();
        let batch = batch_for(&l, &reg, &ids, &outs);
        FulfillmentEngine::fulfill_batch(&mut l, &reg, &batch).unwrap();
        for (id, out) in ids.iter().zip(&outs) {
            let r = l.get(id).unwrap();
            assert!(r.proof_fulfilled);
            assert_eq!(&r.output_hash, out);
        }
    }

    #[test]
    fn batch_with_one_fulfilled_member_commits_nothing() {
        let (mut l, reg, ids) = setup(3);
        FulfillmentEngine::fulfill_single(&mut l, &reg, &ids[2], Digest([1; 32]), &[1; 32])
            .unwrap();
        let outs: Vec<_> = (10..13).map(|i| Digest([i; 32])).collect();
        let batch = batch_for(&l, &reg, &ids, &outs);
        let err = FulfillmentEngine::fulfill_batch(&mut l, &reg, &batch).unwrap_err();
        assert_eq!(
            err,
            GatewayError::AlreadyFulfilled {
                request_id: ids[2],
                stage: FulfillmentStage::Proof
            }
        );
        assert!(!l.get(&ids[0]).unwrap().proof_fulfilled);
        assert!(!l.get(&ids[1]).unwrap().proof_fulfilled);
    }

    #[test]
    fn batch_shape_errors() {
        let (mut l, reg, ids) = setup(2);
        let mut batch = batch_for(&l, &reg, &ids, &[Digest([1; 32]), Digest([2; 32])]);
        batch.output_hashes.pop();
        assert_eq!(
            FulfillmentEngine::fulfill_batch(&mut l, &reg, &batch),
            Err(GatewayError::LengthMismatch {
                request_ids: 2,
                output_hashes: 1
            })
        );

        let dup = batch_for(&l, &reg, &[ids[0], ids[0]], &[Digest([1; 32]), Digest([1; 32])]);
        assert_eq!(
            FulfillmentEngine::fulfill_batch(&mut l, &reg, &dup),
            Err(GatewayError::DuplicateRequest { request_id: ids[0] })
        );
        assert!(!l.get(&ids[0]).unwrap().proof_fulfilled);

        let empty = BatchFulfillment {
            request_ids: vec![],
            aggregate_proof: vec![],
            inputs_root: Digest::ZERO,
            output_hashes: vec![],
            outputs_root: Digest::ZERO,
            verification_key_root: Digest::ZERO,
        };
        assert_eq!(
            FulfillmentEngine::fulfill_batch(&mut l, &reg, &empty),
            Err(GatewayError::EmptyBatch)
        );
    }
}
