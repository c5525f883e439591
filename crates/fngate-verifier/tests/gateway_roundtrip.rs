//! The reference capabilities driving a full gateway.

use fngate_core::prelude::*;
use fngate_core::{BatchFulfillment, RequestStatus};
use fngate_verifier::{TranscriptAggregator, TranscriptVerifier};

fn gateway() -> (FunctionGateway, TranscriptVerifier, TranscriptAggregator, Digest) {
    let f = Sha256Digester::digest(b"double");
    let v = TranscriptVerifier::from_seed(b"double-v1");
    let agg = TranscriptAggregator::from_seed(b"aggregate-v1");
    let mut gw = FunctionGateway::from_config(GatewayConfig::default());
    gw.registry_mut().register(f, v);
    gw.registry_mut().set_aggregator(agg);
    (gw, v, agg, f)
}

fn submit(gw: &mut FunctionGateway, f: Digest, input: &[u8]) -> RequestId {
    gw.submit(
        &CallEnv::new("alice", 0),
        SubmitRequest {
            function_id: f,
            input: input.to_vec(),
            callback: CallbackTarget::new("consumer", [1, 2, 3, 4]),
            context: b"ctx".to_vec(),
            gas_budget: None,
            refund_recipient: None,
            payment: 0,
        },
    )
    .unwrap()
}

#[test]
fn single_fulfillment_with_transcript_proof() {
    let (mut gw, v, _, f) = gateway();
    let id = submit(&mut gw, f, b"21");
    let out = Sha256Digester::digest(b"42");
    let proof = v.attest(&Sha256Digester::digest(b"21"), &out);

    assert!(gw.fulfill(&id, out, &proof[..31]).is_err());
    gw.fulfill(&id, out, &proof).unwrap();

    let mut target = RecordingExecutor::new();
    gw.callback(&mut target, &id, b"42", b"ctx").unwrap();
    assert_eq!(gw.status(&id).unwrap(), RequestStatus::Completed);
}

#[test]
fn batch_fulfillment_with_aggregate_transcript_proof() {
    let (mut gw, _, agg, f) = gateway();
    let ids: Vec<_> = [b"1", b"2", b"3"].iter().map(|i| submit(&mut gw, f, *i)).collect();
    let outs: Vec<_> = [b"2", b"4", b"6"].iter().map(|o| Sha256Digester::digest(*o)).collect();
    let roots = gw.batch_roots(&ids, &outs).unwrap();

    gw.fulfill_batch(BatchFulfillment {
        request_ids: ids.clone(),
        aggregate_proof: agg.attest(&roots.inputs_root, &roots.outputs_root),
        inputs_root: roots.inputs_root,
        output_hashes: outs,
        outputs_root: roots.outputs_root,
        verification_key_root: roots.verification_key_root,
    })
    .unwrap();
    assert!(ids
        .iter()
        .all(|id| gw.status(id).unwrap() == RequestStatus::Proved));
}
