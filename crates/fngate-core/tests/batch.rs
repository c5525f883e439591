//! Batch fulfillment: one aggregate proof, all-or-nothing commitment.

mod common;

use common::{fixture, submit, valid_batch, KeyedHash, ADD_ONE, H, SQUARE};
use fngate_core::prelude::*;
use fngate_core::{GatewayEvent, RequestStatus};

fn three_requests(fx: &mut common::Fixture) -> (Vec<RequestId>, Vec<Digest>) {
    let ids = vec![
        submit(fx, ADD_ONE, b"1"),
        submit(fx, SQUARE, b"2"),
        submit(fx, ADD_ONE, b"3"),
    ];
    let outs = vec![H::digest(b"2"), H::digest(b"4"), H::digest(b"4")];
    (ids, outs)
}

#[test]
fn valid_batch_commits_every_request() {
    let mut fx = fixture(GatewayConfig::default());
    let (ids, outs) = three_requests(&mut fx);
    let batch = valid_batch(&fx, &ids, &outs);
    fx.gw.fulfill_batch(batch.clone()).unwrap();

    for (id, out) in ids.iter().zip(&outs) {
        assert_eq!(fx.gw.status(id).unwrap(), RequestStatus::Proved);
        assert_eq!(&fx.gw.request(id).unwrap().output_hash, out);
    }
    assert_eq!(fx.aggregator.calls(), 1);
    match fx.gw.events().last() {
        Some(GatewayEvent::ProofBatchFulfilled {
            request_ids,
            outputs_root,
            ..
        }) => {
            assert_eq!(request_ids, &ids);
            assert_eq!(outputs_root, &batch.outputs_root);
        }
        other => panic!("unexpected last event: {other:?}"),
    }
}

#[test]
fn bad_outputs_root_proves_nothing() {
    let mut fx = fixture(GatewayConfig::default());
    let (ids, outs) = three_requests(&mut fx);
    let mut batch = valid_batch(&fx, &ids, &outs);
    batch.outputs_root = Digest([0xbd; 32]);

    let err = fx.gw.fulfill_batch(batch).unwrap_err();
    assert!(matches!(
        err,
        GatewayError::OutputsRootMismatch { actual, .. } if actual == Digest([0xbd; 32])
    ));
    for id in &ids {
        assert_eq!(fx.gw.status(id).unwrap(), RequestStatus::Pending);
    }
    assert_eq!(fx.aggregator.calls(), 0);
}

#[test]
fn root_checks_run_in_order_before_aggregator() {
    let mut fx = fixture(GatewayConfig::default());
    let (ids, outs) = three_requests(&mut fx);

    let mut batch = valid_batch(&fx, &ids, &outs);
    batch.inputs_root = Digest::ZERO;
    batch.outputs_root = Digest::ZERO;
    assert!(matches!(
        fx.gw.fulfill_batch(batch),
        Err(GatewayError::InputsRootMismatch { .. })
    ));

    let mut batch = valid_batch(&fx, &ids, &outs);
    batch.verification_key_root = Digest::ZERO;
    assert!(matches!(
        fx.gw.fulfill_batch(batch),
        Err(GatewayError::VerificationKeyRootMismatch { .. })
    ));
    assert_eq!(fx.aggregator.calls(), 0);

    let mut batch = valid_batch(&fx, &ids, &outs);
    batch.aggregate_proof[0] ^= 1;
    assert!(matches!(
        fx.gw.fulfill_batch(batch),
        Err(GatewayError::InvalidProof { request_id: None })
    ));
    assert_eq!(fx.aggregator.calls(), 1);
}

#[test]
fn already_proved_member_aborts_the_batch() {
    let mut fx = fixture(GatewayConfig::default());
    let (ids, outs) = three_requests(&mut fx);
    let proof = fx.square.prove(&H::digest(b"2"), &outs[1]);
    fx.gw.fulfill(&ids[1], outs[1], &proof).unwrap();

    let batch = valid_batch(&fx, &ids, &outs);
    assert!(matches!(
        fx.gw.fulfill_batch(batch),
        Err(GatewayError::AlreadyFulfilled { request_id, .. }) if request_id == ids[1]
    ));
    assert_eq!(fx.gw.status(&ids[0]).unwrap(), RequestStatus::Pending);
    assert_eq!(fx.gw.status(&ids[2]).unwrap(), RequestStatus::Pending);
}

#[test]
fn malformed_batches_are_rejected() {
    let mut fx = fixture(GatewayConfig::default());
    let (ids, outs) = three_requests(&mut fx);

    let mut short = valid_batch(&fx, &ids, &outs);
    short.output_hashes.truncate(2);
    assert_eq!(
        fx.gw.fulfill_batch(short),
        Err(GatewayError::LengthMismatch {
            request_ids: 3,
            output_hashes: 2
        })
    );

    let dup_ids = [ids[0], ids[1], ids[0]];
    let dup = valid_batch(&fx, &dup_ids, &outs);
    assert_eq!(
        fx.gw.fulfill_batch(dup),
        Err(GatewayError::DuplicateRequest { request_id: ids[0] })
    );

    let mut ghost = valid_batch(&fx, &ids, &outs);
    ghost.request_ids[2] = Digest([0x99; 32]);
    assert_eq!(
        fx.gw.fulfill_batch(ghost),
        Err(GatewayError::NotFound {
            request_id: Digest([0x99; 32])
        })
    );

    let mut empty = valid_batch(&fx, &ids, &outs);
    empty.request_ids.clear();
    empty.output_hashes.clear();
    assert_eq!(fx.gw.fulfill_batch(empty), Err(GatewayError::EmptyBatch));

    assert!(ids
        .iter()
        .all(|id| fx.gw.status(id).unwrap() == RequestStatus::Pending));
    assert_eq!(fx.gw.events().len(), 3);
}

#[test]
fn key_root_follows_current_registry() {
    let mut fx = fixture(GatewayConfig::default());
    let (ids, outs) = three_requests(&mut fx);
    let stale = valid_batch(&fx, &ids, &outs);

    // Re-register SQUARE with a new key after the requests were created.
    fx.gw.registry_mut().register(SQUARE, KeyedHash::new(0xc3));
    assert!(matches!(
        fx.gw.fulfill_batch(stale),
        Err(GatewayError::VerificationKeyRootMismatch { .. })
    ));

    let fresh = valid_batch(&fx, &ids, &outs);
    fx.gw.fulfill_batch(fresh).unwrap();
}

#[test]
fn missing_aggregator_is_reported() {
    let mut registry = FunctionRegistry::new();
    let add_one = KeyedHash::new(0xa1);
    registry.register(ADD_ONE, add_one);
    let mut gw: FunctionGateway = FunctionGateway::new(
        GatewayConfig::default(),
        registry,
        fngate_core::Escrow::new(),
        fngate_core::EventLog::new(),
    );
    let id = gw
        .submit(&CallEnv::new("alice", 0), common::request(ADD_ONE, b"1", b""))
        .unwrap();
    let outs = [H::digest(b"2")];
    let roots = gw.batch_roots(&[id], &outs).unwrap();
    let batch = fngate_core::BatchFulfillment {
        request_ids: vec![id],
        aggregate_proof: vec![],
        inputs_root: roots.inputs_root,
        output_hashes: outs.to_vec(),
        outputs_root: roots.outputs_root,
        verification_key_root: roots.verification_key_root,
    };
    assert_eq!(gw.fulfill_batch(batch), Err(GatewayError::AggregatorNotConfigured));
}
