//! Shared fixtures: a keyed-hash verifier and a gateway with two functions.

#![allow(dead_code)]

use fngate_core::prelude::*;
use fngate_core::{BatchFulfillment, EventLog, Escrow};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type H = Sha256Digester;

/// Accepts iff `proof == sha256(key ‖ a ‖ b)`. Counts invocations.
#[derive(Clone)]
pub struct KeyedHash {
    pub key: Digest,
    pub calls: Arc<AtomicUsize>,
}

impl KeyedHash {
    pub fn new(tag: u8) -> Self {
        Self {
            key: Digest([tag; 32]),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn prove(&self, a: &Digest, b: &Digest) -> Vec<u8> {
        H::digest_parts(&[self.key.as_bytes(), a.as_bytes(), b.as_bytes()])
            .0
            .to_vec()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VerificationCapability for KeyedHash {
    fn verify(&self, a: &Digest, b: &Digest, proof: &[u8]) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        proof == self.prove(a, b).as_slice()
    }

    fn key_digest(&self) -> Digest {
        self.key
    }
}

pub const ADD_ONE: Digest = Digest([0x01; 32]);
pub const SQUARE: Digest = Digest([0x02; 32]);

pub struct Fixture {
    pub gw: FunctionGateway,
    pub add_one: KeyedHash,
    pub square: KeyedHash,
    pub aggregator: KeyedHash,
}

pub fn fixture(config: GatewayConfig) -> Fixture {
    let add_one = KeyedHash::new(0xa1);
    let square = KeyedHash::new(0xb2);
    let aggregator = KeyedHash::new(0xff);
    let mut registry = FunctionRegistry::new();
    registry.register(ADD_ONE, add_one.clone());
    registry.register(SQUARE, square.clone());
    registry.set_aggregator(aggregator.clone());
    Fixture {
        gw: FunctionGateway::new(config, registry, Escrow::new(), EventLog::new()),
        add_one,
        square,
        aggregator,
    }
}

pub fn request(function_id: Digest, input: &[u8], context: &[u8]) -> SubmitRequest {
    SubmitRequest {
        function_id,
        input: input.to_vec(),
        callback: CallbackTarget::new("consumer", [0xca, 0x11, 0xba, 0xc4]),
        context: context.to_vec(),
        gas_budget: Some(1_000),
        refund_recipient: None,
        payment: 0,
    }
}

/// Submit for free (unit price 0).
pub fn submit(fx: &mut Fixture, function_id: Digest, input: &[u8]) -> RequestId {
    fx.gw
        .submit(&CallEnv::new("alice", 0), request(function_id, input, b"ctx"))
        .unwrap()
}

/// A correctly bound batch with a valid aggregate proof.
pub fn valid_batch(fx: &Fixture, ids: &[RequestId], outputs: &[Digest]) -> BatchFulfillment {
    let roots = fx.gw.batch_roots(ids, outputs).unwrap();
    BatchFulfillment {
        request_ids: ids.to_vec(),
        aggregate_proof: fx.aggregator.prove(&roots.inputs_root, &roots.outputs_root),
        inputs_root: roots.inputs_root,
        output_hashes: outputs.to_vec(),
        outputs_root: roots.outputs_root,
        verification_key_root: roots.verification_key_root,
    }
}
