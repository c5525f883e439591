//! Protocol error type.
//!
//! Every variant names one violated invariant and carries the identifiers
//! and digests needed to audit the rejection independently.

use crate::types::{AccountId, FulfillmentStage, FunctionId, RequestId, Selector};
use fngate_crypto::Digest;
use thiserror::Error;

/// Result alias used across the crate.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by gateway operations. Any error aborts the whole
/// operation with no effects applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No record exists for the identifier.
    #[error("request {request_id} not found")]
    NotFound {
        /// Offending identifier.
        request_id: RequestId,
    },

    /// The one-shot flag for `stage` is already set.
    #[error("request {request_id}: {stage} already fulfilled")]
    AlreadyFulfilled {
        /// Offending identifier.
        request_id: RequestId,
        /// Which flag was already set.
        stage: FulfillmentStage,
    },

    /// A verifier rejected the proof: the function's verifier for a single
    /// request, the aggregation verifier for a batch (`request_id` is `None`).
    #[error("{}", invalid_proof_message(.request_id))]
    InvalidProof {
        /// Request whose proof was rejected; `None` for an aggregate proof.
        request_id: Option<RequestId>,
    },

    /// Every request nonce has been consumed.
    #[error("request nonce space exhausted at {nonce}")]
    NonceExhausted {
        /// The nonce that cannot be advanced.
        nonce: u64,
    },

    /// A derived identifier already names a stored request.
    #[error("derived request id {request_id} is already in use")]
    IdCollision {
        /// Colliding identifier.
        request_id: RequestId,
    },

    /// Batch request ids and output hashes differ in length.
    #[error("batch length mismatch: {request_ids} request ids vs {output_hashes} output hashes")]
    LengthMismatch {
        /// Number of request ids.
        request_ids: usize,
        /// Number of output hashes.
        output_hashes: usize,
    },

    /// A batch contained no requests.
    #[error("batch is empty")]
    EmptyBatch,

    /// A batch named the same request twice.
    #[error("request {request_id} appears more than once in the batch")]
    DuplicateRequest {
        /// Repeated identifier.
        request_id: RequestId,
    },

    /// Recomputed inputs root differs from the supplied one.
    #[error("inputs root mismatch: expected {expected}, supplied {actual}")]
    InputsRootMismatch {
        /// Root recomputed from the ledger.
        expected: Digest,
        /// Root supplied by the caller.
        actual: Digest,
    },

    /// Recomputed outputs root differs from the supplied one.
    #[error("outputs root mismatch: expected {expected}, supplied {actual}")]
    OutputsRootMismatch {
        /// Root recomputed from the output hashes.
        expected: Digest,
        /// Root supplied by the caller.
        actual: Digest,
    },

    /// Recomputed verification-key root differs from the supplied one.
    #[error("verification key root mismatch: expected {expected}, supplied {actual}")]
    VerificationKeyRootMismatch {
        /// Root recomputed from the current registry.
        expected: Digest,
        /// Root supplied by the caller.
        actual: Digest,
    },

    /// Delivered context does not hash to the stored context hash.
    #[error("request {request_id}: context hash {actual} does not match {expected}")]
    ContextMismatch {
        /// Request being delivered.
        request_id: RequestId,
        /// Stored context hash.
        expected: Digest,
        /// Hash of the delivered context.
        actual: Digest,
    },

    /// Delivered output does not hash to the stored output hash.
    #[error("request {request_id}: output hash {actual} does not match {expected}")]
    OutputMismatch {
        /// Request being delivered.
        request_id: RequestId,
        /// Stored output hash.
        expected: Digest,
        /// Hash of the delivered output.
        actual: Digest,
    },

    /// Delivery attempted before a proof was accepted.
    #[error("request {request_id}: proof not fulfilled")]
    ProofNotFulfilled {
        /// Request being delivered.
        request_id: RequestId,
    },

    /// The callback target reported failure.
    #[error(
        "request {request_id}: callback to {destination}:0x{} failed: {reason}",
        hex::encode(.selector)
    )]
    CallbackFailed {
        /// Request being delivered.
        request_id: RequestId,
        /// Callback destination.
        destination: AccountId,
        /// Callback entry point.
        selector: Selector,
        /// Failure reported by the target.
        reason: String,
    },

    /// Payment does not cover the fee.
    #[error("insufficient payment: fee is {required}, provided {provided}")]
    InsufficientPayment {
        /// Fee due.
        required: u128,
        /// Amount escrowed with the call.
        provided: u128,
    },

    /// The refund recipient rejected the refund.
    #[error("refund of {amount} to {recipient} failed")]
    RefundFailed {
        /// Refund recipient.
        recipient: AccountId,
        /// Refund amount.
        amount: u128,
    },

    /// The fee vault rejected the fee deposit.
    #[error("fee vault {vault} rejected deposit of {amount}")]
    FeeVaultRejected {
        /// Configured vault.
        vault: AccountId,
        /// Fee amount.
        amount: u128,
    },

    /// Fee computation overflowed.
    #[error("fee overflow: gas budget {gas_budget} x unit price {unit_price} x scalar {scalar}")]
    FeeOverflow {
        /// Gas budget.
        gas_budget: u64,
        /// Unit price.
        unit_price: u64,
        /// Fee scalar.
        scalar: u64,
    },

    /// No verifier is registered for the function.
    #[error("no verifier registered for function {function_id}")]
    VerifierNotFound {
        /// Function without a verifier.
        function_id: FunctionId,
    },

    /// No aggregation verifier is configured.
    #[error("no aggregation verifier configured")]
    AggregatorNotConfigured,

    /// Caller is not the configured controller.
    #[error("caller {caller} is not the controller")]
    Unauthorized {
        /// Rejected caller.
        caller: AccountId,
    },

    /// A snapshot cannot be restored into this gateway.
    #[error("incompatible snapshot: {reason}")]
    IncompatibleSnapshot {
        /// What did not match.
        reason: String,
    },
}

fn invalid_proof_message(request_id: &Option<RequestId>) -> String {
    match request_id {
        Some(id) => format!("invalid proof for request {id}"),
        None => "invalid aggregate proof".to_owned(),
    }
}
