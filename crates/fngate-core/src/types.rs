//! Canonical data types for the gateway.
//!
//! Digests are opaque ([`Digest`]); identities are opaque strings
//! ([`AccountId`]). Everything here is plain serde data so ledgers can be
//! snapshotted as JSON or CBOR.

use fngate_crypto::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a function/circuit.
pub type FunctionId = Digest;

/// Identifier of a submitted request.
pub type RequestId = Digest;

/// Entry-point selector on a callback destination.
pub type Selector = [u8; 4];

/// Opaque account identity (payer, refund recipient, fee vault, controller,
/// callback destination).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap a string identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where and how a verified result is delivered.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackTarget {
    /// Destination account.
    pub destination: AccountId,
    /// Entry point on the destination.
    pub selector: Selector,
}

impl CallbackTarget {
    /// Construct a callback target.
    #[must_use]
    pub fn new(destination: impl Into<AccountId>, selector: Selector) -> Self {
        Self {
            destination: destination.into(),
            selector,
        }
    }
}

impl fmt::Display for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{}", self.destination, hex::encode(self.selector))
    }
}

/// Parse `destination:0xselector` (the `0x` is optional, selector is 4 bytes).
impl FromStr for CallbackTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dest, sel) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected <destination>:<selector>, got {s:?}"))?;
        if dest.is_empty() {
            return Err("callback destination is empty".into());
        }
        let sel = sel.strip_prefix("0x").unwrap_or(sel);
        let bytes = hex::decode(sel).map_err(|e| format!("selector {sel:?}: {e}"))?;
        let selector: Selector = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("selector must be 4 bytes, got {}", bytes.len()))?;
        Ok(Self::new(dest, selector))
    }
}

/// One submitted request and its lifecycle flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRequest {
    /// Function to be executed.
    pub function_id: FunctionId,
    /// Digest of the input bytes.
    pub input_hash: Digest,
    /// Digest of the caller's opaque context bytes.
    pub context_hash: Digest,
    /// Digest of the result; [`Digest::ZERO`] until a proof is accepted.
    pub output_hash: Digest,
    /// Delivery target.
    pub callback: CallbackTarget,
    /// Set once a valid proof is accepted.
    pub proof_fulfilled: bool,
    /// Set once delivery succeeds.
    pub callback_fulfilled: bool,
}

impl FunctionRequest {
    /// A fresh pending record.
    #[must_use]
    pub const fn pending(
        function_id: FunctionId,
        input_hash: Digest,
        context_hash: Digest,
        callback: CallbackTarget,
    ) -> Self {
        Self {
            function_id,
            input_hash,
            context_hash,
            output_hash: Digest::ZERO,
            callback,
            proof_fulfilled: false,
            callback_fulfilled: false,
        }
    }

    /// Lifecycle position derived from the flags.
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        match (self.proof_fulfilled, self.callback_fulfilled) {
            (false, _) => RequestStatus::Pending,
            (true, false) => RequestStatus::Proved,
            (true, true) => RequestStatus::Completed,
        }
    }
}

/// Lifecycle position of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Created, awaiting a proof.
    Pending,
    /// Proof accepted, awaiting delivery.
    Proved,
    /// Result delivered.
    Completed,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Proved => "proved",
            Self::Completed => "completed",
        })
    }
}

/// Which one-shot flag an operation targeted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStage {
    /// `proof_fulfilled`.
    Proof,
    /// `callback_fulfilled`.
    Callback,
}

impl fmt::Display for FulfillmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Proof => "proof",
            Self::Callback => "callback",
        })
    }
}

/// Per-call execution environment: who is calling and the current unit
/// price signal used for fee metering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEnv {
    /// Caller identity (the payer on submission).
    pub caller: AccountId,
    /// Price per unit of gas budget.
    pub unit_price: u64,
}

impl CallEnv {
    /// Construct an environment.
    #[must_use]
    pub fn new(caller: impl Into<AccountId>, unit_price: u64) -> Self {
        Self {
            caller: caller.into(),
            unit_price,
        }
    }
}

/// Arguments of a request submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Function to execute.
    pub function_id: FunctionId,
    /// Raw input; only its digest is stored.
    pub input: Vec<u8>,
    /// Delivery target.
    pub callback: CallbackTarget,
    /// Opaque caller context; only its digest is stored.
    pub context: Vec<u8>,
    /// Gas budget for metering; `None` uses the configured default.
    pub gas_budget: Option<u64>,
    /// Who receives the unspent payment; `None` refunds the caller.
    pub refund_recipient: Option<AccountId>,
    /// Amount escrowed with the call.
    pub payment: u128,
}

/// Arguments of a batch fulfillment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFulfillment {
    /// Requests covered by the aggregate proof, in order.
    pub request_ids: Vec<RequestId>,
    /// Single proof attesting to the whole batch.
    pub aggregate_proof: Vec<u8>,
    /// Root over the requests' input hashes.
    pub inputs_root: Digest,
    /// Claimed outputs, index-aligned with `request_ids`.
    pub output_hashes: Vec<Digest>,
    /// Root over `output_hashes`.
    pub outputs_root: Digest,
    /// Root over the functions' verification key digests.
    pub verification_key_root: Digest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_target_parse_and_display() {
        let t: CallbackTarget = "oracle.consumer:0xdeadbeef".parse().unwrap();
        assert_eq!(t.destination.as_str(), "oracle.consumer");
        assert_eq!(t.selector, [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(t.to_string(), "oracle.consumer:0xdeadbeef");

        assert!("no-selector".parse::<CallbackTarget>().is_err());
        assert!("dest:0xdead".parse::<CallbackTarget>().is_err());
        assert!(":deadbeef".parse::<CallbackTarget>().is_err());
    }

    #[test]
    fn status_follows_flags() {
        let mut r = FunctionRequest::pending(
            Digest::ZERO,
            Digest::ZERO,
            Digest::ZERO,
            CallbackTarget::new("c", [0; 4]),
        );
        assert_eq!(r.status(), RequestStatus::Pending);
        r.proof_fulfilled = true;
        assert_eq!(r.status(), RequestStatus::Proved);
        r.callback_fulfilled = true;
        assert_eq!(r.status(), RequestStatus::Completed);
    }
}
