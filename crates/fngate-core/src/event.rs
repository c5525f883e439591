//! Events emitted for off-path observers.
//!
//! Each successful state-changing operation emits exactly one
//! [`GatewayEvent`] after its effects are committed; failed operations emit
//! nothing.

use crate::types::{AccountId, CallbackTarget, FunctionId, RequestId};
use fngate_crypto::Digest;
use serde::{Deserialize, Serialize};

/// Observable record of a committed operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A request was submitted and paid for.
    RequestCreated {
        /// Nonce consumed by the request.
        nonce: u64,
        /// Derived identifier.
        request_id: RequestId,
        /// Requested function.
        function_id: FunctionId,
        /// Raw input bytes.
        input: Vec<u8>,
        /// Where the result will be delivered.
        callback: CallbackTarget,
        /// Raw context bytes.
        context: Vec<u8>,
        /// Gas budget the fee was metered on.
        gas_budget: u64,
        /// Fee charged.
        fee_charged: u128,
    },

    /// A single proof was accepted.
    ProofFulfilled {
        /// Fulfilled request.
        request_id: RequestId,
        /// Committed output hash.
        output_hash: Digest,
        /// Accepted proof bytes.
        proof: Vec<u8>,
    },

    /// An aggregate proof was accepted for a batch.
    ProofBatchFulfilled {
        /// Fulfilled requests.
        request_ids: Vec<RequestId>,
        /// Accepted aggregate proof.
        aggregate_proof: Vec<u8>,
        /// Inputs root.
        inputs_root: Digest,
        /// Committed output hashes.
        output_hashes: Vec<Digest>,
        /// Outputs root.
        outputs_root: Digest,
        /// Verification key root.
        verification_key_root: Digest,
    },

    /// A result was delivered to its callback target.
    CallbackFulfilled {
        /// Delivered request.
        request_id: RequestId,
        /// Delivered output bytes.
        output: Vec<u8>,
        /// Delivered context bytes.
        context: Vec<u8>,
    },

    /// The fee scalar changed.
    ScalarUpdated {
        /// New scalar.
        scalar: u64,
    },

    /// The fee vault changed.
    FeeVaultUpdated {
        /// New vault, `None` when fee forwarding is disabled.
        vault: Option<AccountId>,
    },
}

impl GatewayEvent {
    /// Short event name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RequestCreated { .. } => "RequestCreated",
            Self::ProofFulfilled { .. } => "ProofFulfilled",
            Self::ProofBatchFulfilled { .. } => "ProofBatchFulfilled",
            Self::CallbackFulfilled { .. } => "CallbackFulfilled",
            Self::ScalarUpdated { .. } => "ScalarUpdated",
            Self::FeeVaultUpdated { .. } => "FeeVaultUpdated",
        }
    }
}

/// Consumer of committed events.
pub trait EventSink {
    /// Receive one event.
    fn emit(&mut self, event: GatewayEvent);
}

/// In-memory sink keeping events in emission order.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<GatewayEvent>,
}

impl EventLog {
    /// Empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Events so far.
    #[must_use]
    pub fn events(&self) -> &[GatewayEvent] {
        &self.events
    }

    /// Most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&GatewayEvent> {
        self.events.last()
    }

    /// Number of events held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take all events, leaving the log empty.
    pub fn drain(&mut self) -> Vec<GatewayEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: GatewayEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_keyed_by_event_name() {
        let ev = GatewayEvent::ScalarUpdated { scalar: 3 };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["scalar_updated"]["scalar"], 3);
        assert_eq!(ev.event_type(), "ScalarUpdated");
    }

    #[test]
    fn drain_empties_log() {
        let mut log = EventLog::new();
        log.emit(GatewayEvent::FeeVaultUpdated { vault: None });
        log.emit(GatewayEvent::ScalarUpdated { scalar: 1 });
        assert_eq!(log.len(), 2);
        let taken = log.drain();
        assert_eq!(taken.len(), 2);
        assert!(log.is_empty());
    }
}
