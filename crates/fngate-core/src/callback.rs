//! Callback dispatcher: one-shot delivery of verified results.
//!
//! Delivery sets `callback_fulfilled` before the external call and keeps it
//! only if the call succeeds. The target sees the ledger read-only through
//! [`CallbackCall::ledger`], so a nested delivery of the same request
//! observes the flag and is refused.

use crate::error::{GatewayError, GatewayResult};
use crate::ledger::{RequestLedger, RequestLookup};
use crate::types::{CallbackTarget, FulfillmentStage, FunctionRequest, RequestId};
use fngate_crypto::Digester;
use thiserror::Error;
use tracing::debug;

/// Reason a callback target reported for refusing a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallbackFailure(pub String);

impl CallbackFailure {
    /// Wrap a reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Arguments handed to a callback target.
#[derive(Clone, Copy)]
pub struct CallbackCall<'a> {
    /// Request being delivered.
    pub request_id: RequestId,
    /// Destination and selector.
    pub target: &'a CallbackTarget,
    /// Result bytes.
    pub output: &'a [u8],
    /// Caller context bytes.
    pub context: &'a [u8],
    /// Read-only ledger view, including the provisional delivery flag.
    pub ledger: &'a dyn RequestLookup,
}

impl std::fmt::Debug for CallbackCall<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackCall")
            .field("request_id", &self.request_id)
            .field("target", &self.target)
            .field("output_len", &self.output.len())
            .field("context_len", &self.context.len())
            .finish_non_exhaustive()
    }
}

/// Executes calls into callback destinations.
pub trait CallbackExecutor {
    /// Invoke `call.target`. An `Err` aborts the delivery.
    fn invoke(&mut self, call: CallbackCall<'_>) -> Result<(), CallbackFailure>;
}

/// Delivery validation and execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackDispatcher;

impl CallbackDispatcher {
    /// Check whether `(output, context)` may be delivered for `request_id`.
    ///
    /// Checks run in this order: existence, already delivered, context hash,
    /// proof accepted, output hash.
    pub fn check_delivery<'l, H, L>(
        ledger: &'l L,
        request_id: &RequestId,
        output: &[u8],
        context: &[u8],
    ) -> GatewayResult<&'l FunctionRequest>
    where
        H: Digester,
        L: RequestLookup + ?Sized,
    {
        let r = ledger.lookup(request_id).ok_or(GatewayError::NotFound {
            request_id: *request_id,
        })?;
        if r.callback_fulfilled {
            return Err(GatewayError::AlreadyFulfilled {
                request_id: *request_id,
                stage: FulfillmentStage::Callback,
            });
        }
        let context_hash = H::digest(context);
        if context_hash != r.context_hash {
            return Err(GatewayError::ContextMismatch {
                request_id: *request_id,
                expected: r.context_hash,
                actual: context_hash,
            });
        }
        if !r.proof_fulfilled {
            return Err(GatewayError::ProofNotFulfilled {
                request_id: *request_id,
            });
        }
        let output_hash = H::digest(output);
        if output_hash != r.output_hash {
            return Err(GatewayError::OutputMismatch {
                request_id: *request_id,
                expected: r.output_hash,
                actual: output_hash,
            });
        }
        Ok(r)
    }

    /// Validate, mark delivered and invoke the target. On target failure
    /// the flag is restored and `CallbackFailed` is returned.
    pub fn deliver<H, E>(
        ledger: &mut RequestLedger<H>,
        executor: &mut E,
        request_id: &RequestId,
        output: &[u8],
        context: &[u8],
    ) -> GatewayResult<()>
    where
        H: Digester,
        E: CallbackExecutor + ?Sized,
    {
        let target = Self::check_delivery::<H, _>(&*ledger, request_id, output, context)?
            .callback
            .clone();

        let guard = ledger.begin_delivery(request_id)?;
        let outcome = executor.invoke(CallbackCall {
            request_id: *request_id,
            target: &target,
            output,
            context,
            ledger: guard.ledger(),
        });

        match outcome {
            Ok(()) => {
                guard.commit();
                debug!(request = %request_id, target = %target, "callback delivered");
                Ok(())
            }
            Err(CallbackFailure(reason)) => Err(GatewayError::CallbackFailed {
                request_id: *request_id,
                destination: target.destination,
                selector: target.selector,
                reason,
            }),
        }
    }
}

/// A delivery observed by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredCall {
    /// Request delivered.
    pub request_id: RequestId,
    /// Target invoked.
    pub target: CallbackTarget,
    /// Output bytes.
    pub output: Vec<u8>,
    /// Context bytes.
    pub context: Vec<u8>,
}

/// Executor that records every successful invocation, optionally failing
/// with a fixed reason instead.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Vec<DeliveredCall>,
    fail_with: Option<String>,
}

impl RecordingExecutor {
    /// Executor accepting every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor refusing every call with `reason`.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            calls: Vec::new(),
            fail_with: Some(reason.into()),
        }
    }

    /// Stop failing.
    pub fn recover(&mut self) {
        self.fail_with = None;
    }

    /// Recorded deliveries in order.
    #[must_use]
    pub fn calls(&self) -> &[DeliveredCall] {
        &self.calls
    }
}

impl CallbackExecutor for RecordingExecutor {
    fn invoke(&mut self, call: CallbackCall<'_>) -> Result<(), CallbackFailure> {
        if let Some(reason) = &self.fail_with {
            return Err(CallbackFailure(reason.clone()));
        }
        self.calls.push(DeliveredCall {
            request_id: call.request_id,
            target: call.target.clone(),
            output: call.output.to_vec(),
            context: call.context.to_vec(),
        });
        Ok(())
    }
}

/// Executor that refuses everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingExecutor;

impl CallbackExecutor for RejectingExecutor {
    fn invoke(&mut self, _call: CallbackCall<'_>) -> Result<(), CallbackFailure> {
        Err(CallbackFailure::new("destination rejected the call"))
    }
}
