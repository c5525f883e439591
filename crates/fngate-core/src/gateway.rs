//! `FunctionGateway`: the public surface tying the components together.
//!
//! Every operation takes `&mut self` and either commits all of its effects
//! and emits exactly one event, or returns an error with nothing changed.

use crate::callback::{CallbackDispatcher, CallbackExecutor};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::event::{EventLog, EventSink, GatewayEvent};
use crate::fee::{settle_payment, Escrow, FeeSchedule, Payment, PaymentRail};
use crate::fulfill::FulfillmentEngine;
use crate::ledger::{LedgerSnapshot, RequestLedger};
use crate::types::{
    AccountId, BatchFulfillment, CallEnv, FunctionRequest, RequestId, RequestStatus, SubmitRequest,
};
use crate::verify::{BatchRoots, FunctionRegistry, VerificationGateway, VerifierRegistry};
use fngate_crypto::{Digest, Digester, Sha256Digester};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Wire version of [`GatewaySnapshot`].
pub const SNAPSHOT_VERSION: u16 = 1;

/// Persistable gateway state. Verifiers, rail and sink are supplied again on
/// restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySnapshot {
    /// Snapshot format version.
    pub version: u16,
    /// Name of the digest algorithm the ids were derived with.
    pub digest: String,
    /// Fee parameter controller.
    pub controller: AccountId,
    /// Fee scalar.
    pub fee_scalar: u64,
    /// Default gas budget.
    pub default_gas_budget: u64,
    /// Fee vault.
    pub fee_vault: Option<AccountId>,
    /// Request records and nonce.
    pub ledger: LedgerSnapshot,
}

/// Request–fulfillment gateway.
#[derive(Debug)]
pub struct FunctionGateway<
    H: Digester = Sha256Digester,
    R: VerifierRegistry = FunctionRegistry,
    P: PaymentRail = Escrow,
    S: EventSink = EventLog,
> {
    ledger: RequestLedger<H>,
    registry: R,
    rail: P,
    events: S,
    fees: FeeSchedule,
    fee_vault: Option<AccountId>,
    controller: AccountId,
}

impl FunctionGateway {
    /// Gateway with the default digest, an empty in-memory registry, an
    /// empty escrow and an in-memory event log.
    #[must_use]
    pub fn from_config(config: GatewayConfig) -> Self {
        Self::new(config, FunctionRegistry::new(), Escrow::new(), EventLog::new())
    }
}

fn rejected(op: &'static str, err: GatewayError) -> GatewayError {
    warn!(op, error = %err, "operation rejected");
    err
}

impl<H, R, P, S> FunctionGateway<H, R, P, S>
where
    H: Digester,
    R: VerifierRegistry,
    P: PaymentRail,
    S: EventSink,
{
    /// Assemble a gateway with an empty ledger.
    pub fn new(config: GatewayConfig, registry: R, rail: P, events: S) -> Self {
        Self {
            ledger: RequestLedger::new(),
            registry,
            rail,
            events,
            fees: config.fee_schedule(),
            fee_vault: config.fee_vault,
            controller: config.controller,
        }
    }

    /// Submit a request: settle the fee, store the record, emit
    /// `RequestCreated`.
    ///
    /// The identifier is reserved before any value moves, so a submission
    /// the ledger cannot store never settles a payment.
    pub fn submit(&mut self, env: &CallEnv, req: SubmitRequest) -> GatewayResult<RequestId> {
        let gas_budget = self.fees.resolve_budget(req.gas_budget);
        let input_hash = H::digest(&req.input);
        let context_hash = H::digest(&req.context);
        let record = FunctionRequest::pending(
            req.function_id,
            input_hash,
            context_hash,
            req.callback.clone(),
        );
        self.ledger
            .reserve(&record)
            .map_err(|e| rejected("submit", e))?;

        let refund_recipient = req.refund_recipient.as_ref().unwrap_or(&env.caller);
        let fee_charged = settle_payment(
            &self.fees,
            &Payment {
                gas_budget,
                unit_price: env.unit_price,
                payer: &env.caller,
                refund_recipient,
                amount_provided: req.payment,
            },
            self.fee_vault.as_ref(),
            &mut self.rail,
        )
        .map_err(|e| rejected("submit", e))?;

        let (nonce, request_id) = self
            .ledger
            .create(req.function_id, input_hash, context_hash, record.callback)
            .map_err(|e| rejected("submit", e))?;
        info!(
            request = %request_id,
            function = %req.function_id,
            nonce,
            fee = %fee_charged,
            "request created"
        );
        self.events.emit(GatewayEvent::RequestCreated {
            nonce,
            request_id,
            function_id: req.function_id,
            input: req.input,
            callback: req.callback,
            context: req.context,
            gas_budget,
            fee_charged,
        });
        Ok(request_id)
    }

    /// Accept a single proof for `request_id`.
    pub fn fulfill(
        &mut self,
        request_id: &RequestId,
        output_hash: Digest,
        proof: &[u8],
    ) -> GatewayResult<()> {
        FulfillmentEngine::fulfill_single(
            &mut self.ledger,
            &self.registry,
            request_id,
            output_hash,
            proof,
        )
        .map_err(|e| rejected("fulfill", e))?;
        info!(request = %request_id, output = %output_hash, "proof fulfilled");
        self.events.emit(GatewayEvent::ProofFulfilled {
            request_id: *request_id,
            output_hash,
            proof: proof.to_vec(),
        });
        Ok(())
    }

    /// Accept one aggregate proof for a batch of requests.
    pub fn fulfill_batch(&mut self, batch: BatchFulfillment) -> GatewayResult<()> {
        FulfillmentEngine::fulfill_batch(&mut self.ledger, &self.registry, &batch)
            .map_err(|e| rejected("fulfill_batch", e))?;
        info!(
            n = batch.request_ids.len(),
            outputs_root = %batch.outputs_root,
            "batch fulfilled"
        );
        self.events.emit(GatewayEvent::ProofBatchFulfilled {
            request_ids: batch.request_ids,
            aggregate_proof: batch.aggregate_proof,
            inputs_root: batch.inputs_root,
            output_hashes: batch.output_hashes,
            outputs_root: batch.outputs_root,
            verification_key_root: batch.verification_key_root,
        });
        Ok(())
    }

    /// Deliver a proven result through `executor`.
    pub fn callback<E: CallbackExecutor + ?Sized>(
        &mut self,
        executor: &mut E,
        request_id: &RequestId,
        output: &[u8],
        context: &[u8],
    ) -> GatewayResult<()> {
        CallbackDispatcher::deliver(&mut self.ledger, executor, request_id, output, context)
            .map_err(|e| rejected("callback", e))?;
        info!(request = %request_id, "callback fulfilled");
        self.events.emit(GatewayEvent::CallbackFulfilled {
            request_id: *request_id,
            output: output.to_vec(),
            context: context.to_vec(),
        });
        Ok(())
    }

    fn ensure_controller(&self, caller: &AccountId) -> GatewayResult<()> {
        if caller == &self.controller {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized {
                caller: caller.clone(),
            })
        }
    }

    /// Change the fee scalar. Controller only.
    pub fn set_fee_scalar(&mut self, caller: &AccountId, scalar: u64) -> GatewayResult<()> {
        self.ensure_controller(caller)
            .map_err(|e| rejected("set_fee_scalar", e))?;
        self.fees.scalar = scalar;
        info!(scalar, "fee scalar updated");
        self.events.emit(GatewayEvent::ScalarUpdated { scalar });
        Ok(())
    }

    /// Change (or clear) the fee vault. Controller only.
    pub fn set_fee_vault(
        &mut self,
        caller: &AccountId,
        vault: Option<AccountId>,
    ) -> GatewayResult<()> {
        self.ensure_controller(caller)
            .map_err(|e| rejected("set_fee_vault", e))?;
        self.fee_vault.clone_from(&vault);
        info!(vault = ?self.fee_vault, "fee vault updated");
        self.events.emit(GatewayEvent::FeeVaultUpdated { vault });
        Ok(())
    }

    /// Fee that would be charged now. Read-only.
    pub fn quote_fee(&self, gas_budget: Option<u64>, unit_price: u64) -> GatewayResult<u128> {
        self.fees.quote(gas_budget, unit_price)
    }

    /// Roots a prover must bind an aggregate proof over `request_ids` to.
    pub fn batch_roots(
        &self,
        request_ids: &[RequestId],
        output_hashes: &[Digest],
    ) -> GatewayResult<BatchRoots> {
        let records = request_ids
            .iter()
            .map(|id| self.ledger.get(id))
            .collect::<GatewayResult<Vec<_>>>()?;
        VerificationGateway::new(&self.registry).batch_roots::<H>(&records, output_hashes)
    }

    /// Record for `request_id`.
    pub fn request(&self, request_id: &RequestId) -> GatewayResult<&FunctionRequest> {
        self.ledger.get(request_id)
    }

    /// Lifecycle status of `request_id`.
    pub fn status(&self, request_id: &RequestId) -> GatewayResult<RequestStatus> {
        self.ledger.status(request_id)
    }

    /// Next request nonce.
    #[must_use]
    pub const fn nonce(&self) -> u64 {
        self.ledger.nonce()
    }

    /// The request ledger.
    #[must_use]
    pub const fn ledger(&self) -> &RequestLedger<H> {
        &self.ledger
    }

    /// The verifier registry.
    #[must_use]
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Mutable verifier registry (registration is outside the protocol).
    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    /// The payment rail.
    #[must_use]
    pub const fn rail(&self) -> &P {
        &self.rail
    }

    /// Mutable payment rail.
    pub fn rail_mut(&mut self) -> &mut P {
        &mut self.rail
    }

    /// The event sink.
    #[must_use]
    pub const fn events(&self) -> &S {
        &self.events
    }

    /// Mutable event sink.
    pub fn events_mut(&mut self) -> &mut S {
        &mut self.events
    }

    /// Current fee parameters.
    #[must_use]
    pub const fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Current fee vault.
    #[must_use]
    pub const fn fee_vault(&self) -> Option<&AccountId> {
        self.fee_vault.as_ref()
    }

    /// Fee parameter controller.
    #[must_use]
    pub const fn controller(&self) -> &AccountId {
        &self.controller
    }

    /// Capture persistable state.
    #[must_use]
    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            version: SNAPSHOT_VERSION,
            digest: H::NAME.to_owned(),
            controller: self.controller.clone(),
            fee_scalar: self.fees.scalar,
            default_gas_budget: self.fees.default_gas_budget,
            fee_vault: self.fee_vault.clone(),
            ledger: self.ledger.snapshot(),
        }
    }

    /// Rebuild a gateway from `snapshot` with fresh collaborators.
    pub fn restore(
        snapshot: GatewaySnapshot,
        registry: R,
        rail: P,
        events: S,
    ) -> GatewayResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GatewayError::IncompatibleSnapshot {
                reason: format!(
                    "version {} (expected {SNAPSHOT_VERSION})",
                    snapshot.version
                ),
            });
        }
        if snapshot.digest != H::NAME {
            return Err(GatewayError::IncompatibleSnapshot {
                reason: format!("digest {} (expected {})", snapshot.digest, H::NAME),
            });
        }
        let config = GatewayConfig {
            controller: snapshot.controller,
            fee_scalar: snapshot.fee_scalar,
            default_gas_budget: snapshot.default_gas_budget,
            fee_vault: snapshot.fee_vault,
        };
        let mut gw = Self::new(config, registry, rail, events);
        gw.ledger = RequestLedger::restore(snapshot.ledger)?;
        Ok(gw)
    }
}
