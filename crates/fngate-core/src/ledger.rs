//! Request ledger: the single owner of request records.
//!
//! Records live in one table keyed by [`RequestId`]; nothing outside this
//! module holds a mutable reference into it. The only mutation paths are
//! [`RequestLedger::create`], [`RequestLedger::commit_proof`] and
//! [`RequestLedger::commit_callback`] / [`RequestLedger::begin_delivery`].
//!
//! Identifiers are `H(nonce ‖ record)` over the freshly created record with a
//! strictly increasing nonce, so two submissions never share an id even when
//! their content is identical.

use crate::error::{GatewayError, GatewayResult};
use crate::types::{
    CallbackTarget, FulfillmentStage, FunctionId, FunctionRequest, RequestId, RequestStatus,
};
use fngate_crypto::{Digest, Digester, Sha256Digester};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Read access to request records by id.
///
/// Handed to callback targets so a re-entrant delivery attempt can observe
/// the ledger without being able to mutate it.
pub trait RequestLookup {
    /// Record for `id`, if any.
    fn lookup(&self, id: &RequestId) -> Option<&FunctionRequest>;
}

/// Owned table of requests plus the id nonce.
#[derive(Debug, Clone)]
pub struct RequestLedger<H: Digester = Sha256Digester> {
    nonce: u64,
    requests: BTreeMap<RequestId, FunctionRequest>,
    _digest: PhantomData<H>,
}

impl<H: Digester> Default for RequestLedger<H> {
    fn default() -> Self {
        Self {
            nonce: 0,
            requests: BTreeMap::new(),
            _digest: PhantomData,
        }
    }
}

/// Derive the identifier of `record` created under `nonce`.
#[must_use]
pub fn derive_request_id<H: Digester>(nonce: u64, record: &FunctionRequest) -> RequestId {
    let dest = record.callback.destination.as_str().as_bytes();
    let nonce = nonce.to_be_bytes();
    let dest_len = (dest.len() as u64).to_be_bytes();
    let flags = [
        u8::from(record.proof_fulfilled),
        u8::from(record.callback_fulfilled),
    ];
    H::digest_parts(&[
        nonce.as_slice(),
        record.function_id.as_bytes(),
        record.input_hash.as_bytes(),
        record.context_hash.as_bytes(),
        record.output_hash.as_bytes(),
        &dest_len,
        dest,
        &record.callback.selector,
        &flags,
    ])
}

impl<H: Digester> RequestLedger<H> {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The `(nonce, request_id)` that [`RequestLedger::create`] would assign
    /// to `record`. Pure; fails when the nonce cannot advance or the id is
    /// already stored.
    pub fn reserve(&self, record: &FunctionRequest) -> GatewayResult<(u64, RequestId)> {
        let nonce = self.nonce;
        if nonce.checked_add(1).is_none() {
            return Err(GatewayError::NonceExhausted { nonce });
        }
        let request_id = derive_request_id::<H>(nonce, record);
        if self.requests.contains_key(&request_id) {
            return Err(GatewayError::IdCollision { request_id });
        }
        Ok((nonce, request_id))
    }

    /// Store a new pending record and return `(nonce_used, request_id)`.
    pub fn create(
        &mut self,
        function_id: FunctionId,
        input_hash: Digest,
        context_hash: Digest,
        callback: CallbackTarget,
    ) -> GatewayResult<(u64, RequestId)> {
        let record = FunctionRequest::pending(function_id, input_hash, context_hash, callback);
        let (nonce, id) = self.reserve(&record)?;
        self.requests.insert(id, record);
        self.nonce = nonce + 1;
        Ok((nonce, id))
    }

    /// Record for `id`.
    pub fn get(&self, id: &RequestId) -> GatewayResult<&FunctionRequest> {
        self.requests
            .get(id)
            .ok_or(GatewayError::NotFound { request_id: *id })
    }

    /// Whether a record exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    /// Lifecycle status of `id`.
    pub fn status(&self, id: &RequestId) -> GatewayResult<RequestStatus> {
        self.get(id).map(FunctionRequest::status)
    }

    /// Next nonce to be consumed (equals the number of requests ever created).
    #[must_use]
    pub const fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// All records, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (&RequestId, &FunctionRequest)> {
        self.requests.iter()
    }

    /// Records still awaiting a proof.
    pub fn pending(&self) -> impl Iterator<Item = (&RequestId, &FunctionRequest)> {
        self.requests.iter().filter(|(_, r)| !r.proof_fulfilled)
    }

    /// Accept `output_hash` for `id`. The only writer of `output_hash` and
    /// `proof_fulfilled`.
    pub fn commit_proof(&mut self, id: &RequestId, output_hash: Digest) -> GatewayResult<()> {
        let r = self
            .requests
            .get_mut(id)
            .ok_or(GatewayError::NotFound { request_id: *id })?;
        if r.proof_fulfilled {
            return Err(GatewayError::AlreadyFulfilled {
                request_id: *id,
                stage: FulfillmentStage::Proof,
            });
        }
        r.output_hash = output_hash;
        r.proof_fulfilled = true;
        Ok(())
    }

    /// Permanently mark `id` delivered.
    pub fn commit_callback(&mut self, id: &RequestId) -> GatewayResult<()> {
        let r = self
            .requests
            .get_mut(id)
            .ok_or(GatewayError::NotFound { request_id: *id })?;
        if r.callback_fulfilled {
            return Err(GatewayError::AlreadyFulfilled {
                request_id: *id,
                stage: FulfillmentStage::Callback,
            });
        }
        if !r.proof_fulfilled {
            return Err(GatewayError::ProofNotFulfilled { request_id: *id });
        }
        r.callback_fulfilled = true;
        Ok(())
    }

    /// Mark `id` delivered inside a transaction.
    ///
    /// The flag is visible immediately (through [`DeliveryGuard::ledger`]);
    /// it is cleared again when the guard drops without
    /// [`DeliveryGuard::commit`].
    pub fn begin_delivery(&mut self, id: &RequestId) -> GatewayResult<DeliveryGuard<'_, H>> {
        self.commit_callback(id)?;
        Ok(DeliveryGuard {
            ledger: self,
            request_id: *id,
            committed: false,
        })
    }

    /// Serializable copy of the ledger.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            nonce: self.nonce,
            requests: self
                .requests
                .iter()
                .map(|(id, r)| StoredRequest {
                    request_id: *id,
                    request: r.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a ledger from a snapshot.
    pub fn restore(snapshot: LedgerSnapshot) -> GatewayResult<Self> {
        if (snapshot.requests.len() as u64) > snapshot.nonce {
            return Err(GatewayError::IncompatibleSnapshot {
                reason: format!(
                    "{} records but nonce is only {}",
                    snapshot.requests.len(),
                    snapshot.nonce
                ),
            });
        }
        let mut requests = BTreeMap::new();
        for StoredRequest { request_id, request } in snapshot.requests {
            if request.callback_fulfilled && !request.proof_fulfilled {
                return Err(GatewayError::IncompatibleSnapshot {
                    reason: format!("request {request_id} delivered without a proof"),
                });
            }
            if requests.insert(request_id, request).is_some() {
                return Err(GatewayError::IncompatibleSnapshot {
                    reason: format!("request {request_id} stored twice"),
                });
            }
        }
        Ok(Self {
            nonce: snapshot.nonce,
            requests,
            _digest: PhantomData,
        })
    }
}

impl<H: Digester> RequestLookup for RequestLedger<H> {
    fn lookup(&self, id: &RequestId) -> Option<&FunctionRequest> {
        self.requests.get(id)
    }
}

/// Open delivery transaction; see [`RequestLedger::begin_delivery`].
#[derive(Debug)]
pub struct DeliveryGuard<'a, H: Digester> {
    ledger: &'a mut RequestLedger<H>,
    request_id: RequestId,
    committed: bool,
}

impl<H: Digester> DeliveryGuard<'_, H> {
    /// Read-only view including the provisional flag.
    #[must_use]
    pub fn ledger(&self) -> &RequestLedger<H> {
        self.ledger
    }

    /// Keep the flag.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<H: Digester> Drop for DeliveryGuard<'_, H> {
    fn drop(&mut self) {
        if !self.committed {
            if let Some(r) = self.ledger.requests.get_mut(&self.request_id) {
                r.callback_fulfilled = false;
            }
        }
    }
}

/// Persisted record with its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRequest {
    /// Identifier.
    pub request_id: RequestId,
    /// Record.
    pub request: FunctionRequest,
}

/// Serializable ledger state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Next nonce.
    pub nonce: u64,
    /// Records ordered by id.
    pub requests: Vec<StoredRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CallbackTarget {
        CallbackTarget::new("consumer", [1, 2, 3, 4])
    }

    fn ledger_with_one() -> (RequestLedger, RequestId) {
        let mut l = RequestLedger::<Sha256Digester>::new();
        let (_, id) = l
            .create(Digest([1; 32]), Digest([2; 32]), Digest([3; 32]), target())
            .unwrap();
        (l, id)
    }

    #[test]
    fn identical_content_gets_distinct_ids() {
        let mut l = RequestLedger::<Sha256Digester>::new();
        let (n0, a) = l
            .create(Digest([1; 32]), Digest([2; 32]), Digest([3; 32]), target())
            .unwrap();
        let (n1, b) = l
            .create(Digest([1; 32]), Digest([2; 32]), Digest([3; 32]), target())
            .unwrap();
        assert_eq!((n0, n1), (0, 1));
        assert_ne!(a, b);
        assert_eq!(l.nonce(), 2);
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn id_binds_callback_target() {
        let rec_a = FunctionRequest::pending(Digest::ZERO, Digest::ZERO, Digest::ZERO, target());
        let rec_b = FunctionRequest::pending(
            Digest::ZERO,
            Digest::ZERO,
            Digest::ZERO,
            CallbackTarget::new("consumer", [1, 2, 3, 5]),
        );
        assert_ne!(
            derive_request_id::<Sha256Digester>(0, &rec_a),
            derive_request_id::<Sha256Digester>(0, &rec_b)
        );
    }

    #[test]
    fn proof_commits_once() {
        let (mut l, id) = ledger_with_one();
        l.commit_proof(&id, Digest([9; 32])).unwrap();
        let err = l.commit_proof(&id, Digest([8; 32])).unwrap_err();
        assert_eq!(
            err,
            GatewayError::AlreadyFulfilled {
                request_id: id,
                stage: FulfillmentStage::Proof
            }
        );
        assert_eq!(l.get(&id).unwrap().output_hash, Digest([9; 32]));
        assert_eq!(l.status(&id).unwrap(), RequestStatus::Proved);
    }

    #[test]
    fn unknown_ids_never_transition() {
        let (mut l, _) = ledger_with_one();
        let ghost = Digest([0xee; 32]);
        assert_eq!(
            l.commit_proof(&ghost, Digest::ZERO),
            Err(GatewayError::NotFound { request_id: ghost })
        );
        assert_eq!(
            l.commit_callback(&ghost),
            Err(GatewayError::NotFound { request_id: ghost })
        );
        assert!(!l.contains(&ghost));
    }

    #[test]
    fn callback_requires_proof() {
        let (mut l, id) = ledger_with_one();
        assert_eq!(
            l.commit_callback(&id),
            Err(GatewayError::ProofNotFulfilled { request_id: id })
        );
    }

    #[test]
    fn dropped_guard_reverts_flag() {
        let (mut l, id) = ledger_with_one();
        l.commit_proof(&id, Digest([9; 32])).unwrap();
        {
            let guard = l.begin_delivery(&id).unwrap();
            assert!(guard.ledger().get(&id).unwrap().callback_fulfilled);
        }
        assert!(!l.get(&id).unwrap().callback_fulfilled);

        l.begin_delivery(&id).unwrap().commit();
        assert!(l.get(&id).unwrap().callback_fulfilled);
        assert_eq!(l.status(&id).unwrap(), RequestStatus::Completed);
    }

    #[test]
    fn pending_filters_proved() {
        let mut l = RequestLedger::<Sha256Digester>::new();
        let (_, a) = l
            .create(Digest([1; 32]), Digest::ZERO, Digest::ZERO, target())
            .unwrap();
        let (_, b) = l
            .create(Digest([2; 32]), Digest::ZERO, Digest::ZERO, target())
            .unwrap();
        l.commit_proof(&a, Digest([5; 32])).unwrap();
        let pending: Vec<_> = l.pending().map(|(id, _)| *id).collect();
        assert_eq!(pending, vec![b]);
    }

    #[test]
    fn snapshot_restore_preserves_state() {
        let (mut l, id) = ledger_with_one();
        l.commit_proof(&id, Digest([9; 32])).unwrap();
        let snap = l.snapshot();
        let back = RequestLedger::<Sha256Digester>::restore(snap.clone()).unwrap();
        assert_eq!(back.snapshot(), snap);
        assert_eq!(back.nonce(), 1);
    }

    #[test]
    fn exhausted_nonce_is_refused_without_wrapping() {
        let (l, _) = ledger_with_one();
        let mut snap = l.snapshot();
        snap.nonce = u64::MAX;
        let mut l = RequestLedger::<Sha256Digester>::restore(snap).unwrap();
        let err = l
            .create(Digest([1; 32]), Digest([2; 32]), Digest([3; 32]), target())
            .unwrap_err();
        assert_eq!(err, GatewayError::NonceExhausted { nonce: u64::MAX });
        assert_eq!(l.nonce(), u64::MAX);
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn colliding_id_never_overwrites() {
        let (l, id) = ledger_with_one();
        let original = l.get(&id).unwrap().clone();
        // Rewind the nonce so the same record derives the same id again.
        let mut snap = l.snapshot();
        snap.nonce = 1;
        let mut replayed = RequestLedger::<Sha256Digester>::restore(snap).unwrap();
        replayed.nonce = 0;
        assert_eq!(
            replayed.create(Digest([1; 32]), Digest([2; 32]), Digest([3; 32]), target()),
            Err(GatewayError::IdCollision { request_id: id })
        );
        assert_eq!(replayed.get(&id).unwrap(), &original);
        assert_eq!(replayed.nonce(), 0);
    }

    #[test]
    fn restore_rejects_inconsistent_snapshots() {
        let (l, _) = ledger_with_one();
        let mut snap = l.snapshot();
        snap.nonce = 0;
        assert!(matches!(
            RequestLedger::<Sha256Digester>::restore(snap),
            Err(GatewayError::IncompatibleSnapshot { .. })
        ));

        let mut snap = l.snapshot();
        snap.requests[0].request.callback_fulfilled = true;
        assert!(RequestLedger::<Sha256Digester>::restore(snap).is_err());
    }
}
