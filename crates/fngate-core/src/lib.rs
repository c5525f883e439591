//! `fngate-core`: request ledger, proof-gated fulfillment and callback
//! delivery for verifiable function calls.
//!
//! A caller submits a request naming a function, an input and a callback
//! target, paying a metered fee. An untrusted prover later supplies an
//! output hash plus a proof (or one aggregate proof for a batch); the
//! gateway checks it against the function's verifier and only then allows
//! the result to be delivered, exactly once, to the callback target.
//!
//! ```no_run
//! use fngate_core::prelude::*;
//!
//! let mut gw = FunctionGateway::from_config(GatewayConfig::default());
//! let id = gw.submit(
//!     &CallEnv::new("alice", 1),
//!     SubmitRequest {
//!         function_id: Digest([1; 32]),
//!         input: b"input".to_vec(),
//!         callback: CallbackTarget::new("consumer", [0xde, 0xad, 0xbe, 0xef]),
//!         context: vec![],
//!         gas_budget: Some(100),
//!         refund_recipient: None,
//!         payment: 100,
//!     },
//! )?;
//! // ... a prover calls gw.fulfill(&id, output_hash, &proof) ...
//! // ... then gw.callback(&mut executor, &id, &output, &context) ...
//! # let _ = id;
//! # Ok::<(), GatewayError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::unwrap_used, clippy::expect_used)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

/// One-shot callback delivery and executors.
pub mod callback;
/// TOML configuration.
pub mod config;
/// Protocol error type.
pub mod error;
/// Events and sinks.
pub mod event;
/// Fee metering, settlement and the in-memory escrow rail.
pub mod fee;
/// Single and batch fulfillment.
pub mod fulfill;
/// The `FunctionGateway` façade and snapshots.
pub mod gateway;
/// JSON/CBOR helpers and auto-detecting read/write APIs.
pub mod io;
/// Request records, id derivation and delivery transactions.
pub mod ledger;
/// Canonical data types.
pub mod types;
/// Verifier lookup and proof adjudication.
pub mod verify;

pub use callback::{
    CallbackCall, CallbackDispatcher, CallbackExecutor, CallbackFailure, DeliveredCall,
    RecordingExecutor, RejectingExecutor,
};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use event::{EventLog, EventSink, GatewayEvent};
pub use fee::{
    calculate_fee, settle_payment, Escrow, FeeSchedule, Payment, PaymentRail, Transfer,
    TransferKind, TransferRejected, DEFAULT_GAS_BUDGET,
};
pub use fulfill::FulfillmentEngine;
pub use gateway::{FunctionGateway, GatewaySnapshot, SNAPSHOT_VERSION};
pub use ledger::{derive_request_id, DeliveryGuard, LedgerSnapshot, RequestLedger, RequestLookup};
pub use types::*;
pub use verify::{
    BatchRoots, FunctionRegistry, VerificationCapability, VerificationGateway, VerifierRegistry,
};

pub use fngate_crypto::{Digest, Digester};

/// Commonly-used items for quick imports.
///
/// ```rust
/// use fngate_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        callback::{CallbackExecutor, RecordingExecutor},
        config::GatewayConfig,
        error::{GatewayError, GatewayResult},
        gateway::FunctionGateway,
        types::*,
        verify::{FunctionRegistry, VerificationCapability},
    };
    pub use fngate_crypto::{Digest, Digester, Sha256Digester};
}
