// crates/fngate-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use fngate_core::io::{read_auto, write_auto, Versioned};
use fngate_core::{
    AccountId, BatchFulfillment, CallEnv, CallbackExecutor, CallbackTarget, Escrow, EventLog,
    FunctionGateway, FunctionRegistry, GatewayConfig, GatewaySnapshot, RecordingExecutor,
    RejectingExecutor, RequestId, SubmitRequest,
};
use fngate_crypto::{Digest, Digester, Sha256Digester};
use fngate_verifier::{TranscriptAggregator, TranscriptVerifier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Wire version of the state file.
const STATE_VERSION: u16 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "fngate",
    about = "fngate reference CLI",
    long_about = "fngate reference CLI.\n\n\
        Submit verifiable function requests, fulfill them with reference \
        transcript proofs and deliver results against a local state file.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    /// State file (JSON, or CBOR with a `.cbor` extension)
    #[arg(long, global = true, default_value = "fngate-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create a fresh state file
    Init {
        /// Gateway config (TOML); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing state file
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Register a reference verifier for a function
    Register {
        /// Function name or 64-hex function id
        #[arg(long)]
        function: String,

        /// Seed the verification key is derived from
        #[arg(long)]
        seed: String,
    },

    /// Install the reference aggregation verifier
    RegisterAggregator {
        /// Seed the aggregation key is derived from
        #[arg(long)]
        seed: String,
    },

    /// Submit a request
    Request {
        /// Function name or 64-hex function id
        #[arg(long)]
        function: String,

        /// Input bytes (UTF-8)
        #[arg(long)]
        input: String,

        /// Callback target as `destination:0xselector`
        #[arg(long)]
        callback: CallbackTarget,

        /// Opaque context bytes (UTF-8)
        #[arg(long, default_value = "")]
        context: String,

        /// Gas budget; the configured default applies when omitted
        #[arg(long)]
        gas: Option<u64>,

        /// Refund recipient; defaults to the caller
        #[arg(long)]
        refund: Option<String>,

        /// Amount escrowed with the call
        #[arg(long, default_value_t = 0)]
        payment: u128,

        /// Caller identity
        #[arg(long, default_value = "cli")]
        caller: String,

        /// Unit price signal for this call
        #[arg(long, default_value_t = 0)]
        unit_price: u64,
    },

    /// Produce a reference proof for a request and a claimed output
    Attest {
        /// Request id (hex)
        #[arg(long)]
        request: Digest,

        /// Output bytes (UTF-8)
        #[arg(long)]
        output: String,
    },

    /// Fulfill one request with a proof
    Fulfill {
        /// Request id (hex)
        #[arg(long)]
        request: Digest,

        /// Output bytes (UTF-8); the committed output hash is their digest
        #[arg(long)]
        output: String,

        /// Proof bytes (hex)
        #[arg(long)]
        proof: String,
    },

    /// Fulfill several requests with one aggregate proof
    FulfillBatch {
        /// Request ids (hex), repeatable
        #[arg(long = "request", required = true)]
        requests: Vec<Digest>,

        /// Outputs (UTF-8), index-aligned with `--request`
        #[arg(long = "output", required = true)]
        outputs: Vec<String>,

        /// Aggregate proof (hex); attested with the stored aggregator when omitted
        #[arg(long)]
        proof: Option<String>,
    },

    /// Deliver a proven result to its callback target
    Callback {
        /// Request id (hex)
        #[arg(long)]
        request: Digest,

        /// Output bytes (UTF-8)
        #[arg(long)]
        output: String,

        /// Context bytes (UTF-8)
        #[arg(long, default_value = "")]
        context: String,

        /// Make the simulated target fail with this reason
        #[arg(long, conflicts_with = "reject")]
        fail: Option<String>,

        /// Make the simulated target refuse the call outright
        #[arg(long, default_value_t = false)]
        reject: bool,
    },

    /// Quote the current fee
    Quote {
        /// Gas budget; the configured default applies when omitted
        #[arg(long)]
        gas: Option<u64>,

        /// Unit price signal
        #[arg(long)]
        unit_price: u64,
    },

    /// Change the fee scalar (controller only)
    SetScalar {
        /// Caller identity
        #[arg(long)]
        caller: String,

        /// New scalar (0 disables scaling)
        #[arg(long)]
        scalar: u64,
    },

    /// Change or clear the fee vault (controller only)
    SetVault {
        /// Caller identity
        #[arg(long)]
        caller: String,

        /// New vault; omit to disable fee forwarding
        #[arg(long)]
        vault: Option<String>,
    },

    /// Print the state, or one request
    Show {
        /// Request id (hex)
        #[arg(long)]
        request: Option<Digest>,
    },
}

/// A function and the reference verifier registered for it.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RegisteredFunction {
    function_id: Digest,
    verifier: TranscriptVerifier,
}

/// Everything the CLI persists between invocations.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CliState {
    gateway: GatewaySnapshot,
    functions: Vec<RegisteredFunction>,
    aggregator: Option<TranscriptAggregator>,
    escrow: Escrow,
}

impl CliState {
    fn load(path: &Path) -> Result<Self> {
        let v: Versioned<Self> = read_auto(path).with_context(|| {
            format!("reading state {} (run `fngate init` first?)", path.display())
        })?;
        v.expect_version(STATE_VERSION)
    }

    fn save(&self, path: &Path) -> Result<()> {
        write_auto(path, &Versioned::new(STATE_VERSION, self))
            .with_context(|| format!("writing state {}", path.display()))
    }

    fn verifier(&self, function_id: &Digest) -> Option<&TranscriptVerifier> {
        self.functions
            .iter()
            .find(|f| &f.function_id == function_id)
            .map(|f| &f.verifier)
    }

    fn gateway(&self) -> Result<FunctionGateway> {
        let mut registry = FunctionRegistry::new();
        for f in &self.functions {
            registry.register(f.function_id, f.verifier);
        }
        if let Some(agg) = self.aggregator {
            registry.set_aggregator(agg);
        }
        FunctionGateway::restore(
            self.gateway.clone(),
            registry,
            self.escrow.clone(),
            EventLog::new(),
        )
        .context("restoring gateway from state")
    }

    /// Persist `gw` and print the events it emitted.
    fn commit(&mut self, mut gw: FunctionGateway, path: &Path) -> Result<()> {
        for ev in gw.events_mut().drain() {
            info!(event = ev.event_type(), "emitted");
            println!("{}", serde_json::to_string(&ev).context("serialize event")?);
        }
        self.gateway = gw.snapshot();
        self.escrow = gw.rail().clone();
        self.save(path)
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let state = cli.state;
    match cli.cmd {
        Cmd::Init { config, force } => init(&state, config, force),
        Cmd::Register { function, seed } => register(&state, &function, &seed),
        Cmd::RegisterAggregator { seed } => register_aggregator(&state, &seed),
        Cmd::Request {
            function,
            input,
            callback,
            context,
            gas,
            refund,
            payment,
            caller,
            unit_price,
        } => request(
            &state,
            &function,
            SubmitRequest {
                function_id: parse_function(&function),
                input: input.into_bytes(),
                callback,
                context: context.into_bytes(),
                gas_budget: gas,
                refund_recipient: refund.map(AccountId::from),
                payment,
            },
            &CallEnv::new(caller, unit_price),
        ),
        Cmd::Attest { request, output } => attest(&state, &request, &output),
        Cmd::Fulfill {
            request,
            output,
            proof,
        } => fulfill(&state, &request, &output, &proof),
        Cmd::FulfillBatch {
            requests,
            outputs,
            proof,
        } => fulfill_batch(&state, requests, &outputs, proof.as_deref()),
        Cmd::Callback {
            request,
            output,
            context,
            fail,
            reject,
        } => {
            if reject {
                deliver(&state, &request, &output, &context, &mut RejectingExecutor)
            } else {
                callback(&state, &request, &output, &context, fail)
            }
        }
        Cmd::Quote { gas, unit_price } => quote(&state, gas, unit_price),
        Cmd::SetScalar { caller, scalar } => set_scalar(&state, &caller, scalar),
        Cmd::SetVault { caller, vault } => set_vault(&state, &caller, vault),
        Cmd::Show { request } => show(&state, request.as_ref()),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// A 64-hex string is taken as an id; anything else is hashed as a name.
fn parse_function(s: &str) -> Digest {
    Digest::from_hex(s).unwrap_or_else(|_| Sha256Digester::digest(s.as_bytes()))
}

fn parse_proof(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).context("proof is not valid hex")
}

fn init(path: &Path, config: Option<PathBuf>, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    let cfg = match config {
        Some(p) => GatewayConfig::load(&p)?,
        None => GatewayConfig::default(),
    };
    info!(controller = %cfg.controller, scalar = cfg.fee_scalar, "initializing state");
    let gw = FunctionGateway::from_config(cfg);
    let state = CliState {
        gateway: gw.snapshot(),
        functions: Vec::new(),
        aggregator: None,
        escrow: Escrow::new(),
    };
    state.save(path)?;
    println!("Initialized {}", path.display());
    Ok(())
}

fn register(path: &Path, function: &str, seed: &str) -> Result<()> {
    let mut state = CliState::load(path)?;
    let function_id = parse_function(function);
    let verifier = TranscriptVerifier::from_seed(seed.as_bytes());
    state.functions.retain(|f| f.function_id != function_id);
    state.functions.push(RegisteredFunction {
        function_id,
        verifier,
    });
    state.save(path)?;
    println!("Registered {function_id} (key {})", verifier.key());
    Ok(())
}

fn register_aggregator(path: &Path, seed: &str) -> Result<()> {
    let mut state = CliState::load(path)?;
    let agg = TranscriptAggregator::from_seed(seed.as_bytes());
    state.aggregator = Some(agg);
    state.save(path)?;
    println!("Aggregator key {}", agg.key());
    Ok(())
}

fn request(path: &Path, function: &str, req: SubmitRequest, env: &CallEnv) -> Result<()> {
    let mut state = CliState::load(path)?;
    let mut gw = state.gateway()?;
    info!(function, caller = %env.caller, "submitting request");
    let id = gw.submit(env, req).context("submit failed")?;
    state.commit(gw, path)?;
    println!("{id}");
    Ok(())
}

fn attest(path: &Path, request: &RequestId, output: &str) -> Result<()> {
    let state = CliState::load(path)?;
    let gw = state.gateway()?;
    let record = gw.request(request)?;
    let verifier = state
        .verifier(&record.function_id)
        .ok_or_else(|| anyhow!("no reference verifier for function {}", record.function_id))?;
    let proof = verifier.attest(&record.input_hash, &Sha256Digester::digest(output.as_bytes()));
    println!("{}", hex::encode(proof));
    Ok(())
}

fn fulfill(path: &Path, request: &RequestId, output: &str, proof: &str) -> Result<()> {
    let mut state = CliState::load(path)?;
    let mut gw = state.gateway()?;
    let proof = parse_proof(proof)?;
    gw.fulfill(request, Sha256Digester::digest(output.as_bytes()), &proof)
        .context("fulfill failed")?;
    state.commit(gw, path)?;
    println!("Fulfilled {request}");
    Ok(())
}

fn fulfill_batch(
    path: &Path,
    requests: Vec<RequestId>,
    outputs: &[String],
    proof: Option<&str>,
) -> Result<()> {
    let mut state = CliState::load(path)?;
    let mut gw = state.gateway()?;
    let output_hashes: Vec<Digest> = outputs
        .iter()
        .map(|o| Sha256Digester::digest(o.as_bytes()))
        .collect();
    let roots = gw
        .batch_roots(&requests, &output_hashes)
        .context("computing batch roots")?;
    let aggregate_proof = match proof {
        Some(p) => parse_proof(p)?,
        None => state
            .aggregator
            .ok_or_else(|| anyhow!("no aggregator registered and no --proof given"))?
            .attest(&roots.inputs_root, &roots.outputs_root),
    };
    let n = requests.len();
    gw.fulfill_batch(BatchFulfillment {
        request_ids: requests,
        aggregate_proof,
        inputs_root: roots.inputs_root,
        output_hashes,
        outputs_root: roots.outputs_root,
        verification_key_root: roots.verification_key_root,
    })
    .context("batch fulfill failed")?;
    state.commit(gw, path)?;
    println!("Fulfilled {n} requests");
    Ok(())
}

fn callback(
    path: &Path,
    request: &RequestId,
    output: &str,
    context: &str,
    fail: Option<String>,
) -> Result<()> {
    let mut target = fail.map_or_else(RecordingExecutor::new, RecordingExecutor::failing);
    deliver(path, request, output, context, &mut target)?;
    for call in target.calls() {
        info!(target = %call.target, request = %call.request_id, "delivered");
    }
    Ok(())
}

fn deliver<E: CallbackExecutor>(
    path: &Path,
    request: &RequestId,
    output: &str,
    context: &str,
    target: &mut E,
) -> Result<()> {
    let mut state = CliState::load(path)?;
    let mut gw = state.gateway()?;
    gw.callback(target, request, output.as_bytes(), context.as_bytes())
        .context("callback failed")?;
    state.commit(gw, path)?;
    println!("Delivered {request}");
    Ok(())
}

fn quote(path: &Path, gas: Option<u64>, unit_price: u64) -> Result<()> {
    let state = CliState::load(path)?;
    let gw = state.gateway()?;
    println!("{}", gw.quote_fee(gas, unit_price)?);
    Ok(())
}

fn set_scalar(path: &Path, caller: &str, scalar: u64) -> Result<()> {
    let mut state = CliState::load(path)?;
    let mut gw = state.gateway()?;
    gw.set_fee_scalar(&AccountId::from(caller), scalar)?;
    state.commit(gw, path)
}

fn set_vault(path: &Path, caller: &str, vault: Option<String>) -> Result<()> {
    let mut state = CliState::load(path)?;
    let mut gw = state.gateway()?;
    gw.set_fee_vault(&AccountId::from(caller), vault.map(AccountId::from))?;
    state.commit(gw, path)
}

fn show(path: &Path, request: Option<&RequestId>) -> Result<()> {
    let state = CliState::load(path)?;
    let out = match request {
        Some(id) => {
            let gw = state.gateway()?;
            let record = gw.request(id)?;
            serde_json::json!({
                "request_id": id,
                "status": record.status(),
                "request": record,
            })
        }
        None => serde_json::to_value(&state).context("serialize state")?,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&out).context("render JSON")?
    );
    Ok(())
}
