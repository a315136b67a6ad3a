//! Asynchronous request/response client for a sandbox.
//!
//! Every call gets a fresh id and a pending slot. A router task owns the
//! sandbox's inbound channel and completes slots by id, so any number of
//! calls can be outstanding and responses may arrive in any order. A call
//! that outlives its timeout gives up its slot; a response that shows up
//! afterwards finds nothing to complete and is dropped.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rowsift_common::VariableMapping;
use rowsift_sandbox::{
    EvalRequest, SandboxChannel, SandboxLauncher, SandboxLimits, SandboxMessage, ThreadSandbox,
};
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace, warn};

use crate::error::EvalError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can evaluate an expression against a variable mapping.
///
/// The pipeline is generic over this so it can run against the sandbox
/// client or a scripted stand-in.
pub trait Evaluate: Send + Sync {
    fn evaluate(
        &self,
        expr: &str,
        vars: &VariableMapping,
    ) -> impl Future<Output = Result<JsonValue, EvalError>> + Send;
}

impl<T: Evaluate> Evaluate for Arc<T> {
    fn evaluate(
        &self,
        expr: &str,
        vars: &VariableMapping,
    ) -> impl Future<Output = Result<JsonValue, EvalError>> + Send {
        (**self).evaluate(expr, vars)
    }
}

impl<T: Evaluate> Evaluate for &T {
    fn evaluate(
        &self,
        expr: &str,
        vars: &VariableMapping,
    ) -> impl Future<Output = Result<JsonValue, EvalError>> + Send {
        (**self).evaluate(expr, vars)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on a single call, including waiting for readiness.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

type Waiter = oneshot::Sender<Result<JsonValue, EvalError>>;
type PendingMap = Arc<Mutex<FxHashMap<u64, Waiter>>>;

/// One launched sandbox. Pending slots belong to the link they were sent
/// on, so tearing down a dead link never touches calls on its replacement.
struct SandboxLink {
    outbound: UnboundedSender<JsonValue>,
    ready: watch::Receiver<bool>,
    pending: PendingMap,
}

impl SandboxLink {
    fn start(channel: SandboxChannel) -> Self {
        let (ready_tx, ready) = watch::channel(false);
        let pending = PendingMap::default();
        tokio::spawn(route(channel.inbound, ready_tx, Arc::clone(&pending)));
        Self {
            outbound: channel.outbound,
            ready,
            pending,
        }
    }

    /// The router drops the readiness sender when the inbound side closes.
    fn is_alive(&self) -> bool {
        !self.outbound.is_closed() && self.ready.has_changed().is_ok()
    }
}

async fn route(
    mut inbound: UnboundedReceiver<JsonValue>,
    ready: watch::Sender<bool>,
    pending: PendingMap,
) {
    while let Some(raw) = inbound.recv().await {
        match SandboxMessage::from_json(raw) {
            Ok(SandboxMessage::Ready) => {
                debug!("sandbox ready");
                ready.send_replace(true);
            }
            Ok(SandboxMessage::Response(response)) => {
                let waiter = pending.lock().remove(&response.id);
                match waiter {
                    Some(waiter) => {
                        trace!(id = response.id, "completing call");
                        let _ = waiter.send(response.into_result().map_err(EvalError::Evaluation));
                    }
                    None => debug!(id = response.id, "dropping response with no pending call"),
                }
            }
            Ok(SandboxMessage::Request(request)) => {
                debug!(id = request.id, "ignoring request envelope sent by sandbox");
            }
            Err(err) => debug!(%err, "ignoring malformed sandbox message"),
        }
    }

    debug!("sandbox channel closed");
    let orphaned: Vec<Waiter> = pending.lock().drain().map(|(_, waiter)| waiter).collect();
    for waiter in orphaned {
        let _ = waiter.send(Err(EvalError::Disconnected));
    }
}

/// Removes a call's slot however the call ends.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Client for one sandbox at a time.
///
/// The sandbox is launched lazily on the first call and relaunched on the
/// next call after it goes away. Calls must be made from inside a Tokio
/// runtime.
pub struct EvaluatorClient {
    launcher: Arc<dyn SandboxLauncher>,
    config: ClientConfig,
    link: Mutex<Option<Arc<SandboxLink>>>,
    next_id: AtomicU64,
}

impl EvaluatorClient {
    pub fn new(launcher: impl SandboxLauncher + 'static) -> Self {
        Self::with_config(launcher, ClientConfig::default())
    }

    pub fn with_config(launcher: impl SandboxLauncher + 'static, config: ClientConfig) -> Self {
        Self {
            launcher: Arc::new(launcher),
            config,
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// A client backed by an in-process [`ThreadSandbox`].
    pub fn in_process(limits: SandboxLimits) -> Self {
        Self::new(ThreadSandbox::new(limits))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Calls currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.link
            .lock()
            .as_ref()
            .map_or(0, |link| link.pending.lock().len())
    }

    /// Launch the sandbox now instead of on the first call.
    pub fn connect(&self) -> Result<(), EvalError> {
        self.link().map(|_| ())
    }

    /// Evaluate `expr` with `vars` bound, giving up after the configured
    /// timeout.
    pub async fn call(&self, expr: &str, vars: &VariableMapping) -> Result<JsonValue, EvalError> {
        let limit = self.config.timeout;
        match tokio::time::timeout(limit, self.dispatch(expr, vars)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(?limit, expr, "evaluation timed out");
                Err(EvalError::Timeout(limit))
            }
        }
    }

    async fn dispatch(&self, expr: &str, vars: &VariableMapping) -> Result<JsonValue, EvalError> {
        let link = self.link()?;

        let mut ready = link.ready.clone();
        if ready.wait_for(|ready| *ready).await.is_err() {
            return Err(EvalError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (waiter, response) = oneshot::channel();
        link.pending.lock().insert(id, waiter);
        let _guard = PendingGuard {
            pending: &link.pending,
            id,
        };

        let request = SandboxMessage::Request(EvalRequest {
            id,
            expr: expr.to_string(),
            context: vars.to_json_map(),
        });
        let envelope = request
            .to_json()
            .map_err(|err| EvalError::Encode(err.to_string()))?;
        link.outbound
            .send(envelope)
            .map_err(|_| EvalError::Disconnected)?;

        response.await.unwrap_or(Err(EvalError::Disconnected))
    }

    fn link(&self) -> Result<Arc<SandboxLink>, EvalError> {
        let mut slot = self.link.lock();
        if let Some(link) = slot.as_ref().filter(|link| link.is_alive()) {
            return Ok(Arc::clone(link));
        }
        if slot.is_some() {
            debug!("sandbox went away, relaunching");
        }

        let channel = self.launcher.launch().map_err(|err| {
            warn!(%err, "failed to launch sandbox");
            EvalError::Unavailable(err.to_string())
        })?;
        let link = Arc::new(SandboxLink::start(channel));
        *slot = Some(Arc::clone(&link));
        Ok(link)
    }
}

impl Evaluate for EvaluatorClient {
    async fn evaluate(&self, expr: &str, vars: &VariableMapping) -> Result<JsonValue, EvalError> {
        self.call(expr, vars).await
    }
}

impl std::fmt::Debug for EvaluatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorClient")
            .field("config", &self.config)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
