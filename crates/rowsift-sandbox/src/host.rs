//! Running the evaluator behind a message channel.
//!
//! A sandbox is anything that accepts request envelopes on one channel and
//! answers on another. [`ThreadSandbox`] runs a [`SafeEvaluator`] on a
//! dedicated OS thread; the engine never leaves that thread.

use serde_json::Value as JsonValue;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use crate::evaluator::{SafeEvaluator, SandboxLimits};
use crate::protocol::{EvalResponse, SandboxMessage};

/// Both ends of a live sandbox, seen from the client.
#[derive(Debug)]
pub struct SandboxChannel {
    /// Envelopes to the sandbox.
    pub outbound: UnboundedSender<JsonValue>,
    /// Envelopes from the sandbox. Closes when the sandbox stops.
    pub inbound: UnboundedReceiver<JsonValue>,
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn sandbox thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
}

/// Creates sandbox instances.
pub trait SandboxLauncher: Send + Sync {
    fn launch(&self) -> Result<SandboxChannel, LaunchError>;
}

/// Launches a [`SafeEvaluator`] on its own thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadSandbox {
    limits: SandboxLimits,
}

impl ThreadSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }
}

impl SandboxLauncher for ThreadSandbox {
    fn launch(&self) -> Result<SandboxChannel, LaunchError> {
        let (outbound, requests) = mpsc::unbounded_channel();
        let (responses, inbound) = mpsc::unbounded_channel();
        let limits = self.limits.clone();
        std::thread::Builder::new()
            .name("rowsift-sandbox".into())
            .spawn(move || serve(&limits, requests, responses))?;
        Ok(SandboxChannel { outbound, inbound })
    }
}

/// Sandbox main loop: announce readiness, then answer requests until either
/// side of the channel closes.
///
/// Anything that is not a well-formed request is dropped.
pub fn serve(
    limits: &SandboxLimits,
    mut requests: UnboundedReceiver<JsonValue>,
    responses: UnboundedSender<JsonValue>,
) {
    let evaluator = SafeEvaluator::new(limits);
    if !send(&responses, &SandboxMessage::Ready) {
        return;
    }

    while let Some(raw) = requests.blocking_recv() {
        let request = match SandboxMessage::from_json(raw) {
            Ok(SandboxMessage::Request(request)) => request,
            Ok(other) => {
                debug!(?other, "sandbox ignoring non-request message");
                continue;
            }
            Err(err) => {
                debug!(%err, "sandbox ignoring malformed message");
                continue;
            }
        };

        trace!(id = request.id, expr = %request.expr, "evaluating");
        let response = match evaluator.evaluate(&request.expr, &request.context) {
            Ok(value) => EvalResponse::ok(request.id, value),
            Err(message) => EvalResponse::err(request.id, message),
        };
        if !send(&responses, &response.into()) {
            break;
        }
    }
    debug!("sandbox stopped");
}

fn send(responses: &UnboundedSender<JsonValue>, message: &SandboxMessage) -> bool {
    match message.to_json() {
        Ok(value) => responses.send(value).is_ok(),
        Err(err) => {
            debug!(%err, "sandbox failed to encode message");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EvalRequest;
    use serde_json::json;

    #[tokio::test]
    async fn thread_sandbox_announces_then_answers() {
        let SandboxChannel {
            outbound,
            mut inbound,
        } = ThreadSandbox::default().launch().unwrap();

        let ready = SandboxMessage::from_json(inbound.recv().await.unwrap()).unwrap();
        assert_eq!(ready, SandboxMessage::Ready);

        outbound.send(json!({"type": "NOISE"})).unwrap();
        for (id, expr) in [(1, "v1 + 1"), (2, "boom(")] {
            let request = SandboxMessage::Request(EvalRequest {
                id,
                expr: expr.into(),
                context: json!({"v1": 1.0}).as_object().cloned().unwrap(),
            });
            outbound.send(request.to_json().unwrap()).unwrap();
        }

        let first = SandboxMessage::from_json(inbound.recv().await.unwrap()).unwrap();
        assert_eq!(first, SandboxMessage::Response(EvalResponse::ok(1, json!(2.0))));
        let SandboxMessage::Response(second) =
            SandboxMessage::from_json(inbound.recv().await.unwrap()).unwrap()
        else {
            panic!("expected a response");
        };
        assert_eq!(second.id, 2);
        assert!(!second.success);
        assert!(second.error.is_some());

        drop(outbound);
        assert!(inbound.recv().await.is_none());
    }
}
