use std::sync::Arc;
use std::time::Duration;

use rowsift_common::{VarValue, VariableMapping};
use rowsift_engine::{ClientConfig, EvalError, EvaluatorClient};
use rowsift_sandbox::{
    EvalRequest, EvalResponse, LaunchError, SandboxChannel, SandboxLauncher, SandboxLimits,
    SandboxMessage,
};
use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// The sandbox side of a launch, driven by hand.
struct SandboxEnd {
    requests: UnboundedReceiver<JsonValue>,
    responses: UnboundedSender<JsonValue>,
}

impl SandboxEnd {
    fn send(&self, message: SandboxMessage) {
        self.responses.send(message.to_json().unwrap()).unwrap();
    }

    fn ready(&self) {
        self.send(SandboxMessage::Ready);
    }

    fn respond(&self, response: EvalResponse) {
        self.send(response.into());
    }

    async fn next_request(&mut self) -> EvalRequest {
        let raw = self.requests.recv().await.expect("client hung up");
        match SandboxMessage::from_json(raw).unwrap() {
            SandboxMessage::Request(request) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }
}

/// Hands every launched sandbox's far end to the test.
struct Manual {
    launches: UnboundedSender<SandboxEnd>,
}

impl SandboxLauncher for Manual {
    fn launch(&self) -> Result<SandboxChannel, LaunchError> {
        let (outbound, requests) = mpsc::unbounded_channel();
        let (responses, inbound) = mpsc::unbounded_channel();
        self.launches
            .send(SandboxEnd {
                requests,
                responses,
            })
            .map_err(|_| LaunchError::Unavailable("test finished".into()))?;
        Ok(SandboxChannel { outbound, inbound })
    }
}

fn manual_client(timeout: Duration) -> (Arc<EvaluatorClient>, UnboundedReceiver<SandboxEnd>) {
    let (launches, rx) = mpsc::unbounded_channel();
    let client = EvaluatorClient::with_config(Manual { launches }, ClientConfig { timeout });
    (Arc::new(client), rx)
}

fn spawn_call(
    client: &Arc<EvaluatorClient>,
    expr: &str,
) -> JoinHandle<Result<JsonValue, EvalError>> {
    let client = Arc::clone(client);
    let expr = expr.to_string();
    tokio::spawn(async move { client.call(&expr, &VariableMapping::new()).await })
}

const FIVE_SECONDS: Duration = Duration::from_secs(5);

#[tokio::test]
async fn responses_complete_calls_in_any_order() {
    let (client, mut launches) = manual_client(FIVE_SECONDS);
    let a = spawn_call(&client, "a");
    let mut sandbox = launches.recv().await.unwrap();
    sandbox.ready();
    let b = spawn_call(&client, "b");

    let first = sandbox.next_request().await;
    let second = sandbox.next_request().await;
    assert_ne!(first.id, second.id);

    sandbox.respond(EvalResponse::ok(second.id, json!(second.expr)));
    sandbox.respond(EvalResponse::ok(first.id, json!(first.expr)));

    assert_eq!(a.await.unwrap(), Ok(json!("a")));
    assert_eq!(b.await.unwrap(), Ok(json!("b")));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn nothing_is_sent_before_ready() {
    let (client, mut launches) = manual_client(FIVE_SECONDS);
    let call = spawn_call(&client, "1");
    let mut sandbox = launches.recv().await.unwrap();

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(sandbox.requests.try_recv().is_err());

    sandbox.ready();
    let request = sandbox.next_request().await;
    sandbox.respond(EvalResponse::ok(request.id, json!(1)));
    assert_eq!(call.await.unwrap(), Ok(json!(1)));
}

#[tokio::test]
async fn requests_carry_the_mapping() {
    let (client, mut launches) = manual_client(FIVE_SECONDS);
    let vars: VariableMapping = [
        ("v1", VarValue::Number(15.0)),
        ("name", VarValue::from("abc")),
    ]
    .into_iter()
    .collect();

    let task = {
        let client = Arc::clone(&client);
        let vars = vars.clone();
        tokio::spawn(async move { client.call("v1 > 10", &vars).await })
    };
    let mut sandbox = launches.recv().await.unwrap();
    sandbox.ready();
    let request = sandbox.next_request().await;
    assert_eq!(request.expr, "v1 > 10");
    assert_eq!(JsonValue::Object(request.context), json!({"v1": 15.0, "name": "abc"}));

    sandbox.respond(EvalResponse::err(request.id, "nope"));
    assert_eq!(task.await.unwrap(), Err(EvalError::Evaluation("nope".into())));
}

#[tokio::test]
async fn noise_on_the_channel_is_ignored() {
    let (client, mut launches) = manual_client(FIVE_SECONDS);
    let call = spawn_call(&client, "x");
    let mut sandbox = launches.recv().await.unwrap();
    sandbox.ready();
    let request = sandbox.next_request().await;

    sandbox.responses.send(json!(42)).unwrap();
    sandbox.responses.send(json!({"type": "SOMETHING_ELSE"})).unwrap();
    sandbox.respond(EvalResponse::ok(request.id + 1000, json!("stray")));
    sandbox.send(SandboxMessage::Request(EvalRequest {
        id: request.id,
        expr: "echo".into(),
        context: Default::default(),
    }));
    sandbox.ready();
    sandbox.respond(EvalResponse::ok(request.id, json!("mine")));

    assert_eq!(call.await.unwrap(), Ok(json!("mine")));
}

#[tokio::test(start_paused = true)]
async fn late_responses_are_dropped() {
    let (client, mut launches) = manual_client(FIVE_SECONDS);
    let slow = spawn_call(&client, "slow");
    let mut sandbox = launches.recv().await.unwrap();
    sandbox.ready();
    let stale = sandbox.next_request().await;

    let outcome = slow.await.unwrap();
    assert_eq!(outcome, Err(EvalError::Timeout(FIVE_SECONDS)));
    assert!(outcome.unwrap_err().is_timeout());
    assert_eq!(client.pending_count(), 0);

    sandbox.respond(EvalResponse::ok(stale.id, json!("late")));
    let fresh = spawn_call(&client, "fresh");
    let request = sandbox.next_request().await;
    assert_ne!(request.id, stale.id);
    sandbox.respond(EvalResponse::ok(stale.id, json!("late again")));
    sandbox.respond(EvalResponse::ok(request.id, json!("fresh")));

    assert_eq!(fresh.await.unwrap(), Ok(json!("fresh")));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn lost_sandbox_fails_calls_and_is_relaunched() {
    let (client, mut launches) = manual_client(FIVE_SECONDS);
    let call = spawn_call(&client, "x");
    let mut sandbox = launches.recv().await.unwrap();
    sandbox.ready();
    let _ = sandbox.next_request().await;
    drop(sandbox);

    assert_eq!(call.await.unwrap(), Err(EvalError::Disconnected));
    assert_eq!(client.pending_count(), 0);

    let retry = spawn_call(&client, "y");
    let mut replacement = launches.recv().await.unwrap();
    replacement.ready();
    let request = replacement.next_request().await;
    replacement.respond(EvalResponse::ok(request.id, json!("back")));
    assert_eq!(retry.await.unwrap(), Ok(json!("back")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_calls_against_a_real_sandbox() {
    let client = Arc::new(EvaluatorClient::in_process(SandboxLimits::default()));
    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let vars: VariableMapping = [("v1", VarValue::Number(f64::from(i)))].into_iter().collect();
                client.call("v1 * 2", &vars).await
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Ok(json!(i as f64 * 2.0)));
    }
    assert_eq!(client.pending_count(), 0);
}
