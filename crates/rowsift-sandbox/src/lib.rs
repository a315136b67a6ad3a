//! The isolated expression evaluator for rowsift.
//!
//! Expressions run inside an embedded script engine with a fixed whitelist of
//! globals and no access to the host. The sandbox talks to the outside world
//! only through JSON envelopes (see [`protocol`]), so the same client works
//! against the in-process thread host or any other transport.

mod builtins;
pub mod dialect;
pub mod evaluator;
pub mod host;
pub mod protocol;

pub use evaluator::{SafeEvaluator, SandboxLimits};
pub use host::{LaunchError, SandboxChannel, SandboxLauncher, ThreadSandbox, serve};
pub use protocol::{
    EVAL_EXPR_REQUEST, EVAL_EXPR_RESPONSE, EvalRequest, EvalResponse, SANDBOX_READY,
    SandboxMessage,
};
