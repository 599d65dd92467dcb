//! Wire protocol between the harness and an emulator process.
//!
//! # Framing
//!
//! ```text
//! Harness                                   Emulator
//!   |                                          |
//!   |-- spawn ------------------------------->|
//!   |<------------- stdout: "READY ip:port" ---|
//!   |                                          |
//!   |-- connect, RpcRequest JSON + '\n' ----->|
//!   |<----------- RpcResponse JSON + '\n' -----|
//! ```
//!
//! One request per connection. The payload of each call is opaque to the
//! harness; only the envelope and the error sentinels are interpreted.

use crate::error::{CallError, ServiceError};
use crate::types::SimulatedUser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Prefix of the line an emulator prints on stdout once it accepts calls.
pub const READY_PREFIX: &str = "READY ";

/// Service a call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Memcache,
    TaskQueue,
    Datastore,
    Module,
}

impl Service {
    /// Returns the service name.
    pub fn name(&self) -> &'static str {
        match self {
            Service::Memcache => "memcache",
            Service::TaskQueue => "taskqueue",
            Service::Datastore => "datastore",
            Service::Module => "module",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single call as sent to the emulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlates the response with this request
    pub id: Uuid,

    pub service: Service,

    pub method: String,

    /// Logical key scope; empty is the default namespace
    pub namespace: String,

    /// Module the call was routed to
    pub module: String,

    /// Identity snapshot at call time
    pub user: Option<SimulatedUser>,

    pub payload: Value,
}

impl RpcRequest {
    /// Creates a request with a fresh id.
    pub fn new(service: Service, method: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            service,
            method: method.into(),
            namespace: String::new(),
            module: crate::types::DEFAULT_MODULE.to_string(),
            user: None,
            payload,
        }
    }
}

/// Outcome half of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcOutcome {
    Ok(Value),
    Err(ServiceError),
}

/// A response as returned by the emulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Uuid,
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn ok(id: Uuid, value: Value) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Ok(value),
        }
    }

    pub fn err(id: Uuid, err: ServiceError) -> Self {
        Self {
            id,
            outcome: RpcOutcome::Err(err),
        }
    }

    /// Checks correlation and turns the outcome into a call result.
    pub fn into_result(self, expected: Uuid) -> Result<Value, CallError> {
        if self.id != expected {
            return Err(CallError::protocol(format!(
                "response id {} does not match request {}",
                self.id, expected
            )));
        }
        match self.outcome {
            RpcOutcome::Ok(value) => Ok(value),
            RpcOutcome::Err(err) => Err(CallError::Service(err)),
        }
    }
}

/// Serializes a frame as one JSON line, newline included.
pub fn encode_line<T: Serialize>(frame: &T) -> Result<Vec<u8>, CallError> {
    let mut bytes = serde_json::to_vec(frame).map_err(CallError::protocol)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parses one JSON line.
pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, CallError> {
    serde_json::from_str(line.trim_end()).map_err(CallError::protocol)
}

/// Extracts the address from a readiness line, if it is one.
pub fn parse_ready_line(line: &str) -> Option<std::net::SocketAddr> {
    line.trim().strip_prefix(READY_PREFIX)?.trim().parse().ok()
}
