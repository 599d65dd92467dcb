//! RPC gateway - the single dispatch point for every service call.

use crate::supervisor::ProcessSupervisor;
use appsim_env::protocol::{decode_line, encode_line};
use appsim_env::{CallError, RpcRequest, RpcResponse, Service, SimulatedUser};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Where a call goes and under which scope.
#[derive(Debug, Clone)]
pub struct Route {
    /// Target module name
    pub module: String,

    /// Namespace at call time
    pub namespace: String,

    /// Identity at call time
    pub user: Option<SimulatedUser>,
}

/// Resolves a route to an instance and exchanges one request/response.
#[derive(Debug)]
pub struct RpcGateway {
    supervisor: ProcessSupervisor,
}

impl RpcGateway {
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self { supervisor }
    }

    /// The instances behind this gateway.
    pub fn registry(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Terminates every instance. See [`ProcessSupervisor::stop`].
    pub async fn shutdown(&self) -> usize {
        self.supervisor.stop().await
    }

    /// Dispatches a call.
    ///
    /// Service errors come back exactly as the emulator reported them.
    pub async fn call(
        &self,
        route: Route,
        service: Service,
        method: &str,
        payload: Value,
    ) -> Result<Value, CallError> {
        let addr = self
            .supervisor
            .hostname(&route.module)
            .map_err(|_| CallError::UnknownModule(route.module.clone()))?;

        let mut request = RpcRequest::new(service, method, payload);
        request.namespace = route.namespace;
        request.module = route.module;
        request.user = route.user;

        let response = exchange(addr, &request).await?;
        debug!(
            service = %service,
            method = %method,
            module = %request.module,
            namespace = %request.namespace,
            request_id = %request.id,
            "call completed"
        );
        response.into_result(request.id)
    }
}

async fn exchange(addr: SocketAddr, request: &RpcRequest) -> Result<RpcResponse, CallError> {
    let stream = TcpStream::connect(addr).await.map_err(CallError::transport)?;
    let (read_half, mut write_half) = stream.into_split();

    write_half
        .write_all(&encode_line(request)?)
        .await
        .map_err(CallError::transport)?;
    write_half.flush().await.map_err(CallError::transport)?;

    let mut line = String::new();
    let n = BufReader::new(read_half)
        .read_line(&mut line)
        .await
        .map_err(CallError::transport)?;
    if n == 0 {
        return Err(CallError::protocol("connection closed before a response"));
    }
    decode_line(&line)
}
