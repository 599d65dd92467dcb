//! Connection handling and call dispatch.

use crate::store::Store;
use anyhow::Result;
use appsim_env::protocol::{decode_line, encode_line};
use appsim_env::{RpcRequest, RpcResponse, Service, ServiceError};
use appsim_harness::services::datastore::{Entities, Key, Stored};
use appsim_harness::services::memcache::{Counter, Item, Items};
use appsim_harness::services::modules::ModuleInfo;
use appsim_harness::services::taskqueue::{Added, Task};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_NAMESPACE_LEN: usize = 100;

#[derive(Deserialize)]
struct KeyArgs {
    key: String,
}

#[derive(Deserialize)]
struct KeysArgs {
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct ItemArgs {
    item: Item,
}

#[derive(Deserialize)]
struct IncrementArgs {
    key: String,
    delta: i64,
    initial: Option<u64>,
}

#[derive(Deserialize)]
struct AddTasksArgs {
    queue: String,
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct QueueArgs {
    queue: String,
}

#[derive(Deserialize)]
struct DeleteTaskArgs {
    queue: String,
    name: String,
}

#[derive(Deserialize)]
struct StatsArgs {
    queues: Vec<String>,
}

#[derive(Deserialize)]
struct PutArgs {
    key: Key,
    properties: Value,
}

#[derive(Deserialize)]
struct EntityKeyArgs {
    key: Key,
}

#[derive(Deserialize)]
struct KindArgs {
    kind: String,
}

/// One running emulator instance.
pub struct Emulator {
    app_id: String,
    module: String,
    addr: SocketAddr,
    store: Mutex<Store>,
}

impl Emulator {
    pub fn new(app_id: String, module: String, addr: SocketAddr, store: Store) -> Self {
        Self {
            app_id,
            module,
            addr,
            store: Mutex::new(store),
        }
    }

    /// Handles one request.
    pub fn handle(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        debug!(
            service = %request.service,
            method = %request.method,
            namespace = %request.namespace,
            request_id = %id,
            "call"
        );
        match self.dispatch(request) {
            Ok(value) => RpcResponse::ok(id, value),
            Err(err) => {
                debug!(request_id = %id, error = %err, "call failed");
                RpcResponse::err(id, err)
            }
        }
    }

    fn dispatch(&self, request: RpcRequest) -> Result<Value, ServiceError> {
        if request.module != self.module {
            return Err(ServiceError::application(
                "misrouted",
                format!("call for module {:?} reached {:?}", request.module, self.module),
            ));
        }
        validate_namespace(&request.namespace)?;

        let ns = request.namespace.as_str();
        let payload = request.payload;
        let mut store = self.lock();

        match (request.service, request.method.as_str()) {
            (Service::Memcache, "get") => {
                let args: KeyArgs = parse(payload)?;
                to_json(store.cache.get(ns, &args.key)?)
            }
            (Service::Memcache, "get_multi") => {
                let args: KeysArgs = parse(payload)?;
                let items = args
                    .keys
                    .iter()
                    .filter_map(|key| store.cache.get(ns, key).ok())
                    .collect();
                to_json(Items { items })
            }
            (Service::Memcache, "set") => {
                let args: ItemArgs = parse(payload)?;
                store.cache.set(ns, args.item);
                Ok(Value::Null)
            }
            (Service::Memcache, "add") => {
                let args: ItemArgs = parse(payload)?;
                store.cache.add(ns, args.item)?;
                Ok(Value::Null)
            }
            (Service::Memcache, "delete") => {
                let args: KeyArgs = parse(payload)?;
                store.cache.delete(ns, &args.key)?;
                Ok(Value::Null)
            }
            (Service::Memcache, "increment") => {
                let args: IncrementArgs = parse(payload)?;
                let value = store.cache.increment(ns, &args.key, args.delta, args.initial)?;
                to_json(Counter { value })
            }
            (Service::Memcache, "flush") => {
                store.cache.flush();
                Ok(Value::Null)
            }
            (Service::Memcache, "stats") => to_json(store.cache.stats()),

            (Service::TaskQueue, "add") => {
                let args: AddTasksArgs = parse(payload)?;
                let names = store.queues.add(&args.queue, args.tasks)?;
                to_json(Added { names })
            }
            (Service::TaskQueue, "delete") => {
                let args: DeleteTaskArgs = parse(payload)?;
                store.queues.delete(&args.queue, &args.name)?;
                Ok(Value::Null)
            }
            (Service::TaskQueue, "purge") => {
                let args: QueueArgs = parse(payload)?;
                store.queues.purge(&args.queue)?;
                Ok(Value::Null)
            }
            (Service::TaskQueue, "stats") => {
                let args: StatsArgs = parse(payload)?;
                to_json(store.queues.stats(&args.queues)?)
            }

            (Service::Datastore, "put") => {
                let args: PutArgs = parse(payload)?;
                let key = store.entities.put(ns, args.key, args.properties);
                to_json(Stored { key })
            }
            (Service::Datastore, "get") => {
                let args: EntityKeyArgs = parse(payload)?;
                to_json(store.entities.get(ns, &args.key)?)
            }
            (Service::Datastore, "delete") => {
                let args: EntityKeyArgs = parse(payload)?;
                store.entities.delete(ns, &args.key);
                Ok(Value::Null)
            }
            (Service::Datastore, "query") => {
                let args: KindArgs = parse(payload)?;
                to_json(Entities {
                    entities: store.entities.query_kind(ns, &args.kind),
                })
            }

            (Service::Module, "ping") => to_json(ModuleInfo {
                app_id: self.app_id.clone(),
                module: self.module.clone(),
                addr: self.addr,
            }),

            (service, method) => Err(ServiceError::bad_request(format!(
                "unknown method {}.{}",
                service, method
            ))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accepts connections until the process is killed.
pub async fn serve(listener: TcpListener, emulator: Arc<Emulator>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let emulator = Arc::clone(&emulator);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &emulator).await {
                warn!(peer = %peer, error = %err, "connection failed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, emulator: &Emulator) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    if is_http_request_line(&line) {
        // Drain headers; the stub answers every request the same way.
        let mut header = String::new();
        while reader.read_line(&mut header).await? > 0 && !header.trim().is_empty() {
            header.clear();
        }
        let body = format!("{} ok\n", emulator.module);
        let response = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{}",
            body.len(),
            body
        );
        write_half.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    let response = match decode_line::<RpcRequest>(&line) {
        Ok(request) => emulator.handle(request),
        Err(err) => RpcResponse::err(Uuid::nil(), ServiceError::bad_request(err.to_string())),
    };
    write_half.write_all(&encode_line(&response)?).await?;
    write_half.flush().await?;
    Ok(())
}

fn is_http_request_line(line: &str) -> bool {
    ["GET ", "HEAD ", "POST "].iter().any(|m| line.starts_with(m)) && line.contains("HTTP/")
}

fn validate_namespace(ns: &str) -> Result<(), ServiceError> {
    let valid = ns.len() <= MAX_NAMESPACE_LEN
        && ns
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidNamespace(ns.to_string()))
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, ServiceError> {
    serde_json::from_value(payload).map_err(|err| ServiceError::bad_request(err.to_string()))
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ServiceError> {
    serde_json::to_value(value)
        .map_err(|err| ServiceError::application("internal", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn emulator() -> Emulator {
        Emulator::new(
            "testapp".into(),
            "default".into(),
            "127.0.0.1:9".parse().unwrap(),
            Store::new(&["testQueue".to_string()]),
        )
    }

    fn request(service: Service, method: &str, namespace: &str, payload: Value) -> RpcRequest {
        let mut req = RpcRequest::new(service, method, payload);
        req.namespace = namespace.to_string();
        req
    }

    fn outcome(resp: RpcResponse, id: Uuid) -> Result<Value, appsim_env::CallError> {
        resp.into_result(id)
    }

    #[test]
    fn test_namespace_validation() {
        assert!(validate_namespace("").is_ok());
        assert!(validate_namespace("tenant-1.a_b").is_ok());
        assert!(validate_namespace("has space").is_err());
        assert!(validate_namespace(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_http_detection() {
        assert!(is_http_request_line("GET /test HTTP/1.1\r\n"));
        assert!(!is_http_request_line("{\"id\":\"GET \"}"));
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let em = emulator();
        let get = request(Service::Memcache, "get", "", json!({"key": "foo"}));
        let id = get.id;
        assert_eq!(
            outcome(em.handle(get), id).unwrap_err(),
            appsim_env::CallError::Service(ServiceError::CacheMiss)
        );

        let set = request(Service::Memcache, "set", "", json!({"item": Item::new("foo", "value")}));
        let id = set.id;
        assert_eq!(outcome(em.handle(set), id).unwrap(), Value::Null);

        let get = request(Service::Memcache, "get", "", json!({"key": "foo"}));
        let id = get.id;
        let item: Item = serde_json::from_value(outcome(em.handle(get), id).unwrap()).unwrap();
        assert_eq!(item.value, b"value");
    }

    #[test]
    fn test_misrouted_call_rejected() {
        let em = emulator();
        let mut req = request(Service::Module, "ping", "", json!({}));
        req.module = "worker".into();
        let id = req.id;
        let err = outcome(em.handle(req), id).unwrap_err();
        assert!(matches!(
            err.service(),
            Some(ServiceError::Application { code, .. }) if code == "misrouted"
        ));
    }

    #[test]
    fn test_unknown_method() {
        let em = emulator();
        let req = request(Service::Memcache, "explode", "", json!({}));
        let id = req.id;
        assert!(matches!(
            outcome(em.handle(req), id).unwrap_err().service(),
            Some(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn test_invalid_namespace_sentinel() {
        let em = emulator();
        let req = request(Service::Memcache, "get", "bad ns", json!({"key": "k"}));
        let id = req.id;
        assert_eq!(
            outcome(em.handle(req), id).unwrap_err(),
            appsim_env::CallError::Service(ServiceError::InvalidNamespace("bad ns".into()))
        );
    }
}
