//! Task queues provisioned at context construction.
//!
//! Queues are application-wide: they are not scoped by namespace. The
//! `default` queue always exists; any other queue must be listed in
//! [`Options::task_queues`](crate::Options::task_queues).

use super::invoke;
use appsim_env::{AppContext, CallError, Service};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Queue that exists without being provisioned.
pub const DEFAULT_QUEUE: &str = "default";

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the queue when empty
    #[serde(default)]
    pub name: String,

    /// Handler path the task would be delivered to
    pub path: String,

    pub method: String,

    #[serde(default)]
    pub payload: Vec<u8>,

    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl Task {
    /// A POST task carrying `payload` as its body.
    pub fn post(path: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: String::new(),
            path: path.into(),
            method: "POST".to_string(),
            payload: payload.into(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
        }
    }

    /// A GET task with no body.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            path: path.into(),
            method: "GET".to_string(),
            payload: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Names the task; a queue refuses a second task with the same name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Snapshot of one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub queue: String,

    /// Tasks currently enqueued
    pub tasks: usize,

    /// Tasks ever added
    pub added: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Added {
    pub names: Vec<String>,
}

/// Enqueues one task and returns it with its assigned name.
///
/// An empty queue name means [`DEFAULT_QUEUE`].
pub async fn add<C: AppContext + ?Sized>(
    ctx: &C,
    task: &Task,
    queue: &str,
) -> Result<Task, CallError> {
    let mut added = add_multi(ctx, std::slice::from_ref(task), queue).await?;
    added
        .pop()
        .ok_or_else(|| CallError::protocol("queue accepted no task"))
}

/// Enqueues several tasks atomically: either all are added or none.
pub async fn add_multi<C: AppContext + ?Sized>(
    ctx: &C,
    tasks: &[Task],
    queue: &str,
) -> Result<Vec<Task>, CallError> {
    let added: Added = invoke(
        ctx,
        Service::TaskQueue,
        "add",
        &json!({ "queue": queue_name(queue), "tasks": tasks }),
    )
    .await?;

    if added.names.len() != tasks.len() {
        return Err(CallError::protocol(format!(
            "queue named {} tasks, {} were sent",
            added.names.len(),
            tasks.len()
        )));
    }
    Ok(tasks
        .iter()
        .zip(added.names)
        .map(|(task, name)| Task {
            name,
            ..task.clone()
        })
        .collect())
}

/// Removes a named task.
pub async fn delete<C: AppContext + ?Sized>(
    ctx: &C,
    name: &str,
    queue: &str,
) -> Result<(), CallError> {
    invoke(
        ctx,
        Service::TaskQueue,
        "delete",
        &json!({ "queue": queue_name(queue), "name": name }),
    )
    .await
}

/// Removes every task from a queue.
pub async fn purge<C: AppContext + ?Sized>(ctx: &C, queue: &str) -> Result<(), CallError> {
    invoke(ctx, Service::TaskQueue, "purge", &json!({ "queue": queue_name(queue) })).await
}

/// Returns statistics for each queue, in the order asked.
pub async fn queue_stats<C: AppContext + ?Sized>(
    ctx: &C,
    queues: &[&str],
) -> Result<Vec<QueueStatistics>, CallError> {
    let queues: Vec<&str> = queues.iter().map(|q| queue_name(q)).collect();
    invoke(ctx, Service::TaskQueue, "stats", &json!({ "queues": queues })).await
}

fn queue_name(queue: &str) -> &str {
    if queue.is_empty() {
        DEFAULT_QUEUE
    } else {
        queue
    }
}
