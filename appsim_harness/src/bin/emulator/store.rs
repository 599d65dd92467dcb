//! In-memory service state of one emulator instance.

use appsim_env::ServiceError;
use appsim_harness::services::datastore::{Entity, Key};
use appsim_harness::services::memcache::{Item, Statistics};
use appsim_harness::services::taskqueue::{QueueStatistics, Task, DEFAULT_QUEUE};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Namespaced cache.
#[derive(Debug, Default)]
pub struct Cache {
    items: HashMap<(String, String), Item>,
    hits: u64,
    misses: u64,
}

impl Cache {
    pub fn get(&mut self, ns: &str, key: &str) -> Result<Item, ServiceError> {
        match self.items.get(&(ns.to_string(), key.to_string())) {
            Some(item) => {
                self.hits += 1;
                Ok(item.clone())
            }
            None => {
                self.misses += 1;
                Err(ServiceError::CacheMiss)
            }
        }
    }

    pub fn set(&mut self, ns: &str, item: Item) {
        self.items.insert((ns.to_string(), item.key.clone()), item);
    }

    pub fn add(&mut self, ns: &str, item: Item) -> Result<(), ServiceError> {
        let slot = (ns.to_string(), item.key.clone());
        if self.items.contains_key(&slot) {
            return Err(ServiceError::NotStored);
        }
        self.items.insert(slot, item);
        Ok(())
    }

    pub fn delete(&mut self, ns: &str, key: &str) -> Result<(), ServiceError> {
        self.items
            .remove(&(ns.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or(ServiceError::CacheMiss)
    }

    pub fn increment(
        &mut self,
        ns: &str,
        key: &str,
        delta: i64,
        initial: Option<u64>,
    ) -> Result<u64, ServiceError> {
        let slot = (ns.to_string(), key.to_string());
        let current = match self.items.get(&slot) {
            Some(item) => std::str::from_utf8(&item.value)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    ServiceError::bad_request(format!("value of {:?} is not a counter", key))
                })?,
            None => initial.ok_or(ServiceError::CacheMiss)?,
        };

        let next = if delta >= 0 {
            current.saturating_add(delta.unsigned_abs())
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };
        let flags = self.items.get(&slot).map_or(0, |item| item.flags);
        self.items
            .insert(slot, Item::new(key, next.to_string()).with_flags(flags));
        Ok(next)
    }

    pub fn flush(&mut self) {
        self.items.clear();
    }

    pub fn stats(&self) -> Statistics {
        Statistics {
            hits: self.hits,
            misses: self.misses,
            items: self.items.len() as u64,
            bytes: self.items.values().map(|i| i.value.len() as u64).sum(),
        }
    }
}

#[derive(Debug, Default)]
struct Queue {
    tasks: Vec<Task>,
    added: u64,
}

/// Provisioned task queues.
#[derive(Debug)]
pub struct Queues {
    queues: BTreeMap<String, Queue>,
    next_name: u64,
}

impl Queues {
    /// Creates the `default` queue plus every named one.
    pub fn provision<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queues = BTreeMap::new();
        queues.insert(DEFAULT_QUEUE.to_string(), Queue::default());
        for name in names {
            queues.entry(name.into()).or_default();
        }
        Self { queues, next_name: 1 }
    }

    /// Adds all tasks or none; returns their names.
    pub fn add(&mut self, queue: &str, tasks: Vec<Task>) -> Result<Vec<String>, ServiceError> {
        let mut next_name = self.next_name;
        let q = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| ServiceError::UnknownQueue(queue.to_string()))?;

        let mut named: Vec<Task> = Vec::with_capacity(tasks.len());
        let taken = |named: &[Task], name: &str| {
            q.tasks.iter().chain(named.iter()).any(|t| t.name == name)
        };
        for mut task in tasks {
            if task.name.is_empty() {
                // Generated names step over anything already taken.
                loop {
                    let candidate = format!("task{}", next_name);
                    next_name += 1;
                    if !taken(&named, &candidate) {
                        task.name = candidate;
                        break;
                    }
                }
            } else if taken(&named, &task.name) {
                return Err(ServiceError::TaskAlreadyExists(task.name));
            }
            named.push(task);
        }

        self.next_name = next_name;
        q.added += named.len() as u64;
        let names = named.iter().map(|t| t.name.clone()).collect();
        q.tasks.extend(named);
        Ok(names)
    }

    pub fn delete(&mut self, queue: &str, name: &str) -> Result<(), ServiceError> {
        let q = self.queue_mut(queue)?;
        let before = q.tasks.len();
        q.tasks.retain(|t| t.name != name);
        if q.tasks.len() == before {
            let message = format!("no task {:?} in {:?}", name, queue);
            return Err(ServiceError::application("unknown_task", message));
        }
        Ok(())
    }

    pub fn purge(&mut self, queue: &str) -> Result<(), ServiceError> {
        self.queue_mut(queue)?.tasks.clear();
        Ok(())
    }

    pub fn stats(&self, queues: &[String]) -> Result<Vec<QueueStatistics>, ServiceError> {
        queues
            .iter()
            .map(|name| {
                let q = self
                    .queues
                    .get(name)
                    .ok_or_else(|| ServiceError::UnknownQueue(name.clone()))?;
                Ok(QueueStatistics {
                    queue: name.clone(),
                    tasks: q.tasks.len(),
                    added: q.added,
                })
            })
            .collect()
    }

    fn queue_mut(&mut self, queue: &str) -> Result<&mut Queue, ServiceError> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| ServiceError::UnknownQueue(queue.to_string()))
    }
}

/// Namespaced entity store.
#[derive(Debug)]
pub struct EntityStore {
    entities: BTreeMap<(String, Key), Value>,
    next_id: i64,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl EntityStore {
    pub fn put(&mut self, ns: &str, mut key: Key, properties: Value) -> Key {
        if key.is_incomplete() {
            key.id = self.next_id;
            self.next_id += 1;
        } else if key.name.is_none() {
            // Allocation never hands out an id a caller already used.
            self.next_id = self.next_id.max(key.id.saturating_add(1));
        }
        self.entities.insert((ns.to_string(), key.clone()), properties);
        key
    }

    pub fn get(&self, ns: &str, key: &Key) -> Result<Entity, ServiceError> {
        self.entities
            .get(&(ns.to_string(), key.clone()))
            .map(|properties| Entity {
                key: key.clone(),
                properties: properties.clone(),
            })
            .ok_or(ServiceError::NoSuchEntity)
    }

    pub fn delete(&mut self, ns: &str, key: &Key) {
        self.entities.remove(&(ns.to_string(), key.clone()));
    }

    pub fn query_kind(&self, ns: &str, kind: &str) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|((entity_ns, key), _)| entity_ns == ns && key.kind == kind)
            .map(|((_, key), properties)| Entity {
                key: key.clone(),
                properties: properties.clone(),
            })
            .collect()
    }
}

/// Everything one instance holds.
#[derive(Debug)]
pub struct Store {
    pub cache: Cache,
    pub queues: Queues,
    pub entities: EntityStore,
}

impl Store {
    pub fn new(queues: &[String]) -> Self {
        Self {
            cache: Cache::default(),
            queues: Queues::provision(queues.iter().cloned()),
            entities: EntityStore::default(),
        }
    }
}
