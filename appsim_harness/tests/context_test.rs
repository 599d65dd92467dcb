//! Context lifecycle, logging, namespaces, identity and services end to end.

mod common;

use appsim_harness::services::datastore::{self, Key};
use appsim_harness::services::memcache::{self, Item};
use appsim_harness::services::{modules, taskqueue, user};
use appsim_harness::{
    AppContext, CallError, Context, HarnessError, ServiceError, Severity, SimulatedUser,
};
use common::{options, RecordingReporter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entity {
    foo: String,
    bar: String,
}

#[tokio::test]
async fn test_logging() {
    let ctx = Context::new(options().with_log_threshold(Severity::Child))
        .await
        .expect("context");

    // The emulator logs before it reports readiness.
    assert!(ctx.did_log_anything(), "child output should have been forwarded");

    let sink = ctx.log_sink();
    sink.reset();
    ctx.error("error");
    assert!(ctx.did_log_anything(), "error should have logged");

    // Lower the threshold first so late emulator output is not counted.
    sink.set_threshold(Severity::Info);
    sink.reset();
    ctx.debug("debug");
    assert!(!ctx.did_log_anything(), "debug should not have logged");

    ctx.error("error");
    ctx.warning("warning");
    ctx.critical("critical");
    ctx.info("info");
    ctx.debug("debug");
    assert!(ctx.did_log_anything());

    ctx.close().await;
}

#[tokio::test]
async fn test_threshold_matrix() {
    let ctx = Context::new(options().with_log_threshold(Severity::Off))
        .await
        .expect("context");

    for threshold in Severity::all() {
        ctx.log_sink().set_threshold(threshold);
        for level in Severity::call_levels() {
            ctx.log_sink().reset();
            ctx.log(level, "message");
            let expected = threshold != Severity::Off && level <= threshold;
            assert_eq!(
                ctx.did_log_anything(),
                expected,
                "threshold {} level {}",
                threshold,
                level
            );
        }
    }

    ctx.close().await;
}

#[tokio::test]
async fn test_reporter_sees_emitted_lines_only() {
    let reporter = Arc::new(RecordingReporter::default());
    let ctx = Context::new(
        options()
            .with_log_threshold(Severity::Warning)
            .with_reporter(reporter.clone()),
    )
    .await
    .expect("context");

    ctx.info("quiet");
    ctx.critical("loud");
    ctx.close().await;

    let lines = reporter.lines.lock().unwrap();
    assert_eq!(lines.as_slice(), ["CRITICAL: loud".to_string()]);
}

#[tokio::test]
async fn test_tasks() {
    let ctx = Context::new(
        options()
            .with_log_threshold(Severity::Child)
            .with_task_queue("testQueue"),
    )
    .await
    .expect("context");

    let task = taskqueue::Task::post("/post", Vec::new());
    let added = taskqueue::add(&ctx, &task, "testQueue").await.expect("add");
    assert!(!added.name.is_empty());

    let stats = taskqueue::queue_stats(&ctx, &["testQueue"]).await.expect("stats");
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].tasks, 1, "could not find the task we just added");

    taskqueue::purge(&ctx, "testQueue").await.expect("purge");
    let stats = taskqueue::queue_stats(&ctx, &["testQueue"]).await.expect("stats");
    assert_eq!(stats[0].tasks, 0, "purge was not successful");

    let tasks = vec![
        taskqueue::Task::post("/post1", Vec::new()),
        taskqueue::Task::post("/post2", Vec::new()),
    ];
    let added = taskqueue::add_multi(&ctx, &tasks, "testQueue").await.expect("add_multi");
    assert_eq!(added.len(), 2);
    assert_ne!(added[0].name, added[1].name);

    let stats = taskqueue::queue_stats(&ctx, &["testQueue"]).await.expect("stats");
    assert_eq!(stats[0].tasks, 2);

    ctx.close().await;
}

#[tokio::test]
async fn test_task_errors() {
    let ctx = Context::new(options().with_task_queue("mail")).await.expect("context");

    let err = taskqueue::add(&ctx, &taskqueue::Task::get("/x"), "nowhere")
        .await
        .unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::UnknownQueue("nowhere".into())));

    let named = taskqueue::Task::post("/send", b"to=a".to_vec())
        .with_name("welcome")
        .with_header("X-Priority", "high");
    taskqueue::add(&ctx, &named, "mail").await.expect("first add");
    let err = taskqueue::add(&ctx, &named, "mail").await.unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::TaskAlreadyExists("welcome".into())));

    taskqueue::delete(&ctx, "welcome", "mail").await.expect("delete");
    let stats = taskqueue::queue_stats(&ctx, &["mail", ""]).await.expect("stats");
    assert_eq!(stats[0].tasks, 0);
    assert_eq!(stats[1].queue, "default");

    ctx.close().await;
}

#[tokio::test]
async fn test_namespace() {
    let ctx = Context::new(options().with_log_threshold(Severity::Debug))
        .await
        .expect("context");

    ctx.current_namespace("private").unwrap();
    memcache::set(&ctx, &Item::new("foo", "value")).await.expect("set");
    let item = memcache::get(&ctx, "foo").await.expect("get");
    assert_eq!(item.value, b"value");

    // now use the default namespace
    ctx.current_namespace("").unwrap();
    let err = memcache::get(&ctx, "foo").await.unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::CacheMiss), "memcache had an entry");

    memcache::set(&ctx, &item).await.expect("set");
    assert_eq!(memcache::get(&ctx, "foo").await.expect("get").value, b"value");

    ctx.current_namespace("private").unwrap();
    assert_eq!(memcache::get(&ctx, "foo").await.expect("get").value, b"value");

    ctx.close().await;
}

#[tokio::test]
async fn test_invalid_namespace_is_sentinel() {
    let ctx = Context::new(options()).await.expect("context");

    ctx.current_namespace("not valid!").unwrap();
    let err = memcache::get(&ctx, "foo").await.unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::InvalidNamespace("not valid!".into())));

    ctx.close().await;
}

#[tokio::test]
async fn test_context() {
    let ctx = Context::new(options().with_log_threshold(Severity::Child))
        .await
        .expect("context");

    let err = memcache::get(&ctx, "foo").await.unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::CacheMiss));

    memcache::set(&ctx, &Item::new("foo", "value")).await.expect("set");
    assert_eq!(memcache::get(&ctx, "foo").await.expect("get").value, b"value");

    let entity = Entity {
        foo: "foo".into(),
        bar: "bar".into(),
    };
    let key = datastore::put(&ctx, &Key::with_id("Entity", 1), &entity)
        .await
        .expect("datastore put");
    assert_eq!(key, Key::with_id("Entity", 1));
    let loaded: Entity = datastore::get(&ctx, &key).await.expect("datastore get");
    assert_eq!(loaded, entity);

    assert!(user::current(&ctx).is_none(), "user should not be logged in");
    ctx.login(SimulatedUser::new("user@host.com")).unwrap();
    let first = user::current(&ctx).expect("user should be logged in");
    assert_eq!(first.email, "user@host.com");
    assert!(!user::is_admin(&ctx));

    ctx.logout().unwrap();
    assert!(user::current(&ctx).is_none(), "user should not be logged in");

    ctx.login(SimulatedUser::new("differentuser@host.com")).unwrap();
    let second = user::current(&ctx).expect("user should be logged in");
    assert_ne!(first.id, second.id, "user ids should be unique");

    ctx.close().await;
}

#[tokio::test]
async fn test_login_admin() {
    let ctx = Context::new(options()).await.expect("context");

    let admin = ctx.login_admin(SimulatedUser::new("root@host.com")).unwrap();
    assert!(admin.admin);
    assert!(user::is_admin(&ctx));
    assert_eq!(ctx.current_user(), Some(admin));

    ctx.close().await;
}

#[tokio::test]
async fn test_memcache_operations() {
    let ctx = Context::new(options()).await.expect("context");

    memcache::add(&ctx, &Item::new("a", "1")).await.expect("add");
    let err = memcache::add(&ctx, &Item::new("a", "2")).await.unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::NotStored));

    memcache::set(&ctx, &Item::new("b", "2").with_flags(7)).await.expect("set");
    let found = memcache::get_multi(&ctx, &["a", "b", "missing"]).await.expect("get_multi");
    assert_eq!(found.len(), 2);
    assert_eq!(found["b"].flags, 7);

    assert_eq!(memcache::increment(&ctx, "a", 41, None).await.expect("incr"), 42);
    assert_eq!(memcache::increment(&ctx, "hits", 1, Some(0)).await.expect("incr"), 1);

    memcache::delete(&ctx, "a").await.expect("delete");
    let err = memcache::delete(&ctx, "a").await.unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::CacheMiss));

    let stats = memcache::stats(&ctx).await.expect("stats");
    assert_eq!(stats.items, 2);

    memcache::flush(&ctx).await.expect("flush");
    assert_eq!(memcache::stats(&ctx).await.expect("stats").items, 0);

    ctx.close().await;
}

#[tokio::test]
async fn test_datastore_namespaces_and_queries() {
    let ctx = Context::new(options()).await.expect("context");

    let entity = Entity {
        foo: "foo".into(),
        bar: "bar".into(),
    };
    let a = datastore::put(&ctx, &Key::incomplete("Entity"), &entity).await.expect("put");
    let b = datastore::put(&ctx, &Key::incomplete("Entity"), &entity).await.expect("put");
    assert!(!a.is_incomplete());
    assert_ne!(a, b);
    datastore::put(&ctx, &Key::named("Other", "x"), &entity).await.expect("put");

    let found = datastore::query_kind(&ctx, "Entity").await.expect("query");
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].decode::<Entity>().unwrap(), entity);

    ctx.current_namespace("tenant").unwrap();
    let err = datastore::get::<_, Entity>(&ctx, &a).await.unwrap_err();
    assert_eq!(err, CallError::Service(ServiceError::NoSuchEntity));
    assert!(datastore::query_kind(&ctx, "Entity").await.expect("query").is_empty());

    ctx.current_namespace("").unwrap();
    datastore::delete(&ctx, &a).await.expect("delete");
    datastore::delete(&ctx, &a).await.expect("deleting twice is fine");
    assert_eq!(datastore::query_kind(&ctx, "Entity").await.expect("query").len(), 1);

    ctx.close().await;
}

#[tokio::test]
async fn test_use_after_close_is_an_error() {
    let ctx = Context::new(options()).await.expect("context");
    let addr = modules::default_hostname(&ctx).expect("hostname");
    ctx.close().await;
    ctx.close().await;

    assert!(ctx.is_closed());
    assert!(ctx.is_done());
    assert_eq!(memcache::get(&ctx, "foo").await.unwrap_err(), CallError::Closed);
    assert!(matches!(ctx.current_namespace("x"), Err(HarnessError::Closed)));
    assert!(matches!(ctx.login(SimulatedUser::new("a@b.c")), Err(HarnessError::Closed)));
    assert!(matches!(ctx.logout(), Err(HarnessError::Closed)));
    assert!(matches!(ctx.hostname("default"), Err(HarnessError::Closed)));
    assert!(matches!(ctx.module_names(), Err(HarnessError::Closed)));
    assert!(matches!(ctx.module("default"), Err(HarnessError::Closed)));

    // The emulator process is gone.
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
