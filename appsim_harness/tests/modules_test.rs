//! Module routing and fail-fast startup against the real emulator binary.

mod common;

use appsim_harness::services::modules;
use appsim_harness::{AppContext, Context, HarnessError, ModuleConfig, Options};
use common::{fixture, options, RecordingReporter, FAIL_FAST};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start(opts: Options) -> Result<Context, HarnessError> {
    tokio::time::timeout(FAIL_FAST, Context::new(opts))
        .await
        .expect("context construction should never hang")
}

#[tokio::test]
async fn test_modules() {
    let ctx = start(
        options()
            .with_app_id("appsimtesting")
            .with_module(ModuleConfig::new("default", fixture("custom/custom.yaml")))
            .with_module(ModuleConfig::new("worker", fixture("custom/worker.yaml"))),
    )
    .await
    .expect("context");

    assert_eq!(ctx.module_names().unwrap(), vec!["default".to_string(), "worker".to_string()]);

    let addr = modules::default_hostname(&ctx).expect("hostname");
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET /test HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    assert!(response.starts_with("HTTP/1.0 200"), "got {:?}", response);
    assert!(response.ends_with("default ok\n"));

    let worker = ctx.module("worker").expect("worker view");
    assert_eq!(worker.module_name(), "worker");
    assert!(std::ptr::eq(worker.parent(), &ctx));
    let info = modules::ping(&worker).await.expect("ping worker");
    assert_eq!(info.module, "worker");
    assert_eq!(info.app_id, "appsimtesting");
    assert_eq!(info.addr, modules::hostname(&ctx, "worker").unwrap());

    let info = modules::ping(&ctx).await.expect("ping default");
    assert_eq!(info.module, "default");

    assert!(matches!(ctx.module("nope"), Err(HarnessError::UnknownModule(m)) if m == "nope"));
    assert!(matches!(modules::hostname(&ctx, "nope"), Err(HarnessError::UnknownModule(_))));

    ctx.close().await;
}

#[tokio::test]
async fn test_implicit_default_module() {
    let ctx = start(
        options()
            .with_app_id("appsimtesting")
            .with_module(ModuleConfig::new("worker", fixture("custom/worker.yaml"))),
    )
    .await
    .expect("context");

    assert_eq!(ctx.module_names().unwrap(), vec!["default".to_string(), "worker".to_string()]);
    assert_eq!(modules::ping(&ctx).await.expect("ping").module, "default");

    ctx.close().await;
}

#[tokio::test]
async fn test_modules_without_app_id_fail_fast() {
    let err = start(options().with_module(ModuleConfig::new("failearly", "failEarly.yaml")))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::MissingAppId(1)), "got {:?}", err);
}

#[tokio::test]
async fn test_duplicate_module_rejected() {
    let err = start(
        options()
            .with_app_id("appsimtesting")
            .with_module(ModuleConfig::new("worker", fixture("custom/worker.yaml")))
            .with_module(ModuleConfig::new("worker", fixture("custom/worker.yaml"))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HarnessError::DuplicateModule(ref m) if m == "worker"), "got {:?}", err);
}

#[tokio::test]
async fn test_missing_module_definition_fails_fast() {
    let err = start(
        options()
            .with_app_id("appsimtesting")
            .with_module(ModuleConfig::new("default", fixture("custom/failEarly.yaml"))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HarnessError::ModuleStartup { .. }), "got {:?}", err);
    assert!(err.to_string().contains("failEarly.yaml"), "got {}", err);
}

#[tokio::test]
async fn test_foreign_application_fails_fast() {
    let err = start(
        options()
            .with_app_id("appsimtesting")
            .with_module(ModuleConfig::new("default", fixture("custom/other_app.yaml"))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HarnessError::ModuleStartup { .. }), "got {:?}", err);
    assert!(err.to_string().contains("someoneelse"), "got {}", err);
}

#[tokio::test]
async fn test_startup_timeout() {
    let err = start(options().with_startup_timeout(Duration::ZERO))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "got {:?}", err);
}

#[tokio::test]
async fn test_missing_emulator_binary() {
    let err = start(options().with_emulator_path("/nonexistent/appsim-emulator"))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::SpawnFailed { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_setup_failure_reaches_reporter() {
    let reporter = Arc::new(RecordingReporter::default());
    let err = start(
        options()
            .with_app_id("appsimtesting")
            .with_reporter(reporter.clone())
            .with_module(ModuleConfig::new("default", fixture("custom/other_app.yaml"))),
    )
    .await
    .unwrap_err();

    let fatals = reporter.fatals.lock().unwrap();
    assert_eq!(fatals.len(), 1);
    assert!(fatals[0].contains(&err.to_string()));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_failed_start_leaves_no_emulator_behind() {
    let app_id = format!("teardown{}", std::process::id());

    let ctx = start(options().with_app_id(&app_id)).await.expect("context");
    assert_eq!(common::emulators_running(&app_id), 1);
    ctx.close().await;
    assert_eq!(common::emulators_running(&app_id), 0);

    // default becomes ready before worker fails.
    let err = start(
        options()
            .with_app_id(&app_id)
            .with_module(ModuleConfig::new("worker", fixture("custom/missing.yaml"))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HarnessError::ModuleStartup { ref module, .. } if module == "worker"));
    assert_eq!(common::emulators_running(&app_id), 0);
}
