//! appsim emulator
//!
//! Stands in for one platform module: serves cache, task queue, datastore
//! and module calls from memory. Prints `READY <ip:port>` on stdout once it
//! accepts connections; exits non-zero before that on any setup failure.

mod module_config;
mod server;
mod store;

use anyhow::{Context, Result};
use appsim_env::protocol::READY_PREFIX;
use clap::Parser;
use module_config::ModuleDefinition;
use server::Emulator;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use store::Store;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// appsim platform emulator
#[derive(Parser, Debug)]
#[command(name = "appsim-emulator")]
#[command(about = "Serve one simulated platform module from memory", long_about = None)]
struct Args {
    /// Simulated application id
    #[arg(long, default_value = "testapp")]
    app_id: String,

    /// Module this instance serves
    #[arg(long, default_value = "default")]
    module: String,

    /// Module definition file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Task queue to provision (repeatable)
    #[arg(long = "queue")]
    queues: Vec<String>,

    /// Host to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 = any free port)
    #[arg(long, default_value = "0")]
    port: u16,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs share stdout with the readiness line; the harness reads both.
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(std::io::stdout)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("appsim-emulator: failed to install log subscriber");
    }

    if let Err(err) = run(args).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!(
        app_id = %args.app_id,
        module = %args.module,
        queues = args.queues.len(),
        "appsim-emulator starting"
    );

    if let Some(path) = &args.config {
        let definition = ModuleDefinition::load(path)?;
        definition.check(&args.app_id, &args.module)?;
        info!(
            path = %path.display(),
            entries = definition.entries.len(),
            "module definition loaded"
        );
    }

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    let addr = listener.local_addr()?;

    let emulator = Arc::new(Emulator::new(
        args.app_id,
        args.module,
        addr,
        Store::new(&args.queues),
    ));

    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}{}", READY_PREFIX, addr)?;
        stdout.flush()?;
    }
    info!(addr = %addr, "serving");

    server::serve(listener, emulator).await
}
