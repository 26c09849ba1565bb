//! hopsync CLI - one-shot directory-tree synchronizer over a tunneled HTTP transport.

use std::sync::Arc;

use clap::Parser;
use hopsync::config::{CliArgs, ClientOpts, Commands, ServerOpts};
use hopsync::core::{ActionGenerator, ExecutorPool};
use hopsync::error::{HopsyncError, Result};
use hopsync::progress::{Counters, Sampler};
use hopsync::remote::Launcher;
use hopsync::transport::{router, ConcurrentHttpTransport, ConcurrentTransferOpts, SimpleHttpTransport};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    if args.spawn_client {
        return run_puller(args).await;
    }

    if let Some(command) = args.command.clone() {
        return match command {
            Commands::Serve { path, port } => run_serve(ServerOpts { path }, port).await,
        };
    }

    run_pusher(args).await
}

/// Default entrypoint: serve the local source tree over HTTP and launch the
/// remote puller over SSH to pull it.
async fn run_pusher(args: CliArgs) -> Result<()> {
    let source = args
        .source
        .clone()
        .ok_or_else(|| HopsyncError::config("a source directory is required"))?;
    let destination = args
        .destination
        .clone()
        .ok_or_else(|| HopsyncError::config("a remote destination of the form host:path is required"))?;

    let copy_threads = args.resolved_copy_threads();
    let transfer_channels = args.resolved_transfer_channels();
    if copy_threads % transfer_channels != 0 {
        return Err(HopsyncError::config(
            "--copy-threads should be divisible by --transfer-channels",
        ));
    }

    let (host, remote_path) = CliArgs::split_remote_target(&destination).map_err(HopsyncError::config)?;
    let split_threshold_bytes = hopsync::config::parse_size(&args.split_threshold).map_err(HopsyncError::config)?;

    let mut listeners = Vec::with_capacity(transfer_channels);
    for i in 0..transfer_channels as u16 {
        let port = args.port + i;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| HopsyncError::io(format!("0.0.0.0:{port}"), e))?;
        listeners.push((listener, router(source.clone())));
    }

    let servers = tokio::spawn(async move {
        let mut set = tokio::task::JoinSet::new();
        for (listener, router) in listeners {
            set.spawn(async move {
                let _ = axum::serve(listener, router).await;
            });
        }
        while set.join_next().await.is_some() {}
    });

    let opts = ClientOpts {
        path: remote_path.into(),
        base_url: "http://127.0.0.1".to_string(),
        base_port: args.port,
        transfer_channels,
        copy_threads,
        split_threshold_bytes,
        split_concurrency: args.split_concurrency,
    };
    opts.validate().map_err(HopsyncError::config)?;

    let launcher = Launcher::new(host, &args.remote_command, args.port, transfer_channels);
    let result = launcher.run(&opts).await;

    servers.abort();
    result
}

/// `--spawn-client` mode: bootstrap `ClientOpts` from a single line of JSON on
/// stdin, then walk the remote tree and reproduce it locally.
async fn run_puller(args: CliArgs) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();
    let line = lines
        .next_line()
        .await
        .map_err(|e| HopsyncError::io("<stdin>", e))?
        .ok_or_else(|| HopsyncError::config("expected one line of ClientOpts JSON on stdin, got EOF"))?;

    let opts: ClientOpts = serde_json::from_str(&line)?;
    opts.validate().map_err(HopsyncError::config)?;

    // The generator never emits a Mkdir for ".". The destination root is
    // assumed to already exist.
    tokio::fs::create_dir_all(&opts.path)
        .await
        .map_err(|e| HopsyncError::io(&opts.path, e))?;

    let list_target = format!("{}:{}", opts.base_url, opts.base_port);
    let list_transport = SimpleHttpTransport::new(list_target);
    let mut generator = ActionGenerator::new(list_transport, opts.path.clone());
    let actions = generator.take_actions();

    let pool = ExecutorPool::new(opts.path.clone(), opts.copy_threads);
    let counters = Counters::new();
    let cancel = Arc::new(tokio::sync::Notify::new());

    let sampler = Sampler::new(counters.clone());
    let sampler_stop = sampler.stop_handle();
    let sampler_handle = if args.quiet {
        None
    } else {
        Some(tokio::spawn(sampler.run()))
    };

    let base_url = opts.base_url.clone();
    let base_port = opts.base_port;
    let transfer_channels = opts.transfer_channels;
    let concurrent_opts = ConcurrentTransferOpts {
        threshold: opts.split_threshold_bytes,
        concurrency: opts.split_concurrency,
    };

    // The executor pool runs in its own task so it can drain the action
    // queue while the generator walks. Once `generate` returns, `cancel` is
    // the one done signal that halts any executor still waiting on the
    // queue.
    let pool_counters = counters.clone();
    let pool_cancel = cancel.clone();
    let pool_handle = tokio::spawn(async move {
        pool.run(
            actions,
            move |w| {
                let port = base_port + (w % transfer_channels) as u16;
                ConcurrentHttpTransport::new(format!("{base_url}:{port}"), concurrent_opts)
            },
            pool_counters,
            pool_cancel,
        )
        .await
    });

    // The generator is moved into its own future and dropped as soon as it
    // returns so its queue sender goes away and the pool's receiver sees the
    // stream end even without the cancel notification below.
    let generate_result = generator.generate(".".to_string()).await;
    drop(generator);

    cancel.notify_waiters();
    let _ = pool_handle.await;

    sampler_stop.notify_one();
    if let Some(handle) = sampler_handle {
        let _ = handle.await;
    }
    println!("{}", Sampler::new(counters).final_summary());

    generate_result
}

/// `serve` subcommand: run just the pusher HTTP API in the foreground.
async fn run_serve(opts: ServerOpts, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| HopsyncError::io(format!("0.0.0.0:{port}"), e))?;

    println!("Serving {:?} on 0.0.0.0:{port}", opts.path);
    axum::serve(listener, router(opts.path))
        .await
        .map_err(|e| HopsyncError::Fatal(format!("server error: {e}")))
}
