//! Sensor collector - records stereo infrared + IMU on remote command.
//!
//! Starts the device, announces `SensorCollector:<ip>` to the operator, then
//! waits for `Start Collection` / `End Collection` datagrams. On stop the
//! `data/` directory is archived as `data_YYYYMMDD_HHMMSS`.
//!
//! Usage:
//!   sensor-collector [options]
//!
//! Options:
//!   --control-port <port>   UDP command port (default: 11111)
//!   --operator <host:port>  Discovery destination (default: 192.168.0.108:6666)
//!   --data-dir <dir>        Recording directory (default: ./data)
//!   --poll-ms <ms>          Command poll interval (default: 100)
//!   --settle-secs <secs>    Delay before announcing (default: 3)
//!   --synthetic             Simulated sensors instead of a RealSense device

use anyhow::{Context, Result};
use sensor_collector::{
    discovery, spawn_capture, CollectorConfig, ControlChannel, ControlOutcome, DataLayout,
    FrameSource, SessionContext, SessionWriters, SyntheticSource,
};
use std::net::{SocketAddr, ToSocketAddrs};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Args {
    config: CollectorConfig,
    synthetic: bool,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = CollectorConfig::default();
    let mut synthetic = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--control-port" if i + 1 < args.len() => {
                let port = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --control-port {}", args[i + 1]))?;
                config = config.control_port(port);
                i += 2;
            }
            "--operator" if i + 1 < args.len() => {
                config = config.operator(resolve_operator(&args[i + 1])?);
                i += 2;
            }
            "--data-dir" if i + 1 < args.len() => {
                config = config.data_dir(&args[i + 1]);
                i += 2;
            }
            "--poll-ms" if i + 1 < args.len() => {
                let ms = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --poll-ms {}", args[i + 1]))?;
                config = config.poll_interval(Duration::from_millis(ms));
                i += 2;
            }
            "--settle-secs" if i + 1 < args.len() => {
                let secs = args[i + 1]
                    .parse()
                    .with_context(|| format!("invalid --settle-secs {}", args[i + 1]))?;
                config = config.settle_delay(Duration::from_secs(secs));
                i += 2;
            }
            "--synthetic" => {
                synthetic = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                tracing::warn!("Ignoring unknown argument {}", other);
                i += 1;
            }
        }
    }

    Ok(Args { config, synthetic })
}

fn resolve_operator(value: &str) -> Result<SocketAddr> {
    value
        .to_socket_addrs()
        .with_context(|| format!("invalid --operator {}", value))?
        .find(SocketAddr::is_ipv4)
        .with_context(|| format!("--operator {} has no IPv4 address", value))
}

fn print_usage() {
    println!("Sensor Collector - records stereo infrared + IMU on remote command");
    println!();
    println!("Usage: sensor-collector [options]");
    println!();
    println!("Options:");
    println!("  --control-port <port>   UDP command port (default: 11111)");
    println!("  --operator <host:port>  Discovery destination (default: 192.168.0.108:6666)");
    println!("  --data-dir <dir>        Recording directory (default: ./data)");
    println!("  --poll-ms <ms>          Command poll interval (default: 100)");
    println!("  --settle-secs <secs>    Delay before announcing (default: 3)");
    println!("  --synthetic             Simulated sensors instead of a RealSense device");
    println!();
    println!("Commands (UDP, plain text):");
    println!("  \"Start Collection\"      begin recording");
    println!("  \"End Collection\"        stop, archive data/ and exit");
}

fn frame_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    if args.synthetic {
        return Ok(Box::new(SyntheticSource::new(&args.config)));
    }
    #[cfg(feature = "realsense")]
    {
        Ok(Box::new(sensor_collector::RealSenseSource::new(&args.config)))
    }
    #[cfg(not(feature = "realsense"))]
    {
        anyhow::bail!("built without the `realsense` feature; use --synthetic")
    }
}

async fn run(args: Args) -> Result<()> {
    let config = &args.config;

    let layout = DataLayout::new(&config.data_dir);
    layout.bootstrap()?;
    let control = ControlChannel::bind(config.control_addr, config.poll_interval).await?;
    let session = Arc::new(SessionContext::new(SessionWriters::open(&layout)?));

    let cancel = CancellationToken::new();

    // Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received, stopping...");
        cancel_clone.cancel();
    });

    let mut capture = spawn_capture(frame_source(&args)?, session.clone(), cancel.clone())?;
    capture.wait_ready().await?;

    println!();
    println!("========================================");
    println!("Sensor Collector");
    println!("========================================");
    println!("Control:    udp://{}", config.control_addr);
    println!("Operator:   {}", config.operator_addr);
    println!("Data dir:   {}", layout.root().display());
    println!(
        "Infrared:   {}x{} @ {} fps",
        config.infrared.width, config.infrared.height, config.infrared.fps
    );
    println!("Motion:     {} Hz", config.motion_hz);
    println!("========================================");
    println!();

    tracing::info!(
        "Initializing sensors for {:.1}s...",
        config.settle_delay.as_secs_f64()
    );
    tokio::select! {
        _ = tokio::time::sleep(config.settle_delay) => {}
        _ = cancel.cancelled() => {}
    }

    let outcome = if cancel.is_cancelled() {
        ControlOutcome::Cancelled
    } else {
        let local_ip = discovery::local_ipv4(config.operator_addr).await;
        if let Err(e) = discovery::announce(config.operator_addr, local_ip).await {
            tracing::warn!("{}", e);
        }
        tracing::info!("Initialization complete. Waiting for commands.");
        control.run(&session, &cancel).await
    };

    cancel.cancel();
    let capture_result = capture.join();
    let stats = session.close();
    stats.log_summary();
    capture_result?;

    match outcome {
        ControlOutcome::Stopped { at } => {
            layout.finish(at);
        }
        ControlOutcome::Cancelled => {
            tracing::info!(
                "Interrupted; leaving {} in place",
                layout.root().display()
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sensor_collector=info,warn")),
        )
        .init();

    let result = parse_args().and_then(|args| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?
            .block_on(run(args))
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
