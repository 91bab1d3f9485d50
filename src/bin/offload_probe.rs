//! offload-probe: inspect what the admission controller sees on this node
//!
//! Usage:
//!   offload-probe limits  [--cgroup-root <path>]     Show discovered CPU/memory ceilings
//!   offload-probe metrics [--config <file>]           Take one resource snapshot
//!   offload-probe decide  [--config <file>] [-n <N>]  Run N admission checks and print stats

use adaptive_offload::limits::LimitDiscovery;
use adaptive_offload::{AdmissionConfig, AdmissionController};
use anyhow::Context;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "limits" => cmd_limits(&args[2..]),
        "metrics" => cmd_metrics(&args[2..]).await,
        "decide" => cmd_decide(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("offload-probe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"offload-probe: admission controller diagnostics

USAGE:
    offload-probe <COMMAND> [OPTIONS]

COMMANDS:
    limits  [--cgroup-root <path>]      Show discovered CPU/memory ceilings
    metrics [--config <file>]           Take one resource snapshot
    decide  [--config <file>] [-n <N>]  Run N admission checks and print stats
    version                             Show version information
    help                                Show this help message

ENVIRONMENT:
    OFFLOAD_*                           Configuration overrides (see AdmissionConfig)
    RUST_LOG                            Log filter, e.g. RUST_LOG=adaptive_offload=debug"#
    );
}

fn flag_value<'a>(args: &'a [String], names: &[&str]) -> Option<&'a str> {
    args.iter()
        .position(|a| names.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn load_config(args: &[String]) -> anyhow::Result<AdmissionConfig> {
    let cfg = match flag_value(args, &["--config", "-c"]) {
        Some(path) => AdmissionConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => AdmissionConfig::default(),
    };
    Ok(cfg.with_env_overrides())
}

fn cmd_limits(args: &[String]) -> anyhow::Result<()> {
    let root = flag_value(args, &["--cgroup-root"])
        .map(PathBuf::from)
        .unwrap_or_else(|| AdmissionConfig::from_env().cgroup_root);
    let limits = LimitDiscovery::with_cgroup_root(root).discover();
    println!("{}", serde_json::to_string_pretty(&limits)?);
    Ok(())
}

async fn cmd_metrics(args: &[String]) -> anyhow::Result<()> {
    let controller = AdmissionController::builder()
        .config(load_config(args)?)
        .build();
    let snapshot = controller
        .current_metrics()
        .await
        .context("sampling resources")?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn cmd_decide(args: &[String]) -> anyhow::Result<()> {
    let rounds: usize = match flag_value(args, &["-n"]) {
        Some(n) => n.parse().with_context(|| format!("invalid -n value '{n}'"))?,
        None => 1,
    };
    let controller = AdmissionController::builder()
        .config(load_config(args)?)
        .build();

    for _ in 0..rounds {
        let _guard = controller.begin_request();
        let decision = controller.evaluate().await;
        println!("{}", serde_json::to_string(&decision)?);
    }

    let report = serde_json::json!({
        "stats": controller.stats(),
        "thresholds": controller.current_thresholds(),
        "breaker": controller.breaker_snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
