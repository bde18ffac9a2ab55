//! rdebug - Entry Point
//!
//! Remote deploy server for Maven projects. Clients upload a project archive,
//! the server builds it, resolves its dependencies and runs the requested
//! entry point, replacing the previous deployment of the same project.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use tracing::{error, info};

use rdebug::app::options::{verify_toolchain, AppOptions};
use rdebug::app::run::run;
use rdebug::client::{self, ClientOptions};
use rdebug::logs::{init_logging, LogOptions};
use rdebug::storage::settings::Settings;
use rdebug::utils::version_info;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    // Deploy a local project and exit
    if cli_args.contains_key("deploy") {
        if let Err(e) = run_client(&cli_args).await {
            eprintln!("{} {:#}", "deploy failed:".red().bold(), e);
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = run_server(version.version, &cli_args).await {
        error!("Failed to run the server: {e:#}");
        eprintln!("{} {:#}", "server failed:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_client(cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    let options = ClientOptions::from_args(cli_args)?;
    println!(
        "{} deploying {} to {}",
        "→".cyan(),
        options.project.display(),
        options.server
    );

    let result = client::deploy(&options)
        .await
        .with_context(|| format!("deploying to {}", options.server))?;

    if result.is_success() {
        println!(
            "{} deployed {} with pid {}",
            "✓".green(),
            options.entry.bold(),
            result.message
        );
        Ok(())
    } else {
        anyhow::bail!("server answered {}: {}", result.code, result.message)
    }
}

async fn run_server(version: String, cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    // Retrieve the settings file
    let config = cli_args.get("config").map(PathBuf::from);
    let mut settings = Settings::load(config.clone())
        .await
        .with_context(|| format!("reading settings {:?}", config))?;
    settings.apply_overrides(cli_args)?;
    let options = AppOptions::from(&settings);

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
        log_dir: settings
            .log_to_file
            .then(|| options.layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    verify_toolchain(&options.toolchain).context("verifying toolchain")?;

    info!("Running rdebug server with options: {:?}", options);
    run(version, options, await_shutdown_signal()).await?;
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to listen for SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to listen for SIGINT");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
