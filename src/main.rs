use builder_boot::boot::{builder_pipeline, BootDeps, EtcdConnector, StoreConnector};
use builder_boot::cli::commands::{BootCommand, CheckCommand, FindUserCommand};
use builder_boot::cli::output::*;
use builder_boot::cli::{Cli, Command};
use builder_boot::coordination::users::find_ssh_user;
use builder_boot::core::env::process_env;
use builder_boot::core::{BootConfig, BootOptions, PipelineContext};
use builder_boot::execution::ExecutionEngine;
use builder_boot::process::reap;
use builder_boot::signal::spawn_signal_listener;
use builder_boot::{STATUS_LOCAL_ERROR, STATUS_OK};

use anyhow::{Context, Result};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::from_args();

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("{:#}", err);
        return ExitCode::from(STATUS_LOCAL_ERROR);
    }

    let result = match cli.command() {
        Command::Boot(cmd) => boot(&cmd, cli.config.as_deref()).await,
        Command::Check(cmd) => check(&cmd, cli.config.as_deref()),
        Command::FindUser(cmd) => find_user(&cmd, cli.config.as_deref()).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(STATUS_LOCAL_ERROR)
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")
}

fn load_options(path: Option<&str>) -> Result<BootOptions> {
    match path {
        Some(path) => BootOptions::from_file(path)
            .with_context(|| format!("Failed to load boot options from {}", path)),
        None => Ok(BootOptions::default()),
    }
}

async fn boot(cmd: &BootCommand, config_path: Option<&str>) -> Result<u8> {
    let options = load_options(config_path)?;
    let external_port = cmd.external_port.clone();
    let config = BootConfig::resolve(options, |name| match (name, &external_port) {
        ("EXTERNAL_PORT", Some(port)) => Some(port.clone()),
        _ => process_env(name),
    })
    .context("Invalid configuration")?;

    let deps = BootDeps::system(&config);
    let mut pipeline = builder_pipeline(&config, &deps)?;

    let shutdown = CancellationToken::new();
    let listener = spawn_signal_listener(shutdown.clone());
    let ctx = PipelineContext::new(config).with_shutdown(shutdown.clone());

    let engine = ExecutionEngine::new();
    engine
        .add_event_handler(|event| println!("{}", format_execution_event(&event)))
        .await;

    let result = engine.execute(&mut pipeline, &ctx).await;

    shutdown.cancel();
    let _ = listener.await;

    match result {
        Ok(()) => {
            println!("\n{} {} stopped", CHECK, style(&pipeline.name).bold());
            Ok(STATUS_OK)
        }
        Err(err) => {
            println!("\n{} {} {}", CROSS, style(&pipeline.name).bold(), style("failed").red());
            error!("{}", err);
            // Nothing started by a failed boot is left behind
            reap(ctx.registry(), deps.control.as_ref(), ctx.tasks()).await;
            Ok(STATUS_LOCAL_ERROR)
        }
    }
}

fn check(cmd: &CheckCommand, config_path: Option<&str>) -> Result<u8> {
    println!("{} Checking configuration...", INFO);

    let options = load_options(config_path)?;
    match BootConfig::from_env(options) {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("{}", format_config(&config));
            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(STATUS_OK)
        }
        Err(err) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", err)).red());
            Ok(STATUS_LOCAL_ERROR)
        }
    }
}

async fn find_user(cmd: &FindUserCommand, config_path: Option<&str>) -> Result<u8> {
    let config = BootConfig::from_env(load_options(config_path)?).context("Invalid configuration")?;
    let store = EtcdConnector
        .connect(&config)
        .await
        .context("Failed to create the store client")?;

    match find_ssh_user(store.as_ref(), &config.etcd_path, &cmd.fingerprint).await? {
        Some(user) => {
            println!("{}", user);
            Ok(STATUS_OK)
        }
        None => {
            println!("{} No user owns {}", WARN, style(&cmd.fingerprint).cyan());
            Ok(STATUS_LOCAL_ERROR)
        }
    }
}
