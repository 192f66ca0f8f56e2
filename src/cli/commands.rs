//! CLI command definitions

use clap::Args;

/// Boot the builder
#[derive(Debug, Args, Clone, Default)]
pub struct BootCommand {
    /// Override the advertised external port (EXTERNAL_PORT)
    #[arg(long)]
    pub external_port: Option<String>,
}

/// Resolve and validate the configuration
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Find the user owning an SSH key
#[derive(Debug, Args, Clone)]
pub struct FindUserCommand {
    /// Key fingerprint, e.g. `aa:bb:cc:...`
    pub fingerprint: String,
}
