//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{BootCommand, CheckCommand, FindUserCommand};
use std::ffi::OsString;

/// Boots a build-service node and keeps it registered
#[derive(Debug, Parser, Clone)]
#[command(name = "builder")]
#[command(version = "0.1.0")]
#[command(about = "Bootstraps a builder node: etcd, confd, docker and sshd", long_about = None)]
pub struct Cli {
    /// Defaults to `boot`
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a YAML file overriding the built-in boot options
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Boot the builder and run until SIGINT or SIGTERM
    Boot(BootCommand),

    /// Resolve and validate the configuration without starting anything
    Check(CheckCommand),

    /// Look up the user that owns an SSH key fingerprint
    FindUser(FindUserCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// The subcommand to run, `boot` when none was given
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Boot(BootCommand::default()))
    }
}
