//! Boot configuration: environment variables plus an optional YAML file

use crate::core::env::{process_env, EnvResolver, BUILDER_ENV};
use crate::process::build::BuildSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Operational knobs that can be overridden from a YAML file.
///
/// Every field has a default matching the stock builder image, so an empty
/// file (or no file at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootOptions {
    /// Well-known store directories created at boot. `$VAR` references are
    /// expanded against the resolved environment.
    pub directories: Vec<String>,

    /// Store path watched for service topology changes
    pub watch_path: String,

    /// Command run for every observed change under `watch_path`
    pub reconcile_command: Vec<String>,

    /// A reconcile run still going after this long is killed
    pub reconcile_timeout_secs: u64,

    /// Images built once docker is up
    pub images: Vec<BuildSpec>,

    /// Heartbeat refresh interval; defaults to half of `ETCD_TTL`
    pub heartbeat_interval_ms: Option<u64>,

    pub store: StoreOptions,
    pub confd: ConfdOptions,
    pub docker: DockerOptions,
    pub ssh: SshOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Extra connection attempts on transport failures and HTTP 500
    pub retries: usize,
    pub retry_sleep_ms: u64,
    /// Readiness probe attempts before giving up on the store
    pub ready_attempts: usize,
    pub ready_sleep_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfdOptions {
    pub program: String,
    /// Rebuild interval passed to the continuous confd process
    pub interval_secs: u64,
    /// One-shot render attempts before boot fails
    pub attempts: usize,
    pub sleep_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerOptions {
    pub program: String,
    pub socket: String,
    pub bridge_ip: String,
    pub insecure_registries: Vec<String>,
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshOptions {
    pub sshd_program: String,
    pub sshd_args: Vec<String>,
    pub keygen_program: String,
    /// Directory holding `ssh_host_<cipher>_key` files
    pub key_dir: String,
    pub ciphers: Vec<String>,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            directories: vec![
                "$ETCD_PATH/users".to_string(),
                "/deis/services".to_string(),
                "/deis/domains".to_string(),
                "/deis/controller".to_string(),
                "/deis/registry".to_string(),
                "/deis/cache".to_string(),
                "/deis/database".to_string(),
            ],
            watch_path: "/deis/services".to_string(),
            reconcile_command: vec!["/home/git/check-repos".to_string()],
            reconcile_timeout_secs: 300,
            images: vec![
                BuildSpec::new("/usr/local/src/slugbuilder/", "deis/slugbuilder"),
                BuildSpec::new("/usr/local/src/slugrunner/", "deis/slugrunner"),
            ],
            heartbeat_interval_ms: None,
            store: StoreOptions::default(),
            confd: ConfdOptions::default(),
            docker: DockerOptions::default(),
            ssh: SshOptions::default(),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_sleep_ms: 200,
            ready_attempts: 20,
            ready_sleep_ms: 250,
        }
    }
}

impl Default for ConfdOptions {
    fn default() -> Self {
        Self {
            program: "confd".to_string(),
            interval_secs: 5,
            attempts: 1200,
            sleep_secs: 3,
        }
    }
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            socket: "/var/run/docker.sock".to_string(),
            bridge_ip: "172.19.42.1/16".to_string(),
            insecure_registries: vec![
                "10.0.0.0/8".to_string(),
                "172.16.0.0/12".to_string(),
                "192.168.0.0/16".to_string(),
                "100.64.0.0/10".to_string(),
            ],
            ready_timeout_secs: 30,
        }
    }
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            sshd_program: "sshd".to_string(),
            sshd_args: vec!["-e".to_string(), "-D".to_string()],
            keygen_program: "ssh-keygen".to_string(),
            key_dir: "/etc/ssh".to_string(),
            ciphers: vec![
                "rsa".to_string(),
                "dsa".to_string(),
                "ecdsa".to_string(),
                "ed25519".to_string(),
            ],
        }
    }
}

impl BootOptions {
    /// Load options from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse options from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let options: BootOptions = serde_yaml::from_str(yaml)?;
        Ok(options)
    }
}

/// Fully resolved, immutable configuration for one boot.
///
/// Built once at startup and shared read-only with every step and
/// background task.
#[derive(Debug, Clone, Serialize)]
pub struct BootConfig {
    pub host: String,
    pub etcd_port: String,
    /// Base store path for this node (`ETCD_PATH`)
    pub etcd_path: String,
    #[serde(with = "secs")]
    pub etcd_ttl: Duration,
    /// Store URL (`ETCD`)
    pub etcd_url: String,
    /// Advertised port; empty disables the heartbeat
    pub external_port: String,
    /// Resolved variables, exported to every spawned process
    pub env: Vec<(String, String)>,
    /// Directories after `$VAR` expansion
    pub directories: Vec<String>,
    pub options: BootOptions,
}

impl BootConfig {
    /// Resolve from the process environment
    pub fn from_env(options: BootOptions) -> Result<Self> {
        Self::resolve(options, process_env)
    }

    /// Resolve against an arbitrary lookup, then validate
    pub fn resolve<F>(options: BootOptions, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolver = EnvResolver::new()?;
        resolver.resolve_all(BUILDER_ENV, &lookup);

        let directories = options
            .directories
            .iter()
            .map(|dir| resolver.expand(dir, &lookup))
            .collect();

        let var = |name: &str| resolver.get(name).unwrap_or_default().to_string();
        let ttl_raw = var("ETCD_TTL");
        let ttl_secs: u64 = ttl_raw
            .parse()
            .with_context(|| format!("ETCD_TTL must be a number of seconds, got '{}'", ttl_raw))?;

        let config = BootConfig {
            host: var("HOST"),
            etcd_port: var("ETCD_PORT"),
            etcd_path: var("ETCD_PATH"),
            etcd_ttl: Duration::from_secs(ttl_secs),
            etcd_url: var("ETCD"),
            external_port: var("EXTERNAL_PORT"),
            env: resolver.into_vars(),
            directories,
            options,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the resolved configuration
    pub fn validate(&self) -> Result<()> {
        if !self.etcd_path.starts_with('/') {
            anyhow::bail!("ETCD_PATH must be an absolute store path, got '{}'", self.etcd_path);
        }
        if self.etcd_ttl.is_zero() {
            anyhow::bail!("ETCD_TTL must be greater than zero");
        }
        if self.etcd_port.parse::<u16>().is_err() {
            anyhow::bail!("ETCD_PORT must be a port number, got '{}'", self.etcd_port);
        }
        if !self.external_port.is_empty() && self.external_port.parse::<u16>().is_err() {
            anyhow::bail!(
                "EXTERNAL_PORT must be empty or a port number, got '{}'",
                self.external_port
            );
        }
        if self.etcd_url.is_empty() {
            anyhow::bail!("ETCD resolved to an empty URL");
        }
        if let Some(dir) = self.directories.iter().find(|d| d.is_empty()) {
            anyhow::bail!("Empty directory entry in configuration: '{}'", dir);
        }

        let mut tags = HashSet::new();
        for image in &self.options.images {
            if image.source_path.is_empty() {
                anyhow::bail!("Image '{}' has no source path", image.image_tag);
            }
            if !image.image_tag.is_empty() && !tags.insert(&image.image_tag) {
                anyhow::bail!("Duplicate image tag: {}", image.image_tag);
            }
        }

        if self.options.reconcile_command.is_empty() {
            anyhow::bail!("reconcile_command must name a program");
        }
        if self.options.reconcile_timeout_secs == 0 {
            anyhow::bail!("reconcile_timeout_secs must be greater than zero");
        }
        if self.options.confd.attempts == 0 {
            anyhow::bail!("confd.attempts must be at least 1");
        }
        if self.options.store.ready_attempts == 0 {
            anyhow::bail!("store.ready_attempts must be at least 1");
        }

        let interval = self.heartbeat_interval();
        if interval.is_zero() {
            anyhow::bail!("heartbeat_interval_ms must be greater than zero");
        }
        if interval >= self.etcd_ttl {
            anyhow::bail!(
                "heartbeat interval {:?} must be shorter than ETCD_TTL {:?}",
                interval,
                self.etcd_ttl
            );
        }
        Ok(())
    }

    /// Interval between heartbeat refreshes
    pub fn heartbeat_interval(&self) -> Duration {
        match self.options.heartbeat_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.etcd_ttl / 2,
        }
    }

    /// Store node address in `host:port` form, as confd expects it
    pub fn etcd_node(&self) -> String {
        self.etcd_url
            .split("://")
            .last()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string()
    }
}

mod secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
