//! SSH host keys shared through the store
//!
//! The first builder of a cluster generates host keys and stores them; every
//! later builder copies them so all builders present the same identity.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::boot::store::HOST_KEY;
use crate::coordination::join_path;
use crate::core::{PipelineContext, StepAction, StepError, StepOutcome, StepOutput};
use crate::process::{CommandRunner, CommandSpec};

const KEY_MODE: u32 = 0o600;

/// Store key holding the private key for `cipher`
pub fn cipher_key(base: &str, cipher: &str) -> String {
    join_path(base, &format!("sshHost{}Key", cipher))
}

/// Local file holding the private key for `cipher`
pub fn cipher_file(dir: &str, cipher: &str) -> PathBuf {
    Path::new(dir).join(format!("ssh_host_{}_key", cipher))
}

/// Local file holding the generic host key
pub fn generic_file(dir: &str) -> PathBuf {
    Path::new(dir).join("ssh_host_key")
}

async fn write_key(path: &Path, content: &str) -> std::io::Result<()> {
    tokio::fs::write(path, content).await?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(KEY_MODE)).await
}

/// Copy host keys from the store into the local ssh directory.
///
/// Missing cipher keys are skipped. The generic key is required.
pub struct FetchHostKeys;

#[async_trait]
impl StepAction for FetchHostKeys {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let store = ctx.store().await?;
        let config = ctx.config();
        let ssh = &config.options.ssh;

        let mut copied = 0;
        for cipher in &ssh.ciphers {
            let key = cipher_key(&config.etcd_path, cipher);
            let value = match store.get(&key, false).await {
                Ok(node) => node.value.unwrap_or_default(),
                Err(err) => {
                    debug!("skipping {}: {}", key, err);
                    continue;
                }
            };

            let path = cipher_file(&ssh.key_dir, cipher);
            match write_key(&path, &value).await {
                Ok(()) => copied += 1,
                Err(err) => error!("error writing ssh host key file {}: {}", path.display(), err),
            }
        }

        let key = join_path(&config.etcd_path, HOST_KEY);
        let generic = store
            .get(&key, false)
            .await
            .map_err(|err| StepError::fatal(format!("failed to get {} from the store: {}", key, err)))?;

        let path = generic_file(&ssh.key_dir);
        write_key(&path, generic.value.as_deref().unwrap_or_default())
            .await
            .map_err(|err| StepError::fatal(format!("failed to write {}: {}", path.display(), err)))?;

        info!("copied {} cipher host keys and the generic key", copied);
        Ok(StepOutcome::Output(StepOutput::Count(copied)))
    }
}

/// Generate fresh host keys and publish them to the store.
///
/// A failing key generator and unreadable cipher keys are logged only; the
/// generic key must be read and stored.
pub struct GenerateHostKeys {
    runner: Arc<dyn CommandRunner>,
}

impl GenerateHostKeys {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepAction for GenerateHostKeys {
    async fn run(&self, ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        let store = ctx.store().await?;
        let config = ctx.config();
        let ssh = &config.options.ssh;

        let keygen = CommandSpec::new(ssh.keygen_program.as_str())
            .arg("-A")
            .envs(&config.env);
        if let Err(err) = self.runner.run(&keygen).await {
            error!("failed to generate ssh host keys: {}", err);
        }

        let mut stored = 0;
        for cipher in &ssh.ciphers {
            let path = cipher_file(&ssh.key_dir, cipher);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(_) => {
                    info!("no key named {}", path.display());
                    continue;
                }
            };

            let key = cipher_key(&config.etcd_path, cipher);
            match store.set(&key, &content, std::time::Duration::ZERO).await {
                Ok(_) => stored += 1,
                Err(err) => warn!("could not store {} in the store: {}", key, err),
            }
        }

        let path = generic_file(&ssh.key_dir);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| StepError::fatal(format!("could not read {}: {}", path.display(), err)))?;

        let key = join_path(&config.etcd_path, HOST_KEY);
        store
            .set(&key, &content, std::time::Duration::ZERO)
            .await
            .map_err(|err| StepError::fatal(format!("failed to set {}: {}", key, err)))?;

        info!("stored {} cipher host keys and the generic key", stored);
        Ok(StepOutcome::Output(StepOutput::Count(stored)))
    }
}
