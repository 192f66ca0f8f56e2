//! Concurrent image builds

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::process::command::{CommandRunner, CommandSpec};

/// One image to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory
    pub source_path: String,
    /// Tag for the image; empty builds untagged
    #[serde(default)]
    pub image_tag: String,
}

impl BuildSpec {
    pub fn new(source_path: impl Into<String>, image_tag: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            image_tag: image_tag.into(),
        }
    }
}

/// Outcome of one spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub spec: BuildSpec,
    pub output: String,
    pub error: Option<String>,
}

impl BuildResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Results for every spec of a group, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub results: Vec<BuildResult>,
}

impl BuildReport {
    pub fn completed(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded()).count()
    }
}

/// Something that can turn a build context into an image
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `spec`, returning the builder's output
    async fn build(&self, spec: &BuildSpec) -> Result<String, String>;
}

/// Builds images with `docker build [-t TAG] PATH`
pub struct DockerCli {
    program: String,
    env: Vec<(String, String)>,
    runner: Arc<dyn CommandRunner>,
}

impl DockerCli {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            env: Vec::new(),
            runner,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    fn command(&self, spec: &BuildSpec) -> CommandSpec {
        let mut command = CommandSpec::new(self.program.clone()).arg("build");
        if !spec.image_tag.is_empty() {
            command = command.args(["-t".to_string(), spec.image_tag.clone()]);
        }
        command.arg(spec.source_path.clone()).envs(&self.env)
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(&self, spec: &BuildSpec) -> Result<String, String> {
        match self.runner.run(&self.command(spec)).await {
            Ok(output) => {
                if !output.combined.trim().is_empty() {
                    info!("{}", output.combined.trim());
                }
                Ok(output.combined)
            }
            Err(err) => Err(err.to_string()),
        }
    }
}

/// Build every spec concurrently and wait for all of them.
///
/// A failed build never cancels its siblings; the report lists every spec.
pub async fn build_all(builder: Arc<dyn ImageBuilder>, specs: &[BuildSpec]) -> BuildReport {
    let mut set = JoinSet::new();
    for (index, spec) in specs.iter().cloned().enumerate() {
        let builder = builder.clone();
        set.spawn(async move {
            let result = builder.build(&spec).await;
            (index, spec, result)
        });
    }

    let mut slots: Vec<Option<BuildResult>> = vec![None; specs.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, spec, Ok(output))) => {
                info!(image = %spec.image_tag, "built {}", spec.source_path);
                slots[index] = Some(BuildResult {
                    spec,
                    output,
                    error: None,
                });
            }
            Ok((index, spec, Err(err))) => {
                error!(image = %spec.image_tag, "failed to build {}: {}", spec.source_path, err);
                slots[index] = Some(BuildResult {
                    spec,
                    output: String::new(),
                    error: Some(err),
                });
            }
            Err(err) => {
                error!("build task panicked: {}", err);
            }
        }
    }

    // A panicked task leaves its slot empty
    let results = slots
        .into_iter()
        .zip(specs.iter())
        .map(|(slot, spec)| {
            slot.unwrap_or_else(|| BuildResult {
                spec: spec.clone(),
                output: String::new(),
                error: Some("build task panicked".to_string()),
            })
        })
        .collect();

    BuildReport { results }
}
