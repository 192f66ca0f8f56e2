//! Test utilities for the boot scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use builder_boot::core::{
    BootConfig, BootOptions, Pipeline, PipelineContext, StepAction, StepError, StepOutcome,
    StepOutput, StepState,
};
use builder_boot::execution::{EngineError, ExecutionEngine, ExecutionEvent};
use builder_boot::process::{
    BuildSpec, CommandError, CommandOutput, CommandRunner, CommandSpec, ImageBuilder,
    ProcessControl, ProcessError,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Shared log of step names in execution order
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

/// Step that records its name, then returns a fixed result
pub struct Recorded {
    name: String,
    trace: Trace,
    result: Result<StepOutcome, StepError>,
}

impl Recorded {
    pub fn ok(name: &str, trace: &Trace) -> Self {
        Self::with(name, trace, Ok(StepOutcome::done()))
    }

    pub fn with(name: &str, trace: &Trace, result: Result<StepOutcome, StepError>) -> Self {
        Self {
            name: name.to_string(),
            trace: trace.clone(),
            result,
        }
    }
}

#[async_trait]
impl StepAction for Recorded {
    async fn run(&self, _ctx: &PipelineContext) -> Result<StepOutcome, StepError> {
        self.trace.lock().unwrap().push(self.name.clone());
        self.result.clone()
    }
}

/// Process control over a fixed set of live PIDs
pub struct FakeControl {
    alive: Mutex<HashSet<u32>>,
    pub attempted: Mutex<Vec<u32>>,
}

impl FakeControl {
    pub fn new(alive: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            alive: Mutex::new(alive.iter().copied().collect()),
            attempted: Mutex::new(Vec::new()),
        })
    }

    pub fn die(&self, pid: u32) {
        self.alive.lock().unwrap().remove(&pid);
    }
}

impl ProcessControl for FakeControl {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn kill(&self, pid: u32) -> Result<(), ProcessError> {
        self.attempted.lock().unwrap().push(pid);
        if self.alive.lock().unwrap().remove(&pid) {
            Ok(())
        } else {
            Err(ProcessError::NotRunning(pid))
        }
    }
}

/// Image builder that fails for the listed tags
pub struct FakeImageBuilder {
    failing: HashSet<String>,
    pub built: Mutex<Vec<String>>,
}

impl FakeImageBuilder {
    pub fn failing(tags: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: tags.iter().map(|t| t.to_string()).collect(),
            built: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageBuilder for FakeImageBuilder {
    async fn build(&self, spec: &BuildSpec) -> Result<String, String> {
        tokio::task::yield_now().await;
        self.built.lock().unwrap().push(spec.image_tag.clone());
        if self.failing.contains(&spec.image_tag) {
            Err(format!("build of {} failed", spec.image_tag))
        } else {
            Ok(format!("Successfully built {}", spec.image_tag))
        }
    }
}

/// Command runner that succeeds unless told otherwise, recording every
/// command line
#[derive(Default)]
pub struct FakeRunner {
    pub seen: Mutex<Vec<String>>,
    failing: HashSet<String>,
    stdout: HashMap<String, String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command whose program is `program` fails
    pub fn fail(mut self, program: &str) -> Self {
        self.failing.insert(program.to_string());
        self
    }

    /// Commands whose program is `program` print `stdout`
    pub fn print(mut self, program: &str, stdout: &str) -> Self {
        self.stdout.insert(program.to_string(), stdout.to_string());
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.seen.lock().unwrap().push(spec.to_string());
        if self.failing.contains(&spec.program) {
            return Err(CommandError::Failed {
                program: spec.program.clone(),
                code: 1,
                output: "failed".to_string(),
            });
        }
        Ok(CommandOutput {
            code: Some(0),
            combined: self.stdout.get(&spec.program).cloned().unwrap_or_default(),
        })
    }
}

/// Resolve `options` against `vars` only, ignoring the process environment
pub fn config_with(options: BootOptions, vars: &[(&str, &str)]) -> BootConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    BootConfig::resolve(options, move |name| vars.get(name).cloned()).unwrap()
}

pub fn context() -> PipelineContext {
    PipelineContext::new(config_with(BootOptions::default(), &[]))
}

/// Execute `pipeline`, collecting every emitted event
pub async fn run_collecting(
    pipeline: &mut Pipeline,
    ctx: &PipelineContext,
) -> (Result<(), EngineError>, Vec<ExecutionEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let engine = ExecutionEngine::new();
    let sink = events.clone();
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let result = engine.execute(pipeline, ctx).await;
    let events = events.lock().unwrap().clone();
    (result, events)
}

pub fn step_state<'a>(pipeline: &'a Pipeline, step: &str) -> &'a StepState {
    &pipeline
        .step(step)
        .unwrap_or_else(|| panic!("no step named {}", step))
        .state
}

pub fn assert_trace(trace: &Trace, expected: &[&str]) {
    let actual = trace.lock().unwrap().clone();
    assert_eq!(actual, expected, "unexpected execution order");
}

pub fn count(n: usize) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::Output(StepOutput::Count(n)))
}
