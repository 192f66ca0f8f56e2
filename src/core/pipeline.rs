//! Pipeline domain model: named routes of ordered steps

use crate::core::{
    state::PipelineState,
    step::{Step, StepAction},
};
use crate::execution::phase::BootPhase;
use anyhow::{bail, Result};
use std::collections::HashSet;

/// An ordered list of steps belonging to one boot phase
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub phase: BootPhase,
    pub steps: Vec<Step>,
    /// Route to continue with once every step here has run
    pub next: Option<String>,
}

impl Route {
    pub fn new(name: impl Into<String>, phase: BootPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            steps: Vec::new(),
            next: None,
        }
    }

    /// Append a step
    pub fn step(mut self, name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        self.steps.push(Step::new(name, action));
        self
    }

    /// Set the follow-up route
    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// A validated set of routes with an entry point
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    entry: String,
    routes: Vec<Route>,
    pub state: PipelineState,
}

/// Collects routes and validates them into a [`Pipeline`]
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    entry: Option<String>,
    routes: Vec<Route>,
}

impl PipelineBuilder {
    /// Name of the route execution starts from. Defaults to the first route.
    pub fn entry(mut self, route: impl Into<String>) -> Self {
        self.entry = Some(route.into());
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let entry = match self.entry.or_else(|| self.routes.first().map(|r| r.name.clone())) {
            Some(entry) => entry,
            None => bail!("Pipeline '{}' has no routes", self.name),
        };

        let mut route_names = HashSet::new();
        for route in &self.routes {
            if !route_names.insert(route.name.as_str()) {
                bail!("Duplicate route name: {}", route.name);
            }
        }

        if !route_names.contains(entry.as_str()) {
            bail!("Entry route '{}' does not exist", entry);
        }

        for route in &self.routes {
            if let Some(next) = &route.next {
                if !route_names.contains(next.as_str()) {
                    bail!("Route '{}' continues with unknown route '{}'", route.name, next);
                }
            }
        }

        let mut step_names = HashSet::new();
        for step in self.routes.iter().flat_map(|r| r.steps.iter()) {
            if !step_names.insert(step.name.as_str()) {
                bail!("Duplicate step name: {}", step.name);
            }
        }

        for step in self.routes.iter().flat_map(|r| r.steps.iter()) {
            for required in step.requires() {
                if !step_names.contains(required.as_str()) {
                    bail!(
                        "Step '{}' requires output of '{}', which no step produces",
                        step.name,
                        required
                    );
                }
            }
        }

        Ok(Pipeline {
            name: self.name,
            entry,
            routes: self.routes,
            state: PipelineState::new(),
        })
    }
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            entry: None,
            routes: Vec::new(),
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn route_mut(&mut self, name: &str) -> Option<&mut Route> {
        self.routes.iter_mut().find(|r| r.name == name)
    }

    /// Get a step by name from any route
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps().find(|s| s.name == name)
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.routes.iter().flat_map(|r| r.steps.iter())
    }

    pub fn step_count(&self) -> usize {
        self.routes.iter().map(|r| r.steps.len()).sum()
    }
}
