//! Scripted in-memory stages for driving the executor without a model.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arcsys_core::error::StageFailure;
use arcsys_core::graph::{
    standard_pipeline, OrchestrationGraph, PipelineStages, ARCHITECT, CRITIQUE, META_CRITIQUE,
    PLAN, RESEARCH, VISUALIZE,
};
use arcsys_core::stages::{Stage, StateView};
use arcsys_core::state::{
    Architecture, BiasReport, Component, Critique, Field, Requirements, Research, StatePatch,
};
use async_trait::async_trait;
use tokio::time::Instant;

pub type Produce = Box<dyn Fn(&StateView, usize) -> Result<StatePatch, StageFailure> + Send + Sync>;

/// A stage that replays a fixed script and counts its invocations
pub struct Scripted {
    name: &'static str,
    requires: &'static [Field],
    writes: &'static [Field],
    delay: Option<Duration>,
    calls: AtomicUsize,
    produce: Produce,
}

impl Scripted {
    pub fn new(
        name: &'static str,
        requires: &'static [Field],
        writes: &'static [Field],
        produce: Produce,
    ) -> Self {
        Self {
            name,
            requires,
            writes,
            delay: None,
            calls: AtomicUsize::new(0),
            produce,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    fn requires(&self) -> &'static [Field] {
        self.requires
    }

    fn writes(&self) -> &'static [Field] {
        self.writes
    }

    async fn execute(&self, view: StateView, _deadline: Instant) -> Result<StatePatch, StageFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.produce)(&view, n)
    }
}

pub fn requirements() -> Requirements {
    Requirements {
        functional: vec!["Shorten URLs".to_string(), "Redirect".to_string()],
        non_functional: vec!["p99 under 50ms".to_string()],
        ..Default::default()
    }
}

pub fn planner() -> Scripted {
    Scripted::new(
        PLAN,
        &[Field::Query],
        &[Field::Requirements],
        Box::new(|_, _| Ok(StatePatch::new().with_requirements(requirements()))),
    )
}

pub fn researcher() -> Scripted {
    Scripted::new(
        RESEARCH,
        &[Field::Requirements],
        &[Field::Research],
        Box::new(|view, _| {
            Ok(StatePatch::new().with_research(Research {
                summary: format!("Key-value store, pass {}", view.iteration),
                technologies: vec!["Redis".to_string()],
                ..Default::default()
            }))
        }),
    )
}

pub fn architect() -> Scripted {
    Scripted::new(
        ARCHITECT,
        &[Field::Requirements, Field::Research],
        &[Field::Architecture],
        Box::new(|_, _| {
            Ok(StatePatch::new().with_architecture(Architecture {
                overview: "Stateless API in front of a replicated store".to_string(),
                components: vec![Component {
                    name: "Api".to_string(),
                    responsibility: "Issue and resolve codes".to_string(),
                }],
                ..Default::default()
            }))
        }),
    )
}

pub fn visualizer() -> Scripted {
    Scripted::new(
        VISUALIZE,
        &[Field::Architecture],
        &[Field::Diagrams],
        Box::new(|_, _| {
            Ok(StatePatch::new().with_diagrams(vec!["graph TD\n  Client --> Api".to_string()]))
        }),
    )
}

/// Critic that reports `scores[n]` on its n-th call, repeating the last one
pub fn critic(scores: Vec<f64>) -> Scripted {
    Scripted::new(
        CRITIQUE,
        &[
            Field::Requirements,
            Field::Research,
            Field::Architecture,
            Field::Diagrams,
        ],
        &[Field::Critique],
        Box::new(move |_, n| {
            let score = scores[n.min(scores.len() - 1)];
            Ok(StatePatch::new().with_critique(Critique {
                score,
                feedback: format!("scored {}", score),
                breakdown: Default::default(),
            }))
        }),
    )
}

pub fn meta_critic() -> Scripted {
    Scripted::new(
        META_CRITIQUE,
        &[Field::Requirements, Field::Architecture, Field::Critique],
        &[Field::BiasReport],
        Box::new(|_, _| {
            Ok(StatePatch::new().with_bias_report(BiasReport {
                bias_score: 0.2,
                findings: vec![],
            }))
        }),
    )
}

/// The six scripted workers, kept so tests can inspect call counts
pub struct Lab {
    pub planner: Arc<Scripted>,
    pub researcher: Arc<Scripted>,
    pub architect: Arc<Scripted>,
    pub visualizer: Arc<Scripted>,
    pub critic: Arc<Scripted>,
    pub meta_critic: Arc<Scripted>,
}

impl Lab {
    pub fn with_scores(scores: Vec<f64>) -> Self {
        Self {
            planner: Arc::new(planner()),
            researcher: Arc::new(researcher()),
            architect: Arc::new(architect()),
            visualizer: Arc::new(visualizer()),
            critic: Arc::new(critic(scores)),
            meta_critic: Arc::new(meta_critic()),
        }
    }

    pub fn graph(&self) -> OrchestrationGraph {
        standard_pipeline(PipelineStages {
            planner: self.planner.clone(),
            researcher: self.researcher.clone(),
            architect: self.architect.clone(),
            visualizer: self.visualizer.clone(),
            critic: self.critic.clone(),
            meta_critic: self.meta_critic.clone(),
        })
        .expect("standard pipeline is well formed")
    }
}
