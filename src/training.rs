//! Training loop
//!
//! Each cycle asks a [`QuestionSource`] for fresh conversion questions and
//! runs the full acquisition loop for all of them concurrently, bounded by a
//! semaphore. Every question keeps its own strictly ordered pipeline, and a
//! failure on one question is recorded without cancelling the others.

use crate::config::TrainingConfig;
use crate::core::{Agent, Outcome};
use crate::oracle::QuestionSource;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Result of one question
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Resolved { outcome: Outcome },
    Errored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingItem {
    pub question: String,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: usize,
    /// Set when no questions could be generated for this cycle
    pub question_error: Option<String>,
    pub items: Vec<TrainingItem>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingReport {
    pub cycles: Vec<CycleReport>,
    pub elapsed_ms: u64,
}

impl TrainingReport {
    fn items(&self) -> impl Iterator<Item = &TrainingItem> {
        self.cycles.iter().flat_map(|c| c.items.iter())
    }

    /// Number of resolved items with the given outcome kind (`found`, `learned`, ...)
    pub fn count(&self, kind: &str) -> usize {
        self.items()
            .filter(|item| matches!(&item.status, ItemStatus::Resolved { outcome } if outcome.kind() == kind))
            .count()
    }

    pub fn errored(&self) -> usize {
        self.items()
            .filter(|item| matches!(item.status, ItemStatus::Errored { .. }))
            .count()
    }

    pub fn total(&self) -> usize {
        self.items().count()
    }
}

/// Run `config.cycles` training cycles
pub async fn run_training(
    agent: &Agent,
    questions: Arc<dyn QuestionSource>,
    config: &TrainingConfig,
) -> TrainingReport {
    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut report = TrainingReport::default();

    info!(cycles = config.cycles, "Starting training");

    for cycle in 1..=config.cycles {
        let cycle_start = Instant::now();
        info!(cycle, "Training cycle");

        let batch = match questions
            .generate_questions(config.questions_per_cycle, &config.prompt)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(cycle, error = %e, "Question generation failed");
                report.cycles.push(CycleReport {
                    cycle,
                    question_error: Some(e.to_string()),
                    items: Vec::new(),
                    elapsed_ms: cycle_start.elapsed().as_millis() as u64,
                });
                continue;
            }
        };

        let items = run_cycle(agent, batch, &semaphore).await;
        report.cycles.push(CycleReport {
            cycle,
            question_error: None,
            items,
            elapsed_ms: cycle_start.elapsed().as_millis() as u64,
        });
    }

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    info!(
        questions = report.total(),
        learned = report.count("learned"),
        errored = report.errored(),
        elapsed_ms = report.elapsed_ms,
        "Training complete"
    );
    report
}

async fn run_cycle(agent: &Agent, batch: Vec<String>, semaphore: &Arc<Semaphore>) -> Vec<TrainingItem> {
    let mut handles = Vec::with_capacity(batch.len());

    for question in batch {
        let agent = agent.clone();
        let semaphore = semaphore.clone();
        let task_question = question.clone();

        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let status = match semaphore.acquire_owned().await {
                Ok(_permit) => match agent.ask(&task_question).await {
                    Ok(outcome) => ItemStatus::Resolved { outcome },
                    Err(e) => ItemStatus::Errored {
                        reason: e.to_string(),
                    },
                },
                Err(e) => ItemStatus::Errored {
                    reason: e.to_string(),
                },
            };
            (status, start.elapsed().as_millis() as u64)
        });
        handles.push((question, handle));
    }

    let mut items = Vec::with_capacity(handles.len());
    for (question, handle) in handles {
        let (status, elapsed_ms) = handle.await.unwrap_or_else(|e| {
            (
                ItemStatus::Errored {
                    reason: e.to_string(),
                },
                0,
            )
        });
        if let ItemStatus::Errored { reason } = &status {
            warn!(question = %question, error = %reason, "Question failed");
        }
        items.push(TrainingItem {
            question,
            status,
            elapsed_ms,
        });
    }
    items
}
