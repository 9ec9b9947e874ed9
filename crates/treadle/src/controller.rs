/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Reactive fixed-point controller
//!
//! Drives generators, the executor, and the match index together until no
//! generator produces a new or changed task, or `max_tasks` is hit (§4.4).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::capability::MatchStrategy;
use crate::config::RunConfig;
use crate::error::{ConfigError, ControllerError, EngineError};
use crate::executor::Executor;
use crate::generator::Generator;
use crate::graph::TaskGraph;
use crate::match_index::{GeneratorPattern, MatchIndex};
use crate::store::StateStoreDal;
use crate::task::{Task, TaskStatus};

/// Result of one `TaskMerger` comparison (§4.4).
#[derive(Debug, PartialEq, Eq)]
enum MergeOutcome {
    Add,
    Skip,
    Update,
    Conflict,
}

/// Summary of a completed reactive loop, surfaced to the session for exit
/// code computation (§6).
#[derive(Debug, Default)]
pub struct ControllerOutcome {
    pub converged: bool,
    pub hit_limit: bool,
    pub regenerations: usize,
    /// Every task that finished DONE this session, in completion order,
    /// spanning all drain passes — the order `executor::run_teardowns`
    /// replays in reverse once the loop below returns.
    pub completed_order: Vec<String>,
}

/// Registers every known generator's declared input patterns into the match
/// index's generator side, so a later published key can be routed back to
/// the generators that should react to it.
pub fn register_generators(match_index: &mut MatchIndex, generators: &[Arc<dyn Generator>]) {
    for generator in generators {
        for (key, strategy) in generator.input_pattern_keys() {
            let matcher = match strategy {
                MatchStrategy::Custom => {
                    let generator = Arc::clone(generator);
                    Some(Arc::new(move |k: &str| generator.matches(k))
                        as Arc<dyn Fn(&str) -> bool + Send + Sync>)
                }
                _ => None,
            };
            match_index.register_generator_pattern(
                GeneratorPattern {
                    generator_id: generator.id().to_string(),
                    key,
                    strategy,
                },
                matcher,
            );
        }
    }
}

fn merge_task(graph: &mut TaskGraph, match_index: &mut MatchIndex, task: Task) -> Result<MergeOutcome, ConfigError> {
    let name = task.name().to_string();
    let Some(existing) = graph.get(&name) else {
        for target in task.targets() {
            match_index.register(target, &name);
        }
        graph.admit(task)?;
        return Ok(MergeOutcome::Add);
    };

    if existing.canonical_signature() == task.canonical_signature() {
        return Ok(MergeOutcome::Skip);
    }

    match graph.status(&name) {
        Some(TaskStatus::Done) | Some(TaskStatus::Running) => Ok(MergeOutcome::Conflict),
        _ => {
            for target in task.targets() {
                match_index.register(target, &name);
            }
            graph.replace(task)?;
            Ok(MergeOutcome::Update)
        }
    }
}

/// Runs generators' initial task sets, then drives executor/regeneration
/// passes to a fixed point or `max_tasks`.
pub async fn run(
    graph: &mut TaskGraph,
    match_index: &mut MatchIndex,
    store: &StateStoreDal,
    generators: &[Arc<dyn Generator>],
    config: &RunConfig,
) -> Result<ControllerOutcome, EngineError> {
    register_generators(match_index, generators);
    let by_id: HashMap<&str, &Arc<dyn Generator>> =
        generators.iter().map(|g| (g.id(), g)).collect();

    let mut outcome = ControllerOutcome::default();

    for generator in generators {
        for task in generator.generate().await {
            admit_checked(graph, match_index, task, config.max_tasks, &mut outcome)?;
        }
        if outcome.hit_limit {
            return Ok(outcome);
        }
    }

    loop {
        graph.validate()?;

        let published = {
            let mut executor = Executor::new(store, match_index, &mut outcome.completed_order)
                .with_concurrency(config.parallel, config.max_concurrent_tasks);
            executor.drain(graph).await?
        };

        let mut affected: HashSet<String> = HashSet::new();
        for key in &published {
            affected.extend(match_index.affected_generators(key));
        }

        if affected.is_empty() {
            outcome.converged = true;
            break;
        }

        let mut any_change = false;
        for gen_id in affected {
            outcome.regenerations += 1;
            let Some(generator) = by_id.get(gen_id.as_str()) else {
                warn!(generator = %gen_id, "affected generator id not registered");
                continue;
            };
            for task in generator.generate().await {
                let changed = admit_checked(graph, match_index, task, config.max_tasks, &mut outcome)?;
                any_change |= changed;
            }
            if outcome.hit_limit {
                return Ok(outcome);
            }
        }

        if !any_change {
            outcome.converged = true;
            break;
        }
    }

    Ok(outcome)
}

fn admit_checked(
    graph: &mut TaskGraph,
    match_index: &mut MatchIndex,
    task: Task,
    max_tasks: Option<usize>,
    outcome: &mut ControllerOutcome,
) -> Result<bool, EngineError> {
    if let Some(limit) = max_tasks {
        if !graph.contains(task.name()) && graph.len() >= limit {
            outcome.hit_limit = true;
            let err = ControllerError {
                admitted: graph.len(),
                limit,
            };
            warn!(%err, "max_tasks exceeded, stopping before convergence");
            return Ok(false);
        }
    }
    match merge_task(graph, match_index, task)? {
        MergeOutcome::Add | MergeOutcome::Update => Ok(true),
        MergeOutcome::Skip => Ok(false),
        MergeOutcome::Conflict => {
            warn!("task merge conflict: keeping running/finished definition");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Action, ActionOutcome};
    use async_trait::async_trait;

    struct OneShot;

    #[async_trait]
    impl Generator for OneShot {
        fn id(&self) -> &str {
            "one-shot"
        }
        fn input_pattern_keys(&self) -> Vec<(String, MatchStrategy)> {
            vec![]
        }
        async fn generate(&self) -> Vec<Task> {
            vec![Task::builder("emitted")
                .action(Action::callable("a", |_| ActionOutcome::ok()))
                .build()
                .unwrap()]
        }
    }

    #[tokio::test]
    async fn converges_when_regeneration_adds_nothing_new() {
        crate::init_test_logging();
        let store = StateStoreDal::new(crate::store::Database::in_memory());
        let mut graph = TaskGraph::new();
        let mut match_index = MatchIndex::new();
        let generators: Vec<Arc<dyn Generator>> = vec![Arc::new(OneShot)];

        let outcome = run(&mut graph, &mut match_index, &store, &generators, &RunConfig::default())
            .await
            .unwrap();

        assert!(outcome.converged);
        assert!(!outcome.hit_limit);
        assert_eq!(graph.status("emitted"), Some(TaskStatus::Done));
    }

    #[tokio::test]
    async fn max_tasks_bound_stops_before_convergence() {
        crate::init_test_logging();
        struct EverGrowing {
            counter: std::sync::atomic::AtomicUsize,
        }

        #[async_trait]
        impl Generator for EverGrowing {
            fn id(&self) -> &str {
                "ever-growing"
            }
            fn input_pattern_keys(&self) -> Vec<(String, MatchStrategy)> {
                vec![("/grown/".to_string(), MatchStrategy::Prefix)]
            }
            async fn generate(&self) -> Vec<Task> {
                let n = self
                    .counter
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                vec![Task::builder(format!("grow:{n}"))
                    .target(Arc::new(crate::kinds::FileTarget::new(format!(
                        "/grown/{n}"
                    ))))
                    .action(Action::callable("a", |_| ActionOutcome::ok()))
                    .build()
                    .unwrap()]
            }
        }

        let store = StateStoreDal::new(crate::store::Database::in_memory());
        let mut graph = TaskGraph::new();
        let mut match_index = MatchIndex::new();
        let generators: Vec<Arc<dyn Generator>> = vec![Arc::new(EverGrowing {
            counter: std::sync::atomic::AtomicUsize::new(0),
        })];

        let outcome = run(
            &mut graph,
            &mut match_index,
            &store,
            &generators,
            &RunConfig::default().with_max_tasks(5),
        )
        .await
        .unwrap();

        assert!(outcome.hit_limit);
        assert!(!outcome.converged);
        assert!(graph.len() <= 6);
    }
}
