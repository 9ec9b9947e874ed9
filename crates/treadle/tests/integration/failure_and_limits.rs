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

//! Scenarios 5 and 6: "Failure containment" (a failure propagates down a
//! `task_dep` chain but never sideways to an unrelated task) and "Max-tasks
//! bound" (an ever-regenerating generator is stopped before it converges).

use std::sync::Arc;

use async_trait::async_trait;
use treadle::capability::MatchStrategy;
use treadle::kinds::FileTarget;
use treadle::store::Database;
use treadle::task::{Action, ActionOutcome, Task};
use treadle::{Generator, RunConfig, Session};

#[tokio::test]
async fn failure_propagates_down_task_dep_chain_but_not_to_independent_task() {
    let mut session = Session::with_database(RunConfig::default(), Database::in_memory());

    session
        .admit(
            Task::builder("x")
                .action(Action::callable("x", |_| ActionOutcome::ok()))
                .build()
                .unwrap(),
        )
        .unwrap();
    session
        .admit(
            Task::builder("y")
                .task_dep("x")
                .action(Action::callable("y", |_| ActionOutcome::fail("boom")))
                .build()
                .unwrap(),
        )
        .unwrap();
    session
        .admit(
            Task::builder("z")
                .task_dep("y")
                .action(Action::callable("z", |_| ActionOutcome::ok()))
                .build()
                .unwrap(),
        )
        .unwrap();
    session
        .admit(
            Task::builder("w")
                .action(Action::callable("w", |_| ActionOutcome::ok()))
                .build()
                .unwrap(),
        )
        .unwrap();

    let outcome = session.run(Vec::new()).await.unwrap();

    assert_eq!(outcome.exit_code(), 1);
    let mut failed = outcome.failed_tasks.clone();
    failed.sort();
    assert_eq!(failed, vec!["y".to_string(), "z".to_string()]);
}

struct EverGrowingGenerator {
    root: std::path::PathBuf,
    counter: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl Generator for EverGrowingGenerator {
    fn id(&self) -> &str {
        "ever-growing"
    }

    fn input_pattern_keys(&self) -> Vec<(String, MatchStrategy)> {
        vec![(self.root.to_string_lossy().to_string() + "/", MatchStrategy::Prefix)]
    }

    async fn generate(&self) -> Vec<Task> {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let target_path = self.root.join(format!("item-{n}"));
        vec![Task::builder(format!("grow:{n}"))
            .target(Arc::new(FileTarget::new(target_path.to_string_lossy().to_string())))
            .action(Action::callable("touch", move |_| {
                std::fs::write(&target_path, b"x").unwrap();
                ActionOutcome::ok()
            }))
            .build()
            .unwrap()]
    }
}

#[tokio::test]
async fn max_tasks_bound_stops_an_ever_regenerating_generator_before_convergence() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::default()
        .with_state_store_path(dir.path().join("state.sqlite3"))
        .with_max_tasks(5);
    let session = Session::with_database(config, Database::in_memory());

    let generators: Vec<Arc<dyn Generator>> = vec![Arc::new(EverGrowingGenerator {
        root: dir.path().to_path_buf(),
        counter: std::sync::atomic::AtomicUsize::new(0),
    })];

    let outcome = session.run(generators).await.unwrap();

    assert!(outcome.hit_limit);
    assert!(!outcome.converged);
    assert_eq!(outcome.exit_code(), 1);
}
