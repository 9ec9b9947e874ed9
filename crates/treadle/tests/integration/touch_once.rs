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

//! Scenario 1: "Touch-once" — a single task with a single file target and a
//! constant-true `uptodate` predicate. Run 1 must execute (target absent);
//! run 2, against the same on-disk state store, must SKIP.

use std::sync::Arc;

use treadle::kinds::FileTarget;
use treadle::store::Database;
use treadle::task::{Action, ActionOutcome, Task, UpToDateCheck};
use treadle::{RunConfig, Session};

fn build_task(target_path: &std::path::Path) -> Task {
    let path = target_path.to_path_buf();
    Task::builder("build")
        .uptodate(UpToDateCheck::Const(true))
        .target(Arc::new(FileTarget::new(target_path.to_string_lossy().to_string())))
        .action(Action::callable("write-out", move |_| {
            std::fs::write(&path, b"built").unwrap();
            ActionOutcome::ok()
        }))
        .build()
        .unwrap()
}

#[tokio::test]
async fn touch_once_runs_then_skips_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let target_path = dir.path().join("out.txt");
    let store_path = dir.path().join("state.sqlite3");

    let config = RunConfig::default().with_state_store_path(store_path.clone());
    let mut session = Session::with_database(config.clone(), Database::open(&store_path));
    session.admit(build_task(&target_path)).unwrap();
    let outcome = session.run(Vec::new()).await.unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert!(target_path.exists());

    let mut session2 = Session::with_database(config, Database::open(&store_path));
    session2.admit(build_task(&target_path)).unwrap();
    let outcome2 = session2.run(Vec::new()).await.unwrap();
    assert_eq!(outcome2.exit_code(), 0);
    assert!(outcome2.failed_tasks.is_empty());
}
