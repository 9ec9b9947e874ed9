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

//! Scenario 4: "Getargs" — a producer task saves a `rev` value; a consumer
//! reads it via `getarg`. An unrelated second run SKIPS both. A producer
//! re-run (triggered by a changed file dependency) re-triggers the consumer
//! even though the consumer has no file dependency of its own.

use std::sync::{Arc, Mutex};

use treadle::kinds::FileDependency;
use treadle::store::Database;
use treadle::task::{Action, ActionOutcome, Task};
use treadle::values::ValueMap;
use treadle::{RunConfig, Session};

fn producer_task(version_path: &std::path::Path) -> Task {
    let path = version_path.to_path_buf();
    Task::builder("revision")
        .dependency(Box::new(FileDependency::new(path.clone())))
        .action(Action::callable("read-version", move |_| {
            let rev = std::fs::read_to_string(&path).unwrap();
            let mut values = ValueMap::new();
            values.insert("rev", serde_json::Value::String(rev));
            ActionOutcome::ok_with(values)
        }))
        .build()
        .unwrap()
}

fn consumer_task(seen: Arc<Mutex<Vec<String>>>) -> Task {
    Task::builder("report")
        .getarg("rev", "revision", Some("rev".to_string()))
        .action(Action::callable("report", move |ctx| {
            let rev = ctx.resolved_args.get("rev").and_then(|v| v.as_str()).unwrap_or("");
            seen.lock().unwrap().push(rev.to_string());
            ActionOutcome::ok()
        }))
        .build()
        .unwrap()
}

#[tokio::test]
async fn consumer_reruns_when_producer_value_changes_even_with_no_own_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let version_path = dir.path().join("VERSION");
    let store_path = dir.path().join("state.sqlite3");
    std::fs::write(&version_path, "r1").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = RunConfig::default().with_state_store_path(store_path.clone());

    // Run 1: version file is new -> producer runs, consumer observes "r1".
    let mut session = Session::with_database(config.clone(), Database::open(&store_path));
    session.admit(producer_task(&version_path)).unwrap();
    session.admit(consumer_task(seen.clone())).unwrap();
    let outcome = session.run(Vec::new()).await.unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(*seen.lock().unwrap(), vec!["r1".to_string()]);

    // Run 2: nothing changed -> both SKIP, consumer's action does not re-run.
    let mut session2 = Session::with_database(config.clone(), Database::open(&store_path));
    session2.admit(producer_task(&version_path)).unwrap();
    session2.admit(consumer_task(seen.clone())).unwrap();
    let outcome2 = session2.run(Vec::new()).await.unwrap();
    assert_eq!(outcome2.exit_code(), 0);
    assert_eq!(seen.lock().unwrap().len(), 1);

    // Run 3: the version file changes -> producer re-runs, and the consumer
    // re-runs too even though it declares no file dependency of its own.
    std::fs::write(&version_path, "r2").unwrap();
    let mut session3 = Session::with_database(config, Database::open(&store_path));
    session3.admit(producer_task(&version_path)).unwrap();
    session3.admit(consumer_task(seen.clone())).unwrap();
    let outcome3 = session3.run(Vec::new()).await.unwrap();
    assert_eq!(outcome3.exit_code(), 0);
    assert_eq!(*seen.lock().unwrap(), vec!["r1".to_string(), "r2".to_string()]);
}
