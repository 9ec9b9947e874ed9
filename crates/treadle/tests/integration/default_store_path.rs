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

//! `Session::new` with a default `RunConfig` opens the same relative
//! `./.treadle/state.sqlite3` file for every caller in the process's working
//! directory. These tests exercise that shared file directly rather than
//! through an in-memory database, so they must not interleave with each
//! other.

use serial_test::serial;

use treadle::store::StateStoreDal;
use treadle::task::{Action, ActionOutcome, Task};
use treadle::{RunConfig, Session};

fn cleanup() {
    let _ = std::fs::remove_dir_all(StateStoreDal::default_path().parent().unwrap());
}

#[tokio::test]
#[serial]
async fn default_config_persists_witness_across_runs_at_the_shared_path() {
    cleanup();

    let mut first = Session::new(RunConfig::default());
    first
        .admit(
            Task::builder("build")
                .uptodate(treadle::task::UpToDateCheck::Const(false))
                .action(Action::callable("build", |_| ActionOutcome::ok()))
                .build()
                .unwrap(),
        )
        .unwrap();
    let outcome = first.run(Vec::new()).await.unwrap();
    assert_eq!(outcome.exit_code(), 0);

    assert!(StateStoreDal::default_path().exists());

    cleanup();
}

#[tokio::test]
#[serial]
async fn default_config_starts_clean_when_store_file_absent() {
    cleanup();

    let mut session = Session::new(RunConfig::default());
    session
        .admit(
            Task::builder("first-run")
                .action(Action::callable("first-run", |_| ActionOutcome::ok()))
                .build()
                .unwrap(),
        )
        .unwrap();
    let outcome = session.run(Vec::new()).await.unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.failed_tasks.is_empty());

    cleanup();
}
