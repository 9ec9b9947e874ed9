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

//! Scenario 2: "Compile chain" — a generator pattern `src/<m>.c` ->
//! `build/<m>.o`. Two source files compile to DONE; overwriting one source
//! file re-runs only its own compile task on the next session.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use treadle::capability::MatchStrategy;
use treadle::kinds::{FileDependency, FileTarget};
use treadle::store::Database;
use treadle::task::{Action, ActionOutcome, Task, UpToDateCheck};
use treadle::{Generator, RunConfig, Session};

struct CompileGenerator {
    src_dir: PathBuf,
    build_dir: PathBuf,
}

#[async_trait]
impl Generator for CompileGenerator {
    fn id(&self) -> &str {
        "compile"
    }

    fn input_pattern_keys(&self) -> Vec<(String, MatchStrategy)> {
        vec![(self.src_dir.to_string_lossy().to_string() + "/", MatchStrategy::Prefix)]
    }

    async fn generate(&self) -> Vec<Task> {
        let mut tasks = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.src_dir) else {
            return tasks;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("c") {
                continue;
            }
            let module = path.file_stem().unwrap().to_string_lossy().to_string();
            let src_path = path.clone();
            let obj_path = self.build_dir.join(format!("{module}.o"));
            let write_path = obj_path.clone();

            tasks.push(
                Task::builder(format!("compile:{module}"))
                    .uptodate(UpToDateCheck::Const(true))
                    .dependency(Box::new(FileDependency::new(src_path.clone())))
                    .target(Arc::new(FileTarget::new(obj_path.to_string_lossy().to_string())))
                    .action(Action::callable("compile", move |_| {
                        let source = std::fs::read_to_string(&src_path).unwrap();
                        std::fs::write(&write_path, format!("compiled:{source}")).unwrap();
                        ActionOutcome::ok()
                    }))
                    .build()
                    .unwrap(),
            );
        }
        tasks
    }
}

#[tokio::test]
async fn unchanged_source_skips_but_touched_source_recompiles() {
    let dir = tempfile::tempdir().unwrap();
    let src_dir = dir.path().join("src");
    let build_dir = dir.path().join("build");
    std::fs::create_dir_all(&src_dir).unwrap();
    std::fs::create_dir_all(&build_dir).unwrap();
    std::fs::write(src_dir.join("a.c"), "int a;").unwrap();
    std::fs::write(src_dir.join("b.c"), "int b;").unwrap();

    let store_path = dir.path().join("state.sqlite3");
    let config = RunConfig::default().with_state_store_path(store_path.clone());

    let generator = || -> Vec<std::sync::Arc<dyn Generator>> {
        vec![std::sync::Arc::new(CompileGenerator {
            src_dir: src_dir.clone(),
            build_dir: build_dir.clone(),
        })]
    };

    let session = Session::with_database(config.clone(), Database::open(&store_path));
    let outcome = session.run(generator()).await.unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert!(build_dir.join("a.o").exists());
    assert!(build_dir.join("b.o").exists());

    std::fs::write(src_dir.join("a.c"), "int a; /* changed */").unwrap();

    let session2 = Session::with_database(config, Database::open(&store_path));
    let outcome2 = session2.run(generator()).await.unwrap();
    assert_eq!(outcome2.exit_code(), 0);

    let recompiled = std::fs::read_to_string(build_dir.join("a.o")).unwrap();
    assert!(recompiled.contains("changed"));
}
