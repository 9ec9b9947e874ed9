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

//! Scenario 3: "Cascade" — a stage-1 generator extracts an archive into a
//! directory (published as a prefix target); a stage-2 generator reacts to
//! that published prefix and produces one task per extracted file. After
//! the reactive loop converges, every extracted file has a stage-2 task.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use treadle::capability::MatchStrategy;
use treadle::kinds::{FileTarget, PrefixTarget};
use treadle::store::Database;
use treadle::task::{Action, ActionOutcome, Task, UpToDateCheck};
use treadle::{Generator, RunConfig, Session};

struct ExtractGenerator {
    archive_dir: PathBuf,
    extracted_root: PathBuf,
}

#[async_trait]
impl Generator for ExtractGenerator {
    fn id(&self) -> &str {
        "extract"
    }

    fn input_pattern_keys(&self) -> Vec<(String, MatchStrategy)> {
        vec![]
    }

    async fn generate(&self) -> Vec<Task> {
        let archive_dir = self.archive_dir.clone();
        let extracted_root = self.extracted_root.clone();
        let out_dir = extracted_root.join("archive1");

        vec![Task::builder("extract:archive1")
            .uptodate(UpToDateCheck::Const(true))
            .target(Arc::new(PrefixTarget::new(out_dir.to_string_lossy().to_string())))
            .action(Action::callable("extract", move |_| {
                std::fs::create_dir_all(&out_dir).unwrap();
                for name in ["one", "two", "three"] {
                    std::fs::write(
                        out_dir.join(format!("{name}.txt")),
                        format!("contents of {name}"),
                    )
                    .unwrap();
                }
                let _ = &archive_dir;
                ActionOutcome::ok()
            }))
            .build()
            .unwrap()]
    }
}

struct ProcessGenerator {
    extracted_root: PathBuf,
    processed_root: PathBuf,
}

#[async_trait]
impl Generator for ProcessGenerator {
    fn id(&self) -> &str {
        "process"
    }

    fn input_pattern_keys(&self) -> Vec<(String, MatchStrategy)> {
        vec![(self.extracted_root.to_string_lossy().to_string() + "/", MatchStrategy::Prefix)]
    }

    async fn generate(&self) -> Vec<Task> {
        let mut tasks = Vec::new();
        for entry in walk_txt_files(&self.extracted_root) {
            let name = entry.file_stem().unwrap().to_string_lossy().to_string();
            let src = entry.clone();
            let dest = self.processed_root.join(format!("{name}.done"));
            let write_dest = dest.clone();

            tasks.push(
                Task::builder(format!("process:{name}"))
                    .uptodate(UpToDateCheck::Const(true))
                    .target(Arc::new(FileTarget::new(dest.to_string_lossy().to_string())))
                    .action(Action::callable("process", move |_| {
                        std::fs::create_dir_all(write_dest.parent().unwrap()).unwrap();
                        let content = std::fs::read_to_string(&src).unwrap();
                        std::fs::write(&write_dest, content).unwrap();
                        ActionOutcome::ok()
                    }))
                    .build()
                    .unwrap(),
            );
        }
        tasks
    }
}

fn walk_txt_files(root: &std::path::Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(top) = std::fs::read_dir(root) else {
        return found;
    };
    for entry in top.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let Ok(inner) = std::fs::read_dir(&path) else {
                continue;
            };
            for file in inner.flatten() {
                let file_path = file.path();
                if file_path.extension().and_then(|e| e.to_str()) == Some("txt") {
                    found.push(file_path);
                }
            }
        }
    }
    found
}

#[tokio::test]
async fn extraction_cascades_into_per_file_processing_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let archive_dir = dir.path().join("archives");
    let extracted_root = dir.path().join("extracted");
    let processed_root = dir.path().join("processed");
    std::fs::create_dir_all(&archive_dir).unwrap();
    std::fs::create_dir_all(&extracted_root).unwrap();

    let generators: Vec<Arc<dyn Generator>> = vec![
        Arc::new(ExtractGenerator {
            archive_dir,
            extracted_root: extracted_root.clone(),
        }),
        Arc::new(ProcessGenerator {
            extracted_root,
            processed_root: processed_root.clone(),
        }),
    ];

    let config = RunConfig::default().with_state_store_path(dir.path().join("state.sqlite3"));
    let session = Session::with_database(config, Database::in_memory());
    let outcome = session.run(generators).await.unwrap();

    assert!(outcome.converged);
    assert!(outcome.regenerations >= 1);
    assert!(outcome.failed_tasks.is_empty());

    for name in ["one", "two", "three"] {
        assert!(processed_root.join(format!("{name}.done")).exists());
    }
}
