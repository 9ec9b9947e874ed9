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

//! The `task:<name>` dependency kind, wrapping another task's completion.
//!
//! This kind is what the executor synthesizes for a `task_dep` edge and for
//! the implicit producer edge `getargs` adds to a consumer's setup-tasks. Its
//! witness is the producer's last-success timestamp as recorded in the state
//! store, so a re-run of the producer (even one that ends up SKIPPED with an
//! unchanged timestamp) does not spuriously change the consumer's view.

use async_trait::async_trait;

use crate::capability::{Dependency, MatchStrategy, Witness};
use crate::error::DependencyError;

pub struct TaskRefDependency {
    task_name: String,
    key: String,
    /// Last-success timestamp of the referenced task, as an RFC3339 string,
    /// supplied by whoever resolves this dependency (the executor, reading
    /// the state store) since this kind has no I/O of its own.
    current_witness: Witness,
    done: bool,
}

impl TaskRefDependency {
    pub fn new(task_name: impl Into<String>, last_success: Option<&str>, done: bool) -> Self {
        let task_name = task_name.into();
        let key = format!("task:{}", task_name);
        let current_witness = Witness::new(last_success.unwrap_or("").to_string());
        Self {
            task_name,
            key,
            current_witness,
            done,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }
}

#[async_trait]
impl Dependency for TaskRefDependency {
    fn key(&self) -> &str {
        &self.key
    }

    async fn exists(&self) -> Result<bool, DependencyError> {
        Ok(self.done)
    }

    async fn witness(&self) -> Result<Witness, DependencyError> {
        Ok(self.current_witness.clone())
    }

    fn match_strategy(&self) -> MatchStrategy {
        MatchStrategy::Exact
    }
}
