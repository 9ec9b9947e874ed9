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

//! Run-scoped configuration, the one thing a caller hands in before a
//! [`crate::session::Session`] starts.

use std::path::PathBuf;

use crate::store::StateStoreDal;

/// Configuration for a single `run()` invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Safety bound on total admitted tasks (§4.4 step 5). `None` means
    /// unbounded.
    pub max_tasks: Option<usize>,

    /// When true, the `parallel` feature's concurrent executor is used;
    /// otherwise tasks run strictly one at a time (§5).
    pub parallel: bool,

    /// Path to the persisted state store's SQLite file (§6 "File location
    /// is configurable; default is a single file in the working directory").
    pub state_store_path: PathBuf,

    /// Upper bound on concurrently running tasks when `parallel` is set.
    pub max_concurrent_tasks: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_tasks: None,
            parallel: false,
            state_store_path: StateStoreDal::default_path(),
            max_concurrent_tasks: 4,
        }
    }
}

impl RunConfig {
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    pub fn with_state_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_store_path = path.into();
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded_and_sequential() {
        crate::init_test_logging();
        let config = RunConfig::default();
        assert_eq!(config.max_tasks, None);
        assert!(!config.parallel);
    }
}
