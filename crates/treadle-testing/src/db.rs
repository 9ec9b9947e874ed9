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

//! Database-backed test helpers (`db` feature): an in-memory `Session` plus
//! a scratch directory for file-dependency tests, so a consumer's test
//! suite never has to reason about `RunConfig::state_store_path` or clean
//! up temp files itself.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use treadle::store::Database;
use treadle::{RunConfig, Session};

/// An in-memory-backed `Session` plus a scratch directory for any
/// file-dependency/target fixtures a test needs, torn down together when
/// dropped.
pub struct TestSession {
    pub session: Session,
    scratch: TempDir,
}

impl TestSession {
    /// Builds a `Session` over an in-memory SQLite state store — nothing
    /// touches disk for the store itself.
    pub fn new() -> Self {
        let scratch = TempDir::new().expect("failed to create scratch directory");
        let session = Session::with_database(RunConfig::default(), Database::in_memory());
        Self { session, scratch }
    }

    /// Path to the scratch directory, for constructing `FileDependency`/
    /// `FileTarget` fixtures that need a real path on disk.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// A path under the scratch directory, not yet created.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.scratch.path().join(name)
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}
