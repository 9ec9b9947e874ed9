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

//! Local filesystem dependency/target kinds.

use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::capability::{Dependency, MatchStrategy, Target, Witness};
use crate::error::DependencyError;

/// A dependency on a single local file, keyed by its absolute path.
///
/// The witness combines size, modification time, and a content hash so that
/// a touch with unchanged bytes still compares equal — `modified_since`
/// only reports a change when the actual content differs.
pub struct FileDependency {
    path: PathBuf,
    key: String,
}

impl FileDependency {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = path.to_string_lossy().into_owned();
        Self { path, key }
    }

    fn fingerprint(&self) -> Result<Witness, DependencyError> {
        let err = |reason: String| DependencyError {
            key: self.key.clone(),
            reason,
        };
        let metadata = std::fs::metadata(&self.path).map_err(|e| err(e.to_string()))?;
        let mut file = std::fs::File::open(&self.path).map_err(|e| err(e.to_string()))?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf).map_err(|e| err(e.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        Ok(Witness::new(format!(
            "{}:{}",
            metadata.len(),
            hex::encode(digest)
        )))
    }
}

#[async_trait]
impl Dependency for FileDependency {
    fn key(&self) -> &str {
        &self.key
    }

    async fn exists(&self) -> Result<bool, DependencyError> {
        Ok(self.path.exists())
    }

    async fn witness(&self) -> Result<Witness, DependencyError> {
        self.fingerprint()
    }

    fn match_strategy(&self) -> MatchStrategy {
        MatchStrategy::Exact
    }
}

/// A target that is a single local file.
pub struct FileTarget {
    path: PathBuf,
    key: String,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = path.to_string_lossy().into_owned();
        Self { path, key }
    }
}

impl Target for FileTarget {
    fn key(&self) -> &str {
        &self.key
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn match_strategy(&self) -> MatchStrategy {
        MatchStrategy::Exact
    }
}

/// A target that is a directory prefix; its key must end in `/` per the
/// dependency-key grammar.
pub struct PrefixTarget {
    key: String,
}

impl PrefixTarget {
    pub fn new(mut prefix: String) -> Self {
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { key: prefix }
    }
}

impl Target for PrefixTarget {
    fn key(&self) -> &str {
        &self.key
    }

    fn exists(&self) -> bool {
        std::path::Path::new(&self.key).is_dir()
    }

    fn match_strategy(&self) -> MatchStrategy {
        MatchStrategy::Prefix
    }
}
