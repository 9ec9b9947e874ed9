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

//! # Dependency and target capability contracts
//!
//! The source models resource kinds as subclasses of an abstract base; here
//! that is re-architected as a tagged sum over a shared capability contract
//! so that new kinds can be registered without touching the core. A kind
//! just needs to implement [`Dependency`] and/or [`Target`]; the up-to-date
//! engine and match index only ever see the trait objects.

use async_trait::async_trait;

use crate::error::DependencyError;

/// How a dependency or target key is compared against another key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    Exact,
    Prefix,
    Custom,
}

/// Opaque comparable value describing the present state of a dependency.
///
/// Two witnesses are equal if and only if the underlying resource has not
/// changed in any way the kind cares about; the engine never inspects the
/// contents, only compares them with `PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Witness(pub String);

impl Witness {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Uniform contract any dependency kind must satisfy.
#[async_trait]
pub trait Dependency: Send + Sync {
    /// Stable string identity, e.g. an absolute path or `task:<name>`.
    fn key(&self) -> &str;

    /// Whether the underlying resource currently exists.
    async fn exists(&self) -> Result<bool, DependencyError>;

    /// Opaque value describing the resource's current state.
    async fn witness(&self) -> Result<Witness, DependencyError>;

    /// Whether the resource has changed since `stored`.
    ///
    /// The default implementation re-fetches the current witness and
    /// compares by equality; kinds with a cheaper test may override this.
    async fn modified_since(&self, stored: &Witness) -> Result<bool, DependencyError> {
        Ok(&self.witness().await? != stored)
    }

    fn match_strategy(&self) -> MatchStrategy;

    /// Only consulted when `match_strategy()` is [`MatchStrategy::Custom`].
    fn matches(&self, _other_key: &str) -> bool {
        false
    }
}

/// Uniform contract any target kind must satisfy.
pub trait Target: Send + Sync {
    fn key(&self) -> &str;

    fn exists(&self) -> bool;

    fn match_strategy(&self) -> MatchStrategy;

    /// Only consulted when `match_strategy()` is [`MatchStrategy::Custom`].
    fn matches(&self, _dep_key: &str) -> bool {
        false
    }
}
