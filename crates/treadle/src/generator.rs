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

//! # Generator contract
//!
//! The surface the reactive controller consumes to pull dynamically-produced
//! tasks (§4.5). How a generator is itself built — pattern DSLs, YAML
//! front-ends — is out of scope; the core only ever calls through this trait.

use async_trait::async_trait;

use crate::capability::MatchStrategy;
use crate::task::Task;

/// A producer of tasks from input-key patterns, invoked once at session
/// start and again whenever a published key matches one of its declared
/// patterns.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Stable identifier, used by the controller to de-duplicate regeneration
    /// requests within one fixed-point step (§4.5).
    fn id(&self) -> &str;

    /// Key patterns this generator's output depends on, registered into the
    /// match index's generator side.
    fn input_pattern_keys(&self) -> Vec<(String, MatchStrategy)>;

    /// Only consulted for patterns registered with [`MatchStrategy::Custom`].
    fn matches(&self, _key: &str) -> bool {
        false
    }

    /// Produces this generator's current task set. MUST be deterministic for
    /// a given external world, MAY return zero tasks, MUST terminate.
    async fn generate(&self) -> Vec<Task>;
}
