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

//! # treadle
//!
//! An incremental task automation engine: dependency-ordered execution with
//! content-addressed up-to-date checks and reactive task generation.
//!
//! `treadle` drives user-declared [`Task`]s in dependency order, checks
//! whether each one is already up to date against its declared
//! [`capability::Dependency`]/[`capability::Target`] set before running its
//! actions, and — through the [`generator::Generator`] contract — asks for
//! new work whenever a task's outputs match another generator's declared
//! input patterns. A [`session::Session`] owns the state store, match index,
//! and task graph for one `run()` invocation and reports a
//! [`session::RunOutcome`] an outer driver can turn into a process exit
//! code.
//!
//! What this crate does *not* do: parse a declarative task-definition
//! surface, provide built-in remote-object dependency kinds, or act as a
//! command-line front end. Those are external collaborators that talk to
//! the core only through the traits re-exported below.

pub mod capability;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod generator;
pub mod graph;
pub mod kinds;
pub mod match_index;
pub mod session;
pub mod store;
pub mod task;
pub mod uptodate;
pub mod values;

pub use capability::{Dependency, MatchStrategy, Target, Witness};
pub use config::RunConfig;
pub use controller::ControllerOutcome;
pub use error::{ActionError, CommitError, ConfigError, ControllerError, DependencyError, EngineError};
pub use generator::Generator;
pub use graph::TaskGraph;
pub use session::{RunOutcome, Session};
pub use task::{
    Action, ActionContext, ActionOutcome, GetargsSpec, PredicateContext, PredicateResult, Task,
    TaskBuilder, TaskStatus, UpToDateCheck, UpToDatePredicate,
};
pub use values::ValueMap;

/// Initializes a `tracing-subscriber` `EnvFilter` subscriber for test
/// output. Safe to call more than once per process. `#[cfg(test)]`-gated,
/// so only this crate's own unit tests can reach it — integration tests
/// under `tests/` are a separate compilation unit and set up their own
/// logging if they need it.
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
