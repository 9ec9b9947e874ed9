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

//! Built-in dependency/target kinds.
//!
//! Only local files, directory prefixes, and task references are shipped
//! here. Remote-object adapters are an out-of-scope front-end concern; a
//! downstream crate can implement [`crate::capability::Dependency`] for its
//! own resource kinds exactly as these do.

mod file;
mod task_ref;

pub use file::{FileDependency, FileTarget, PrefixTarget};
pub use task_ref::TaskRefDependency;
