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

//! # Prefix/exact match index
//!
//! Resolves a dependency key or a published target key to the tasks/generators
//! whose declared target/input-pattern matches it, honoring EXACT >
//! longest-PREFIX > CUSTOM priority (§4.2). Append-only for the session;
//! there is no removal API.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::capability::{MatchStrategy, Target};

/// A generator's declared input pattern, as handed to the index by the
/// controller when a generator is first registered (§4.5).
#[derive(Clone)]
pub struct GeneratorPattern {
    pub generator_id: String,
    pub key: String,
    pub strategy: MatchStrategy,
}

#[derive(Default)]
struct PrefixTrie {
    /// Segment-keyed trie node: children by path segment, and an owner if a
    /// prefix target terminates exactly at this node.
    children: HashMap<String, PrefixTrie>,
    owner: Option<String>,
}

impl PrefixTrie {
    fn insert(&mut self, prefix: &str, owner: String) {
        let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = self;
        for seg in segments {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.owner = Some(owner);
    }

    /// Longest-prefix match: walk segments of `key`, remembering the
    /// deepest node with an owner.
    fn find_longest(&self, key: &str) -> Option<String> {
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = self;
        let mut best = node.owner.clone();
        for seg in segments {
            match node.children.get(seg) {
                Some(child) => {
                    node = child;
                    if node.owner.is_some() {
                        best = node.owner.clone();
                    }
                }
                None => break,
            }
        }
        best
    }
}

/// Like [`PrefixTrie`] but for the generator bucket, where the same input
/// pattern key legally belongs to more than one generator (§4.5 — unlike
/// target keys, generator input patterns are not required to be disjoint) —
/// so each terminal node keeps every owner that registered there instead of
/// the last one winning.
#[derive(Default)]
struct GeneratorPrefixTrie {
    children: HashMap<String, GeneratorPrefixTrie>,
    owners: Vec<String>,
}

impl GeneratorPrefixTrie {
    fn insert(&mut self, prefix: &str, owner: String) {
        let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = self;
        for seg in segments {
            node = node.children.entry(seg.to_string()).or_default();
        }
        node.owners.push(owner);
    }

    /// Longest-prefix match: walk segments of `key`, remembering the owners
    /// of the deepest node that has any.
    fn find_longest(&self, key: &str) -> Vec<String> {
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = self;
        let mut best = node.owners.clone();
        for seg in segments {
            match node.children.get(seg) {
                Some(child) => {
                    node = child;
                    if !node.owners.is_empty() {
                        best = node.owners.clone();
                    }
                }
                None => break,
            }
        }
        best
    }
}

fn scheme_of(key: &str) -> Option<&str> {
    key.split_once("://").map(|(scheme, _)| scheme)
}

/// Cross-bucket isolation (§8): `s3://a/data/` must never match
/// `s3://b/data/x`. We compare the authority (the part before the first
/// `/` after `scheme://`) in addition to the path segments.
fn authority_of(key: &str) -> Option<&str> {
    let (_, rest) = key.split_once("://")?;
    Some(rest.split('/').next().unwrap_or(rest))
}

struct CustomEntry {
    owner: String,
    matches: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

/// Cross-bucket isolation (§8) is enforced structurally: every key is
/// namespaced by its scheme+authority (see [`MatchIndex::namespaced`])
/// before it ever reaches the exact map or prefix trie below, so two keys
/// from different buckets can never collide even if their path segments
/// coincide.
#[derive(Default)]
struct Bucket {
    exact: HashMap<String, String>,
    prefix: PrefixTrie,
    custom: Vec<CustomEntry>,
}

/// Mirrors [`Bucket`] but for generators, where an exact or prefix key can
/// legally have more than one owner.
#[derive(Default)]
struct GeneratorBucket {
    exact: HashMap<String, Vec<String>>,
    prefix: GeneratorPrefixTrie,
    custom: Vec<CustomEntry>,
}

/// Append-only index resolving producer/consumer edges.
pub struct MatchIndex {
    targets: Bucket,
    generators: GeneratorBucket,
}

impl MatchIndex {
    pub fn new() -> Self {
        Self {
            targets: Bucket::default(),
            generators: GeneratorBucket::default(),
        }
    }

    fn bucket_key(key: &str) -> String {
        match scheme_of(key) {
            Some(scheme) => format!("{}://{}", scheme, authority_of(key).unwrap_or("")),
            None => String::new(),
        }
    }

    /// Registers one task's target. Emits a diagnostic (and still proceeds,
    /// per the open-question resolution: exact wins) when an EXACT key falls
    /// inside another target's registered PREFIX.
    pub fn register(&mut self, target: &Arc<dyn Target>, owner_task_name: &str) {
        let key = target.key().to_string();
        match target.match_strategy() {
            MatchStrategy::Exact => {
                if let Some(existing) = self.targets.exact.get(&key) {
                    warn!(
                        key = %key,
                        existing_owner = %existing,
                        new_owner = %owner_task_name,
                        "duplicate exact target key"
                    );
                }
                if let Some(prefix_owner) = self.targets.prefix.find_longest(&Self::namespaced(&key)) {
                    warn!(
                        key = %key,
                        exact_owner = %owner_task_name,
                        prefix_owner = %prefix_owner,
                        "exact target key falls inside another task's prefix target; exact wins"
                    );
                }
                self.targets.exact.insert(
                    Self::namespaced(&key),
                    owner_task_name.to_string(),
                );
            }
            MatchStrategy::Prefix => {
                self.targets
                    .prefix
                    .insert(&Self::namespaced(&key), owner_task_name.to_string());
            }
            MatchStrategy::Custom => {
                let target = Arc::clone(target);
                self.targets.custom.push(CustomEntry {
                    owner: owner_task_name.to_string(),
                    matches: Arc::new(move |k| target.matches(k)),
                });
            }
        }
    }

    pub fn register_generator_pattern(&mut self, pattern: GeneratorPattern, matcher: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>) {
        match pattern.strategy {
            MatchStrategy::Exact => {
                self.generators
                    .exact
                    .entry(Self::namespaced(&pattern.key))
                    .or_default()
                    .push(pattern.generator_id);
            }
            MatchStrategy::Prefix => {
                self.generators
                    .prefix
                    .insert(&Self::namespaced(&pattern.key), pattern.generator_id);
            }
            MatchStrategy::Custom => {
                let matcher = matcher.unwrap_or_else(|| Arc::new(|_: &str| false));
                self.generators.custom.push(CustomEntry {
                    owner: pattern.generator_id,
                    matches: matcher,
                });
            }
        }
    }

    /// Namespaces a key by its bucket (scheme+authority) before insertion
    /// into the exact map / prefix trie, so cross-bucket keys never collide
    /// in the underlying maps even when their path segments coincide.
    fn namespaced(key: &str) -> String {
        format!("{}\u{0}{}", Self::bucket_key(key), key)
    }

    pub fn find_producer(&self, dep_key: &str) -> Option<String> {
        let namespaced = Self::namespaced(dep_key);
        if let Some(owner) = self.targets.exact.get(&namespaced) {
            return Some(owner.clone());
        }
        if let Some(owner) = self.targets.prefix.find_longest(&namespaced) {
            return Some(owner);
        }
        for entry in &self.targets.custom {
            if (entry.matches)(dep_key) {
                return Some(entry.owner.clone());
            }
        }
        None
    }

    pub fn affected_generators(&self, published_key: &str) -> Vec<String> {
        let mut result = Vec::new();
        let namespaced = Self::namespaced(published_key);
        if let Some(owners) = self.generators.exact.get(&namespaced) {
            result.extend(owners.iter().cloned());
            return result;
        }
        let prefix_owners = self.generators.prefix.find_longest(&namespaced);
        if !prefix_owners.is_empty() {
            result.extend(prefix_owners);
            return result;
        }
        for entry in &self.generators.custom {
            if (entry.matches)(published_key) {
                result.push(entry.owner.clone());
            }
        }
        result
    }
}

impl Default for MatchIndex {
    fn default() -> Self {
        Self::new()
    }
}
