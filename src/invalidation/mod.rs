//! Invalidation Module
//!
//! Removes cached data independently of normal reads:
//! - by key, cascading to everything that depends on it
//! - by tag, deleting every member of the tag
//! - by version, orphaning old entries without deleting them
//!
//! Tag and dependency sets hold rendered logical keys (bases), so they keep
//! pointing at the right data after a version bump.

mod graph;
mod versions;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::codec::{CacheKey, KeyCodec};
use crate::error::{CacheError, Result};
use crate::metrics::MetricsCollector;
use crate::store::{BatchOp, BatchReply, CacheStore};

pub use versions::VersionRegistry;

// == Invalidation Warning ==
/// Non-fatal conditions met while invalidating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvalidationWarning {
    /// The dependency graph loops back on itself along `path`
    DependencyCycle { path: Vec<String> },
    /// Traversal stopped before reaching `key`
    DepthExceeded { key: String, max_depth: usize },
}

impl fmt::Display for InvalidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationWarning::DependencyCycle { path } => {
                write!(f, "dependency cycle: {}", path.join(" -> "))
            }
            InvalidationWarning::DepthExceeded { key, max_depth } => {
                write!(f, "max dependency depth {} exceeded at {}", max_depth, key)
            }
        }
    }
}

// == Invalidation Report ==
/// What a key invalidation touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Bases invalidated, in traversal order, each at most once
    pub invalidated: Vec<String>,
    /// Cycles and depth overruns met on the way
    pub warnings: Vec<InvalidationWarning>,
    /// True if traversal stopped at the depth limit
    pub truncated: bool,
}

// == Invalidation Manager ==
/// Tag, version and dependency-graph invalidation over the shared store.
#[derive(Clone)]
pub struct InvalidationManager {
    store: Arc<dyn CacheStore>,
    codec: KeyCodec,
    versions: VersionRegistry,
    metrics: Arc<MetricsCollector>,
    max_depth: usize,
}

impl InvalidationManager {
    // == Constructor ==
    /// Creates a manager.
    ///
    /// # Arguments
    /// * `max_depth` - Deepest dependency level a cascade may reach
    pub fn new(
        store: Arc<dyn CacheStore>,
        codec: KeyCodec,
        metrics: Arc<MetricsCollector>,
        max_depth: usize,
    ) -> Self {
        Self {
            versions: VersionRegistry::new(store.clone(), codec.clone()),
            store,
            codec,
            metrics,
            max_depth,
        }
    }

    pub fn versions(&self) -> &VersionRegistry {
        &self.versions
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // == Invalidate Key ==
    /// Deletes the current entry of `key` and of every key depending on it,
    /// transitively.
    ///
    /// Cycles and the depth limit produce warnings in the report, never errors.
    pub async fn invalidate_key(&self, key: &CacheKey) -> Result<InvalidationReport> {
        let base = self.codec.render(key)?;
        let report = graph::cascade(self, base).await?;

        self.metrics
            .record_invalidations(report.invalidated.len() as u64);
        info!(
            "Invalidated {} key(s) from '{}' ({} warning(s))",
            report.invalidated.len(),
            key,
            report.warnings.len()
        );
        Ok(report)
    }

    // == Invalidate Tag ==
    /// Deletes every entry carrying `tag`, then drops those entries from the
    /// tag.
    ///
    /// Only the members read at the start are removed; a key tagged while
    /// this runs keeps its membership. An empty or unknown tag is a no-op.
    /// Returns the number of entries that existed and were removed. If any
    /// delete fails the tag is kept so the invalidation can be retried.
    pub async fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        let tag_key = self.codec.tag_key(tag);
        let members = self.store.set_members(&tag_key).await?;
        if members.is_empty() {
            debug!("Tag '{}' has no members", tag);
            return Ok(0);
        }

        let mut deletes = Vec::with_capacity(members.len());
        for base in &members {
            deletes.push(BatchOp::Delete {
                key: self.versions.physical(base).await?,
            });
        }

        let mut removed = 0;
        for reply in self.store.batch(deletes).await {
            match reply {
                Ok(reply) if reply.flag() == Some(true) => removed += 1,
                Ok(_) => {}
                Err(err) => return Err(err),
            }
        }

        let untags = members
            .iter()
            .map(|base| BatchOp::SetRemove {
                key: tag_key.clone(),
                member: base.clone(),
            })
            .collect();
        for reply in self.store.batch(untags).await {
            reply?;
        }

        self.metrics.record_invalidations(members.len() as u64);
        info!(
            "Invalidated tag '{}': {} member(s), {} live entr(ies) removed",
            tag,
            members.len(),
            removed
        );
        Ok(removed)
    }

    // == Tagging ==
    /// Adds `key` to `tag`. Returns false if it was already a member.
    pub async fn tag(&self, key: &CacheKey, tag: &str) -> Result<bool> {
        let base = self.codec.render(key)?;
        self.store.set_add(&self.codec.tag_key(tag), &base).await
    }

    /// Removes `key` from `tag` without touching the entry.
    pub async fn untag(&self, key: &CacheKey, tag: &str) -> Result<bool> {
        let base = self.codec.render(key)?;
        self.store.set_remove(&self.codec.tag_key(tag), &base).await
    }

    /// Rendered keys currently carrying `tag`.
    pub async fn tag_members(&self, tag: &str) -> Result<Vec<String>> {
        self.store.set_members(&self.codec.tag_key(tag)).await
    }

    // == Dependencies ==
    /// Records that `dependent` must be invalidated whenever `depends_on` is.
    pub async fn add_dependency(&self, dependent: &CacheKey, depends_on: &CacheKey) -> Result<()> {
        let dependent = self.codec.render(dependent)?;
        let depends_on = self.codec.render(depends_on)?;
        if dependent == depends_on {
            return Err(CacheError::InvalidRequest(format!(
                "'{}' cannot depend on itself",
                dependent
            )));
        }

        let replies = self
            .store
            .batch(vec![
                BatchOp::SetAdd {
                    key: self.codec.dependents_key(&depends_on),
                    member: dependent.clone(),
                },
                BatchOp::SetAdd {
                    key: self.codec.dependencies_key(&dependent),
                    member: depends_on.clone(),
                },
            ])
            .await;
        for reply in replies {
            reply?;
        }

        debug!("Dependency added: '{}' -> '{}'", dependent, depends_on);
        Ok(())
    }

    /// Drops a dependency edge. Returns whether it existed.
    pub async fn remove_dependency(
        &self,
        dependent: &CacheKey,
        depends_on: &CacheKey,
    ) -> Result<bool> {
        let dependent = self.codec.render(dependent)?;
        let depends_on = self.codec.render(depends_on)?;

        let replies = self
            .store
            .batch(vec![
                BatchOp::SetRemove {
                    key: self.codec.dependents_key(&depends_on),
                    member: dependent.clone(),
                },
                BatchOp::SetRemove {
                    key: self.codec.dependencies_key(&dependent),
                    member: depends_on,
                },
            ])
            .await;

        let mut existed = false;
        for reply in replies {
            existed |= matches!(reply?, BatchReply::Flag(true));
        }
        Ok(existed)
    }

    /// Rendered keys that directly depend on `key`.
    pub async fn dependents_of(&self, key: &CacheKey) -> Result<Vec<String>> {
        let base = self.codec.render(key)?;
        self.dependents_of_base(&base).await
    }

    // == Versions ==
    /// Moves `key` to a new version. Entries under older versions are left to
    /// expire on their own TTL. Returns the new version.
    pub async fn bump_version(&self, key: &CacheKey) -> Result<u64> {
        let base = self.codec.render(key)?;
        let version = self.versions.bump(&base).await?;
        debug!("Version of '{}' bumped to {}", base, version);
        Ok(version)
    }

    // == Helpers ==
    async fn invalidate_base(&self, base: &str) -> Result<bool> {
        let physical = self.versions.physical(base).await?;
        self.store.delete(&physical).await
    }

    async fn dependents_of_base(&self, base: &str) -> Result<Vec<String>> {
        self.store
            .set_members(&self.codec.dependents_key(base))
            .await
    }
}
