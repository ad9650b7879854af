//! Dependency traversal for cascading invalidation.
//!
//! Depth-first walk over "dependent" edges. Each traversal owns its visited
//! set and current path, so concurrent invalidations share no state. A node
//! already on the current path closes a cycle: it is reported and skipped.

use std::collections::HashSet;

use tracing::warn;

use crate::error::Result;
use crate::invalidation::{InvalidationManager, InvalidationReport, InvalidationWarning};

struct Frame {
    base: String,
    depth: usize,
    dependents: Vec<String>,
    next: usize,
}

/// Invalidates `root` and everything that transitively depends on it.
pub(super) async fn cascade(
    manager: &InvalidationManager,
    root: String,
) -> Result<InvalidationReport> {
    let mut report = InvalidationReport::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    manager.invalidate_base(&root).await?;
    report.invalidated.push(root.clone());
    visited.insert(root.clone());
    path.push(root.clone());
    stack.push(Frame {
        dependents: manager.dependents_of_base(&root).await?,
        base: root,
        depth: 0,
        next: 0,
    });

    while let Some(frame) = stack.last_mut() {
        if frame.next >= frame.dependents.len() {
            stack.pop();
            path.pop();
            continue;
        }

        let child = frame.dependents[frame.next].clone();
        frame.next += 1;
        let depth = frame.depth + 1;
        let parent = frame.base.clone();

        if let Some(start) = path.iter().position(|base| *base == child) {
            let mut cycle = path[start..].to_vec();
            cycle.push(child);
            warn!(
                "Dependency cycle detected: {} (check dependency configuration)",
                cycle.join(" -> ")
            );
            report
                .warnings
                .push(InvalidationWarning::DependencyCycle { path: cycle });
            continue;
        }

        if !visited.insert(child.clone()) {
            continue;
        }

        if depth > manager.max_depth() {
            warn!(
                "Dependency traversal from '{}' exceeded max depth {} at '{}' (via '{}'), aborting",
                report.invalidated[0],
                manager.max_depth(),
                child,
                parent
            );
            report.warnings.push(InvalidationWarning::DepthExceeded {
                key: child,
                max_depth: manager.max_depth(),
            });
            report.truncated = true;
            break;
        }

        manager.invalidate_base(&child).await?;
        report.invalidated.push(child.clone());
        let dependents = manager.dependents_of_base(&child).await?;
        path.push(child.clone());
        stack.push(Frame {
            base: child,
            depth,
            dependents,
            next: 0,
        });
    }

    Ok(report)
}
