//! Ownership partitioning
//!
//! Groups tasks into clusters whose resource sets are disjoint, so clusters
//! can run concurrently without two of them owning the same resource.
//! Greedy and deterministic given task input order; not optimal.

use crate::analyzer::DependencyAnalysis;
use braid_core::{BraidConfig, Cluster, Conflict, ExtractionAmbiguity, Resource, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A resource owned by more than one cluster after partitioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionViolation {
    pub resource: Resource,
    pub clusters: Vec<usize>,
}

/// Result of partitioning a dependency analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionPlan {
    pub clusters: Vec<Cluster>,
    /// Every shared resource, in first-discovery order
    pub conflicts: Vec<Conflict>,
    /// Critical conflicts, resolved sequentially after the parallel phase
    /// in this order
    pub deferred: Vec<Conflict>,
    pub ambiguities: Vec<ExtractionAmbiguity>,
    /// Cross-cluster ownership overlaps found by post-partition validation
    pub violations: Vec<PartitionViolation>,
    /// Number of overflow clusters folded into cluster 0
    pub merged_overflow: usize,
}

impl PartitionPlan {
    pub fn cluster_of(&self, task_id: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.contains_task(task_id))
    }

    /// Shared resources in resolution order: deferred critical resources
    /// first, then the remaining shared resources, each group in
    /// first-discovery order
    pub fn resolution_order(&self) -> Vec<&Conflict> {
        self.deferred
            .iter()
            .chain(self.conflicts.iter().filter(|c| !c.is_critical()))
            .collect()
    }

    pub fn is_shared(&self, resource: &str) -> bool {
        self.conflicts.iter().any(|c| c.resource == resource)
    }

    pub fn is_deferred(&self, resource: &str) -> bool {
        self.deferred.iter().any(|c| c.resource == resource)
    }

    pub fn is_conflict_free(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Splits analyzed tasks into at most `max_clusters` clusters
pub struct OwnershipPartitioner {
    max_clusters: usize,
    advisory_read_only: Vec<Resource>,
}

impl OwnershipPartitioner {
    pub fn new(config: &BraidConfig) -> Self {
        Self {
            max_clusters: config.scheduler.max_clusters,
            advisory_read_only: config.advisory_read_only.clone(),
        }
    }

    pub fn with_max_clusters(mut self, max: usize) -> Self {
        self.max_clusters = max;
        self
    }

    pub fn partition(&self, analysis: &DependencyAnalysis) -> PartitionPlan {
        let entries = analysis.graph.entries();
        let mut groups = greedy_union(entries);
        let produced = groups.len();

        let limit = self.max_clusters.max(1);
        let mut merged_overflow = 0;
        if groups.len() > limit {
            let overflow: Vec<Group> = groups.drain(limit..).collect();
            merged_overflow = overflow.len();
            let first = &mut groups[0];
            for group in overflow {
                first.members.extend(group.members);
                first.resources.extend(group.resources);
            }
            first.members.sort_unstable();
            info!(
                "Partition produced {} clusters, merged {} overflow clusters into cluster 0",
                produced, merged_overflow
            );
        }

        let deferred: Vec<Conflict> = analysis
            .conflicts
            .iter()
            .filter(|c| c.is_critical())
            .cloned()
            .collect();
        let deferred_keys: BTreeSet<&str> = deferred.iter().map(|c| c.resource.as_str()).collect();

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .enumerate()
            .map(|(id, group)| Cluster {
                id,
                tasks: group
                    .members
                    .iter()
                    .map(|&idx| entries[idx].0.clone())
                    .collect(),
                owned_resources: group
                    .resources
                    .into_iter()
                    .filter(|r| !deferred_keys.contains(r.as_str()))
                    .collect(),
                read_only_resources: Vec::new(),
            })
            .collect();

        let read_only: Vec<Resource> = self
            .advisory_read_only
            .iter()
            .filter(|r| !clusters.iter().any(|c| c.owns(r)))
            .cloned()
            .collect();
        for cluster in &mut clusters {
            cluster.read_only_resources = read_only.clone();
        }

        let violations = validate_ownership(&clusters);
        for violation in &violations {
            warn!(
                resource = %violation.resource,
                clusters = ?violation.clusters,
                "Resource owned by more than one cluster"
            );
        }

        debug!(
            clusters = clusters.len(),
            deferred = deferred.len(),
            "Partition complete"
        );

        PartitionPlan {
            clusters,
            conflicts: analysis.conflicts.clone(),
            deferred,
            ambiguities: analysis.ambiguities.clone(),
            violations,
            merged_overflow,
        }
    }
}

struct Group {
    /// Indices into the task entries, ascending
    members: Vec<usize>,
    resources: BTreeSet<Resource>,
}

/// Open a cluster per unassigned task and absorb every later task whose
/// resources intersect the cluster's, until a full scan absorbs nothing
fn greedy_union(entries: &[(TaskId, BTreeSet<Resource>)]) -> Vec<Group> {
    let mut assigned = vec![false; entries.len()];
    let mut groups = Vec::new();

    for seed in 0..entries.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut group = Group {
            members: vec![seed],
            resources: entries[seed].1.clone(),
        };

        loop {
            let mut absorbed = false;
            for candidate in (seed + 1)..entries.len() {
                if assigned[candidate] || entries[candidate].1.is_disjoint(&group.resources) {
                    continue;
                }
                assigned[candidate] = true;
                group.members.push(candidate);
                group.resources.extend(entries[candidate].1.iter().cloned());
                absorbed = true;
            }
            if !absorbed {
                break;
            }
        }

        group.members.sort_unstable();
        groups.push(group);
    }

    groups
}

fn validate_ownership(clusters: &[Cluster]) -> Vec<PartitionViolation> {
    let mut violations: Vec<PartitionViolation> = Vec::new();
    for cluster in clusters {
        for resource in &cluster.owned_resources {
            if violations.iter().any(|v| &v.resource == resource) {
                continue;
            }
            let owners: Vec<usize> = clusters
                .iter()
                .filter(|c| c.owns(resource))
                .map(|c| c.id)
                .collect();
            if owners.len() > 1 {
                violations.push(PartitionViolation {
                    resource: resource.clone(),
                    clusters: owners,
                });
            }
        }
    }
    violations
}
