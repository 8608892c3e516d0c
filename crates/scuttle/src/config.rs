//! Configuration for a teardown run

use scuttle_common::Environment;

/// Settings for one teardown invocation, assembled from the CLI.
#[derive(Debug, Clone)]
pub struct TeardownConfig {
    /// Target environment (closed enum, validated at parse time)
    pub environment: Environment,
    /// AWS region holding the environment
    pub region: String,
    /// Skip the typed confirmation prompt
    pub auto_approve: bool,
    /// Leave declarative stacks in place; cluster-resident cleanup only
    pub skip_stack_destroy: bool,
    /// Log what would be deleted without issuing any mutating call
    pub dry_run: bool,
}

impl TeardownConfig {
    /// Name of the cluster this run decommissions.
    pub fn cluster_name(&self) -> String {
        self.environment.cluster_name()
    }
}
