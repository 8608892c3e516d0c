//! Target environment identity and derived resource naming.
//!
//! The environment is a closed enum: anything not listed here is rejected at
//! argument parsing, before any control-plane call is made. All cluster,
//! role, and stack names are derived from the environment so that discovery
//! and teardown agree on what belongs to it.

use crate::defaults::STACK_SUFFIXES;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decommissionable platform environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Shared development environment
    Dev,
    /// Pre-production staging environment
    Staging,
    /// Production environment
    Prod,
}

impl Environment {
    /// Canonical lowercase name, as typed on the CLI and in confirmation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }

    /// Name of the compute cluster owning this environment's resources.
    pub fn cluster_name(&self) -> String {
        format!("atlas-{}", self.as_str())
    }

    /// IAM role assumed by the environment's worker nodes.
    pub fn node_role_name(&self) -> String {
        format!("{}-node", self.cluster_name())
    }

    /// Name prefix shared by resources provisioned for this environment.
    pub fn resource_prefix(&self) -> String {
        format!("{}-", self.cluster_name())
    }

    /// Declarative stack names in destroy order (reverse of creation order).
    pub fn stack_names(&self) -> Vec<String> {
        STACK_SUFFIXES
            .iter()
            .map(|suffix| format!("{}-{}", self.cluster_name(), suffix))
            .collect()
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_naming() {
        assert_eq!(Environment::Dev.cluster_name(), "atlas-dev");
        assert_eq!(Environment::Prod.node_role_name(), "atlas-prod-node");
        assert_eq!(Environment::Staging.resource_prefix(), "atlas-staging-");
    }

    #[test]
    fn stacks_destroy_in_reverse_dependency_order() {
        let stacks = Environment::Dev.stack_names();
        assert_eq!(
            stacks,
            vec![
                "atlas-dev-addons",
                "atlas-dev-nodegroup",
                "atlas-dev-cluster",
                "atlas-dev-network",
            ],
            "addons must be destroyed first, the network stack last"
        );
    }

    #[test]
    fn display_matches_cli_name() {
        assert_eq!(Environment::Dev.to_string(), "dev");
        assert_eq!(Environment::Staging.to_string(), "staging");
        assert_eq!(Environment::Prod.to_string(), "prod");
    }
}
