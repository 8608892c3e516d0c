//! Ownership tag keys and name-pattern helpers
//!
//! Discovery never relies on tracked configuration: resources are matched by
//! the tags the cluster's controllers put on everything they create, plus the
//! name prefix used by the declarative stacks. A resource matching either
//! signal is treated as owned by the environment.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `kubernetes.io/cluster/<cluster>` | Cluster ownership (`owned`/`shared`) |
//! | `elbv2.k8s.aws/cluster` | Load balancers created by the in-cluster LB controller |
//! | `karpenter.sh/discovery` | Resources the node-provisioning controller selects on |

/// Tag value marking a resource as exclusively owned by the cluster
pub const TAG_OWNED: &str = "owned";

/// Tag key put on load balancers and target groups by the LB controller
pub const TAG_LB_CLUSTER: &str = "elbv2.k8s.aws/cluster";

/// Tag key the node-provisioning controller selects subnets and groups on
pub const TAG_NODE_DISCOVERY: &str = "karpenter.sh/discovery";

/// Node label identifying nodes managed by the node-provisioning controller
pub const LABEL_NODE_POOL: &str = "karpenter.sh/nodepool";

/// Cluster ownership tag key for a given cluster name
pub fn cluster_tag_key(cluster: &str) -> String {
    format!("kubernetes.io/cluster/{cluster}")
}

/// Check whether a resource name carries the environment's prefix
pub fn has_cluster_prefix(name: &str, cluster: &str) -> bool {
    name.strip_prefix(cluster)
        .is_some_and(|rest| rest.starts_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_key_embeds_cluster() {
        assert_eq!(
            cluster_tag_key("atlas-dev"),
            "kubernetes.io/cluster/atlas-dev"
        );
    }

    #[test]
    fn prefix_matching_requires_separator() {
        assert!(has_cluster_prefix("atlas-dev-node", "atlas-dev"));
        assert!(has_cluster_prefix("atlas-dev-ingress-0a1b", "atlas-dev"));
        assert!(!has_cluster_prefix("atlas-devops-node", "atlas-dev"));
        assert!(!has_cluster_prefix("atlas-dev", "atlas-dev"));
        assert!(!has_cluster_prefix("other-cluster", "atlas-dev"));
    }
}
