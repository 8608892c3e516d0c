//! Cloud resource types and teardown ordering
//!
//! Provides a single teardown priority across the sweeper and the orphan
//! auditor. Resources must be removed in dependency order to avoid failures;
//! the ordering reduces first-pass failures but cannot guarantee them away,
//! so every delete stays individually best-effort.

/// Types of cloud resources touched during decommissioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// ELBv2 load balancer (references target groups)
    LoadBalancer,
    /// ELBv2 target group
    TargetGroup,
    /// Interface VPC endpoint (holds network interfaces)
    VpcEndpoint,
    /// Detached network interface
    NetworkInterface,
    /// Security group rule referencing another group
    SecurityGroupRule,
    /// Security group (deletable only once nothing references it)
    SecurityGroup,
    /// VPC subnet
    Subnet,
    /// Internet gateway (detach before delete)
    InternetGateway,
    /// Route table (disassociate before delete)
    RouteTable,
    /// Managed NAT gateway (pins elastic IPs and interfaces)
    NatGateway,
    /// Elastic IP allocation
    ElasticIp,
    /// Block-storage volume
    Volume,
    /// IAM instance profile
    IamInstanceProfile,
    /// The VPC itself, removable only once emptied
    Vpc,
}

impl ResourceKind {
    /// Get teardown priority (lower number = delete first)
    pub fn teardown_priority(self) -> u8 {
        match self {
            ResourceKind::LoadBalancer => 0,
            ResourceKind::TargetGroup => 1,
            ResourceKind::VpcEndpoint => 2,
            ResourceKind::NetworkInterface => 3,
            ResourceKind::SecurityGroupRule => 4,
            ResourceKind::SecurityGroup => 5,
            ResourceKind::Subnet => 6,
            ResourceKind::InternetGateway => 7,
            ResourceKind::RouteTable => 8,
            ResourceKind::NatGateway => 9,
            ResourceKind::ElasticIp => 10,
            ResourceKind::Volume => 11,
            ResourceKind::IamInstanceProfile => 12,
            ResourceKind::Vpc => 13,
        }
    }

    /// Short identifier used in logs and error records
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::TargetGroup => "target-group",
            ResourceKind::VpcEndpoint => "vpc-endpoint",
            ResourceKind::NetworkInterface => "network-interface",
            ResourceKind::SecurityGroupRule => "security-group-rule",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::NatGateway => "nat-gateway",
            ResourceKind::ElasticIp => "elastic-ip",
            ResourceKind::Volume => "volume",
            ResourceKind::IamInstanceProfile => "instance-profile",
            ResourceKind::Vpc => "vpc",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_before_groups() {
        assert!(
            ResourceKind::SecurityGroupRule.teardown_priority()
                < ResourceKind::SecurityGroup.teardown_priority(),
            "Cross-referencing rules must be stripped before group deletion"
        );
    }

    #[test]
    fn endpoints_before_interfaces() {
        assert!(
            ResourceKind::VpcEndpoint.teardown_priority()
                < ResourceKind::NetworkInterface.teardown_priority(),
            "Endpoints hold interfaces and must be removed first"
        );
    }

    #[test]
    fn nat_gateways_before_elastic_ips() {
        assert!(
            ResourceKind::NatGateway.teardown_priority()
                < ResourceKind::ElasticIp.teardown_priority(),
            "NAT gateways pin elastic IPs until fully deleted"
        );
    }

    #[test]
    fn vpc_is_last() {
        let all = [
            ResourceKind::LoadBalancer,
            ResourceKind::TargetGroup,
            ResourceKind::VpcEndpoint,
            ResourceKind::NetworkInterface,
            ResourceKind::SecurityGroupRule,
            ResourceKind::SecurityGroup,
            ResourceKind::Subnet,
            ResourceKind::InternetGateway,
            ResourceKind::RouteTable,
            ResourceKind::NatGateway,
            ResourceKind::ElasticIp,
            ResourceKind::Volume,
            ResourceKind::IamInstanceProfile,
        ];
        for kind in all {
            assert!(
                kind.teardown_priority() < ResourceKind::Vpc.teardown_priority(),
                "{kind} must be removed before the VPC"
            );
        }
    }
}
