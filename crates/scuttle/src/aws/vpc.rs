//! VPC graph teardown
//!
//! Post-step of the run: remove networking objects the declarative destroyer
//! retained after a partial failure. Deletion order inside one VPC follows
//! the real dependency edges: interface endpoints → dangling interfaces →
//! security-group cross-reference stripping → security groups → subnets →
//! internet gateway → route tables → NAT gateways (then wait, they pin
//! elastic IPs) → elastic IPs → the VPC itself.
//!
//! The full dependency graph cannot be known exactly in advance, so every
//! individual delete stays best-effort: a failure is recorded and the sweep
//! proceeds to the next resource, with the VPC delete always attempted last.

use crate::aws::context::AwsContext;
use crate::aws::error::ignore_not_found;
use crate::aws::record_api_failure;
use crate::session::SessionContext;
use crate::wait::{poll_until_drained, PollConfig};
use anyhow::{bail, Context, Result};
use aws_sdk_ec2::types::{Filter, IpPermission, NatGatewayState, State, VpcEndpointType};
use scuttle_common::defaults::{
    ENDPOINT_RELEASE_TIMEOUT_SECS, NAT_RELEASE_TIMEOUT_SECS, POLL_INTERVAL_SECS,
};
use scuttle_common::{tags, ResourceKind};
use std::future::Future;
use tracing::{debug, info};

pub(crate) const PHASE: &str = "network-sweep";

/// A security group and the groups its rules reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupInfo {
    pub id: String,
    pub name: String,
    pub ingress_refs: Vec<String>,
    pub egress_refs: Vec<String>,
}

impl SecurityGroupInfo {
    pub fn references_other_groups(&self) -> bool {
        !self.ingress_refs.is_empty() || !self.egress_refs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableAssociationInfo {
    pub id: String,
    pub main: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableInfo {
    pub id: String,
    pub associations: Vec<RouteTableAssociationInfo>,
}

impl RouteTableInfo {
    /// The main route table is deleted with the VPC and refuses earlier
    /// explicit deletes.
    pub fn is_main(&self) -> bool {
        self.associations.iter().any(|a| a.main)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatState {
    Pending,
    Available,
    Deleting,
    Deleted,
    Failed,
}

impl NatState {
    /// NAT gateways pin elastic IPs and interfaces until fully deleted.
    pub fn still_holding_resources(self) -> bool {
        !matches!(self, NatState::Deleted | NatState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatGatewayInfo {
    pub id: String,
    pub state: NatState,
}

/// Trait for the networking operations the sweep needs.
pub trait NetworkOps {
    /// Locate the environment's VPC by ownership tag, falling back to the
    /// network stack's Name tag. `Ok(None)` means nothing left to sweep.
    fn find_vpc(&self, cluster: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn list_interface_endpoints(
        &self,
        vpc: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn delete_interface_endpoint(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_available_interfaces(
        &self,
        vpc: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn delete_interface(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_security_groups(
        &self,
        vpc: &str,
    ) -> impl Future<Output = Result<Vec<SecurityGroupInfo>>> + Send;
    /// Remove every rule on the group that references another group, in both
    /// directions, so mutually-referencing groups become deletable.
    fn strip_rule_references(&self, group_id: &str) -> impl Future<Output = Result<()>> + Send;
    fn delete_security_group(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_subnets(&self, vpc: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn delete_subnet(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_internet_gateways(
        &self,
        vpc: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn detach_internet_gateway(
        &self,
        igw: &str,
        vpc: &str,
    ) -> impl Future<Output = Result<()>> + Send;
    fn delete_internet_gateway(&self, igw: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_route_tables(
        &self,
        vpc: &str,
    ) -> impl Future<Output = Result<Vec<RouteTableInfo>>> + Send;
    fn disassociate_route_table(
        &self,
        association_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
    fn delete_route_table(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_nat_gateways(
        &self,
        vpc: &str,
    ) -> impl Future<Output = Result<Vec<NatGatewayInfo>>> + Send;
    fn delete_nat_gateway(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Elastic IP allocations carrying the cluster ownership tag.
    fn list_cluster_addresses(
        &self,
        cluster: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn release_address(&self, allocation_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn delete_vpc(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Sweep the environment's VPC graph in dependency order.
pub async fn sweep_network<N: NetworkOps>(ctx: &mut SessionContext, net: &N) -> Result<()> {
    let cluster = ctx.cluster_name.clone();

    let vpc = match net
        .find_vpc(&cluster)
        .await
        .context("Failed to locate the environment VPC")?
    {
        Some(vpc) => vpc,
        None => {
            info!(cluster = %cluster, "No VPC found, nothing to sweep");
            return Ok(());
        }
    };
    info!(vpc = %vpc, "Sweeping networking resources");

    sweep_interface_endpoints(ctx, net, &vpc).await;
    sweep_dangling_interfaces(ctx, net, &vpc).await;
    sweep_security_groups(ctx, net, &vpc).await;
    sweep_subnets(ctx, net, &vpc).await;
    sweep_internet_gateways(ctx, net, &vpc).await;
    sweep_route_tables(ctx, net, &vpc).await;
    sweep_nat_gateways(ctx, net, &vpc).await;
    sweep_addresses(ctx, net, &cluster).await;

    if ctx.dry_run {
        info!(vpc = %vpc, "[dry-run] would delete VPC");
        return Ok(());
    }
    match net.delete_vpc(&vpc).await {
        Ok(()) => info!(vpc = %vpc, "VPC deleted"),
        Err(e) => record_api_failure(ctx, PHASE, ResourceKind::Vpc, &vpc, &e),
    }

    Ok(())
}

async fn sweep_interface_endpoints<N: NetworkOps>(
    ctx: &mut SessionContext,
    net: &N,
    vpc: &str,
) {
    let endpoints = match net.list_interface_endpoints(vpc).await {
        Ok(ids) => ids,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list interface endpoints: {e:#}"));
            return;
        }
    };

    let mut deleted_any = false;
    for id in &endpoints {
        if ctx.dry_run {
            info!(endpoint = %id, "[dry-run] would delete interface endpoint");
            continue;
        }
        match net.delete_interface_endpoint(id).await {
            Ok(()) => {
                info!(endpoint = %id, "Interface endpoint deleted");
                deleted_any = true;
            }
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::VpcEndpoint, id, &e),
        }
    }

    if deleted_any {
        // Endpoints release their network interfaces asynchronously; later
        // steps fail while those interfaces linger.
        let config = PollConfig::new(POLL_INTERVAL_SECS, ENDPOINT_RELEASE_TIMEOUT_SECS);
        let check = || async { Ok(net.list_interface_endpoints(vpc).await?.len()) };
        if let Err(e) = poll_until_drained(config, check, "interface endpoints").await {
            ctx.record_warning(PHASE, None, format!("interface endpoints still releasing: {e}"));
        }
    }
}

async fn sweep_dangling_interfaces<N: NetworkOps>(
    ctx: &mut SessionContext,
    net: &N,
    vpc: &str,
) {
    let interfaces = match net.list_available_interfaces(vpc).await {
        Ok(ids) => ids,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list network interfaces: {e:#}"));
            return;
        }
    };

    for id in &interfaces {
        if ctx.dry_run {
            info!(interface = %id, "[dry-run] would delete network interface");
            continue;
        }
        match net.delete_interface(id).await {
            Ok(()) => info!(interface = %id, "Network interface deleted"),
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::NetworkInterface, id, &e),
        }
    }
}

async fn sweep_security_groups<N: NetworkOps>(ctx: &mut SessionContext, net: &N, vpc: &str) {
    let groups = match net.list_security_groups(vpc).await {
        Ok(groups) => groups,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list security groups: {e:#}"));
            return;
        }
    };

    // Strip cross-references on every group first: group A cannot be deleted
    // while a rule on group B still names it, and vice versa.
    for group in &groups {
        if group.name == "default" || !group.references_other_groups() {
            continue;
        }
        if ctx.dry_run {
            info!(sg_id = %group.id, "[dry-run] would strip group-referencing rules");
            continue;
        }
        match net.strip_rule_references(&group.id).await {
            Ok(()) => debug!(sg_id = %group.id, "Stripped group-referencing rules"),
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::SecurityGroupRule, &group.id, &e),
        }
    }

    for group in &groups {
        if group.name == "default" {
            debug!(sg_id = %group.id, "Skipping default security group");
            continue;
        }
        if ctx.dry_run {
            info!(sg_id = %group.id, name = %group.name, "[dry-run] would delete security group");
            continue;
        }
        match net.delete_security_group(&group.id).await {
            Ok(()) => info!(sg_id = %group.id, name = %group.name, "Security group deleted"),
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::SecurityGroup, &group.id, &e),
        }
    }
}

async fn sweep_subnets<N: NetworkOps>(ctx: &mut SessionContext, net: &N, vpc: &str) {
    let subnets = match net.list_subnets(vpc).await {
        Ok(ids) => ids,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list subnets: {e:#}"));
            return;
        }
    };

    for id in &subnets {
        if ctx.dry_run {
            info!(subnet = %id, "[dry-run] would delete subnet");
            continue;
        }
        match net.delete_subnet(id).await {
            Ok(()) => info!(subnet = %id, "Subnet deleted"),
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::Subnet, id, &e),
        }
    }
}

async fn sweep_internet_gateways<N: NetworkOps>(ctx: &mut SessionContext, net: &N, vpc: &str) {
    let gateways = match net.list_internet_gateways(vpc).await {
        Ok(ids) => ids,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list internet gateways: {e:#}"));
            return;
        }
    };

    for igw in &gateways {
        if ctx.dry_run {
            info!(igw = %igw, "[dry-run] would detach and delete internet gateway");
            continue;
        }
        if let Err(e) = net.detach_internet_gateway(igw, vpc).await {
            record_api_failure(ctx, PHASE, ResourceKind::InternetGateway, igw, &e);
        }
        match net.delete_internet_gateway(igw).await {
            Ok(()) => info!(igw = %igw, "Internet gateway deleted"),
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::InternetGateway, igw, &e),
        }
    }
}

async fn sweep_route_tables<N: NetworkOps>(ctx: &mut SessionContext, net: &N, vpc: &str) {
    let tables = match net.list_route_tables(vpc).await {
        Ok(tables) => tables,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list route tables: {e:#}"));
            return;
        }
    };

    for table in &tables {
        if table.is_main() {
            debug!(route_table = %table.id, "Skipping main route table");
            continue;
        }
        if ctx.dry_run {
            info!(route_table = %table.id, "[dry-run] would disassociate and delete route table");
            continue;
        }
        for association in &table.associations {
            if let Err(e) = net.disassociate_route_table(&association.id).await {
                record_api_failure(ctx, PHASE, ResourceKind::RouteTable, &table.id, &e);
            }
        }
        match net.delete_route_table(&table.id).await {
            Ok(()) => info!(route_table = %table.id, "Route table deleted"),
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::RouteTable, &table.id, &e),
        }
    }
}

async fn sweep_nat_gateways<N: NetworkOps>(ctx: &mut SessionContext, net: &N, vpc: &str) {
    let gateways = match net.list_nat_gateways(vpc).await {
        Ok(gateways) => gateways,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list NAT gateways: {e:#}"));
            return;
        }
    };

    let mut deleting_any = false;
    for nat in &gateways {
        match nat.state {
            NatState::Deleted | NatState::Failed => continue,
            NatState::Deleting => {
                deleting_any = true;
                continue;
            }
            NatState::Pending | NatState::Available => {}
        }
        if ctx.dry_run {
            info!(nat = %nat.id, "[dry-run] would delete NAT gateway");
            continue;
        }
        match net.delete_nat_gateway(&nat.id).await {
            Ok(()) => {
                info!(nat = %nat.id, "NAT gateway deletion started");
                deleting_any = true;
            }
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::NatGateway, &nat.id, &e),
        }
    }

    if deleting_any && !ctx.dry_run {
        // Elastic IPs cannot be released while any NAT gateway is still in a
        // transitional state.
        let config = PollConfig::new(POLL_INTERVAL_SECS, NAT_RELEASE_TIMEOUT_SECS);
        let check = || async {
            Ok(net
                .list_nat_gateways(vpc)
                .await?
                .iter()
                .filter(|nat| nat.state.still_holding_resources())
                .count())
        };
        if let Err(e) = poll_until_drained(config, check, "NAT gateways").await {
            ctx.record_error(PHASE, None, format!("NAT gateways still releasing: {e}"));
        }
    }
}

async fn sweep_addresses<N: NetworkOps>(ctx: &mut SessionContext, net: &N, cluster: &str) {
    let addresses = match net.list_cluster_addresses(cluster).await {
        Ok(ids) => ids,
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list elastic IPs: {e:#}"));
            return;
        }
    };

    for allocation in &addresses {
        if ctx.dry_run {
            info!(allocation = %allocation, "[dry-run] would release elastic IP");
            continue;
        }
        match net.release_address(allocation).await {
            Ok(()) => info!(allocation = %allocation, "Elastic IP released"),
            Err(e) => record_api_failure(ctx, PHASE, ResourceKind::ElasticIp, allocation, &e),
        }
    }
}

/// Production networking access over the EC2 SDK client.
pub struct Ec2Network {
    client: aws_sdk_ec2::Client,
}

impl Ec2Network {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }

    fn vpc_filter(vpc: &str) -> Filter {
        Filter::builder().name("vpc-id").values(vpc).build()
    }
}

fn group_refs(permissions: &[IpPermission]) -> Vec<String> {
    permissions
        .iter()
        .flat_map(|p| p.user_id_group_pairs())
        .filter_map(|pair| pair.group_id())
        .map(String::from)
        .collect()
}

/// Keep only the group-pair part of a permission for a revoke call, so
/// CIDR-based rules on the same ports survive.
fn referencing_permissions(permissions: &[IpPermission]) -> Vec<IpPermission> {
    permissions
        .iter()
        .filter(|p| !p.user_id_group_pairs().is_empty())
        .map(|p| {
            IpPermission::builder()
                .set_ip_protocol(p.ip_protocol().map(String::from))
                .set_from_port(p.from_port())
                .set_to_port(p.to_port())
                .set_user_id_group_pairs(Some(p.user_id_group_pairs().to_vec()))
                .build()
        })
        .collect()
}

impl NetworkOps for Ec2Network {
    async fn find_vpc(&self, cluster: &str) -> Result<Option<String>> {
        let by_tag = self
            .client
            .describe_vpcs()
            .filters(
                Filter::builder()
                    .name("tag-key")
                    .values(tags::cluster_tag_key(cluster))
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe VPCs by ownership tag")?;
        if let Some(vpc) = by_tag.vpcs().first() {
            return Ok(vpc.vpc_id().map(String::from));
        }

        let by_name = self
            .client
            .describe_vpcs()
            .filters(
                Filter::builder()
                    .name("tag:Name")
                    .values(format!("{cluster}-network"))
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe VPCs by name")?;
        Ok(by_name.vpcs().first().and_then(|v| v.vpc_id()).map(String::from))
    }

    async fn list_interface_endpoints(&self, vpc: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_vpc_endpoints()
            .filters(Self::vpc_filter(vpc))
            .send()
            .await
            .context("Failed to describe VPC endpoints")?;

        Ok(response
            .vpc_endpoints()
            .iter()
            .filter(|e| e.vpc_endpoint_type() == Some(&VpcEndpointType::Interface))
            .filter(|e| e.state() != Some(&State::Deleted))
            .filter_map(|e| e.vpc_endpoint_id())
            .map(String::from)
            .collect())
    }

    async fn delete_interface_endpoint(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete_vpc_endpoints()
            .vpc_endpoint_ids(id)
            .send()
            .await
            .context("Failed to delete VPC endpoint")?;

        for item in response.unsuccessful() {
            if let Some(error) = item.error() {
                let code = error.code().unwrap_or_default();
                if code.contains("NotFound") {
                    debug!(endpoint = id, "VPC endpoint already deleted");
                    continue;
                }
                bail!(
                    "Failed to delete VPC endpoint {id}: {code}: {}",
                    error.message().unwrap_or("unknown error")
                );
            }
        }
        Ok(())
    }

    async fn list_available_interfaces(&self, vpc: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_network_interfaces()
            .filters(Self::vpc_filter(vpc))
            .filters(Filter::builder().name("status").values("available").build())
            .send()
            .await
            .context("Failed to describe network interfaces")?;

        Ok(response
            .network_interfaces()
            .iter()
            .filter_map(|eni| eni.network_interface_id())
            .map(String::from)
            .collect())
    }

    async fn delete_interface(&self, id: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .delete_network_interface()
                .network_interface_id(id)
                .send()
                .await,
        )
        .context("Failed to delete network interface")?;
        Ok(())
    }

    async fn list_security_groups(&self, vpc: &str) -> Result<Vec<SecurityGroupInfo>> {
        let response = self
            .client
            .describe_security_groups()
            .filters(Self::vpc_filter(vpc))
            .send()
            .await
            .context("Failed to describe security groups")?;

        Ok(response
            .security_groups()
            .iter()
            .map(|sg| SecurityGroupInfo {
                id: sg.group_id().unwrap_or_default().to_string(),
                name: sg.group_name().unwrap_or_default().to_string(),
                ingress_refs: group_refs(sg.ip_permissions()),
                egress_refs: group_refs(sg.ip_permissions_egress()),
            })
            .collect())
    }

    async fn strip_rule_references(&self, group_id: &str) -> Result<()> {
        let lookup = ignore_not_found(
            self.client
                .describe_security_groups()
                .group_ids(group_id)
                .send()
                .await,
        )
        .context("Failed to describe security group for rule stripping")?;

        let Some(response) = lookup else {
            return Ok(());
        };
        let Some(group) = response.security_groups().first() else {
            return Ok(());
        };

        let ingress = referencing_permissions(group.ip_permissions());
        if !ingress.is_empty() {
            ignore_not_found(
                self.client
                    .revoke_security_group_ingress()
                    .group_id(group_id)
                    .set_ip_permissions(Some(ingress))
                    .send()
                    .await,
            )
            .context("Failed to revoke group-referencing ingress rules")?;
        }

        let egress = referencing_permissions(group.ip_permissions_egress());
        if !egress.is_empty() {
            ignore_not_found(
                self.client
                    .revoke_security_group_egress()
                    .group_id(group_id)
                    .set_ip_permissions(Some(egress))
                    .send()
                    .await,
            )
            .context("Failed to revoke group-referencing egress rules")?;
        }

        Ok(())
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        match ignore_not_found(
            self.client
                .delete_security_group()
                .group_id(id)
                .send()
                .await,
        )
        .context("Failed to delete security group")?
        {
            Some(_) => {}
            None => debug!(sg_id = id, "Security group already deleted"),
        }
        Ok(())
    }

    async fn list_subnets(&self, vpc: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_subnets()
            .filters(Self::vpc_filter(vpc))
            .send()
            .await
            .context("Failed to describe subnets")?;

        Ok(response
            .subnets()
            .iter()
            .filter_map(|s| s.subnet_id())
            .map(String::from)
            .collect())
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        ignore_not_found(self.client.delete_subnet().subnet_id(id).send().await)
            .context("Failed to delete subnet")?;
        Ok(())
    }

    async fn list_internet_gateways(&self, vpc: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_internet_gateways()
            .filters(
                Filter::builder()
                    .name("attachment.vpc-id")
                    .values(vpc)
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe internet gateways")?;

        Ok(response
            .internet_gateways()
            .iter()
            .filter_map(|igw| igw.internet_gateway_id())
            .map(String::from)
            .collect())
    }

    async fn detach_internet_gateway(&self, igw: &str, vpc: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .detach_internet_gateway()
                .internet_gateway_id(igw)
                .vpc_id(vpc)
                .send()
                .await,
        )
        .context("Failed to detach internet gateway")?;
        Ok(())
    }

    async fn delete_internet_gateway(&self, igw: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .delete_internet_gateway()
                .internet_gateway_id(igw)
                .send()
                .await,
        )
        .context("Failed to delete internet gateway")?;
        Ok(())
    }

    async fn list_route_tables(&self, vpc: &str) -> Result<Vec<RouteTableInfo>> {
        let response = self
            .client
            .describe_route_tables()
            .filters(Self::vpc_filter(vpc))
            .send()
            .await
            .context("Failed to describe route tables")?;

        Ok(response
            .route_tables()
            .iter()
            .map(|rt| RouteTableInfo {
                id: rt.route_table_id().unwrap_or_default().to_string(),
                associations: rt
                    .associations()
                    .iter()
                    .filter_map(|a| {
                        a.route_table_association_id().map(|id| {
                            RouteTableAssociationInfo {
                                id: id.to_string(),
                                main: a.main().unwrap_or(false),
                            }
                        })
                    })
                    .collect(),
            })
            .collect())
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .disassociate_route_table()
                .association_id(association_id)
                .send()
                .await,
        )
        .context("Failed to disassociate route table")?;
        Ok(())
    }

    async fn delete_route_table(&self, id: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .delete_route_table()
                .route_table_id(id)
                .send()
                .await,
        )
        .context("Failed to delete route table")?;
        Ok(())
    }

    async fn list_nat_gateways(&self, vpc: &str) -> Result<Vec<NatGatewayInfo>> {
        let response = self
            .client
            .describe_nat_gateways()
            .filter(Self::vpc_filter(vpc))
            .send()
            .await
            .context("Failed to describe NAT gateways")?;

        Ok(response
            .nat_gateways()
            .iter()
            .filter_map(|nat| {
                let id = nat.nat_gateway_id()?;
                let state = match nat.state() {
                    Some(NatGatewayState::Pending) => NatState::Pending,
                    Some(NatGatewayState::Available) => NatState::Available,
                    Some(NatGatewayState::Deleting) => NatState::Deleting,
                    Some(NatGatewayState::Failed) => NatState::Failed,
                    _ => NatState::Deleted,
                };
                Some(NatGatewayInfo {
                    id: id.to_string(),
                    state,
                })
            })
            .collect())
    }

    async fn delete_nat_gateway(&self, id: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .delete_nat_gateway()
                .nat_gateway_id(id)
                .send()
                .await,
        )
        .context("Failed to delete NAT gateway")?;
        Ok(())
    }

    async fn list_cluster_addresses(&self, cluster: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_addresses()
            .filters(
                Filter::builder()
                    .name("tag-key")
                    .values(tags::cluster_tag_key(cluster))
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe elastic IPs")?;

        Ok(response
            .addresses()
            .iter()
            .filter_map(|a| a.allocation_id())
            .map(String::from)
            .collect())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .release_address()
                .allocation_id(allocation_id)
                .send()
                .await,
        )
        .context("Failed to release elastic IP")?;
        Ok(())
    }

    async fn delete_vpc(&self, id: &str) -> Result<()> {
        match ignore_not_found(self.client.delete_vpc().vpc_id(id).send().await)
            .context("Failed to delete VPC")?
        {
            Some(_) => {}
            None => debug!(vpc = id, "VPC already deleted"),
        }
        Ok(())
    }
}
