//! Tag/pattern-based orphan audit
//!
//! Final sweep across every resource class touched anywhere in the run,
//! discovered from the live control plane rather than tracked configuration.
//! Controllers create load balancers, security groups, volumes, and instance
//! profiles dynamically at run time; anything the earlier phases missed due
//! to timing or untracked state is caught here by ownership tag or name
//! pattern.

use crate::aws::context::AwsContext;
use crate::aws::error::ignore_not_found;
use crate::aws::iam::{IamProfiles, ProfileOps};
use crate::aws::record_api_failure;
use crate::session::SessionContext;
use anyhow::{bail, Context, Result};
use aws_sdk_ec2::types::Filter;
use scuttle_common::tags::{self, TAG_LB_CLUSTER};
use scuttle_common::ResourceKind;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use tracing::{debug, info};

pub(crate) const PHASE: &str = "orphan-audit";

/// How a query narrows a resource class to the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFilter {
    /// Resources carrying a tag key, optionally with a specific value
    Tag { key: String, value: Option<String> },
    /// Resources whose name starts with a prefix
    NamePrefix(String),
}

impl fmt::Display for DiscoveryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryFilter::Tag {
                key,
                value: Some(value),
            } => write!(f, "tag {key}={value}"),
            DiscoveryFilter::Tag { key, value: None } => write!(f, "tag-key {key}"),
            DiscoveryFilter::NamePrefix(prefix) => write!(f, "name-prefix '{prefix}'"),
        }
    }
}

/// A typed query descriptor: one resource kind, one discovery filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanQuery {
    pub kind: ResourceKind,
    pub filter: DiscoveryFilter,
}

impl fmt::Display for OrphanQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.kind, self.filter)
    }
}

/// Trait for evaluating orphan queries and deleting what they find.
pub trait OrphanOps {
    fn search(&self, query: &OrphanQuery) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn delete(&self, kind: ResourceKind, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// The audit surface for one environment. Several classes are covered by
/// more than one filter on purpose: controller-created resources carry tags,
/// stack-created ones only the name prefix.
pub fn audit_queries(cluster: &str) -> Vec<OrphanQuery> {
    let owned = DiscoveryFilter::Tag {
        key: tags::cluster_tag_key(cluster),
        value: None,
    };
    let lb_owned = DiscoveryFilter::Tag {
        key: TAG_LB_CLUSTER.to_string(),
        value: Some(cluster.to_string()),
    };
    let prefix = DiscoveryFilter::NamePrefix(format!("{cluster}-"));

    vec![
        OrphanQuery {
            kind: ResourceKind::LoadBalancer,
            filter: lb_owned.clone(),
        },
        OrphanQuery {
            kind: ResourceKind::LoadBalancer,
            filter: owned.clone(),
        },
        OrphanQuery {
            kind: ResourceKind::TargetGroup,
            filter: lb_owned,
        },
        OrphanQuery {
            kind: ResourceKind::TargetGroup,
            filter: owned.clone(),
        },
        OrphanQuery {
            kind: ResourceKind::SecurityGroup,
            filter: owned.clone(),
        },
        OrphanQuery {
            kind: ResourceKind::SecurityGroup,
            filter: prefix.clone(),
        },
        OrphanQuery {
            kind: ResourceKind::Volume,
            filter: owned.clone(),
        },
        OrphanQuery {
            kind: ResourceKind::NetworkInterface,
            filter: owned,
        },
        OrphanQuery {
            kind: ResourceKind::IamInstanceProfile,
            filter: prefix,
        },
    ]
}

/// Deduplicate discovered resources by identifier, preserving first-seen
/// order. Overlapping filters routinely report the same resource; a resource
/// must never receive two delete calls from one audit pass.
pub fn dedupe_discovered(found: Vec<(ResourceKind, String)>) -> Vec<(ResourceKind, String)> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(kind, id)| seen.insert((*kind, id.clone())))
        .collect()
}

/// Run every audit query, dedupe, and best-effort delete the results in
/// teardown order.
pub async fn audit_orphans<O: OrphanOps>(ctx: &mut SessionContext, orphans: &O) -> Result<()> {
    let queries = audit_queries(&ctx.cluster_name);

    let mut found = Vec::new();
    for query in &queries {
        match orphans.search(query).await {
            Ok(ids) => {
                if !ids.is_empty() {
                    info!(query = %query, count = ids.len(), "Found orphan candidates");
                }
                found.extend(ids.into_iter().map(|id| (query.kind, id)));
            }
            Err(e) => {
                ctx.record_error(PHASE, None, format!("search failed for {query}: {e:#}"));
            }
        }
    }

    let mut resources = dedupe_discovered(found);
    resources.sort_by_key(|(kind, _)| kind.teardown_priority());

    if resources.is_empty() {
        info!("No orphaned resources found");
        return Ok(());
    }

    for (kind, id) in &resources {
        if ctx.dry_run {
            info!(kind = %kind, id = %id, "[dry-run] would delete orphaned resource");
            continue;
        }
        match orphans.delete(*kind, id).await {
            Ok(()) => info!(kind = %kind, id = %id, "Orphaned resource deleted"),
            Err(e) => record_api_failure(ctx, PHASE, *kind, id, &e),
        }
    }

    Ok(())
}

/// Production orphan access over the EC2, ELBv2, and IAM clients.
pub struct AwsOrphanSweep {
    ec2: aws_sdk_ec2::Client,
    elbv2: aws_sdk_elasticloadbalancingv2::Client,
    iam: IamProfiles,
}

impl AwsOrphanSweep {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            ec2: ctx.ec2_client(),
            elbv2: ctx.elbv2_client(),
            iam: IamProfiles::from_context(ctx),
        }
    }

    async fn search_load_balancers(&self, filter: &DiscoveryFilter) -> Result<Vec<String>> {
        let mut candidates = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut request = self.elbv2.describe_load_balancers();
            if let Some(m) = &marker {
                request = request.marker(m);
            }
            let response = request.send().await.context("Failed to describe load balancers")?;
            for lb in response.load_balancers() {
                if let (Some(arn), Some(name)) = (lb.load_balancer_arn(), lb.load_balancer_name()) {
                    candidates.push((arn.to_string(), name.to_string()));
                }
            }
            match response.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        self.filter_elbv2_candidates(candidates, filter).await
    }

    async fn search_target_groups(&self, filter: &DiscoveryFilter) -> Result<Vec<String>> {
        let mut candidates = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut request = self.elbv2.describe_target_groups();
            if let Some(m) = &marker {
                request = request.marker(m);
            }
            let response = request.send().await.context("Failed to describe target groups")?;
            for tg in response.target_groups() {
                if let (Some(arn), Some(name)) = (tg.target_group_arn(), tg.target_group_name()) {
                    candidates.push((arn.to_string(), name.to_string()));
                }
            }
            match response.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        self.filter_elbv2_candidates(candidates, filter).await
    }

    /// Narrow (arn, name) candidates by the filter. Tag lookups go through
    /// DescribeTags, which accepts at most 20 ARNs per call.
    async fn filter_elbv2_candidates(
        &self,
        candidates: Vec<(String, String)>,
        filter: &DiscoveryFilter,
    ) -> Result<Vec<String>> {
        match filter {
            DiscoveryFilter::NamePrefix(prefix) => Ok(candidates
                .into_iter()
                .filter(|(_, name)| name.starts_with(prefix))
                .map(|(arn, _)| arn)
                .collect()),
            DiscoveryFilter::Tag { key, value } => {
                let mut matching = Vec::new();
                for chunk in candidates.chunks(20) {
                    let arns: Vec<String> = chunk.iter().map(|(arn, _)| arn.clone()).collect();
                    let response = self
                        .elbv2
                        .describe_tags()
                        .set_resource_arns(Some(arns))
                        .send()
                        .await
                        .context("Failed to describe load balancer tags")?;
                    for description in response.tag_descriptions() {
                        let tagged = description.tags().iter().any(|tag| {
                            tag.key() == Some(key.as_str())
                                && value
                                    .as_deref()
                                    .map_or(true, |expected| tag.value() == Some(expected))
                        });
                        if tagged {
                            if let Some(arn) = description.resource_arn() {
                                matching.push(arn.to_string());
                            }
                        }
                    }
                }
                Ok(matching)
            }
        }
    }

    fn ec2_filter(filter: &DiscoveryFilter, name_field: &str) -> Filter {
        match filter {
            DiscoveryFilter::Tag {
                key,
                value: Some(value),
            } => Filter::builder()
                .name(format!("tag:{key}"))
                .values(value)
                .build(),
            DiscoveryFilter::Tag { key, value: None } => {
                Filter::builder().name("tag-key").values(key).build()
            }
            DiscoveryFilter::NamePrefix(prefix) => Filter::builder()
                .name(name_field)
                .values(format!("{prefix}*"))
                .build(),
        }
    }

    async fn search_security_groups(&self, filter: &DiscoveryFilter) -> Result<Vec<String>> {
        let response = self
            .ec2
            .describe_security_groups()
            .filters(Self::ec2_filter(filter, "group-name"))
            .send()
            .await
            .context("Failed to describe security groups")?;

        Ok(response
            .security_groups()
            .iter()
            .filter(|sg| sg.group_name() != Some("default"))
            .filter_map(|sg| sg.group_id())
            .map(String::from)
            .collect())
    }

    async fn search_volumes(&self, filter: &DiscoveryFilter) -> Result<Vec<String>> {
        let response = self
            .ec2
            .describe_volumes()
            .filters(Self::ec2_filter(filter, "tag:Name"))
            .filters(Filter::builder().name("status").values("available").build())
            .send()
            .await
            .context("Failed to describe volumes")?;

        Ok(response
            .volumes()
            .iter()
            .filter_map(|v| v.volume_id())
            .map(String::from)
            .collect())
    }

    async fn search_interfaces(&self, filter: &DiscoveryFilter) -> Result<Vec<String>> {
        let response = self
            .ec2
            .describe_network_interfaces()
            .filters(Self::ec2_filter(filter, "tag:Name"))
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

    async fn search_instance_profiles(&self, filter: &DiscoveryFilter) -> Result<Vec<String>> {
        match filter {
            DiscoveryFilter::NamePrefix(prefix) => Ok(self
                .iam
                .profiles_with_prefix(prefix)
                .await?
                .into_iter()
                .map(|profile| profile.name)
                .collect()),
            DiscoveryFilter::Tag { .. } => {
                debug!("Tag discovery not supported for instance profiles");
                Ok(Vec::new())
            }
        }
    }
}

impl OrphanOps for AwsOrphanSweep {
    async fn search(&self, query: &OrphanQuery) -> Result<Vec<String>> {
        match query.kind {
            ResourceKind::LoadBalancer => self.search_load_balancers(&query.filter).await,
            ResourceKind::TargetGroup => self.search_target_groups(&query.filter).await,
            ResourceKind::SecurityGroup => self.search_security_groups(&query.filter).await,
            ResourceKind::Volume => self.search_volumes(&query.filter).await,
            ResourceKind::NetworkInterface => self.search_interfaces(&query.filter).await,
            ResourceKind::IamInstanceProfile => self.search_instance_profiles(&query.filter).await,
            other => bail!("unsupported orphan query kind: {other}"),
        }
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        match kind {
            ResourceKind::LoadBalancer => {
                ignore_not_found(
                    self.elbv2
                        .delete_load_balancer()
                        .load_balancer_arn(id)
                        .send()
                        .await,
                )
                .context("Failed to delete load balancer")?;
            }
            ResourceKind::TargetGroup => {
                ignore_not_found(
                    self.elbv2
                        .delete_target_group()
                        .target_group_arn(id)
                        .send()
                        .await,
                )
                .context("Failed to delete target group")?;
            }
            ResourceKind::SecurityGroup => {
                ignore_not_found(self.ec2.delete_security_group().group_id(id).send().await)
                    .context("Failed to delete security group")?;
            }
            ResourceKind::Volume => {
                ignore_not_found(self.ec2.delete_volume().volume_id(id).send().await)
                    .context("Failed to delete volume")?;
            }
            ResourceKind::NetworkInterface => {
                ignore_not_found(
                    self.ec2
                        .delete_network_interface()
                        .network_interface_id(id)
                        .send()
                        .await,
                )
                .context("Failed to delete network interface")?;
            }
            ResourceKind::IamInstanceProfile => {
                self.iam.purge(id).await?;
            }
            other => bail!("unsupported orphan delete kind: {other}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_cover_every_audited_class() {
        let queries = audit_queries("atlas-dev");
        let kinds: HashSet<ResourceKind> = queries.iter().map(|q| q.kind).collect();
        for kind in [
            ResourceKind::LoadBalancer,
            ResourceKind::TargetGroup,
            ResourceKind::SecurityGroup,
            ResourceKind::Volume,
            ResourceKind::NetworkInterface,
            ResourceKind::IamInstanceProfile,
        ] {
            assert!(kinds.contains(&kind), "missing audit query for {kind}");
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let found = vec![
            (ResourceKind::SecurityGroup, "sg-1".to_string()),
            (ResourceKind::SecurityGroup, "sg-2".to_string()),
            (ResourceKind::SecurityGroup, "sg-1".to_string()),
            (ResourceKind::Volume, "sg-1".to_string()),
        ];
        let deduped = dedupe_discovered(found);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].1, "sg-1");
        assert_eq!(deduped[1].1, "sg-2");
        // Same id under a different kind is a different resource
        assert_eq!(deduped[2].0, ResourceKind::Volume);
    }
}
