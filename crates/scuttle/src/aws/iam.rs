//! IAM instance-profile detachment and deletion
//!
//! Runs before the declarative stacks are destroyed: a role cannot be
//! deleted while an instance profile still references it. Discovery uses two
//! independent strategies because profiles created dynamically by the
//! node-provisioning controller are invisible to a role-based lookup once
//! the role itself is already gone.

use crate::aws::context::AwsContext;
use crate::aws::error::ignore_not_found;
use crate::aws::record_api_failure;
use crate::session::{ResourceRef, SessionContext};
use anyhow::{Context, Result};
use scuttle_common::ResourceKind;
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, info};

pub(crate) const PHASE: &str = "instance-profiles";

/// An instance profile and the roles currently attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceProfile {
    pub name: String,
    pub roles: Vec<String>,
}

/// Trait for the instance-profile operations the sweep needs.
pub trait ProfileOps {
    /// Profiles attached to a known role. An absent role yields an empty list.
    fn profiles_for_role(
        &self,
        role: &str,
    ) -> impl Future<Output = Result<Vec<InstanceProfile>>> + Send;

    /// Profiles whose name carries the environment's prefix.
    fn profiles_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<InstanceProfile>>> + Send;

    fn remove_role(&self, profile: &str, role: &str) -> impl Future<Output = Result<()>> + Send;

    fn delete_profile(&self, name: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Detach and delete every instance profile belonging to the environment.
///
/// Profiles found by both strategies are deduplicated by name before any
/// delete is issued.
pub async fn detach_instance_profiles<P: ProfileOps>(
    ctx: &mut SessionContext,
    iam: &P,
) -> Result<()> {
    let role = ctx.environment.node_role_name();
    let prefix = ctx.environment.resource_prefix();

    let mut profiles: Vec<InstanceProfile> = Vec::new();
    match iam.profiles_for_role(&role).await {
        Ok(found) => profiles.extend(found),
        Err(e) => ctx.record_error(
            PHASE,
            None,
            format!("failed to list instance profiles for role '{role}': {e:#}"),
        ),
    }
    match iam.profiles_with_prefix(&prefix).await {
        Ok(found) => profiles.extend(found),
        Err(e) => ctx.record_error(
            PHASE,
            None,
            format!("failed to list instance profiles with prefix '{prefix}': {e:#}"),
        ),
    }

    let mut seen = HashSet::new();
    profiles.retain(|p| seen.insert(p.name.clone()));

    if profiles.is_empty() {
        debug!("No instance profiles to remove");
        return Ok(());
    }

    info!(count = profiles.len(), "Removing instance profiles");
    for profile in &profiles {
        if ctx.dry_run {
            info!(profile = %profile.name, "[dry-run] would detach roles and delete instance profile");
            continue;
        }

        for role_name in &profile.roles {
            if let Err(e) = iam.remove_role(&profile.name, role_name).await {
                ctx.record_warning(
                    PHASE,
                    Some(ResourceRef::new(
                        ResourceKind::IamInstanceProfile.as_str(),
                        profile.name.as_str(),
                    )),
                    format!("failed to detach role '{role_name}': {e:#}"),
                );
            }
        }

        match iam.delete_profile(&profile.name).await {
            Ok(()) => info!(profile = %profile.name, "Instance profile deleted"),
            Err(e) => record_api_failure(
                ctx,
                PHASE,
                ResourceKind::IamInstanceProfile,
                &profile.name,
                &e,
            ),
        }
    }

    Ok(())
}

/// Production instance-profile access over the IAM SDK client.
pub struct IamProfiles {
    client: aws_sdk_iam::Client,
}

impl IamProfiles {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }

    /// Detach every attached role and delete the profile. Used by the orphan
    /// auditor, where the attached roles are not known in advance.
    pub async fn purge(&self, name: &str) -> Result<()> {
        let lookup = ignore_not_found(
            self.client
                .get_instance_profile()
                .instance_profile_name(name)
                .send()
                .await,
        )
        .context("Failed to look up instance profile")?;

        let Some(found) = lookup else {
            return Ok(());
        };
        if let Some(profile) = found.instance_profile() {
            for role in profile.roles() {
                self.remove_role(name, role.role_name()).await?;
            }
        }
        self.delete_profile(name).await
    }
}

impl ProfileOps for IamProfiles {
    async fn profiles_for_role(&self, role: &str) -> Result<Vec<InstanceProfile>> {
        let mut profiles = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_instance_profiles_for_role()
                .role_name(role);
            if let Some(m) = &marker {
                request = request.marker(m);
            }

            let response = match ignore_not_found(request.send().await)
                .context("Failed to list instance profiles for role")?
            {
                Some(response) => response,
                // The role is already gone; only the prefix strategy can see
                // its leftover profiles now.
                None => {
                    debug!(role, "Role not found while listing instance profiles");
                    return Ok(profiles);
                }
            };

            for profile in response.instance_profiles() {
                profiles.push(InstanceProfile {
                    name: profile.instance_profile_name().to_string(),
                    roles: profile
                        .roles()
                        .iter()
                        .map(|r| r.role_name().to_string())
                        .collect(),
                });
            }

            if response.is_truncated() {
                marker = response.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(profiles)
    }

    async fn profiles_with_prefix(&self, prefix: &str) -> Result<Vec<InstanceProfile>> {
        let mut profiles = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = self.client.list_instance_profiles();
            if let Some(m) = &marker {
                request = request.marker(m);
            }

            let response = request
                .send()
                .await
                .context("Failed to list instance profiles")?;

            for profile in response.instance_profiles() {
                if !profile.instance_profile_name().starts_with(prefix) {
                    continue;
                }
                profiles.push(InstanceProfile {
                    name: profile.instance_profile_name().to_string(),
                    roles: profile
                        .roles()
                        .iter()
                        .map(|r| r.role_name().to_string())
                        .collect(),
                });
            }

            if response.is_truncated() {
                marker = response.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(profiles)
    }

    async fn remove_role(&self, profile: &str, role: &str) -> Result<()> {
        ignore_not_found(
            self.client
                .remove_role_from_instance_profile()
                .instance_profile_name(profile)
                .role_name(role)
                .send()
                .await,
        )
        .context("Failed to remove role from instance profile")?;
        Ok(())
    }

    async fn delete_profile(&self, name: &str) -> Result<()> {
        match ignore_not_found(
            self.client
                .delete_instance_profile()
                .instance_profile_name(name)
                .send()
                .await,
        )
        .context("Failed to delete instance profile")?
        {
            Some(_) => {}
            None => debug!(profile = name, "Instance profile already deleted"),
        }
        Ok(())
    }
}
