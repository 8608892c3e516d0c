//! Fake providers for exercising the teardown logic without live control
//! planes.
//!
//! Every fake records the calls made against it, so tests can assert both
//! behavior (what was deleted) and ordering (what was deleted first). Used
//! by the unit tests in this crate and the scenario tests under `tests/`.

use crate::aws::iam::{InstanceProfile, ProfileOps};
use crate::aws::orphan::{OrphanOps, OrphanQuery};
use crate::aws::stack::{StackOps, StackState};
use crate::aws::vpc::{
    NatGatewayInfo, NatState, NetworkOps, RouteTableInfo, SecurityGroupInfo,
};
use crate::cluster::{ClusterOps, ObjectRef, ResourceClass};
use crate::config::TeardownConfig;
use anyhow::{bail, Result};
use scuttle_common::{Environment, ResourceKind};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// A minimal valid config for tests (dev environment, auto-approved).
pub fn test_config(dry_run: bool) -> TeardownConfig {
    TeardownConfig {
        environment: Environment::Dev,
        region: "us-east-2".to_string(),
        auto_approve: true,
        skip_stack_destroy: false,
        dry_run,
    }
}

fn count_mutations(calls: &[String]) -> usize {
    calls
        .iter()
        .filter(|call| {
            call.starts_with("delete")
                || call.starts_with("patch")
                || call.starts_with("strip")
                || call.starts_with("release")
                || call.starts_with("detach")
                || call.starts_with("disassociate")
                || call.starts_with("remove-role")
        })
        .count()
}

// ── Cluster ────────────────────────────────────────────────────────────────

/// How a fake cluster object behaves under deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Deletes normally
    Clean,
    /// Survives deletion until its finalizers are stripped
    Finalized,
    /// Survives even the finalizer strip
    Stuck,
}

#[derive(Debug)]
struct FakeObject {
    object: ObjectRef,
    behavior: FakeBehavior,
    finalizers_stripped: bool,
}

/// In-memory cluster with per-object deletion behavior.
#[derive(Default)]
pub struct FakeCluster {
    probe_ok: bool,
    installed: Mutex<HashSet<&'static str>>,
    objects: Mutex<HashMap<&'static str, Vec<FakeObject>>>,
    nodes: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            probe_ok: true,
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Mark a class's schema as installed, even with zero objects.
    pub fn install_class(&self, class: &ResourceClass) {
        self.installed.lock().unwrap().insert(class.name);
    }

    pub fn add_object(&self, class: &ResourceClass, object: ObjectRef, behavior: FakeBehavior) {
        self.install_class(class);
        self.objects
            .lock()
            .unwrap()
            .entry(class.name)
            .or_default()
            .push(FakeObject {
                object,
                behavior,
                finalizers_stripped: false,
            });
    }

    pub fn add_node(&self, name: &str) {
        self.nodes.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn mutation_count(&self) -> usize {
        count_mutations(&self.calls())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ClusterOps for FakeCluster {
    async fn probe(&self) -> Result<()> {
        self.record("probe".to_string());
        if self.probe_ok {
            Ok(())
        } else {
            bail!("connection refused")
        }
    }

    async fn list(&self, class: &ResourceClass) -> Result<Option<Vec<ObjectRef>>> {
        self.record(format!("list {}", class.name));
        if !self.installed.lock().unwrap().contains(class.name) {
            return Ok(None);
        }
        Ok(Some(
            self.objects
                .lock()
                .unwrap()
                .get(class.name)
                .map(|objects| objects.iter().map(|o| o.object.clone()).collect())
                .unwrap_or_default(),
        ))
    }

    async fn delete(&self, class: &ResourceClass, object: &ObjectRef) -> Result<()> {
        self.record(format!("delete {}/{}", class.name, object.name));
        let mut objects = self.objects.lock().unwrap();
        if let Some(entries) = objects.get_mut(class.name) {
            entries.retain(|entry| {
                if entry.object != *object {
                    return true;
                }
                match entry.behavior {
                    FakeBehavior::Clean => false,
                    FakeBehavior::Finalized => !entry.finalizers_stripped,
                    FakeBehavior::Stuck => true,
                }
            });
        }
        Ok(())
    }

    async fn strip_finalizers(&self, class: &ResourceClass, object: &ObjectRef) -> Result<()> {
        self.record(format!("patch {}/{}", class.name, object.name));
        let mut objects = self.objects.lock().unwrap();
        if let Some(entries) = objects.get_mut(class.name) {
            for entry in entries.iter_mut() {
                if entry.object == *object {
                    entry.finalizers_stripped = true;
                }
            }
        }
        Ok(())
    }

    async fn list_managed_nodes(&self) -> Result<Vec<String>> {
        self.record("list nodes".to_string());
        Ok(self.nodes.lock().unwrap().clone())
    }
}

// ── Network ────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct FakeNat {
    id: String,
    state: NatState,
    /// Status checks remaining before a deleting gateway settles
    settle_checks: usize,
}

/// In-memory VPC graph. Deletes remove resources; ids listed in
/// `fail_delete` simulate control-plane failures instead.
#[derive(Default)]
pub struct FakeNetwork {
    vpc: Mutex<Option<String>>,
    endpoints: Mutex<Vec<String>>,
    interfaces: Mutex<Vec<String>>,
    groups: Mutex<Vec<SecurityGroupInfo>>,
    subnets: Mutex<Vec<String>>,
    igws: Mutex<Vec<String>>,
    route_tables: Mutex<Vec<RouteTableInfo>>,
    nats: Mutex<Vec<FakeNat>>,
    addresses: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn with_vpc(vpc: &str) -> Self {
        let fake = Self::default();
        fake.set_vpc(vpc);
        fake
    }

    pub fn set_vpc(&self, vpc: &str) {
        *self.vpc.lock().unwrap() = Some(vpc.to_string());
    }

    pub fn add_endpoint(&self, id: &str) {
        self.endpoints.lock().unwrap().push(id.to_string());
    }

    pub fn add_interface(&self, id: &str) {
        self.interfaces.lock().unwrap().push(id.to_string());
    }

    pub fn add_group(&self, group: SecurityGroupInfo) {
        self.groups.lock().unwrap().push(group);
    }

    pub fn add_subnet(&self, id: &str) {
        self.subnets.lock().unwrap().push(id.to_string());
    }

    pub fn add_internet_gateway(&self, id: &str) {
        self.igws.lock().unwrap().push(id.to_string());
    }

    pub fn add_route_table(&self, table: RouteTableInfo) {
        self.route_tables.lock().unwrap().push(table);
    }

    pub fn add_nat(&self, id: &str, state: NatState, settle_checks: usize) {
        self.nats.lock().unwrap().push(FakeNat {
            id: id.to_string(),
            state,
            settle_checks,
        });
    }

    pub fn add_address(&self, allocation_id: &str) {
        self.addresses.lock().unwrap().push(allocation_id.to_string());
    }

    /// Make every delete of this id fail.
    pub fn fail_delete(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn remaining_groups(&self) -> usize {
        self.groups.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        count_mutations(&self.calls())
    }

    /// Position of the first call starting with `prefix`, for order asserts.
    pub fn call_position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.starts_with(prefix))
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, id: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(id) {
            bail!("simulated control-plane failure for {id}");
        }
        Ok(())
    }
}

impl NetworkOps for FakeNetwork {
    async fn find_vpc(&self, _cluster: &str) -> Result<Option<String>> {
        self.record("find-vpc".to_string());
        Ok(self.vpc.lock().unwrap().clone())
    }

    async fn list_interface_endpoints(&self, _vpc: &str) -> Result<Vec<String>> {
        self.record("list endpoints".to_string());
        Ok(self.endpoints.lock().unwrap().clone())
    }

    async fn delete_interface_endpoint(&self, id: &str) -> Result<()> {
        self.record(format!("delete endpoint {id}"));
        self.check_failure(id)?;
        self.endpoints.lock().unwrap().retain(|e| e != id);
        Ok(())
    }

    async fn list_available_interfaces(&self, _vpc: &str) -> Result<Vec<String>> {
        self.record("list interfaces".to_string());
        Ok(self.interfaces.lock().unwrap().clone())
    }

    async fn delete_interface(&self, id: &str) -> Result<()> {
        self.record(format!("delete interface {id}"));
        self.check_failure(id)?;
        self.interfaces.lock().unwrap().retain(|e| e != id);
        Ok(())
    }

    async fn list_security_groups(&self, _vpc: &str) -> Result<Vec<SecurityGroupInfo>> {
        self.record("list groups".to_string());
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn strip_rule_references(&self, group_id: &str) -> Result<()> {
        self.record(format!("strip-rules {group_id}"));
        let mut groups = self.groups.lock().unwrap();
        for group in groups.iter_mut() {
            if group.id == group_id {
                group.ingress_refs.clear();
                group.egress_refs.clear();
            }
        }
        Ok(())
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        self.record(format!("delete group {id}"));
        self.check_failure(id)?;
        let mut groups = self.groups.lock().unwrap();
        let referenced = groups.iter().any(|g| {
            g.id != id
                && (g.ingress_refs.iter().any(|r| r == id)
                    || g.egress_refs.iter().any(|r| r == id))
        });
        if referenced {
            bail!("DependencyViolation: group {id} is referenced by another group's rules");
        }
        groups.retain(|g| g.id != id);
        Ok(())
    }

    async fn list_subnets(&self, _vpc: &str) -> Result<Vec<String>> {
        self.record("list subnets".to_string());
        Ok(self.subnets.lock().unwrap().clone())
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        self.record(format!("delete subnet {id}"));
        self.check_failure(id)?;
        self.subnets.lock().unwrap().retain(|e| e != id);
        Ok(())
    }

    async fn list_internet_gateways(&self, _vpc: &str) -> Result<Vec<String>> {
        self.record("list igws".to_string());
        Ok(self.igws.lock().unwrap().clone())
    }

    async fn detach_internet_gateway(&self, igw: &str, _vpc: &str) -> Result<()> {
        self.record(format!("detach igw {igw}"));
        Ok(())
    }

    async fn delete_internet_gateway(&self, igw: &str) -> Result<()> {
        self.record(format!("delete igw {igw}"));
        self.check_failure(igw)?;
        self.igws.lock().unwrap().retain(|e| e != igw);
        Ok(())
    }

    async fn list_route_tables(&self, _vpc: &str) -> Result<Vec<RouteTableInfo>> {
        self.record("list route-tables".to_string());
        Ok(self.route_tables.lock().unwrap().clone())
    }

    async fn disassociate_route_table(&self, association_id: &str) -> Result<()> {
        self.record(format!("disassociate {association_id}"));
        Ok(())
    }

    async fn delete_route_table(&self, id: &str) -> Result<()> {
        self.record(format!("delete route-table {id}"));
        self.check_failure(id)?;
        self.route_tables.lock().unwrap().retain(|t| t.id != id);
        Ok(())
    }

    async fn list_nat_gateways(&self, _vpc: &str) -> Result<Vec<NatGatewayInfo>> {
        self.record("list nats".to_string());
        let mut nats = self.nats.lock().unwrap();
        for nat in nats.iter_mut() {
            if nat.state == NatState::Deleting {
                if nat.settle_checks == 0 {
                    nat.state = NatState::Deleted;
                } else {
                    nat.settle_checks -= 1;
                }
            }
        }
        Ok(nats
            .iter()
            .map(|nat| NatGatewayInfo {
                id: nat.id.clone(),
                state: nat.state,
            })
            .collect())
    }

    async fn delete_nat_gateway(&self, id: &str) -> Result<()> {
        self.record(format!("delete nat {id}"));
        self.check_failure(id)?;
        let mut nats = self.nats.lock().unwrap();
        for nat in nats.iter_mut() {
            if nat.id == id {
                nat.state = NatState::Deleting;
            }
        }
        Ok(())
    }

    async fn list_cluster_addresses(&self, _cluster: &str) -> Result<Vec<String>> {
        self.record("list addresses".to_string());
        Ok(self.addresses.lock().unwrap().clone())
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        self.record(format!("release address {allocation_id}"));
        self.check_failure(allocation_id)?;
        self.addresses.lock().unwrap().retain(|a| a != allocation_id);
        Ok(())
    }

    async fn delete_vpc(&self, id: &str) -> Result<()> {
        self.record(format!("delete vpc {id}"));
        self.check_failure(id)?;
        *self.vpc.lock().unwrap() = None;
        Ok(())
    }
}

// ── Stacks ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct FakeStack {
    delete_failed: bool,
    blocking: Vec<String>,
    retained_delete_fails: bool,
}

/// In-memory declarative stacks with configurable delete failures.
#[derive(Default)]
pub struct FakeStacks {
    stacks: Mutex<HashMap<String, FakeStack>>,
    calls: Mutex<Vec<String>>,
}

impl FakeStacks {
    /// A stack that deletes cleanly.
    pub fn add_stack(&self, name: &str) {
        self.stacks.lock().unwrap().insert(
            name.to_string(),
            FakeStack {
                delete_failed: false,
                blocking: Vec::new(),
                retained_delete_fails: false,
            },
        );
    }

    /// A stack whose plain delete fails on the listed resources but whose
    /// retained delete succeeds.
    pub fn add_failing_stack(&self, name: &str, blocking: &[&str]) {
        self.stacks.lock().unwrap().insert(
            name.to_string(),
            FakeStack {
                delete_failed: false,
                blocking: blocking.iter().map(|s| s.to_string()).collect(),
                retained_delete_fails: false,
            },
        );
    }

    /// A stack that fails even with blocking resources retained.
    pub fn add_hopeless_stack(&self, name: &str, blocking: &[&str]) {
        self.stacks.lock().unwrap().insert(
            name.to_string(),
            FakeStack {
                delete_failed: false,
                blocking: blocking.iter().map(|s| s.to_string()).collect(),
                retained_delete_fails: true,
            },
        );
    }

    pub fn exists(&self, name: &str) -> bool {
        self.stacks.lock().unwrap().contains_key(name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        count_mutations(&self.calls())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StackOps for FakeStacks {
    async fn status(&self, name: &str) -> Result<Option<StackState>> {
        self.record(format!("status {name}"));
        Ok(self.stacks.lock().unwrap().get(name).map(|stack| {
            if stack.delete_failed {
                StackState::DeleteFailed
            } else {
                StackState::Other
            }
        }))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.record(format!("delete {name}"));
        let mut stacks = self.stacks.lock().unwrap();
        if let Some(stack) = stacks.get_mut(name) {
            if stack.blocking.is_empty() {
                stacks.remove(name);
            } else {
                stack.delete_failed = true;
            }
        }
        Ok(())
    }

    async fn delete_retaining(&self, name: &str, resources: &[String]) -> Result<()> {
        self.record(format!("delete-retaining {name} [{}]", resources.join(",")));
        let mut stacks = self.stacks.lock().unwrap();
        if let Some(stack) = stacks.get(name) {
            if !stack.retained_delete_fails {
                stacks.remove(name);
            }
        }
        Ok(())
    }

    async fn failed_resources(&self, name: &str) -> Result<Vec<String>> {
        self.record(format!("events {name}"));
        Ok(self
            .stacks
            .lock()
            .unwrap()
            .get(name)
            .map(|stack| stack.blocking.clone())
            .unwrap_or_default())
    }
}

// ── Instance profiles ──────────────────────────────────────────────────────

/// In-memory instance profiles discoverable by role and by name prefix.
#[derive(Default)]
pub struct FakeProfiles {
    by_role: Mutex<HashMap<String, Vec<String>>>,
    profiles: Mutex<Vec<InstanceProfile>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProfiles {
    pub fn add_profile(&self, name: &str, roles: &[&str]) {
        let profile = InstanceProfile {
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        for role in roles {
            self.by_role
                .lock()
                .unwrap()
                .entry(role.to_string())
                .or_default()
                .push(name.to_string());
        }
        self.profiles.lock().unwrap().push(profile);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.profiles.lock().unwrap().iter().any(|p| p.name == name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn mutation_count(&self) -> usize {
        count_mutations(&self.calls())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ProfileOps for FakeProfiles {
    async fn profiles_for_role(&self, role: &str) -> Result<Vec<InstanceProfile>> {
        self.record(format!("list-for-role {role}"));
        let names = self
            .by_role
            .lock()
            .unwrap()
            .get(role)
            .cloned()
            .unwrap_or_default();
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| names.contains(&p.name))
            .cloned()
            .collect())
    }

    async fn profiles_with_prefix(&self, prefix: &str) -> Result<Vec<InstanceProfile>> {
        self.record(format!("list-by-prefix {prefix}"));
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn remove_role(&self, profile: &str, role: &str) -> Result<()> {
        self.record(format!("remove-role {profile} {role}"));
        let mut profiles = self.profiles.lock().unwrap();
        for entry in profiles.iter_mut() {
            if entry.name == profile {
                entry.roles.retain(|r| r != role);
            }
        }
        Ok(())
    }

    async fn delete_profile(&self, name: &str) -> Result<()> {
        self.record(format!("delete-profile {name}"));
        self.profiles.lock().unwrap().retain(|p| p.name != name);
        for names in self.by_role.lock().unwrap().values_mut() {
            names.retain(|n| n != name);
        }
        Ok(())
    }
}

// ── Orphans ────────────────────────────────────────────────────────────────

/// Canned orphan query results plus a record of what was deleted.
#[derive(Default)]
pub struct FakeOrphans {
    results: Mutex<Vec<(OrphanQuery, Vec<String>)>>,
    deleted: Mutex<Vec<(ResourceKind, String)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeOrphans {
    pub fn add_result(&self, query: OrphanQuery, ids: &[&str]) {
        self.results
            .lock()
            .unwrap()
            .push((query, ids.iter().map(|s| s.to_string()).collect()));
    }

    pub fn deleted(&self) -> Vec<(ResourceKind, String)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        count_mutations(&self.calls())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl OrphanOps for FakeOrphans {
    async fn search(&self, query: &OrphanQuery) -> Result<Vec<String>> {
        self.record(format!("search {query}"));
        let deleted = self.deleted.lock().unwrap();
        Ok(self
            .results
            .lock()
            .unwrap()
            .iter()
            .find(|(candidate, _)| candidate == query)
            .map(|(_, ids)| {
                ids.iter()
                    .filter(|id| !deleted.iter().any(|(k, d)| *k == query.kind && d == *id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.record(format!("delete {kind} {id}"));
        self.deleted.lock().unwrap().push((kind, id.to_string()));
        Ok(())
    }
}
