//! End-to-end teardown scenarios against the fake providers
//!
//! These exercise the orchestration contract: phase ordering, best-effort
//! continuation, escalation timing, dry-run purity, and idempotence. All
//! waits run under tokio's paused clock where a ceiling must elapse.

use scuttle::aws::iam::detach_instance_profiles;
use scuttle::aws::orphan::{audit_orphans, DiscoveryFilter, OrphanQuery};
use scuttle::aws::stack::destroy_stacks;
use scuttle::aws::vpc::{sweep_network, NatState, SecurityGroupInfo};
use scuttle::cluster::{ObjectRef, APPLICATIONS, NODE_POOLS};
use scuttle::phases::{run_teardown, Providers};
use scuttle::session::SessionContext;
use scuttle::testing::{
    test_config, FakeBehavior, FakeCluster, FakeNetwork, FakeOrphans, FakeProfiles, FakeStacks,
};
use scuttle_common::ResourceKind;

fn empty_providers() -> Providers<FakeCluster, FakeNetwork, FakeStacks, FakeProfiles, FakeOrphans> {
    Providers {
        cluster: Some(FakeCluster::new()),
        network: FakeNetwork::default(),
        stacks: FakeStacks::default(),
        profiles: FakeProfiles::default(),
        orphans: FakeOrphans::default(),
    }
}

fn populated_providers(
) -> Providers<FakeCluster, FakeNetwork, FakeStacks, FakeProfiles, FakeOrphans> {
    let providers = empty_providers();

    let cluster = providers.cluster.as_ref().unwrap();
    cluster.add_object(
        &APPLICATIONS,
        ObjectRef::namespaced("web", "platform"),
        FakeBehavior::Clean,
    );
    cluster.add_object(
        &NODE_POOLS,
        ObjectRef::cluster_scoped("standard"),
        FakeBehavior::Clean,
    );

    providers.network.set_vpc("vpc-1");
    providers.network.add_endpoint("vpce-1");
    providers.network.add_subnet("subnet-1");

    providers.stacks.add_stack("atlas-dev-addons");
    providers.stacks.add_stack("atlas-dev-network");

    providers.profiles.add_profile("atlas-dev-node", &["atlas-dev-node"]);

    providers.orphans.add_result(
        OrphanQuery {
            kind: ResourceKind::SecurityGroup,
            filter: DiscoveryFilter::NamePrefix("atlas-dev-".to_string()),
        },
        &["sg-orphan"],
    );

    providers
}

fn total_mutations(
    providers: &Providers<FakeCluster, FakeNetwork, FakeStacks, FakeProfiles, FakeOrphans>,
) -> usize {
    providers.cluster.as_ref().unwrap().mutation_count()
        + providers.network.mutation_count()
        + providers.stacks.mutation_count()
        + providers.profiles.mutation_count()
        + providers.orphans.mutation_count()
}

#[tokio::test(start_paused = true)]
async fn second_run_against_empty_environment_mutates_nothing() {
    let providers = populated_providers();

    let mut ctx = SessionContext::new(&test_config(false));
    let report = run_teardown(&mut ctx, &providers).await;
    assert_eq!(report.exit_code(), 0, "clean teardown must exit zero");
    let after_first = total_mutations(&providers);
    assert!(after_first > 0, "first run must delete the populated state");

    let mut ctx = SessionContext::new(&test_config(false));
    let report = run_teardown(&mut ctx, &providers).await;
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        total_mutations(&providers),
        after_first,
        "second run against the emptied environment must issue zero mutating calls"
    );
}

#[tokio::test]
async fn dry_run_issues_no_mutating_calls() {
    let providers = populated_providers();

    let mut ctx = SessionContext::new(&test_config(true));
    let report = run_teardown(&mut ctx, &providers).await;

    assert_eq!(total_mutations(&providers), 0);
    assert_eq!(report.errors, 0);
    assert_eq!(report.exit_code(), 0);

    // Discovery still runs so the plan reflects real state
    let cluster = providers.cluster.as_ref().unwrap();
    assert!(cluster.call_count("list") > 0);
    assert!(providers
        .network
        .calls()
        .iter()
        .any(|call| call.starts_with("list")));
}

#[tokio::test(start_paused = true)]
async fn stuck_provisioning_object_records_one_error_and_one_strip() {
    let providers = empty_providers();
    let cluster = providers.cluster.as_ref().unwrap();
    cluster.install_class(&APPLICATIONS);
    cluster.add_object(
        &NODE_POOLS,
        ObjectRef::cluster_scoped("standard"),
        FakeBehavior::Clean,
    );
    cluster.add_object(
        &NODE_POOLS,
        ObjectRef::cluster_scoped("gpu"),
        FakeBehavior::Stuck,
    );

    let mut ctx = SessionContext::new(&test_config(false));
    let report = run_teardown(&mut ctx, &providers).await;

    assert_eq!(report.errors, 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        cluster.call_count("patch nodepools/"),
        1,
        "exactly one finalizer strip must be issued"
    );
    assert_eq!(cluster.call_count("patch nodepools/gpu"), 1);
}

#[tokio::test]
async fn object_deleted_within_window_never_gets_finalizer_patch() {
    let providers = empty_providers();
    let cluster = providers.cluster.as_ref().unwrap();
    cluster.add_object(
        &NODE_POOLS,
        ObjectRef::cluster_scoped("standard"),
        FakeBehavior::Clean,
    );

    let mut ctx = SessionContext::new(&test_config(false));
    let report = run_teardown(&mut ctx, &providers).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(cluster.call_count("patch"), 0);
}

#[tokio::test]
async fn unreachable_cluster_skips_cluster_phase() {
    let providers = populated_providers();

    let mut ctx = SessionContext::new(&test_config(false));
    ctx.cluster_available = false;
    let report = run_teardown(&mut ctx, &providers).await;

    let cluster = providers.cluster.as_ref().unwrap();
    assert_eq!(cluster.calls().len(), 0, "cluster API must not be touched");
    let outcome = &report.phases[0];
    assert!(outcome.skipped);
    assert_eq!(report.exit_code(), 0, "degraded capability is not an error");
}

#[tokio::test]
async fn cross_referencing_security_groups_are_both_deleted() {
    let network = FakeNetwork::with_vpc("vpc-1");
    network.add_group(SecurityGroupInfo {
        id: "sg-a".to_string(),
        name: "atlas-dev-node".to_string(),
        ingress_refs: vec!["sg-b".to_string()],
        egress_refs: Vec::new(),
    });
    network.add_group(SecurityGroupInfo {
        id: "sg-b".to_string(),
        name: "atlas-dev-control".to_string(),
        ingress_refs: vec!["sg-a".to_string()],
        egress_refs: Vec::new(),
    });

    let mut ctx = SessionContext::new(&test_config(false));
    sweep_network(&mut ctx, &network).await.unwrap();

    assert_eq!(ctx.error_count(), 0);
    assert_eq!(network.remaining_groups(), 0, "both groups must be deleted");

    // Both groups lose their referencing rules before either delete
    let strip_a = network.call_position("strip-rules sg-a").unwrap();
    let strip_b = network.call_position("strip-rules sg-b").unwrap();
    let delete_a = network.call_position("delete group sg-a").unwrap();
    let delete_b = network.call_position("delete group sg-b").unwrap();
    assert!(strip_a < delete_a && strip_a < delete_b);
    assert!(strip_b < delete_a && strip_b < delete_b);
}

#[tokio::test(start_paused = true)]
async fn vpc_delete_is_attempted_last_even_after_errors() {
    let network = FakeNetwork::with_vpc("vpc-1");
    network.add_endpoint("vpce-1");
    network.add_endpoint("vpce-2");
    network.fail_delete("vpce-2");
    network.add_nat("nat-1", NatState::Available, 1);
    network.add_address("eipalloc-1");

    let mut ctx = SessionContext::new(&test_config(false));
    sweep_network(&mut ctx, &network).await.unwrap();

    assert!(ctx.error_count() > 0, "the failed endpoint must be recorded");

    let endpoint = network.call_position("delete endpoint vpce-1").unwrap();
    let nat = network.call_position("delete nat nat-1").unwrap();
    let address = network.call_position("release address eipalloc-1").unwrap();
    let vpc = network.call_position("delete vpc vpc-1").unwrap();
    assert!(endpoint < nat, "endpoints before NAT gateways");
    assert!(nat < address, "NAT gateways before elastic IP release");
    assert!(address < vpc, "elastic IPs before the VPC");
    assert_eq!(
        vpc,
        network.calls().len() - 1,
        "the VPC delete must be the final call"
    );
}

#[tokio::test]
async fn failing_stack_is_retried_with_blocking_resources_retained() {
    let stacks = FakeStacks::default();
    stacks.add_failing_stack("atlas-dev-cluster", &["NodeSecurityGroup"]);
    stacks.add_stack("atlas-dev-network");

    let mut ctx = SessionContext::new(&test_config(false));
    destroy_stacks(&mut ctx, &stacks).await.unwrap();

    assert_eq!(ctx.error_count(), 0);
    assert!(stacks
        .calls()
        .iter()
        .any(|call| call == "delete-retaining atlas-dev-cluster [NodeSecurityGroup]"));
    assert!(!stacks.exists("atlas-dev-cluster"));
    assert!(!stacks.exists("atlas-dev-network"));
}

#[tokio::test]
async fn hopeless_stack_records_error_without_blocking_later_stacks() {
    let stacks = FakeStacks::default();
    stacks.add_hopeless_stack("atlas-dev-nodegroup", &["NodeRole"]);
    stacks.add_stack("atlas-dev-network");

    let mut ctx = SessionContext::new(&test_config(false));
    destroy_stacks(&mut ctx, &stacks).await.unwrap();

    assert_eq!(ctx.error_count(), 1);
    assert!(
        !stacks.exists("atlas-dev-network"),
        "later stacks must still be attempted"
    );
    assert!(stacks.exists("atlas-dev-nodegroup"));
}

#[tokio::test]
async fn stacks_are_destroyed_in_reverse_dependency_order() {
    let stacks = FakeStacks::default();
    stacks.add_stack("atlas-dev-addons");
    stacks.add_stack("atlas-dev-cluster");
    stacks.add_stack("atlas-dev-network");

    let mut ctx = SessionContext::new(&test_config(false));
    destroy_stacks(&mut ctx, &stacks).await.unwrap();

    let calls = stacks.calls();
    let position = |name: &str| {
        calls
            .iter()
            .position(|call| call == &format!("delete {name}"))
            .unwrap()
    };
    assert!(position("atlas-dev-addons") < position("atlas-dev-cluster"));
    assert!(position("atlas-dev-cluster") < position("atlas-dev-network"));
}

#[tokio::test]
async fn profiles_from_both_strategies_are_deduplicated() {
    let profiles = FakeProfiles::default();
    // Visible both via the node role and via the name prefix
    profiles.add_profile("atlas-dev-node", &["atlas-dev-node"]);
    // Provisioner-created profile whose role is already gone
    profiles.add_profile("atlas-dev-karpenter-7f2a", &[]);

    let mut ctx = SessionContext::new(&test_config(false));
    detach_instance_profiles(&mut ctx, &profiles).await.unwrap();

    assert_eq!(ctx.error_count(), 0);
    assert!(!profiles.exists("atlas-dev-node"));
    assert!(!profiles.exists("atlas-dev-karpenter-7f2a"));
    assert_eq!(
        profiles.call_count("delete-profile atlas-dev-node"),
        1,
        "a profile matching both discovery strategies gets exactly one delete"
    );

    // The attached role is detached before the profile delete
    let calls = profiles.calls();
    let detach = calls
        .iter()
        .position(|c| c == "remove-role atlas-dev-node atlas-dev-node")
        .unwrap();
    let delete = calls
        .iter()
        .position(|c| c == "delete-profile atlas-dev-node")
        .unwrap();
    assert!(detach < delete);
}

#[tokio::test]
async fn orphan_audit_deduplicates_across_overlapping_queries() {
    let orphans = FakeOrphans::default();
    let cluster_tag = OrphanQuery {
        kind: ResourceKind::SecurityGroup,
        filter: DiscoveryFilter::Tag {
            key: "kubernetes.io/cluster/atlas-dev".to_string(),
            value: None,
        },
    };
    let prefix = OrphanQuery {
        kind: ResourceKind::SecurityGroup,
        filter: DiscoveryFilter::NamePrefix("atlas-dev-".to_string()),
    };
    orphans.add_result(cluster_tag, &["sg-1", "sg-2"]);
    orphans.add_result(prefix, &["sg-2", "sg-3"]);

    let mut ctx = SessionContext::new(&test_config(false));
    audit_orphans(&mut ctx, &orphans).await.unwrap();

    let deleted = orphans.deleted();
    assert_eq!(deleted.len(), 3);
    let sg2_deletes = deleted.iter().filter(|(_, id)| id == "sg-2").count();
    assert_eq!(sg2_deletes, 1, "overlap must be deduplicated before deletion");
}

#[tokio::test]
async fn network_error_flips_the_exit_code() {
    let providers = empty_providers();
    providers.network.set_vpc("vpc-1");
    providers.network.add_subnet("subnet-1");
    providers.network.fail_delete("subnet-1");

    let mut ctx = SessionContext::new(&test_config(false));
    let report = run_teardown(&mut ctx, &providers).await;

    assert_eq!(report.errors, 1);
    assert_eq!(report.exit_code(), 1);
}
