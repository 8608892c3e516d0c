//! Default poll intervals and wait ceilings shared across phases
//!
//! Every wait in the orchestrator is a fixed-interval bounded poll; these
//! constants keep the ceilings consistent between the phases and their tests.

/// Fixed interval between remaining-count polls
pub const POLL_INTERVAL_SECS: u64 = 5;

/// Ceiling for control objects whose deletion is quick (CR cleanup)
pub const CONTROL_OBJECT_TIMEOUT_SECS: u64 = 30;

/// Ceiling for cloud load-balancer release behind Services/Ingress
pub const LB_RELEASE_TIMEOUT_SECS: u64 = 120;

/// Ceiling for compute-node drain and termination
pub const NODE_DRAIN_TIMEOUT_SECS: u64 = 300;

/// Ceiling for storage-claim release
pub const STORAGE_RELEASE_TIMEOUT_SECS: u64 = 60;

/// Grace period after the one-time finalizer-strip escalation
pub const ESCALATION_GRACE_SECS: u64 = 30;

/// Ceiling for interface endpoints to release their network interfaces
pub const ENDPOINT_RELEASE_TIMEOUT_SECS: u64 = 120;

/// Ceiling for a NAT gateway to leave its transitional states
pub const NAT_RELEASE_TIMEOUT_SECS: u64 = 180;

/// Interval between declarative stack status polls
pub const STACK_POLL_INTERVAL_SECS: u64 = 15;

/// Ceiling for a single declarative stack deletion
pub const STACK_DELETE_TIMEOUT_SECS: u64 = 1800;

/// Declarative stack name suffixes in destroy order (reverse of creation)
pub const STACK_SUFFIXES: &[&str] = &["addons", "nodegroup", "cluster", "network"];
