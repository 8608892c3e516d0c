//! scuttle - graceful decommissioning orchestrator
//!
//! This crate tears down a live compute environment: cluster-resident objects
//! first (so their controllers can release the cloud resources they own),
//! then IAM instance profiles, then the declarative stacks, then whatever
//! networking the stacks left behind, and finally a tag/pattern-based orphan
//! sweep.
//!
//! ## Modules
//!
//! - [`aws`]: Cloud control-plane access (EC2, IAM, ELBv2, CloudFormation, STS)
//! - [`cluster`]: Cluster API access and the resource reaper
//! - [`phases`]: Ordered best-effort phase sequencer
//! - [`preflight`]: Identity, scope, and confirmation gate
//! - [`session`]: Threaded run state and the final report
//! - [`testing`]: Fake providers for exercising teardown logic offline
//! - [`wait`]: Fixed-interval bounded polling

pub mod aws;
pub mod cluster;
pub mod config;
pub mod phases;
pub mod preflight;
pub mod session;
pub mod testing;
pub mod wait;
