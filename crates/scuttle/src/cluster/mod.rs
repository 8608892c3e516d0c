//! Cluster API access for the teardown run
//!
//! The reaper drains cluster-resident objects whose controllers must release
//! cloud resources (load balancers, volumes, compute nodes) before the
//! underlying infrastructure can be removed. All access goes through the
//! [`ClusterOps`] trait so the drain logic is testable against a fake; the
//! production implementation wraps a `kube` client using dynamic-typed APIs,
//! since most of the classes are CRDs that may or may not be installed.

pub mod reaper;

use anyhow::{Context, Result};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use scuttle_common::defaults::{
    CONTROL_OBJECT_TIMEOUT_SECS, LB_RELEASE_TIMEOUT_SECS, NODE_DRAIN_TIMEOUT_SECS,
    STORAGE_RELEASE_TIMEOUT_SECS,
};
use scuttle_common::tags::LABEL_NODE_POOL;
use std::future::Future;

/// Reference to a live cluster object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    pub namespace: Option<String>,
}

impl ObjectRef {
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// How a class's listing is narrowed beyond its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassSelector {
    /// Every instance of the kind
    All,
    /// Only Services whose spec.type is LoadBalancer
    LoadBalancerServices,
}

/// One cluster resource class the reaper drains.
#[derive(Debug, Clone)]
pub struct ResourceClass {
    /// Plural name, used for API paths, logs, and error records
    pub name: &'static str,
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub namespaced: bool,
    pub selector: ClassSelector,
    /// Wait ceiling for this class's drain, in seconds
    pub ceiling_secs: u64,
}

/// Application-management objects. Cleared first: their controller would
/// recreate node-provisioning objects removed out of order.
pub const APPLICATIONS: ResourceClass = ResourceClass {
    name: "applications",
    group: "argoproj.io",
    version: "v1alpha1",
    kind: "Application",
    namespaced: true,
    selector: ClassSelector::All,
    ceiling_secs: CONTROL_OBJECT_TIMEOUT_SECS,
};

/// Node-provisioning specs. Cleared while their controller is still alive,
/// since the controller performs the actual compute drain.
pub const NODE_POOLS: ResourceClass = ResourceClass {
    name: "nodepools",
    group: "karpenter.sh",
    version: "v1",
    kind: "NodePool",
    namespaced: false,
    selector: ClassSelector::All,
    ceiling_secs: CONTROL_OBJECT_TIMEOUT_SECS,
};

/// Runtime instantiations of node-provisioning specs; their removal drives
/// compute-instance termination, hence the long ceiling.
pub const NODE_CLAIMS: ResourceClass = ResourceClass {
    name: "nodeclaims",
    group: "karpenter.sh",
    version: "v1",
    kind: "NodeClaim",
    namespaced: false,
    selector: ClassSelector::All,
    ceiling_secs: NODE_DRAIN_TIMEOUT_SECS,
};

/// Services backed by cloud load balancers.
pub const LOAD_BALANCER_SERVICES: ResourceClass = ResourceClass {
    name: "services",
    group: "",
    version: "v1",
    kind: "Service",
    namespaced: true,
    selector: ClassSelector::LoadBalancerServices,
    ceiling_secs: LB_RELEASE_TIMEOUT_SECS,
};

pub const INGRESSES: ResourceClass = ResourceClass {
    name: "ingresses",
    group: "networking.k8s.io",
    version: "v1",
    kind: "Ingress",
    namespaced: true,
    selector: ClassSelector::All,
    ceiling_secs: LB_RELEASE_TIMEOUT_SECS,
};

pub const STORAGE_CLAIMS: ResourceClass = ResourceClass {
    name: "persistentvolumeclaims",
    group: "",
    version: "v1",
    kind: "PersistentVolumeClaim",
    namespaced: true,
    selector: ClassSelector::All,
    ceiling_secs: STORAGE_RELEASE_TIMEOUT_SECS,
};

/// Drain order: application layer, node layer, network-facing objects,
/// storage claims.
pub const TEARDOWN_CLASSES: &[&ResourceClass] = &[
    &APPLICATIONS,
    &NODE_POOLS,
    &NODE_CLAIMS,
    &LOAD_BALANCER_SERVICES,
    &INGRESSES,
    &STORAGE_CLAIMS,
];

/// Trait for cluster operations the reaper needs.
pub trait ClusterOps {
    /// Cheap reachability probe used by preflight.
    fn probe(&self) -> impl Future<Output = Result<()>> + Send;

    /// List live instances of a class. `Ok(None)` means the class's schema
    /// (CRD) is not installed, which callers treat as "skip", not an error.
    fn list(&self, class: &ResourceClass) -> impl Future<Output = Result<Option<Vec<ObjectRef>>>> + Send;

    /// Issue a non-blocking delete. Deleting an absent object is success.
    fn delete(
        &self,
        class: &ResourceClass,
        object: &ObjectRef,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Clear the object's finalizer list so deletion can proceed when the
    /// owning controller is degraded or already gone.
    fn strip_finalizers(
        &self,
        class: &ResourceClass,
        object: &ObjectRef,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Names of nodes managed by the node-provisioning controller.
    fn list_managed_nodes(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Node objects, listed for the second leg of node-termination verification.
const NODES: ResourceClass = ResourceClass {
    name: "nodes",
    group: "",
    version: "v1",
    kind: "Node",
    namespaced: false,
    selector: ClassSelector::All,
    ceiling_secs: NODE_DRAIN_TIMEOUT_SECS,
};

/// Production cluster access over a `kube` client.
pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    /// Connect using the ambient kubeconfig / in-cluster configuration.
    pub async fn connect() -> Result<Self> {
        let client = kube::Client::try_default()
            .await
            .context("Failed to build cluster API client")?;
        Ok(Self { client })
    }

    fn api(&self, class: &ResourceClass, namespace: Option<&str>) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(class.group, class.version, class.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, class.name);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn selected(class: &ResourceClass, object: &DynamicObject) -> bool {
        match class.selector {
            ClassSelector::All => true,
            ClassSelector::LoadBalancerServices => {
                object.data["spec"]["type"].as_str() == Some("LoadBalancer")
            }
        }
    }
}

impl ClusterOps for KubeCluster {
    async fn probe(&self) -> Result<()> {
        self.client
            .apiserver_version()
            .await
            .context("Cluster API server did not answer")?;
        Ok(())
    }

    async fn list(&self, class: &ResourceClass) -> Result<Option<Vec<ObjectRef>>> {
        let api = self.api(class, None);
        match api.list(&ListParams::default()).await {
            Ok(objects) => Ok(Some(
                objects
                    .items
                    .iter()
                    .filter(|o| Self::selected(class, o))
                    .map(|o| ObjectRef {
                        name: o.name_any(),
                        namespace: o.namespace(),
                    })
                    .collect(),
            )),
            // The class's CRD is not installed on this cluster
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to list {}", class.name)),
        }
    }

    async fn delete(&self, class: &ResourceClass, object: &ObjectRef) -> Result<()> {
        let api = self.api(class, object.namespace.as_deref());
        match api.delete(&object.name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {} '{object}'", class.name)),
        }
    }

    async fn strip_finalizers(&self, class: &ResourceClass, object: &ObjectRef) -> Result<()> {
        let api = self.api(class, object.namespace.as_deref());
        let patch = serde_json::json!({"metadata": {"finalizers": null}});
        match api
            .patch(&object.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to strip finalizers from {} '{object}'", class.name)
            }),
        }
    }

    async fn list_managed_nodes(&self) -> Result<Vec<String>> {
        let api = self.api(&NODES, None);
        let params = ListParams::default().labels(LABEL_NODE_POOL);
        let nodes = api
            .list(&params)
            .await
            .context("Failed to list provisioner-managed nodes")?;
        Ok(nodes.items.iter().map(|n| n.name_any()).collect())
    }
}
