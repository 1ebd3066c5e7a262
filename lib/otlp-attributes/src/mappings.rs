//! Remapping tables from OpenTelemetry semantic conventions to Datadog tag names.

use std::sync::LazyLock;

use opentelemetry_semantic_conventions::resource::*;

use crate::{FastHashMap, FastHashSet};

/// Prefix for resource attributes that are forwarded as container tags verbatim.
pub(crate) const CUSTOM_CONTAINER_TAG_PREFIX: &str = "datadog.container.tag.";

/// Prefix for Datadog unified service tagging labels.
pub(crate) const DATADOG_LABEL_PREFIX: &str = "tags.datadoghq.com/";

pub(crate) static CORE_MAPPING: LazyLock<FastHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = FastHashMap::default();
    m.insert("deployment.environment", "env"); // For older semconv versions
    m.insert("deployment.environment.name", "env");
    m.insert(SERVICE_NAME, "service");
    m.insert(SERVICE_VERSION, "version");
    m
});

// Standard Kubernetes labels, see
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
pub(crate) static KUBERNETES_MAPPING: LazyLock<FastHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = FastHashMap::default();
    m.insert("app.kubernetes.io/name", "kube_app_name");
    m.insert("app.kubernetes.io/instance", "kube_app_instance");
    m.insert("app.kubernetes.io/version", "kube_app_version");
    m.insert("app.kubernetes.io/component", "kube_app_component");
    m.insert("app.kubernetes.io/part-of", "kube_app_part_of");
    m.insert("app.kubernetes.io/managed-by", "kube_app_managed_by");
    m
});

// Out of the box Datadog tags for Kubernetes workloads.
// https://docs.datadoghq.com/containers/kubernetes/tag/?tab=containerizedagent#out-of-the-box-tags
//
// Attributes already named like one of these are passed through as-is.
pub(crate) static KUBERNETES_DD_TAGS: LazyLock<FastHashSet<&'static str>> = LazyLock::new(|| {
    [
        "architecture",
        "availability-zone",
        "chronos_job",
        "chronos_job_owner",
        "cluster_name",
        "container_id",
        "container_name",
        "dd_remote_config_id",
        "dd_remote_config_rev",
        "display_container_name",
        "docker_image",
        "ecs_cluster_name",
        "ecs_container_name",
        "eks_fargate_node",
        "env",
        "git.commit.sha",
        "git.repository_url",
        "image_id",
        "image_name",
        "image_tag",
        "kube_app_component",
        "kube_app_instance",
        "kube_app_managed_by",
        "kube_app_name",
        "kube_app_part_of",
        "kube_app_version",
        "kube_container_name",
        "kube_cronjob",
        "kube_daemon_set",
        "kube_deployment",
        "kube_job",
        "kube_namespace",
        "kube_ownerref_kind",
        "kube_ownerref_name",
        "kube_priority_class",
        "kube_qos",
        "kube_replica_set",
        "kube_replication_controller",
        "kube_service",
        "kube_stateful_set",
        "language",
        "marathon_app",
        "mesos_task",
        "nomad_dc",
        "nomad_group",
        "nomad_job",
        "nomad_namespace",
        "nomad_task",
        "oshift_deployment",
        "oshift_deployment_config",
        "os_name",
        "os_version",
        "persistentvolumeclaim",
        "pod_name",
        "pod_phase",
        "rancher_container",
        "rancher_service",
        "rancher_stack",
        "region",
        "service",
        "short_image",
        "swarm_namespace",
        "swarm_service",
        "task_name",
        "task_family",
        "task_version",
        "task_arn",
        "version",
    ]
    .into_iter()
    .collect()
});

pub(crate) static CONTAINER_MAPPINGS: LazyLock<FastHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = FastHashMap::default();
    // Containers
    m.insert(CONTAINER_ID, "container_id");
    m.insert(CONTAINER_NAME, "container_name");
    m.insert(CONTAINER_IMAGE_NAME, "image_name");
    m.insert("container.image.tag", "image_tag"); // For older semconv versions
    m.insert(CONTAINER_RUNTIME, "runtime");

    // Cloud conventions
    m.insert(CLOUD_PROVIDER, "cloud_provider");
    m.insert(CLOUD_REGION, "region");
    m.insert(CLOUD_AVAILABILITY_ZONE, "zone");

    // ECS conventions
    m.insert(AWS_ECS_TASK_FAMILY, "task_family");
    m.insert(AWS_ECS_TASK_ARN, "task_arn");
    m.insert(AWS_ECS_CLUSTER_ARN, "ecs_cluster_name");
    m.insert(AWS_ECS_TASK_REVISION, "task_version");
    m.insert(AWS_ECS_CONTAINER_ARN, "ecs_container_name");

    // Kubernetes resource names
    m.insert(K8S_CONTAINER_NAME, "kube_container_name");
    m.insert(K8S_CLUSTER_NAME, "kube_cluster_name");
    m.insert(K8S_DEPLOYMENT_NAME, "kube_deployment");
    m.insert(K8S_REPLICASET_NAME, "kube_replica_set");
    m.insert(K8S_STATEFULSET_NAME, "kube_stateful_set");
    m.insert(K8S_DAEMONSET_NAME, "kube_daemon_set");
    m.insert(K8S_JOB_NAME, "kube_job");
    m.insert(K8S_CRONJOB_NAME, "kube_cronjob");
    m.insert(K8S_NAMESPACE_NAME, "kube_namespace");
    m.insert(K8S_POD_NAME, "pod_name");
    m
});
