pub mod ecs;
pub mod region;

#[cfg(feature = "codedeploy")]
pub mod codedeploy;

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_ecs::types::{Compatibility, ContainerDefinition, NetworkMode, Volume};

/// Errors surfaced by the ECS adapter.
///
/// The first three variants are conditions the deployment logic reacts to;
/// everything else is carried unmodified in `Api`.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    #[error("Cluster {0} not found")]
    ClusterNotFound(String),
    #[error("Service {0} not found")]
    ServiceNotFound(String),
    /// ECS rejects DescribeTasks with "Tasks cannot be empty." when nothing runs
    #[error("Tasks cannot be empty")]
    EmptyTasks,
    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

/// Task-level settings carried over verbatim into a new revision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSettings {
    pub task_role_arn: Option<String>,
    pub execution_role_arn: Option<String>,
    pub network_mode: Option<NetworkMode>,
    pub requires_compatibilities: Vec<Compatibility>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

/// A registered task definition as returned by DescribeTaskDefinition
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub arn: String,
    pub family: String,
    pub volumes: Vec<Volume>,
    pub containers: Vec<ContainerDefinition>,
    pub settings: TaskSettings,
}

/// Everything RegisterTaskDefinition needs to create a new revision
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinitionPayload {
    pub family: String,
    pub volumes: Vec<Volume>,
    pub containers: Vec<ContainerDefinition>,
    pub settings: TaskSettings,
}

/// A task as reported by DescribeTasks
#[derive(Debug, Clone, PartialEq)]
pub struct RunningTask {
    pub task_arn: String,
    pub task_definition_arn: String,
    pub last_status: Option<String>,
}

/// The subset of the ECS API the deployer talks to
#[async_trait]
pub trait EcsApi: Send + Sync {
    /// Get the task definition ARN a service currently points at
    async fn service_task_definition(&self, cluster: &str, service: &str)
        -> Result<String, EcsError>;

    /// Fetch a task definition by family, family:revision or full ARN
    async fn describe_task_definition(&self, task_definition: &str)
        -> Result<TaskDefinition, EcsError>;

    /// Register a new revision and return its ARN
    async fn register_task_definition(
        &self,
        payload: &TaskDefinitionPayload,
    ) -> Result<String, EcsError>;

    /// Point a service at a task definition
    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> Result<(), EcsError>;

    /// List the ARNs of tasks with desired status RUNNING for a service
    async fn list_running_tasks(&self, cluster: &str, service: &str)
        -> Result<Vec<String>, EcsError>;

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> Result<Vec<RunningTask>, EcsError>;
}

/// AppSpec revision handed to the blue/green deployment service
#[derive(Debug, Clone, PartialEq)]
pub struct AppSpecRevision {
    pub content: String,
    pub sha256: String,
}

/// Blue/green deployment service (CodeDeploy)
#[async_trait]
pub trait BlueGreenApi: Send + Sync {
    /// Create a deployment and return its id
    async fn create_deployment(
        &self,
        application: &str,
        deployment_group: &str,
        revision: &AppSpecRevision,
    ) -> Result<String>;
}

const MAX_SDK_ERROR_CHARS: usize = 200;

/// Extract a clean error message from an AWS SDK error's Debug output
///
/// The AWS SDK errors have verbose Debug output, but we can extract just the
/// meaningful message by parsing for the `message: Some("...")` pattern.
pub(crate) fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    let debug_str = format!("{:?}", err);

    if let Some(start) = debug_str.find("message: Some(\"") {
        let start = start + 15; // length of 'message: Some("'
        if let Some(end) = debug_str[start..].find("\")") {
            return debug_str[start..start + end].to_string();
        }
    }

    match debug_str.char_indices().nth(MAX_SDK_ERROR_CHARS) {
        Some((cut, _)) => format!("{}...", &debug_str[..cut]),
        None => debug_str,
    }
}
