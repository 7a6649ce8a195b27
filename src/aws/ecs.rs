use anyhow::anyhow;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecs::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ecs::types::DesiredStatus;
use aws_sdk_ecs::Client as EcsClient;
use tracing::debug;

use super::{
    format_sdk_error, EcsApi, EcsError, RunningTask, TaskDefinition, TaskDefinitionPayload,
    TaskSettings,
};

const CLUSTER_NOT_FOUND: &str = "Cluster not found.";
const TASKS_CANNOT_BE_EMPTY: &str = "Tasks cannot be empty.";

/// DescribeTasks accepts at most 100 task ARNs per call
const DESCRIBE_TASKS_BATCH: usize = 100;

/// Map an ECS SDK error onto the conditions the deployer cares about
///
/// ECS signals a missing cluster and an empty task list only through the
/// error code / message, so classification is done on those.
fn classify_sdk_error<E, R>(
    err: SdkError<E, R>,
    cluster: &str,
    service: Option<&str>,
    action: &str,
) -> EcsError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    if let Some(service_err) = err.as_service_error() {
        let code = service_err.code();
        let message = service_err.message();

        if code == Some("ClusterNotFoundException") || message == Some(CLUSTER_NOT_FOUND) {
            return EcsError::ClusterNotFound(cluster.to_string());
        }
        if message == Some(TASKS_CANNOT_BE_EMPTY) {
            return EcsError::EmptyTasks;
        }
        if let (Some("ServiceNotFoundException"), Some(service)) = (code, service) {
            return EcsError::ServiceNotFound(service.to_string());
        }
    }

    EcsError::Api(anyhow!("Failed to {}: {}", action, format_sdk_error(&err)))
}

/// ECS API backed by the AWS SDK
pub struct SdkEcs {
    client: EcsClient,
}

impl SdkEcs {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: EcsClient::new(config),
        }
    }
}

#[async_trait]
impl EcsApi for SdkEcs {
    async fn service_task_definition(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<String, EcsError> {
        let response = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error(e, cluster, Some(service), "describe ECS service")
            })?;

        for failure in response.failures() {
            debug!(
                "DescribeServices failure for {}: {}",
                failure.arn().unwrap_or(service),
                failure.reason().unwrap_or("unknown")
            );
        }

        response
            .services()
            .first()
            .and_then(|s| s.task_definition())
            .map(str::to_string)
            .ok_or_else(|| EcsError::ServiceNotFound(service.to_string()))
    }

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<TaskDefinition, EcsError> {
        let response = self
            .client
            .describe_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .map_err(|e| {
                EcsError::Api(anyhow!(
                    "Failed to describe task definition '{}': {}",
                    task_definition,
                    format_sdk_error(&e)
                ))
            })?;

        let td = response.task_definition().ok_or_else(|| {
            anyhow!(
                "DescribeTaskDefinition returned no task definition for '{}'",
                task_definition
            )
        })?;

        Ok(TaskDefinition {
            arn: td
                .task_definition_arn()
                .unwrap_or(task_definition)
                .to_string(),
            family: td.family().unwrap_or_default().to_string(),
            volumes: td.volumes().to_vec(),
            containers: td.container_definitions().to_vec(),
            settings: TaskSettings {
                task_role_arn: td.task_role_arn().map(str::to_string),
                execution_role_arn: td.execution_role_arn().map(str::to_string),
                network_mode: td.network_mode().cloned(),
                requires_compatibilities: td.requires_compatibilities().to_vec(),
                cpu: td.cpu().map(str::to_string),
                memory: td.memory().map(str::to_string),
            },
        })
    }

    async fn register_task_definition(
        &self,
        payload: &TaskDefinitionPayload,
    ) -> Result<String, EcsError> {
        let settings = &payload.settings;
        let compatibilities = if settings.requires_compatibilities.is_empty() {
            None
        } else {
            Some(settings.requires_compatibilities.clone())
        };

        let response = self
            .client
            .register_task_definition()
            .family(&payload.family)
            .set_volumes(Some(payload.volumes.clone()))
            .set_container_definitions(Some(payload.containers.clone()))
            .set_task_role_arn(settings.task_role_arn.clone())
            .set_execution_role_arn(settings.execution_role_arn.clone())
            .set_network_mode(settings.network_mode.clone())
            .set_requires_compatibilities(compatibilities)
            .set_cpu(settings.cpu.clone())
            .set_memory(settings.memory.clone())
            .send()
            .await
            .map_err(|e| {
                EcsError::Api(anyhow!(
                    "Failed to register task definition for family '{}': {}",
                    payload.family,
                    format_sdk_error(&e)
                ))
            })?;

        let arn = response
            .task_definition()
            .and_then(|td| td.task_definition_arn())
            .ok_or_else(|| anyhow!("RegisterTaskDefinition returned no task definition ARN"))?;

        Ok(arn.to_string())
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> Result<(), EcsError> {
        self.client
            .update_service()
            .cluster(cluster)
            .service(service)
            .task_definition(task_definition_arn)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, cluster, Some(service), "update ECS service"))?;

        Ok(())
    }

    async fn list_running_tasks(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<String>, EcsError> {
        let response = self
            .client
            .list_tasks()
            .cluster(cluster)
            .service_name(service)
            .desired_status(DesiredStatus::Running)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, cluster, Some(service), "list tasks"))?;

        Ok(response.task_arns().to_vec())
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_arns: &[String],
    ) -> Result<Vec<RunningTask>, EcsError> {
        if task_arns.is_empty() {
            return Ok(Vec::new());
        }

        let mut tasks = Vec::new();
        for batch in task_arns.chunks(DESCRIBE_TASKS_BATCH) {
            let response = self
                .client
                .describe_tasks()
                .cluster(cluster)
                .set_tasks(Some(batch.to_vec()))
                .send()
                .await
                .map_err(|e| classify_sdk_error(e, cluster, None, "describe tasks"))?;

            tasks.extend(response.tasks().iter().map(|task| RunningTask {
                task_arn: task.task_arn().unwrap_or_default().to_string(),
                task_definition_arn: task.task_definition_arn().unwrap_or_default().to_string(),
                last_status: task.last_status().map(str::to_string),
            }));
        }

        Ok(tasks)
    }
}
