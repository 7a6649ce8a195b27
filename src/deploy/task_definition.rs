// Deriving a new task definition revision from an existing one

use tracing::{error, info, warn};

use super::options::TaskDefinitionSource;
use crate::aws::{EcsApi, EcsError, TaskDefinition, TaskDefinitionPayload};
use crate::error::DeployError;

/// Replace the image of the container with this exact name
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOverride {
    pub container: String,
    pub image: String,
}

impl ImageOverride {
    pub fn new(container: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            image: image.into(),
        }
    }
}

/// An override that actually changed a container's image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageChange {
    pub container: String,
    pub previous: Option<String>,
    pub image: String,
}

/// The registration payload for a new revision plus what changed
#[derive(Debug, Clone, PartialEq)]
pub struct MutatedTaskDefinition {
    pub payload: TaskDefinitionPayload,
    pub changes: Vec<ImageChange>,
}

impl MutatedTaskDefinition {
    pub fn is_modified(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Build a new payload from `source` with the overrides applied in order
///
/// `source` is cloned, never modified. Only the image field of containers
/// whose name matches exactly is touched.
pub fn apply_image_overrides(
    source: &TaskDefinition,
    overrides: &[ImageOverride],
) -> MutatedTaskDefinition {
    let mut payload = TaskDefinitionPayload {
        family: source.family.clone(),
        volumes: source.volumes.clone(),
        containers: source.containers.clone(),
        settings: source.settings.clone(),
    };
    let mut changes = Vec::new();

    for image_override in overrides {
        let Some(container) = payload
            .containers
            .iter_mut()
            .find(|c| c.name() == Some(image_override.container.as_str()))
        else {
            warn!(
                "No container named '{}' in task definition {}",
                image_override.container, source.arn
            );
            continue;
        };

        if container.image() == Some(image_override.image.as_str()) {
            continue;
        }

        changes.push(ImageChange {
            container: image_override.container.clone(),
            previous: container.image.clone(),
            image: image_override.image.clone(),
        });
        container.image = Some(image_override.image.clone());
    }

    MutatedTaskDefinition { payload, changes }
}

/// Look up the task definition ARN a service runs
///
/// A missing service or cluster is reported and yields `None`; any other
/// error is returned as-is.
pub async fn service_task_definition_arn(
    ecs: &dyn EcsApi,
    cluster: &str,
    service: &str,
) -> Result<Option<String>, EcsError> {
    match ecs.service_task_definition(cluster, service).await {
        Ok(arn) => Ok(Some(arn)),
        Err(EcsError::ServiceNotFound(_)) => {
            error!("Service {} not found.", service);
            Ok(None)
        }
        Err(EcsError::ClusterNotFound(_)) => {
            error!("Cluster {} not found.", cluster);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Resolve the task definition the new revision is derived from
pub async fn resolve_source_arn(
    ecs: &dyn EcsApi,
    cluster: &str,
    source: &TaskDefinitionSource,
) -> Result<String, DeployError> {
    let arn = match source {
        TaskDefinitionSource::Explicit(name) => Some(name.clone()),
        TaskDefinitionSource::Service(service) => {
            service_task_definition_arn(ecs, cluster, service).await?
        }
    };

    arn.ok_or(DeployError::TaskDefinitionNotFound)
}

/// Turn every container of a sibling service's task definition into an override
pub async fn copy_images(
    ecs: &dyn EcsApi,
    cluster: &str,
    sibling: &str,
) -> Result<Vec<ImageOverride>, DeployError> {
    let arn = service_task_definition_arn(ecs, cluster, sibling)
        .await?
        .ok_or(DeployError::TaskDefinitionNotFound)?;
    let task_definition = ecs.describe_task_definition(&arn).await?;

    let images: Vec<ImageOverride> = task_definition
        .containers
        .iter()
        .filter_map(|c| Some(ImageOverride::new(c.name()?, c.image()?)))
        .collect();

    if images.is_empty() {
        return Err(DeployError::NoImagesToCopy(sibling.to_string()));
    }

    info!("Found and copied these container images:");
    for image in &images {
        info!("  {}: {}", image.container, image.image);
    }

    Ok(images)
}
