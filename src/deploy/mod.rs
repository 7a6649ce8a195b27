pub mod blue_green;
pub mod options;
pub mod rollout;
pub mod task_definition;

#[cfg(test)]
pub(crate) mod fake;

pub use options::{DeployArgs, DeployOptions};

use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::aws::{BlueGreenApi, EcsApi};
use crate::error::DeployError;
use blue_green::PrimaryContainer;
use options::BlueGreenTarget;
use rollout::RolloutStatus;

/// How a successful run ended
#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    /// `--only-if-modified` was set and no image changed; nothing was registered
    Unchanged { task_definition_arn: String },
    /// A new revision was registered; no service was given to roll it out to
    Registered { task_definition_arn: String },
    /// The service runs the new revision
    Deployed {
        task_definition_arn: String,
        polls: u32,
        elapsed: Duration,
    },
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployOutcome::Unchanged {
                task_definition_arn,
            } => write!(
                f,
                "No container images were updated in {}, nothing to deploy.",
                task_definition_arn
            ),
            DeployOutcome::Registered {
                task_definition_arn,
            } => write!(
                f,
                "Successfully registered task definition {}.",
                task_definition_arn
            ),
            DeployOutcome::Deployed {
                task_definition_arn,
                polls,
                elapsed,
            } => write!(
                f,
                "Service updated successfully, new task definition {} is running \
                 (observed after {} poll(s), {}s).",
                task_definition_arn,
                polls,
                elapsed.as_secs()
            ),
        }
    }
}

/// Register a new task definition revision and roll it out
///
/// Nothing is registered when validation of the source definition fails, and
/// nothing is rolled back when a later step fails.
pub async fn run(
    options: &DeployOptions,
    ecs: &dyn EcsApi,
    code_deploy: Option<&dyn BlueGreenApi>,
) -> Result<DeployOutcome, DeployError> {
    let cluster = options.cluster.as_str();

    let source_arn = task_definition::resolve_source_arn(ecs, cluster, &options.source).await?;
    info!("Deriving new revision from {}", source_arn);

    let mut overrides = Vec::new();
    if let Some(sibling) = &options.copy_images_from {
        overrides = task_definition::copy_images(ecs, cluster, sibling).await?;
    }
    overrides.extend(options.overrides.iter().cloned());

    let source = ecs.describe_task_definition(&source_arn).await?;
    let mutated = task_definition::apply_image_overrides(&source, &overrides);

    for change in &mutated.changes {
        info!(
            "Container {}: {} -> {}",
            change.container,
            change.previous.as_deref().unwrap_or("<none>"),
            change.image
        );
    }

    if options.only_if_modified && !mutated.is_modified() {
        info!("No container images were updated, aborting");
        return Ok(DeployOutcome::Unchanged {
            task_definition_arn: source.arn,
        });
    }

    // Blue/green topology is checked against the source definition before
    // anything is registered.
    let hand_off = match (&options.blue_green, &options.service) {
        (Some(target), Some(_)) => {
            let client = code_deploy.ok_or_else(|| {
                DeployError::usage("Blue/green deployment requested but CodeDeploy is not available")
            })?;
            let primary = blue_green::primary_container(&source.containers)?;
            Some((client, target, primary))
        }
        _ => None,
    };

    let new_arn = ecs.register_task_definition(&mutated.payload).await?;
    println!("New task definition: {}", new_arn);

    let Some(service) = options.service.as_deref() else {
        return Ok(DeployOutcome::Registered {
            task_definition_arn: new_arn,
        });
    };

    match hand_off {
        Some((client, target, primary)) => {
            hand_off_to_blue_green(client, target, &primary, &new_arn).await?;
        }
        None => {
            ecs.update_service(cluster, service, &new_arn).await?;
            info!("Service {} now points at {}", service, new_arn);
        }
    }

    match rollout::wait_for_task(ecs, cluster, service, &new_arn, &options.rollout).await? {
        RolloutStatus::Running { polls, elapsed } => Ok(DeployOutcome::Deployed {
            task_definition_arn: new_arn,
            polls,
            elapsed,
        }),
        RolloutStatus::TimedOut { polls, elapsed } => Err(DeployError::RolloutTimeout {
            task_definition_arn: new_arn,
            timeout: options.rollout.timeout,
            polls,
            elapsed,
        }),
    }
}

async fn hand_off_to_blue_green(
    client: &dyn BlueGreenApi,
    target: &BlueGreenTarget,
    primary: &PrimaryContainer,
    task_definition_arn: &str,
) -> Result<(), DeployError> {
    let revision = blue_green::app_spec_revision(task_definition_arn, primary)?;

    info!(
        "Creating CodeDeploy deployment in {}/{} for container {}:{}",
        target.application, target.deployment_group, primary.name, primary.port
    );
    let deployment_id = client
        .create_deployment(&target.application, &target.deployment_group, &revision)
        .await?;
    info!("Created CodeDeploy deployment {}", deployment_id);

    Ok(())
}
