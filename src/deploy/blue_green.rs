// CodeDeploy blue/green hand-off: AppSpec content for an ECS service

use anyhow::Context;
use aws_sdk_ecs::types::ContainerDefinition;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::aws::AppSpecRevision;
use crate::error::DeployError;

const ECS_SERVICE_RESOURCE: &str = "AWS::ECS::Service";

/// The container the load balancer routes traffic to
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryContainer {
    pub name: String,
    pub port: i32,
}

#[derive(Serialize)]
struct AppSpec<'a> {
    version: u32,
    #[serde(rename = "Resources")]
    resources: Vec<AppSpecResource<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AppSpecResource<'a> {
    target_service: TargetService<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TargetService<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    properties: TargetServiceProperties<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TargetServiceProperties<'a> {
    task_definition: &'a str,
    load_balancer_info: LoadBalancerInfo<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancerInfo<'a> {
    container_name: &'a str,
    container_port: i32,
}

/// Find the single container that exposes a port
///
/// Only the first port mapping of each container is considered. Zero or
/// several such containers is a configuration error.
pub fn primary_container(
    containers: &[ContainerDefinition],
) -> Result<PrimaryContainer, DeployError> {
    let mut exposed: Vec<PrimaryContainer> = containers
        .iter()
        .filter_map(|c| {
            let port = c.port_mappings().first()?.container_port()?;
            Some(PrimaryContainer {
                name: c.name()?.to_string(),
                port,
            })
        })
        .collect();

    match exposed.len() {
        1 => Ok(exposed.remove(0)),
        0 => Err(DeployError::BlueGreenTopology(
            "Unable to find container definition with portMappings block".to_string(),
        )),
        n => Err(DeployError::BlueGreenTopology(format!(
            "Blue/green deployments need exactly one container with portMappings, found {}",
            n
        ))),
    }
}

/// Render the AppSpec document and its SHA-256 for a task definition
pub fn app_spec_revision(
    task_definition_arn: &str,
    primary: &PrimaryContainer,
) -> Result<AppSpecRevision, DeployError> {
    let app_spec = AppSpec {
        version: 1,
        resources: vec![AppSpecResource {
            target_service: TargetService {
                kind: ECS_SERVICE_RESOURCE,
                properties: TargetServiceProperties {
                    task_definition: task_definition_arn,
                    load_balancer_info: LoadBalancerInfo {
                        container_name: &primary.name,
                        container_port: primary.port,
                    },
                },
            },
        }],
    };

    let content = serde_json::to_string(&app_spec).context("Failed to serialize AppSpec")?;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    Ok(AppSpecRevision { content, sha256 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::fake::{container, port_container};

    #[test]
    fn test_single_port_mapped_container() {
        let primary = primary_container(&[
            container("log-router", "fluent/fluent-bit:2"),
            port_container("app", "myrepo/app:1", 8080),
        ])
        .unwrap();
        assert_eq!(
            primary,
            PrimaryContainer {
                name: "app".to_string(),
                port: 8080,
            }
        );
    }

    #[test]
    fn test_no_port_mapped_container() {
        let result = primary_container(&[container("worker", "myrepo/worker:1")]);
        assert!(matches!(result, Err(DeployError::BlueGreenTopology(_))));
    }

    #[test]
    fn test_two_port_mapped_containers() {
        let result = primary_container(&[
            port_container("app", "myrepo/app:1", 8080),
            port_container("admin", "myrepo/admin:1", 9090),
        ]);
        assert!(matches!(result, Err(DeployError::BlueGreenTopology(_))));
    }

    #[test]
    fn test_app_spec_content_and_checksum() {
        let revision = app_spec_revision(
            "web:4",
            &PrimaryContainer {
                name: "app".to_string(),
                port: 8080,
            },
        )
        .unwrap();

        assert_eq!(
            revision.content,
            r#"{"version":1,"Resources":[{"TargetService":{"Type":"AWS::ECS::Service","Properties":{"TaskDefinition":"web:4","LoadBalancerInfo":{"ContainerName":"app","ContainerPort":8080}}}}]}"#
        );
        assert_eq!(
            revision.sha256,
            "698b460a10f465fde2403932e40e935bad2689e7617222993696fb75b05cef87"
        );
    }
}
