use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_codedeploy::types::{AppSpecContent, RevisionLocation, RevisionLocationType};
use aws_sdk_codedeploy::Client as CodeDeployClient;

use super::{format_sdk_error, AppSpecRevision, BlueGreenApi};

/// CodeDeploy blue/green deployments backed by the AWS SDK
pub struct SdkCodeDeploy {
    client: CodeDeployClient,
}

impl SdkCodeDeploy {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: CodeDeployClient::new(config),
        }
    }
}

#[async_trait]
impl BlueGreenApi for SdkCodeDeploy {
    async fn create_deployment(
        &self,
        application: &str,
        deployment_group: &str,
        revision: &AppSpecRevision,
    ) -> Result<String> {
        let location = RevisionLocation::builder()
            .revision_type(RevisionLocationType::AppSpecContent)
            .app_spec_content(
                AppSpecContent::builder()
                    .content(&revision.content)
                    .sha256(&revision.sha256)
                    .build(),
            )
            .build();

        let response = self
            .client
            .create_deployment()
            .application_name(application)
            .deployment_group_name(deployment_group)
            .revision(location)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to create CodeDeploy deployment for '{}/{}': {}",
                    application,
                    deployment_group,
                    format_sdk_error(&e)
                )
            })?;

        response
            .deployment_id()
            .map(str::to_string)
            .context("CreateDeployment returned no deployment id")
    }
}
