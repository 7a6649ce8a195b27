use std::future::Future;

use aws_config::meta::region::ProvideRegion;
use aws_config::profile::profile_file::ProfileFiles;
use aws_config::profile::ProfileFileRegionProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

use crate::error::DeployError;

/// Environment variable holding the default region
pub const DEFAULT_REGION_ENV: &str = "AWS_DEFAULT_REGION";

const DEFAULT_PROFILE: &str = "default";

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the region to deploy to
///
/// Precedence: explicit `--region`, then `AWS_DEFAULT_REGION`, then the
/// `region` key of the profile's section in `~/.aws/config`.
pub async fn resolve_region(
    explicit: Option<&str>,
    profile: Option<&str>,
) -> Result<String, DeployError> {
    let env_region = std::env::var(DEFAULT_REGION_ENV).ok();
    resolve_region_with(explicit, env_region.as_deref(), || profile_region(profile)).await
}

/// Precedence logic behind [`resolve_region`]; the profile file is only read
/// when neither the argument nor the environment provide a region.
pub(crate) async fn resolve_region_with<F, Fut>(
    explicit: Option<&str>,
    env_region: Option<&str>,
    profile_lookup: F,
) -> Result<String, DeployError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<String>>,
{
    if let Some(region) = non_empty(explicit) {
        debug!("Using region {} from --region", region);
        return Ok(region);
    }

    if let Some(region) = non_empty(env_region) {
        debug!("Using region {} from {}", region, DEFAULT_REGION_ENV);
        return Ok(region);
    }

    if let Some(region) = non_empty(profile_lookup().await.as_deref()) {
        debug!("Using region {} from AWS config file", region);
        return Ok(region);
    }

    Err(DeployError::MissingRegion)
}

async fn profile_region(profile: Option<&str>) -> Option<String> {
    region_from_profile_files(profile, ProfileFiles::default()).await
}

/// Read the region from the AWS config file for a profile
///
/// Without a profile the `[default]` section is used. A missing file or
/// section simply yields `None`.
async fn region_from_profile_files(profile: Option<&str>, files: ProfileFiles) -> Option<String> {
    let provider = ProfileFileRegionProvider::builder()
        .profile_files(files)
        .profile_name(profile.unwrap_or(DEFAULT_PROFILE))
        .build();

    provider.region().await.map(|r| r.as_ref().to_string())
}

/// Build the shared SDK configuration for the ECS and CodeDeploy clients
pub async fn load_sdk_config(region: &str, profile: Option<&str>) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));

    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }

    loader.load().await
}
