// Command line arguments and their validation into DeployOptions

use clap::Args;
use std::time::Duration;
use tracing::warn;

use super::rollout::RolloutSettings;
use super::task_definition::ImageOverride;
use crate::error::DeployError;

/// Deployment arguments, flattened into the top-level command
#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// AWS region (falls back to AWS_DEFAULT_REGION, then ~/.aws/config)
    #[arg(short, long)]
    pub region: Option<String>,

    /// AWS credentials profile
    #[arg(short, long)]
    pub profile: Option<String>,

    /// ECS cluster name
    #[arg(short, long, default_value = "default")]
    pub cluster: String,

    /// ECS service to deploy to
    #[arg(short = 's', long = "service-name")]
    pub service: Option<String>,

    /// Task definition to base the new revision on (family, family:revision or ARN)
    #[arg(short = 'd', long)]
    pub task_definition: Option<String>,

    /// Copy every container image from this service's current task definition.
    /// Images given with --image are applied afterwards and win for the same container.
    #[arg(short = 'k', long = "copy-images", value_name = "SERVICE")]
    pub copy_images: Option<String>,

    /// Base the new revision on the task definition the service currently runs
    #[arg(short, long)]
    pub update: bool,

    /// Replace a container's image. Can be specified multiple times.
    #[arg(
        short = 'i',
        long = "image",
        num_args = 2,
        value_names = ["CONTAINER", "IMAGE"],
        action = clap::ArgAction::Append
    )]
    pub images: Vec<String>,

    /// Seconds to wait for the new task definition to be running
    #[arg(short, long, default_value_t = 90)]
    pub timeout: u64,

    /// Seconds to sleep between polls
    #[arg(short, long, default_value_t = 5)]
    pub backoff: u64,

    /// Hand the new revision to CodeDeploy for a blue/green deployment
    #[arg(long)]
    pub code_deploy: bool,

    /// CodeDeploy application name (required with --code-deploy)
    #[arg(short, long)]
    pub app_name: Option<String>,

    /// CodeDeploy deployment group name (required with --code-deploy)
    #[arg(short, long)]
    pub group_name: Option<String>,

    /// Only register a new revision if at least one image changed
    #[arg(short = 'O', long)]
    pub only_if_modified: bool,
}

/// Where the task definition to derive from comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDefinitionSource {
    /// The definition the named service currently runs
    Service(String),
    /// A family, family:revision or ARN given on the command line
    Explicit(String),
}

/// CodeDeploy application and deployment group for blue/green hand-off
#[derive(Debug, Clone, PartialEq)]
pub struct BlueGreenTarget {
    pub application: String,
    pub deployment_group: String,
}

/// Validated deployment options
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOptions {
    pub cluster: String,
    pub service: Option<String>,
    pub source: TaskDefinitionSource,
    pub copy_images_from: Option<String>,
    pub overrides: Vec<ImageOverride>,
    pub only_if_modified: bool,
    pub rollout: RolloutSettings,
    pub blue_green: Option<BlueGreenTarget>,
}

impl DeployOptions {
    /// Validate the argument combination. Never talks to AWS.
    pub fn from_args(args: &DeployArgs) -> Result<Self, DeployError> {
        let blue_green = if args.code_deploy {
            if !cfg!(feature = "codedeploy") {
                return Err(DeployError::usage(
                    "--code-deploy is not supported by this build (enable the 'codedeploy' feature)",
                ));
            }
            match (&args.app_name, &args.group_name) {
                (Some(application), Some(deployment_group)) => Some(BlueGreenTarget {
                    application: application.clone(),
                    deployment_group: deployment_group.clone(),
                }),
                _ => {
                    return Err(DeployError::usage(
                        "You need to specify application name with -a (--app-name) and \
                         deployment group name with -g (--group-name) when using --code-deploy.",
                    ))
                }
            }
        } else {
            None
        };

        if args.copy_images.is_some() && !args.update {
            warn!("Implicitly enabling --update since you're using --copy-images");
        }
        let update = args.update || args.copy_images.is_some();

        if update && args.task_definition.is_some() {
            return Err(DeployError::usage(
                "--update (or --copy-images) and --task-definition cannot be used together",
            ));
        }
        if !update && args.task_definition.is_none() {
            return Err(DeployError::usage(
                "You need to specify a task definition with --task-definition, \
                 use --update or copy images using --copy-images",
            ));
        }

        let source = if update {
            match &args.service {
                Some(service) => TaskDefinitionSource::Service(service.clone()),
                None => {
                    return Err(DeployError::usage(
                        "--update needs the service to update given with -s (--service-name)",
                    ))
                }
            }
        } else {
            match &args.task_definition {
                Some(name) => TaskDefinitionSource::Explicit(name.clone()),
                None => return Err(DeployError::usage("Missing --task-definition")),
            }
        };

        let overrides = args
            .images
            .chunks(2)
            .filter_map(|pair| match pair {
                [container, image] => Some(ImageOverride::new(container, image)),
                _ => None,
            })
            .collect();

        Ok(Self {
            cluster: args.cluster.clone(),
            service: args.service.clone(),
            source,
            copy_images_from: args.copy_images.clone(),
            overrides,
            only_if_modified: args.only_if_modified,
            rollout: RolloutSettings {
                timeout: Duration::from_secs(args.timeout),
                interval: Duration::from_secs(args.backoff),
            },
            blue_green,
        })
    }
}
