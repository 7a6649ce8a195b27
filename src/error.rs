use std::time::Duration;

use crate::aws::EcsError;

/// Every way a deployment can fail.
///
/// `main` is the only place these are turned into a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Invalid combination of command line arguments, detected before any remote call
    #[error("{0}")]
    Usage(String),

    #[error(
        "Unable to identify default AWS region.\n\
         You need to specify a region using either -r (--region), \
         by setting AWS_DEFAULT_REGION variable or by specifying it in ~/.aws/config file."
    )]
    MissingRegion,

    #[error("Unable to locate ARN for task definition")]
    TaskDefinitionNotFound,

    #[error("No container images found to copy from service {0}")]
    NoImagesToCopy(String),

    /// The task definition does not have exactly one port-mapped container
    #[error("{0}")]
    BlueGreenTopology(String),

    #[error(
        "New task definition {task_definition_arn} is not running within {} second(s) \
         (gave up after {polls} poll(s), {} second(s) elapsed)",
        .timeout.as_secs(),
        .elapsed.as_secs()
    )]
    RolloutTimeout {
        task_definition_arn: String,
        timeout: Duration,
        polls: u32,
        elapsed: Duration,
    },

    /// Any other error from AWS, passed through as-is
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl DeployError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

impl From<EcsError> for DeployError {
    fn from(err: EcsError) -> Self {
        match err {
            EcsError::Api(source) => Self::Remote(source),
            other => Self::Remote(anyhow::Error::new(other)),
        }
    }
}
