use clap::Parser;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aws;
mod deploy;
mod error;

use aws::ecs::SdkEcs;
use aws::{region, BlueGreenApi};
use deploy::{DeployArgs, DeployOptions, DeployOutcome};
use error::DeployError;

/// Deploy a new container image to an ECS service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    deploy: DeployArgs,
}

#[cfg(feature = "codedeploy")]
fn blue_green_client(
    options: &DeployOptions,
    config: &aws_config::SdkConfig,
) -> Option<Box<dyn BlueGreenApi>> {
    options.blue_green.as_ref().map(|_| {
        Box::new(aws::codedeploy::SdkCodeDeploy::new(config)) as Box<dyn BlueGreenApi>
    })
}

#[cfg(not(feature = "codedeploy"))]
fn blue_green_client(
    _options: &DeployOptions,
    _config: &aws_config::SdkConfig,
) -> Option<Box<dyn BlueGreenApi>> {
    None
}

async fn run(cli: Cli) -> Result<DeployOutcome, DeployError> {
    // Argument validation happens before anything talks to AWS
    let options = DeployOptions::from_args(&cli.deploy)?;

    let profile = cli.deploy.profile.as_deref();
    let region = region::resolve_region(cli.deploy.region.as_deref(), profile).await?;
    info!("Using AWS region {}", region);

    let sdk_config = region::load_sdk_config(&region, profile).await;
    let ecs = SdkEcs::new(&sdk_config);
    let blue_green = blue_green_client(&options, &sdk_config);

    deploy::run(&options, &ecs, blue_green.as_deref()).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,aws_config=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(outcome) => {
            println!("{}", outcome);
            ExitCode::SUCCESS
        }
        Err(DeployError::Remote(err)) => {
            eprintln!("Error: {:?}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
