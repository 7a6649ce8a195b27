// Waiting for a new task definition revision to be observed running

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::aws::{EcsApi, EcsError};

/// How long to wait for a rollout and how often to poll
///
/// The interval is fixed: every poll sleeps for the same amount of time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

/// Result of waiting for a rollout
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RolloutStatus {
    /// A task running the target task definition was observed
    Running { polls: u32, elapsed: Duration },
    /// The timeout elapsed without observing such a task
    TimedOut { polls: u32, elapsed: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Observation {
    Updated,
    NotYetUpdated,
    NothingRunning,
}

impl Observation {
    fn wait_text(self) -> &'static str {
        match self {
            Observation::NothingRunning => "No tasks are currently running",
            _ => "New task is not running yet",
        }
    }
}

/// Check once whether any running task of the service uses `task_definition_arn`
async fn observe(
    ecs: &dyn EcsApi,
    cluster: &str,
    service: &str,
    task_definition_arn: &str,
) -> Result<Observation, EcsError> {
    let task_arns = match ecs.list_running_tasks(cluster, service).await {
        Ok(arns) => arns,
        Err(EcsError::EmptyTasks) => Vec::new(),
        Err(e) => return Err(e),
    };

    if task_arns.is_empty() {
        return Ok(Observation::NothingRunning);
    }

    let tasks = match ecs.describe_tasks(cluster, &task_arns).await {
        Ok(tasks) => tasks,
        Err(EcsError::EmptyTasks) => return Ok(Observation::NothingRunning),
        Err(e) => return Err(e),
    };

    for task in &tasks {
        debug!(
            "Task {} runs {} ({})",
            task.task_arn,
            task.task_definition_arn,
            task.last_status.as_deref().unwrap_or("unknown")
        );
    }

    if tasks
        .iter()
        .any(|t| t.task_definition_arn == task_definition_arn)
    {
        Ok(Observation::Updated)
    } else {
        Ok(Observation::NotYetUpdated)
    }
}

/// Poll the service until a task runs `task_definition_arn` or the timeout elapses
///
/// Each iteration sleeps first, then lists and describes the running tasks.
/// An empty task list is not an error, polling just continues. Any other
/// ECS error ends the wait and is returned unchanged.
pub async fn wait_for_task(
    ecs: &dyn EcsApi,
    cluster: &str,
    service: &str,
    task_definition_arn: &str,
    settings: &RolloutSettings,
) -> Result<RolloutStatus, EcsError> {
    let start_time = Instant::now();
    let mut polls = 0;

    info!(
        "Waiting up to {}s for {} to be running in service {}",
        settings.timeout.as_secs(),
        task_definition_arn,
        service
    );

    loop {
        tokio::time::sleep(settings.interval).await;
        polls += 1;

        let observation = observe(ecs, cluster, service, task_definition_arn).await?;
        if observation == Observation::Updated {
            return Ok(RolloutStatus::Running {
                polls,
                elapsed: start_time.elapsed(),
            });
        }

        let elapsed = start_time.elapsed();
        if elapsed > settings.timeout {
            return Ok(RolloutStatus::TimedOut { polls, elapsed });
        }

        info!(
            "{}, backing off for {} seconds.",
            observation.wait_text(),
            settings.interval.as_secs()
        );
    }
}
