// In-memory ECS and CodeDeploy used by the deployment tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_ecs::types::{ContainerDefinition, PortMapping, Volume};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::aws::{
    AppSpecRevision, BlueGreenApi, EcsApi, EcsError, RunningTask, TaskDefinition,
    TaskDefinitionPayload, TaskSettings,
};

pub const CLUSTER: &str = "default";

pub fn container(name: &str, image: &str) -> ContainerDefinition {
    ContainerDefinition::builder()
        .name(name)
        .image(image)
        .essential(true)
        .memory(256)
        .build()
}

pub fn port_container(name: &str, image: &str, port: i32) -> ContainerDefinition {
    ContainerDefinition::builder()
        .name(name)
        .image(image)
        .essential(true)
        .memory(512)
        .port_mappings(PortMapping::builder().container_port(port).build())
        .build()
}

/// A task definition whose ARN is `family:revision`
pub fn task_definition(arn: &str, containers: Vec<ContainerDefinition>) -> TaskDefinition {
    let family = arn.split(':').next().unwrap_or(arn).to_string();
    TaskDefinition {
        arn: arn.to_string(),
        family,
        volumes: vec![Volume::builder().name("scratch").build()],
        containers,
        settings: TaskSettings::default(),
    }
}

/// What a single ListTasks/DescribeTasks round returns
#[derive(Debug, Clone)]
pub enum Poll {
    /// Running tasks, given by their task definition ARNs
    Tasks(Vec<&'static str>),
    /// ListTasks fails with "Tasks cannot be empty."
    EmptyTasksError,
    /// ListTasks returns tasks, DescribeTasks fails with "Tasks cannot be empty."
    DescribeEmptyTasksError(Vec<&'static str>),
    ApiError(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DescribeServices(String),
    DescribeTaskDefinition(String),
    RegisterTaskDefinition(TaskDefinitionPayload),
    UpdateService { service: String, task_definition: String },
    ListTasks(String),
    DescribeTasks(Vec<String>),
}

#[derive(Default)]
struct FakeState {
    services: HashMap<String, String>,
    task_definitions: HashMap<String, TaskDefinition>,
    polls: VecDeque<Poll>,
    current_poll: Option<Poll>,
    service_lookup_error: Option<&'static str>,
    calls: Vec<Call>,
}

/// ECS with a single cluster named `default`
#[derive(Default)]
pub struct FakeEcs {
    state: Mutex<FakeState>,
}

impl FakeEcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task definition and point a service at it
    pub fn with_service(self, service: &str, task_definition: TaskDefinition) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .services
                .insert(service.to_string(), task_definition.arn.clone());
            state
                .task_definitions
                .insert(task_definition.arn.clone(), task_definition);
        }
        self
    }

    pub fn with_polls(self, polls: Vec<Poll>) -> Self {
        self.state.lock().unwrap().polls = polls.into();
        self
    }

    pub fn failing_service_lookup(self, message: &'static str) -> Self {
        self.state.lock().unwrap().service_lookup_error = Some(message);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn registrations(&self) -> Vec<TaskDefinitionPayload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RegisterTaskDefinition(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn service_updates(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateService {
                    service,
                    task_definition,
                } => Some((service, task_definition)),
                _ => None,
            })
            .collect()
    }

    fn check_cluster(cluster: &str) -> Result<(), EcsError> {
        if cluster == CLUSTER {
            Ok(())
        } else {
            Err(EcsError::ClusterNotFound(cluster.to_string()))
        }
    }
}

#[async_trait]
impl EcsApi for FakeEcs {
    async fn service_task_definition(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<String, EcsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DescribeServices(service.to_string()));
        if let Some(message) = state.service_lookup_error {
            return Err(EcsError::Api(anyhow!(message)));
        }
        Self::check_cluster(cluster)?;
        state
            .services
            .get(service)
            .cloned()
            .ok_or_else(|| EcsError::ServiceNotFound(service.to_string()))
    }

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<TaskDefinition, EcsError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::DescribeTaskDefinition(task_definition.to_string()));
        state
            .task_definitions
            .get(task_definition)
            .cloned()
            .ok_or_else(|| {
                EcsError::Api(anyhow!("Unable to describe task definition."))
            })
    }

    async fn register_task_definition(
        &self,
        payload: &TaskDefinitionPayload,
    ) -> Result<String, EcsError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::RegisterTaskDefinition(payload.clone()));

        let prefix = format!("{}:", payload.family);
        let revision = state
            .task_definitions
            .keys()
            .filter_map(|arn| arn.strip_prefix(&prefix)?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let arn = format!("{}{}", prefix, revision);

        state.task_definitions.insert(
            arn.clone(),
            TaskDefinition {
                arn: arn.clone(),
                family: payload.family.clone(),
                volumes: payload.volumes.clone(),
                containers: payload.containers.clone(),
                settings: payload.settings.clone(),
            },
        );
        Ok(arn)
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition_arn: &str,
    ) -> Result<(), EcsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdateService {
            service: service.to_string(),
            task_definition: task_definition_arn.to_string(),
        });
        Self::check_cluster(cluster)?;
        match state.services.get_mut(service) {
            Some(current) => {
                *current = task_definition_arn.to_string();
                Ok(())
            }
            None => Err(EcsError::ServiceNotFound(service.to_string())),
        }
    }

    async fn list_running_tasks(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<String>, EcsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListTasks(service.to_string()));
        Self::check_cluster(cluster)?;

        let poll = state.polls.pop_front().unwrap_or(Poll::Tasks(vec![]));
        state.current_poll = Some(poll.clone());

        match poll {
            Poll::Tasks(defs) | Poll::DescribeEmptyTasksError(defs) => Ok((0..defs.len())
                .map(|i| format!("task-{}", i))
                .collect()),
            Poll::EmptyTasksError => Err(EcsError::EmptyTasks),
            Poll::ApiError(message) => Err(EcsError::Api(anyhow!(message))),
        }
    }

    async fn describe_tasks(
        &self,
        _cluster: &str,
        task_arns: &[String],
    ) -> Result<Vec<RunningTask>, EcsError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DescribeTasks(task_arns.to_vec()));

        match state.current_poll.clone() {
            Some(Poll::Tasks(defs)) => Ok(defs
                .iter()
                .enumerate()
                .map(|(i, def)| RunningTask {
                    task_arn: format!("task-{}", i),
                    task_definition_arn: def.to_string(),
                    last_status: Some("RUNNING".to_string()),
                })
                .collect()),
            Some(Poll::DescribeEmptyTasksError(_)) => Err(EcsError::EmptyTasks),
            _ => Ok(Vec::new()),
        }
    }
}

/// CodeDeploy that records every deployment it is asked to create
#[derive(Default)]
pub struct FakeBlueGreen {
    deployments: Mutex<Vec<(String, String, AppSpecRevision)>>,
}

impl FakeBlueGreen {
    pub fn deployments(&self) -> Vec<(String, String, AppSpecRevision)> {
        self.deployments.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlueGreenApi for FakeBlueGreen {
    async fn create_deployment(
        &self,
        application: &str,
        deployment_group: &str,
        revision: &AppSpecRevision,
    ) -> Result<String> {
        let mut deployments = self.deployments.lock().unwrap();
        deployments.push((
            application.to_string(),
            deployment_group.to_string(),
            revision.clone(),
        ));
        Ok(format!("d-{:06}", deployments.len()))
    }
}
