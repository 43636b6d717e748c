use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use shared::domain::ConfigId;
use shared::error::Envelope;
use shared::protocol::{
    AppIdsPayload, CommitsPayload, ConfigsPayload, DeploymentPayload, DeploymentsPayload,
    DetailPayload, InstancesPayload, PublishPayload, RollbackPayload, TagsPayload,
};

pub mod channel;
pub mod error;
pub mod store;

pub use channel::{ChannelOptions, EventChannel, LogEntry};
pub use error::{ChannelError, CommandError};
pub use store::{AppState, EntityStore, KubeState, Transition};

/// Names one imperative remote operation through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ListApps,
    SyncApp,
    ListConfigs,
    ListCommits,
    ListInstances,
    PublishConfig,
    RollbackConfig,
    ListDeployments,
    ListTags,
    GetDetail,
    SetTag,
    RollbackDeployment,
    RestartDeployment,
    SetReplicas,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ListApps => "app.list",
            CommandKind::SyncApp => "app.sync",
            CommandKind::ListConfigs => "app.list_configs",
            CommandKind::ListCommits => "app.list_commits",
            CommandKind::ListInstances => "app.list_instances",
            CommandKind::PublishConfig => "app.publish_config",
            CommandKind::RollbackConfig => "app.rollback_config",
            CommandKind::ListDeployments => "kube.list",
            CommandKind::ListTags => "kube.list_tags",
            CommandKind::GetDetail => "kube.get_detail",
            CommandKind::SetTag => "kube.set_tag",
            CommandKind::RollbackDeployment => "kube.rollback",
            CommandKind::RestartDeployment => "kube.restart",
            CommandKind::SetReplicas => "kube.set_replicas",
        }
    }
}

/// Every command passes through Pending exactly once and then terminates in
/// exactly one of Succeeded or Failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPhase {
    Pending,
    Succeeded,
    Failed {
        /// Envelope code, or `None` when the transport failed first.
        status: Option<i64>,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub kind: CommandKind,
    pub phase: CommandPhase,
}

#[derive(Debug, Clone)]
pub struct PublishParams {
    pub commit_id: String,
    pub host: String,
    pub instance_id: String,
    pub version: String,
}

/// Client-side synchronization engine for the deploy control plane: issues
/// commands against the REST control API and owns the entity store that
/// command successes mutate.
pub struct ConsoleClient {
    http: Client,
    base_url: String,
    api_url: String,
    store: RwLock<EntityStore>,
    events: broadcast::Sender<CommandEvent>,
}

impl ConsoleClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let base_url = server_url.into().trim_end_matches('/').to_string();
        let api_url = format!("{base_url}/api/v1");
        let (events, _) = broadcast::channel(256);
        Self {
            http: Client::new(),
            base_url,
            api_url,
            store: RwLock::new(EntityStore::default()),
            events,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cloned snapshot of the entity store; presentation code never writes
    /// back.
    pub async fn snapshot(&self) -> EntityStore {
        self.store.read().await.clone()
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<CommandEvent> {
        self.events.subscribe()
    }

    /// Open the event-stream channel for one workload, sharing this client's
    /// server address.
    pub async fn open_events(
        &self,
        name: &str,
        options: ChannelOptions,
    ) -> Result<EventChannel, ChannelError> {
        EventChannel::connect(&self.base_url, name, options).await
    }

    pub async fn list_apps(&self) -> Result<AppIdsPayload, CommandError> {
        self.execute(
            CommandKind::ListApps,
            Some(Transition::AppListRequested),
            self.http.get(self.endpoint("/list")),
            |payload: &AppIdsPayload| Some(Transition::AppIdsLoaded(payload.app_ids.clone())),
        )
        .await
    }

    /// Sync from the config repository; with no id the whole app set is
    /// refreshed. Unlike a list fetch there is no optimistic clear.
    pub async fn sync_app(&self, app_id: Option<&str>) -> Result<AppIdsPayload, CommandError> {
        let path = match app_id {
            Some(app_id) => format!("/sync/{app_id}"),
            None => "/sync".to_string(),
        };
        self.execute(
            CommandKind::SyncApp,
            None,
            self.http.post(self.endpoint(&path)),
            |payload: &AppIdsPayload| Some(Transition::AppIdsLoaded(payload.app_ids.clone())),
        )
        .await
    }

    pub async fn list_configs(&self, app_id: &str) -> Result<ConfigsPayload, CommandError> {
        self.execute(
            CommandKind::ListConfigs,
            None,
            self.http.get(self.endpoint(&format!("/list/{app_id}/configs"))),
            |payload: &ConfigsPayload| Some(Transition::ConfigsLoaded(payload.configs.clone())),
        )
        .await
    }

    pub async fn list_commits(&self, app_id: &str) -> Result<CommitsPayload, CommandError> {
        self.execute(
            CommandKind::ListCommits,
            None,
            self.http.get(self.endpoint(&format!("/list/{app_id}/commits"))),
            |payload: &CommitsPayload| Some(Transition::CommitsLoaded(payload.commits.clone())),
        )
        .await
    }

    pub async fn list_instances(&self, app_id: &str) -> Result<InstancesPayload, CommandError> {
        self.execute(
            CommandKind::ListInstances,
            None,
            self.http
                .get(self.endpoint(&format!("/list/{app_id}/instances"))),
            |payload: &InstancesPayload| {
                Some(Transition::InstancesLoaded(payload.instances.clone()))
            },
        )
        .await
    }

    pub async fn publish_config(
        &self,
        app_id: &str,
        params: PublishParams,
    ) -> Result<PublishPayload, CommandError> {
        let form = [
            ("commit_id", params.commit_id),
            ("host", params.host),
            ("instance_id", params.instance_id),
            ("version", params.version),
        ];
        self.execute(
            CommandKind::PublishConfig,
            None,
            self.http
                .post(self.endpoint(&format!("/publish/{app_id}")))
                .form(&form),
            |payload: &PublishPayload| Some(Transition::ConfigPublished(payload.config.clone())),
        )
        .await
    }

    pub async fn rollback_config(
        &self,
        app_id: &str,
        config_id: ConfigId,
    ) -> Result<RollbackPayload, CommandError> {
        let form = [("id", config_id.0.to_string())];
        self.execute(
            CommandKind::RollbackConfig,
            None,
            self.http
                .post(self.endpoint(&format!("/rollback/{app_id}")))
                .form(&form),
            |payload: &RollbackPayload| Some(Transition::ConfigRolledBack(payload.config.id)),
        )
        .await
    }

    pub async fn list_deployments(&self) -> Result<DeploymentsPayload, CommandError> {
        self.execute(
            CommandKind::ListDeployments,
            Some(Transition::KubeListRequested),
            self.http.get(self.endpoint("/kube/list")),
            |payload: &DeploymentsPayload| {
                Some(Transition::DeploymentsLoaded(payload.deployments.clone()))
            },
        )
        .await
    }

    pub async fn list_tags(&self, name: &str) -> Result<TagsPayload, CommandError> {
        self.execute(
            CommandKind::ListTags,
            None,
            self.http
                .get(self.endpoint(&format!("/kube/listtags/{name}"))),
            |payload: &TagsPayload| {
                Some(Transition::TagsLoaded {
                    name: name.to_string(),
                    tags: payload.tags.clone(),
                })
            },
        )
        .await
    }

    /// Workload detail is view-local state; a successful fetch does not
    /// touch the entity store.
    pub async fn get_detail(&self, name: &str) -> Result<DetailPayload, CommandError> {
        self.execute(
            CommandKind::GetDetail,
            None,
            self.http.get(self.endpoint(&format!("/kube/detail/{name}"))),
            |_: &DetailPayload| None,
        )
        .await
    }

    pub async fn set_version_tag(
        &self,
        name: &str,
        tag: &str,
    ) -> Result<DeploymentPayload, CommandError> {
        let form = [("version_tag", tag.to_string())];
        self.execute(
            CommandKind::SetTag,
            None,
            self.http
                .post(self.endpoint(&format!("/kube/setversiontag/{name}")))
                .form(&form),
            |payload: &DeploymentPayload| {
                Some(Transition::DeploymentReplaced(payload.deployment.clone()))
            },
        )
        .await
    }

    pub async fn rollback_deployment(&self, name: &str) -> Result<DeploymentPayload, CommandError> {
        self.execute(
            CommandKind::RollbackDeployment,
            None,
            self.http
                .post(self.endpoint(&format!("/kube/rollback/{name}"))),
            |payload: &DeploymentPayload| {
                Some(Transition::DeploymentReplaced(payload.deployment.clone()))
            },
        )
        .await
    }

    pub async fn restart_deployment(&self, name: &str) -> Result<DeploymentPayload, CommandError> {
        self.execute(
            CommandKind::RestartDeployment,
            None,
            self.http.post(self.endpoint(&format!("/kube/restart/{name}"))),
            |payload: &DeploymentPayload| {
                Some(Transition::DeploymentReplaced(payload.deployment.clone()))
            },
        )
        .await
    }

    pub async fn set_replicas(
        &self,
        name: &str,
        replicas: i32,
    ) -> Result<DeploymentPayload, CommandError> {
        let form = [("replicas", replicas.to_string())];
        self.execute(
            CommandKind::SetReplicas,
            None,
            self.http
                .post(self.endpoint(&format!("/kube/setreplicas/{name}")))
                .form(&form),
            |payload: &DeploymentPayload| {
                Some(Transition::DeploymentReplaced(payload.deployment.clone()))
            },
        )
        .await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    /// The command protocol engine: broadcast Pending and apply the
    /// request-phase transition, perform the call, decode the envelope once,
    /// then apply the success transition or surface the failure untouched.
    async fn execute<T, F>(
        &self,
        kind: CommandKind,
        pending: Option<Transition>,
        request: reqwest::RequestBuilder,
        on_success: F,
    ) -> Result<T, CommandError>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> Option<Transition>,
    {
        debug!(command = kind.as_str(), "command issued");
        let _ = self.events.send(CommandEvent {
            kind,
            phase: CommandPhase::Pending,
        });
        if let Some(transition) = pending {
            self.store.write().await.apply(transition);
        }

        match self.request_payload::<T>(request).await {
            Ok(payload) => {
                if let Some(transition) = on_success(&payload) {
                    self.store.write().await.apply(transition);
                }
                let _ = self.events.send(CommandEvent {
                    kind,
                    phase: CommandPhase::Succeeded,
                });
                Ok(payload)
            }
            Err(err) => {
                warn!(command = kind.as_str(), "command failed: {err}");
                let phase = match &err {
                    CommandError::Api(api) => CommandPhase::Failed {
                        status: Some(api.status),
                        message: api.message.clone(),
                    },
                    other => CommandPhase::Failed {
                        status: None,
                        message: other.to_string(),
                    },
                };
                let _ = self.events.send(CommandEvent { kind, phase });
                Err(err)
            }
        }
    }

    async fn request_payload<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CommandError> {
        // Error statuses still carry an envelope, so no error_for_status
        // here; the envelope code is the source of truth.
        let body = request.send().await?.bytes().await?;
        let envelope: Envelope = serde_json::from_slice(&body)?;
        let info = envelope.into_result()?;
        Ok(serde_json::from_value(info)?)
    }
}

/// Operation surface of the client, as presentation layers consume it.
#[async_trait]
pub trait ConsoleHandle: Send + Sync {
    async fn list_apps(&self) -> Result<AppIdsPayload, CommandError>;
    async fn sync_app(&self, app_id: Option<&str>) -> Result<AppIdsPayload, CommandError>;
    async fn list_configs(&self, app_id: &str) -> Result<ConfigsPayload, CommandError>;
    async fn list_commits(&self, app_id: &str) -> Result<CommitsPayload, CommandError>;
    async fn list_instances(&self, app_id: &str) -> Result<InstancesPayload, CommandError>;
    async fn publish_config(
        &self,
        app_id: &str,
        params: PublishParams,
    ) -> Result<PublishPayload, CommandError>;
    async fn rollback_config(
        &self,
        app_id: &str,
        config_id: ConfigId,
    ) -> Result<RollbackPayload, CommandError>;
    async fn list_deployments(&self) -> Result<DeploymentsPayload, CommandError>;
    async fn list_tags(&self, name: &str) -> Result<TagsPayload, CommandError>;
    async fn get_detail(&self, name: &str) -> Result<DetailPayload, CommandError>;
    async fn set_version_tag(&self, name: &str, tag: &str)
        -> Result<DeploymentPayload, CommandError>;
    async fn rollback_deployment(&self, name: &str) -> Result<DeploymentPayload, CommandError>;
    async fn restart_deployment(&self, name: &str) -> Result<DeploymentPayload, CommandError>;
    async fn set_replicas(&self, name: &str, replicas: i32)
        -> Result<DeploymentPayload, CommandError>;
    async fn snapshot(&self) -> EntityStore;
    fn subscribe_commands(&self) -> broadcast::Receiver<CommandEvent>;
}

#[async_trait]
impl ConsoleHandle for ConsoleClient {
    async fn list_apps(&self) -> Result<AppIdsPayload, CommandError> {
        ConsoleClient::list_apps(self).await
    }

    async fn sync_app(&self, app_id: Option<&str>) -> Result<AppIdsPayload, CommandError> {
        ConsoleClient::sync_app(self, app_id).await
    }

    async fn list_configs(&self, app_id: &str) -> Result<ConfigsPayload, CommandError> {
        ConsoleClient::list_configs(self, app_id).await
    }

    async fn list_commits(&self, app_id: &str) -> Result<CommitsPayload, CommandError> {
        ConsoleClient::list_commits(self, app_id).await
    }

    async fn list_instances(&self, app_id: &str) -> Result<InstancesPayload, CommandError> {
        ConsoleClient::list_instances(self, app_id).await
    }

    async fn publish_config(
        &self,
        app_id: &str,
        params: PublishParams,
    ) -> Result<PublishPayload, CommandError> {
        ConsoleClient::publish_config(self, app_id, params).await
    }

    async fn rollback_config(
        &self,
        app_id: &str,
        config_id: ConfigId,
    ) -> Result<RollbackPayload, CommandError> {
        ConsoleClient::rollback_config(self, app_id, config_id).await
    }

    async fn list_deployments(&self) -> Result<DeploymentsPayload, CommandError> {
        ConsoleClient::list_deployments(self).await
    }

    async fn list_tags(&self, name: &str) -> Result<TagsPayload, CommandError> {
        ConsoleClient::list_tags(self, name).await
    }

    async fn get_detail(&self, name: &str) -> Result<DetailPayload, CommandError> {
        ConsoleClient::get_detail(self, name).await
    }

    async fn set_version_tag(
        &self,
        name: &str,
        tag: &str,
    ) -> Result<DeploymentPayload, CommandError> {
        ConsoleClient::set_version_tag(self, name, tag).await
    }

    async fn rollback_deployment(&self, name: &str) -> Result<DeploymentPayload, CommandError> {
        ConsoleClient::rollback_deployment(self, name).await
    }

    async fn restart_deployment(&self, name: &str) -> Result<DeploymentPayload, CommandError> {
        ConsoleClient::restart_deployment(self, name).await
    }

    async fn set_replicas(
        &self,
        name: &str,
        replicas: i32,
    ) -> Result<DeploymentPayload, CommandError> {
        ConsoleClient::set_replicas(self, name, replicas).await
    }

    async fn snapshot(&self) -> EntityStore {
        ConsoleClient::snapshot(self).await
    }

    fn subscribe_commands(&self) -> broadcast::Receiver<CommandEvent> {
        ConsoleClient::subscribe_commands(self)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
