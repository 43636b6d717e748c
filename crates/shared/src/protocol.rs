use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConfigId, InstanceStatus};

/// Keep-alive sentinel exchanged on the events channel. Not JSON; both sides
/// ignore it as event input.
pub const HEARTBEAT_FRAME: &str = "\u{2764}\u{fe0f}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub branch: String,
    pub commit_id: String,
    pub message: String,
    pub author: CommitAuthor,
}

/// A published application config record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub id: ConfigId,
    pub app_id: String,
    pub status: i64,
    pub version: String,
    pub host: String,
    pub instance_id: String,
    pub commit_id: String,
    pub md5sum: String,
    pub author: String,
    pub created_time: i64,
    pub updated_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub app_id: String,
    pub host: String,
    pub instance_id: String,
    pub config_id: ConfigId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    pub status: InstanceStatus,
}

/// A managed workload controller. `image_tags` is attached client-side by a
/// tags fetch and never sent by the server on list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub image_name: String,
    pub image: String,
    pub replicas: i32,
    pub revision: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hpa {
    pub name: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
}

/// Replica counters as the orchestrator reports them; absent fields mean
/// zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentStatus {
    pub replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
}

/// One pushed progress event for a workload rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub action: String,
    pub event: String,
    #[serde(default)]
    pub status: DeploymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeadInfo {
    pub name: String,
    pub app_id: String,
    pub commit_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppIdsPayload {
    pub app_ids: Vec<String>,
    #[serde(default)]
    pub head: Option<HeadInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigsPayload {
    pub configs: Vec<AppConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitsPayload {
    pub commits: Vec<Commit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstancesPayload {
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishPayload {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub commit: Option<Commit>,
    pub config: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RollbackPayload {
    pub config: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeploymentsPayload {
    pub deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagsPayload {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DetailPayload {
    #[serde(default)]
    pub deployment: Option<Deployment>,
    #[serde(default)]
    pub hpa: Option<Hpa>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeploymentPayload {
    pub deployment: Deployment,
}
