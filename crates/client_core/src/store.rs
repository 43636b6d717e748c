//! Normalized entity collections, mutated only by command outcomes.
//!
//! Collections stay `None` until their first successful fetch so callers can
//! distinguish "not yet loaded" from "loaded and empty". Every mutation is a
//! whole-collection or whole-entity replacement applied through
//! [`EntityStore::apply`].

use tracing::{debug, warn};

use shared::domain::ConfigId;
use shared::protocol::{AppConfig, Commit, Deployment, Instance};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub app_ids: Option<Vec<String>>,
    pub configs: Option<Vec<AppConfig>>,
    pub commits: Option<Vec<Commit>>,
    pub instances: Option<Vec<Instance>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KubeState {
    pub deployments: Option<Vec<Deployment>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    pub app: AppState,
    pub kube: KubeState,
}

/// One state transition, derived from a command phase. Request-phase
/// transitions clear optimistically; success-phase transitions merge the
/// decoded payload.
#[derive(Debug, Clone)]
pub enum Transition {
    /// An app list fetch was issued; drop everything app-scoped until the
    /// fresh snapshot lands.
    AppListRequested,
    AppIdsLoaded(Vec<String>),
    ConfigsLoaded(Vec<AppConfig>),
    CommitsLoaded(Vec<Commit>),
    InstancesLoaded(Vec<Instance>),
    ConfigPublished(AppConfig),
    ConfigRolledBack(ConfigId),
    /// A workload list fetch was issued.
    KubeListRequested,
    DeploymentsLoaded(Vec<Deployment>),
    TagsLoaded { name: String, tags: Vec<String> },
    DeploymentReplaced(Deployment),
}

impl EntityStore {
    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::AppListRequested => {
                self.app = AppState::default();
            }
            Transition::AppIdsLoaded(app_ids) => {
                self.app.app_ids = Some(app_ids);
            }
            Transition::ConfigsLoaded(configs) => {
                self.app.configs = Some(configs);
            }
            Transition::CommitsLoaded(commits) => {
                self.app.commits = Some(commits);
            }
            Transition::InstancesLoaded(instances) => {
                self.app.instances = Some(instances);
            }
            Transition::ConfigPublished(config) => match self.app.configs.as_mut() {
                Some(configs) => configs.insert(0, config),
                None => {
                    debug!(config_id = config.id.0, "publish before configs load; skipping");
                }
            },
            Transition::ConfigRolledBack(id) => {
                if let Some(configs) = self.app.configs.as_mut() {
                    configs.retain(|config| config.id != id);
                }
            }
            Transition::KubeListRequested => {
                self.kube = KubeState::default();
            }
            Transition::DeploymentsLoaded(deployments) => {
                self.kube.deployments = Some(deployments);
            }
            Transition::TagsLoaded { name, tags } => {
                match self.find_deployment_mut(&name) {
                    Some(deployment) => deployment.image_tags = Some(tags),
                    None => warn!(name = %name, "tags loaded for a workload that is not loaded"),
                }
            }
            Transition::DeploymentReplaced(deployment) => {
                match self.find_deployment_mut(&deployment.name) {
                    Some(slot) => *slot = deployment,
                    None => {
                        // Stale local state: the mutation succeeded remotely
                        // but its target is not in the loaded collection.
                        warn!(
                            name = %deployment.name,
                            "mutation result for a workload that is not loaded"
                        );
                    }
                }
            }
        }
    }

    fn find_deployment_mut(&mut self, name: &str) -> Option<&mut Deployment> {
        self.kube
            .deployments
            .as_mut()
            .and_then(|deployments| deployments.iter_mut().find(|d| d.name == name))
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
