use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ConfigId);

/// Instance liveness as the control API reports it, ordinal-encoded on the
/// wire (offline = 0 through error = 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum InstanceStatus {
    Offline,
    Checking,
    Syncing,
    Online,
    Error,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Offline => "offline",
            InstanceStatus::Checking => "checking",
            InstanceStatus::Syncing => "syncing",
            InstanceStatus::Online => "online",
            InstanceStatus::Error => "error",
        }
    }
}

impl From<InstanceStatus> for i64 {
    fn from(status: InstanceStatus) -> Self {
        match status {
            InstanceStatus::Offline => 0,
            InstanceStatus::Checking => 1,
            InstanceStatus::Syncing => 2,
            InstanceStatus::Online => 3,
            InstanceStatus::Error => 4,
        }
    }
}

impl TryFrom<i64> for InstanceStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, String> {
        match value {
            0 => Ok(InstanceStatus::Offline),
            1 => Ok(InstanceStatus::Checking),
            2 => Ok(InstanceStatus::Syncing),
            3 => Ok(InstanceStatus::Online),
            4 => Ok(InstanceStatus::Error),
            other => Err(format!("unknown instance status ordinal {other}")),
        }
    }
}
