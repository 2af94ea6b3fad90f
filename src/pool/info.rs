use serde::Deserialize;

/// Subset of `box.info` output, used by the pool to track instance roles.
#[derive(Clone, Debug, Deserialize)]
pub struct InstanceInfo {
    /// Read-only status of the instance.
    pub ro: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub lsn: u64,
}
