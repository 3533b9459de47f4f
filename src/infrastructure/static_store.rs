use crate::domain::cutoff::CutoffTime;
use crate::domain::ports::ConfigStore;
use crate::domain::records::{TransferConfig, TransportCredentials};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// Read-only config store backed by a JSON file loaded at startup. The
/// production deployment swaps this port for the platform's SQL-backed
/// configuration tables; the file layout mirrors their four tables.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StaticConfigStore {
    #[serde(default)]
    configs: Vec<TransferConfig>,
    #[serde(default)]
    cutoff_times: Vec<CutoffTime>,
    #[serde(default)]
    ftp_configs: Vec<TransportCredentials>,
    #[serde(default)]
    sftp_configs: Vec<TransportCredentials>,
}

impl StaticConfigStore {
    pub fn new(
        configs: Vec<TransferConfig>,
        cutoff_times: Vec<CutoffTime>,
        ftp_configs: Vec<TransportCredentials>,
        sftp_configs: Vec<TransportCredentials>,
    ) -> Self {
        Self {
            configs,
            cutoff_times,
            ftp_configs,
            sftp_configs,
        }
    }

    /// Loads and validates the file; malformed clock values or unknown time
    /// zones fail startup instead of poisoning a later cycle.
    pub fn from_file(path: &Path) -> Result<Self> {
        let store: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        for cutoff in &store.cutoff_times {
            CutoffTime::new(&cutoff.routing_number, cutoff.cutoff, cutoff.zone)?;
        }
        Ok(store)
    }
}

#[async_trait]
impl ConfigStore for StaticConfigStore {
    async fn get_configs(&self) -> Result<Vec<TransferConfig>> {
        Ok(self.configs.clone())
    }

    async fn get_cutoff_times(&self) -> Result<Vec<CutoffTime>> {
        Ok(self.cutoff_times.clone())
    }

    async fn get_ftp_configs(&self) -> Result<Vec<TransportCredentials>> {
        Ok(self.ftp_configs.clone())
    }

    async fn get_sftp_configs(&self) -> Result<Vec<TransportCredentials>> {
        Ok(self.sftp_configs.clone())
    }
}
