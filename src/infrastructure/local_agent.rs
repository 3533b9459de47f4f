use crate::domain::ports::{Agent, AgentFactory, RemoteFile};
use crate::domain::records::{TransferConfig, Transport};
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem-backed Agent: one directory tree per routing number stands in
/// for the institution's remote FTP/SFTP tree. Serves tests and local runs;
/// the production deployment plugs real wire transports into the same
/// factory port.
pub struct LocalDirAgent {
    base: PathBuf,
    inbound_path: String,
    outbound_path: String,
    return_path: String,
}

impl LocalDirAgent {
    fn read_dir_files(&self, sub: &str) -> Result<Vec<RemoteFile>> {
        let dir = self.base.join(sub);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            files.push(RemoteFile {
                filename: filename.to_string(),
                contents: fs::read(&path)?,
            });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }
}

#[async_trait]
impl Agent for LocalDirAgent {
    async fn get_inbound_files(&mut self) -> Result<Vec<RemoteFile>> {
        let sub = self.inbound_path.clone();
        self.read_dir_files(&sub)
    }

    async fn get_return_files(&mut self) -> Result<Vec<RemoteFile>> {
        let sub = self.return_path.clone();
        self.read_dir_files(&sub)
    }

    async fn upload_file(&mut self, filename: &str, contents: Vec<u8>) -> Result<()> {
        let path = self.base.join(&self.outbound_path).join(filename);
        fs::write(path, contents)?;
        Ok(())
    }

    async fn delete(&mut self, path: &str) -> Result<()> {
        let full = self.base.join(path);
        if !full.starts_with(&self.base) {
            return Err(TransferError::Agent(format!(
                "path {path:?} escapes the agent root"
            )));
        }
        fs::remove_file(full)?;
        Ok(())
    }

    fn inbound_path(&self) -> &str {
        &self.inbound_path
    }

    fn outbound_path(&self) -> &str {
        &self.outbound_path
    }

    fn return_path(&self) -> &str {
        &self.return_path
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct LocalAgentFactory {
    root: PathBuf,
}

impl LocalAgentFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn base_for(&self, root: &Path, routing_number: &str) -> PathBuf {
        root.join(routing_number)
    }
}

#[async_trait]
impl AgentFactory for LocalAgentFactory {
    async fn connect(
        &self,
        transport: &Transport,
        config: &TransferConfig,
    ) -> Result<Box<dyn Agent>> {
        let credentials = match transport {
            Transport::Ftp(c) | Transport::Sftp(c) => c,
        };
        let base = self.base_for(&self.root, &credentials.routing_number);
        for sub in [&config.inbound_path, &config.outbound_path, &config.return_path] {
            fs::create_dir_all(base.join(sub))?;
        }
        Ok(Box::new(LocalDirAgent {
            base,
            inbound_path: config.inbound_path.clone(),
            outbound_path: config.outbound_path.clone(),
            return_path: config.return_path.clone(),
        }))
    }
}
