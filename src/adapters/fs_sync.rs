use super::contracts::PollTarget;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// On-disk flag whose first byte turns to `'1'` once a cache is flushed
pub struct SysfsSyncIndicator {
    path: PathBuf,
    name: String,
}

impl SysfsSyncIndicator {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: format!("sync indicator {}", path.display()),
            path,
        }
    }
}

#[async_trait]
impl PollTarget for SysfsSyncIndicator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_off(&self) -> Result<bool> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let mut byte = [0u8; 1];
        let read = file.read(&mut byte).await?;
        Ok(read == 1 && byte[0] == b'1')
    }
}
