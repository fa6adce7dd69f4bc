//! services/api/src/adapters/templates.rs
//!
//! Reads the conversion rule templates from flat files under the prompts directory.
//! Files are read on every call, so edits take effect without a restart.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use manuscript_core::ports::{PortError, PortResult, TemplateName, TemplateStore};
use tracing::error;

/// An adapter that implements `TemplateStore` over a directory of text files.
#[derive(Clone, Debug)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn load(&self, name: TemplateName) -> PortResult<String> {
        let path = self.root.join(name.file_name());
        match tokio::fs::read_to_string(&path).await {
            Ok(template) => Ok(template),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PortError::TemplateNotFound(path.display().to_string()))
            }
            Err(e) => {
                error!("Failed to read template {}: {}", path.display(), e);
                Err(PortError::Unexpected(e.to_string()))
            }
        }
    }
}
