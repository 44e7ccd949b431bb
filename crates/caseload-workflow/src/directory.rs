//! 目标负责人目录

use caseload_core::{CaseloadBackend, HandlerId, HandlerSummary, LoadError, LoadTarget};
use std::collections::HashSet;

/// 负责人目录
#[derive(Debug, Default)]
pub struct HandlerDirectory {
    handlers: Vec<HandlerSummary>,
    loaded: bool,
}

impl HandlerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取目录；失败时保留已有条目
    pub async fn load(
        &mut self,
        backend: &dyn CaseloadBackend,
        exclude: Option<HandlerId>,
    ) -> Result<&[HandlerSummary], LoadError> {
        match backend.fetch_handler_directory(exclude).await {
            Ok(mut handlers) => {
                let mut seen = HashSet::new();
                handlers.retain(|h| seen.insert(h.id));
                handlers.sort_by(|a, b| a.display_name.cmp(&b.display_name));
                tracing::info!("Loaded {} handlers into directory", handlers.len());
                self.handlers = handlers;
                self.loaded = true;
                Ok(&self.handlers)
            }
            Err(e) => {
                let error = LoadError::new(LoadTarget::HandlerDirectory, e);
                tracing::warn!("{}", error);
                Err(error)
            }
        }
    }

    pub fn find(&self, handler_id: HandlerId) -> Option<&HandlerSummary> {
        self.handlers.iter().find(|h| h.id == handler_id)
    }

    pub fn handlers(&self) -> &[HandlerSummary] {
        &self.handlers
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}
