//! Import curated list command

use mediator::Request;
use serde::{Deserialize, Serialize};

use super::super::QueuedJob;
use crate::ingest::{lists, ImportError, Services};

/// Import every movie on an external list and tag it canonical
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportListCommand {
    /// Stable local name for the list, used for progress tracking
    pub list_key: String,
    /// Id of the list at the metadata provider
    pub list_id: String,
}

impl ImportListCommand {
    fn validate(&self) -> Result<(), ImportError> {
        if self.list_key.trim().is_empty() {
            return Err(ImportError::Invalid("list_key must not be empty".to_string()));
        }
        if self.list_id.trim().is_empty() {
            return Err(ImportError::Invalid("list_id must not be empty".to_string()));
        }
        if !self
            .list_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ImportError::Invalid(
                "list_key may only contain letters, digits, '-' and '_'".to_string(),
            ));
        }
        Ok(())
    }
}

impl Request<Result<QueuedJob, ImportError>> for ImportListCommand {}

#[tracing::instrument(skip(services), fields(list_key = %command.list_key))]
pub async fn handle(services: Services, command: ImportListCommand) -> Result<QueuedJob, ImportError> {
    command.validate()?;
    let result = lists::queue_import(&services, &command.list_key, command.list_id.trim()).await?;
    Ok(result.into())
}
