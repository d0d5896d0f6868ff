//! State command: inspect or reset a checkpoint file

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use super::CliError;
use crate::extractor::progress::percent_complete;
use crate::record::RecordType;
use crate::state::{CheckpointStore, FileCheckpointStore};

/// State command arguments
#[derive(Parser, Debug)]
pub struct StateArgs {
    /// Checkpoint file
    #[arg(long, default_value = "state/checkpoint.json")]
    pub state: PathBuf,

    /// Delete the checkpoint instead of showing it
    #[arg(long, default_value_t = false)]
    pub reset: bool,
}

impl StateArgs {
    /// Execute the state command
    pub async fn execute(&self) -> Result<(), CliError> {
        let store = FileCheckpointStore::new(&self.state);

        if self.reset {
            if store.clear()? {
                info!(path = %self.state.display(), "Checkpoint deleted");
            } else {
                info!(path = %self.state.display(), "No checkpoint to delete");
            }
            return Ok(());
        }

        let Some(state) = store.load()? else {
            println!("No checkpoint at {}", self.state.display());
            return Ok(());
        };

        let pending: serde_json::Map<String, serde_json::Value> = RecordType::dependents()
            .map(|rt| (rt.name().to_string(), json!(state.pending_len(rt))))
            .collect();
        let summary = json!({
            "scope": state.scope().to_string(),
            "percent_complete": percent_complete(&state),
            "complete_types": state.completed_type_count(),
            "pending": pending,
            "last_sync_started": state.last_sync_started(),
            "last_successful_sync_started": state.last_successful_sync_started(),
        });
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        println!("{rendered}");
        Ok(())
    }
}
