//! Build-index command handler.
//!
//! Builds the retrieval index offline, without starting the server. Useful
//! for baking index artifacts into a deploy image.

use clap::Args;
use std::path::PathBuf;
use waypost_core::{config::AppConfig, AppResult};
use waypost_prompt::TokenCounter;
use waypost_retrieval::{AdminRebuilder, IndexStore};

/// Build the retrieval index from a document source
#[derive(Args, Debug)]
pub struct BuildIndexCommand {
    /// Document source: a JSON pack or a directory of markdown files
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Directory receiving the index artifacts
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl BuildIndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing build-index command");

        let counter = TokenCounter::from_config(config.tokenizer_path.as_deref());
        let data_dir = self
            .data_dir
            .clone()
            .unwrap_or_else(|| config.data_dir.clone());
        let store = IndexStore::new(data_dir);
        let rebuilder = AdminRebuilder::new(store, config.knowledge_source.clone())
            .with_model(config.model.name.clone(), counter.version());

        let outcome = rebuilder.rebuild(self.source.as_deref())?;

        if self.json {
            let output = serde_json::json!({
                "built": true,
                "documents": outcome.documents,
                "source": outcome.source.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Indexed {} documents from {}",
                outcome.documents,
                outcome.source.display()
            );
        }

        Ok(())
    }
}
