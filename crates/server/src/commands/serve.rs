//! Serve command handler.
//!
//! Boots the shared application state and runs the HTTP server until a
//! shutdown signal arrives.

use clap::Args;
use waypost_core::{config::AppConfig, AppResult};

use crate::{bootstrap, routes};

/// Run the answering service
#[derive(Args, Debug, Default)]
pub struct ServeCommand {
    /// Listen address (host:port)
    #[arg(short, long)]
    pub bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command");

        let mut config = config.clone();
        if let Some(ref bind) = self.bind {
            config.bind = bind.clone();
        }
        config.validate()?;

        let state = bootstrap::bootstrap(config).await;
        routes::serve(state).await
    }
}
