//! Serve command

use crate::app::ServeArgs;
use anyhow::Result;
use ragline_core::{AppContext, Config};
use ragline_server::AppState;
use std::sync::Arc;

pub async fn run(args: ServeArgs, config: Config) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let context = AppContext::bootstrap(config)?;
    let state = Arc::new(AppState::new(context));

    ragline_server::serve(state, &bind).await
}
