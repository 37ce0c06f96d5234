mod config;
pub mod simulate;

use std::path::Path;

use anyhow::Result;
use intercom::IntercomConfig;

use crate::cli::Commands;

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::Config { config } => config::execute(config.as_deref()),
		Commands::Simulate { config, requests, notify, fail } => {
			let config = load_config(config.as_deref())?;
			simulate::execute(config, simulate::SimulateOptions { requests, notify, fail }).await
		}
	}
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<IntercomConfig> {
	match path {
		Some(path) => Ok(IntercomConfig::load(path)?),
		None => Ok(IntercomConfig::default()),
	}
}
