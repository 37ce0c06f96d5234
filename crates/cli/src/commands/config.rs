use std::path::Path;

use anyhow::Result;

use super::load_config;

pub fn execute(path: Option<&Path>) -> Result<()> {
	let config = load_config(path)?;
	println!("{}", serde_json::to_string_pretty(&config)?);
	Ok(())
}
