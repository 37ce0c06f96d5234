use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Runtime(#[from] intercom_runtime::Error),

	#[error("invalid config {}: {message}", path.display())]
	Config { path: PathBuf, message: String },

	#[error("invalid config: {0}")]
	InvalidConfig(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}
