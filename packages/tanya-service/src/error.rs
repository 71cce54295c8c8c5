pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<tanya_storage::Error> for Error {
	fn from(err: tanya_storage::Error) -> Self {
		match err {
			tanya_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			tanya_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			// Statement failures are handled where they happen (the pipeline
			// surfaces them as turn content); anything reaching this
			// conversion is infrastructure.
			tanya_storage::Error::Execution { message } => Self::Storage { message },
		}
	}
}
