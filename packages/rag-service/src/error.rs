pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Vector index error: {message}")]
	VectorIndex { message: String },
}
impl From<rag_storage::Error> for Error {
	fn from(err: rag_storage::Error) -> Self {
		match err {
			rag_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			rag_storage::Error::InvalidArgument(message) => Self::VectorIndex { message },
			rag_storage::Error::Qdrant(inner) => Self::VectorIndex { message: inner.to_string() },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
