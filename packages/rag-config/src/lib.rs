mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	ChatProviderConfig, Config, DEFAULT_QUESTION, EmbeddingProviderConfig, Postgres, Providers,
	Qdrant, Retrieval, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	let binds = [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
	];

	for (label, bind) in binds {
		if bind.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in
		[("embedding", &cfg.providers.embedding.api_key), ("chat", &cfg.providers.chat.api_key)]
	{
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if !cfg.providers.chat.temperature.is_finite() || cfg.providers.chat.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.chat.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	let cutoff = cfg.retrieval.similarity_cutoff;

	if !cutoff.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.similarity_cutoff must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cutoff) {
		return Err(Error::Validation {
			message: "retrieval.similarity_cutoff must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.retrieval.complete_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.complete_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.stream_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.stream_top_k must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.retrieval.default_question.trim().is_empty() {
		cfg.retrieval.default_question = DEFAULT_QUESTION.to_string();
	}

	for headers in
		[&mut cfg.providers.embedding.default_headers, &mut cfg.providers.chat.default_headers]
	{
		headers.retain(|key, _| !key.trim().is_empty());
	}
}
