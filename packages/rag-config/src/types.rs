use serde::Deserialize;
use serde_json::{Map, Value};

pub const DEFAULT_QUESTION: &str = "What is the square root of 9?";

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub chat: ChatProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	/// Optional. Requests wait indefinitely when unset.
	pub timeout_ms: Option<u64>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChatProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	/// Optional. Applies to the whole response, streamed or not.
	pub timeout_ms: Option<u64>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	/// Matches must score strictly above this value to be used as context.
	pub similarity_cutoff: f32,
	pub complete_top_k: u32,
	pub stream_top_k: u32,
	pub default_question: String,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			similarity_cutoff: 0.75,
			complete_top_k: 1,
			stream_top_k: 10,
			default_question: DEFAULT_QUESTION.to_string(),
		}
	}
}
