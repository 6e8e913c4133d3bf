pub mod add_note;
pub mod admin;
pub mod answer;

mod error;

pub use add_note::{AddNoteRequest, AddNoteResponse};
pub use admin::ReindexReport;
pub use answer::{Answer, AnswerMode, AnswerRequest, AnswerStream};
pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use rag_config::{ChatProviderConfig, Config, EmbeddingProviderConfig};
use rag_domain::{
	message::ChatMessage,
	similarity::SimilarityMatch,
	vector::{IndexPoint, UpsertOutcome},
};
use rag_providers::{
	chat::{self, ChunkStream},
	embedding,
};
use rag_storage::{db::Db, models::Note, qdrant::QdrantStore, queries};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>>;

	/// Must stop producing, and release the upstream request, once `cancel` fires.
	fn stream<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [ChatMessage],
		cancel: CancellationToken,
	) -> BoxFuture<'a, color_eyre::Result<ChunkStream>>;
}

/// Append-only relational store of note text.
pub trait NoteStore
where
	Self: Send + Sync,
{
	fn insert_note<'a>(&'a self, text: &'a str) -> BoxFuture<'a, rag_storage::Result<i64>>;

	fn fetch_notes<'a>(&'a self, ids: &'a [i64]) -> BoxFuture<'a, rag_storage::Result<Vec<Note>>>;

	fn mark_indexed(&self, id: i64) -> BoxFuture<'_, rag_storage::Result<()>>;

	fn list_unindexed(
		&self,
		after_id: i64,
		limit: u32,
	) -> BoxFuture<'_, rag_storage::Result<Vec<Note>>>;
}

/// Nearest-neighbour index keyed by note id.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
	) -> BoxFuture<'a, rag_storage::Result<Vec<SimilarityMatch>>>;

	fn upsert<'a>(
		&'a self,
		points: &'a [IndexPoint],
	) -> BoxFuture<'a, rag_storage::Result<UpsertOutcome>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub chat: Arc<dyn ChatProvider>,
}

pub struct RagService {
	pub cfg: Config,
	pub notes: Arc<dyn NoteStore>,
	pub index: Arc<dyn VectorIndex>,
	pub providers: Providers,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl ChatProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(chat::complete(cfg, messages))
	}

	fn stream<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		messages: &'a [ChatMessage],
		cancel: CancellationToken,
	) -> BoxFuture<'a, color_eyre::Result<ChunkStream>> {
		Box::pin(chat::stream(cfg, messages, cancel))
	}
}

impl NoteStore for Db {
	fn insert_note<'a>(&'a self, text: &'a str) -> BoxFuture<'a, rag_storage::Result<i64>> {
		Box::pin(queries::insert_note(self, text))
	}

	fn fetch_notes<'a>(&'a self, ids: &'a [i64]) -> BoxFuture<'a, rag_storage::Result<Vec<Note>>> {
		Box::pin(queries::fetch_notes(self, ids))
	}

	fn mark_indexed(&self, id: i64) -> BoxFuture<'_, rag_storage::Result<()>> {
		Box::pin(queries::mark_indexed(self, id, OffsetDateTime::now_utc()))
	}

	fn list_unindexed(
		&self,
		after_id: i64,
		limit: u32,
	) -> BoxFuture<'_, rag_storage::Result<Vec<Note>>> {
		Box::pin(queries::list_unindexed(self, after_id, limit))
	}
}

impl VectorIndex for QdrantStore {
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
	) -> BoxFuture<'a, rag_storage::Result<Vec<SimilarityMatch>>> {
		Box::pin(QdrantStore::query(self, vector, top_k))
	}

	fn upsert<'a>(
		&'a self,
		points: &'a [IndexPoint],
	) -> BoxFuture<'a, rag_storage::Result<UpsertOutcome>> {
		Box::pin(QdrantStore::upsert(self, points))
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, chat: Arc<dyn ChatProvider>) -> Self {
		Self { embedding, chat }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), chat: provider }
	}
}

impl RagService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self::with_providers(cfg, db, qdrant, Providers::default())
	}

	pub fn with_providers(cfg: Config, db: Db, qdrant: QdrantStore, providers: Providers) -> Self {
		Self::from_parts(cfg, Arc::new(db), Arc::new(qdrant), providers)
	}

	pub fn from_parts(
		cfg: Config,
		notes: Arc<dyn NoteStore>,
		index: Arc<dyn VectorIndex>,
		providers: Providers,
	) -> Self {
		Self { cfg, notes, index, providers }
	}

	/// Embeds one text. `Ok(None)` means the provider answered without a vector.
	pub(crate) async fn embed_one(&self, text: &str) -> Result<Option<Vec<f32>>> {
		let texts = [text.to_string()];
		let embeddings =
			self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await?;
		let Some(vec) = embeddings.into_iter().next() else {
			return Ok(None);
		};

		if vec.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(Some(vec))
	}
}
