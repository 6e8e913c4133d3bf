//! In-memory stand-ins for the note store, the vector index and both providers.

use std::{
	collections::BTreeMap,
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicBool, Ordering},
	},
};

use color_eyre::eyre;
use futures::{StreamExt, future, stream};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use rag_config::{ChatProviderConfig, EmbeddingProviderConfig};
use rag_domain::{
	message::ChatMessage,
	similarity::SimilarityMatch,
	vector::{IndexPoint, UpsertOutcome},
};
use rag_providers::chat::ChunkStream;
use rag_service::{BoxFuture, ChatProvider, EmbeddingProvider, NoteStore, VectorIndex};
use rag_storage::models::Note;

const BIAS: f32 = 0.1;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

fn storage_down() -> rag_storage::Error {
	rag_storage::Error::Sqlx(sqlx::Error::PoolClosed)
}

#[derive(Default)]
pub struct MemoryNoteStore {
	notes: Mutex<Vec<Note>>,
	failing: bool,
}
impl MemoryNoteStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every operation fails as if the database were unreachable.
	pub fn failing() -> Self {
		Self { notes: Mutex::new(Vec::new()), failing: true }
	}

	/// Inserts a note directly, bypassing the indexing flow.
	pub fn seed(&self, text: &str) -> i64 {
		let mut notes = lock(&self.notes);
		let id = notes.len() as i64 + 1;

		notes.push(Note {
			id,
			text: text.to_string(),
			created_at: OffsetDateTime::now_utc(),
			indexed_at: None,
		});

		id
	}

	pub fn len(&self) -> usize {
		lock(&self.notes).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn texts(&self) -> Vec<String> {
		lock(&self.notes).iter().map(|note| note.text.clone()).collect()
	}

	pub fn unindexed_ids(&self) -> Vec<i64> {
		lock(&self.notes)
			.iter()
			.filter(|note| note.indexed_at.is_none())
			.map(|note| note.id)
			.collect()
	}
}
impl NoteStore for MemoryNoteStore {
	fn insert_note<'a>(&'a self, text: &'a str) -> BoxFuture<'a, rag_storage::Result<i64>> {
		Box::pin(async move {
			if self.failing {
				return Err(storage_down());
			}

			Ok(self.seed(text))
		})
	}

	fn fetch_notes<'a>(&'a self, ids: &'a [i64]) -> BoxFuture<'a, rag_storage::Result<Vec<Note>>> {
		Box::pin(async move {
			if self.failing {
				return Err(storage_down());
			}

			// Newest first, which never matches ranking order.
			let mut notes = lock(&self.notes)
				.iter()
				.filter(|note| ids.contains(&note.id))
				.cloned()
				.collect::<Vec<_>>();

			notes.sort_by(|a, b| b.id.cmp(&a.id));

			Ok(notes)
		})
	}

	fn mark_indexed(&self, id: i64) -> BoxFuture<'_, rag_storage::Result<()>> {
		Box::pin(async move {
			if self.failing {
				return Err(storage_down());
			}

			if let Some(note) = lock(&self.notes).iter_mut().find(|note| note.id == id) {
				note.indexed_at = Some(OffsetDateTime::now_utc());
			}

			Ok(())
		})
	}

	fn list_unindexed(
		&self,
		after_id: i64,
		limit: u32,
	) -> BoxFuture<'_, rag_storage::Result<Vec<Note>>> {
		Box::pin(async move {
			if self.failing {
				return Err(storage_down());
			}

			Ok(lock(&self.notes)
				.iter()
				.filter(|note| note.indexed_at.is_none() && note.id > after_id)
				.take(limit as usize)
				.cloned()
				.collect())
		})
	}
}

/// Cosine-similarity index over the points upserted into it.
#[derive(Default)]
pub struct MemoryVectorIndex {
	points: Mutex<BTreeMap<i64, Vec<f32>>>,
	scripted: Option<Vec<SimilarityMatch>>,
	failing_upserts: bool,
	vector_dim: Option<usize>,
	queries: Mutex<Vec<u32>>,
}
impl MemoryVectorIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Answers every query with `matches`, ignoring stored points.
	pub fn with_matches(matches: Vec<SimilarityMatch>) -> Self {
		Self { scripted: Some(matches), ..Self::default() }
	}

	pub fn failing_upserts() -> Self {
		Self { failing_upserts: true, ..Self::default() }
	}

	/// Rejects vectors whose length is not `dim`, the way a Qdrant collection does.
	pub fn with_dim(dim: u32) -> Self {
		Self { vector_dim: Some(dim as usize), ..Self::default() }
	}

	pub fn len(&self) -> usize {
		lock(&self.points).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn contains(&self, id: i64) -> bool {
		lock(&self.points).contains_key(&id)
	}

	/// `top_k` of every query seen so far.
	pub fn query_top_ks(&self) -> Vec<u32> {
		lock(&self.queries).clone()
	}
}
impl VectorIndex for MemoryVectorIndex {
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		top_k: u32,
	) -> BoxFuture<'a, rag_storage::Result<Vec<SimilarityMatch>>> {
		Box::pin(async move {
			lock(&self.queries).push(top_k);

			if let Some(matches) = &self.scripted {
				return Ok(matches.iter().take(top_k as usize).cloned().collect());
			}

			let mut matches = lock(&self.points)
				.iter()
				.map(|(id, stored)| SimilarityMatch {
					id: id.to_string(),
					score: cosine(vector, stored),
				})
				.collect::<Vec<_>>();

			matches.sort_by(|a, b| b.score.total_cmp(&a.score));
			matches.truncate(top_k as usize);

			Ok(matches)
		})
	}

	fn upsert<'a>(
		&'a self,
		points: &'a [IndexPoint],
	) -> BoxFuture<'a, rag_storage::Result<UpsertOutcome>> {
		Box::pin(async move {
			if self.failing_upserts {
				return Err(rag_storage::Error::from(qdrant_client::QdrantError::ConversionError(
					"Vector index unavailable.".to_string(),
				)));
			}

			if let Some(dim) = self.vector_dim
				&& let Some(point) = points.iter().find(|point| point.vector.len() != dim)
			{
				return Err(rag_storage::Error::InvalidArgument(format!(
					"Vector has {} dimensions, collection expects {dim}.",
					point.vector.len()
				)));
			}

			let mut stored = lock(&self.points);
			let mut ids = Vec::with_capacity(points.len());

			for point in points {
				stored.insert(point.id, point.vector.clone());
				ids.push(point.id.to_string());
			}

			Ok(UpsertOutcome { count: ids.len(), ids })
		})
	}
}

/// Embeds text as keyword indicators plus a constant bias component.
///
/// Texts sharing the same keywords embed identically, so their cosine similarity is 1.
pub struct KeywordEmbedding {
	keywords: Vec<String>,
	calls: Mutex<u32>,
}
impl KeywordEmbedding {
	pub fn new(keywords: &[&str]) -> Self {
		Self {
			keywords: keywords.iter().map(|keyword| keyword.to_lowercase()).collect(),
			calls: Mutex::new(0),
		}
	}

	/// Length of every vector this provider returns.
	pub fn dim(&self) -> u32 {
		self.keywords.len() as u32 + 1
	}

	pub fn calls(&self) -> u32 {
		*lock(&self.calls)
	}

	pub fn vector(&self, text: &str) -> Vec<f32> {
		let text = text.to_lowercase();
		let mut vector = self
			.keywords
			.iter()
			.map(|keyword| if text.contains(keyword.as_str()) { 1.0 } else { 0.0 })
			.collect::<Vec<_>>();

		vector.push(BIAS);

		vector
	}
}
impl EmbeddingProvider for KeywordEmbedding {
	fn embed<'a>(
		&'a self,
		_: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			*lock(&self.calls) += 1;

			Ok(texts.iter().map(|text| self.vector(text)).collect())
		})
	}
}

/// Answers every request with no vectors at all.
pub struct EmptyEmbedding;
impl EmbeddingProvider for EmptyEmbedding {
	fn embed<'a>(
		&'a self,
		_: &'a EmbeddingProviderConfig,
		_: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

/// Chat model with canned output that records every prompt it receives.
pub struct ScriptedChat {
	answer: String,
	chunks: Vec<String>,
	stream_error: Option<String>,
	hold_open: bool,
	prompts: Mutex<Vec<Vec<ChatMessage>>>,
	cancelled: Arc<AtomicBool>,
}
impl ScriptedChat {
	pub fn new(answer: &str, chunks: &[&str]) -> Self {
		Self {
			answer: answer.to_string(),
			chunks: chunks.iter().map(|chunk| chunk.to_string()).collect(),
			stream_error: None,
			hold_open: false,
			prompts: Mutex::new(Vec::new()),
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Fails the stream with `message` after the scripted chunks.
	pub fn with_stream_error(mut self, message: &str) -> Self {
		self.stream_error = Some(message.to_string());

		self
	}

	/// Keeps the stream pending after the scripted chunks until it is cancelled.
	pub fn held_open(mut self) -> Self {
		self.hold_open = true;

		self
	}

	pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
		lock(&self.prompts).clone()
	}

	pub fn last_prompt(&self) -> Option<Vec<ChatMessage>> {
		lock(&self.prompts).last().cloned()
	}

	/// Whether the cancellation token of any stream has fired.
	pub fn was_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}
impl ChatProvider for ScriptedChat {
	fn complete<'a>(
		&'a self,
		_: &'a ChatProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			lock(&self.prompts).push(messages.to_vec());

			Ok(self.answer.clone())
		})
	}

	fn stream<'a>(
		&'a self,
		_: &'a ChatProviderConfig,
		messages: &'a [ChatMessage],
		cancel: CancellationToken,
	) -> BoxFuture<'a, color_eyre::Result<ChunkStream>> {
		Box::pin(async move {
			lock(&self.prompts).push(messages.to_vec());

			let flag = self.cancelled.clone();
			let watched = cancel.clone();

			tokio::spawn(async move {
				watched.cancelled().await;
				flag.store(true, Ordering::SeqCst);
			});

			let chunks = stream::iter(self.chunks.clone().into_iter().map(Ok));
			let failure = stream::iter(
				self.stream_error.clone().map(|message| Err(eyre::eyre!(message))),
			);
			let hold_open = self.hold_open;
			let pending = stream::once(async move {
				if hold_open {
					cancel.cancelled().await;
				}
			})
			.filter_map(|_| future::ready(None::<color_eyre::Result<String>>));

			Ok(chunks.chain(failure).chain(pending).boxed())
		})
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a * norm_b)
}
