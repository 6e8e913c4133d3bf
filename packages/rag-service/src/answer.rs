use std::collections::HashMap;

use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use rag_domain::{
	prompt::{COMPLETE_TASK_PROMPT, PromptBuilder, STREAM_TASK_PROMPT},
	similarity,
};

use crate::{Error, RagService, Result};

pub type AnswerStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRequest {
	pub text: Option<String>,
}

/// How the caller wants the answer delivered.
#[derive(Debug, Clone)]
pub enum AnswerMode {
	Complete,
	/// `cancel` is handed to the chat provider and should fire when the consumer goes away.
	Stream { cancel: CancellationToken },
}

pub enum Answer {
	Complete(String),
	Stream(AnswerStream),
}

impl std::fmt::Debug for Answer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
			Self::Stream(_) => f.write_str("Stream(..)"),
		}
	}
}

impl RagService {
	pub async fn answer(&self, req: AnswerRequest, mode: AnswerMode) -> Result<Answer> {
		let retrieval = &self.cfg.retrieval;
		let question = req
			.text
			.filter(|text| !text.trim().is_empty())
			.unwrap_or_else(|| retrieval.default_question.clone());
		let (top_k, task) = match mode {
			AnswerMode::Complete => (retrieval.complete_top_k, COMPLETE_TASK_PROMPT),
			AnswerMode::Stream { .. } => (retrieval.stream_top_k, STREAM_TASK_PROMPT),
		};
		let notes = self.retrieve_context(&question, top_k).await?;
		let messages = PromptBuilder::new(task).with_notes(&notes).build(&question);
		let chat_cfg = &self.cfg.providers.chat;

		match mode {
			AnswerMode::Complete => {
				let text = self.providers.chat.complete(chat_cfg, &messages).await?;

				Ok(Answer::Complete(text))
			},
			AnswerMode::Stream { cancel } => {
				let chunks = self.providers.chat.stream(chat_cfg, &messages, cancel).await?;

				Ok(Answer::Stream(chunks.map(|chunk| chunk.map_err(Error::from)).boxed()))
			},
		}
	}

	/// Text of the stored notes most similar to `question`, best match first.
	pub async fn retrieve_context(&self, question: &str, top_k: u32) -> Result<Vec<String>> {
		let Some(vector) = self.embed_one(question).await? else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};
		let matches = self.index.query(&vector, top_k).await?;
		let candidate_count = matches.len();
		let kept = similarity::above_cutoff(matches, self.cfg.retrieval.similarity_cutoff);

		tracing::debug!(
			candidate_count,
			kept_count = kept.len(),
			top_k,
			"Similarity matches filtered."
		);

		if kept.is_empty() {
			return Ok(Vec::new());
		}

		let (ids, rejected) = similarity::note_ids(&kept);

		if !rejected.is_empty() {
			tracing::warn!(?rejected, "Skipping matches whose ids are not note ids.");
		}
		if ids.is_empty() {
			return Ok(Vec::new());
		}

		let mut texts = self
			.notes
			.fetch_notes(&ids)
			.await?
			.into_iter()
			.map(|note| (note.id, note.text))
			.collect::<HashMap<_, _>>();

		Ok(ids.iter().filter_map(|id| texts.remove(id)).collect())
	}
}
