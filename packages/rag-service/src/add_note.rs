use serde::{Deserialize, Serialize};

use rag_domain::vector::{IndexPoint, UpsertOutcome};

use crate::{Error, RagService, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddNoteRequest {
	pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNoteResponse {
	pub id: i64,
	pub text: String,
	pub inserted: UpsertOutcome,
}

impl RagService {
	/// Stores a note, then embeds and indexes it.
	///
	/// The steps are not transactional. When embedding or indexing fails the note row remains
	/// without a vector; [`RagService::reindex`] picks such notes up later.
	pub async fn add_note(&self, req: AddNoteRequest) -> Result<AddNoteResponse> {
		let Some(text) = req.text.filter(|text| !text.trim().is_empty()) else {
			return Err(Error::InvalidRequest { message: "Missing text.".to_string() });
		};
		let id = self.notes.insert_note(&text).await.map_err(|err| Error::Storage {
			message: format!("Failed to create note: {err}"),
		})?;

		tracing::info!(note_id = id, "Note stored.");

		let inserted = match self.index_note(id, &text).await {
			Ok(outcome) => outcome,
			Err(err) => {
				tracing::warn!(note_id = id, error = %err, "Note stored without a vector.");

				return Err(err);
			},
		};

		if let Err(err) = self.notes.mark_indexed(id).await {
			tracing::warn!(note_id = id, error = %err, "Failed to mark note as indexed.");
		}

		tracing::info!(note_id = id, count = inserted.count, "Note indexed.");

		Ok(AddNoteResponse { id, text, inserted })
	}

	async fn index_note(&self, id: i64, text: &str) -> Result<UpsertOutcome> {
		let Some(vector) = self.embed_one(text).await? else {
			return Err(Error::Provider {
				message: "Failed to generate vector embedding.".to_string(),
			});
		};

		Ok(self.index.upsert(&[IndexPoint { id, vector }]).await?)
	}
}
