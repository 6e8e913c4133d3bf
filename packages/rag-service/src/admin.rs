use serde::{Deserialize, Serialize};

use rag_domain::vector::IndexPoint;

use crate::{RagService, Result};

const REINDEX_BATCH: u32 = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexReport {
	pub reindexed_count: u64,
	pub missing_vector_count: u64,
	pub error_count: u64,
}

impl RagService {
	/// Embeds and upserts every note that never reached the vector index.
	///
	/// Safe to rerun: upserting an existing point id overwrites it with the same vector.
	pub async fn reindex(&self) -> Result<ReindexReport> {
		let dim = self.cfg.storage.qdrant.vector_dim as usize;
		let mut report = ReindexReport::default();
		let mut after_id = 0_i64;

		loop {
			let batch = self.notes.list_unindexed(after_id, REINDEX_BATCH).await?;
			let Some(last) = batch.last() else {
				break;
			};

			after_id = last.id;

			let texts = batch.iter().map(|note| note.text.clone()).collect::<Vec<_>>();
			let vectors =
				match self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await {
					Ok(vectors) => vectors,
					Err(err) => {
						tracing::warn!(
							error = %err,
							batch_len = batch.len(),
							"Reindex embedding failed."
						);

						report.error_count += batch.len() as u64;

						continue;
					},
				};
			let mut vectors = vectors.into_iter();
			let mut points = Vec::with_capacity(batch.len());

			for note in &batch {
				match vectors.next() {
					Some(vector) if vector.len() == dim => {
						points.push(IndexPoint { id: note.id, vector });
					},
					Some(_) => report.error_count += 1,
					None => report.missing_vector_count += 1,
				}
			}

			if points.is_empty() {
				continue;
			}
			if let Err(err) = self.index.upsert(&points).await {
				tracing::warn!(error = %err, point_count = points.len(), "Reindex upsert failed.");

				report.error_count += points.len() as u64;

				continue;
			}

			for point in &points {
				match self.notes.mark_indexed(point.id).await {
					Ok(()) => report.reindexed_count += 1,
					Err(err) => {
						tracing::warn!(
							note_id = point.id,
							error = %err,
							"Failed to mark note as indexed."
						);

						report.error_count += 1;
					},
				}
			}
		}

		tracing::info!(
			reindexed_count = report.reindexed_count,
			missing_vector_count = report.missing_vector_count,
			error_count = report.error_count,
			"Reindex finished."
		);

		Ok(report)
	}
}
