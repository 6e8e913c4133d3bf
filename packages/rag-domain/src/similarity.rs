use serde::{Deserialize, Serialize};

/// One nearest-neighbour hit as reported by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
	pub id: String,
	pub score: f32,
}

/// Keeps matches scoring strictly above `cutoff`, in the order the index ranked them.
pub fn above_cutoff(matches: Vec<SimilarityMatch>, cutoff: f32) -> Vec<SimilarityMatch> {
	matches.into_iter().filter(|hit| hit.score > cutoff).collect()
}

/// Note ids carried by `matches`. Ids that are not integers come back in the second list.
pub fn note_ids(matches: &[SimilarityMatch]) -> (Vec<i64>, Vec<String>) {
	let mut ids = Vec::with_capacity(matches.len());
	let mut rejected = Vec::new();

	for hit in matches {
		match hit.id.trim().parse::<i64>() {
			Ok(id) => ids.push(id),
			Err(_) => rejected.push(hit.id.clone()),
		}
	}

	(ids, rejected)
}
