use serde::{Deserialize, Serialize};

/// Vector stored under a note id.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
	pub id: i64,
	pub vector: Vec<f32>,
}

/// What an upsert reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
	pub count: usize,
	pub ids: Vec<String>,
}
