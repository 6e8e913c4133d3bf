use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		CreateCollectionBuilder, Distance, PointStruct, Query, QueryPointsBuilder, ScoredPoint,
		UpsertPointsBuilder, VectorParamsBuilder, point_id::PointIdOptions,
	},
};

use rag_domain::{
	similarity::SimilarityMatch,
	vector::{IndexPoint, UpsertOutcome},
};

use crate::{Error, Result};

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &rag_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection with cosine distance when it does not exist yet.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
					VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
				),
			)
			.await?;

		tracing::info!(
			collection = %self.collection,
			vector_dim = self.vector_dim,
			"Qdrant collection created."
		);

		Ok(())
	}

	pub async fn query(&self, vector: &[f32], top_k: u32) -> Result<Vec<SimilarityMatch>> {
		self.check_dim(vector)?;

		let response = self
			.client
			.query(
				QueryPointsBuilder::new(self.collection.clone())
					.query(Query::new_nearest(vector.to_vec()))
					.limit(u64::from(top_k)),
			)
			.await?;

		Ok(response.result.iter().filter_map(scored_point_match).collect())
	}

	pub async fn upsert(&self, points: &[IndexPoint]) -> Result<UpsertOutcome> {
		let mut structs = Vec::with_capacity(points.len());
		let mut ids = Vec::with_capacity(points.len());

		for point in points {
			self.check_dim(&point.vector)?;

			let id = u64::try_from(point.id).map_err(|_| {
				Error::InvalidArgument(format!("Note id {} cannot be a point id.", point.id))
			})?;
			let mut payload = Payload::new();

			payload.insert("note_id", point.id);

			structs.push(PointStruct::new(id, point.vector.clone(), payload));
			ids.push(point.id.to_string());
		}

		self.client
			.upsert_points(UpsertPointsBuilder::new(self.collection.clone(), structs).wait(true))
			.await?;

		Ok(UpsertOutcome { count: ids.len(), ids })
	}

	fn check_dim(&self, vector: &[f32]) -> Result<()> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Vector has {} dimensions, collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		Ok(())
	}
}

fn scored_point_match(point: &ScoredPoint) -> Option<SimilarityMatch> {
	let id = match point.id.as_ref()?.point_id_options.as_ref()? {
		PointIdOptions::Num(id) => id.to_string(),
		PointIdOptions::Uuid(id) => id.clone(),
	};

	Some(SimilarityMatch { id, score: point.score })
}
