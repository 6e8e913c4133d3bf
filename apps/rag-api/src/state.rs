use std::sync::Arc;

use rag_service::RagService;
use rag_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RagService>,
}
impl AppState {
	/// Connects both stores and bootstraps them before serving.
	pub async fn new(config: rag_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		let service = RagService::new(config, db, qdrant);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: RagService) -> Self {
		Self { service: Arc::new(service) }
	}
}
