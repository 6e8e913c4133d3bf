pub mod fakes;

mod error;

pub use error::{Error, Result};

use std::{collections::HashSet, env, str::FromStr, sync::Mutex, thread, time::Duration};

use qdrant_client::Qdrant;
use serde_json::Map;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

use rag_config::{
	ChatProviderConfig, Config, EmbeddingProviderConfig, Postgres, Providers,
	Qdrant as QdrantConfig, Retrieval, Service, Storage,
};
use rag_storage::db::Db;

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A throwaway Postgres database, dropped together with any Qdrant collections named through it.
pub struct TestDatabase {
	dsn: String,
	cleanup: Cleanup,
	cleaned: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("RAG_PG_DSN is not a Postgres DSN: {err}.")))?;
		let (admin_options, mut admin_conn) = connect_admin(&base_options).await?;
		let name = format!("rag_test_{}", Uuid::new_v4().simple());

		admin_conn
			.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create database {name}: {err}.")))?;

		let dsn = base_options.database(&name).to_url_lossy().to_string();

		Ok(Self {
			dsn,
			cleanup: Cleanup { name, admin_options, collections: Mutex::new(HashSet::new()) },
			cleaned: false,
		})
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// A collection name unique to this database, deleted again on cleanup.
	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.cleanup.name);

		self.cleanup
			.collections
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.insert(collection.clone());

		collection
	}

	/// Connects to this database and bootstraps the notes schema.
	pub async fn connect(&self) -> Result<Db> {
		let db = Db::connect(&Postgres { dsn: self.dsn.clone(), pool_max_conns: 2 }).await?;

		db.ensure_schema().await?;

		Ok(db)
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleaned = true;

		self.cleanup.run().await
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let cleanup = Cleanup {
			name: self.cleanup.name.clone(),
			admin_options: self.cleanup.admin_options.clone(),
			collections: Mutex::new(self.cleanup.collections()),
		};
		// Blocking inside the caller's runtime panics, so cleanup gets its own thread and runtime.
		let handle = thread::spawn(move || {
			let runtime = Builder::new_current_thread().enable_all().build();

			match runtime {
				Ok(runtime) =>
					if let Err(err) = runtime.block_on(cleanup.run()) {
						eprintln!("Test database cleanup failed: {err}.");
					},
				Err(err) => eprintln!("Test database cleanup failed: {err}."),
			}
		});
		let _ = handle.join();
	}
}

struct Cleanup {
	name: String,
	admin_options: PgConnectOptions,
	collections: Mutex<HashSet<String>>,
}
impl Cleanup {
	fn collections(&self) -> HashSet<String> {
		self.collections.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Drops the database and the collections. Both are attempted even when one fails.
	async fn run(&self) -> Result<()> {
		let qdrant = drop_collections(&self.collections()).await;
		let postgres = drop_database(&self.name, &self.admin_options).await;

		postgres.and(qdrant)
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("RAG_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("RAG_QDRANT_URL").ok()
}

/// A valid config whose provider endpoints are unreachable, for tests that swap providers out.
pub fn test_config(dsn: String, qdrant_url: String, collection: String, vector_dim: u32) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			postgres: Postgres { dsn, pool_max_conns: 2 },
			qdrant: QdrantConfig { url: qdrant_url, collection, vector_dim },
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				model: "test".to_string(),
				dimensions: vector_dim,
				timeout_ms: Some(1_000),
				default_headers: Map::new(),
			},
			chat: ChatProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/".to_string(),
				model: "test".to_string(),
				temperature: 0.1,
				timeout_ms: Some(1_000),
				default_headers: Map::new(),
			},
		},
		retrieval: Retrieval::default(),
	}
}

/// Config for hermetic tests that never touch Postgres or Qdrant.
pub fn offline_config(vector_dim: u32) -> Config {
	test_config(
		"postgres://127.0.0.1:1/unused".to_string(),
		"http://127.0.0.1:1".to_string(),
		"unused".to_string(),
		vector_dim,
	)
}

async fn connect_admin(
	base_options: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in ADMIN_DATABASES {
		let options = base_options.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => {
				last_err = Some(err);
			},
		}
	}

	Err(Error::Message(format!("Failed to connect to an admin database: {last_err:?}.")))
}

async fn drop_database(name: &str, admin_options: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin_options).await?;

	sqlx::query(&format!(r#"DROP DATABASE IF EXISTS "{name}" WITH (FORCE)"#))
		.execute(&mut conn)
		.await?;

	Ok(())
}

async fn drop_collections(collections: &HashSet<String>) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(qdrant_url) = env_qdrant_url() else {
		eprintln!("RAG_QDRANT_URL is unset; leaving test collections {collections:?} behind.");

		return Ok(());
	};
	let client = Qdrant::from_url(&qdrant_url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;

	for collection in collections {
		match time::timeout(Duration::from_secs(10), client.delete_collection(collection.clone()))
			.await
		{
			Ok(Ok(_)) => {},
			Ok(Err(err)) => eprintln!("Failed to delete Qdrant collection {collection}: {err}."),
			Err(_) => {
				return Err(Error::Message(format!(
					"Timed out deleting Qdrant collection {collection}."
				)));
			},
		}
	}

	Ok(())
}
