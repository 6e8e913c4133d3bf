use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{Result, schema};

const SCHEMA_LOCK_ID: i64 = 7_120_115;

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &rag_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	/// Applies the bootstrap DDL. Concurrent callers are serialized by a transaction-scoped
	/// advisory lock, and every statement is `IF NOT EXISTS`, so repeated calls are no-ops.
	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;
		sqlx::raw_sql(&sql).execute(&mut *tx).await?;

		tx.commit().await?;

		tracing::debug!("Notes schema ensured.");

		Ok(())
	}
}
