use time::OffsetDateTime;

use crate::{Result, db::Db, models::Note};

pub async fn insert_note(db: &Db, text: &str) -> Result<i64> {
	let id: i64 = sqlx::query_scalar("INSERT INTO notes (text) VALUES ($1) RETURNING id")
		.bind(text)
		.fetch_one(&db.pool)
		.await?;

	Ok(id)
}

/// Rows for `ids`, in no particular order. Unknown ids are ignored.
pub async fn fetch_notes(db: &Db, ids: &[i64]) -> Result<Vec<Note>> {
	if ids.is_empty() {
		return Ok(Vec::new());
	}

	let notes = sqlx::query_as::<_, Note>(
		"\
SELECT id, text, created_at, indexed_at
FROM notes
WHERE id = ANY($1)",
	)
	.bind(ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(notes)
}

pub async fn mark_indexed(db: &Db, id: i64, now: OffsetDateTime) -> Result<()> {
	sqlx::query("UPDATE notes SET indexed_at = $1 WHERE id = $2")
		.bind(now)
		.bind(id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

/// Notes never marked as indexed, oldest first, starting after `after_id`.
pub async fn list_unindexed(db: &Db, after_id: i64, limit: u32) -> Result<Vec<Note>> {
	let notes = sqlx::query_as::<_, Note>(
		"\
SELECT id, text, created_at, indexed_at
FROM notes
WHERE indexed_at IS NULL AND id > $1
ORDER BY id
LIMIT $2",
	)
	.bind(after_id)
	.bind(i64::from(limit))
	.fetch_all(&db.pool)
	.await?;

	Ok(notes)
}
