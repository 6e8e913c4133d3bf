use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Note {
	pub id: i64,
	pub text: String,
	pub created_at: OffsetDateTime,
	/// Set once the note's vector has been upserted into the index.
	pub indexed_at: Option<OffsetDateTime>,
}
