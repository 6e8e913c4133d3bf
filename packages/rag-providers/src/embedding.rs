use color_eyre::{Result, eyre};
use serde::Deserialize;
use serde_json::Value;

/// OpenAI-style `{ index, embedding }` objects or, for Workers AI style hosts, bare vectors.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingRow {
	Indexed { index: Option<usize>, embedding: Vec<f32> },
	Bare(Vec<f32>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingRow>,
}

/// Embeds `texts` in one request. Vectors come back in input order.
pub async fn embed(
	cfg: &rag_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let vectors = parse_embedding_response(json)?;

	tracing::debug!(
		provider_id = %cfg.provider_id,
		input_count = texts.len(),
		vector_count = vectors.len(),
		"Embeddings received."
	);

	Ok(vectors)
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let response: EmbeddingResponse = serde_json::from_value(json)
		.map_err(|err| eyre::eyre!("Embedding response is malformed: {err}."))?;
	let mut rows = response
		.data
		.into_iter()
		.enumerate()
		.map(|(position, row)| match row {
			EmbeddingRow::Indexed { index, embedding } => (index.unwrap_or(position), embedding),
			EmbeddingRow::Bare(embedding) => (position, embedding),
		})
		.collect::<Vec<_>>();

	rows.sort_by_key(|(index, _)| *index);

	Ok(rows.into_iter().map(|(_, embedding)| embedding).collect())
}
