pub mod chat;
pub mod embedding;
pub mod sse;

use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

/// Bearer authorization plus the configured extra headers, which must all be strings.
pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Value::String(raw) = value else {
			return Err(eyre::eyre!("Default header {key:?} must have a string value."));
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Builds a client for one provider call. No timeout is applied unless one is configured.
pub(crate) fn client(timeout_ms: Option<u64>) -> Result<Client> {
	let mut builder = Client::builder();

	if let Some(timeout_ms) = timeout_ms {
		builder = builder.timeout(Duration::from_millis(timeout_ms));
	}

	Ok(builder.build()?)
}
