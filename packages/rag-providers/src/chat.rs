use color_eyre::{Report, Result, eyre};
use futures::{
	StreamExt,
	stream::{self, BoxStream, Stream},
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rag_domain::message::ChatMessage;

use crate::sse::SseDecoder;

/// Sentinel payload that closes an OpenAI-style completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Partial answer text, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<String>>;

const CHUNK_BUFFER: usize = 32;

#[derive(Debug, PartialEq, Eq)]
enum StreamEvent {
	Delta(Option<String>),
	Done,
}

pub async fn complete(
	cfg: &rag_config::ChatProviderConfig,
	messages: &[ChatMessage],
) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion(json)
}

/// Starts a streamed completion.
///
/// The upstream body is drained by a spawned task that stops as soon as `cancel` fires or the
/// returned stream is dropped, which releases the upstream connection.
pub async fn stream(
	cfg: &rag_config::ChatProviderConfig,
	messages: &[ChatMessage],
	cancel: CancellationToken,
) -> Result<ChunkStream> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
		"stream": true,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?;

	Ok(decode_stream(res.bytes_stream(), cancel))
}

/// Turns a raw event-stream body into answer chunks.
pub fn decode_stream<S, B, E>(body: S, cancel: CancellationToken) -> ChunkStream
where
	S: Stream<Item = Result<B, E>> + Send + 'static,
	B: AsRef<[u8]> + Send + 'static,
	E: Into<Report> + Send + 'static,
{
	let (tx, rx) = mpsc::channel(CHUNK_BUFFER);

	tokio::spawn(forward_chunks(body, tx, cancel));

	stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

async fn forward_chunks<S, B, E>(
	body: S,
	tx: mpsc::Sender<Result<String>>,
	cancel: CancellationToken,
) where
	S: Stream<Item = Result<B, E>> + Send,
	B: AsRef<[u8]>,
	E: Into<Report>,
{
	let mut body = Box::pin(body);
	let mut decoder = SseDecoder::default();

	loop {
		let next = tokio::select! {
			_ = cancel.cancelled() => {
				tracing::debug!("Chat stream cancelled by caller.");

				return;
			},
			_ = tx.closed() => return,
			next = body.next() => next,
		};
		let (payloads, ended) = match next {
			Some(Ok(bytes)) => match decoder.push(bytes.as_ref()) {
				Ok(payloads) => (payloads, false),
				Err(err) => {
					let _ = tx.send(Err(err)).await;

					return;
				},
			},
			Some(Err(err)) => {
				let _ = tx.send(Err(err.into())).await;

				return;
			},
			None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
		};

		for payload in payloads {
			match parse_stream_event(&payload) {
				Ok(StreamEvent::Done) => return,
				Ok(StreamEvent::Delta(Some(text))) =>
					if tx.send(Ok(text)).await.is_err() {
						return;
					},
				Ok(StreamEvent::Delta(None)) => {},
				Err(err) => {
					let _ = tx.send(Err(err)).await;

					return;
				},
			}
		}

		if ended {
			return;
		}
	}
}

fn parse_completion(json: Value) -> Result<String> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		return Ok(content.to_string());
	}
	if let Some(response) = json.get("response").and_then(|v| v.as_str()) {
		return Ok(response.to_string());
	}

	Err(eyre::eyre!("Chat response is missing message content."))
}

fn parse_stream_event(payload: &str) -> Result<StreamEvent> {
	if payload.trim() == DONE_SENTINEL {
		return Ok(StreamEvent::Done);
	}

	let json: Value = serde_json::from_str(payload)
		.map_err(|_| eyre::eyre!("Chat stream event is not valid JSON."))?;

	if let Some(error) = json.get("error") {
		let message = error
			.get("message")
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.unwrap_or_else(|| error.to_string());

		return Err(eyre::eyre!("Chat stream reported an error: {message}"));
	}

	let delta = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("delta"))
		.and_then(|delta| delta.get("content"))
		.or_else(|| json.get("response"))
		.and_then(|c| c.as_str())
		.filter(|text| !text.is_empty())
		.map(str::to_string);

	Ok(StreamEvent::Delta(delta))
}

#[cfg(test)]
mod tests {
	use std::convert::Infallible;

	use super::*;

	fn body(chunks: &[&str]) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send + 'static {
		let chunks = chunks
			.iter()
			.map(|chunk| Ok::<_, Infallible>(chunk.as_bytes().to_vec()))
			.collect::<Vec<_>>();

		stream::iter(chunks)
	}

	#[test]
	fn parses_choice_message_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "role": "assistant", "content": "Three." } }
			]
		});
		assert_eq!(parse_completion(json).expect("parse failed"), "Three.");
	}

	#[test]
	fn parses_bare_response_field() {
		let json = serde_json::json!({ "response": "Three." });
		assert_eq!(parse_completion(json).expect("parse failed"), "Three.");
	}

	#[test]
	fn stream_event_variants() {
		assert_eq!(parse_stream_event("[DONE]").expect("parse failed"), StreamEvent::Done);
		assert_eq!(
			parse_stream_event(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#)
				.expect("parse failed"),
			StreamEvent::Delta(Some("Hel".to_string()))
		);
		assert_eq!(
			parse_stream_event(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)
				.expect("parse failed"),
			StreamEvent::Delta(None)
		);
		assert_eq!(
			parse_stream_event(r#"{"response":"lo"}"#).expect("parse failed"),
			StreamEvent::Delta(Some("lo".to_string()))
		);
		assert!(parse_stream_event("not json").is_err());
		assert!(parse_stream_event(r#"{"error":{"message":"overloaded"}}"#).is_err());
	}

	#[tokio::test]
	async fn decodes_chunks_until_sentinel() {
		let stream = decode_stream(
			body(&[
				"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
				"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
				"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
			]),
			CancellationToken::new(),
		);
		let chunks = stream
			.map(|chunk| chunk.expect("chunk failed"))
			.collect::<Vec<_>>()
			.await;

		assert_eq!(chunks.concat(), "Hello");
	}

	#[tokio::test]
	async fn cancelled_stream_ends_without_chunks() {
		let cancel = CancellationToken::new();

		cancel.cancel();

		let chunks = decode_stream(stream::pending::<Result<Vec<u8>, Infallible>>(), cancel)
			.collect::<Vec<_>>()
			.await;

		assert!(chunks.is_empty());
	}

	#[tokio::test]
	async fn upstream_error_event_is_surfaced() {
		let mut stream = decode_stream(
			body(&["data: {\"error\":{\"message\":\"overloaded\"}}\n\n"]),
			CancellationToken::new(),
		);
		let first = stream.next().await.expect("Expected one item.");

		assert!(first.is_err());
		assert!(stream.next().await.is_none());
	}
}
