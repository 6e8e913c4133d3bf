use std::{sync::Arc, time::Duration};

use axum::{
	Router,
	body::{self, Body},
	http::{
		Request, Response, StatusCode,
		header::{ACCEPT, CONTENT_TYPE, LOCATION},
	},
};
use serde_json::Value;
use tower::util::ServiceExt;

use rag_api::{routes, state::AppState};
use rag_service::{Providers, RagService};
use rag_testkit::{
	TestDatabase,
	fakes::{KeywordEmbedding, MemoryNoteStore, MemoryVectorIndex, ScriptedChat},
};

const KEYWORDS: [&str; 2] = ["sky", "ocean"];

struct TestApp {
	app: Router,
	admin: Router,
	notes: Arc<MemoryNoteStore>,
	index: Arc<MemoryVectorIndex>,
	chat: Arc<ScriptedChat>,
}

fn test_app(notes: MemoryNoteStore, chat: ScriptedChat) -> TestApp {
	test_app_with(notes, MemoryVectorIndex::new(), chat)
}

fn test_app_with(notes: MemoryNoteStore, index: MemoryVectorIndex, chat: ScriptedChat) -> TestApp {
	let embedding = Arc::new(KeywordEmbedding::new(&KEYWORDS));
	let notes = Arc::new(notes);
	let index = Arc::new(index);
	let chat = Arc::new(chat);
	let service = RagService::from_parts(
		rag_testkit::offline_config(embedding.dim()),
		notes.clone(),
		index.clone(),
		Providers::new(embedding, chat.clone()),
	);
	let state = AppState::from_service(service);

	TestApp {
		app: routes::router(state.clone()),
		admin: routes::admin_router(state),
		notes,
		index,
		chat,
	}
}

fn default_app() -> TestApp {
	test_app(MemoryNoteStore::new(), ScriptedChat::new("Blue.", &["Hel", "lo"]))
}

async fn call(app: &Router, request: Request<Body>) -> Response<Body> {
	app.clone().oneshot(request).await.expect("Failed to call router.")
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).expect("Failed to build request.")
}

fn post(uri: &str, content_type: &str, body: &str) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header(CONTENT_TYPE, content_type)
		.body(Body::from(body.to_string()))
		.expect("Failed to build request.")
}

fn post_untyped(uri: &str, body: &str) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.body(Body::from(body.to_string()))
		.expect("Failed to build request.")
}

fn multipart_text(boundary: &str, text: &str) -> String {
	format!(
		"--{boundary}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nignored\r\n\
		 --{boundary}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{text}\r\n\
		 --{boundary}--\r\n"
	)
}

async fn body_text(response: Response<Body>) -> String {
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");

	String::from_utf8(bytes.to_vec()).expect("Response body is not UTF-8.")
}

async fn body_json(response: Response<Body>) -> Value {
	serde_json::from_str(&body_text(response).await).expect("Response body is not JSON.")
}

fn header<'a>(response: &'a Response<Body>, name: axum::http::HeaderName) -> &'a str {
	response
		.headers()
		.get(name)
		.and_then(|value| value.to_str().ok())
		.expect("Missing response header.")
}

/// `data` payloads of every event in an event-stream body.
fn sse_data(body: &str) -> Vec<String> {
	body.lines()
		.filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
		.map(|data| data.to_string())
		.collect()
}

#[tokio::test]
async fn health_ok() {
	let test = default_app();
	let response = call(&test.app, get("/health")).await;

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn root_answers_in_plain_text() {
	let test = default_app();
	let response = call(&test.app, get("/?text=what%20color%20is%20the%20sky")).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert!(header(&response, CONTENT_TYPE).starts_with("text/plain"));
	assert_eq!(body_text(response).await, "Blue.");

	let prompt = test.chat.last_prompt().expect("Chat model was not called.");
	let asked = prompt.last().map(|message| message.content.as_str());

	assert_eq!(asked, Some("what color is the sky"));
}

#[tokio::test]
async fn root_renders_forms_for_browsers() {
	let test = default_app();
	let request = Request::builder()
		.uri("/")
		.header(ACCEPT, "text/html,application/xhtml+xml")
		.body(Body::empty())
		.expect("Failed to build request.");
	let response = call(&test.app, request).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert!(header(&response, CONTENT_TYPE).starts_with("text/html"));

	let html = body_text(response).await;

	assert!(html.contains("My first RAG"));
	assert!(html.contains(r#"action="/answer/ui""#));
	assert!(html.contains(r#"action="/notes""#));
	assert!(test.chat.prompts().is_empty());
}

#[tokio::test]
async fn answer_ui_redirects_without_text() {
	let test = default_app();

	for uri in ["/answer/ui", "/answer/ui?text=", "/answer/ui?text=%20%20"] {
		let response = call(&test.app, get(uri)).await;

		assert!(response.status().is_redirection(), "{uri} did not redirect.");
		assert_eq!(header(&response, LOCATION), "/");
	}
}

#[tokio::test]
async fn answer_ui_escapes_the_question() {
	let test = default_app();
	let response = call(&test.app, get("/answer/ui?text=%3Cb%3Esky%3C%2Fb%3E")).await;

	assert_eq!(response.status(), StatusCode::OK);

	let html = body_text(response).await;

	// askama escapes with numeric entities, other escapers use named ones.
	assert!(
		html.contains("&#60;b&#62;sky&#60;/b&#62;") || html.contains("&lt;b&gt;sky&lt;/b&gt;"),
		"question was not escaped: {html}"
	);
	assert!(!html.contains("<b>sky</b>"));
	assert!(html.contains(r#"<pre id="output""#));
	assert!(html.contains("EventSource"));
}

#[tokio::test]
async fn answer_streams_chunks_then_done() {
	let test = default_app();
	let response = call(&test.app, get("/answer?text=hi")).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert!(header(&response, CONTENT_TYPE).starts_with("text/event-stream"));

	let data = sse_data(&body_text(response).await);

	assert_eq!(data.last().map(String::as_str), Some("[DONE]"));

	let text = data[..data.len() - 1]
		.iter()
		.map(|payload| {
			let value: Value = serde_json::from_str(payload).expect("Event data is not JSON.");

			value["response"].as_str().expect("Event has no response.").to_string()
		})
		.collect::<String>();

	assert_eq!(text, "Hello");
	assert_eq!(test.index.query_top_ks(), vec![10]);
}

#[tokio::test]
async fn answer_stream_reports_upstream_failure() {
	let chat = ScriptedChat::new("", &["Hel"]).with_stream_error("upstream closed");
	let test = test_app(MemoryNoteStore::new(), chat);
	let response = call(&test.app, get("/answer?text=hi")).await;
	let data = sse_data(&body_text(response).await);

	assert_eq!(data.len(), 3);
	assert_eq!(data[0], r#"{"response":"Hel"}"#);

	let error: Value = serde_json::from_str(&data[1]).expect("Event data is not JSON.");

	assert!(error["error"].as_str().is_some_and(|message| message.contains("upstream closed")));
	assert_eq!(data[2], "[DONE]");
}

#[tokio::test]
async fn dropping_the_answer_stream_cancels_generation() {
	let chat = ScriptedChat::new("", &["Hel"]).held_open();
	let test = test_app(MemoryNoteStore::new(), chat);
	let response = call(&test.app, get("/answer?text=hi")).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert!(!test.chat.was_cancelled());

	drop(response);

	tokio::time::timeout(Duration::from_secs(2), async {
		while !test.chat.was_cancelled() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("Generation was not cancelled after the client went away.");
}

#[tokio::test]
async fn add_note_json_returns_the_indexed_note() {
	let test = default_app();
	let response =
		call(&test.app, post("/notes", "application/json", r#"{"text":"the sky is blue"}"#)).await;

	assert_eq!(response.status(), StatusCode::OK);

	let json = body_json(response).await;

	assert_eq!(json["id"], 1);
	assert_eq!(json["text"], "the sky is blue");
	assert_eq!(json["inserted"]["count"], 1);
	assert_eq!(json["inserted"]["ids"][0], "1");
	assert!(test.index.contains(1));

	call(&test.app, get("/?text=what%20color%20is%20the%20sky")).await;

	let prompt = test.chat.last_prompt().expect("Chat model was not called.");

	assert_eq!(prompt[0].content, "Context:\n- the sky is blue");
}

#[tokio::test]
async fn add_note_json_rejects_missing_text() {
	let test = default_app();

	for body in ["{}", r#"{"text":""}"#, r#"{"text":"   "}"#] {
		let response = call(&test.app, post("/notes", "application/json", body)).await;

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);

		let json = body_json(response).await;

		assert_eq!(json["error_code"], "invalid_request");
	}

	assert!(test.notes.is_empty());
	assert!(test.index.is_empty());
}

#[tokio::test]
async fn add_note_accepts_json_without_content_type() {
	let test = default_app();
	let response = call(&test.app, post_untyped("/notes", r#"{"text":"the sky is blue"}"#)).await;

	assert_eq!(response.status(), StatusCode::OK);

	let json = body_json(response).await;

	assert_eq!(json["text"], "the sky is blue");
	assert_eq!(test.notes.texts(), vec!["the sky is blue".to_string()]);
	assert!(test.index.contains(1));

	let response = call(&test.app, post("/notes", "text/plain", r#"{"text":"the ocean"}"#)).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(test.notes.len(), 2);
}

#[tokio::test]
async fn add_note_rejects_unparseable_body() {
	let test = default_app();

	for body in ["", "text=the+sky", "[1, 2]"] {
		let response = call(&test.app, post_untyped("/notes", body)).await;

		assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body:?} was accepted.");

		let json = body_json(response).await;

		assert_eq!(json["error_code"], "invalid_request");
	}

	assert!(test.notes.is_empty());
}

#[tokio::test]
async fn add_note_json_storage_failure_leaves_index_empty() {
	let test = test_app(MemoryNoteStore::failing(), ScriptedChat::new("", &[]));
	let response = call(&test.app, post("/notes", "application/json", r#"{"text":"x"}"#)).await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

	let json = body_json(response).await;

	assert_eq!(json["error_code"], "storage_error");
	assert!(test.index.is_empty());
}

#[tokio::test]
async fn add_note_form_redirects_home() {
	let test = default_app();
	let form = "application/x-www-form-urlencoded";
	let response = call(&test.app, post("/notes", form, "text=the+sky+is+blue")).await;

	assert!(response.status().is_redirection());
	assert_eq!(header(&response, LOCATION), "/");
	assert_eq!(test.notes.texts(), vec!["the sky is blue".to_string()]);

	let response = call(&test.app, post("/notes", form, "text=")).await;

	assert!(response.status().is_redirection());
	assert_eq!(test.notes.len(), 1);
}

#[tokio::test]
async fn add_note_multipart_form_redirects_home() {
	let test = default_app();
	let boundary = "rag-form-boundary";
	let content_type = format!("multipart/form-data; boundary={boundary}");
	let body = multipart_text(boundary, "the sky is blue");
	let response = call(&test.app, post("/notes", &content_type, &body)).await;

	assert!(response.status().is_redirection());
	assert_eq!(header(&response, LOCATION), "/");
	assert_eq!(test.notes.texts(), vec!["the sky is blue".to_string()]);
	assert!(test.index.contains(1));

	let response =
		call(&test.app, post("/notes", &content_type, &multipart_text(boundary, "  "))).await;

	assert!(response.status().is_redirection());
	assert_eq!(test.notes.len(), 1);
}

#[tokio::test]
async fn add_note_form_failure_is_plain_text() {
	let test = test_app(MemoryNoteStore::failing(), ScriptedChat::new("", &[]));
	let response =
		call(&test.app, post("/notes", "application/x-www-form-urlencoded", "text=x")).await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert!(header(&response, CONTENT_TYPE).starts_with("text/plain"));
	assert!(body_text(response).await.contains("Failed to create note"));
}

#[tokio::test]
async fn rejected_vector_is_a_server_error() {
	let dim = KeywordEmbedding::new(&KEYWORDS).dim() + 1;
	let test = test_app_with(
		MemoryNoteStore::new(),
		MemoryVectorIndex::with_dim(dim),
		ScriptedChat::new("", &[]),
	);
	let response =
		call(&test.app, post("/notes", "application/x-www-form-urlencoded", "text=the+sky")).await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert!(body_text(response).await.contains("dimensions"));

	let response = call(&test.app, post("/notes", "application/json", r#"{"text":"sky"}"#)).await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(body_json(response).await["error_code"], "vector_index_error");
	assert_eq!(test.notes.unindexed_ids(), vec![1, 2]);
}

#[tokio::test]
async fn admin_reindex_indexes_orphaned_notes() {
	let notes = MemoryNoteStore::new();

	notes.seed("the ocean is deep");

	let test = test_app(notes, ScriptedChat::new("", &[]));
	let response = call(&test.admin, post("/v1/admin/reindex", "application/json", "")).await;

	assert_eq!(response.status(), StatusCode::OK);

	let json = body_json(response).await;

	assert_eq!(json["reindexed_count"], 1);
	assert_eq!(json["missing_vector_count"], 0);
	assert_eq!(json["error_count"], 0);
	assert!(test.index.contains(1));

	let response = call(&test.app, post("/v1/admin/reindex", "application/json", "")).await;

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set RAG_PG_DSN and RAG_QDRANT_URL to run."]
async fn state_bootstraps_external_storage() {
	let (Some(base_dsn), Some(qdrant_url)) = (rag_testkit::env_dsn(), rag_testkit::env_qdrant_url())
	else {
		eprintln!("Skipping state_bootstraps_external_storage; set RAG_PG_DSN and RAG_QDRANT_URL.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let config = rag_testkit::test_config(
		test_db.dsn().to_string(),
		qdrant_url,
		test_db.collection_name("rag_api"),
		3,
	);
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let response = call(&routes::router(state.clone()), get("/health")).await;

	assert_eq!(response.status(), StatusCode::OK);

	let response = call(&routes::admin_router(state), post("/v1/admin/reindex", "", "")).await;

	assert_eq!(response.status(), StatusCode::OK);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
