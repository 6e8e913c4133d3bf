use std::convert::Infallible;

use axum::{
	Form, Json, Router,
	body::Bytes,
	extract::{FromRequest, Multipart, Query, Request, State},
	http::{
		HeaderMap, StatusCode,
		header::{ACCEPT, CONTENT_TYPE},
	},
	response::{
		IntoResponse, Redirect, Response,
		sse::{Event, KeepAlive, KeepAliveStream, Sse},
	},
	routing::{get, post},
};
use futures::{
	StreamExt,
	stream::{self, BoxStream},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use rag_providers::chat::DONE_SENTINEL;
use rag_service::{
	AddNoteRequest, AddNoteResponse, Answer, AnswerMode, AnswerRequest, AnswerStream, Error,
	ReindexReport,
};

use crate::{
	pages::{self, AnswerPage, IndexPage},
	state::AppState,
};

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/", get(index))
		.route("/answer/ui", get(answer_ui))
		.route("/answer", get(answer))
		.route("/notes", post(add_note))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new().route("/v1/admin/reindex", post(reindex)).with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

/// Browsers get the question page, everything else a plain-text answer.
async fn index(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<AnswerRequest>,
) -> Result<Response, ApiError> {
	if accepts_html(&headers) {
		return Ok(pages::render(&IndexPage)?.into_response());
	}

	match state.service.answer(query, AnswerMode::Complete).await? {
		Answer::Complete(text) => Ok(text.into_response()),
		Answer::Stream(_) => Err(ApiError::internal("Expected a complete answer.")),
	}
}

async fn answer_ui(Query(query): Query<AnswerRequest>) -> Result<Response, ApiError> {
	let Some(question) = query.text.as_deref().filter(|text| !text.trim().is_empty()) else {
		return Ok(Redirect::to("/").into_response());
	};

	Ok(pages::render(&AnswerPage { question })?.into_response())
}

async fn answer(
	State(state): State<AppState>,
	Query(query): Query<AnswerRequest>,
) -> Result<Sse<KeepAliveStream<EventStream>>, ApiError> {
	let cancel = CancellationToken::new();
	let mode = AnswerMode::Stream { cancel: cancel.clone() };
	let Answer::Stream(chunks) = state.service.answer(query, mode).await? else {
		return Err(ApiError::internal("Expected a streamed answer."));
	};
	// Dropped with the response body, which stops the upstream stream on disconnect.
	let guard = cancel.drop_guard();
	let events = answer_events(chunks)
		.chain(stream::once(async { Event::default().data(DONE_SENTINEL) }))
		.map(move |event| {
			let _held = &guard;

			Ok(event)
		})
		.boxed();

	Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// One `{"response": ..}` event per chunk. A failed chunk becomes a final `{"error": ..}` event.
fn answer_events(chunks: AnswerStream) -> BoxStream<'static, Event> {
	stream::unfold(Some(chunks), |chunks| async move {
		let mut chunks = chunks?;

		match chunks.next().await? {
			Ok(text) => Some((json_event(serde_json::json!({ "response": text })), Some(chunks))),
			Err(err) => {
				tracing::warn!(error = %err, "Answer stream failed.");

				Some((json_event(serde_json::json!({ "error": err.to_string() })), None))
			},
		}
	})
	.boxed()
}

fn json_event(value: serde_json::Value) -> Event {
	Event::default().data(value.to_string())
}

/// Accepts a JSON body or a browser form post, urlencoded or multipart.
///
/// Anything that is not a form is parsed as JSON whatever its declared content type.
async fn add_note(State(state): State<AppState>, request: Request) -> Response {
	match body_kind(request.headers()) {
		BodyKind::UrlEncoded => {
			let payload = match Form::<AddNoteRequest>::from_request(request, &state).await {
				Ok(Form(payload)) => payload,
				Err(_) => AddNoteRequest::default(),
			};

			add_note_form(&state, payload).await
		},
		BodyKind::Multipart => {
			let payload = match Multipart::from_request(request, &state).await {
				Ok(multipart) => multipart_note(multipart).await,
				Err(_) => AddNoteRequest::default(),
			};

			add_note_form(&state, payload).await
		},
		BodyKind::Json => add_note_json(&state, request).await,
	}
}

async fn add_note_json(state: &AppState, request: Request) -> Response {
	let body = match Bytes::from_request(request, state).await {
		Ok(body) => body,
		Err(rejection) => {
			return ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
				.into_response();
		},
	};
	let payload = match serde_json::from_slice::<AddNoteRequest>(&body) {
		Ok(payload) => payload,
		Err(err) => {
			let message = format!("Request body is not a valid note: {err}");

			return ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", message)
				.into_response();
		},
	};

	match state.service.add_note(payload).await {
		Ok(response) => Json::<AddNoteResponse>(response).into_response(),
		Err(err) => ApiError::from(err).into_response(),
	}
}

async fn add_note_form(state: &AppState, payload: AddNoteRequest) -> Response {
	match state.service.add_note(payload).await {
		Ok(_) | Err(Error::InvalidRequest { .. }) => Redirect::to("/").into_response(),
		Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
	}
}

/// Reads the `text` field. Other fields are skipped and a malformed body counts as no text.
async fn multipart_note(mut multipart: Multipart) -> AddNoteRequest {
	while let Ok(Some(field)) = multipart.next_field().await {
		if field.name() != Some("text") {
			continue;
		}

		return AddNoteRequest { text: field.text().await.ok() };
	}

	AddNoteRequest::default()
}

async fn reindex(State(state): State<AppState>) -> Result<Json<ReindexReport>, ApiError> {
	let report = state.service.reindex().await?;

	Ok(Json(report))
}

fn accepts_html(headers: &HeaderMap) -> bool {
	headers
		.get(ACCEPT)
		.and_then(|value| value.to_str().ok())
		.is_some_and(|value| value.contains("text/html"))
}

enum BodyKind {
	UrlEncoded,
	Multipart,
	Json,
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
	let content_type = headers
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.map(|value| value.trim_start().to_ascii_lowercase())
		.unwrap_or_default();

	if content_type.starts_with("application/x-www-form-urlencoded") {
		BodyKind::UrlEncoded
	} else if content_type.starts_with("multipart/form-data") {
		BodyKind::Multipart
	} else {
		BodyKind::Json
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}

	fn internal(message: impl Into<String>) -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } => {
				Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
			},
			Error::Provider { message } => {
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "provider_error", message)
			},
			Error::Storage { message } => {
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
			},
			Error::VectorIndex { message } => {
				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "vector_index_error", message)
			},
		}
	}
}
impl From<askama::Error> for ApiError {
	fn from(err: askama::Error) -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR, "render_error", err.to_string())
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		if self.status.is_server_error() {
			tracing::error!(
				error_code = %self.error_code,
				message = %self.message,
				"Request failed."
			);
		}

		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
