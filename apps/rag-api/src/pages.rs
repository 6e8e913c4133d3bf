//! Server-rendered pages for browsers.

use askama::Template;
use axum::response::Html;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage;

/// Shows the question and streams the answer into `#output` from `/answer`.
#[derive(Template)]
#[template(path = "answer.html")]
pub struct AnswerPage<'a> {
	pub question: &'a str,
}

pub fn render<T>(page: &T) -> askama::Result<Html<String>>
where
	T: Template,
{
	Ok(Html(page.render()?))
}
