use crate::message::ChatMessage;

pub const COMPLETE_TASK_PROMPT: &str = "When answering the question or responding, use the context provided, if it is provided and relevant.";
pub const STREAM_TASK_PROMPT: &str = "Answer the given question based on only the context.";

/// Assembles the message sequence sent to the chat model.
///
/// The task framing is always present. When notes were retrieved, a context message is placed
/// ahead of it, and the user question always comes last.
#[derive(Debug, Clone)]
pub struct PromptBuilder<'a> {
	task: &'a str,
	notes: Vec<&'a str>,
}
impl<'a> PromptBuilder<'a> {
	pub fn new(task: &'a str) -> Self {
		Self { task, notes: Vec::new() }
	}

	pub fn with_notes(mut self, notes: &'a [String]) -> Self {
		self.notes.extend(notes.iter().map(String::as_str));

		self
	}

	pub fn build(self, question: &str) -> Vec<ChatMessage> {
		let mut messages = Vec::with_capacity(3);

		if let Some(context) = context_message(&self.notes) {
			messages.push(ChatMessage::system(context));
		}

		messages.push(ChatMessage::system(self.task));
		messages.push(ChatMessage::user(question));

		messages
	}
}

pub fn context_message(notes: &[&str]) -> Option<String> {
	if notes.is_empty() {
		return None;
	}

	let lines = notes.iter().map(|note| format!("- {note}")).collect::<Vec<_>>();

	Some(format!("Context:\n{}", lines.join("\n")))
}
