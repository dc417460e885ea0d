use std::{borrow::Cow, sync::Arc};

use crate::{
    commands::{CommandDefinition, ParameterKind, ParameterSpec},
    completion::{self, Completer},
    config::{self, LeadingTrim},
    constant,
    dispatch::InteractionEvent,
};

pub fn definition() -> CommandDefinition {
    CommandDefinition {
        name: constant::commands::CHAT,
        description: "chat with the bot",
        parameters: vec![ParameterSpec {
            name: constant::value::PROMPT,
            kind: ParameterKind::String,
            required: true,
            description: "The prompt for the bot to respond to",
        }],
    }
}

/// Runs `/chat`: one completion, one reply.
#[derive(Clone)]
pub struct Handler {
    completer: Arc<dyn Completer>,
    leading_trim: LeadingTrim,
    reply_on_error: bool,
}
impl Handler {
    pub fn new(completer: Arc<dyn Completer>, config: &config::Configuration) -> Self {
        Self {
            completer,
            leading_trim: config.completion.leading_trim,
            reply_on_error: config.discord.reply_on_error,
        }
    }

    pub async fn run(&self, event: InteractionEvent) {
        let Some(prompt) = event.string(constant::value::PROMPT).map(str::to_owned) else {
            // The platform enforces the required option, so this is our bug.
            debug_assert!(false, "`chat` interaction without its required prompt");
            tracing::error!("chat interaction arrived without a prompt; dropping it");
            return;
        };

        let content = match self.completer.complete(&prompt).await {
            Ok(text) => format_reply(&prompt, self.leading_trim.apply(&text)),
            Err(err) => {
                tracing::error!(error = %err, "Error querying the completion API");
                if !self.reply_on_error {
                    return;
                }
                format_error(&err.to_string())
            }
        };

        if let Err(err) = event.reply.send(content).await {
            tracing::error!(error = %format!("{err:#}"), "failed to send the chat reply");
        }
    }
}

/// Builds the reply. When it would not fit in one Discord message the prompt
/// is shortened first; the response is only cut if it is too long by itself.
pub fn format_reply(prompt: &str, response: &str) -> String {
    fn frame(prompt: &str, response: &str) -> String {
        format!("**Prompt:**\n{prompt}\n**Response:** {response}")
    }

    let budget = constant::discord::MESSAGE_LIMIT.saturating_sub(frame("", "").chars().count());
    let response = shorten(response, budget);
    let prompt = shorten(prompt, budget - response.chars().count());
    frame(&prompt, &response)
}

fn format_error(error: &str) -> String {
    const PREFIX: &str = "Error: ";
    let budget = constant::discord::MESSAGE_LIMIT - PREFIX.len();
    format!("{PREFIX}{}", shorten(error, budget))
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `…`.
fn shorten(text: &str, max_chars: usize) -> Cow<'_, str> {
    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }
    match max_chars.checked_sub(1) {
        Some(keep) => Cow::Owned(format!("{}…", completion::excerpt(text, keep))),
        None => Cow::Borrowed(""),
    }
}
