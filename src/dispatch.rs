//! Routes inbound interactions to their command handlers.
//!
//! Each recognised interaction runs on its own task so a slow completion call
//! never holds up event delivery or other interactions.

use std::{collections::HashMap, sync::Arc};

use tokio::task::JoinHandle;
use tracing::Instrument as _;

use crate::{
    commands::{self, CommandDefinition, RegistrationError},
    completion::Completer,
    config::Configuration,
    constant,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Number(f64),
}

/// The single response allowed for an interaction. Sending consumes the
/// handle, so a second reply cannot be attempted.
#[serenity::async_trait]
pub trait ReplyHandle: Send {
    async fn send(self: Box<Self>, content: String) -> anyhow::Result<()>;
}

pub struct InteractionEvent {
    pub id: String,
    pub command_name: String,
    pub parameters: HashMap<String, ParameterValue>,
    pub reply: Box<dyn ReplyHandle>,
}
impl InteractionEvent {
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.parameters.get(name)? {
            ParameterValue::String(value) => Some(value),
            _ => None,
        }
    }
}

/// Every command the dispatcher knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Chat,
}
impl Route {
    pub const ALL: [Route; 1] = [Route::Chat];

    pub fn name(self) -> &'static str {
        match self {
            Self::Chat => constant::commands::CHAT,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|route| route.name() == name)
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    chat: commands::chat::Handler,
}
impl Dispatcher {
    pub fn new(completer: Arc<dyn Completer>, config: &Configuration) -> Self {
        Self {
            chat: commands::chat::Handler::new(completer, config),
        }
    }

    /// Ensures the routing table and the registered definitions agree: no
    /// definition without a route and no route without a definition.
    pub fn validate(definitions: &[CommandDefinition]) -> Result<(), RegistrationError> {
        for definition in definitions {
            if Route::from_name(definition.name).is_none() {
                return Err(RegistrationError::Invalid {
                    name: definition.name.to_string(),
                    reason: "no handler is routed for this command".into(),
                });
            }
        }
        for route in Route::ALL {
            if !definitions.iter().any(|d| d.name == route.name()) {
                return Err(RegistrationError::Invalid {
                    name: route.name().to_string(),
                    reason: "handler has no command definition".into(),
                });
            }
        }
        Ok(())
    }

    /// Spawns the handler for `event`. Unrecognised commands are ignored
    /// without a reply; `None` is returned for them.
    pub fn on_interaction(&self, event: InteractionEvent) -> Option<JoinHandle<()>> {
        let Some(route) = Route::from_name(&event.command_name) else {
            tracing::debug!(command = %event.command_name, "ignoring unrecognised command");
            return None;
        };

        let span = tracing::info_span!(
            "interaction",
            command = route.name(),
            interaction_id = %event.id,
        );
        let this = self.clone();
        Some(tokio::spawn(
            async move {
                tracing::debug!("handling interaction");
                match route {
                    Route::Chat => this.chat.run(event).await,
                }
            }
            .instrument(span),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use std::time::Duration;
    use tokio::sync::{Barrier, mpsc};

    /// Forwards the reply content to a channel.
    pub struct RecordingReply(mpsc::UnboundedSender<String>);
    impl RecordingReply {
        pub fn new() -> (Box<dyn ReplyHandle>, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Box::new(Self(tx)), rx)
        }
    }
    #[serenity::async_trait]
    impl ReplyHandle for RecordingReply {
        async fn send(self: Box<Self>, content: String) -> anyhow::Result<()> {
            self.0.send(content)?;
            Ok(())
        }
    }

    pub fn event(
        command_name: &str,
        prompt: Option<&str>,
        reply: Box<dyn ReplyHandle>,
    ) -> InteractionEvent {
        InteractionEvent {
            id: "1".into(),
            command_name: command_name.into(),
            parameters: prompt
                .map(|p| {
                    HashMap::from([(
                        constant::value::PROMPT.to_string(),
                        ParameterValue::String(p.to_string()),
                    )])
                })
                .unwrap_or_default(),
            reply,
        }
    }

    struct Echo;
    #[serenity::async_trait]
    impl Completer for Echo {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            Ok(format!(" echo {prompt}"))
        }
    }

    /// Completes only once `parties` calls are in flight at the same time.
    struct Rendezvous(Barrier);
    #[serenity::async_trait]
    impl Completer for Rendezvous {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.0.wait().await;
            Ok(format!(" {prompt}"))
        }
    }

    fn dispatcher(completer: impl Completer + 'static) -> Dispatcher {
        Dispatcher::new(Arc::new(completer), &Configuration::default())
    }

    #[test]
    fn every_definition_is_routed() {
        let definitions = commands::definitions();
        Dispatcher::validate(&definitions).unwrap();
        for definition in &definitions {
            assert!(Route::from_name(definition.name).is_some());
        }
    }

    #[test]
    fn validation_catches_orphans() {
        let mut definitions = commands::definitions();
        definitions.push(CommandDefinition {
            name: "imagine",
            description: "not routed",
            parameters: vec![],
        });
        assert!(Dispatcher::validate(&definitions).is_err());
        assert!(Dispatcher::validate(&[]).is_err());
    }

    #[tokio::test]
    async fn unknown_command_is_ignored() {
        let (reply, mut replies) = RecordingReply::new();
        let handle = dispatcher(Echo).on_interaction(event("unknown", Some("x"), reply));

        assert!(handle.is_none());
        assert!(replies.recv().await.is_none());
    }

    #[tokio::test]
    async fn chat_is_routed_and_replied_to_once() {
        let (reply, mut replies) = RecordingReply::new();
        dispatcher(Echo)
            .on_interaction(event("chat", Some("ping"), reply))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            replies.recv().await.unwrap(),
            "**Prompt:**\nping\n**Response:** echo ping"
        );
        assert!(replies.recv().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_interactions_do_not_block_each_other() {
        const N: usize = 10;
        let dispatcher = dispatcher(Rendezvous(Barrier::new(N)));

        let mut pending = vec![];
        for i in 0..N {
            let (reply, replies) = RecordingReply::new();
            let handle = dispatcher
                .on_interaction(event("chat", Some(&format!("p{i}")), reply))
                .unwrap();
            pending.push((i, handle, replies));
        }

        // Every call waits on the barrier, so this only finishes if all N
        // handlers are in flight together.
        tokio::time::timeout(Duration::from_secs(5), async {
            for (i, handle, mut replies) in pending {
                handle.await.unwrap();
                assert_eq!(
                    replies.recv().await.unwrap(),
                    format!("**Prompt:**\np{i}\n**Response:** p{i}")
                );
            }
        })
        .await
        .expect("handlers were serialised");
    }

    #[tokio::test]
    async fn chat_reply_comes_from_the_completion_endpoint() {
        use crate::completion::tests::{client, respond_with};

        let endpoint = respond_with(200, r#"{"choices":[{"text":" hello"}]}"#).await;
        let dispatcher = dispatcher(client(endpoint, Some("sk-test")));

        let (reply, mut replies) = RecordingReply::new();
        dispatcher
            .on_interaction(event("chat", Some("test"), reply))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            replies.recv().await.unwrap(),
            "**Prompt:**\ntest\n**Response:** hello"
        );
        assert!(replies.recv().await.is_none());
    }

    #[tokio::test]
    async fn failing_completion_endpoint_gets_no_reply() {
        use crate::completion::tests::{client, respond_with};

        let endpoint = respond_with(500, "upstream exploded").await;
        let dispatcher = dispatcher(client(endpoint, Some("sk-test")));

        let (reply, mut replies) = RecordingReply::new();
        dispatcher
            .on_interaction(event("chat", Some("test"), reply))
            .unwrap()
            .await
            .unwrap();

        assert!(replies.recv().await.is_none());
    }
}
