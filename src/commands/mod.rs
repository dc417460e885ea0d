use std::collections::HashSet;

use thiserror::Error;

use crate::constant;

pub mod chat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    Boolean,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterKind,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterSpec>,
}

/// The commands this bot installs on the platform.
pub fn definitions() -> Vec<CommandDefinition> {
    vec![chat::definition()]
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Cannot create '{name}' command: {source:#}")]
    Create {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Cannot delete '{name}' command: {source:#}")]
    Delete {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid command definition '{name}': {reason}")]
    Invalid { name: String, reason: String },
    #[error("failed to remove {} command(s): {}", failed.len(), failed.join(", "))]
    Deregistration { failed: Vec<String> },
}
impl RegistrationError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// The platform-side command store. Implementations decide where the
/// commands live (globally or inside one guild).
#[serenity::async_trait]
pub trait CommandPlatform: Send + Sync {
    async fn create_command(&self, definition: &CommandDefinition) -> anyhow::Result<()>;
    async fn delete_command(&self, name: &str) -> anyhow::Result<()>;
}

/// Checks that every definition is something Discord will accept and that no
/// two definitions share a name.
pub fn validate(definitions: &[CommandDefinition]) -> Result<(), RegistrationError> {
    use constant::discord::{COMMAND_DESCRIPTION_MAX_LEN, COMMAND_NAME_MAX_LEN};

    let mut seen = HashSet::new();
    for definition in definitions {
        let name = definition.name;
        if !is_valid_name(name) {
            return Err(RegistrationError::invalid(
                name,
                format!(
                    "names must be 1-{COMMAND_NAME_MAX_LEN} lowercase letters, digits, '-' or '_'"
                ),
            ));
        }
        if !seen.insert(name) {
            return Err(RegistrationError::invalid(name, "defined more than once"));
        }
        let description_len = definition.description.chars().count();
        if description_len == 0 || description_len > COMMAND_DESCRIPTION_MAX_LEN {
            return Err(RegistrationError::invalid(
                name,
                format!("descriptions must be 1-{COMMAND_DESCRIPTION_MAX_LEN} characters"),
            ));
        }

        let mut parameter_names = HashSet::new();
        for parameter in &definition.parameters {
            if !is_valid_name(parameter.name) {
                return Err(RegistrationError::invalid(
                    name,
                    format!("parameter '{}' has an invalid name", parameter.name),
                ));
            }
            if !parameter_names.insert(parameter.name) {
                return Err(RegistrationError::invalid(
                    name,
                    format!("parameter '{}' is defined more than once", parameter.name),
                ));
            }
        }
    }
    Ok(())
}

fn is_valid_name(name: &str) -> bool {
    (1..=constant::discord::COMMAND_NAME_MAX_LEN).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Installs every definition, stopping at the first failure. Commands
/// created before the failure are removed again before the error returns.
pub async fn register(
    platform: &dyn CommandPlatform,
    definitions: &[CommandDefinition],
) -> Result<(), RegistrationError> {
    validate(definitions)?;

    for (index, definition) in definitions.iter().enumerate() {
        if let Err(source) = platform.create_command(definition).await {
            let err = RegistrationError::Create {
                name: definition.name.to_string(),
                source,
            };
            if let Err(cleanup) = unregister(platform, &definitions[..index]).await {
                tracing::warn!(error = %cleanup, "partial registration was not fully rolled back");
            }
            return Err(err);
        }
        tracing::info!(command = definition.name, "registered command");
    }

    Ok(())
}

/// Removes every definition. A failed deletion is logged and the remaining
/// deletions still run; the failures are reported together at the end.
pub async fn unregister(
    platform: &dyn CommandPlatform,
    definitions: &[CommandDefinition],
) -> Result<(), RegistrationError> {
    let mut failed = vec![];
    for definition in definitions {
        match platform.delete_command(definition.name).await {
            Ok(()) => tracing::info!(command = definition.name, "removed command"),
            Err(source) => {
                let err = RegistrationError::Delete {
                    name: definition.name.to_string(),
                    source,
                };
                tracing::warn!(error = %err, "failed to remove command");
                failed.push(definition.name.to_string());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(RegistrationError::Deregistration { failed })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Records calls and fails the ones named in `fail_on`.
    #[derive(Default)]
    pub struct FakePlatform {
        pub fail_on: Vec<&'static str>,
        pub created: Mutex<Vec<String>>,
        pub delete_attempts: Mutex<Vec<String>>,
    }
    #[serenity::async_trait]
    impl CommandPlatform for FakePlatform {
        async fn create_command(&self, definition: &CommandDefinition) -> anyhow::Result<()> {
            if self.fail_on.contains(&definition.name) {
                anyhow::bail!("rejected by platform");
            }
            self.created.lock().await.push(definition.name.to_string());
            Ok(())
        }

        async fn delete_command(&self, name: &str) -> anyhow::Result<()> {
            self.delete_attempts.lock().await.push(name.to_string());
            if self.fail_on.iter().any(|failing| *failing == name) {
                anyhow::bail!("unknown command");
            }
            Ok(())
        }
    }

    fn command(name: &'static str) -> CommandDefinition {
        CommandDefinition {
            name,
            description: "test command",
            parameters: vec![],
        }
    }

    #[test]
    fn builtin_definitions_are_valid() {
        let definitions = definitions();
        validate(&definitions).unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, constant::commands::CHAT);
    }

    #[test]
    fn rejects_bad_names_and_duplicates() {
        assert!(validate(&[command("Chat")]).is_err());
        assert!(validate(&[command("")]).is_err());
        assert!(validate(&[command("has space")]).is_err());
        assert!(validate(&[command("chat"), command("chat")]).is_err());

        let mut long_description = command("chat");
        long_description.description = "this description is far too long for discord to ever accept it as the description of any slash command";
        assert!(long_description.description.chars().count() > 100);
        assert!(validate(&[long_description]).is_err());

        let mut repeated_parameter = command("chat");
        let parameter = ParameterSpec {
            name: "prompt",
            kind: ParameterKind::String,
            required: true,
            description: "The prompt",
        };
        repeated_parameter.parameters = vec![parameter.clone(), parameter];
        assert!(validate(&[repeated_parameter]).is_err());
    }

    #[test]
    fn description_length_bounds() {
        let mut empty = command("chat");
        empty.description = "";
        assert!(matches!(
            validate(&[empty]),
            Err(RegistrationError::Invalid { ref reason, .. }) if reason.contains("1-100")
        ));

        let at_limit: &'static str = "d".repeat(100).leak();
        let mut longest = command("chat");
        longest.description = at_limit;
        validate(&[longest]).unwrap();

        let over_limit: &'static str = "d".repeat(101).leak();
        let mut too_long = command("chat");
        too_long.description = over_limit;
        assert!(validate(&[too_long]).is_err());
    }

    #[tokio::test]
    async fn register_creates_every_command() {
        let platform = FakePlatform::default();
        register(&platform, &[command("a"), command("b")])
            .await
            .unwrap();
        assert_eq!(*platform.created.lock().await, ["a", "b"]);
    }

    #[tokio::test]
    async fn register_aborts_on_first_failure() {
        let platform = FakePlatform {
            fail_on: vec!["b"],
            ..Default::default()
        };
        let err = register(&platform, &[command("a"), command("b"), command("c")])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Create { ref name, .. } if name == "b"));
        assert_eq!(*platform.created.lock().await, ["a"]);
    }

    #[tokio::test]
    async fn failed_registration_removes_the_commands_it_created() {
        let platform = FakePlatform {
            fail_on: vec!["c"],
            ..Default::default()
        };
        register(&platform, &[command("a"), command("b"), command("c"), command("d")])
            .await
            .unwrap_err();

        assert_eq!(*platform.created.lock().await, ["a", "b"]);
        assert_eq!(*platform.delete_attempts.lock().await, ["a", "b"]);
    }

    #[tokio::test]
    async fn failing_first_command_needs_no_cleanup() {
        let platform = FakePlatform {
            fail_on: vec!["a"],
            ..Default::default()
        };
        register(&platform, &[command("a"), command("b")])
            .await
            .unwrap_err();

        assert!(platform.delete_attempts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unregister_continues_past_failures() {
        let platform = FakePlatform {
            fail_on: vec!["a", "c"],
            ..Default::default()
        };
        let err = unregister(&platform, &[command("a"), command("b"), command("c")])
            .await
            .unwrap_err();

        assert_eq!(*platform.delete_attempts.lock().await, ["a", "b", "c"]);
        match err {
            RegistrationError::Deregistration { failed } => assert_eq!(failed, ["a", "c"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregister_succeeds_when_all_deletions_do() {
        let platform = FakePlatform::default();
        unregister(&platform, &definitions()).await.unwrap();
        assert_eq!(*platform.delete_attempts.lock().await, ["chat"]);
    }
}
