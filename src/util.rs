use std::{collections::HashMap, sync::Arc};

use anyhow::Context as _;
use serenity::{all::*, async_trait};

use crate::{
    commands::{CommandDefinition, CommandPlatform, ParameterKind},
    config::Scope,
    dispatch::{InteractionEvent, ParameterValue, ReplyHandle},
};

pub fn value_to_parameter(v: &CommandDataOptionValue) -> Option<ParameterValue> {
    match v {
        CommandDataOptionValue::String(v) => Some(ParameterValue::String(v.clone())),
        CommandDataOptionValue::Integer(v) => Some(ParameterValue::Integer(*v)),
        CommandDataOptionValue::Boolean(v) => Some(ParameterValue::Boolean(*v)),
        CommandDataOptionValue::Number(v) => Some(ParameterValue::Number(*v)),
        _ => None,
    }
}

fn option_kind(kind: ParameterKind) -> CommandOptionType {
    match kind {
        ParameterKind::String => CommandOptionType::String,
        ParameterKind::Integer => CommandOptionType::Integer,
        ParameterKind::Boolean => CommandOptionType::Boolean,
        ParameterKind::Number => CommandOptionType::Number,
    }
}

pub fn create_command(definition: &CommandDefinition) -> CreateCommand {
    definition.parameters.iter().fold(
        CreateCommand::new(definition.name).description(definition.description),
        |command, parameter| {
            command.add_option(
                CreateCommandOption::new(
                    option_kind(parameter.kind),
                    parameter.name,
                    parameter.description,
                )
                .required(parameter.required),
            )
        },
    )
}

/// Converts a slash-command interaction into the platform-neutral event the
/// dispatcher consumes.
pub fn to_event(http: Arc<Http>, cmd: CommandInteraction) -> InteractionEvent {
    let parameters: HashMap<_, _> = cmd
        .data
        .options
        .iter()
        .filter_map(|option| Some((option.name.clone(), value_to_parameter(&option.value)?)))
        .collect();

    InteractionEvent {
        id: cmd.id.to_string(),
        command_name: cmd.data.name.clone(),
        parameters,
        reply: Box::new(DiscordReply { http, cmd }),
    }
}

pub struct DiscordReply {
    http: Arc<Http>,
    cmd: CommandInteraction,
}
#[async_trait]
impl ReplyHandle for DiscordReply {
    async fn send(self: Box<Self>, content: String) -> anyhow::Result<()> {
        Ok(self
            .cmd
            .create_response(
                &*self.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(content)
                        .allowed_mentions(CreateAllowedMentions::new()),
                ),
            )
            .await?)
    }
}

/// Slash commands stored on Discord, either globally or in one guild.
pub struct DiscordCommands {
    http: Arc<Http>,
    scope: Scope,
}
impl DiscordCommands {
    pub fn new(http: Arc<Http>, scope: Scope) -> Self {
        Self { http, scope }
    }

    async fn find(&self, name: &str) -> anyhow::Result<CommandId> {
        let registered = match self.scope {
            Scope::Global => Command::get_global_commands(&self.http).await?,
            Scope::Guild(guild_id) => guild_id.get_commands(&self.http).await?,
        };
        registered
            .into_iter()
            .find(|command| command.name == name)
            .map(|command| command.id)
            .with_context(|| format!("'{name}' is not registered ({})", self.scope))
    }
}
#[async_trait]
impl CommandPlatform for DiscordCommands {
    async fn create_command(&self, definition: &CommandDefinition) -> anyhow::Result<()> {
        let builder = create_command(definition);
        match self.scope {
            Scope::Global => {
                Command::create_global_command(&*self.http, builder).await?;
            }
            Scope::Guild(guild_id) => {
                guild_id.create_command(&*self.http, builder).await?;
            }
        }
        Ok(())
    }

    async fn delete_command(&self, name: &str) -> anyhow::Result<()> {
        let id = self.find(name).await?;
        match self.scope {
            Scope::Global => Command::delete_global_command(&self.http, id).await?,
            Scope::Guild(guild_id) => guild_id.delete_command(&self.http, id).await?,
        }
        Ok(())
    }
}
