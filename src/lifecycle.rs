//! Startup and shutdown sequencing.
//!
//! `Unauthenticated -> Connected -> CommandsRegistered -> Serving ->
//! ShuttingDown -> Closed`. Any failure before `Serving` aborts the process.

use std::{sync::Arc, time::Duration};

use serenity::all::{Client, GatewayIntents, ShardManager};
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinHandle},
};

use crate::{
    commands::{self, CommandDefinition, CommandPlatform, RegistrationError},
    completion::CompletionClient,
    config::Configuration,
    dispatch::Dispatcher,
    error::StartupError,
    handler::Handler,
    util::DiscordCommands,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    Connected,
    CommandsRegistered,
    Serving,
    ShuttingDown,
    Closed,
}
impl Phase {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Unauthenticated => Some(Self::Connected),
            Self::Connected => Some(Self::CommandsRegistered),
            Self::CommandsRegistered => Some(Self::Serving),
            Self::Serving => Some(Self::ShuttingDown),
            Self::ShuttingDown => Some(Self::Closed),
            Self::Closed => None,
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
}
impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            phase: Phase::Unauthenticated,
        }
    }
}
impl Lifecycle {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves to `next`, which must directly follow the current phase.
    pub fn enter(&mut self, next: Phase) {
        debug_assert_eq!(
            self.phase.next(),
            Some(next),
            "out-of-order lifecycle transition"
        );
        tracing::info!(from = ?self.phase, to = ?next, "lifecycle transition");
        self.phase = next;
    }
}

type Gateway = JoinHandle<serenity::Result<()>>;

const GATEWAY_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the bot until an interrupt arrives. Returns once the commands have
/// been removed and the gateway connection is closed.
pub async fn run(config: Configuration) -> Result<(), StartupError> {
    let mut lifecycle = Lifecycle::default();

    let definitions = commands::definitions();
    commands::validate(&definitions)?;
    Dispatcher::validate(&definitions)?;

    let completer = CompletionClient::new(
        config.completion.clone(),
        config.authentication.completion_api_key.clone(),
    )
    .map_err(StartupError::config)?;
    let dispatcher = Dispatcher::new(Arc::new(completer), &config);

    let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
    let mut client = Client::builder(
        &config.authentication.discord_token,
        GatewayIntents::default(),
    )
    .event_handler(Handler::new(dispatcher, ready_tx))
    .await?;

    let platform = DiscordCommands::new(client.http.clone(), config.scope);
    let shard_manager = client.shard_manager.clone();
    let mut gateway: Gateway = tokio::spawn(async move { client.start().await });

    tokio::select! {
        ready = ready_rx.recv() => {
            if ready.is_none() {
                return Err(StartupError::ConnectionLost);
            }
        }
        result = &mut gateway => return Err(gateway_error(result)),
        () = shutdown_signal() => {
            tracing::info!("interrupted before the bot was ready");
            close(&shard_manager, gateway).await;
            return Ok(());
        }
    }
    drop(ready_rx);
    lifecycle.enter(Phase::Connected);

    tracing::info!(scope = %config.scope, "registering commands");
    match register_until(&platform, &definitions, shutdown_signal()).await {
        Ok(Registration::Complete) => {}
        Ok(Registration::Interrupted) => {
            close(&shard_manager, gateway).await;
            return Ok(());
        }
        Err(err) => {
            close(&shard_manager, gateway).await;
            return Err(err.into());
        }
    }
    lifecycle.enter(Phase::CommandsRegistered);

    lifecycle.enter(Phase::Serving);
    let outcome = tokio::select! {
        () = shutdown_signal() => Ok(()),
        result = &mut gateway => Err(gateway_error(result)),
    };

    lifecycle.enter(Phase::ShuttingDown);
    shut_down(&platform, &definitions).await;
    close(&shard_manager, gateway).await;
    lifecycle.enter(Phase::Closed);

    outcome
}

#[derive(Debug, PartialEq, Eq)]
enum Registration {
    Complete,
    Interrupted,
}

/// Registers the commands unless `interrupt` resolves first, in which case
/// whatever was already installed is removed again.
async fn register_until(
    platform: &dyn CommandPlatform,
    definitions: &[CommandDefinition],
    interrupt: impl Future<Output = ()>,
) -> Result<Registration, RegistrationError> {
    tokio::select! {
        result = commands::register(platform, definitions) => {
            result.map(|()| Registration::Complete)
        }
        () = interrupt => {
            tracing::info!("interrupted while registering commands");
            shut_down(platform, definitions).await;
            Ok(Registration::Interrupted)
        }
    }
}

/// Best-effort removal of every command.
pub async fn shut_down(platform: &dyn CommandPlatform, definitions: &[CommandDefinition]) {
    tracing::info!("Gracefully shutting down; cleaning up commands");
    if let Err(err) = commands::unregister(platform, definitions).await {
        tracing::warn!(error = %err, "command cleanup was incomplete");
    }
}

async fn close(shard_manager: &ShardManager, mut gateway: Gateway) {
    shard_manager.shutdown_all().await;

    let result = match tokio::time::timeout(GATEWAY_CLOSE_TIMEOUT, &mut gateway).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("gateway did not close in time; aborting it");
            gateway.abort();
            gateway.await
        }
    };
    match result {
        Ok(Err(err)) => tracing::warn!(error = %err, "gateway closed with an error"),
        Ok(Ok(())) => tracing::debug!("gateway closed"),
        Err(err) if err.is_cancelled() => tracing::debug!("gateway task cancelled"),
        Err(err) => tracing::warn!(error = %err, "gateway task failed"),
    }
}

fn gateway_error(result: Result<serenity::Result<()>, JoinError>) -> StartupError {
    match result {
        Ok(Err(err)) => StartupError::Connection(err),
        Ok(Ok(())) | Err(_) => StartupError::ConnectionLost,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
}
