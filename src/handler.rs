use serenity::{
    all::{ApplicationId, Context, EventHandler, Interaction, Ready},
    async_trait,
};
use tokio::sync::mpsc;

use crate::{dispatch::Dispatcher, util};

/// Gateway event handler. `ready` reports the application id back to the
/// lifecycle (which owns command registration); interactions go straight to
/// the dispatcher.
pub struct Handler {
    dispatcher: Dispatcher,
    ready_tx: mpsc::UnboundedSender<ApplicationId>,
}
impl Handler {
    pub fn new(dispatcher: Dispatcher, ready_tx: mpsc::UnboundedSender<ApplicationId>) -> Self {
        Self {
            dispatcher,
            ready_tx,
        }
    }
}
#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "Bot is up!");

        let application_id = ready.application.id;
        ctx.http.set_application_id(application_id);
        // Later readies (after a full reconnect) have nobody listening.
        self.ready_tx.send(application_id).ok();
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(cmd) = interaction {
            self.dispatcher.on_interaction(util::to_event(ctx.http.clone(), cmd));
        }
    }
}
