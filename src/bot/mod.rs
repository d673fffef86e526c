//! # Bot Module
//!
//! Discord front end for the jukebox.
//!
//! - Slash command registration and dispatch
//! - Control panel buttons
//! - Voice state tracking for the bot's own connection
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. It owns no playback
//! state of its own: every command goes through the [`CommandSurface`], and the
//! control panels are refreshed by a background task fed by
//! [`crate::audio::PlaybackCoordinator::subscribe`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use guild_jukebox::{audio::CommandSurface, bot::JukeboxBot, config::Config};
//!
//! # fn example(surface: CommandSurface) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let bot = JukeboxBot::new(config, surface);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        session::{ChannelRef, TenantId},
        CommandSurface,
    },
    config::Config,
    ui::panel::{self, PanelRegistry},
};

pub struct JukeboxBot {
    config: Arc<Config>,
    pub surface: CommandSurface,
    /// Mensaje de panel activo por guild
    pub panels: Arc<PanelRegistry>,
    renderer_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(config: Config, surface: CommandSurface) -> Self {
        Self {
            config: Arc::new(config),
            surface,
            panels: Arc::new(PanelRegistry::new()),
            renderer_started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registra los comandos slash: por guild si `GUILD_ID` está definido
    /// (propagación inmediata), globales si no.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

pub fn tenant(guild_id: GuildId) -> TenantId {
    TenantId(guild_id.get())
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión; el renderizador es único
        if !self.renderer_started.swap(true, Ordering::SeqCst) {
            let updates = self.surface.coordinator().subscribe();
            tokio::spawn(panel::render_updates(
                ctx.http.clone(),
                self.panels.clone(),
                updates,
            ));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detecta cuando el bot es desconectado del canal de voz (expulsado,
    /// canal borrado) y libera la sesión del guild si seguía en ese canal.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() {
            return;
        }

        let (Some(guild_id), Some(left)) = (new.guild_id, old.and_then(|o| o.channel_id)) else {
            return;
        };

        info!("🔌 Bot desconectado del canal {} en guild {}", left, guild_id);
        let tenant = tenant(guild_id);

        let Some(summary) = self
            .surface
            .coordinator()
            .disconnected(tenant, ChannelRef(left.get()))
            .await
        else {
            return;
        };
        info!(
            "🧹 Sesión liberada en guild {} ({} canciones descartadas)",
            guild_id, summary.cleared
        );

        if let Some(panel) = self.panels.remove(tenant) {
            let _ = panel
                .channel_id
                .delete_message(&ctx.http, panel.message_id)
                .await;
        }
    }
}
