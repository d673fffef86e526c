use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{session::ChannelRef, Volume},
    bot::{tenant, JukeboxBot},
    error::{CommandError, ResolutionError, StateError, TransportError},
    ui::{
        buttons::{self, PanelAction},
        embeds,
        panel::{PanelMessage, PanelView},
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "queue" => handle_queue(ctx, &command, guild_id, bot).await?,
        "skip" => handle_skip(ctx, &command, guild_id, bot).await?,
        "pause" => handle_pause(ctx, &command, guild_id, bot).await?,
        "resume" => handle_resume(ctx, &command, guild_id, bot).await?,
        "volume" => handle_volume(ctx, &command, guild_id, bot).await?,
        "stop" => handle_stop(ctx, &command, guild_id, bot).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, guild_id, bot).await?,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

/// Maneja los botones del panel de control.
///
/// La respuesta solo confirma la interacción: el panel lo edita el
/// renderizador cuando llega el update correspondiente.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = PanelAction::from_custom_id(&component.data.custom_id) else {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Acción no reconocida")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    let tenant = tenant(guild_id);
    let surface = &bot.surface;
    let outcome = match action {
        PanelAction::TogglePause => surface.toggle_pause(tenant).await.map(|_| ()),
        PanelAction::Skip => surface.skip(tenant).await.map(|_| ()),
        PanelAction::Stop => surface.stop(tenant).await.map(|_| ()),
        PanelAction::VolumeUp => surface.volume_up(tenant).await.map(|_| ()),
        PanelAction::VolumeDown => surface.volume_down(tenant).await.map(|_| ()),
    };

    let response = match outcome {
        Ok(()) => CreateInteractionResponse::Acknowledge,
        Err(e) => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(error_message(&e))
                .ephemeral(true),
        ),
    };
    component.create_response(&ctx.http, response).await?;

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "url")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?
        .to_string();

    let Some(channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    // yt-dlp puede tardar más que los 3s que Discord espera
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    info!("🔍 Resolviendo: {}", query);

    let tenant = tenant(guild_id);
    match bot
        .surface
        .enqueue(tenant, ChannelRef(channel_id.get()), &query)
        .await
    {
        Ok(receipt) => {
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new().embed(embeds::enqueued_embed(&receipt)),
                )
                .await?;
            ensure_panel(ctx, command.channel_id, guild_id, bot).await;
        }
        Err(e) => {
            warn!("No se pudo encolar '{}' en guild {}: {}", query, guild_id, e);
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new().embed(embeds::error_embed(&error_message(&e))),
                )
                .await?;
        }
    }

    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let snapshot = bot.surface.snapshot(tenant(guild_id)).await;
    let embed = embeds::queue_embed(snapshot.as_ref(), bot.config().queue_page_size);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    match bot.surface.skip(tenant(guild_id)).await {
        Ok(track) => reply(ctx, command, &format!("⏭️ Saltando: **{}**", track.title()), false).await,
        Err(e) => reply(ctx, command, &error_message(&e), true).await,
    }
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    match bot.surface.pause(tenant(guild_id)).await {
        Ok(()) => reply(ctx, command, "⏸️ Reproducción pausada", false).await,
        Err(e) => reply(ctx, command, &error_message(&e), true).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    match bot.surface.resume(tenant(guild_id)).await {
        Ok(()) => reply(ctx, command, "▶️ Reproducción reanudada", false).await,
        Err(e) => reply(ctx, command, &error_message(&e), true).await,
    }
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let tenant = tenant(guild_id);
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64());

    let Some(level) = level else {
        let current = match bot.surface.snapshot(tenant).await {
            Some(snapshot) => snapshot.volume,
            None => bot.surface.coordinator().settings().default_volume,
        };
        return reply(ctx, command, &format!("🔊 Volumen actual: {}", current), true).await;
    };

    match bot.surface.set_volume(tenant, level).await {
        Ok(volume) => reply(ctx, command, &volume_message(volume), false).await,
        Err(e) => reply(ctx, command, &error_message(&e), true).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    match bot.surface.stop(tenant(guild_id)).await {
        Ok(summary) => {
            let message = format!(
                "⏹️ Reproducción detenida y cola limpiada ({} canciones eliminadas)",
                summary.cleared
            );
            reply(ctx, command, &message, false).await
        }
        Err(e) => reply(ctx, command, &error_message(&e), true).await,
    }
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let snapshot = bot
        .surface
        .snapshot(tenant(guild_id))
        .await
        .filter(|s| s.now_playing.is_some());

    let Some(snapshot) = snapshot else {
        let message = error_message(&CommandError::State(StateError::NothingPlaying));
        return reply(ctx, command, &message, true).await;
    };

    let view = PanelView::from(&snapshot);
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::panel_embed(&view))
                    .components(buttons::player_controls(view.state)),
            ),
        )
        .await?;
    Ok(())
}

/// Publica el panel del guild en este canal si todavía no existe.
async fn ensure_panel(ctx: &Context, channel_id: ChannelId, guild_id: GuildId, bot: &JukeboxBot) {
    let tenant = tenant(guild_id);
    if bot.panels.contains(tenant) {
        return;
    }
    let Some(snapshot) = bot.surface.snapshot(tenant).await else {
        return;
    };

    let view = PanelView::from(&snapshot);
    let message = CreateMessage::new()
        .embed(embeds::panel_embed(&view))
        .components(buttons::player_controls(view.state));

    match channel_id.send_message(&ctx.http, message).await {
        Ok(sent) => {
            let panel = PanelMessage {
                channel_id,
                message_id: sent.id,
            };
            // Otro /play pudo ganarnos la carrera: quedarse con uno solo
            if let Some(previous) = bot.panels.insert(tenant, panel) {
                let _ = previous
                    .channel_id
                    .delete_message(&ctx.http, previous.message_id)
                    .await;
            }
        }
        Err(e) => warn!("No se pudo publicar el panel en guild {}: {}", guild_id, e),
    }
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    guild_id
        .to_guild_cached(&ctx.cache)?
        .voice_states
        .get(&user_id)
        .and_then(|vs| vs.channel_id)
}

fn volume_message(volume: Volume) -> String {
    let icon = match volume.percent() {
        0 => "🔇",
        1..=50 => "🔈",
        51..=100 => "🔉",
        _ => "🔊",
    };
    format!("{} Volumen ajustado a {}", icon, volume)
}

/// Mensaje para el usuario ante un error de comando.
pub fn error_message(error: &CommandError) -> String {
    match error {
        CommandError::Resolution(ResolutionError::Unreachable(_)) => {
            "❌ No se pudo acceder a la fuente. Intenta de nuevo más tarde".to_string()
        }
        CommandError::Resolution(ResolutionError::NoAudioStream(_)) => {
            "❌ No se encontró audio reproducible para esa búsqueda".to_string()
        }
        CommandError::Resolution(ResolutionError::Malformed(input)) => {
            format!("❌ URL o búsqueda inválida: `{}`", input)
        }
        CommandError::Transport(TransportError::Connect(_)) => {
            "❌ No se pudo conectar al canal de voz".to_string()
        }
        CommandError::Transport(_) => "❌ Error en la reproducción de audio".to_string(),
        CommandError::State(StateError::NothingPlaying) => {
            "❌ No hay nada reproduciéndose actualmente".to_string()
        }
        CommandError::State(StateError::AlreadyPaused) => {
            "⏸️ La reproducción ya está pausada".to_string()
        }
        CommandError::State(StateError::AlreadyPlaying) => {
            "▶️ La reproducción no está pausada".to_string()
        }
        CommandError::State(StateError::NotConnected) => {
            "❌ No estoy conectado a un canal de voz".to_string()
        }
        CommandError::State(StateError::QueueFull { max }) => {
            format!("❌ La cola está llena (máximo {} canciones)", max)
        }
    }
}
