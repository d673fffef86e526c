use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use super::panel::PanelView;
use crate::audio::{
    coordinator::EnqueueReceipt,
    session::{PlaybackState, SessionSnapshot},
    track::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

const UNKNOWN_AUTHOR: &str = "Autor desconocido";

/// Embed del panel de control: canción actual, reintento pendiente o cola vacía.
pub fn panel_embed(view: &PanelView) -> CreateEmbed {
    let Some(track) = &view.now_playing else {
        if view.queue_len > 0 {
            return CreateEmbed::default()
                .title("⏳ Preparando la siguiente canción")
                .description("La canción anterior falló, se reintentará en unos segundos.")
                .color(colors::WARNING_ORANGE)
                .field("📋 En cola", view.queue_len.to_string(), true)
                .field("🔊 Volumen", view.volume.to_string(), true)
                .timestamp(Timestamp::now())
                .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
        }
        return CreateEmbed::default()
            .title("📭 Cola vacía")
            .description("No hay nada reproduciéndose.\n\n💡 Usa `/play <url>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .field("🔊 Volumen", view.volume.to_string(), true)
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    };

    let (title, color) = match view.state {
        PlaybackState::Paused => ("⏸️ En pausa", colors::WARNING_ORANGE),
        _ => ("🎵 Reproduciendo Ahora", colors::SUCCESS_GREEN),
    };

    track_embed(track, title)
        .color(color)
        .field("🔊 Volumen", view.volume.to_string(), true)
        .field("📋 En cola", view.queue_len.to_string(), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Respuesta a `/play`.
pub fn enqueued_embed(receipt: &EnqueueReceipt) -> CreateEmbed {
    if receipt.started {
        return track_embed(&receipt.track, "▶️ Comenzando reproducción")
            .color(colors::SUCCESS_GREEN)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    track_embed(
        &receipt.track,
        &format!("✅ Agregado a la cola (#{})", receipt.position),
    )
    .color(colors::INFO_BLUE)
    .footer(CreateEmbedFooter::new(
        "🎵 Se reproducirá automáticamente cuando le toque",
    ))
}

/// Listado de `/queue`. Un guild sin sesión se muestra como cola vacía.
pub fn queue_embed(snapshot: Option<&SessionSnapshot>, page_size: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    let Some(snapshot) = snapshot.filter(|s| s.now_playing.is_some() || !s.queue.is_empty())
    else {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <url>` para agregar música")
            .color(colors::NEUTRAL_GRAY);
    };

    let mut embed = embed;
    if let Some(current) = &snapshot.now_playing {
        let status = match snapshot.state {
            PlaybackState::Paused => "⏸️ En pausa",
            _ => "▶️ Reproduciendo",
        };
        embed = embed.field(status, track_line(current), false);
    }

    if !snapshot.queue.is_empty() {
        embed = embed.field(
            "Próximas canciones",
            queue_listing(&snapshot.queue, page_size),
            false,
        );
    }

    let mut info = format!("**Total:** {} canciones", snapshot.queue.len());
    let total = snapshot.total_duration();
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }
    info.push_str(&format!(" • 🔊 {}", snapshot.volume));

    embed.field("Información", info, false)
}

/// Crea un embed de error
pub fn error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn track_embed(track: &Track, title: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("[{}]({})", track.title(), track.source_url()))
        .field(
            "🎤 Autor",
            track.uploader().unwrap_or(UNKNOWN_AUTHOR),
            true,
        );

    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 Desconocida", true),
    };

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed.timestamp(Timestamp::now())
}

fn track_line(track: &Track) -> String {
    let duration = track
        .duration()
        .map(|d| format!(" `[{}]`", format_duration(d)))
        .unwrap_or_default();
    format!("**{}**{}", track.title(), duration)
}

/// Primeras `page_size` canciones numeradas, más un resumen del resto.
pub fn queue_listing(queue: &[Track], page_size: usize) -> String {
    let mut listing: String = queue
        .iter()
        .take(page_size)
        .enumerate()
        .map(|(i, track)| format!("**{}**. {}\n", i + 1, track_line(track)))
        .collect();

    if queue.len() > page_size {
        listing.push_str(&format!("… y {} canciones más", queue.len() - page_size));
    }

    listing
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::{TenantId, Volume};
    use pretty_assertions::assert_eq;

    fn track(n: usize) -> Track {
        Track::new(
            format!("song {}", n),
            format!("https://youtu.be/{}", n),
            format!("https://cdn.example/{}", n),
        )
        .unwrap()
    }

    #[test]
    fn durations_are_clock_formatted() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(215)), "3:35");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn short_queue_lists_everything() {
        let queue: Vec<Track> = (1..=3).map(track).collect();
        let listing = queue_listing(&queue, 10);

        assert_eq!(listing, "**1**. **song 1**\n**2**. **song 2**\n**3**. **song 3**\n");
    }

    #[test]
    fn long_queue_is_cut_with_a_remainder() {
        let queue: Vec<Track> = (1..=14).map(track).collect();
        let listing = queue_listing(&queue, 10);

        assert_eq!(listing.lines().count(), 11);
        assert!(listing.contains("**10**. **song 10**"));
        assert!(!listing.contains("song 11"));
        assert!(listing.ends_with("… y 4 canciones más"));
    }

    #[test]
    fn empty_guild_renders_an_empty_queue() {
        let embed = serde_json::to_value(queue_embed(None, 10)).unwrap();
        assert!(embed["description"]
            .as_str()
            .unwrap()
            .contains("La cola está vacía"));

        let idle = SessionSnapshot {
            tenant: TenantId(1),
            state: PlaybackState::Idle,
            now_playing: None,
            queue: Vec::new(),
            volume: Volume::default(),
            connected: true,
        };
        let embed = serde_json::to_value(queue_embed(Some(&idle), 10)).unwrap();
        assert!(embed["description"].is_string());
    }

    #[test]
    fn idle_panel_says_the_queue_is_empty() {
        let view = PanelView {
            state: PlaybackState::Idle,
            now_playing: None,
            queue_len: 0,
            volume: Volume::default(),
        };
        let embed = serde_json::to_value(panel_embed(&view)).unwrap();
        assert_eq!(embed["title"], "📭 Cola vacía");
    }

    #[test]
    fn waiting_panel_is_not_an_empty_queue() {
        let view = PanelView {
            state: PlaybackState::Idle,
            now_playing: None,
            queue_len: 2,
            volume: Volume::default(),
        };
        let embed = serde_json::to_value(panel_embed(&view)).unwrap();
        assert_eq!(embed["title"], "⏳ Preparando la siguiente canción");
    }
}
