//! [`AudioTransport`] sobre Songbird.
//!
//! Cada canción arrancada registra un [`TrackCompletion`] para los eventos de
//! fin y de error; el primero que llega consume el notificador.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::ControlError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{num::NonZeroU64, sync::Arc};
use tracing::{debug, info};

use super::{
    session::{ChannelRef, TenantId, Volume},
    transport::{AudioTransport, CompletionNotifier, VoiceLink},
};
use crate::error::TransportError;

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

fn guild_id(tenant: TenantId) -> Result<GuildId, TransportError> {
    NonZeroU64::new(tenant.0)
        .map(|id| GuildId::from(id.get()))
        .ok_or_else(|| TransportError::Connect(format!("invalid guild id {}", tenant)))
}

fn channel_id(channel: ChannelRef) -> Result<ChannelId, TransportError> {
    NonZeroU64::new(channel.0)
        .map(|id| ChannelId::from(id.get()))
        .ok_or_else(|| TransportError::Connect(format!("invalid channel id {}", channel)))
}

/// La pista arranca ya con el volumen de la sesión, sin un primer tramo a volumen por defecto.
fn track_at_volume(input: Input, volume: Volume) -> Track {
    Track::from(input).volume(volume.get())
}

#[async_trait]
impl AudioTransport for SongbirdTransport {
    async fn connect(
        &self,
        tenant: TenantId,
        channel: ChannelRef,
    ) -> Result<Arc<dyn VoiceLink>, TransportError> {
        let guild = guild_id(tenant)?;
        let call = self
            .manager
            .join(guild, channel_id(channel)?)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!("🔗 Call establecida para guild {}", tenant);

        Ok(Arc::new(SongbirdLink {
            guild,
            channel: Mutex::new(channel),
            call,
            manager: self.manager.clone(),
            http: self.http.clone(),
            current: Mutex::new(None),
        }))
    }
}

pub struct SongbirdLink {
    guild: GuildId,
    channel: Mutex<ChannelRef>,
    call: Arc<tokio::sync::Mutex<Call>>,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdLink {
    fn with_current<F>(&self, action: F) -> Result<(), TransportError>
    where
        F: FnOnce(&TrackHandle) -> songbird::tracks::TrackResult<()>,
    {
        let current = self.current.lock();
        let handle = current
            .as_ref()
            .ok_or_else(|| TransportError::Control("no track loaded".to_string()))?;
        action(handle).map_err(|e| TransportError::Control(e.to_string()))
    }
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    fn channel(&self) -> ChannelRef {
        *self.channel.lock()
    }

    async fn move_to(&self, channel: ChannelRef) -> Result<(), TransportError> {
        // Songbird mueve la llamada existente si ya hay una para el guild
        self.manager
            .join(self.guild, channel_id(channel)?)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        *self.channel.lock() = channel;
        Ok(())
    }

    async fn start(
        &self,
        stream_url: &str,
        volume: Volume,
        done: CompletionNotifier,
    ) -> Result<(), TransportError> {
        let parsed = url::Url::parse(stream_url)
            .map_err(|e| TransportError::Start(format!("{}: {}", stream_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::Start(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();
        let handle = {
            let mut call = self.call.lock().await;
            call.play(track_at_volume(input, volume))
        };

        let completion = TrackCompletion {
            done: Arc::new(Mutex::new(Some(done))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), completion.clone()) {
                // Sin handler nunca sabríamos que terminó: abortar sin notificar
                completion.done.lock().take();
                let _ = handle.stop();
                return Err(TransportError::Start(e.to_string()));
            }
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    fn pause(&self) -> Result<(), TransportError> {
        self.with_current(|h| h.pause())
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.with_current(|h| h.play())
    }

    fn set_volume(&self, volume: Volume) -> Result<(), TransportError> {
        self.with_current(|h| h.set_volume(volume.get()))
    }

    fn stop_current(&self) -> Result<(), TransportError> {
        match self.current.lock().take() {
            Some(handle) => match handle.stop() {
                // Ya terminó por su cuenta; su handler ya notificó
                Ok(()) | Err(ControlError::Finished) => Ok(()),
                Err(e) => Err(TransportError::Control(e.to_string())),
            },
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.current.lock().take();
        self.manager
            .remove(self.guild)
            .await
            .map_err(|e| TransportError::Control(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild);
        Ok(())
    }
}

/// Handler para cuando termina (o falla) una canción.
#[derive(Clone)]
struct TrackCompletion {
    done: Arc<Mutex<Option<CompletionNotifier>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackCompletion {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| {
                match &state.playing {
                    PlayMode::Errored(e) => Some(format!("{:?}", e)),
                    _ => None,
                }
            }),
            _ => None,
        };

        let done = self.done.lock().take();
        if let Some(done) = done {
            debug!(
                "Track {:?} terminado en guild {}",
                done.playback(),
                done.tenant()
            );
            done.notify(error);
        }

        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_start_at_the_session_volume() {
        let input: Input =
            HttpRequest::new(reqwest::Client::new(), "https://cdn.example/1".to_string()).into();
        let track = track_at_volume(input, Volume::from_percent(35));

        assert!((track.volume - 0.35).abs() < f32::EPSILON);
    }
}
