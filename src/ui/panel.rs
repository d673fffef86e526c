//! Panel de control por guild.
//!
//! El bot publica un mensaje con el estado actual y los botones; esta tarea lo
//! edita cada vez que el reproductor publica un [`PlayerUpdate`] y lo borra
//! cuando la sesión termina.

use dashmap::DashMap;
use serenity::{
    builder::EditMessage,
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::{buttons, embeds};
use crate::audio::{
    events::{PlayerUpdate, UpdateKind},
    session::{PlaybackState, SessionSnapshot, TenantId, Volume},
    track::Track,
};

/// Lo que el panel muestra, venga de un update o de un snapshot.
#[derive(Debug, Clone)]
pub struct PanelView {
    pub state: PlaybackState,
    pub now_playing: Option<Track>,
    pub queue_len: usize,
    pub volume: Volume,
}

impl From<&PlayerUpdate> for PanelView {
    fn from(update: &PlayerUpdate) -> Self {
        Self {
            state: update.state,
            now_playing: update.now_playing.clone(),
            queue_len: update.queue_len,
            volume: update.volume,
        }
    }
}

impl From<&SessionSnapshot> for PanelView {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            state: snapshot.state,
            now_playing: snapshot.now_playing.clone(),
            queue_len: snapshot.queue.len(),
            volume: snapshot.volume,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Mensajes de panel activos, uno por guild.
#[derive(Debug, Default)]
pub struct PanelRegistry {
    panels: DashMap<TenantId, PanelMessage>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant: TenantId) -> Option<PanelMessage> {
        self.panels.get(&tenant).map(|entry| *entry)
    }

    pub fn insert(&self, tenant: TenantId, panel: PanelMessage) -> Option<PanelMessage> {
        self.panels.insert(tenant, panel)
    }

    pub fn remove(&self, tenant: TenantId) -> Option<PanelMessage> {
        self.panels.remove(&tenant).map(|(_, panel)| panel)
    }

    pub fn contains(&self, tenant: TenantId) -> bool {
        self.panels.contains_key(&tenant)
    }
}

/// Qué hacer con el panel ante un update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelChange {
    Refresh,
    Remove,
}

pub fn change_for(kind: &UpdateKind) -> PanelChange {
    match kind {
        UpdateKind::Stopped => PanelChange::Remove,
        _ => PanelChange::Refresh,
    }
}

/// Consume updates hasta que el coordinador desaparece.
pub async fn render_updates(
    http: Arc<Http>,
    panels: Arc<PanelRegistry>,
    mut updates: broadcast::Receiver<PlayerUpdate>,
) {
    info!("🖼️ Renderizador de paneles iniciado");

    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(RecvError::Lagged(missed)) => {
                // El siguiente update trae el estado completo
                warn!("⚠️ Renderizador atrasado, {} updates descartados", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match change_for(&update.kind) {
            PanelChange::Remove => {
                if let Some(panel) = panels.remove(update.tenant) {
                    if let Err(e) = panel
                        .channel_id
                        .delete_message(&http, panel.message_id)
                        .await
                    {
                        debug!("No se pudo borrar el panel en guild {}: {}", update.tenant, e);
                    }
                }
            }
            PanelChange::Refresh => {
                let Some(panel) = panels.get(update.tenant) else {
                    continue;
                };
                let view = PanelView::from(&update);
                let edit = EditMessage::new()
                    .embed(embeds::panel_embed(&view))
                    .components(buttons::player_controls(view.state));

                if let Err(e) = panel
                    .channel_id
                    .edit_message(&http, panel.message_id, edit)
                    .await
                {
                    // Mensaje borrado a mano: se recrea en el próximo /play
                    warn!("Panel perdido en guild {}: {}", update.tenant, e);
                    panels.remove(update.tenant);
                }
            }
        }
    }

    info!("🖼️ Renderizador de paneles detenido");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_stop_removes_the_panel() {
        assert_eq!(change_for(&UpdateKind::Stopped), PanelChange::Remove);
        assert_eq!(change_for(&UpdateKind::QueueEmpty), PanelChange::Refresh);
        assert_eq!(
            change_for(&UpdateKind::Halted { dropped: 3 }),
            PanelChange::Refresh
        );
        assert_eq!(
            change_for(&UpdateKind::Retrying {
                delay: std::time::Duration::from_secs(1)
            }),
            PanelChange::Refresh
        );
    }

    #[test]
    fn registry_keeps_one_panel_per_guild() {
        let panels = PanelRegistry::new();
        let first = PanelMessage {
            channel_id: ChannelId::new(10),
            message_id: MessageId::new(100),
        };
        let second = PanelMessage {
            channel_id: ChannelId::new(10),
            message_id: MessageId::new(200),
        };

        assert_eq!(panels.insert(TenantId(1), first), None);
        assert_eq!(panels.insert(TenantId(1), second), Some(first));
        assert!(!panels.contains(TenantId(2)));
        assert_eq!(panels.remove(TenantId(1)), Some(second));
        assert_eq!(panels.get(TenantId(1)), None);
    }
}
