use serde::Serialize;
use std::time::Duration;

use super::{
    session::{PlaybackState, TenantId, TenantSession, Volume},
    track::Track,
};

/// Motivo del update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpdateKind {
    TrackStarted,
    QueueEmpty,
    Paused,
    Resumed,
    VolumeChanged,
    /// No suena nada; la siguiente canción arranca tras `delay`
    Retrying { delay: Duration },
    /// Demasiados fallos seguidos; se descartó el resto de la cola
    Halted { dropped: usize },
    Stopped,
}

/// Cambio de estado enviado a la capa de presentación.
///
/// Se publica en un canal broadcast; que nadie escuche o que un oyente se
/// atrase nunca afecta la reproducción.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerUpdate {
    pub tenant: TenantId,
    pub kind: UpdateKind,
    pub state: PlaybackState,
    pub now_playing: Option<Track>,
    pub queue_len: usize,
    pub volume: Volume,
}

impl PlayerUpdate {
    pub(crate) fn from_session(session: &TenantSession, kind: UpdateKind) -> Self {
        Self {
            tenant: session.tenant(),
            kind,
            state: session.state(),
            now_playing: session.current().cloned(),
            queue_len: session.queue().len(),
            volume: session.volume(),
        }
    }
}
