//! Frontera entre el coordinador y lo que realmente emite el audio.
//!
//! Un transporte entrega un [`VoiceLink`] por guild. Cada [`VoiceLink::start`]
//! exitoso recibe un [`CompletionNotifier`] que el transporte dispara una vez
//! cuando esa canción termina, sea por lo que sea. Dispararlo lo consume, así
//! que un segundo aviso para el mismo arranque no se puede expresar.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::session::{ChannelRef, PlaybackId, TenantId, Volume};
use crate::error::TransportError;

/// Aviso de que terminó una canción arrancada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub tenant: TenantId,
    pub playback: PlaybackId,
    /// `None` en un fin limpio (natural o stop), `Some` si falló la reproducción
    pub error: Option<String>,
}

/// Aviso de fin de un solo uso que recibe el transporte con cada arranque.
#[derive(Debug)]
pub struct CompletionNotifier {
    tenant: TenantId,
    playback: PlaybackId,
    tx: UnboundedSender<Completion>,
}

impl CompletionNotifier {
    pub(crate) fn new(tenant: TenantId, playback: PlaybackId, tx: UnboundedSender<Completion>) -> Self {
        Self { tenant, playback, tx }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn playback(&self) -> PlaybackId {
        self.playback
    }

    /// Informa el fin de la reproducción. Se puede llamar desde cualquier
    /// hilo; si el coordinador ya no existe el aviso se pierde.
    pub fn notify(self, error: Option<String>) {
        let _ = self.tx.send(Completion {
            tenant: self.tenant,
            playback: self.playback,
            error,
        });
    }
}

/// Abre conexiones de voz.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Se une a `channel` para `tenant` y devuelve el enlace para reproducir.
    async fn connect(
        &self,
        tenant: TenantId,
        channel: ChannelRef,
    ) -> Result<Arc<dyn VoiceLink>, TransportError>;
}

/// Conexión de voz viva de un guild.
///
/// Los métodos de control son peticiones: vuelven en cuanto el transporte
/// las recibe, y el resultado de la reproducción llega por el notificador.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    fn channel(&self) -> ChannelRef;

    /// Mueve la conexión a otro canal del mismo guild.
    async fn move_to(&self, channel: ChannelRef) -> Result<(), TransportError>;

    /// Empieza a emitir `stream_url`. Si devuelve `Err`, el notificador se
    /// suelta sin dispararse.
    async fn start(
        &self,
        stream_url: &str,
        volume: Volume,
        done: CompletionNotifier,
    ) -> Result<(), TransportError>;

    fn pause(&self) -> Result<(), TransportError>;

    fn resume(&self) -> Result<(), TransportError>;

    fn set_volume(&self, volume: Volume) -> Result<(), TransportError>;

    /// Detiene la canción actual; su notificador se dispara como fin limpio.
    fn stop_current(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
