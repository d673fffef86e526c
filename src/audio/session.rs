use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::VecDeque, fmt, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{track::Track, transport::VoiceLink};

/// Identifica un contexto de reproducción independiente (un guild de Discord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canal de voz al que puede unirse el transporte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelRef(pub u64);

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifica un `start` entregado al transporte. Los avisos de fin lo
/// devuelven para distinguir los atrasados del vigente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(pub u64);

/// Multiplicador de volumen, siempre dentro de `[0.0, 2.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Volume(f32);

impl Volume {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 2.0;
    /// Paso de los botones de volumen.
    pub const STEP: f32 = 0.1;

    /// Construye un volumen recortado al rango. NaN es silencio.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(Self::MIN);
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    /// Desde un porcentaje entero (0–200), recortado.
    pub fn from_percent(percent: i64) -> Self {
        let clamped = percent.clamp(0, 200);
        Self(clamped as f32 / 100.0)
    }

    pub fn get(self) -> f32 {
        self.0
    }

    pub fn percent(self) -> u32 {
        (self.0 * 100.0).round() as u32
    }

    pub fn offset(self, delta: f32) -> Self {
        Self::new(self.0 + delta)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Avance diferido que espera tras un arranque fallido.
#[derive(Debug)]
pub struct PendingRetry {
    pub id: u64,
    pub token: CancellationToken,
}

/// Cuenta de fallos seguidos para el cortacircuitos.
#[derive(Debug, Default, Clone)]
pub struct FailureTracker {
    consecutive: u32,
    last_failure_at: Option<DateTime<Utc>>,
}

impl FailureTracker {
    /// Registra un fallo y devuelve la nueva cuenta de fallos seguidos.
    pub fn record(&mut self) -> u32 {
        self.consecutive = self.consecutive.saturating_add(1);
        self.last_failure_at = Some(Utc::now());
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.last_failure_at
    }
}

/// Lo que devolvió una sesión liberada.
pub struct Teardown {
    pub link: Option<Arc<dyn VoiceLink>>,
    pub had_current: bool,
    pub cleared: usize,
    pub volume: Volume,
}

/// Estado mutable de reproducción de un guild.
///
/// Solo se toca con el mutex de la sesión tomado; así el registro serializa
/// comandos, avisos de fin y reintentos de un guild.
pub struct TenantSession {
    tenant: TenantId,
    pub(crate) queue: VecDeque<Track>,
    pub(crate) current: Option<Track>,
    pub(crate) volume: Volume,
    pub(crate) link: Option<Arc<dyn VoiceLink>>,
    pub(crate) paused: bool,
    pub(crate) playback: Option<PlaybackId>,
    pub(crate) retry: Option<PendingRetry>,
    pub(crate) failures: FailureTracker,
    max_queue_size: usize,
    closed: bool,
}

impl TenantSession {
    pub fn new(tenant: TenantId, volume: Volume, max_queue_size: usize) -> Self {
        Self {
            tenant,
            queue: VecDeque::new(),
            current: None,
            volume,
            link: None,
            paused: false,
            playback: None,
            retry: None,
            failures: FailureTracker::default(),
            max_queue_size,
            closed: false,
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn state(&self) -> PlaybackState {
        match (&self.current, self.paused) {
            (None, _) => PlaybackState::Idle,
            (Some(_), true) => PlaybackState::Paused,
            (Some(_), false) => PlaybackState::Playing,
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &VecDeque<Track> {
        &self.queue
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn channel(&self) -> Option<ChannelRef> {
        self.link.as_ref().map(|link| link.channel())
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn has_pending_retry(&self) -> bool {
        self.retry.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Suelta la canción actual y el reintento pendiente; el estado pasa a Idle.
    pub(crate) fn clear_playback(&mut self) {
        self.cancel_retry();
        self.current = None;
        self.playback = None;
        self.paused = false;
    }

    /// True si la sesión no guarda nada que valga la pena conservar.
    pub(crate) fn is_blank(&self, default_volume: Volume) -> bool {
        self.link.is_none()
            && self.current.is_none()
            && self.queue.is_empty()
            && self.retry.is_none()
            && self.volume == default_volume
    }

    /// Cancela el reintento pendiente, si lo hay.
    pub(crate) fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.token.cancel();
        }
    }

    /// Marca la sesión como cerrada y le quita todo lo que tiene. Devuelve el
    /// enlace de voz para liberarlo fuera del estado de la sesión.
    pub(crate) fn teardown(&mut self) -> Teardown {
        self.closed = true;
        self.cancel_retry();

        let cleared = self.queue.len();
        self.queue.clear();
        let had_current = self.current.take().is_some();
        self.playback = None;
        self.paused = false;

        debug!(
            "🧹 Sesión {} cerrada ({} tracks descartados)",
            self.tenant, cleared
        );

        Teardown {
            link: self.link.take(),
            had_current,
            cleared,
            volume: self.volume,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tenant: self.tenant,
            state: self.state(),
            now_playing: self.current.clone(),
            queue: self.queue.iter().cloned().collect(),
            volume: self.volume,
            connected: self.link.is_some(),
        }
    }
}

/// Copia consistente de solo lectura de una sesión, para mostrar y consultar.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub tenant: TenantId,
    pub state: PlaybackState,
    pub now_playing: Option<Track>,
    pub queue: Vec<Track>,
    pub volume: Volume,
    pub connected: bool,
}

impl SessionSnapshot {
    /// Suma de las duraciones conocidas, incluida la canción actual.
    pub fn total_duration(&self) -> std::time::Duration {
        self.now_playing
            .iter()
            .chain(self.queue.iter())
            .filter_map(|t| t.duration())
            .sum()
    }
}
