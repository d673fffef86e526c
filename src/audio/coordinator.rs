use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    events::{PlayerUpdate, UpdateKind},
    registry::SessionRegistry,
    session::{
        ChannelRef, PendingRetry, PlaybackId, PlaybackState, SessionSnapshot, Teardown, TenantId,
        TenantSession, Volume,
    },
    track::Track,
    transport::{AudioTransport, Completion, CompletionNotifier},
};
use crate::error::{CommandResult, StateError};

/// Parámetros de la máquina de estados de reproducción.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub default_volume: Volume,
    pub max_queue_size: usize,
    /// Espera antes de pasar de una canción que el transporte rechazó
    pub retry_delay: Duration,
    /// Tope para la espera, que se duplica en cada fallo
    pub max_retry_delay: Duration,
    /// Fallos seguidos tras los que se descarta la cola del guild
    pub max_consecutive_failures: u32,
    pub update_buffer: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: Volume::default(),
            max_queue_size: 1000,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(8),
            max_consecutive_failures: 5,
            update_buffer: 64,
        }
    }
}

impl PlayerSettings {
    /// Espera antes de reintentar tras el n-ésimo fallo seguido.
    pub fn retry_delay_for(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(16);
        self.retry_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_retry_delay)
    }
}

/// Resultado de agregar una canción.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueReceipt {
    pub track: Track,
    /// Posición (desde 1) entre las próximas canciones
    pub position: usize,
    /// Si la reproducción arrancó con esta misma canción
    pub started: bool,
}

/// Resultado de un stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    pub cleared: usize,
    pub was_playing: bool,
}

#[derive(Debug)]
enum AdvanceOutcome {
    Started(Track),
    Idle,
    Retrying,
    Halted,
}

/// Coordina la reproducción de todos los guilds.
///
/// Cada guild pasa entre `Idle`, `Playing` y `Paused`. Todas las transiciones
/// de un guild ocurren con el lock de su sesión tomado; los avisos de fin del
/// transporte vuelven por un canal y toman el mismo lock, así que se
/// serializan con los comandos del usuario.
///
/// Clonar es barato y todos los clones manejan las mismas sesiones. Hay que
/// crearlo dentro de un runtime de Tokio.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: SessionRegistry,
    transport: Arc<dyn AudioTransport>,
    settings: PlayerSettings,
    updates: broadcast::Sender<PlayerUpdate>,
    completions: mpsc::UnboundedSender<Completion>,
    next_id: AtomicU64,
}

impl PlaybackCoordinator {
    pub fn new(transport: Arc<dyn AudioTransport>, settings: PlayerSettings) -> Self {
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(settings.update_buffer.max(1));

        let inner = Arc::new(Inner {
            registry: SessionRegistry::new(settings.default_volume, settings.max_queue_size),
            transport,
            settings,
            updates,
            completions,
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(completion_pump(Arc::downgrade(&inner), completion_rx));

        Self { inner }
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Recibe cada [`PlayerUpdate`] publicado desde ahora.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerUpdate> {
        self.inner.updates.subscribe()
    }

    /// Asocia el guild a un canal de voz, uniéndose o moviéndose según haga falta.
    /// Lo encolado mientras no había conexión empieza a sonar enseguida.
    pub async fn connect(&self, tenant: TenantId, channel: ChannelRef) -> CommandResult<()> {
        let mut session = self.inner.registry.lock_or_create(tenant).await;

        match session.link.clone() {
            Some(link) if link.channel() == channel => {}
            Some(link) => {
                link.move_to(channel).await?;
                info!("🔀 Movido al canal de voz {} en guild {}", channel, tenant);
            }
            None => {
                let link = match self.inner.transport.connect(tenant, channel).await {
                    Ok(link) => link,
                    Err(e) => {
                        let blank = session.is_blank(self.inner.settings.default_volume);
                        drop(session);
                        if blank {
                            self.inner.registry.discard_if_blank(tenant).await;
                        }
                        return Err(e.into());
                    }
                };
                session.link = Some(link);
                info!("🔊 Conectado al canal de voz {} en guild {}", channel, tenant);
            }
        }

        if session.state() == PlaybackState::Idle
            && !session.queue.is_empty()
            && !session.has_pending_retry()
        {
            self.advance_locked(&mut session).await;
        }

        Ok(())
    }

    /// Agrega una canción al final. Arranca enseguida si el guild está libre
    /// y conectado; si no, espera su turno.
    pub async fn enqueue(&self, tenant: TenantId, track: Track) -> CommandResult<EnqueueReceipt> {
        let mut session = self.inner.registry.lock_or_create(tenant).await;

        if session.queue.len() >= session.max_queue_size() {
            return Err(StateError::QueueFull {
                max: session.max_queue_size(),
            }
            .into());
        }

        session.queue.push_back(track.clone());
        let position = session.queue.len();
        info!(
            "➕ Agregado a la cola: '{}' en guild {} (#{})",
            track.title(),
            tenant,
            position
        );

        let mut started = false;
        if session.state() == PlaybackState::Idle
            && session.is_connected()
            && !session.has_pending_retry()
        {
            let outcome = self.advance_locked(&mut session).await;
            started = position == 1 && matches!(outcome, AdvanceOutcome::Started(_));
        }

        Ok(EnqueueReceipt {
            track,
            position,
            started,
        })
    }

    /// Detiene la canción actual. La cola avanza con el aviso de fin del
    /// transporte, nunca desde aquí.
    pub async fn skip(&self, tenant: TenantId) -> CommandResult<Track> {
        let session = self
            .inner
            .registry
            .lock(tenant)
            .await
            .ok_or(StateError::NothingPlaying)?;

        let current = session.current.clone().ok_or(StateError::NothingPlaying)?;
        let link = session.link.clone().ok_or(StateError::NotConnected)?;

        link.stop_current()?;
        info!("⏭️ Saltando '{}' en guild {}", current.title(), tenant);

        Ok(current)
    }

    pub async fn toggle_pause(&self, tenant: TenantId) -> CommandResult<PlaybackState> {
        let mut session = self
            .inner
            .registry
            .lock(tenant)
            .await
            .ok_or(StateError::NothingPlaying)?;

        match session.state() {
            PlaybackState::Idle => Err(StateError::NothingPlaying.into()),
            PlaybackState::Playing => {
                self.pause_locked(&mut session)?;
                Ok(PlaybackState::Paused)
            }
            PlaybackState::Paused => {
                self.resume_locked(&mut session)?;
                Ok(PlaybackState::Playing)
            }
        }
    }

    pub async fn pause(&self, tenant: TenantId) -> CommandResult<()> {
        let mut session = self
            .inner
            .registry
            .lock(tenant)
            .await
            .ok_or(StateError::NothingPlaying)?;

        match session.state() {
            PlaybackState::Idle => Err(StateError::NothingPlaying.into()),
            PlaybackState::Paused => Err(StateError::AlreadyPaused.into()),
            PlaybackState::Playing => self.pause_locked(&mut session),
        }
    }

    pub async fn resume(&self, tenant: TenantId) -> CommandResult<()> {
        let mut session = self
            .inner
            .registry
            .lock(tenant)
            .await
            .ok_or(StateError::NothingPlaying)?;

        match session.state() {
            PlaybackState::Idle => Err(StateError::NothingPlaying.into()),
            PlaybackState::Playing => Err(StateError::AlreadyPlaying.into()),
            PlaybackState::Paused => self.resume_locked(&mut session),
        }
    }

    /// Guarda el volumen y lo aplica a la canción en curso sin reiniciarla.
    /// [`Volume`] ya recortó los valores fuera de rango.
    pub async fn set_volume(&self, tenant: TenantId, volume: Volume) -> CommandResult<Volume> {
        let mut session = self.inner.registry.lock_or_create(tenant).await;
        self.apply_volume(&mut session, volume)
    }

    /// Desplaza el volumen en `delta` (p. ej. `±0.1` desde los botones del panel).
    pub async fn adjust_volume(&self, tenant: TenantId, delta: f32) -> CommandResult<Volume> {
        let mut session = self.inner.registry.lock_or_create(tenant).await;
        let volume = session.volume.offset(delta);
        self.apply_volume(&mut session, volume)
    }

    /// Vacía la cola, desconecta y olvida el guild.
    pub async fn stop(&self, tenant: TenantId) -> CommandResult<StopSummary> {
        {
            let session = self
                .inner
                .registry
                .lock(tenant)
                .await
                .ok_or(StateError::NotConnected)?;
            if !session.is_connected() {
                return Err(StateError::NotConnected.into());
            }
        }

        let teardown = self
            .inner
            .registry
            .remove(tenant)
            .await
            .ok_or(StateError::NotConnected)?;

        let summary = self.release(tenant, teardown, true).await;
        info!(
            "⏹️ Reproducción detenida en guild {} ({} tracks eliminados de la cola)",
            tenant, summary.cleared
        );
        Ok(summary)
    }

    /// El gateway de voz nos sacó de `from`: libera el guild sin pedirle al
    /// transporte que se desconecte otra vez.
    pub async fn disconnected(&self, tenant: TenantId, from: ChannelRef) -> Option<StopSummary> {
        // Un aviso atrasado (tras /stop y un nuevo /play) no debe tocar la sesión nueva
        let Some(teardown) = self
            .inner
            .registry
            .remove_where(tenant, |session| session.channel() == Some(from))
            .await
        else {
            debug!("Salida de {} en guild {} ignorada: no es el canal actual", from, tenant);
            return None;
        };
        let summary = self.release(tenant, teardown, false).await;
        info!("🔌 Guild {} desconectado, sesión eliminada", tenant);
        Some(summary)
    }

    pub async fn snapshot(&self, tenant: TenantId) -> Option<SessionSnapshot> {
        let session = self.inner.registry.lock(tenant).await?;
        Some(session.snapshot())
    }

    pub async fn queue(&self, tenant: TenantId) -> Vec<Track> {
        match self.inner.registry.lock(tenant).await {
            Some(session) => session.queue.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn now_playing(&self, tenant: TenantId) -> Option<Track> {
        self.inner.registry.lock(tenant).await?.current.clone()
    }

    pub async fn state(&self, tenant: TenantId) -> PlaybackState {
        match self.inner.registry.lock(tenant).await {
            Some(session) => session.state(),
            None => PlaybackState::Idle,
        }
    }

    // Transiciones. Todo lo de abajo corre con el lock de la sesión tomado.

    /// Saca la siguiente canción y la arranca, o queda en espera si la cola está vacía.
    async fn advance_locked(&self, session: &mut TenantSession) -> AdvanceOutcome {
        session.clear_playback();

        let tenant = session.tenant();

        let Some(link) = session.link.clone() else {
            debug!("Sin conexión de voz en guild {}, se queda en espera", tenant);
            return AdvanceOutcome::Idle;
        };

        let Some(track) = session.queue.pop_front() else {
            info!("📭 Cola vacía en guild {}", tenant);
            self.publish(session, UpdateKind::QueueEmpty);
            return AdvanceOutcome::Idle;
        };

        let playback = PlaybackId(self.next_id());
        let done = CompletionNotifier::new(tenant, playback, self.inner.completions.clone());
        session.current = Some(track.clone());
        session.playback = Some(playback);

        match link.start(track.stream_url(), session.volume, done).await {
            Ok(()) => {
                info!("🎵 Reproduciendo en guild {}: {}", tenant, track.title());
                self.publish(session, UpdateKind::TrackStarted);
                AdvanceOutcome::Started(track)
            }
            Err(e) => {
                warn!(
                    "❌ No se pudo iniciar '{}' en guild {}: {}",
                    track.title(),
                    tenant,
                    e
                );
                session.current = None;
                session.playback = None;
                self.after_failure(session)
            }
        }
    }

    /// Decide qué sigue tras una canción fallida: reintentar, esperar o cortar.
    fn after_failure(&self, session: &mut TenantSession) -> AdvanceOutcome {
        let failures = session.failures.record();

        if failures >= self.inner.settings.max_consecutive_failures {
            self.halt(session, failures);
            return AdvanceOutcome::Halted;
        }

        if session.queue.is_empty() {
            info!("📭 Cola vacía en guild {} tras un track fallido", session.tenant());
            self.publish(session, UpdateKind::QueueEmpty);
            return AdvanceOutcome::Idle;
        }

        let delay = self.schedule_retry(session, failures);
        self.publish(session, UpdateKind::Retrying { delay });
        AdvanceOutcome::Retrying
    }

    /// Cortacircuitos: fallaron todas las canciones recientes, así que se
    /// descarta el resto de la cola en vez de recorrerla.
    fn halt(&self, session: &mut TenantSession, failures: u32) {
        session.clear_playback();

        let dropped = session.queue.len();
        session.queue.clear();
        session.failures.reset();

        error!(
            "🚨 {} fallos consecutivos en guild {}, se descartan {} tracks de la cola",
            failures,
            session.tenant(),
            dropped
        );
        self.publish(session, UpdateKind::Halted { dropped });
    }

    fn schedule_retry(&self, session: &mut TenantSession, failures: u32) -> Duration {
        let delay = self.inner.settings.retry_delay_for(failures);
        let id = self.next_id();
        let token = CancellationToken::new();
        let tenant = session.tenant();

        session.retry = Some(PendingRetry {
            id,
            token: token.clone(),
        });
        info!("⏳ Siguiente track en guild {} dentro de {:?}", tenant, delay);

        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Reintento {} para guild {} cancelado", id, tenant);
                }
                _ = tokio::time::sleep(delay) => {
                    coordinator.retry_advance(tenant, id).await;
                }
            }
        });

        delay
    }

    async fn retry_advance(&self, tenant: TenantId, retry_id: u64) {
        let Some(mut session) = self.inner.registry.lock(tenant).await else {
            debug!("Reintento para guild {} descartado: la sesión ya no existe", tenant);
            return;
        };

        if session.retry.as_ref().map(|r| r.id) != Some(retry_id) {
            debug!("Reintento {} para guild {} obsoleto", retry_id, tenant);
            return;
        }
        session.retry = None;

        if session.state() == PlaybackState::Idle {
            self.advance_locked(&mut session).await;
        }
    }

    /// Procesa el aviso de fin de canción del transporte.
    async fn on_complete(&self, completion: Completion) {
        let Completion {
            tenant,
            playback,
            error,
        } = completion;

        // Nunca crear sesión aquí: un aviso de un guild detenido no debe revivirlo
        let Some(mut session) = self.inner.registry.lock(tenant).await else {
            debug!("🪦 Fin de track para guild {} ignorado: la sesión ya no existe", tenant);
            return;
        };

        if session.playback != Some(playback) {
            debug!(
                "Fin de track obsoleto {:?} para guild {} ignorado",
                playback, tenant
            );
            return;
        }

        match error {
            Some(error) => {
                // Un stream muerto cuenta igual que un arranque rechazado
                warn!("⚠️ Falló la reproducción en guild {}: {}", tenant, error);
                session.clear_playback();
                self.after_failure(&mut session);
                return;
            }
            None => session.failures.reset(),
        }

        self.advance_locked(&mut session).await;
    }

    fn pause_locked(&self, session: &mut TenantSession) -> CommandResult<()> {
        let link = session.link.clone().ok_or(StateError::NotConnected)?;
        link.pause()?;
        session.paused = true;
        info!("⏸️ Reproducción pausada en guild {}", session.tenant());
        self.publish(session, UpdateKind::Paused);
        Ok(())
    }

    fn resume_locked(&self, session: &mut TenantSession) -> CommandResult<()> {
        let link = session.link.clone().ok_or(StateError::NotConnected)?;
        link.resume()?;
        session.paused = false;
        info!("▶️ Reproducción reanudada en guild {}", session.tenant());
        self.publish(session, UpdateKind::Resumed);
        Ok(())
    }

    fn apply_volume(&self, session: &mut TenantSession, volume: Volume) -> CommandResult<Volume> {
        if session.current.is_some() {
            if let Some(link) = &session.link {
                link.set_volume(volume)?;
            }
        }

        session.volume = volume;
        info!("🔊 Volumen ajustado a {} en guild {}", volume, session.tenant());
        self.publish(session, UpdateKind::VolumeChanged);
        Ok(volume)
    }

    async fn release(&self, tenant: TenantId, teardown: Teardown, disconnect: bool) -> StopSummary {
        if let Some(link) = teardown.link {
            if teardown.had_current {
                if let Err(e) = link.stop_current() {
                    warn!("No se pudo detener la reproducción en guild {}: {}", tenant, e);
                }
            }
            if disconnect {
                if let Err(e) = link.disconnect().await {
                    warn!("No se pudo desconectar guild {}: {}", tenant, e);
                }
            }
        }

        let _ = self.inner.updates.send(PlayerUpdate {
            tenant,
            kind: UpdateKind::Stopped,
            state: PlaybackState::Idle,
            now_playing: None,
            queue_len: 0,
            volume: teardown.volume,
        });

        StopSummary {
            cleared: teardown.cleared,
            was_playing: teardown.had_current,
        }
    }

    fn publish(&self, session: &TenantSession, kind: UpdateKind) {
        // Sin suscriptores no pasa nada: el panel es opcional
        let _ = self
            .inner
            .updates
            .send(PlayerUpdate::from_session(session, kind));
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Lleva los avisos de fin desde el contexto del transporte al coordinador.
/// Una tarea por aviso: un guild con el lock ocupado no frena a los demás.
async fn completion_pump(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<Completion>) {
    while let Some(completion) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let coordinator = PlaybackCoordinator { inner };
        tokio::spawn(async move {
            coordinator.on_complete(completion).await;
        });
    }
    debug!("Canal de fin de track cerrado");
}
