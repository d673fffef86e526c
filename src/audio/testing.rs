//! Transporte en memoria para los tests de reproducción.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use super::{
    session::{ChannelRef, TenantId, Volume},
    transport::{AudioTransport, CompletionNotifier, VoiceLink},
};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect(TenantId, ChannelRef),
    Move(TenantId, ChannelRef),
    Start(TenantId, String),
    Refused(TenantId, String),
    Pause(TenantId),
    Resume(TenantId),
    SetVolume(TenantId, Volume),
    Stop(TenantId),
    Disconnect(TenantId),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<TransportCall>,
    active: HashMap<TenantId, CompletionNotifier>,
    failing_urls: HashSet<String>,
    refuse_connect: bool,
}

/// Registra cada petición y guarda el notificador vivo de cada guild para que
/// los tests terminen canciones cuando quieran.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hace que `start` rechace esta URL de stream.
    pub fn fail_url(&self, url: &str) {
        self.state.lock().failing_urls.insert(url.to_string());
    }

    pub fn refuse_connect(&self) {
        self.state.lock().refuse_connect = true;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// URLs de stream aceptadas para `tenant`, en orden de arranque.
    pub fn started(&self, tenant: TenantId) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Start(t, url) if *t == tenant => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &TransportCall) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| *call == wanted)
            .count()
    }

    /// Termina la canción en curso con normalidad. False si no sonaba nada.
    pub fn finish(&self, tenant: TenantId) -> bool {
        match self.take_notifier(tenant) {
            Some(done) => {
                done.notify(None);
                true
            }
            None => false,
        }
    }

    /// Termina la canción en curso con un error de reproducción.
    pub fn break_playback(&self, tenant: TenantId, reason: &str) -> bool {
        match self.take_notifier(tenant) {
            Some(done) => {
                done.notify(Some(reason.to_string()));
                true
            }
            None => false,
        }
    }

    /// Toma el notificador vivo para que el test decida cuándo (o si) se dispara.
    pub fn take_notifier(&self, tenant: TenantId) -> Option<CompletionNotifier> {
        self.state.lock().active.remove(&tenant)
    }

    pub fn is_active(&self, tenant: TenantId) -> bool {
        self.state.lock().active.contains_key(&tenant)
    }
}

#[async_trait]
impl AudioTransport for FakeTransport {
    async fn connect(
        &self,
        tenant: TenantId,
        channel: ChannelRef,
    ) -> Result<Arc<dyn VoiceLink>, TransportError> {
        let mut state = self.state.lock();
        if state.refuse_connect {
            return Err(TransportError::Connect(format!("channel {} unreachable", channel)));
        }
        state.calls.push(TransportCall::Connect(tenant, channel));

        Ok(Arc::new(FakeLink {
            tenant,
            channel: Mutex::new(channel),
            state: self.state.clone(),
        }))
    }
}

struct FakeLink {
    tenant: TenantId,
    channel: Mutex<ChannelRef>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeLink {
    fn record(&self, call: TransportCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl VoiceLink for FakeLink {
    fn channel(&self) -> ChannelRef {
        *self.channel.lock()
    }

    async fn move_to(&self, channel: ChannelRef) -> Result<(), TransportError> {
        *self.channel.lock() = channel;
        self.record(TransportCall::Move(self.tenant, channel));
        Ok(())
    }

    async fn start(
        &self,
        stream_url: &str,
        _volume: Volume,
        done: CompletionNotifier,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing_urls.contains(stream_url) {
            state
                .calls
                .push(TransportCall::Refused(self.tenant, stream_url.to_string()));
            return Err(TransportError::Start(format!("cannot open {}", stream_url)));
        }

        state
            .calls
            .push(TransportCall::Start(self.tenant, stream_url.to_string()));
        state.active.insert(self.tenant, done);
        Ok(())
    }

    fn pause(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Pause(self.tenant));
        Ok(())
    }

    fn resume(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Resume(self.tenant));
        Ok(())
    }

    fn set_volume(&self, volume: Volume) -> Result<(), TransportError> {
        self.record(TransportCall::SetVolume(self.tenant, volume));
        Ok(())
    }

    fn stop_current(&self) -> Result<(), TransportError> {
        let done = {
            let mut state = self.state.lock();
            state.calls.push(TransportCall::Stop(self.tenant));
            state.active.remove(&self.tenant)
        };
        if let Some(done) = done {
            done.notify(None);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect(self.tenant));
        Ok(())
    }
}
