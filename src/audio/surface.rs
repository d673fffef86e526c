use std::sync::Arc;
use tracing::info;

use super::{
    coordinator::{EnqueueReceipt, PlaybackCoordinator, StopSummary},
    session::{ChannelRef, PlaybackState, SessionSnapshot, TenantId, Volume},
    track::Track,
};
use crate::{
    error::{CommandResult, ResolutionError},
    sources::MediaResolver,
};

/// Comandos de usuario, por guild.
///
/// Lo específico de Discord (interacciones, embeds, botones) vive en la capa
/// del bot, que llama a esto. La resolución ocurre aquí antes de tocar
/// ninguna sesión, así un extractor lento nunca frena la reproducción.
#[derive(Clone)]
pub struct CommandSurface {
    resolver: Arc<dyn MediaResolver>,
    coordinator: PlaybackCoordinator,
}

impl CommandSurface {
    pub fn new(resolver: Arc<dyn MediaResolver>, coordinator: PlaybackCoordinator) -> Self {
        Self {
            resolver,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator {
        &self.coordinator
    }

    /// Resuelve `query`, se une a `channel` si hace falta y encola el resultado.
    /// Si la búsqueda no se resuelve, el guild queda intacto.
    pub async fn enqueue(
        &self,
        tenant: TenantId,
        channel: ChannelRef,
        query: &str,
    ) -> CommandResult<EnqueueReceipt> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::Malformed("empty query".to_string()).into());
        }

        let track = self.resolver.resolve(query).await?;
        info!(
            "📥 '{}' resuelto con {} para guild {}",
            track.title(),
            self.resolver.name(),
            tenant
        );

        self.coordinator.connect(tenant, channel).await?;
        self.coordinator.enqueue(tenant, track).await
    }

    pub async fn skip(&self, tenant: TenantId) -> CommandResult<Track> {
        self.coordinator.skip(tenant).await
    }

    pub async fn toggle_pause(&self, tenant: TenantId) -> CommandResult<PlaybackState> {
        self.coordinator.toggle_pause(tenant).await
    }

    pub async fn pause(&self, tenant: TenantId) -> CommandResult<()> {
        self.coordinator.pause(tenant).await
    }

    pub async fn resume(&self, tenant: TenantId) -> CommandResult<()> {
        self.coordinator.resume(tenant).await
    }

    /// Fija el volumen desde un porcentaje; lo que salga de 0–200 se recorta.
    pub async fn set_volume(&self, tenant: TenantId, percent: i64) -> CommandResult<Volume> {
        self.coordinator
            .set_volume(tenant, Volume::from_percent(percent))
            .await
    }

    pub async fn volume_up(&self, tenant: TenantId) -> CommandResult<Volume> {
        self.coordinator.adjust_volume(tenant, Volume::STEP).await
    }

    pub async fn volume_down(&self, tenant: TenantId) -> CommandResult<Volume> {
        self.coordinator.adjust_volume(tenant, -Volume::STEP).await
    }

    pub async fn stop(&self, tenant: TenantId) -> CommandResult<StopSummary> {
        self.coordinator.stop(tenant).await
    }

    pub async fn queue(&self, tenant: TenantId) -> Vec<Track> {
        self.coordinator.queue(tenant).await
    }

    pub async fn now_playing(&self, tenant: TenantId) -> Option<Track> {
        self.coordinator.now_playing(tenant).await
    }

    pub async fn snapshot(&self, tenant: TenantId) -> Option<SessionSnapshot> {
        self.coordinator.snapshot(tenant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            coordinator::PlayerSettings,
            testing::{FakeTransport, TransportCall},
        },
        error::{CommandError, TransportError},
        sources::MockMediaResolver,
    };
    use pretty_assertions::assert_eq;

    const GUILD: TenantId = TenantId(42);
    const VOICE: ChannelRef = ChannelRef(7);

    fn resolved(query: &str) -> Track {
        Track::new(
            format!("{} (official audio)", query),
            format!("https://youtu.be/{}", query),
            format!("https://cdn.example/{}", query),
        )
        .unwrap()
    }

    fn surface(resolver: MockMediaResolver, transport: &FakeTransport) -> CommandSurface {
        let coordinator =
            PlaybackCoordinator::new(Arc::new(transport.clone()), PlayerSettings::default());
        CommandSurface::new(Arc::new(resolver), coordinator)
    }

    fn resolver_for(times: usize) -> MockMediaResolver {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve()
            .times(times)
            .returning(|q| Ok(resolved(q)));
        resolver.expect_name().return_const("mock");
        resolver
    }

    #[tokio::test]
    async fn enqueue_resolves_connects_and_starts() {
        let transport = FakeTransport::new();
        let surface = surface(resolver_for(2), &transport);

        let first = surface.enqueue(GUILD, VOICE, "  lofi ").await.unwrap();
        let second = surface.enqueue(GUILD, VOICE, "jazz").await.unwrap();

        assert!(first.started);
        assert_eq!(first.track.stream_url(), "https://cdn.example/lofi");
        assert!(!second.started);
        assert_eq!(second.position, 1);
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Connect(GUILD, VOICE),
                TransportCall::Start(GUILD, "https://cdn.example/lofi".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn empty_query_never_reaches_the_resolver() {
        let transport = FakeTransport::new();
        let mut resolver = MockMediaResolver::new();
        resolver.expect_resolve().never();
        let surface = surface(resolver, &transport);

        let err = surface.enqueue(GUILD, VOICE, "   ").await.unwrap_err();

        assert!(matches!(
            err,
            CommandError::Resolution(ResolutionError::Malformed(_))
        ));
        assert!(surface.coordinator().registry().is_empty());
    }

    #[tokio::test]
    async fn failed_resolution_leaves_the_guild_untouched() {
        let transport = FakeTransport::new();
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve()
            .withf(|q| q == "https://example.com/silent")
            .times(1)
            .returning(|q| Err(ResolutionError::NoAudioStream(q.to_string())));
        let surface = surface(resolver, &transport);

        let err = surface
            .enqueue(GUILD, VOICE, "https://example.com/silent")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CommandError::Resolution(ResolutionError::NoAudioStream(
                "https://example.com/silent".to_string()
            ))
        );
        assert!(transport.calls().is_empty());
        assert!(surface.coordinator().registry().is_empty());
    }

    #[tokio::test]
    async fn refused_connection_queues_nothing() {
        let transport = FakeTransport::new();
        transport.refuse_connect();
        let surface = surface(resolver_for(1), &transport);

        let err = surface.enqueue(GUILD, VOICE, "lofi").await.unwrap_err();

        assert!(matches!(
            err,
            CommandError::Transport(TransportError::Connect(_))
        ));
        assert!(surface.queue(GUILD).await.is_empty());
        assert!(surface.coordinator().registry().is_empty());
    }

    #[tokio::test]
    async fn volume_percentages_are_clamped() {
        let transport = FakeTransport::new();
        let surface = surface(resolver_for(0), &transport);

        assert_eq!(surface.set_volume(GUILD, -50).await.unwrap().get(), 0.0);
        assert_eq!(surface.set_volume(GUILD, 500).await.unwrap().get(), 2.0);
        assert_eq!(surface.set_volume(GUILD, 150).await.unwrap().get(), 1.5);
        assert_eq!(surface.volume_up(GUILD).await.unwrap().percent(), 160);
        assert_eq!(surface.volume_down(GUILD).await.unwrap().percent(), 150);
    }

    #[tokio::test]
    async fn queries_do_not_create_sessions() {
        let transport = FakeTransport::new();
        let surface = surface(resolver_for(0), &transport);

        assert!(surface.queue(GUILD).await.is_empty());
        assert!(surface.now_playing(GUILD).await.is_none());
        assert!(surface.snapshot(GUILD).await.is_none());
        assert!(surface.coordinator().registry().is_empty());
    }
}
