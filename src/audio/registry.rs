use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::session::{TenantId, TenantSession, Teardown, Volume};

pub type SharedSession = Arc<Mutex<TenantSession>>;

/// Mapa global de guild a su sesión de reproducción.
///
/// El mapa solo protege la pertenencia; cada sesión tiene su propio mutex
/// asíncrono, así el trabajo de un guild nunca espera a otro.
pub struct SessionRegistry {
    sessions: DashMap<TenantId, SharedSession>,
    default_volume: Volume,
    max_queue_size: usize,
}

impl SessionRegistry {
    pub fn new(default_volume: Volume, max_queue_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            default_volume,
            max_queue_size,
        }
    }

    /// Devuelve la sesión del guild, creándola en el primer uso. Llamadas
    /// concurrentes para el mismo guild reciben siempre la misma sesión.
    pub fn get_or_create(&self, tenant: TenantId) -> SharedSession {
        match self.sessions.entry(tenant) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                info!("🆕 Sesión creada para guild {}", tenant);
                let session = TenantSession::new(tenant, self.default_volume, self.max_queue_size);
                entry.insert(Arc::new(Mutex::new(session))).clone()
            }
        }
    }

    pub fn get(&self, tenant: TenantId) -> Option<SharedSession> {
        self.sessions.get(&tenant).map(|s| s.value().clone())
    }

    /// Bloquea la sesión viva del guild, creándola si hace falta.
    ///
    /// Una sesión puede liberarse entre la búsqueda y el lock; en ese caso se
    /// salta la entrada eliminada y se usa la nueva.
    pub async fn lock_or_create(&self, tenant: TenantId) -> OwnedMutexGuard<TenantSession> {
        loop {
            let guard = self.get_or_create(tenant).lock_owned().await;
            if !guard.is_closed() {
                return guard;
            }
            debug!("🔁 Sesión de guild {} cerrada mientras se esperaba, reintentando", tenant);
        }
    }

    /// Bloquea la sesión viva del guild sin crearla.
    pub async fn lock(&self, tenant: TenantId) -> Option<OwnedMutexGuard<TenantSession>> {
        let guard = self.get(tenant)?.lock_owned().await;
        (!guard.is_closed()).then_some(guard)
    }

    /// Saca la sesión del mapa y la libera: cola vacía, sin canción actual y
    /// sin reintento pendiente. Devuelve el enlace de voz para que quien
    /// llama lo desconecte.
    pub async fn remove(&self, tenant: TenantId) -> Option<Teardown> {
        let (_, session) = self.sessions.remove(&tenant)?;
        let mut guard = session.lock().await;
        if guard.is_closed() {
            return None;
        }
        Some(guard.teardown())
    }

    /// Libera la sesión del guild solo si `matches` se cumple con el lock
    /// tomado. Una entrada reemplazada mientras tanto no se toca.
    pub async fn remove_where<F>(&self, tenant: TenantId, matches: F) -> Option<Teardown>
    where
        F: FnOnce(&TenantSession) -> bool,
    {
        let session = self.get(tenant)?;
        let mut guard = session.clone().lock_owned().await;
        if guard.is_closed() || !matches(&guard) {
            return None;
        }

        self.sessions
            .remove_if(&tenant, |_, current| Arc::ptr_eq(current, &session))?;
        Some(guard.teardown())
    }

    /// Descarta la sesión del guild si no guarda nada, p. ej. cuando se
    /// rechazó la primera conexión de voz. Indica si se descartó.
    pub async fn discard_if_blank(&self, tenant: TenantId) -> bool {
        let default_volume = self.default_volume;
        let removed = self
            .remove_where(tenant, |session| session.is_blank(default_volume))
            .await
            .is_some();
        if removed {
            debug!("🗑️ Sesión vacía de guild {} descartada", tenant);
        }
        removed
    }

    pub fn contains(&self, tenant: TenantId) -> bool {
        self.sessions.contains_key(&tenant)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::Track;
    use std::time::Duration;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Volume::default(), 100)
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_session() {
        let registry = Arc::new(registry());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move { registry.get_or_create(TenantId(5)) }));
        }

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn remove_tears_down_and_next_use_starts_fresh() {
        let registry = registry();
        {
            let mut session = registry.lock_or_create(TenantId(1)).await;
            session
                .queue
                .push_back(Track::new("a", "src", "https://cdn.example/a").unwrap());
        }
        let old = registry.get(TenantId(1)).unwrap();

        let teardown = registry.remove(TenantId(1)).await.unwrap();
        assert_eq!(teardown.cleared, 1);
        assert!(!registry.contains(TenantId(1)));
        assert!(old.lock().await.is_closed());

        let fresh = registry.lock_or_create(TenantId(1)).await;
        assert!(fresh.queue().is_empty());
        assert!(!fresh.is_closed());
    }

    #[tokio::test]
    async fn remove_of_unknown_tenant_is_none() {
        assert!(registry().remove(TenantId(9)).await.is_none());
    }

    #[tokio::test]
    async fn lock_or_create_never_returns_a_closed_session() {
        let registry = Arc::new(registry());
        let held = registry.lock_or_create(TenantId(3)).await;

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let guard = registry.lock_or_create(TenantId(3)).await;
                guard.is_closed()
            })
        };
        let remover = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.remove(TenantId(3)).await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(remover.await.unwrap());
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn tenants_do_not_share_a_lock() {
        let registry = registry();
        let _first = registry.lock_or_create(TenantId(1)).await;

        let second = tokio::time::timeout(
            Duration::from_millis(100),
            registry.lock_or_create(TenantId(2)),
        )
        .await;
        assert!(second.is_ok());
        assert_eq!(registry.tenants().len(), 2);
    }

    #[tokio::test]
    async fn lock_does_not_create() {
        let registry = registry();
        assert!(registry.lock(TenantId(4)).await.is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn remove_where_keeps_sessions_that_do_not_match() {
        let registry = registry();
        registry
            .lock_or_create(TenantId(6))
            .await
            .queue
            .push_back(Track::new("a", "src", "https://cdn.example/a").unwrap());

        assert!(registry.remove_where(TenantId(6), |s| s.queue().is_empty()).await.is_none());
        assert!(!registry.discard_if_blank(TenantId(6)).await);
        assert!(registry.contains(TenantId(6)));

        let teardown = registry.remove_where(TenantId(6), |s| !s.queue().is_empty()).await;
        assert_eq!(teardown.map(|t| t.cleared), Some(1));
        assert!(registry.is_empty());
    }
}
