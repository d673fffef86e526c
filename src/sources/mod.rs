//! Fuentes de audio: convierten lo que escribe el usuario en un [`Track`].

pub mod ytdlp;

use async_trait::async_trait;

use crate::{audio::track::Track, error::ResolutionError};

pub use ytdlp::YtDlpResolver;

/// Resuelve una URL o búsqueda a un track reproducible.
///
/// Las implementaciones pueden tardar mucho en la red; no se debe tener
/// ningún lock de sesión tomado mientras se espera `resolve`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError>;

    /// Nombre de la fuente, para logs
    fn name(&self) -> &'static str;
}
