//! Tipos de error del núcleo de reproducción.
//!
//! Cada error afecta a una sola sesión de guild; ninguno es fatal para el
//! proceso.

use thiserror::Error;

/// Un enlace o búsqueda del usuario no se pudo convertir en algo reproducible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// No se pudo llegar a la fuente (red, fallo del extractor, timeout)
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// El contenido existe pero no ofrece nada que se pueda emitir como audio
    #[error("no audio stream found for {0}")]
    NoAudioStream(String),

    /// La entrada no es una URL ni una búsqueda válida
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Fallos que informa el transporte de audio.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Falló la unión o el cambio a un canal de voz
    #[error("voice connection failed: {0}")]
    Connect(String),

    /// El transporte rechazó arrancar una canción resuelta
    #[error("transport refused track: {0}")]
    Start(String),

    /// No se pudo entregar pausa, reanudar, volumen o stop
    #[error("transport control failed: {0}")]
    Control(String),
}

/// El comando no aplica al estado actual de la sesión.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("nothing is playing")]
    NothingPlaying,

    #[error("playback is already paused")]
    AlreadyPaused,

    #[error("playback is already running")]
    AlreadyPlaying,

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("the queue is full (max {max} tracks)")]
    QueueFull { max: usize },
}

/// Todo lo que puede fallar en un comando de [`CommandSurface`](crate::audio::surface::CommandSurface).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;
