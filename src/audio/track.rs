use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ResolutionError;

/// Título de respaldo cuando el extractor no informa ninguno.
pub const UNKNOWN_TITLE: &str = "Unknown track";

/// Contenido resuelto y reproducible.
///
/// Un resolver lo construye una vez y ya no cambia: los campos son privados y
/// los métodos builder consumen `self`. Siempre lleva una URL de stream no
/// vacía; no hay forma de construirlo sin ella.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    title: String,
    source_url: String,
    stream_url: String,
    duration: Option<Duration>,
    uploader: Option<String>,
    thumbnail: Option<String>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        source_url: impl Into<String>,
        stream_url: impl Into<String>,
    ) -> Result<Self, ResolutionError> {
        let source_url = source_url.into();
        let stream_url = stream_url.into();

        if stream_url.trim().is_empty() {
            return Err(ResolutionError::NoAudioStream(source_url));
        }

        let title = title.into();
        let title = if title.trim().is_empty() {
            UNKNOWN_TITLE.to_string()
        } else {
            title
        };

        Ok(Self {
            title,
            source_url,
            stream_url,
            duration: None,
            uploader: None,
            thumbnail: None,
        })
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn source_url(&self) -> &str {
        &self.source_url
    }
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn uploader(&self) -> Option<&str> {
        self.uploader.as_deref()
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    // Builders

    /// Fija la duración a partir de los segundos del extractor. Valores
    /// negativos o no finitos significan "desconocida" (los directos no la informan).
    pub fn with_duration_secs(mut self, secs: Option<f64>) -> Self {
        self.duration = secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64);
        self
    }

    pub fn with_uploader(mut self, uploader: Option<String>) -> Self {
        self.uploader = uploader.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail.filter(|t| !t.trim().is_empty());
        self
    }
}

/// Un stream que ofrece el extractor para un contenido.
///
/// Los nombres de campo siguen los formatos de yt-dlp. `abr` queda como JSON
/// crudo porque a veces llega como texto o como null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamCandidate {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub abr: Option<serde_json::Value>,
}

impl StreamCandidate {
    fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(codec) if codec != "none")
            && self.url.as_deref().is_some_and(|u| !u.is_empty())
    }

    fn has_video(&self) -> bool {
        matches!(self.vcodec.as_deref(), Some(codec) if codec != "none")
    }

    fn bitrate(&self) -> Option<f64> {
        match self.abr.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

/// Elige el stream a reproducir entre los candidatos del extractor.
///
/// Los de solo audio ganan a los mezclados. Dentro del grupo se elige el de
/// mayor bitrate; si alguno no trae un bitrate numérico no se pueden comparar
/// y se usa el primero del grupo. En un empate gana el primero.
pub fn select_stream(candidates: &[StreamCandidate]) -> Option<&StreamCandidate> {
    let audio_only: Vec<&StreamCandidate> = candidates
        .iter()
        .filter(|c| c.has_audio() && !c.has_video())
        .collect();

    let pool = if audio_only.is_empty() {
        candidates.iter().filter(|c| c.has_audio()).collect()
    } else {
        audio_only
    };

    let first = *pool.first()?;

    let rated: Option<Vec<(f64, &StreamCandidate)>> =
        pool.iter().map(|c| c.bitrate().map(|b| (b, *c))).collect();

    let Some(rated) = rated else {
        return Some(first);
    };

    let mut best: Option<(f64, &StreamCandidate)> = None;
    for (rate, c) in rated {
        if best.map_or(true, |(best_rate, _)| rate > best_rate) {
            best = Some((rate, c));
        }
    }
    best.map(|(_, c)| c)
}
