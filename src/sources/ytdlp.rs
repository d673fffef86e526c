use async_trait::async_trait;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, warn};

use super::MediaResolver;
use crate::{
    audio::track::{select_stream, StreamCandidate, Track},
    error::ResolutionError,
};

/// Resolver que llama a yt-dlp y lee su volcado JSON (`-J`).
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
    cookies: Option<PathBuf>,
}

/// Lo que nos interesa del JSON de yt-dlp.
#[derive(Debug, Default, Deserialize)]
struct MediaInfo {
    #[serde(rename = "_type", default)]
    kind: Option<String>,
    #[serde(default)]
    entries: Vec<Option<MediaInfo>>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    duration: Option<serde_json::Value>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    formats: Vec<StreamCandidate>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, timeout: Duration, cookies: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            cookies,
        }
    }

    /// Verifica que yt-dlp esté disponible y devuelve su versión.
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!("{} --version terminó con {}", self.binary, output.status);
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    /// Busca archivo de cookies: primero el configurado, luego las rutas habituales.
    async fn find_cookies_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cookies {
            if tokio::fs::metadata(path).await.is_ok() {
                return Some(path.clone());
            }
            warn!("🍪 COOKIES_FILE {} no existe, se ignora", path.display());
        }

        let home = std::env::var("HOME").unwrap_or_default();
        let candidates = [
            Path::new(&home).join(".config/yt-dlp/cookies.txt"),
            PathBuf::from("./cookies.txt"),
        ];
        for path in candidates {
            if tokio::fs::metadata(&path).await.is_ok() {
                debug!("🍪 Cookies encontradas en: {}", path.display());
                return Some(path);
            }
        }
        None
    }

    async fn dump_json(&self, query: &str) -> Result<Vec<u8>, ResolutionError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args([
            "-J",
            "--no-playlist",
            "--default-search",
            "auto",
            "--format",
            "bestaudio/best",
            "--no-warnings",
            "--socket-timeout",
            "30",
        ]);

        if let Some(cookies) = self.find_cookies_file().await {
            cmd.arg("--cookies").arg(cookies);
        }

        // `--` para que una búsqueda que empiece por '-' no se lea como opción
        cmd.arg("--").arg(query);
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                ResolutionError::Unreachable(format!(
                    "yt-dlp no respondió en {}",
                    humantime::format_duration(self.timeout)
                ))
            })?
            .map_err(|e| ResolutionError::Unreachable(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló para '{}': {}", query, stderr.trim());
            return Err(classify_failure(query, &stderr));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::Malformed("empty query".to_string()));
        }
        if looks_like_url(query) {
            url::Url::parse(query)
                .map_err(|e| ResolutionError::Malformed(format!("{}: {}", query, e)))?;
        }

        info!("🔍 Resolviendo con yt-dlp: {}", query);
        let stdout = self.dump_json(query).await?;
        let track = parse_media_info(query, &stdout)?;
        debug!("✅ Resuelto '{}' -> {}", query, track.title());
        Ok(track)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

fn looks_like_url(query: &str) -> bool {
    query.starts_with("http://") || query.starts_with("https://")
}

/// Mapea el stderr de yt-dlp a un error de resolución.
fn classify_failure(query: &str, stderr: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();
    if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        ResolutionError::Malformed(query.to_string())
    } else if lower.contains("requested format is not available") {
        ResolutionError::NoAudioStream(query.to_string())
    } else {
        let line = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("yt-dlp exited with an error");
        ResolutionError::Unreachable(line.trim().to_string())
    }
}

/// Convierte el volcado JSON de yt-dlp en un [`Track`]. Las búsquedas y
/// playlists se resuelven a su primera entrada.
fn parse_media_info(query: &str, json: &[u8]) -> Result<Track, ResolutionError> {
    let info: MediaInfo = serde_json::from_slice(json)
        .map_err(|e| ResolutionError::Unreachable(format!("salida de yt-dlp ilegible: {}", e)))?;

    let info = if info.kind.as_deref() == Some("playlist") || !info.entries.is_empty() {
        info.entries
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| ResolutionError::NoAudioStream(format!("no results for {}", query)))?
    } else {
        info
    };

    let source_url = info
        .webpage_url
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| query.to_string());

    let stream_url = select_stream(&info.formats)
        .and_then(|c| c.url.clone())
        .or_else(|| info.url.clone().filter(|u| !u.is_empty()))
        .ok_or_else(|| ResolutionError::NoAudioStream(source_url.clone()))?;

    let duration = info.duration.as_ref().and_then(|d| d.as_f64());

    Ok(Track::new(info.title.unwrap_or_default(), source_url, stream_url)?
        .with_duration_secs(duration)
        .with_uploader(info.uploader)
        .with_thumbnail(info.thumbnail))
}
