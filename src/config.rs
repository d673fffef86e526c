use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::{coordinator::PlayerSettings, session::Volume};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Recuperación de errores
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub max_consecutive_failures: u32,

    // Resolución (yt-dlp)
    pub ytdlp_path: String,
    pub resolve_timeout_secs: u64,
    pub cookies_file: Option<PathBuf>,

    // UI
    pub update_buffer: usize,
    pub queue_page_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración desde cualquier fuente clave/valor. `load`
    /// usa el entorno del proceso; los tests pasan un mapa.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fn parse_or<T>(value: Option<String>, key: &str, default: &str) -> Result<T>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .unwrap_or_else(|| default.to_string())
                .trim()
                .parse()
                .with_context(|| format!("{} inválido", key))
        }

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", "1.0")?,
            max_queue_size: parse_or(var("MAX_QUEUE_SIZE"), "MAX_QUEUE_SIZE", "1000")?,

            // Recuperación de errores
            retry_delay_ms: parse_or(var("RETRY_DELAY_MS"), "RETRY_DELAY_MS", "1000")?,
            max_retry_delay_ms: parse_or(var("MAX_RETRY_DELAY_MS"), "MAX_RETRY_DELAY_MS", "8000")?,
            max_consecutive_failures: parse_or(
                var("MAX_CONSECUTIVE_FAILURES"),
                "MAX_CONSECUTIVE_FAILURES",
                "5",
            )?,

            // Resolución
            ytdlp_path: var("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            resolve_timeout_secs: parse_or(
                var("RESOLVE_TIMEOUT_SECS"),
                "RESOLVE_TIMEOUT_SECS",
                "60",
            )?,
            cookies_file: var("COOKIES_FILE").map(PathBuf::from),

            // UI
            update_buffer: parse_or(var("UPDATE_BUFFER"), "UPDATE_BUFFER", "64")?,
            queue_page_size: parse_or(var("QUEUE_PAGE_SIZE"), "QUEUE_PAGE_SIZE", "10")?,
        })
    }

    /// Valida los valores de configuración.
    ///
    /// # Reglas
    ///
    /// - El volumen debe estar entre 0.0 y 2.0
    /// - Tamaño de cola, umbral de fallos y buffers deben ser > 0
    /// - El tope de espera entre reintentos no puede ser menor que la espera base
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_consecutive_failures == 0 {
            anyhow::bail!("Max consecutive failures must be greater than 0");
        }

        if self.max_retry_delay_ms < self.retry_delay_ms {
            anyhow::bail!(
                "Max retry delay ({}ms) cannot be lower than retry delay ({}ms)",
                self.max_retry_delay_ms,
                self.retry_delay_ms
            );
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.update_buffer == 0 || self.queue_page_size == 0 {
            anyhow::bail!("Update buffer and queue page size must be greater than 0");
        }

        Ok(())
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            default_volume: Volume::new(self.default_volume),
            max_queue_size: self.max_queue_size,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            max_consecutive_failures: self.max_consecutive_failures,
            update_buffer: self.update_buffer,
        }
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Resumen de la configuración actual para los logs.
    ///
    /// No incluye el token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} max queue\n  \
            Recovery: retry {} (max {}), breaker after {} failures\n  \
            Resolver: {} (timeout {}, cookies: {})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            humantime::format_duration(Duration::from_millis(self.retry_delay_ms)),
            humantime::format_duration(Duration::from_millis(self.max_retry_delay_ms)),
            self.max_consecutive_failures,
            self.ytdlp_path,
            humantime::format_duration(self.resolve_timeout()),
            self.cookies_file
                .as_ref()
                .map_or("none".to_string(), |p| p.display().to_string()),
        )
    }
}

/// Valores de configuración por defecto.
///
/// Se usan cuando no hay variables de entorno.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 1.0,
            max_queue_size: 1000,

            retry_delay_ms: 1000,
            max_retry_delay_ms: 8000,
            max_consecutive_failures: 5,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout_secs: 60,
            cookies_file: None,

            update_buffer: 64,
            queue_page_size: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let config =
            Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t0k3n"), ("APPLICATION_ID", "42")]))
                .unwrap();

        assert_eq!(config.application_id, 42);
        assert_eq!(config.guild_id, None);
        assert_eq!(config.default_volume, 1.0);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert_eq!(config.queue_page_size, 10);
        config.validate().unwrap();
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(Config::from_lookup(lookup(&[("APPLICATION_ID", "42")])).is_err());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("APPLICATION_ID", "42"),
            ("MAX_QUEUE_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MAX_QUEUE_SIZE"));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let loud = Config {
            default_volume: 3.0,
            ..Config::default()
        };
        assert!(loud.validate().is_err());

        let backwards = Config {
            retry_delay_ms: 5000,
            max_retry_delay_ms: 1000,
            ..Config::default()
        };
        assert!(backwards.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn player_settings_carry_the_tunables() {
        let config = Config {
            default_volume: 0.5,
            retry_delay_ms: 250,
            ..Config::default()
        };
        let settings = config.player_settings();

        assert_eq!(settings.default_volume.percent(), 50);
        assert_eq!(settings.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.max_retry_delay, Duration::from_secs(8));
    }

    #[test]
    fn summary_hides_the_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
