use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use guild_jukebox::{
    audio::{voice::SongbirdTransport, CommandSurface, PlaybackCoordinator},
    bot::JukeboxBot,
    config::Config,
    sources::{MediaResolver, YtDlpResolver},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Resolución de medios
    let resolver = YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.resolve_timeout(),
        config.cookies_file.clone(),
    );
    match resolver.verify().await {
        Ok(version) => info!("✅ {} {} disponible", resolver.name(), version),
        Err(e) => error!("❌ yt-dlp no disponible, /play fallará: {:?}", e),
    }

    // Transporte de voz y coordinador
    let manager = Songbird::serenity();
    let transport = SongbirdTransport::new(manager.clone(), reqwest::Client::new());
    let coordinator = PlaybackCoordinator::new(Arc::new(transport), config.player_settings());
    let surface = CommandSurface::new(Arc::new(resolver), coordinator);

    // Solo guilds y estados de voz: los comandos son slash
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let handler = JukeboxBot::new(config, surface);

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
