//! # Audio Module
//!
//! Per-guild playback: queues, the playback state machine and the voice
//! transport it drives.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - One [`session::TenantSession`] per guild, created on first use
//! - Each session has its own async lock; guilds never wait on each other
//!
//! ### [`coordinator`] - Playback Coordinator
//! - FIFO queue advance, pause/resume, skip, volume, stop
//! - Completion reports from the transport are serialized with user commands
//! - Failed starts are retried with backoff; a circuit breaker drops the queue
//!   after too many consecutive failures
//!
//! ### [`surface`] - Command Surface
//! - Resolves user input and calls into the coordinator
//!
//! ### [`voice`] - Voice Transport
//! - Songbird implementation of [`transport::AudioTransport`]
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::audio::{
//!     coordinator::{PlaybackCoordinator, PlayerSettings},
//!     session::{ChannelRef, TenantId},
//!     surface::CommandSurface,
//!     voice::SongbirdTransport,
//! };
//! use guild_jukebox::sources::YtDlpResolver;
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example(manager: Arc<songbird::Songbird>) -> anyhow::Result<()> {
//! let transport = SongbirdTransport::new(manager, reqwest::Client::new());
//! let coordinator = PlaybackCoordinator::new(Arc::new(transport), PlayerSettings::default());
//! let resolver = YtDlpResolver::new("yt-dlp", Duration::from_secs(60), None);
//! let surface = CommandSurface::new(Arc::new(resolver), coordinator);
//!
//! let guild = TenantId(123456789);
//! surface.enqueue(guild, ChannelRef(987654321), "lofi hip hop").await?;
//! surface.toggle_pause(guild).await?;
//! surface.skip(guild).await?;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod events;
pub mod registry;
pub mod session;
pub mod surface;
pub mod track;
pub mod transport;
pub mod voice;

#[cfg(test)]
mod testing;

pub use coordinator::{EnqueueReceipt, PlaybackCoordinator, PlayerSettings, StopSummary};
pub use events::{PlayerUpdate, UpdateKind};
pub use session::{ChannelRef, PlaybackState, TenantId, Volume};
pub use surface::CommandSurface;
pub use track::Track;
