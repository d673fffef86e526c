//! Presentación en Discord: embeds, botones y el panel de control que se
//! mantiene al día con las actualizaciones del reproductor.

pub mod buttons;
pub mod embeds;
pub mod panel;
