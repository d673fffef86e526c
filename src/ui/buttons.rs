use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::session::PlaybackState;

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const VOLUME_UP: &str = "music_volume_up";
    pub const VOLUME_DOWN: &str = "music_volume_down";
}

/// Acción pedida desde un botón del panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    TogglePause,
    Skip,
    Stop,
    VolumeUp,
    VolumeDown,
}

impl PanelAction {
    pub fn from_custom_id(id: &str) -> Option<Self> {
        match id {
            button_ids::PLAY_PAUSE => Some(Self::TogglePause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            button_ids::VOLUME_UP => Some(Self::VolumeUp),
            button_ids::VOLUME_DOWN => Some(Self::VolumeDown),
            _ => None,
        }
    }
}

/// Crea los controles principales del reproductor
pub fn player_controls(state: PlaybackState) -> Vec<CreateActionRow> {
    let play_pause_style = match state {
        PlaybackState::Paused => ButtonStyle::Success,
        _ => ButtonStyle::Primary,
    };
    let idle = state == PlaybackState::Idle;

    vec![CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PLAY_PAUSE)
            .emoji('⏯')
            .style(play_pause_style)
            .disabled(idle),
        CreateButton::new(button_ids::SKIP)
            .emoji('⏭')
            .style(ButtonStyle::Secondary)
            .disabled(idle),
        CreateButton::new(button_ids::VOLUME_DOWN)
            .emoji('🔉')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::VOLUME_UP)
            .emoji('🔊')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::STOP)
            .emoji('🗑')
            .style(ButtonStyle::Danger),
    ])]
}
