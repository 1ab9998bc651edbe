//! Data model for the player
//!
//! These are plain value types. All mutation happens in the controller.

mod playback_state;
mod track;
mod volume;

pub use playback_state::PlaybackState;
pub use track::{SongKind, Track};
pub use volume::{clamp_volume, VOLUME_STEP};

pub use mpd_client::SongId;
