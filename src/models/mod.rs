pub mod user_profile;
pub mod playlist;
pub mod applied_step;

pub use user_profile::{Preferences, UserProfile};
pub use playlist::Playlist;
pub use applied_step::AppliedStep;
