//! Pixel-eye avatar: mood, expressions, gaze, blinking and rasterizing.

pub mod blink;
pub mod engine;
pub mod expression;
pub mod gaze;
pub mod mood;
pub mod raster;

pub use engine::{AvatarInputs, EyesEngine, FrameState};
pub use expression::{compute_expression, Expression, EyeSide};
pub use gaze::AvatarRect;
pub use mood::{
    derive_mood, ClickReaction, MoodController, MoodInputs, MoodSettings, MoodState, VoiceState,
    WakeWordMatcher,
};
pub use raster::{EyeCanvas, EYE_SIZE};
