//! ClipForge Core — domain types, configuration, and cancellation shared by
//! every pipeline stage.

pub mod cancel;
pub mod config;
pub mod error;
pub mod types;

pub use cancel::{Cancelled, CancellationToken};
pub use config::{Config, ConfigFile, RankerWeights, RenderQuality};
pub use error::{CoreError, Result};
pub use types::{
    dedup_scene_cuts, media_id, window_id, CropStrategyKind, EncoderProfile, JobLogRow, LlmGrade,
    MediaAsset, RankedClip, RenderPlan, SceneCut, SubtitleEvent, TextFeatures, Token, Transcript,
    Window, TARGET_HEIGHT, TARGET_WIDTH,
};
