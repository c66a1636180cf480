//! ClipForge Tracking — the reframe-to-9:16 crop seam (§4.H) and the motion
//! estimation it can draw on.
//!
//! The render planner needs a crop rectangle (or per-frame track of
//! rectangles) for every clip it reframes to 1080x1920. [`crop_strategy`]
//! defines that seam as a trait with a center-crop default; [`point_tracker`],
//! [`pyramid`], and [`stabilize`] are carried over from the donor editor's
//! stabilization feature because a future `face_track_stub` implementation
//! needs exactly this kind of frame-to-frame motion estimate to follow a
//! subject instead of cropping to the frame center.

pub mod crop_strategy;
pub mod point_tracker;
pub mod pyramid;
pub mod stabilize;

pub use crop_strategy::{CenterCrop, CropRect, CropStrategy, FaceTrackStub};
pub use point_tracker::{PointTracker, TrackPoint};
pub use pyramid::{compute_gradients, rgb_to_gray, GrayImage, ImagePyramid};
pub use stabilize::{analyze_motion, MotionData};
