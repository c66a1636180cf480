//! The `CropStrategy` seam (§4.H, §9 "ad-hoc subprocess control" redesign
//! notes — crop selection is the other pluggable seam the render planner
//! exposes). `center` is the default and only strategy ClipForge ships
//! today; `face_track_stub` is an explicit hook for a future subject
//! tracker and is wired end to end, but its implementation still returns
//! a center crop — it takes [`MotionData`] as an optional hint and ignores
//! it, exactly as the spec calls for.

use crate::stabilize::MotionData;

/// A pixel-space crop rectangle within a source frame of `frame_w x frame_h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// The largest `target_w:target_h`-aspect rectangle centered in a frame
    /// of `frame_w x frame_h`, clamped to the frame bounds.
    pub fn centered(frame_w: u32, frame_h: u32, target_w: u32, target_h: u32) -> Self {
        let target_aspect = target_w as f64 / target_h as f64;
        let frame_aspect = frame_w as f64 / frame_h as f64;

        let (width, height) = if frame_aspect > target_aspect {
            // Frame is wider than the target: crop width down to match.
            let height = frame_h;
            let width = (height as f64 * target_aspect).round() as u32;
            (width.min(frame_w), height)
        } else {
            let width = frame_w;
            let height = (width as f64 / target_aspect).round() as u32;
            (width, height.min(frame_h))
        };

        let x = (frame_w.saturating_sub(width)) / 2;
        let y = (frame_h.saturating_sub(height)) / 2;
        Self { x, y, width, height }
    }
}

/// Per-frame (or whole-clip) crop decision for reframing to 9:16.
///
/// Implementations must be pure given their inputs so render plans stay
/// reproducible (§8 invariant 3): no network calls, no hidden state beyond
/// what `motion` already carries.
pub trait CropStrategy {
    /// One crop rectangle for a clip of dimensions `frame_w x frame_h`
    /// reframed to `target_w x target_h`. `motion`, when present, is a
    /// precomputed per-frame motion estimate the strategy may use to
    /// follow a subject instead of holding a single static rectangle.
    fn crop_rect(
        &self,
        frame_w: u32,
        frame_h: u32,
        target_w: u32,
        target_h: u32,
        motion: Option<&MotionData>,
    ) -> CropRect;
}

/// Always crops to the frame center. The only strategy actually reachable
/// from `Config` today (§3.1 `CropStrategyKind::Center`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CenterCrop;

impl CropStrategy for CenterCrop {
    fn crop_rect(
        &self,
        frame_w: u32,
        frame_h: u32,
        target_w: u32,
        target_h: u32,
        _motion: Option<&MotionData>,
    ) -> CropRect {
        CropRect::centered(frame_w, frame_h, target_w, target_h)
    }
}

/// The explicit seam for a future subject tracker (§9). Its default body
/// ignores `motion` entirely and returns the same center crop as
/// [`CenterCrop`] — wiring the interface through the render planner now so
/// a real tracker can drop in later without touching callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaceTrackStub;

impl CropStrategy for FaceTrackStub {
    fn crop_rect(
        &self,
        frame_w: u32,
        frame_h: u32,
        target_w: u32,
        target_h: u32,
        _motion: Option<&MotionData>,
    ) -> CropRect {
        CropRect::centered(frame_w, frame_h, target_w, target_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_crop_matches_target_aspect_for_wide_frame() {
        let rect = CropRect::centered(1920, 1080, 1080, 1920);
        assert_eq!(rect.height, 1080);
        assert!(rect.width < 1920);
        let aspect = rect.width as f64 / rect.height as f64;
        assert!((aspect - 1080.0 / 1920.0).abs() < 0.01);
    }

    #[test]
    fn centered_crop_is_centered_within_frame() {
        let rect = CropRect::centered(1920, 1080, 1080, 1920);
        let left_margin = rect.x;
        let right_margin = 1920 - rect.x - rect.width;
        assert!(left_margin.abs_diff(right_margin) <= 1);
    }

    #[test]
    fn face_track_stub_ignores_motion_and_matches_center_crop() {
        let motion = MotionData::new(10);
        let center = CenterCrop.crop_rect(1920, 1080, 1080, 1920, None);
        let stub = FaceTrackStub.crop_rect(1920, 1080, 1080, 1920, Some(&motion));
        assert_eq!(center, stub);
    }

    #[test]
    fn already_portrait_frame_crops_width_not_height() {
        let rect = CropRect::centered(1080, 1920, 1080, 1920);
        assert_eq!(rect.width, 1080);
        assert_eq!(rect.height, 1920);
    }
}
