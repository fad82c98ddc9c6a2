//! Render-space to device-space mapping.
//!
//! The model points at pixels of the image it was shown. That image may be
//! letterboxed, cropped or rotated relative to the phone, so every point goes
//! through [`CoordinateMapper::to_device`] exactly once before it reaches a command.
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::errors::{MobileClawError, MobileClawResult};

/// A point in the coordinate system of the image shown to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderPoint {
    pub x: f64,
    pub y: f64,
}

impl RenderPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Physical screen pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: i32,
    pub y: i32,
}

/// Sub-rectangle of the render frame that shows the real screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidRegion {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: i32,
    pub height: i32,
}

impl ValidRegion {
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl From<[i32; 4]> for ValidRegion {
    fn from([offset_x, offset_y, width, height]: [i32; 4]) -> Self {
        Self {
            offset_x,
            offset_y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl TryFrom<u16> for Rotation {
    type Error = MobileClawError;

    fn try_from(degrees: u16) -> MobileClawResult<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(MobileClawError::Config(format!(
                "unsupported rotation {other}, expected 0/90/180/270"
            ))),
        }
    }
}

/// Session geometry of the render frame: size, valid region and rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderFrame {
    pub width: u32,
    pub height: u32,
    pub region: ValidRegion,
    pub rotation: Rotation,
}

impl RenderFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            region: ValidRegion::default(),
            rotation: Rotation::Deg0,
        }
    }

    /// Region and rotation from `config`; the size too when it is fixed there,
    /// otherwise `captured` (the screenshot the model is shown).
    pub fn from_config(config: &RenderConfig, captured: (u32, u32)) -> MobileClawResult<Self> {
        let (width, height) = match (config.width, config.height) {
            (Some(w), Some(h)) => (w, h),
            _ => captured,
        };
        if width == 0 || height == 0 {
            return Err(MobileClawError::Config(format!(
                "render frame must be non-empty, got {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            region: ValidRegion::from(config.valid_region),
            rotation: Rotation::try_from(config.rotation)?,
        })
    }

    /// The region actually used for normalization.
    fn effective_region(&self) -> (f64, f64, f64, f64) {
        if self.region.is_degenerate() {
            (0.0, 0.0, self.width as f64, self.height as f64)
        } else {
            (
                self.region.offset_x as f64,
                self.region.offset_y as f64,
                self.region.width as f64,
                self.region.height as f64,
            )
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    frame: RenderFrame,
    device_width: u32,
    device_height: u32,
}

impl CoordinateMapper {
    pub fn new(frame: RenderFrame, device_width: u32, device_height: u32) -> Self {
        Self {
            frame,
            device_width: device_width.max(1),
            device_height: device_height.max(1),
        }
    }

    pub fn device_size(&self) -> (u32, u32) {
        (self.device_width, self.device_height)
    }

    /// Total: any input, including NaN, lands inside `[0,W) x [0,H)`.
    pub fn to_device(&self, point: RenderPoint) -> DevicePoint {
        let (vx, vy, vw, vh) = self.frame.effective_region();
        let mut nx = (point.x - vx) / vw;
        let mut ny = (point.y - vy) / vh;

        (nx, ny) = match self.frame.rotation {
            Rotation::Deg0 => (nx, ny),
            Rotation::Deg90 => (ny, 1.0 - nx),
            Rotation::Deg180 => (1.0 - nx, 1.0 - ny),
            Rotation::Deg270 => (1.0 - ny, nx),
        };

        DevicePoint {
            x: scale_and_clamp(nx, self.device_width),
            y: scale_and_clamp(ny, self.device_height),
        }
    }
}

fn scale_and_clamp(normalized: f64, extent: u32) -> i32 {
    let max = extent as i32 - 1;
    let scaled = (normalized * extent as f64).round();
    if scaled.is_nan() {
        return 0;
    }
    // `as` saturates at the i32 range for infinities.
    (scaled as i32).clamp(0, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32, rotation: Rotation) -> RenderFrame {
        RenderFrame {
            rotation,
            ..RenderFrame::new(w, h)
        }
    }

    #[test]
    fn identity_geometry_is_pure_scale() {
        let m = CoordinateMapper::new(frame(1080, 1920, Rotation::Deg0), 1080, 1920);
        assert_eq!(m.to_device(RenderPoint::new(100.0, 200.0)), DevicePoint { x: 100, y: 200 });

        let half = CoordinateMapper::new(frame(540, 960, Rotation::Deg0), 1080, 1920);
        assert_eq!(half.to_device(RenderPoint::new(100.0, 200.0)), DevicePoint { x: 200, y: 400 });
    }

    #[test]
    fn rotation_90_swaps_axes() {
        let m = CoordinateMapper::new(frame(1920, 1080, Rotation::Deg90), 1080, 1920);
        let p = m.to_device(RenderPoint::new(100.0, 200.0));
        let expected_x = (200.0_f64 / 1080.0 * 1080.0).round() as i32;
        let expected_y = ((1.0 - 100.0_f64 / 1920.0) * 1920.0).round() as i32;
        assert_eq!(p, DevicePoint { x: expected_x, y: expected_y });
        assert_eq!(p, DevicePoint { x: 200, y: 1820 });
    }

    #[test]
    fn rotation_90_on_landscape_device() {
        let m = CoordinateMapper::new(frame(1920, 1080, Rotation::Deg90), 1920, 1080);
        let p = m.to_device(RenderPoint::new(100.0, 200.0));
        assert_eq!(
            p,
            DevicePoint {
                x: (200.0_f64 / 1080.0 * 1920.0).round() as i32,
                y: ((1.0 - 100.0_f64 / 1920.0) * 1080.0).round() as i32,
            }
        );
    }

    #[test]
    fn rotation_180_sends_origin_to_bottom_right() {
        let m = CoordinateMapper::new(frame(1080, 1920, Rotation::Deg180), 1080, 1920);
        assert_eq!(m.to_device(RenderPoint::new(0.0, 0.0)), DevicePoint { x: 1079, y: 1919 });
    }

    #[test]
    fn rotation_270_maps_origin_to_top_right() {
        let m = CoordinateMapper::new(frame(1920, 1080, Rotation::Deg270), 1080, 1920);
        assert_eq!(m.to_device(RenderPoint::new(0.0, 0.0)), DevicePoint { x: 1079, y: 0 });
    }

    #[test]
    fn valid_region_removes_letterbox() {
        let f = RenderFrame {
            region: ValidRegion::from([0, 100, 1080, 1720]),
            ..RenderFrame::new(1080, 1920)
        };
        let m = CoordinateMapper::new(f, 1080, 1720);
        assert_eq!(m.to_device(RenderPoint::new(540.0, 100.0)), DevicePoint { x: 540, y: 0 });
        assert_eq!(m.to_device(RenderPoint::new(540.0, 960.0)), DevicePoint { x: 540, y: 860 });
        // Inside the top bar: clamped onto the first row.
        assert_eq!(m.to_device(RenderPoint::new(540.0, 10.0)).y, 0);
    }

    #[test]
    fn degenerate_region_means_whole_frame() {
        let f = RenderFrame {
            region: ValidRegion::from([50, 50, 0, 300]),
            ..RenderFrame::new(1000, 1000)
        };
        let m = CoordinateMapper::new(f, 1000, 1000);
        assert_eq!(m.to_device(RenderPoint::new(10.0, 10.0)), DevicePoint { x: 10, y: 10 });
    }

    #[test]
    fn output_always_in_bounds() {
        let inputs = [
            (-1e9, -1e9),
            (1e9, 1e9),
            (f64::NAN, 5.0),
            (f64::INFINITY, f64::NEG_INFINITY),
            (1080.0, 1920.0),
            (-0.4, 1919.6),
        ];
        for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
            let m = CoordinateMapper::new(frame(1080, 1920, rotation), 720, 1280);
            for (x, y) in inputs {
                let p = m.to_device(RenderPoint::new(x, y));
                assert!((0..720).contains(&p.x), "{rotation:?} ({x},{y}) -> {p:?}");
                assert!((0..1280).contains(&p.y), "{rotation:?} ({x},{y}) -> {p:?}");
            }
        }
    }

    #[test]
    fn rotation_parses_from_degrees() {
        assert_eq!(Rotation::try_from(90).unwrap(), Rotation::Deg90);
        assert!(Rotation::try_from(45).is_err());
        assert!(Rotation::try_from(450).is_err());
    }
}
