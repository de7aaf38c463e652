/// Perception pipeline: capture the target window, cut out the grid region,
/// overlay the numbered grid and encode both copies for transmission and logging.
use base64::Engine as _;
use image::{imageops, RgbaImage};

use crate::errors::{PointClawError, PointClawResult};
use crate::perception::grid::GridMapping;
use crate::perception::som_grid::draw_numbered_grid;
use crate::perception::types::CaptureFrame;
use crate::perception::window::ScreenCapture;

/// Run the capture pipeline:
///
/// 1. Capture the window image.
/// 2. Rescale to the window's logical size if the backend returned a HiDPI buffer.
/// 3. Crop to the mapping's grid region.
/// 4. Draw the numbered grid over a copy.
///
/// Writes nothing to disk; the session recorder persists the frame.
pub fn capture_frame(
    capture: &dyn ScreenCapture,
    window_id: u32,
    mapping: &GridMapping,
) -> PointClawResult<CaptureFrame> {
    let shot = capture.capture_window(window_id)?;
    let region = crop_region(&shot, mapping)?;
    let annotated = draw_numbered_grid(&region, mapping);

    let raw_png = encode_png(region.clone())?;
    let annotated_png = encode_png(annotated)?;
    let annotated_base64 = base64::engine::general_purpose::STANDARD.encode(&annotated_png);

    tracing::debug!(
        window_id,
        width = region.width(),
        height = region.height(),
        png_bytes = annotated_png.len(),
        "frame captured"
    );

    Ok(CaptureFrame {
        raw_png,
        annotated_png,
        annotated_base64,
        width: region.width(),
        height: region.height(),
        captured_at: chrono::Utc::now(),
    })
}

/// Cut the grid region out of a full-window capture.
pub fn crop_region(shot: &RgbaImage, mapping: &GridMapping) -> PointClawResult<RgbaImage> {
    let window = mapping.window();
    if shot.width() == 0 || shot.height() == 0 {
        return Err(PointClawError::WindowUnavailable("captured an empty frame".into()));
    }

    let scaled;
    let source = if shot.dimensions() != (window.width, window.height) {
        tracing::debug!(
            captured = %format!("{}x{}", shot.width(), shot.height()),
            window = %format!("{}x{}", window.width, window.height),
            "rescaling capture to window size"
        );
        scaled = imageops::resize(shot, window.width, window.height, imageops::FilterType::Triangle);
        &scaled
    } else {
        shot
    };

    let region = mapping.region();
    let (ox, oy) = mapping.offset_in_window();
    Ok(imageops::crop_imm(source, ox, oy, region.width, region.height).to_image())
}

fn encode_png(img: RgbaImage) -> PointClawResult<Vec<u8>> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{CropMargins, WindowRect};

    struct SolidCapture {
        width: u32,
        height: u32,
    }

    impl ScreenCapture for SolidCapture {
        fn capture_window(&self, _id: u32) -> PointClawResult<RgbaImage> {
            let mut img = RgbaImage::from_pixel(self.width, self.height, image::Rgba([10, 20, 30, 255]));
            // Mark the crop corner so we can check the offset.
            img.put_pixel(8, 4, image::Rgba([255, 0, 0, 255]));
            Ok(img)
        }
    }

    struct GoneCapture;

    impl ScreenCapture for GoneCapture {
        fn capture_window(&self, id: u32) -> PointClawResult<RgbaImage> {
            Err(PointClawError::WindowUnavailable(format!("window {id} closed")))
        }
    }

    #[test]
    fn test_frame_is_cropped_to_grid_region() {
        let mapping = GridMapping::new(
            WindowRect::new(0, 0, 330, 250),
            CropMargins { top: 4, bottom: 0, left: 8, right: 0 },
            10,
            8,
        )
        .unwrap();
        let frame = capture_frame(&SolidCapture { width: 330, height: 250 }, 7, &mapping).unwrap();
        assert_eq!((frame.width, frame.height), (320, 240));

        let raw = image::load_from_memory(&frame.raw_png).unwrap().to_rgba8();
        assert_eq!(*raw.get_pixel(0, 0), image::Rgba([255, 0, 0, 255]));
        assert_ne!(frame.raw_png, frame.annotated_png);
        assert!(!frame.annotated_base64.is_empty());
    }

    #[test]
    fn test_hidpi_capture_is_rescaled() {
        let mapping =
            GridMapping::new(WindowRect::new(0, 0, 200, 100), CropMargins::default(), 4, 2).unwrap();
        let frame = capture_frame(&SolidCapture { width: 400, height: 200 }, 1, &mapping).unwrap();
        assert_eq!((frame.width, frame.height), (200, 100));
    }

    #[test]
    fn test_missing_window_propagates() {
        let mapping =
            GridMapping::new(WindowRect::new(0, 0, 200, 100), CropMargins::default(), 4, 2).unwrap();
        let err = capture_frame(&GoneCapture, 3, &mapping).unwrap_err();
        assert!(matches!(err, PointClawError::WindowUnavailable(_)));
    }
}
