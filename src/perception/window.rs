/// Window enumeration and screen capture backed by `xcap`.
use image::RgbaImage;

use crate::errors::{PointClawError, PointClawResult};
use crate::perception::types::{WindowInfo, WindowRect};

/// Enumerates top-level windows and re-queries their geometry.
pub trait WindowSource: Send + Sync {
    fn list_windows(&self) -> PointClawResult<Vec<WindowInfo>>;

    /// Current rect of window `id`. Fails with `WindowUnavailable` when the
    /// window was closed or minimized.
    fn window_rect(&self, id: u32) -> PointClawResult<WindowRect>;
}

/// Grabs the pixels of one window.
pub trait ScreenCapture: Send + Sync {
    /// Full-window image. Fails with `WindowUnavailable` when the window is gone.
    fn capture_window(&self, id: u32) -> PointClawResult<RgbaImage>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XcapWindows;

impl XcapWindows {
    fn find(id: u32) -> PointClawResult<xcap::Window> {
        let windows = xcap::Window::all()
            .map_err(|e| PointClawError::Perception(format!("enumerate windows: {e}")))?;
        windows
            .into_iter()
            .find(|w| w.id() == id)
            .ok_or_else(|| PointClawError::WindowUnavailable(format!("window {id} no longer exists")))
    }
}

impl WindowSource for XcapWindows {
    fn list_windows(&self) -> PointClawResult<Vec<WindowInfo>> {
        let windows = xcap::Window::all()
            .map_err(|e| PointClawError::Perception(format!("enumerate windows: {e}")))?;
        let infos = windows
            .iter()
            .filter(|w| !w.is_minimized() && !w.title().trim().is_empty())
            .map(|w| WindowInfo {
                id: w.id(),
                title: w.title().to_string(),
                rect: WindowRect::new(w.x(), w.y(), w.width(), w.height()),
            })
            .collect::<Vec<_>>();
        tracing::debug!(count = infos.len(), "windows enumerated");
        Ok(infos)
    }

    fn window_rect(&self, id: u32) -> PointClawResult<WindowRect> {
        let window = Self::find(id)?;
        if window.is_minimized() {
            return Err(PointClawError::WindowUnavailable(format!("window {id} is minimized")));
        }
        if window.width() == 0 || window.height() == 0 {
            return Err(PointClawError::WindowUnavailable(format!("window {id} has no visible area")));
        }
        Ok(WindowRect::new(window.x(), window.y(), window.width(), window.height()))
    }
}

impl ScreenCapture for XcapWindows {
    fn capture_window(&self, id: u32) -> PointClawResult<RgbaImage> {
        let window = Self::find(id)?;
        if window.is_minimized() {
            return Err(PointClawError::WindowUnavailable(format!("window {id} is minimized")));
        }
        let shot = window
            .capture_image()
            .map_err(|e| PointClawError::WindowUnavailable(format!("capture window {id}: {e}")))?;
        let (w, h) = (shot.width(), shot.height());
        // Rebuild through raw bytes so xcap's `image` version never leaks into our types.
        RgbaImage::from_raw(w, h, shot.into_raw())
            .ok_or_else(|| PointClawError::Perception("capture buffer size mismatch".into()))
    }
}

/// Pick the first window whose title contains `needle` (case-insensitive).
pub fn find_by_title<'a>(windows: &'a [WindowInfo], needle: &str) -> Option<&'a WindowInfo> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    windows
        .iter()
        .find(|w| w.title.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u32, title: &str) -> WindowInfo {
        WindowInfo {
            id,
            title: title.into(),
            rect: WindowRect::new(0, 0, 640, 480),
        }
    }

    #[test]
    fn test_find_by_title_is_case_insensitive_substring() {
        let windows = vec![info(1, "Terminal"), info(2, "ScummVM - Maniac Mansion"), info(3, "Maniac Mansion (copy)")];
        assert_eq!(find_by_title(&windows, "maniac mansion").map(|w| w.id), Some(2));
        assert_eq!(find_by_title(&windows, "Monkey Island"), None);
        assert_eq!(find_by_title(&windows, "  "), None);
    }
}
