/// Pre-click checks that keep input inside the game window.
use crate::errors::{PointClawError, PointClawResult};
use crate::perception::types::{ScreenPoint, WindowRect};
use crate::perception::window::WindowSource;

/// The window must still exist, be visible and sit where the grid was laid out.
/// A moved or resized window would send clicks to stale coordinates.
pub fn verify_window(windows: &dyn WindowSource, window_id: u32, expected: WindowRect) -> PointClawResult<()> {
    let current = windows.window_rect(window_id)?;
    if current != expected {
        return Err(PointClawError::WindowUnavailable(format!(
            "window {window_id} moved or resized: expected {expected:?}, now {current:?}"
        )));
    }
    Ok(())
}

pub fn ensure_inside(point: ScreenPoint, window: WindowRect) -> PointClawResult<()> {
    if window.contains(point) {
        Ok(())
    } else {
        Err(PointClawError::OutOfBounds { x: point.x, y: point.y })
    }
}
