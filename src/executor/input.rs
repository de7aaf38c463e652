use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

use crate::errors::{PointClawError, PointClawResult};
use crate::perception::types::ScreenPoint;

/// Physical mouse. Implementations may be bound to the thread that created them.
pub trait MouseDriver {
    /// Move to an absolute screen point and left-click.
    fn click_at(&mut self, point: ScreenPoint) -> PointClawResult<()>;
}

pub struct EnigoMouse {
    enigo: Enigo,
}

impl EnigoMouse {
    pub fn new() -> PointClawResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| PointClawError::Executor(format!("input backend unavailable: {e}")))?;
        Ok(Self { enigo })
    }
}

impl MouseDriver for EnigoMouse {
    fn click_at(&mut self, point: ScreenPoint) -> PointClawResult<()> {
        self.enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(|e| PointClawError::Executor(format!("move to {point}: {e}")))?;
        self.enigo
            .button(Button::Left, Direction::Click)
            .map_err(|e| PointClawError::Executor(format!("click at {point}: {e}")))?;
        tracing::debug!(x = point.x, y = point.y, "mouse click");
        Ok(())
    }
}
