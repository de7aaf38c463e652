/// Grid mapping between cell numbers and screen pixels.
///
/// The cropped window area is divided into `columns × rows` equally sized
/// cells. Cells are numbered from 1, left to right, top to bottom. Pixels left
/// over by the integer division (a strip at the right and/or bottom edge) are
/// not addressable and are not sent to the model.
use serde::{Deserialize, Serialize};

use crate::errors::{PointClawError, PointClawResult};
use crate::perception::types::{CropMargins, ScreenPoint, WindowRect};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMapping {
    window: WindowRect,
    crop: CropMargins,
    columns: u32,
    rows: u32,
    cell_width: u32,
    cell_height: u32,
}

impl GridMapping {
    pub fn new(
        window: WindowRect,
        crop: CropMargins,
        columns: u32,
        rows: u32,
    ) -> PointClawResult<Self> {
        if columns == 0 || rows == 0 {
            return Err(PointClawError::Config("grid needs at least one column and row".into()));
        }
        if crop.left > i32::MAX as u32 || crop.top > i32::MAX as u32 {
            return Err(PointClawError::Config(format!(
                "crop offset {}x{} is outside the screen coordinate range",
                crop.left, crop.top
            )));
        }
        let inner_w = crop
            .left
            .checked_add(crop.right)
            .and_then(|margin| window.width.checked_sub(margin))
            .filter(|w| *w > 0)
            .ok_or_else(|| {
                PointClawError::Config(format!(
                    "horizontal crop {}+{} consumes window width {}",
                    crop.left, crop.right, window.width
                ))
            })?;
        let inner_h = crop
            .top
            .checked_add(crop.bottom)
            .and_then(|margin| window.height.checked_sub(margin))
            .filter(|h| *h > 0)
            .ok_or_else(|| {
                PointClawError::Config(format!(
                    "vertical crop {}+{} consumes window height {}",
                    crop.top, crop.bottom, window.height
                ))
            })?;

        let cell_width = inner_w / columns;
        let cell_height = inner_h / rows;
        if cell_width == 0 || cell_height == 0 {
            return Err(PointClawError::Config(format!(
                "{columns}x{rows} grid does not fit a {inner_w}x{inner_h} region"
            )));
        }

        Ok(Self {
            window,
            crop,
            columns,
            rows,
            cell_width,
            cell_height,
        })
    }

    pub fn window(&self) -> WindowRect {
        self.window
    }

    pub fn crop(&self) -> CropMargins {
        self.crop
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.cell_height)
    }

    pub fn cell_count(&self) -> u32 {
        self.columns * self.rows
    }

    /// The addressable region in screen coordinates.
    pub fn region(&self) -> WindowRect {
        WindowRect {
            x: self.window.x + self.crop.left as i32,
            y: self.window.y + self.crop.top as i32,
            width: self.columns * self.cell_width,
            height: self.rows * self.cell_height,
        }
    }

    /// Offset of the region inside a capture of the whole window.
    pub fn offset_in_window(&self) -> (u32, u32) {
        (self.crop.left, self.crop.top)
    }

    /// Screen rectangle of a cell.
    pub fn cell_rect(&self, index: u32) -> PointClawResult<WindowRect> {
        if index == 0 || index > self.cell_count() {
            return Err(PointClawError::OutOfRange {
                index,
                max: self.cell_count(),
            });
        }
        let zero_based = index - 1;
        let col = zero_based % self.columns;
        let row = zero_based / self.columns;
        let region = self.region();
        Ok(WindowRect {
            x: region.x + (col * self.cell_width) as i32,
            y: region.y + (row * self.cell_height) as i32,
            width: self.cell_width,
            height: self.cell_height,
        })
    }

    /// Centre of a cell in screen coordinates.
    pub fn cell_to_pixel(&self, index: u32) -> PointClawResult<ScreenPoint> {
        let rect = self.cell_rect(index)?;
        Ok(ScreenPoint {
            x: rect.x + (rect.width / 2) as i32,
            y: rect.y + (rect.height / 2) as i32,
        })
    }

    /// Cell containing a screen point.
    pub fn pixel_to_cell(&self, point: ScreenPoint) -> PointClawResult<u32> {
        let region = self.region();
        if !region.contains(point) {
            return Err(PointClawError::OutOfBounds {
                x: point.x,
                y: point.y,
            });
        }
        let col = (point.x - region.x) as u32 / self.cell_width;
        let row = (point.y - region.y) as u32 / self.cell_height;
        Ok(row * self.columns + col + 1)
    }

    /// Convert a pixel of the transmitted image (origin at the region's
    /// top-left corner) to a screen point. Out-of-region pixels are rejected,
    /// never clamped.
    pub fn image_to_screen(&self, x: i64, y: i64) -> PointClawResult<ScreenPoint> {
        let region = self.region();
        let out_of_bounds = || PointClawError::OutOfBounds {
            x: x.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            y: y.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        };
        if x < 0 || y < 0 || x >= region.width as i64 || y >= region.height as i64 {
            return Err(out_of_bounds());
        }
        let point = ScreenPoint {
            x: region.x + x as i32,
            y: region.y + y as i32,
        };
        if !self.window.contains(point) {
            return Err(out_of_bounds());
        }
        Ok(point)
    }
}
