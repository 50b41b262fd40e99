use image::RgbaImage;

use super::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn normalize(start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Self {
        let x = start_x.min(end_x);
        let y = start_y.min(end_y);
        let width = (start_x - end_x).unsigned_abs();
        let height = (start_y - end_y).unsigned_abs();
        Self { x, y, width, height }
    }

    /// Shrinks the rectangle to fit inside a `width` x `height` image.
    /// Returns `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rectangle> {
        let left = i64::from(self.x).max(0);
        let top = i64::from(self.y).max(0);
        let right = (i64::from(self.x) + i64::from(self.width)).min(i64::from(width));
        let bottom = (i64::from(self.y) + i64::from(self.height)).min(i64::from(height));
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rectangle {
            x: left as i32,
            y: top as i32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// Cuts `region` out of a monitor image. Parts outside the monitor are dropped.
pub(super) fn crop(image: RgbaImage, region: Rectangle) -> Result<RgbaImage, CaptureError> {
    let (width, height) = image.dimensions();
    let area = region
        .clamp_to(width, height)
        .ok_or_else(|| CaptureError::InvalidFrame(format!("region {:?} is off screen", region)))?;
    if area.width == width && area.height == height {
        return Ok(image);
    }
    Ok(image::imageops::crop_imm(&image, area.x as u32, area.y as u32, area.width, area.height).to_image())
}
