//! Pad-to-square and crop-back.
//!
//! Image models work on square inputs. Before a request, the scene (and its guide) is scaled to fit
//! a `size x size` canvas and centered with padding; the returned [`Letterbox`] records where the
//! content landed so the model's square result can be cut back to the original aspect ratio.
//!
//! The model is free to answer at a different resolution than the working size. [`Letterbox::crop`]
//! rescales the content rectangle to whatever square it receives.

use image::{Rgba, RgbaImage, imageops::FilterType};

use crate::{
    error::{WallprinterError, WallprinterResult},
    geometry::{PERCENT_MAX, PlacementArea, Point},
};

pub const DEFAULT_PAD_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Letterbox {
    pub size: u32,
    pub orig_width: u32,
    pub orig_height: u32,
    pub content_width: u32,
    pub content_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    pub fn fit(orig_width: u32, orig_height: u32, size: u32) -> WallprinterResult<Self> {
        if orig_width == 0 || orig_height == 0 {
            return Err(WallprinterError::validation("cannot letterbox a zero-size image"));
        }
        if size == 0 {
            return Err(WallprinterError::validation("working size must be > 0"));
        }

        let scale = f64::from(size) / f64::from(orig_width.max(orig_height));
        let content_width = scaled(orig_width, scale, size);
        let content_height = scaled(orig_height, scale, size);

        Ok(Self {
            size,
            orig_width,
            orig_height,
            content_width,
            content_height,
            offset_x: (size - content_width) / 2,
            offset_y: (size - content_height) / 2,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.orig_width == self.size && self.orig_height == self.size
    }

    /// Maps a polygon in percent of the original image into percent of the padded square.
    pub fn map_area(&self, area: &PlacementArea) -> PlacementArea {
        let size = f64::from(self.size);
        let (ox, oy) = (f64::from(self.offset_x), f64::from(self.offset_y));
        let (cw, ch) = (f64::from(self.content_width), f64::from(self.content_height));
        area.map_points(|p| {
            Point::new(
                (ox + p.x / PERCENT_MAX * cw) / size * PERCENT_MAX,
                (oy + p.y / PERCENT_MAX * ch) / size * PERCENT_MAX,
            )
        })
    }

    /// Cuts the content rectangle out of a model result and restores the original dimensions.
    pub fn crop(&self, result: &RgbaImage) -> WallprinterResult<RgbaImage> {
        let (rw, rh) = result.dimensions();
        if rw == 0 || rh == 0 {
            return Err(WallprinterError::image("model returned an empty image"));
        }

        let squared;
        let square = if rw == rh {
            result
        } else {
            let side = rw.max(rh);
            tracing::debug!(rw, rh, side, "model result is not square; stretching");
            squared = image::imageops::resize(result, side, side, FilterType::Lanczos3);
            &squared
        };

        let side = square.width();
        let ratio = f64::from(side) / f64::from(self.size);
        let x = ((f64::from(self.offset_x) * ratio).round() as u32).min(side - 1);
        let y = ((f64::from(self.offset_y) * ratio).round() as u32).min(side - 1);
        let w = ((f64::from(self.content_width) * ratio).round() as u32).clamp(1, side - x);
        let h = ((f64::from(self.content_height) * ratio).round() as u32).clamp(1, side - y);

        let content = image::imageops::crop_imm(square, x, y, w, h).to_image();
        if content.dimensions() == (self.orig_width, self.orig_height) {
            return Ok(content);
        }
        Ok(image::imageops::resize(
            &content,
            self.orig_width,
            self.orig_height,
            FilterType::Lanczos3,
        ))
    }
}

/// Scales `img` into a `size x size` canvas, centered, padding with `fill`.
pub fn pad_to_square(
    img: &RgbaImage,
    size: u32,
    fill: Rgba<u8>,
) -> WallprinterResult<(RgbaImage, Letterbox)> {
    let lb = Letterbox::fit(img.width(), img.height(), size)?;
    if lb.is_identity() {
        return Ok((img.clone(), lb));
    }

    let content = image::imageops::resize(
        img,
        lb.content_width,
        lb.content_height,
        FilterType::Lanczos3,
    );
    let mut canvas = RgbaImage::from_pixel(size, size, fill);
    image::imageops::replace(
        &mut canvas,
        &content,
        i64::from(lb.offset_x),
        i64::from(lb.offset_y),
    );
    Ok((canvas, lb))
}

fn scaled(v: u32, scale: f64, max: u32) -> u32 {
    ((f64::from(v) * scale).round() as u32).clamp(1, max)
}
