//! Guide images: the spatial hint sent to the model next to the untouched scene.

use image::{Rgba, RgbaImage};

use crate::{
    error::{WallprinterError, WallprinterResult},
    geometry::PlacementArea,
    raster,
};

pub const DEFAULT_FILL: Rgba<u8> = Rgba([255, 0, 255, 255]);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuideMode {
    /// Artwork stretched over the area's bounding box, clipped to the polygon.
    #[default]
    Paste,
    /// Polygon filled with a flat color on top of the scene.
    Fill { color: [u8; 4] },
    /// White polygon on black.
    Mask,
}

impl GuideMode {
    pub fn fill() -> Self {
        Self::Fill {
            color: DEFAULT_FILL.0,
        }
    }

    pub fn needs_artwork(&self) -> bool {
        matches!(self, Self::Paste)
    }
}

#[tracing::instrument(skip_all, fields(w = scene.width(), h = scene.height(), mode = ?mode))]
pub fn render_guide(
    scene: &RgbaImage,
    artwork: Option<&RgbaImage>,
    area: &PlacementArea,
    mode: GuideMode,
) -> WallprinterResult<RgbaImage> {
    let (w, h) = scene.dimensions();
    if w == 0 || h == 0 {
        return Err(WallprinterError::validation("scene image has zero size"));
    }

    match mode {
        GuideMode::Paste => {
            let artwork = artwork.ok_or_else(|| {
                WallprinterError::validation("paste guide requires an artwork image")
            })?;
            if artwork.width() == 0 || artwork.height() == 0 {
                return Err(WallprinterError::validation("artwork image has zero size"));
            }
            let mut out = scene.clone();
            raster::paste_clipped(&mut out, artwork, area);
            Ok(out)
        }
        GuideMode::Fill { color } => {
            let mut out = scene.clone();
            raster::fill_polygon(&mut out, area, Rgba(color));
            Ok(out)
        }
        GuideMode::Mask => {
            let mask = raster::coverage_mask(w, h, area);
            let out = RgbaImage::from_fn(w, h, |x, y| {
                let v = mask.get_pixel(x, y).0[0];
                Rgba([v, v, v, 255])
            });
            Ok(out)
        }
    }
}

/// Parses `#RRGGBB`, `RRGGBB`, or `#RRGGBBAA`.
pub fn parse_hex_color(s: &str) -> WallprinterResult<Rgba<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(WallprinterError::validation(format!(
            "expected #RRGGBB or #RRGGBBAA, got '{s}'"
        )));
    }
    let byte = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| WallprinterError::validation(format!("bad hex color '{s}'")))
    };
    let a = if hex.len() == 8 { byte(6)? } else { 255 };
    Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, a]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> RgbaImage {
        RgbaImage::from_pixel(40, 20, Rgba([50, 50, 50, 255]))
    }

    #[test]
    fn paste_requires_artwork() {
        let err = render_guide(&scene(), None, &PlacementArea::default(), GuideMode::Paste)
            .unwrap_err();
        assert!(err.to_string().contains("requires an artwork"));
    }

    #[test]
    fn paste_keeps_scene_outside_area() {
        let art = RgbaImage::from_pixel(8, 8, Rgba([200, 10, 10, 255]));
        let out = render_guide(
            &scene(),
            Some(&art),
            &PlacementArea::default(),
            GuideMode::Paste,
        )
        .unwrap();
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(out.get_pixel(20, 10), &Rgba([200, 10, 10, 255]));
        assert_eq!(out.get_pixel(1, 1), &Rgba([50, 50, 50, 255]));
    }

    #[test]
    fn fill_ignores_artwork() {
        let out = render_guide(&scene(), None, &PlacementArea::default(), GuideMode::fill())
            .unwrap();
        assert_eq!(out.get_pixel(20, 10), &DEFAULT_FILL);
    }

    #[test]
    fn mask_is_black_and_white() {
        let out =
            render_guide(&scene(), None, &PlacementArea::default(), GuideMode::Mask).unwrap();
        assert_eq!(out.get_pixel(20, 10), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn zero_scene_rejected() {
        let empty = RgbaImage::new(0, 0);
        assert!(render_guide(&empty, None, &PlacementArea::default(), GuideMode::Mask).is_err());
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#ff00ff").unwrap(), Rgba([255, 0, 255, 255]));
        assert_eq!(parse_hex_color("00ff0080").unwrap(), Rgba([0, 255, 0, 128]));
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }

    #[test]
    fn mode_serde_shape() {
        let json = serde_json::to_string(&GuideMode::fill()).unwrap();
        assert_eq!(json, r#"{"kind":"fill","color":[255,0,255,255]}"#);
        let back: GuideMode = serde_json::from_str(r#"{"kind":"mask"}"#).unwrap();
        assert_eq!(back, GuideMode::Mask);
    }
}
