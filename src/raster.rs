use image::{GrayImage, Luma, Rgba, RgbaImage, imageops::FilterType};
use kurbo::Shape as _;

use crate::geometry::{PixelBounds, PlacementArea};

/// Calls `f(x, y)` for every pixel whose center lies inside `area` (nonzero winding).
pub fn for_each_covered(
    area: &PlacementArea,
    width: u32,
    height: u32,
    mut f: impl FnMut(u32, u32),
) -> Option<PixelBounds> {
    let bounds = area.pixel_bounds(width, height)?;
    let path = area.to_path(width, height);
    for y in bounds.y0..bounds.y1 {
        for x in bounds.x0..bounds.x1 {
            let center = kurbo::Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            if path.contains(center) {
                f(x, y);
            }
        }
    }
    Some(bounds)
}

pub fn coverage_mask(width: u32, height: u32, area: &PlacementArea) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for_each_covered(area, width, height, |x, y| {
        mask.put_pixel(x, y, Luma([255]));
    });
    mask
}

pub fn fill_polygon(img: &mut RgbaImage, area: &PlacementArea, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    for_each_covered(area, w, h, |x, y| {
        let d = img.get_pixel_mut(x, y);
        *d = over(*d, color);
    });
}

/// Stretches `src` over the polygon's bounding box and blends it in only where the polygon covers.
pub fn paste_clipped(dst: &mut RgbaImage, src: &RgbaImage, area: &PlacementArea) {
    let (w, h) = dst.dimensions();
    let Some(bounds) = area.pixel_bounds(w, h) else {
        return;
    };
    if src.width() == 0 || src.height() == 0 {
        return;
    }

    let fitted =
        image::imageops::resize(src, bounds.width(), bounds.height(), FilterType::Lanczos3);
    for_each_covered(area, w, h, |x, y| {
        let s = fitted.get_pixel(x - bounds.x0, y - bounds.y0);
        let d = dst.get_pixel_mut(x, y);
        *d = over(*d, *s);
    });
}

/// Source-over for straight (non-premultiplied) RGBA8.
pub fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    let da = div255(u32::from(dst[3]) * (255 - sa));
    let out_a = sa + da;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = u32::from(src[i]) * sa + u32::from(dst[i]) * da;
        out[i] = ((c + out_a / 2) / out_a).min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    Rgba(out)
}

fn div255(x: u32) -> u32 {
    (x + 127) / 255
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn triangle() -> PlacementArea {
        PlacementArea::new(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 100.0),
        ])
        .unwrap()
    }

    #[test]
    fn mask_of_default_area_is_exact_rectangle() {
        let mask = coverage_mask(40, 20, &PlacementArea::default());
        let covered = mask.pixels().filter(|p| p.0[0] == 255).count();
        assert_eq!(covered, 20 * 10);
        assert_eq!(mask.get_pixel(10, 5).0[0], 255);
        assert_eq!(mask.get_pixel(29, 14).0[0], 255);
        assert_eq!(mask.get_pixel(30, 5).0[0], 0);
        assert_eq!(mask.get_pixel(9, 5).0[0], 0);
    }

    #[test]
    fn triangle_covers_upper_left_half() {
        let mask = coverage_mask(10, 10, &triangle());
        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(9, 9).0[0], 0);
        let covered = mask.pixels().filter(|p| p.0[0] == 255).count();
        assert!((40..=55).contains(&covered), "covered={covered}");
    }

    #[test]
    fn zero_area_polygon_covers_nothing() {
        let line = PlacementArea::new(vec![
            Point::new(10.0, 10.0),
            Point::new(90.0, 50.0),
            Point::new(50.0, 30.0),
        ])
        .unwrap();
        let mask = coverage_mask(32, 32, &line);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn self_intersecting_star_fills_by_nonzero_winding() {
        let star = PlacementArea::parse("50,0 79,90 3,35 97,35 21,90").unwrap();
        let mask = coverage_mask(100, 100, &star);
        // The inner pentagon is wound twice; even-odd would leave it empty.
        assert_eq!(mask.get_pixel(50, 50).0[0], 255);
        assert_eq!(mask.get_pixel(50, 10).0[0], 255);
        assert_eq!(mask.get_pixel(50, 80).0[0], 0);
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn over_edge_cases() {
        let dst = Rgba([10, 20, 30, 255]);
        assert_eq!(over(dst, Rgba([200, 200, 200, 0])), dst);
        assert_eq!(over(dst, Rgba([1, 2, 3, 255])), Rgba([1, 2, 3, 255]));
        assert_eq!(
            over(Rgba([0, 0, 0, 0]), Rgba([100, 110, 120, 128])),
            Rgba([100, 110, 120, 128])
        );
        let half = over(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(half[3], 255);
        assert!((127..=129).contains(&half[0]));
    }

    #[test]
    fn fill_only_touches_covered_pixels() {
        let mut img = RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255]));
        fill_polygon(&mut img, &PlacementArea::default(), Rgba([255, 0, 255, 255]));
        assert_eq!(img.get_pixel(20, 10), &Rgba([255, 0, 255, 255]));
        assert_eq!(img.get_pixel(2, 2), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn paste_stretches_source_over_bounds() {
        let mut dst = RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(3, 7, Rgba([10, 200, 30, 255]));
        paste_clipped(&mut dst, &src, &PlacementArea::default());
        assert_eq!(dst.get_pixel(10, 5), &Rgba([10, 200, 30, 255]));
        assert_eq!(dst.get_pixel(29, 14), &Rgba([10, 200, 30, 255]));
        assert_eq!(dst.get_pixel(35, 18), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn paste_respects_polygon_clip() {
        let mut dst = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        paste_clipped(&mut dst, &src, &triangle());
        assert_eq!(dst.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(dst.get_pixel(9, 9), &Rgba([0, 0, 0, 255]));
    }
}
