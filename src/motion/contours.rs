use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use crate::frame::BoundingBox;

/// External boundary of one connected foreground region.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionRegion {
    /// Polygon area enclosed by the boundary points (pixel units squared).
    pub area: f64,
    pub bounds: BoundingBox,
}

/// Trace the outer borders of all top-level foreground regions.
///
/// Hole borders and regions nested inside holes are ignored.
pub fn external_regions(mask: &GrayImage) -> Vec<MotionRegion> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let bounds = bounding_box(&c.points)?;
            Some(MotionRegion {
                area: polygon_area(&c.points),
                bounds,
            })
        })
        .collect()
}

/// Regions whose area is strictly greater than `area_threshold`.
pub fn qualifying_regions(regions: &[MotionRegion], area_threshold: f64) -> Vec<BoundingBox> {
    regions
        .iter()
        .filter(|r| exceeds_noise_floor(r.area, area_threshold))
        .map(|r| r.bounds)
        .collect()
}

/// Tie-break: an area equal to the threshold is noise.
pub fn exceeds_noise_floor(area: f64, area_threshold: f64) -> bool {
    area > area_threshold
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        twice += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    twice.abs() as f64 / 2.0
}

fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(BoundingBox::new(
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32, value: u8) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([value]));
            }
        }
    }

    #[test]
    fn rectangle_area_follows_pixel_centres() {
        let mut mask = GrayImage::new(40, 40);
        fill(&mut mask, 5, 5, 11, 21, 255);
        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 200.0);
        assert_eq!(regions[0].bounds, BoundingBox::new(5, 5, 11, 21));
    }

    #[test]
    fn nested_regions_are_ignored() {
        let mut mask = GrayImage::new(50, 50);
        fill(&mut mask, 5, 5, 40, 40, 255);
        fill(&mut mask, 10, 10, 30, 30, 0);
        fill(&mut mask, 20, 20, 5, 5, 255);
        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounds, BoundingBox::new(5, 5, 40, 40));
    }

    #[test]
    fn threshold_is_strictly_greater() {
        assert!(!exceeds_noise_floor(500.0, 500.0));
        assert!(exceeds_noise_floor(500.5, 500.0));
        assert!(!exceeds_noise_floor(499.0, 500.0));
    }

    #[test]
    fn qualifying_regions_filters_small_blobs() {
        let mut mask = GrayImage::new(80, 80);
        fill(&mut mask, 2, 2, 3, 3, 255);
        fill(&mut mask, 20, 20, 30, 30, 255);
        let regions = external_regions(&mask);
        assert_eq!(regions.len(), 2);
        let boxes = qualifying_regions(&regions, 500.0);
        assert_eq!(boxes, vec![BoundingBox::new(20, 20, 30, 30)]);
    }

    #[test]
    fn polygon_area_of_degenerate_contours_is_zero() {
        assert_eq!(polygon_area(&[Point::new(1, 1)]), 0.0);
        assert_eq!(polygon_area(&[Point::new(1, 1), Point::new(4, 1)]), 0.0);
    }
}
