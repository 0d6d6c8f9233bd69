//! Interlocking outlines.
//!
//! Outlines drawn across each other merge into one ink component enclosing
//! several faces. Each face is grown into the surrounding ink so every stroke
//! pixel belongs to its nearest face. A figure is then a maximal set of
//! adjacent faces whose union is convex; faces left out of every convex union
//! stand on their own.

use std::collections::VecDeque;

use geo::{Area, ConvexHull};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
    contours::{find_contours, BorderType},
    drawing::draw_polygon_mut,
    point::Point,
};

use crate::{
    algorithms::simplification::{ring_area, ring_polygon},
    config::ShapeConfig,
};

/// Most faces a component may enclose before its subsets stop being enumerated.
pub const MAX_FACES: usize = 8;

/// Label image of 8-connected ink components.
pub type ComponentLabels = ImageBuffer<Luma<u32>, Vec<u32>>;

#[derive(Debug, Clone)]
pub struct FaceSplitter {
    /// Area over convex-hull area above which a union of faces is one figure
    pub solidity_min: f64,
    pub max_faces: usize,
    /// Faces smaller than this fraction of the image are ignored
    pub face_area_min_ratio: f64,
}

impl Default for FaceSplitter {
    fn default() -> Self {
        Self::from_config(&ShapeConfig::default())
    }
}

#[derive(Debug, Clone)]
struct Region {
    faces: u32,
    ring: Vec<[f64; 2]>,
}

impl FaceSplitter {
    pub fn from_config(config: &ShapeConfig) -> Self {
        Self {
            solidity_min: config.solidity_min,
            max_faces: config.max_faces.min(MAX_FACES),
            face_area_min_ratio: config.area_min_ratio,
        }
    }

    /// Rings of the figures interlocked in one component, or `None` when the
    /// component reads as a single figure.
    ///
    /// `outer` is the component's outer border and `holes` its hole borders,
    /// all traced on `binary`; `labels` are the components of `binary`.
    pub fn split(
        &self,
        binary: &GrayImage,
        labels: &ComponentLabels,
        outer: &[Point<i32>],
        holes: &[&[Point<i32>]],
    ) -> Option<Vec<Vec<[f64; 2]>>> {
        if holes.len() < 2 {
            return None;
        }
        let start = outer.first()?;
        let component = labels.get_pixel(start.x as u32, start.y as u32).0[0];
        let frame = Frame::around(outer)?;
        let min_cells = (self.face_area_min_ratio * binary.width() as f64 * binary.height() as f64).max(1.0);

        let mut owner: Vec<Option<usize>> = vec![None; frame.len()];
        let mut queue = VecDeque::new();
        let mut faces = 0usize;
        for hole in holes {
            let cells: Vec<usize> = frame
                .face_cells(binary, hole)
                .into_iter()
                .filter(|&cell| owner[cell].is_none())
                .collect();
            if (cells.len() as f64) < min_cells {
                continue;
            }
            if faces >= self.max_faces {
                return None;
            }
            for &cell in &cells {
                owner[cell] = Some(faces);
                queue.push_back(cell);
            }
            faces += 1;
        }
        if faces < 2 {
            return None;
        }

        // breadth-first from every face at once: each ink pixel joins the nearest face
        while let Some(cell) = queue.pop_front() {
            let face = owner[cell];
            for next in frame.neighbors(cell) {
                if owner[next].is_none() && frame.label(labels, next) == component {
                    owner[next] = face;
                    queue.push_back(next);
                }
            }
        }

        let mut adjacent = vec![0u32; faces];
        for cell in 0..frame.len() {
            let Some(a) = owner[cell] else { continue };
            for next in frame.neighbors(cell) {
                if let Some(b) = owner[next] {
                    if a != b {
                        adjacent[a] |= 1 << b;
                    }
                }
            }
        }

        let full = (1u32 << faces) - 1;
        let mut singles = Vec::new();
        let mut convex = Vec::new();
        for set in 1..=full {
            if !is_connected(set, &adjacent) {
                continue;
            }
            let Some(ring) = frame.region_ring(&owner, set) else { continue };
            let region = Region { faces: set, ring };
            if solidity(&region.ring) >= self.solidity_min {
                convex.push(region.clone());
            }
            if set.count_ones() == 1 {
                singles.push(region);
            }
        }

        let mut figures: Vec<Region> = convex
            .iter()
            .filter(|region| {
                !convex
                    .iter()
                    .any(|other| other.faces != region.faces && other.faces & region.faces == region.faces)
            })
            .cloned()
            .collect();
        if figures.iter().any(|figure| figure.faces == full) {
            return None;
        }
        let covered = figures.iter().fold(0u32, |acc, figure| acc | figure.faces);
        figures.extend(singles.into_iter().filter(|single| covered & single.faces == 0));

        if figures.len() < 2 {
            return None;
        }
        Some(figures.into_iter().map(|figure| figure.ring).collect())
    }
}

/// Area over convex-hull area; 0 for degenerate rings.
pub fn solidity(ring: &[[f64; 2]]) -> f64 {
    let hull = ring_polygon(ring).convex_hull().unsigned_area();
    if hull <= 0.0 { 0.0 } else { ring_area(ring) / hull }
}

/// Whether the faces in `set` form one connected group.
fn is_connected(set: u32, adjacent: &[u32]) -> bool {
    let mut reached = set & set.wrapping_neg();
    loop {
        let mut grown = reached;
        for (face, neighbours) in adjacent.iter().enumerate() {
            if reached & (1 << face) != 0 {
                grown |= neighbours & set;
            }
        }
        if grown == reached {
            return reached == set;
        }
        reached = grown;
    }
}

/// Bounding box of one component, with cells indexed row by row.
#[derive(Debug, Clone, Copy)]
struct Frame {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
}

impl Frame {
    fn around(points: &[Point<i32>]) -> Option<Self> {
        let x0 = points.iter().map(|p| p.x).min()?.max(0);
        let y0 = points.iter().map(|p| p.y).min()?.max(0);
        let x1 = points.iter().map(|p| p.x).max()?;
        let y1 = points.iter().map(|p| p.y).max()?;
        if x1 < x0 || y1 < y0 {
            return None;
        }
        Some(Self {
            x0: x0 as u32,
            y0: y0 as u32,
            width: (x1 - x0 + 1) as u32,
            height: (y1 - y0 + 1) as u32,
        })
    }

    fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn label(&self, labels: &ComponentLabels, cell: usize) -> u32 {
        let x = self.x0 + (cell % self.width as usize) as u32;
        let y = self.y0 + (cell / self.width as usize) as u32;
        labels.get_pixel(x, y).0[0]
    }

    fn neighbors(&self, cell: usize) -> impl Iterator<Item = usize> {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x, y) = (cell as i64 % w, cell as i64 / w);
        (-1i64..=1)
            .flat_map(|dy| (-1i64..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .filter_map(move |(dx, dy)| {
                let (nx, ny) = (x + dx, y + dy);
                (nx >= 0 && ny >= 0 && nx < w && ny < h).then(|| (ny * w + nx) as usize)
            })
    }

    /// Paper cells enclosed by one hole border.
    fn face_cells(&self, binary: &GrayImage, hole: &[Point<i32>]) -> Vec<usize> {
        let mut points: Vec<Point<i32>> = hole
            .iter()
            .map(|p| Point::new(p.x - self.x0 as i32, p.y - self.y0 as i32))
            .collect();
        points.dedup();
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            return Vec::new();
        }
        let mut mask = GrayImage::new(self.width, self.height);
        draw_polygon_mut(&mut mask, &points, Luma([255]));
        mask.enumerate_pixels()
            .filter(|(x, y, p)| p.0[0] != 0 && binary.get_pixel(self.x0 + x, self.y0 + y).0[0] == 0)
            .map(|(x, y, _)| y as usize * self.width as usize + x as usize)
            .collect()
    }

    /// Outer border of the union of the faces in `set`, in image coordinates.
    fn region_ring(&self, owner: &[Option<usize>], set: u32) -> Option<Vec<[f64; 2]>> {
        let mask = GrayImage::from_fn(self.width, self.height, |x, y| {
            let cell = y as usize * self.width as usize + x as usize;
            let inside = owner[cell].is_some_and(|face| set & (1 << face) != 0);
            Luma([if inside { 255 } else { 0 }])
        });
        find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| {
                c.points
                    .iter()
                    .map(|p| [(p.x + self.x0 as i32) as f64, (p.y + self.y0 as i32) as f64])
                    .collect::<Vec<[f64; 2]>>()
            })
            .max_by(|a, b| ring_area(a).total_cmp(&ring_area(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::extraction::{ink_mask, paper, ImageprocContourExtractor};
    use crate::traits::ContourExtractor;
    use imageproc::drawing::draw_hollow_rect_mut;
    use imageproc::rect::Rect;

    fn outline(canvas: &mut GrayImage, x: i32, y: i32, side: u32) {
        for inset in 0..4 {
            draw_hollow_rect_mut(
                canvas,
                Rect::at(x + inset, y + inset).of_size(side - 2 * inset as u32, side - 2 * inset as u32),
                Luma([0]),
            );
        }
    }

    fn squares_across(offset: i32) -> GrayImage {
        let mut canvas = paper(140, 140);
        outline(&mut canvas, 20, 20, 70);
        outline(&mut canvas, 20 + offset, 20 + offset, 70);
        ink_mask(&canvas, 0.0)
    }

    fn bounds(ring: &[[f64; 2]]) -> [f64; 4] {
        ring.iter().fold(
            [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            |[x0, y0, x1, y1], &[x, y]| [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
        )
    }

    #[test]
    fn crossing_squares_come_apart() {
        let rings = ImageprocContourExtractor::default()
            .extract_contours(&squares_across(30))
            .expect("Should trace");
        assert_eq!(rings.len(), 2);

        let mut boxes: Vec<[f64; 4]> = rings.iter().map(|r| bounds(r)).collect();
        boxes.sort_by(|a, b| a[0].total_cmp(&b[0]));
        for (bbox, start) in boxes.iter().zip([20.0, 50.0]) {
            assert!((bbox[0] - start).abs() <= 3.0, "{bbox:?}");
            assert!((bbox[1] - start).abs() <= 3.0, "{bbox:?}");
            assert!((bbox[2] - (start + 69.0)).abs() <= 3.0, "{bbox:?}");
        }
        for ring in &rings {
            assert!(solidity(ring) > 0.94);
        }
    }

    #[test]
    fn single_loop_stays_whole() {
        let mut canvas = paper(100, 100);
        outline(&mut canvas, 20, 20, 60);
        let rings = ImageprocContourExtractor::default()
            .extract_contours(&ink_mask(&canvas, 0.0))
            .expect("Should trace");
        assert_eq!(rings.len(), 1);
    }

    #[test]
    fn convex_subdivision_stays_whole() {
        // a square cut in half by a bar is still one figure
        let mut canvas = paper(100, 100);
        outline(&mut canvas, 20, 20, 60);
        for x in 48..52 {
            for y in 20..80 {
                canvas.put_pixel(x, y, Luma([0]));
            }
        }
        let rings = ImageprocContourExtractor::default()
            .extract_contours(&ink_mask(&canvas, 0.0))
            .expect("Should trace");
        assert_eq!(rings.len(), 1);
    }

    #[test]
    fn disabled_splitter_keeps_the_component() {
        let mut extractor = ImageprocContourExtractor::default();
        extractor.faces.max_faces = 1;
        let rings = extractor.extract_contours(&squares_across(30)).expect("Should trace");
        assert_eq!(rings.len(), 1);
    }

    #[test]
    fn face_groups_must_touch() {
        assert!(is_connected(0b011, &[0b010, 0b101, 0b010]));
        assert!(!is_connected(0b101, &[0b010, 0b101, 0b010]));
        assert!(is_connected(0b111, &[0b010, 0b101, 0b010]));
    }

    #[test]
    fn solidity_of_an_l_shape() {
        let square = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        assert!((solidity(&square) - 1.0).abs() < 1e-9);
        let ell = [[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [5.0, 5.0], [5.0, 10.0], [0.0, 10.0]];
        assert!((solidity(&ell) - 75.0 / 87.5).abs() < 1e-9);
        assert_eq!(solidity(&[[0.0, 0.0], [1.0, 1.0]]), 0.0);
    }
}
