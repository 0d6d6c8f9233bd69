//! Morphology with disc-like structuring elements.
//!
//! imageproc only offers diamond (`L1`) and square (`LInf`) elements. A disc
//! of radius `r` is approximated by the union of the diamond of radius `r`
//! and the square of radius `r - 1`; for a 3-pixel kernel this is exactly the
//! 3x3 cross.

use image::GrayImage;
use imageproc::{
    distance_transform::Norm,
    morphology::{dilate, erode},
};

use crate::config::kernel_radius;

pub fn dilate_disc(image: &GrayImage, size: u32) -> GrayImage {
    let radius = kernel_radius(size);
    if radius == 0 {
        return image.clone();
    }
    let mut out = dilate(image, Norm::L1, radius);
    if radius > 1 {
        let square = dilate(image, Norm::LInf, radius - 1);
        combine(&mut out, &square, u8::max);
    }
    out
}

pub fn erode_disc(image: &GrayImage, size: u32) -> GrayImage {
    let radius = kernel_radius(size);
    if radius == 0 {
        return image.clone();
    }
    let mut out = erode(image, Norm::L1, radius);
    if radius > 1 {
        let square = erode(image, Norm::LInf, radius - 1);
        combine(&mut out, &square, u8::min);
    }
    out
}

/// Dilation followed by erosion.
pub fn close_disc(image: &GrayImage, size: u32) -> GrayImage {
    erode_disc(&dilate_disc(image, size), size)
}

/// Erosion followed by dilation.
pub fn open_disc(image: &GrayImage, size: u32) -> GrayImage {
    dilate_disc(&erode_disc(image, size), size)
}

fn combine(out: &mut GrayImage, other: &GrayImage, op: fn(u8, u8) -> u8) {
    for (pixel, extra) in out.pixels_mut().zip(other.pixels()) {
        pixel.0[0] = op(pixel.0[0], extra.0[0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn dot(size: u32) -> GrayImage {
        let mut image = GrayImage::new(size, size);
        image.put_pixel(size / 2, size / 2, Luma([255]));
        image
    }

    fn lit(image: &GrayImage) -> Vec<(u32, u32)> {
        image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] != 0)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn three_pixel_kernel_is_a_cross() {
        let grown = dilate_disc(&dot(5), 3);
        assert_eq!(lit(&grown), vec![(2, 1), (1, 2), (2, 2), (3, 2), (2, 3)]);
    }

    #[test]
    fn seven_pixel_kernel_is_rounder_than_a_square() {
        let grown = dilate_disc(&dot(9), 7);
        let count = lit(&grown).len();
        // between the 25-pixel diamond and the 49-pixel square
        assert_eq!(count, 33);
        assert!(grown.get_pixel(4, 1).0[0] != 0);
        assert!(grown.get_pixel(1, 1).0[0] == 0);
    }

    #[test]
    fn unit_kernel_is_identity() {
        let image = dot(5);
        assert_eq!(dilate_disc(&image, 1), image);
        assert_eq!(close_disc(&image, 1), image);
    }

    #[test]
    fn opening_removes_specks_closing_fills_gaps() {
        let speck = dot(9);
        assert!(lit(&open_disc(&speck, 3)).is_empty());

        let mut bar = GrayImage::new(12, 5);
        for x in 1..11 {
            if x != 6 {
                bar.put_pixel(x, 2, Luma([255]));
            }
        }
        assert!(close_disc(&bar, 3).get_pixel(6, 2).0[0] != 0);
    }
}
