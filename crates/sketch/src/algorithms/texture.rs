use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::debug;

use crate::{
    config::{TextureConfig, TextureMapping},
    report::{clamp_score, TextureReport},
};

const ORIENTATION_BINS: usize = 9;
const BLOCK_CELLS: usize = 2;

/// Oriented-gradient block descriptors of one canvas.
///
/// Blocks without any gradient energy are skipped so blank paper does not
/// dominate the vocabulary.
pub fn gradient_descriptors(image: &GrayImage, cell: u32) -> Vec<Vec<f64>> {
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);
    let cells_x = (image.width() / cell) as usize;
    let cells_y = (image.height() / cell) as usize;
    if cells_x < BLOCK_CELLS || cells_y < BLOCK_CELLS {
        return Vec::new();
    }

    let mut histograms = vec![[0.0f64; ORIENTATION_BINS]; cells_x * cells_y];
    for y in 0..(cells_y as u32 * cell) {
        for x in 0..(cells_x as u32 * cell) {
            let dx = gx.get_pixel(x, y).0[0] as f64;
            let dy = gy.get_pixel(x, y).0[0] as f64;
            let magnitude = dx.hypot(dy);
            if magnitude == 0.0 {
                continue;
            }
            let angle = dy.atan2(dx).to_degrees().rem_euclid(180.0);
            let bin = ((angle / 180.0 * ORIENTATION_BINS as f64) as usize).min(ORIENTATION_BINS - 1);
            let index = (y / cell) as usize * cells_x + (x / cell) as usize;
            histograms[index][bin] += magnitude;
        }
    }

    let mut descriptors = Vec::new();
    for by in 0..=(cells_y - BLOCK_CELLS) {
        for bx in 0..=(cells_x - BLOCK_CELLS) {
            let mut block = Vec::with_capacity(ORIENTATION_BINS * BLOCK_CELLS * BLOCK_CELLS);
            for cy in by..by + BLOCK_CELLS {
                for cx in bx..bx + BLOCK_CELLS {
                    block.extend_from_slice(&histograms[cy * cells_x + cx]);
                }
            }
            let norm = block.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                block.iter_mut().for_each(|v| *v /= norm);
                descriptors.push(block);
            }
        }
    }
    descriptors
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centers: &[Vec<f64>], point: &[f64]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, center) in centers.iter().enumerate() {
        let d = squared_distance(center, point);
        if d < best_distance {
            best = index;
            best_distance = d;
        }
    }
    best
}

/// Deterministic k-means: evenly spaced seeds, fixed iteration count.
pub fn build_vocabulary(descriptors: &[Vec<f64>], words: usize, iterations: usize) -> Vec<Vec<f64>> {
    let k = words.min(descriptors.len());
    if k == 0 {
        return Vec::new();
    }
    let mut centers: Vec<Vec<f64>> = (0..k)
        .map(|i| descriptors[i * descriptors.len() / k].clone())
        .collect();
    let dims = descriptors[0].len();

    for _ in 0..iterations {
        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for descriptor in descriptors {
            let word = nearest(&centers, descriptor);
            counts[word] += 1;
            sums[word].iter_mut().zip(descriptor).for_each(|(s, v)| *s += v);
        }
        let mut moved = false;
        for word in 0..k {
            if counts[word] == 0 {
                continue;
            }
            let updated: Vec<f64> = sums[word].iter().map(|s| s / counts[word] as f64).collect();
            if updated != centers[word] {
                moved = true;
                centers[word] = updated;
            }
        }
        if !moved {
            break;
        }
    }
    centers
}

/// Normalized word histogram of a descriptor set.
pub fn word_histogram(vocabulary: &[Vec<f64>], descriptors: &[Vec<f64>]) -> Vec<f64> {
    let mut histogram = vec![0.0; vocabulary.len()];
    if descriptors.is_empty() {
        return histogram;
    }
    for descriptor in descriptors {
        histogram[nearest(vocabulary, descriptor)] += 1.0;
    }
    let total = descriptors.len() as f64;
    histogram.iter_mut().for_each(|v| *v /= total);
    histogram
}

/// Chi-squared distance of two normalized histograms, in [0, 1].
pub fn chi_squared(a: &[f64], b: &[f64]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .filter(|(x, y)| *x + *y > 0.0)
        .map(|(x, y)| (x - y).powi(2) / (x + y))
        .sum();
    (0.5 * sum).clamp(0.0, 1.0)
}

impl TextureMapping {
    /// Monotonically decreasing map from distance to score.
    pub fn to_score(&self, chi: f64) -> f64 {
        let raw = match *self {
            TextureMapping::Linear => 100.0 * (1.0 - chi),
            TextureMapping::Logistic { midpoint, steepness } => {
                100.0 / (1.0 + (steepness * (chi - midpoint)).exp())
            }
        };
        clamp_score(raw)
    }
}

/// Bag-of-visual-words comparison with a vocabulary built per call
#[derive(Debug, Clone, Default)]
pub struct TextureScorer {
    pub config: TextureConfig,
}

impl TextureScorer {
    pub fn new(config: TextureConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, user: &GrayImage, target: &GrayImage) -> TextureReport {
        let user_descriptors = gradient_descriptors(user, self.config.cell);
        let target_descriptors = gradient_descriptors(target, self.config.cell);
        if user_descriptors.is_empty() || target_descriptors.is_empty() {
            debug!("no gradient blocks on one side, texture score is zero");
            return TextureReport {
                score: 0.0,
                chi_squared: 1.0,
                words: 0,
            };
        }

        let mut pooled = user_descriptors.clone();
        pooled.extend(target_descriptors.iter().cloned());
        let vocabulary = build_vocabulary(&pooled, self.config.vocabulary, self.config.iterations);
        let chi = chi_squared(
            &word_histogram(&vocabulary, &user_descriptors),
            &word_histogram(&vocabulary, &target_descriptors),
        );
        let score = self.config.mapping.to_score(chi);
        debug!(words = vocabulary.len(), chi, score, "texture comparison");
        TextureReport {
            score,
            chi_squared: chi,
            words: vocabulary.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::extraction::paper;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    fn stripes() -> GrayImage {
        let mut image = paper(64, 64);
        for x in (4..60).step_by(8) {
            draw_filled_rect_mut(&mut image, Rect::at(x, 4).of_size(3, 56), Luma([0]));
        }
        image
    }

    #[test]
    fn identical_canvases_score_full() {
        let report = TextureScorer::default().score(&stripes(), &stripes());
        assert_eq!(report.chi_squared, 0.0);
        assert_eq!(report.score, 100.0);
        assert!(report.words > 0);
    }

    #[test]
    fn different_structure_scores_lower() {
        let mut blob = paper(64, 64);
        draw_filled_circle_mut(&mut blob, (32, 32), 20, Luma([0]));
        let report = TextureScorer::default().score(&stripes(), &blob);
        assert!(report.score < 100.0);
        assert!((0.0..=100.0).contains(&report.score));
    }

    #[test]
    fn blank_side_scores_zero() {
        let report = TextureScorer::default().score(&paper(64, 64), &stripes());
        assert_eq!(report.score, 0.0);
        assert_eq!(report.words, 0);
    }

    #[test]
    fn chi_squared_bounds() {
        assert_eq!(chi_squared(&[1.0, 0.0], &[0.0, 1.0]), 1.0);
        assert_eq!(chi_squared(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
    }

    #[test]
    fn mappings_decrease_with_distance() {
        let logistic = TextureMapping::Logistic { midpoint: 0.35, steepness: 12.0 };
        for mapping in [TextureMapping::Linear, logistic] {
            assert!(mapping.to_score(0.1) > mapping.to_score(0.5));
            assert!(mapping.to_score(0.9) >= 0.0);
        }
        assert_eq!(TextureMapping::Linear.to_score(0.0), 100.0);
    }
}
