use crate::config::SimilarityConfig;
use crate::page::Rect;

/// Scores how closely two positioned rectangles coincide.
///
/// Position dominates (60%): each axis blends an absolute-pixel tolerance,
/// scaled to the larger element, with the offset relative to the viewport.
/// Size (40%) compares width, height and aspect ratio.
#[derive(Debug, Clone, Default)]
pub struct ElementSimilarityScorer {
    config: SimilarityConfig,
}

impl ElementSimilarityScorer {
    pub fn new(config: SimilarityConfig) -> Self {
        ElementSimilarityScorer { config }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn score(&self, a: &Rect, b: &Rect) -> f64 {
        let config = &self.config;

        let reference = a.width.max(a.height).max(b.width).max(b.height).max(1.0);
        let pos_threshold = config
            .min_position_threshold
            .max(reference * config.position_threshold_factor);
        let size_threshold = config
            .min_size_threshold
            .max(reference * config.size_threshold_factor);

        let abs_x = 1.0 - ((a.x - b.x).abs() / pos_threshold).min(1.0);
        let abs_y = 1.0 - ((a.y - b.y).abs() / pos_threshold).min(1.0);
        let rel_x = 1.0 - (a.x / config.viewport_width - b.x / config.viewport_width).abs();
        let rel_y = 1.0 - (a.y / config.viewport_height - b.y / config.viewport_height).abs();

        let x_sim = (abs_x + rel_x) / 2.0;
        let y_sim = (abs_y + rel_y) / 2.0;
        let position_sim = 0.6 * x_sim + 0.4 * y_sim;

        let width_sim = 1.0 - ((a.width - b.width).abs() / size_threshold).min(1.0);
        let height_sim = 1.0 - ((a.height - b.height).abs() / size_threshold).min(1.0);
        let aspect_sim = 1.0 - ((aspect_ratio(a) - aspect_ratio(b)).abs() / 2.0).min(1.0);
        let size_sim = 0.4 * width_sim + 0.4 * height_sim + 0.2 * aspect_sim;

        // Offsets beyond a full viewport push the relative term below zero.
        (0.6 * position_sim + 0.4 * size_sim).clamp(0.0, 1.0)
    }
}

fn aspect_ratio(rect: &Rect) -> f64 {
    if rect.height > 0.0 {
        rect.width / rect.height
    } else {
        0.0
    }
}
