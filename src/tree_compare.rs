use crate::config::SimilarityConfig;
use crate::grid_matcher::GridMatcher;
use crate::page::{ElementNode, NodeId, PageRecord};
use crate::utils::{jaccard_similarity, normalize_text, sequence_ratio};

/// A top-level element of the left page paired with its nearest element on
/// the right page.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    pub left: NodeId,
    pub right: NodeId,
    /// Geometric score of the pairing.
    pub match_score: f64,
    /// Tag, class, text and children score of the paired elements.
    pub detailed: f64,
}

/// Breakdown of one page-to-page comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct PageComparison {
    pub grid: f64,
    pub element: f64,
    pub overall: f64,
    /// True when the grid score fell below the threshold and the element
    /// trees were never inspected.
    pub gated: bool,
    pub correspondences: Vec<Correspondence>,
}

/// Compares two pages: layout grids first, then, if the grids are close
/// enough, the content and direct children of corresponding top-level
/// elements.
#[derive(Debug, Clone, Default)]
pub struct ElementTreeComparator {
    matcher: GridMatcher,
}

impl ElementTreeComparator {
    pub fn new(config: SimilarityConfig) -> Self {
        ElementTreeComparator {
            matcher: GridMatcher::new(config),
        }
    }

    pub fn matcher(&self) -> &GridMatcher {
        &self.matcher
    }

    pub fn compare(&self, page1: &PageRecord, page2: &PageRecord) -> f64 {
        self.compare_detailed(page1, page2).overall
    }

    pub fn compare_detailed(&self, page1: &PageRecord, page2: &PageRecord) -> PageComparison {
        let threshold = self.matcher.config().similarity_threshold;
        let grid = self
            .matcher
            .grid_similarity(&page1.grid_rects(), &page2.grid_rects());

        if grid < threshold {
            tracing::trace!("Grid similarity {:.4} below {:.2}, skipping element trees", grid, threshold);
            return PageComparison {
                grid,
                element: 0.0,
                overall: grid,
                gated: true,
                correspondences: Vec::new(),
            };
        }

        let candidates = page2.element_rects();
        let mut used = vec![false; candidates.len()];
        let mut correspondences = Vec::new();

        for (position, left) in page1.elements.iter().enumerate() {
            // Equal geometry is settled by identity: an unused candidate
            // first, then matching id, tag and top-level position.
            let tie_key = |index: usize| {
                let right = &page2.elements[index];
                (
                    used[index],
                    left.id.is_none() || left.id != right.id,
                    tag_similarity(&left.tag, &right.tag) < 1.0,
                    index != position,
                )
            };
            let Some(best) = self
                .matcher
                .best_match_by_key(&left.position, &candidates, tie_key)
            else {
                continue;
            };
            if best.score < threshold {
                continue;
            }

            // Identity travels with the candidate index, never via coordinates.
            let right = &page2.elements[best.index];
            used[best.index] = true;
            correspondences.push(Correspondence {
                left: left.node_id,
                right: right.node_id,
                match_score: best.score,
                detailed: self.element_similarity(left, right),
            });
        }

        let element = if correspondences.is_empty() {
            0.0
        } else {
            correspondences.iter().map(|c| c.detailed).sum::<f64>() / correspondences.len() as f64
        };

        PageComparison {
            grid,
            element,
            overall: 0.4 * grid + 0.6 * element,
            gated: false,
            correspondences,
        }
    }

    /// `0.2*tag + 0.2*class + 0.3*text + 0.3*children`. Children are compared
    /// by layout only; grandchildren are never visited.
    pub fn element_similarity(&self, a: &ElementNode, b: &ElementNode) -> f64 {
        let tag = tag_similarity(&a.tag, &b.tag);
        let class = jaccard_similarity(&a.classes, &b.classes);
        let text = text_similarity(a.text.as_deref(), b.text.as_deref());
        let children = self.children_similarity(a, b);

        0.2 * (tag + class) + 0.3 * (text + children)
    }

    pub fn children_similarity(&self, a: &ElementNode, b: &ElementNode) -> f64 {
        match (a.children.is_empty(), b.children.is_empty()) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.0,
            _ => self
                .matcher
                .grid_similarity(&a.child_rects(), &b.child_rects()),
        }
    }
}

pub fn tag_similarity(a: &str, b: &str) -> f64 {
    if a.to_lowercase() == b.to_lowercase() {
        1.0
    } else {
        0.0
    }
}

/// Absent (or empty) on both sides counts as identical, on one side as
/// nothing in common. Otherwise trimmed, lower-cased texts are compared
/// exactly and then by sequence ratio.
pub fn text_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    let a = a.filter(|t| !t.is_empty());
    let b = b.filter(|t| !t.is_empty());
    match (a, b) {
        (None, None) => 1.0,
        (Some(_), None) | (None, Some(_)) => 0.0,
        (Some(a), Some(b)) => {
            let a = normalize_text(a);
            let b = normalize_text(b);
            if a == b {
                1.0
            } else {
                sequence_ratio(&a, &b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{GridElement, Rect};

    fn grid_element(tag: &str, rect: Rect) -> GridElement {
        GridElement {
            id: None,
            tag: tag.to_string(),
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            z_index: 0,
        }
    }

    fn landing_page() -> PageRecord {
        let header = Rect::new(0.0, 0.0, 1280.0, 80.0);
        let main = Rect::new(0.0, 80.0, 1280.0, 600.0);
        let footer = Rect::new(0.0, 680.0, 1280.0, 120.0);

        PageRecord::new(
            vec![
                grid_element("header", header),
                grid_element("main", main),
                grid_element("footer", footer),
            ],
            vec![
                ElementNode::new("header", header)
                    .with_classes(["site-header"])
                    .with_child(ElementNode::new("a", Rect::new(10.0, 10.0, 120.0, 60.0)).with_text("Home"))
                    .with_child(ElementNode::new("a", Rect::new(140.0, 10.0, 120.0, 60.0)).with_text("Login")),
                ElementNode::new("main", main)
                    .with_classes(["content", "wide"])
                    .with_text("Sign in to your account"),
                ElementNode::new("footer", footer).with_text("Copyright 2024"),
            ],
        )
    }

    #[test]
    fn test_identical_pages_score_one() {
        let comparator = ElementTreeComparator::default();
        let page = landing_page();
        let copy = page.clone();

        let result = comparator.compare_detailed(&page, &copy);
        assert!(!result.gated);
        assert_eq!(result.grid, 1.0);
        assert_eq!(result.element, 1.0);
        assert_eq!(result.overall, 1.0);
        assert_eq!(result.correspondences.len(), 3);
    }

    #[test]
    fn test_low_grid_similarity_skips_element_trees() {
        let comparator = ElementTreeComparator::default();
        let page = landing_page();

        // Same three blocks plus seven unrelated ones: grid = 3 / 10.
        let mut grid = page.grid.clone();
        for i in 0..7 {
            grid.push(grid_element("aside", Rect::new(50.0 * i as f64, 900.0, 20.0, 20.0)));
        }
        let cluttered = PageRecord::new(grid, page.elements.clone());

        let result = comparator.compare_detailed(&page, &cluttered);
        assert_eq!(result.grid, 0.3);
        assert!(result.gated);
        assert_eq!(result.overall, 0.3);
        assert!(result.correspondences.is_empty());
        assert_eq!(comparator.compare(&page, &cluttered), 0.3);
    }

    #[test]
    fn test_unmatched_elements_contribute_nothing() {
        let comparator = ElementTreeComparator::default();
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
        let grid = vec![grid_element("div", rect)];

        let left = PageRecord::new(grid.clone(), vec![ElementNode::new("div", rect)]);
        let right = PageRecord::new(
            grid,
            vec![ElementNode::new("div", Rect::new(1000.0, 700.0, 50.0, 20.0))],
        );

        let result = comparator.compare_detailed(&left, &right);
        assert_eq!(result.grid, 1.0);
        assert!(result.correspondences.is_empty());
        assert_eq!(result.element, 0.0);
        assert_eq!(result.overall, 0.4);
    }

    #[test]
    fn test_correspondence_uses_node_identity() {
        let comparator = ElementTreeComparator::default();
        let page = landing_page();

        let result = comparator.compare_detailed(&page, &page);
        let main = &page.elements[1];
        // header owns ids 0..=2, so main is node 3 on both sides
        assert_eq!(main.node_id, NodeId(3));
        assert_eq!(result.correspondences[1].left, NodeId(3));
        assert_eq!(result.correspondences[1].right, NodeId(3));
    }

    #[test]
    fn test_stacked_boxes_keep_their_identity() {
        let comparator = ElementTreeComparator::default();
        let rect = Rect::new(0.0, 0.0, 400.0, 300.0);
        let grid = vec![grid_element("div", rect), grid_element("div", rect)];
        let elements = vec![
            ElementNode::new("div", rect).with_text("overlay"),
            ElementNode::new("span", rect).with_text("content"),
        ];
        let page = PageRecord::new(grid, elements);

        let result = comparator.compare_detailed(&page, &page.clone());
        assert_eq!(result.correspondences.len(), 2);
        for (correspondence, element) in result.correspondences.iter().zip(&page.elements) {
            assert_eq!(correspondence.left, element.node_id);
            assert_eq!(correspondence.right, element.node_id);
        }
        assert_eq!(result.overall, 1.0);
    }

    #[test]
    fn test_stacked_boxes_with_same_tag_pair_by_position() {
        let comparator = ElementTreeComparator::default();
        let rect = Rect::new(100.0, 100.0, 300.0, 200.0);
        let grid = vec![grid_element("div", rect)];
        let page = PageRecord::new(
            grid,
            vec![
                ElementNode::new("div", rect).with_text("first"),
                ElementNode::new("div", rect).with_text("second layer"),
                ElementNode::new("div", rect).with_classes(["third"]),
            ],
        );

        assert_eq!(comparator.compare(&page, &page.clone()), 1.0);
    }

    #[test]
    fn test_stacked_boxes_prefer_matching_id() {
        let comparator = ElementTreeComparator::default();
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        let grid = vec![grid_element("div", rect)];
        let mut left_first = ElementNode::new("div", rect).with_text("menu");
        left_first.id = Some("menu".to_string());
        let mut left_second = ElementNode::new("div", rect).with_text("banner");
        left_second.id = Some("banner".to_string());

        let left = PageRecord::new(grid.clone(), vec![left_first.clone(), left_second.clone()]);
        let right = PageRecord::new(grid, vec![left_second, left_first]);

        let result = comparator.compare_detailed(&left, &right);
        assert_eq!(result.correspondences[0].right, right.elements[1].node_id);
        assert_eq!(result.correspondences[1].right, right.elements[0].node_id);
        assert_eq!(result.overall, 1.0);
    }

    #[test]
    fn test_element_similarity_components() {
        let comparator = ElementTreeComparator::default();
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);

        let a = ElementNode::new("DIV", rect)
            .with_classes(["card", "shadow"])
            .with_text("Hello");
        let b = ElementNode::new("div", rect)
            .with_classes(["card"])
            .with_text("  hello ");
        // tag 1, class 1/2, text 1, children 1 (none on both sides)
        let expected = 0.2 * (1.0 + 0.5) + 0.3 * (1.0 + 1.0);
        assert!((comparator.element_similarity(&a, &b) - expected).abs() < 1e-12);

        let with_child = b.clone().with_child(ElementNode::new("p", Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(comparator.children_similarity(&a, &with_child), 0.0);
    }

    #[test]
    fn test_text_similarity() {
        assert_eq!(text_similarity(None, None), 1.0);
        assert_eq!(text_similarity(Some(""), None), 1.0);
        assert_eq!(text_similarity(Some("a"), None), 0.0);
        assert_eq!(text_similarity(None, Some("a")), 0.0);
        assert_eq!(text_similarity(Some(" "), None), 0.0);
        assert_eq!(text_similarity(Some(" Login "), Some("login")), 1.0);
        assert!((text_similarity(Some("abxcd"), Some("abcd")) - 8.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_tag_similarity_ignores_case() {
        assert_eq!(tag_similarity("DIV", "div"), 1.0);
        assert_eq!(tag_similarity("div", "span"), 0.0);
    }
}
