use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Axis-aligned bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle takes part in comparison only if it is finite and has a
    /// strictly positive area.
    pub fn has_area(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// A top-level visible child of the page body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridElement {
    #[serde(default)]
    pub id: Option<String>,
    pub tag: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub z_index: i64,
}

impl GridElement {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Stable identity of a node inside its page: the pre-order index of the
/// node across all top-level trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(default)]
    pub id: Option<String>,
    pub tag: String,
    #[serde(default)]
    pub classes: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub styles: BTreeMap<String, String>,
    pub position: Rect,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<ElementNode>,
    #[serde(default)]
    pub screenshot: Option<PathBuf>,
    #[serde(skip)]
    pub node_id: NodeId,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>, position: Rect) -> Self {
        ElementNode {
            id: None,
            tag: tag.into(),
            classes: BTreeSet::new(),
            attributes: BTreeMap::new(),
            styles: BTreeMap::new(),
            position,
            text: None,
            children: Vec::new(),
            screenshot: None,
            node_id: NodeId::default(),
        }
    }

    pub fn with_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn add_child(&mut self, child: ElementNode) {
        self.children.push(child);
    }

    pub fn with_child(mut self, child: ElementNode) -> Self {
        self.add_child(child);
        self
    }

    pub fn child_rects(&self) -> Vec<Rect> {
        self.children.iter().map(|child| child.position).collect()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ElementNode::subtree_len)
            .sum::<usize>()
    }

    fn assign_ids(&mut self, next: &mut usize) {
        self.node_id = NodeId(*next);
        *next += 1;
        for child in &mut self.children {
            child.assign_ids(next);
        }
    }

    /// Drops degenerate children (and their subtrees). Returns the number of
    /// nodes removed.
    fn prune_degenerate(&mut self) -> usize {
        let before = self.children.len();
        let mut removed = 0;
        self.children.retain(|child| {
            if child.position.has_area() {
                true
            } else {
                removed += child.subtree_len() - 1;
                false
            }
        });
        removed += before - self.children.len();
        for child in &mut self.children {
            removed += child.prune_degenerate();
        }
        removed
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text: Option<String> = Option::deserialize(deserializer)?;
    Ok(text.filter(|t| !t.is_empty()))
}

/// One analyzed page: the flattened top-level grid plus the full element
/// trees rooted at each top-level child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub grid: Vec<GridElement>,
    pub elements: Vec<ElementNode>,
}

impl PageRecord {
    /// Builds a page, removing zero-area geometry and numbering the nodes.
    pub fn new(grid: Vec<GridElement>, elements: Vec<ElementNode>) -> Self {
        let mut page = PageRecord { grid, elements };
        page.normalize();
        page
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let mut page: PageRecord = serde_json::from_str(json)?;
        page.normalize();
        Ok(page)
    }

    pub fn grid_rects(&self) -> Vec<Rect> {
        self.grid.iter().map(GridElement::rect).collect()
    }

    pub fn element_rects(&self) -> Vec<Rect> {
        self.elements.iter().map(|element| element.position).collect()
    }

    pub fn node_count(&self) -> usize {
        self.elements.iter().map(ElementNode::subtree_len).sum()
    }

    fn normalize(&mut self) {
        let grid_before = self.grid.len();
        self.grid.retain(|element| element.rect().has_area());

        let mut removed = 0;
        self.elements.retain(|element| {
            if element.position.has_area() {
                true
            } else {
                removed += element.subtree_len();
                false
            }
        });
        for element in &mut self.elements {
            removed += element.prune_degenerate();
        }

        if grid_before != self.grid.len() || removed > 0 {
            tracing::debug!(
                "Filtered {} zero-area grid entries and {} zero-area nodes",
                grid_before - self.grid.len(),
                removed
            );
        }

        let mut next = 0;
        for element in &mut self.elements {
            element.assign_ids(&mut next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_JSON: &str = r#"{
        "grid": [
            {"id": "header", "tag": "div", "x": 0, "y": 0, "width": 1280, "height": 80, "zIndex": 2},
            {"id": null, "tag": "span", "x": 10, "y": 10, "width": 0, "height": 20, "zIndex": 0}
        ],
        "elements": [
            {
                "id": "header",
                "tag": "div",
                "classes": ["nav", "top"],
                "attributes": {"role": "banner"},
                "styles": {"color": "red"},
                "position": {"x": 0, "y": 0, "width": 1280, "height": 80},
                "text": "",
                "children": [
                    {"tag": "a", "position": {"x": 5, "y": 5, "width": 50, "height": 20}, "text": "Home"},
                    {"tag": "img", "position": {"x": 0, "y": 0, "width": 0, "height": 0},
                     "children": [{"tag": "b", "position": {"x": 1, "y": 1, "width": 1, "height": 1}}]}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_page_record() {
        let page = PageRecord::from_json_str(PAGE_JSON).unwrap();

        assert_eq!(page.grid.len(), 1);
        assert_eq!(page.grid[0].id.as_deref(), Some("header"));
        assert_eq!(page.grid[0].z_index, 2);

        let header = &page.elements[0];
        assert_eq!(header.tag, "div");
        assert!(header.classes.contains("nav"));
        assert_eq!(header.attributes.get("role").map(String::as_str), Some("banner"));
        assert_eq!(header.styles.get("color").map(String::as_str), Some("red"));
        assert_eq!(header.text, None); // empty text is treated as absent
    }

    #[test]
    fn test_whitespace_text_is_kept() {
        let json = r#"{
            "grid": [],
            "elements": [{"tag": "p", "position": {"x": 0, "y": 0, "width": 10, "height": 10}, "text": "  "}]
        }"#;
        let page = PageRecord::from_json_str(json).unwrap();
        assert_eq!(page.elements[0].text.as_deref(), Some("  "));
    }

    #[test]
    fn test_zero_area_nodes_are_filtered() {
        let page = PageRecord::from_json_str(PAGE_JSON).unwrap();
        let header = &page.elements[0];

        assert_eq!(header.children.len(), 1);
        assert_eq!(header.children[0].tag, "a");
        assert_eq!(page.node_count(), 2);
    }

    #[test]
    fn test_node_ids_are_preorder() {
        let page = PageRecord::new(
            vec![],
            vec![
                ElementNode::new("div", Rect::new(0.0, 0.0, 10.0, 10.0))
                    .with_child(ElementNode::new("p", Rect::new(0.0, 0.0, 5.0, 5.0))),
                ElementNode::new("div", Rect::new(0.0, 0.0, 10.0, 10.0)),
            ],
        );

        assert_eq!(page.elements[0].node_id, NodeId(0));
        assert_eq!(page.elements[0].children[0].node_id, NodeId(1));
        assert_eq!(page.elements[1].node_id, NodeId(2));
    }

    #[test]
    fn test_missing_required_fields_is_an_error() {
        assert!(PageRecord::from_json_str(r#"{"grid": []}"#).is_err());
        assert!(PageRecord::from_json_str(r#"{"grid": [], "elements": [{"tag": "div"}]}"#).is_err());
        assert!(PageRecord::from_json_str("not json").is_err());
    }

    #[test]
    fn test_has_area() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).has_area());
        assert!(!Rect::new(0.0, 0.0, 0.0, 1.0).has_area());
        assert!(!Rect::new(0.0, 0.0, 1.0, -1.0).has_area());
        assert!(!Rect::new(f64::NAN, 0.0, 1.0, 1.0).has_area());
    }
}
