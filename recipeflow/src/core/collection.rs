//! Dynamic collection items that drive fan-out.

use serde::{Deserialize, Serialize};

/// One entry of a dynamic output collection.
///
/// Items expose exactly two attributes to path templates: `identifier`
/// and `count`. Templates referencing anything else are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    /// Unique identifier of the sub-unit (also used as a path segment).
    pub identifier: String,

    /// Size hint for the sub-unit, e.g. the number of sensors in a grid.
    pub count: u64,
}

impl CollectionItem {
    /// Creates a new collection item.
    #[must_use]
    pub fn new(identifier: impl Into<String>, count: u64) -> Self {
        Self {
            identifier: identifier.into(),
            count,
        }
    }

    /// Looks up a template attribute by name.
    ///
    /// Returns `None` for attributes the item does not declare.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "identifier" => Some(self.identifier.clone()),
            "count" => Some(self.count.to_string()),
            _ => None,
        }
    }

    /// The attribute names items expose to templates.
    #[must_use]
    pub fn attribute_names() -> &'static [&'static str] {
        &["identifier", "count"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup() {
        let item = CollectionItem::new("first_floor", 250);
        assert_eq!(item.attribute("identifier"), Some("first_floor".to_string()));
        assert_eq!(item.attribute("count"), Some("250".to_string()));
        assert_eq!(item.attribute("full_id"), None);
    }

    #[test]
    fn test_serialization() {
        let item = CollectionItem::new("A", 10);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"identifier": "A", "count": 10}));
    }
}
