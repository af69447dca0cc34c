use std::fmt;

use serde::{Deserialize, Serialize};

/// Document key, unique within its collection. Either opaque (generated) or human-chosen.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random opaque key, used when a caller inserts without choosing one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for DocId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Fully qualified pointer to one document.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DocRef {
    pub collection: String,
    pub id: DocId,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<DocId>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Reference field on a child naming its parent.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ParentRef {
    pub field: String,
    pub id: DocId,
}

/// Grouping under which sibling ordering and pagination are computed.
///
/// A scope without a parent spans the whole collection.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Scope {
    pub collection: String,
    pub parent: Option<ParentRef>,
}

impl Scope {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            parent: None,
        }
    }

    pub fn child(
        collection: impl Into<String>,
        field: impl Into<String>,
        parent: impl Into<DocId>,
    ) -> Self {
        Self {
            collection: collection.into(),
            parent: Some(ParentRef {
                field: field.into(),
                id: parent.into(),
            }),
        }
    }

    pub fn parent_id(&self) -> Option<&DocId> {
        self.parent.as_ref().map(|p| &p.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}[{}={}]", self.collection, parent.field, parent.id),
            None => f.write_str(&self.collection),
        }
    }
}
