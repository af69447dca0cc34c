//! Entity families: which collection each one lives in, which family it hangs off, and how
//! its visible members are paged.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cascade::ChildLink;
use crate::error::{Error, Result};
use crate::ids::{DocId, Scope};
use crate::pagination::MarkerScope;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParentLink {
    pub family: String,
    /// Reference field on the child holding the parent's id.
    pub field: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_size: u64,
    /// Collection holding this family's page markers.
    pub markers: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub name: String,
    pub collection: String,
    #[serde(default)]
    pub parent: Option<ParentLink>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl Family {
    pub fn top_level(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            collection: name.to_owned(),
            parent: None,
            pagination: None,
        }
    }

    pub fn under(name: &str, parent: &str, field: &str) -> Self {
        Self {
            parent: Some(ParentLink {
                family: parent.to_owned(),
                field: field.to_owned(),
            }),
            ..Self::top_level(name)
        }
    }

    pub fn paged(mut self, page_size: u64, markers: &str) -> Self {
        self.pagination = Some(Pagination {
            page_size,
            markers: markers.to_owned(),
        });
        self
    }

    /// Sibling scope of this family under `parent`.
    pub fn scope(&self, parent: Option<&DocId>) -> Result<Scope> {
        match (&self.parent, parent) {
            (Some(link), Some(parent)) => Ok(Scope::child(
                self.collection.clone(),
                link.field.clone(),
                parent.clone(),
            )),
            (None, None) => Ok(Scope::collection(self.collection.clone())),
            (Some(_), None) => Err(Error::InvalidOperation(format!(
                "{} needs a parent id",
                self.name
            ))),
            (None, Some(_)) => Err(Error::InvalidOperation(format!(
                "{} has no parent family",
                self.name
            ))),
        }
    }

    /// Page markers of this family for the sibling scope under `parent`.
    pub fn marker_scope(&self, parent: Option<&DocId>) -> Option<MarkerScope> {
        let pagination = self.pagination.as_ref()?;
        Some(match (&self.parent, parent) {
            (Some(link), Some(parent)) => MarkerScope::scoped(
                pagination.markers.clone(),
                link.field.clone(),
                parent.clone(),
            ),
            _ => MarkerScope::collection(pagination.markers.clone()),
        })
    }
}

/// Validated set of families.
#[derive(Clone, Debug)]
pub struct Schema {
    families: Vec<Family>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn new(families: Vec<Family>) -> Result<Self> {
        let mut by_name = HashMap::new();
        let mut collections = HashSet::new();
        for (idx, family) in families.iter().enumerate() {
            if by_name.insert(family.name.clone(), idx).is_some() {
                return Err(Error::Config(format!("duplicate family {}", family.name)));
            }
            if !collections.insert(family.collection.clone()) {
                return Err(Error::Config(format!(
                    "collection {} used by more than one family",
                    family.collection
                )));
            }
        }
        for family in &families {
            if let Some(pagination) = &family.pagination {
                if pagination.page_size == 0 {
                    return Err(Error::Config(format!(
                        "{} has a zero page size",
                        family.name
                    )));
                }
                if !collections.insert(pagination.markers.clone()) {
                    return Err(Error::Config(format!(
                        "marker collection {} is already in use",
                        pagination.markers
                    )));
                }
            }
            if let Some(link) = &family.parent {
                if !by_name.contains_key(&link.family) {
                    return Err(Error::Config(format!(
                        "{} points at unknown family {}",
                        family.name, link.family
                    )));
                }
            }
        }

        let schema = Self { families, by_name };
        for family in &schema.families {
            schema.check_acyclic(family)?;
        }
        Ok(schema)
    }

    fn check_acyclic(&self, start: &Family) -> Result<()> {
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(family) = current {
            if !seen.insert(family.name.as_str()) {
                return Err(Error::Config(format!(
                    "parent cycle through {}",
                    start.name
                )));
            }
            current = family
                .parent
                .as_ref()
                .and_then(|link| self.by_name.get(&link.family))
                .map(|&idx| &self.families[idx]);
        }
        Ok(())
    }

    /// The restaurant catalog the admin console manages.
    pub fn restaurant() -> Self {
        let families = vec![
            Family::top_level("hero_videos").paged(1, "hero_video_pages"),
            Family::top_level("categories").paged(2, "category_pages"),
            Family::under("products", "categories", "category").paged(6, "product_pages"),
            Family::top_level("chef_cards").paged(2, "chef_card_pages"),
            Family::top_level("dessert_cards").paged(2, "dessert_card_pages"),
            Family::top_level("menu_sections"),
            Family::under("menu_groups", "menu_sections", "section"),
            Family::under("menu_items", "menu_groups", "group"),
            Family::under("group_images", "menu_groups", "group"),
            Family::under("item_images", "menu_items", "item"),
            Family::top_level("comment_threads"),
            Family::under("comments", "comment_threads", "thread").paged(5, "comment_pages"),
        ];
        Self::new(families).expect("built-in restaurant schema is valid")
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }

    pub fn family(&self, name: &str) -> Result<&Family> {
        self.by_name
            .get(name)
            .map(|&idx| &self.families[idx])
            .ok_or_else(|| Error::InvalidOperation(format!("unknown family {name}")))
    }

    pub(crate) fn family_mut(&mut self, name: &str) -> Result<&mut Family> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown family {name}")))?;
        Ok(&mut self.families[idx])
    }

    /// Families whose parent is `name`, in declaration order.
    pub fn children_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Family> + 'a {
        self.families.iter().filter(move |family| {
            family
                .parent
                .as_ref()
                .is_some_and(|link| link.family == name)
        })
    }

    /// Every collection holding documents that reference a `name` document: child
    /// families, then the page markers those children keep per parent.
    pub fn child_links(&self, name: &str) -> Vec<ChildLink> {
        let children: Vec<&Family> = self.children_of(name).collect();
        let mut links: Vec<ChildLink> = children
            .iter()
            .filter_map(|child| {
                let field = &child.parent.as_ref()?.field;
                Some(ChildLink::new(child.collection.clone(), field.clone()))
            })
            .collect();
        links.extend(children.iter().filter_map(|child| {
            let field = &child.parent.as_ref()?.field;
            let pagination = child.pagination.as_ref()?;
            Some(ChildLink::new(pagination.markers.clone(), field.clone()))
        }));
        links
    }
}
