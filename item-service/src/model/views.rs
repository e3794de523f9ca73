//! Output-only views over items
//!
//! Listings return either summaries or full items decorated with
//! statistics, creator/owner info, the caller's upvote and expanded links.
//! None of these fields are accepted back on create or patch.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use platform_core::clients::{GeoPoint, Info};

use super::item::{Approval, Item};
use super::item_type::ItemType;

/// An item together with its statistics row
#[derive(Debug, Clone, PartialEq)]
pub struct ListedItem {
    pub item: Item,
    pub rank: f64,
    pub upvotes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Summary,
    Full,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Format::Summary),
            "full" => Ok(Format::Full),
            other => Err(format!("unknown format '{}'", other)),
        }
    }
}

/// How deep a linked target is embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkDepth {
    #[default]
    Ids,
    Summary,
    Full,
}

impl FromStr for LinkDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ids" => Ok(LinkDepth::Ids),
            "summary" => Ok(LinkDepth::Summary),
            "full" => Ok(LinkDepth::Full),
            other => Err(format!("unknown link format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryItem {
    pub id: String,
    pub item_type: ItemType,
    pub slug: String,
    pub lang: String,
    pub name: String,
    pub featured_picture: String,
    pub tags: Vec<String>,
    pub approval: Approval,
    pub owner: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub upvotes: i64,
    pub rank: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, LinkedItems>,
}

impl From<&ListedItem> for SummaryItem {
    fn from(listed: &ListedItem) -> Self {
        let item = &listed.item;
        Self {
            id: item.id.clone(),
            item_type: item.item_type,
            slug: item.slug.clone(),
            lang: item.lang.clone(),
            name: item.name.clone(),
            featured_picture: item.featured_picture.clone(),
            tags: item.tags.clone(),
            approval: item.approval,
            owner: item.owner.clone(),
            created_at: item.created_at.clone(),
            location: item.location(),
            upvotes: listed.upvotes,
            rank: listed.rank,
            links: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FullItem {
    #[serde(flatten)]
    pub item: Item,
    pub upvotes: i64,
    pub rank: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_info: Option<Info>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_info: Option<Info>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_upvoted: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, LinkedItems>,
}

impl From<ListedItem> for FullItem {
    fn from(listed: ListedItem) -> Self {
        Self {
            item: listed.item,
            upvotes: listed.upvotes,
            rank: listed.rank,
            creator_info: None,
            owner_info: None,
            user_upvoted: None,
            links: BTreeMap::new(),
        }
    }
}

/// Targets of one link type, embedded at the requested depth
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LinkedItems {
    Ids(Vec<String>),
    Summary(Vec<SummaryItem>),
    Full(Vec<FullItem>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ItemView {
    Summary(SummaryItem),
    Full(Box<FullItem>),
}

impl ItemView {
    pub fn id(&self) -> &str {
        match self {
            ItemView::Summary(s) => &s.id,
            ItemView::Full(f) => &f.item.id,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            ItemView::Summary(s) => s.item_type,
            ItemView::Full(f) => f.item.item_type,
        }
    }

    pub fn links_mut(&mut self) -> &mut BTreeMap<String, LinkedItems> {
        match self {
            ItemView::Summary(s) => &mut s.links,
            ItemView::Full(f) => &mut f.links,
        }
    }
}

/// One page of results and the unpaginated total
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
