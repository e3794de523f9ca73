//! Item model
//!
//! On the wire an item is one flat JSON object: the fixed fields every item
//! has, merged with the type-specific fields kept in `attrs`. Output-only
//! view fields (`upvotes`, `rank`, `links`, ...) are dropped when reading an
//! item back in.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use platform_core::clients::{GeoPoint, SearchInfo};

use super::item_type::ItemType;
use crate::db::models::ItemRow;
use crate::error::ItemError;

/// Fields common to every item type
pub const FIXED_FIELDS: &[&str] = &[
    "id",
    "item_type",
    "slug",
    "lang",
    "name",
    "description",
    "featured_picture",
    "pictures",
    "tags",
    "urls",
    "approval",
    "creator",
    "owner",
    "ownership",
    "created_at",
];

/// Fields assigned by the service; never accepted from clients
pub const READ_ONLY_FIELDS: &[&str] = &[
    "id",
    "slug",
    "approval",
    "creator",
    "owner",
    "ownership",
    "created_at",
];

/// Fields a patch may not touch
pub const PATCH_FORBIDDEN_FIELDS: &[&str] = &[
    "id",
    "item_type",
    "slug",
    "approval",
    "creator",
    "owner",
    "ownership",
    "created_at",
];

/// Output-only fields added by the listing views
pub const VIEW_FIELDS: &[&str] = &[
    "upvotes",
    "rank",
    "links",
    "collections",
    "creator_info",
    "owner_info",
    "user_upvoted",
];

pub const DEFAULT_LANG: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    Pending,
    Approved,
    Rejected,
}

impl Approval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Approval::Pending => "pending",
            Approval::Approved => "approved",
            Approval::Rejected => "rejected",
        }
    }
}

impl FromStr for Approval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Approval::Pending),
            "approved" => Ok(Approval::Approved),
            "rejected" => Ok(Approval::Rejected),
            other => Err(format!("unknown approval '{}'", other)),
        }
    }
}

impl fmt::Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Creator,
    Claimed,
}

impl Ownership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ownership::Creator => "creator",
            Ownership::Claimed => "claimed",
        }
    }
}

impl FromStr for Ownership {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Ownership::Creator),
            "claimed" => Ok(Ownership::Claimed),
            other => Err(format!("unknown ownership '{}'", other)),
        }
    }
}

/// A validated item body before the service assigns ids and ownership
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub item_type: ItemType,
    pub lang: String,
    pub name: String,
    pub description: String,
    pub featured_picture: String,
    pub pictures: Vec<String>,
    pub tags: Vec<String>,
    pub urls: BTreeMap<String, String>,
    pub attrs: Map<String, Value>,
}

#[derive(Deserialize)]
struct FixedFields {
    item_type: ItemType,
    #[serde(default)]
    lang: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    featured_picture: Option<String>,
    #[serde(default)]
    pictures: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    urls: BTreeMap<String, String>,
}

impl ItemDraft {
    /// Split a flat object into fixed fields and attrs.
    ///
    /// `featured_picture` falls back to the first picture.
    pub fn from_object(mut obj: Map<String, Value>) -> Result<Self, ItemError> {
        let mut fixed = Map::new();
        for field in FIXED_FIELDS {
            if let Some(v) = obj.remove(*field) {
                fixed.insert(field.to_string(), v);
            }
        }
        for field in VIEW_FIELDS {
            obj.remove(*field);
        }
        let fixed: FixedFields = serde_json::from_value(Value::Object(fixed))
            .map_err(|e| ItemError::Validation(e.to_string()))?;
        let featured_picture = fixed
            .featured_picture
            .or_else(|| fixed.pictures.first().cloned())
            .unwrap_or_default();

        Ok(Self {
            item_type: fixed.item_type,
            lang: fixed.lang.unwrap_or_else(|| DEFAULT_LANG.to_string()),
            name: fixed.name,
            description: fixed.description,
            featured_picture,
            pictures: fixed.pictures,
            tags: fixed.tags,
            urls: fixed.urls,
            attrs: obj,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub item_type: ItemType,
    pub slug: String,
    pub lang: String,
    pub name: String,
    pub description: String,
    pub featured_picture: String,
    pub pictures: Vec<String>,
    pub tags: Vec<String>,
    pub urls: BTreeMap<String, String>,
    pub attrs: Map<String, Value>,
    pub approval: Approval,
    pub creator: String,
    pub owner: String,
    pub ownership: Ownership,
    pub created_at: String,
}

fn column<T: serde::de::DeserializeOwned>(name: &str, raw: &str) -> Result<T, ItemError> {
    serde_json::from_str(raw).map_err(|e| ItemError::Database(format!("Bad {} column: {}", name, e)))
}

fn to_column<T: Serialize + ?Sized>(value: &T) -> Result<String, ItemError> {
    serde_json::to_string(value).map_err(|e| ItemError::Database(e.to_string()))
}

impl Item {
    pub fn from_row(row: ItemRow) -> Result<Self, ItemError> {
        Ok(Self {
            item_type: row.item_type.parse().map_err(ItemError::Database)?,
            approval: row.approval.parse().map_err(ItemError::Database)?,
            ownership: row.ownership.parse().map_err(ItemError::Database)?,
            pictures: column("pictures", &row.pictures)?,
            tags: column("tags", &row.tags)?,
            urls: column("urls", &row.urls)?,
            attrs: column("attrs", &row.attrs)?,
            id: row.id,
            slug: row.slug,
            lang: row.lang,
            name: row.name,
            description: row.description,
            featured_picture: row.featured_picture,
            creator: row.creator,
            owner: row.owner,
            created_at: row.created_at,
        })
    }

    pub fn to_row(&self) -> Result<ItemRow, ItemError> {
        Ok(ItemRow {
            id: self.id.clone(),
            item_type: self.item_type.as_str().to_string(),
            slug: self.slug.clone(),
            lang: self.lang.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            featured_picture: self.featured_picture.clone(),
            pictures: to_column(&self.pictures)?,
            tags: to_column(&self.tags)?,
            urls: to_column(&self.urls)?,
            attrs: to_column(&self.attrs)?,
            approval: self.approval.as_str().to_string(),
            creator: self.creator.clone(),
            owner: self.owner.clone(),
            ownership: self.ownership.as_str().to_string(),
            created_at: self.created_at.clone(),
        })
    }

    /// Overwrite the client-editable parts with `draft`
    pub fn apply(&mut self, draft: ItemDraft) {
        self.lang = draft.lang;
        self.name = draft.name;
        self.description = draft.description;
        self.featured_picture = draft.featured_picture;
        self.pictures = draft.pictures;
        self.tags = draft.tags;
        self.urls = draft.urls;
        self.attrs = draft.attrs;
    }

    /// Flat JSON object form
    pub fn to_object(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// `attrs.location` as a point, when present and well formed
    pub fn location(&self) -> Option<GeoPoint> {
        self.attrs
            .get("location")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// What the search index stores for this item
    pub fn search_info(&self) -> SearchInfo {
        SearchInfo {
            id: self.id.clone(),
            item_type: self.item_type.as_str().to_string(),
            lang: self.lang.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            approval: self.approval.as_str().to_string(),
            location: self.location(),
        }
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIXED_FIELDS.len() + self.attrs.len()))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("item_type", &self.item_type)?;
        map.serialize_entry("slug", &self.slug)?;
        map.serialize_entry("lang", &self.lang)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("description", &self.description)?;
        map.serialize_entry("featured_picture", &self.featured_picture)?;
        map.serialize_entry("pictures", &self.pictures)?;
        map.serialize_entry("tags", &self.tags)?;
        map.serialize_entry("urls", &self.urls)?;
        map.serialize_entry("approval", &self.approval)?;
        map.serialize_entry("creator", &self.creator)?;
        map.serialize_entry("owner", &self.owner)?;
        map.serialize_entry("ownership", &self.ownership)?;
        map.serialize_entry("created_at", &self.created_at)?;
        for (k, v) in &self.attrs {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct StoredFields {
    id: String,
    slug: String,
    approval: Approval,
    creator: String,
    owner: String,
    ownership: Ownership,
    created_at: String,
}

impl<'de> Deserialize<'de> for Item {
    /// Reads a stored or previously serialized item; no schema validation.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut obj = Map::<String, Value>::deserialize(deserializer)?;
        let mut stored = Map::new();
        for field in READ_ONLY_FIELDS {
            if let Some(v) = obj.remove(*field) {
                stored.insert(field.to_string(), v);
            }
        }
        let stored: StoredFields =
            serde_json::from_value(Value::Object(stored)).map_err(D::Error::custom)?;
        let draft = ItemDraft::from_object(obj).map_err(D::Error::custom)?;

        Ok(Item {
            id: stored.id,
            item_type: draft.item_type,
            slug: stored.slug,
            lang: draft.lang,
            name: draft.name,
            description: draft.description,
            featured_picture: draft.featured_picture,
            pictures: draft.pictures,
            tags: draft.tags,
            urls: draft.urls,
            attrs: draft.attrs,
            approval: stored.approval,
            creator: stored.creator,
            owner: stored.owner,
            ownership: stored.ownership,
            created_at: stored.created_at,
        })
    }
}

/// Compact reference used by `GET /items/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: String,
    pub item_type: ItemType,
    pub slug: String,
    pub name: String,
    pub featured_picture: String,
}

impl From<&Item> for ItemInfo {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            item_type: item.item_type,
            slug: item.slug.clone(),
            name: item.name.clone(),
            featured_picture: item.featured_picture.clone(),
        }
    }
}
