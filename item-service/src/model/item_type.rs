//! Closed set of item types
//!
//! Concrete types are creatable and own an id prefix. The abstract
//! supertypes (`venue`, `experience`, `product`, `media`) only appear in
//! queries and schema inheritance, where they expand to their members.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! item_types {
    ($( $variant:ident => $name:literal, $prefix:literal; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ItemType {
            $( $variant, )*
        }

        impl ItemType {
            pub const ALL: &'static [ItemType] = &[$( ItemType::$variant, )*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( ItemType::$variant => $name, )*
                }
            }

            /// Id prefix, e.g. `htl` for hotels
            pub fn prefix(&self) -> &'static str {
                match self {
                    $( ItemType::$variant => $prefix, )*
                }
            }
        }

        impl FromStr for ItemType {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(ItemType::$variant), )*
                    other => Err(format!("unknown item type '{}'", other)),
                }
            }
        }
    };
}

item_types! {
    Restaurant => "restaurant", "rst";
    Hotel => "hotel", "htl";
    Shop => "shop", "shp";
    Cafe => "cafe", "caf";
    Room => "room", "rom";
    Offer => "offer", "ofr";
    Service => "service", "svc";
    FreshFood => "fresh-food", "ffd";
    PackagedFood => "packaged-food", "pfd";
    Cosmetics => "cosmetics", "cos";
    Dish => "dish", "dsh";
    Fashion => "fashion", "fsh";
    Homeware => "homeware", "hmw";
    JobAd => "job-ad", "job";
    Post => "post", "pst";
    Recipe => "recipe", "rcp";
    Article => "article", "art";
    Offering => "offering", "ofg";
}

/// Abstract supertypes and their concrete members
pub const ABSTRACT_TYPES: &[(&str, &[ItemType])] = &[
    (
        "venue",
        &[ItemType::Restaurant, ItemType::Hotel, ItemType::Shop, ItemType::Cafe],
    ),
    ("experience", &[ItemType::Room, ItemType::Offer, ItemType::Service]),
    (
        "product",
        &[
            ItemType::FreshFood,
            ItemType::PackagedFood,
            ItemType::Cosmetics,
            ItemType::Dish,
            ItemType::Fashion,
            ItemType::Homeware,
        ],
    ),
    (
        "media",
        &[ItemType::JobAd, ItemType::Post, ItemType::Recipe, ItemType::Article],
    ),
];

impl ItemType {
    /// Type owning an id, judged by its prefix
    pub fn from_id(id: &str) -> Option<ItemType> {
        let prefix = platform_core::ids::id_prefix(id)?;
        ItemType::ALL.iter().copied().find(|t| t.prefix() == prefix)
    }

    /// Whether `id` is a well-formed item id of any type
    pub fn is_item_id(id: &str) -> bool {
        Self::from_id(id).is_some_and(|t| platform_core::ids::is_valid_id(id, t.prefix()))
    }
}

/// Expand a concrete or abstract type name to concrete types
pub fn expand(name: &str) -> Result<Vec<ItemType>, String> {
    if let Some((_, members)) = ABSTRACT_TYPES.iter().find(|(n, _)| *n == name) {
        return Ok(members.to_vec());
    }
    name.parse::<ItemType>().map(|t| vec![t])
}

/// Expand every name in `names`, deduplicated, first occurrence wins
pub fn expand_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<ItemType>, String> {
    let mut out = Vec::new();
    for name in names {
        for t in expand(name.as_ref())? {
            if !out.contains(&t) {
                out.push(t);
            }
        }
    }
    Ok(out)
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ItemType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
