//! Item validation
//!
//! Every create and patch goes through the same pipeline:
//!
//! 1. reject read-only and output-only fields
//! 2. default `featured_picture` to the first picture
//! 3. stage 1: `item-fixed` over the fixed fields
//! 4. stage 2: the item type's schema over everything else
//! 5. opening/special hours semantics
//! 6. `featured_picture` must be one of `pictures`
//!
//! Schemas are compiled once at start-up from the `schemas/` directory
//! built into the binary. The engine is a value owned by the service, so
//! tests can build their own.

pub mod categories;
pub mod hours;
pub mod loader;

use std::collections::HashMap;
use std::sync::Arc;

use include_dir::{include_dir, Dir};
use jsonschema::{Draft, Validator};
use serde_json::{Map, Value};
use tracing::info;

pub use categories::CategoryTable;

use crate::error::ItemError;
use crate::model::item::{FIXED_FIELDS, PATCH_FORBIDDEN_FIELDS, READ_ONLY_FIELDS, VIEW_FIELDS};
use crate::model::{Item, ItemDraft, ItemType};

pub static SCHEMA_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

const FIXED_SCHEMA: &str = "item-fixed";

pub struct SchemaEngine {
    fixed: Validator,
    by_type: HashMap<ItemType, Validator>,
    categories: Arc<CategoryTable>,
}

fn format_errors<'a>(errors: impl Iterator<Item = jsonschema::ValidationError<'a>>) -> Option<String> {
    let messages: Vec<String> = errors
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path.trim_start_matches('/'), e)
            }
        })
        .collect();
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

impl SchemaEngine {
    /// Compile the built-in schemas
    pub fn new(categories: Arc<CategoryTable>) -> Result<Self, ItemError> {
        Self::from_dir(&SCHEMA_DIR, categories)
    }

    pub fn from_dir(dir: &Dir<'_>, categories: Arc<CategoryTable>) -> Result<Self, ItemError> {
        let loaded = loader::load(dir)?;

        let mut formats = Vec::new();
        for schema in loaded.top_level.values() {
            loader::category_formats(schema, &mut formats);
        }
        for (_, fragment) in &loaded.fragments {
            loader::category_formats(fragment, &mut formats);
        }

        let compile = |title: &str| -> Result<Validator, ItemError> {
            let schema = loaded
                .top_level
                .get(title)
                .ok_or_else(|| ItemError::Schema(format!("No schema for '{}'", title)))?;

            let mut options = jsonschema::options()
                .with_draft(Draft::Draft7)
                .should_validate_formats(true);
            for (uri, fragment) in &loaded.fragments {
                options = options.with_resource(uri.as_str(), Draft::Draft7.create_resource(fragment.clone()));
            }
            for name in &formats {
                let table = categories.clone();
                let category = name.clone();
                options = options.with_format(format!("category:{}", name), move |label: &str| {
                    table.contains(&category, label)
                });
            }
            options
                .build(schema)
                .map_err(|e| ItemError::Schema(format!("Failed to compile '{}': {}", title, e)))
        };

        let fixed = compile(FIXED_SCHEMA)?;
        let mut by_type = HashMap::new();
        for item_type in ItemType::ALL {
            by_type.insert(*item_type, compile(item_type.as_str())?);
        }

        info!(
            schemas = loaded.top_level.len(),
            fragments = loaded.fragments.len(),
            category_formats = formats.len(),
            "Item schemas compiled"
        );

        Ok(Self {
            fixed,
            by_type,
            categories,
        })
    }

    pub fn categories(&self) -> &Arc<CategoryTable> {
        &self.categories
    }

    /// Validate a new item body
    pub fn validate_new(&self, body: Value) -> Result<ItemDraft, ItemError> {
        let Value::Object(obj) = body else {
            return Err(ItemError::Validation("item must be a JSON object".into()));
        };
        for field in READ_ONLY_FIELDS.iter().chain(VIEW_FIELDS) {
            if obj.contains_key(*field) {
                return Err(ItemError::ReadOnlyField(field.to_string()));
            }
        }
        self.validate_object(obj)
    }

    /// Validate `patch` merged over `existing`.
    ///
    /// A `null` in the patch removes that type-specific field.
    pub fn validate_patch(&self, existing: &Item, patch: Value) -> Result<ItemDraft, ItemError> {
        let Value::Object(patch) = patch else {
            return Err(ItemError::Validation("patch must be a JSON object".into()));
        };
        for field in PATCH_FORBIDDEN_FIELDS.iter().chain(VIEW_FIELDS) {
            if patch.contains_key(*field) {
                return Err(ItemError::ReadOnlyField(field.to_string()));
            }
        }

        let mut merged = existing.to_object();
        for field in READ_ONLY_FIELDS {
            merged.remove(*field);
        }
        for (key, value) in patch {
            if value.is_null() {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }
        self.validate_object(merged)
    }

    fn validate_object(&self, mut obj: Map<String, Value>) -> Result<ItemDraft, ItemError> {
        if !obj.contains_key("featured_picture") {
            if let Some(first) = obj
                .get("pictures")
                .and_then(Value::as_array)
                .and_then(|p| p.first())
                .cloned()
            {
                obj.insert("featured_picture".into(), first);
            }
        }

        let mut fixed = Map::new();
        let mut residual = Map::new();
        for (key, value) in obj {
            if FIXED_FIELDS.contains(&key.as_str()) {
                fixed.insert(key, value);
            } else {
                residual.insert(key, value);
            }
        }

        let fixed_value = Value::Object(fixed);
        if let Some(msg) = format_errors(self.fixed.iter_errors(&fixed_value)) {
            return Err(ItemError::Validation(msg));
        }
        let Value::Object(fixed) = fixed_value else {
            return Err(ItemError::Validation("item must be a JSON object".into()));
        };

        let item_type: ItemType = fixed
            .get("item_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ItemError::Validation("item_type is required".into()))?
            .parse()
            .map_err(ItemError::Validation)?;
        let validator = self
            .by_type
            .get(&item_type)
            .ok_or_else(|| ItemError::Schema(format!("No schema for '{}'", item_type)))?;

        let residual_value = Value::Object(residual);
        if let Some(msg) = format_errors(validator.iter_errors(&residual_value)) {
            return Err(ItemError::Validation(msg));
        }
        let Value::Object(mut residual) = residual_value else {
            return Err(ItemError::Validation("item must be a JSON object".into()));
        };

        hours::check_hours(&mut residual).map_err(ItemError::Validation)?;

        let mut merged = residual;
        merged.extend(fixed);
        let draft = ItemDraft::from_object(merged)?;
        if !draft.pictures.contains(&draft.featured_picture) {
            return Err(ItemError::Validation(
                "featured_picture: must be one of pictures".into(),
            ));
        }
        Ok(draft)
    }
}
