//! Schema loading and `extends` resolution
//!
//! Files under `utils/` are reusable fragments. Every other file is a
//! top-level schema keyed by its `title`. A schema may name a parent with
//! `"extends": "<title>"`; the parent's `properties` are copied in (a
//! property defined on both is an error) and `required` lists are
//! concatenated. Parents are resolved before children.

use std::collections::{BTreeMap, HashSet};

use include_dir::Dir;
use serde_json::{Map, Value};

use crate::error::ItemError;

/// Base URI every schema and fragment is registered under
pub const SCHEMA_BASE: &str = "https://items.local/schemas";

const FRAGMENT_DIR: &str = "utils";

pub struct LoadedSchemas {
    /// Expanded top-level schemas by title, each with an `$id`
    pub top_level: BTreeMap<String, Value>,
    /// Fragment URI and contents
    pub fragments: Vec<(String, Value)>,
}

fn parse_file(path: &str, contents: Option<&str>) -> Result<Value, ItemError> {
    let text = contents.ok_or_else(|| ItemError::Schema(format!("{} is not UTF-8", path)))?;
    serde_json::from_str(text).map_err(|e| ItemError::Schema(format!("{}: {}", path, e)))
}

pub fn load(dir: &Dir<'_>) -> Result<LoadedSchemas, ItemError> {
    let mut raw = BTreeMap::new();
    for file in dir.files() {
        let path = file.path().display().to_string();
        if !path.ends_with(".json") {
            continue;
        }
        let value = parse_file(&path, file.contents_utf8())?;
        let title = value
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ItemError::Schema(format!("{} has no title", path)))?
            .to_string();
        if raw.insert(title.clone(), value).is_some() {
            return Err(ItemError::Schema(format!("Duplicate schema title '{}'", title)));
        }
    }

    let mut fragments = Vec::new();
    if let Some(utils) = dir.get_dir(FRAGMENT_DIR) {
        for file in utils.files() {
            let path = file.path().display().to_string();
            let value = parse_file(&path, file.contents_utf8())?;
            fragments.push((format!("{}/{}", SCHEMA_BASE, path), value));
        }
    }

    let mut top_level = expand_extends(raw)?;
    for (title, schema) in top_level.iter_mut() {
        if let Value::Object(obj) = schema {
            obj.insert("$id".into(), Value::String(format!("{}/{}.json", SCHEMA_BASE, title)));
        }
    }

    Ok(LoadedSchemas { top_level, fragments })
}

fn parent_of(schema: &Value) -> Option<&str> {
    schema.get("extends").and_then(Value::as_str)
}

/// Order titles so every parent precedes its children
fn topo_order(schemas: &BTreeMap<String, Value>) -> Result<Vec<String>, ItemError> {
    fn visit(
        title: &str,
        schemas: &BTreeMap<String, Value>,
        done: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), ItemError> {
        if done.contains(title) {
            return Ok(());
        }
        if !in_progress.insert(title.to_string()) {
            return Err(ItemError::Schema(format!("Cyclic extends involving '{}'", title)));
        }
        let schema = schemas
            .get(title)
            .ok_or_else(|| ItemError::Schema(format!("Unknown schema '{}' in extends", title)))?;
        if let Some(parent) = parent_of(schema) {
            visit(parent, schemas, done, in_progress, order)?;
        }
        in_progress.remove(title);
        done.insert(title.to_string());
        order.push(title.to_string());
        Ok(())
    }

    let mut done = HashSet::new();
    let mut in_progress = HashSet::new();
    let mut order = Vec::with_capacity(schemas.len());
    for title in schemas.keys() {
        visit(title, schemas, &mut done, &mut in_progress, &mut order)?;
    }
    Ok(order)
}

fn object_field<'a>(schema: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
    schema.as_object_mut()?.get_mut(key)?.as_object_mut()
}

pub fn expand_extends(
    mut schemas: BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, ItemError> {
    for title in topo_order(&schemas)? {
        let parent = match schemas.get(&title).and_then(parent_of) {
            Some(parent) => parent.to_string(),
            None => continue,
        };
        let parent_schema = schemas.get(&parent).cloned().unwrap_or(Value::Null);
        let parent_props = parent_schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let parent_required = parent_schema
            .get("required")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let Some(child) = schemas.get_mut(&title) else {
            continue;
        };
        let Some(obj) = child.as_object_mut() else {
            return Err(ItemError::Schema(format!("Schema '{}' is not an object", title)));
        };
        obj.remove("extends");
        obj.entry("properties").or_insert_with(|| Value::Object(Map::new()));

        if let Some(props) = object_field(child, "properties") {
            for (name, prop) in parent_props {
                if props.contains_key(&name) {
                    return Err(ItemError::Schema(format!(
                        "Schema '{}' redefines property '{}' from '{}'",
                        title, name, parent
                    )));
                }
                props.insert(name, prop);
            }
        }

        if let Some(obj) = child.as_object_mut() {
            let mut required = parent_required;
            if let Some(Value::Array(own)) = obj.remove("required") {
                for r in own {
                    if !required.contains(&r) {
                        required.push(r);
                    }
                }
            }
            if !required.is_empty() {
                obj.insert("required".into(), Value::Array(required));
            }
        }
    }
    Ok(schemas)
}

/// Every `category:<name>` format referenced anywhere in `schema`
pub fn category_formats(schema: &Value, out: &mut Vec<String>) {
    match schema {
        Value::Object(obj) => {
            for (key, value) in obj {
                if key == "format" {
                    if let Some(name) = value.as_str().and_then(|f| f.strip_prefix("category:")) {
                        if !out.iter().any(|n| n == name) {
                            out.push(name.to_string());
                        }
                    }
                } else {
                    category_formats(value, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| category_formats(v, out)),
        _ => {}
    }
}
