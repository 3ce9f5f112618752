//! Ordered schema migrations over raw JSON documents.
//!
//! Each step is pure and idempotent: applying it to a document that already
//! has the target layout returns the document unchanged apart from the
//! version stamp.

use serde_json::{Map, Value, json};

use crate::registry::TokenDefaults;

pub const CURRENT_VERSION: u32 = 3;

/// Inputs a migration needs that the document itself does not carry.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationContext {
    pub defaults: TokenDefaults,
    /// Surface that owned instance ids recorded before per-surface state existed.
    pub legacy_surface: String,
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self {
            defaults: TokenDefaults::default(),
            legacy_surface: "primary".to_string(),
        }
    }
}

impl MigrationContext {
    pub fn with_defaults(mut self, defaults: TokenDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_legacy_surface(mut self, surface: impl Into<String>) -> Self {
        self.legacy_surface = surface.into();
        self
    }
}

type Step = fn(Value, &MigrationContext) -> Value;

const STEPS: [(u32, Step); 3] = [(1, create_root), (2, fill_geometry), (3, split_surfaces)];

/// Schema version of a document. Missing or fractional versions predate
/// the integer scheme and count as zero.
pub fn version_of(doc: &Value) -> u32 {
    doc.get("version")
        .and_then(Value::as_u64)
        .map(|v| v.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

pub fn migrate(mut doc: Value, context: &MigrationContext) -> Value {
    for (target, step) in STEPS {
        if version_of(&doc) < target {
            doc = step(doc, context);
            stamp(&mut doc, target);
        }
    }
    doc
}

fn stamp(doc: &mut Value, version: u32) {
    if let Some(root) = doc.as_object_mut() {
        root.insert("version".to_string(), json!(version));
    }
}

/// v0 -> v1: a root object with `counters` and `groups`; the legacy `tokens`
/// table becomes `groups`.
pub fn create_root(doc: Value, _context: &MigrationContext) -> Value {
    let mut root = match doc {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let groups = root
        .remove("groups")
        .or_else(|| root.remove("tokens"))
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({}));
    let counters = root
        .remove("counters")
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({}));
    root.remove("debug");
    root.insert("counters".to_string(), counters);
    root.insert("groups".to_string(), groups);
    Value::Object(root)
}

/// v1 -> v2: complete group geometry, rename legacy keys, and treat a
/// counter max of zero as "no maximum".
pub fn fill_geometry(mut doc: Value, context: &MigrationContext) -> Value {
    let defaults = context.defaults;
    if let Some(counters) = doc.get_mut("counters").and_then(Value::as_object_mut) {
        for counter in counters.values_mut() {
            if counter.get("max").and_then(Value::as_u64) == Some(0) {
                counter["max"] = Value::Null;
            }
        }
    }
    let Some(groups) = doc.get_mut("groups").and_then(Value::as_object_mut) else {
        return doc;
    };
    for (name, group) in groups.iter_mut() {
        let Some(fields) = group.as_object_mut() else {
            continue;
        };
        if let Some(source) = fields.remove("imgSrc") {
            fields.entry("imageSource").or_insert(source);
        }
        fields.remove("tokenName");
        fields.insert("name".to_string(), json!(name));

        let width = number_or(fields, "width", defaults.width);
        let height = number_or(fields, "height", defaults.height);
        fields.insert("width".to_string(), json!(width));
        fields.insert("height".to_string(), json!(height));

        // Legacy spaceX/spaceY held the full pitch, item size included.
        let legacy_x = fields.remove("spaceX").and_then(|v| v.as_f64());
        let legacy_y = fields.remove("spaceY").and_then(|v| v.as_f64());
        if !fields.contains_key("spacingX") {
            let spacing = legacy_x.map_or(defaults.spacing_x, |pitch| (pitch - width).max(0.0));
            fields.insert("spacingX".to_string(), json!(spacing));
        }
        if !fields.contains_key("spacingY") {
            let spacing = legacy_y.map_or(defaults.spacing_y, |pitch| (pitch - height).max(0.0));
            fields.insert("spacingY".to_string(), json!(spacing));
        }

        let left = fields.remove("left").and_then(|v| v.as_f64());
        let top = fields.remove("top").and_then(|v| v.as_f64());
        if !fields.contains_key("anchor") {
            fields.insert(
                "anchor".to_string(),
                json!({
                    "left": left.unwrap_or(defaults.left),
                    "top": top.unwrap_or(defaults.top),
                }),
            );
        }
    }
    doc
}

/// v2 -> v3: instance ids recorded without a surface move under the legacy surface.
pub fn split_surfaces(mut doc: Value, context: &MigrationContext) -> Value {
    let Some(groups) = doc.get_mut("groups").and_then(Value::as_object_mut) else {
        return doc;
    };
    for group in groups.values_mut() {
        let Some(fields) = group.as_object_mut() else {
            continue;
        };
        let legacy_ids = fields.remove("imgIds");
        let per_surface = fields
            .entry("perSurface")
            .or_insert_with(|| json!({}));
        if !per_surface.is_object() {
            *per_surface = json!({});
        }
        if let (Some(ids), Some(surfaces)) = (legacy_ids, per_surface.as_object_mut()) {
            let has_ids = ids.as_array().is_some_and(|ids| !ids.is_empty());
            if has_ids && !surfaces.contains_key(&context.legacy_surface) {
                surfaces.insert(context.legacy_surface.clone(), json!({ "instanceIds": ids }));
            }
        }
    }
    doc
}

fn number_or(fields: &Map<String, Value>, key: &str, fallback: f64) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MigrationContext {
        MigrationContext::default().with_legacy_surface("page-1")
    }

    #[test]
    fn create_root_builds_empty_document() {
        let doc = migrate(Value::Null, &ctx());
        assert_eq!(doc, json!({ "version": 3, "counters": {}, "groups": {} }));
    }

    #[test]
    fn create_root_adopts_legacy_tokens_table() {
        let doc = create_root(json!({ "version": 0.1, "tokens": { "a": {} }, "debug": true }), &ctx());
        assert_eq!(doc["groups"], json!({ "a": {} }));
        assert!(doc.get("debug").is_none());
        assert!(doc.get("tokens").is_none());
    }

    #[test]
    fn fill_geometry_converts_legacy_pitch_and_position() {
        let doc = json!({
            "counters": { "hp": { "current": 3, "max": 0 } },
            "groups": {
                "hp-token": {
                    "tokenName": "hp-token",
                    "counterName": "hp",
                    "imgSrc": "img",
                    "top": 12, "left": 40,
                    "width": 20, "height": 30,
                    "spaceX": 25, "spaceY": 10
                }
            }
        });
        let doc = fill_geometry(doc, &ctx());
        let group = &doc["groups"]["hp-token"];
        assert_eq!(group["name"], "hp-token");
        assert_eq!(group["imageSource"], "img");
        assert_eq!(group["spacingX"], json!(5.0));
        assert_eq!(group["spacingY"], json!(0.0));
        assert_eq!(group["anchor"], json!({ "left": 40.0, "top": 12.0 }));
        assert!(group.get("imgSrc").is_none());
        assert!(doc["counters"]["hp"]["max"].is_null());
    }

    #[test]
    fn fill_geometry_uses_defaults_for_missing_fields() {
        let doc = fill_geometry(json!({ "groups": { "g": { "counterName": "c" } } }), &ctx());
        let group = &doc["groups"]["g"];
        assert_eq!(group["width"], json!(30.0));
        assert_eq!(group["spacingX"], json!(5.0));
        assert_eq!(group["anchor"], json!({ "left": 30.0, "top": 30.0 }));
    }

    #[test]
    fn split_surfaces_moves_legacy_ids() {
        let doc = split_surfaces(json!({ "groups": { "g": { "imgIds": ["x", "y"] } } }), &ctx());
        assert_eq!(
            doc["groups"]["g"]["perSurface"],
            json!({ "page-1": { "instanceIds": ["x", "y"] } })
        );
        assert!(doc["groups"]["g"].get("imgIds").is_none());
    }

    #[test]
    fn steps_are_idempotent() {
        let legacy = json!({
            "tokens": { "g": { "counterName": "c", "imgSrc": "i", "imgIds": ["x"], "spaceX": 40 } }
        });
        let once = migrate(legacy, &ctx());
        let twice = split_surfaces(fill_geometry(create_root(once.clone(), &ctx()), &ctx()), &ctx());
        assert_eq!(once, twice);
    }

    #[test]
    fn current_version_documents_are_untouched() {
        let doc = json!({ "version": 3, "counters": {}, "groups": {}, "extra": 1 });
        assert_eq!(migrate(doc.clone(), &ctx()), doc);
    }
}
