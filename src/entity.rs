//! Core entity trait that all stored entities must implement.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait that all entities held by an `EntityStore` must implement.
///
/// The two required items name the entity's id and the resource it lives
/// under. Everything else has a JSON-shaped default that fits the usual
/// REST payloads and can be overridden per type.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use entity_kit::Entity;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct ProjectGroup {
///     pub id: String,
///     pub name: String,
///     #[serde(default)]
///     pub members: Option<Vec<String>>,
/// }
///
/// impl Entity for ProjectGroup {
///     type Key = String;
///
///     fn entity_key(&self) -> Self::Key {
///         self.id.clone()
///     }
///
///     fn resource() -> &'static str {
///         "project-groups"
///     }
///
///     fn deep_resources() -> &'static [&'static str] {
///         &["members"]
///     }
/// }
/// ```
pub trait Entity: Send + Sync + Serialize + DeserializeOwned + Clone + 'static {
    /// Type of the entity's id (typically String or an integer)
    type Key: Display
        + Debug
        + Clone
        + Send
        + Sync
        + Eq
        + Hash
        + Serialize
        + DeserializeOwned
        + 'static;

    /// Return the entity's id.
    fn entity_key(&self) -> Self::Key;

    /// Path prefix of the entity's collection, e.g. `"project-groups"`.
    fn resource() -> &'static str;

    /// Name of the id field in payloads.
    fn id_field() -> &'static str {
        "id"
    }

    /// Sub-resources fetched for deep hydration, relative to the item path.
    ///
    /// Empty means the shallow payload is already complete.
    fn deep_resources() -> &'static [&'static str] {
        &[]
    }

    /// Attach deep fields fetched from `deep_resources()`.
    ///
    /// Each part arrives as `(sub_resource, body)`. The default writes every
    /// body into the field named after the sub-resource's last path segment,
    /// with `-` mapped to `_`.
    fn hydrate_deep(&mut self, parts: Vec<(&'static str, Value)>) -> Result<()> {
        let mut patch = Map::new();
        for (sub, body) in parts {
            let field = sub.rsplit('/').next().unwrap_or(sub).replace('-', "_");
            patch.insert(field, body);
        }
        *self = self.merged(&Value::Object(patch))?;
        Ok(())
    }

    /// Optional: validate the entity after decoding.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Decode a single-entity payload.
    ///
    /// Endpoints often omit the id from the body; it is filled in from the
    /// requested id when absent.
    fn from_payload(id: &Self::Key, payload: Value) -> Result<Self> {
        let payload = match payload {
            Value::Object(mut map) => {
                if !map.contains_key(Self::id_field()) {
                    map.insert(Self::id_field().to_string(), serde_json::to_value(id)?);
                }
                Value::Object(map)
            }
            other => other,
        };
        let entity: Self = serde_json::from_value(payload)?;
        entity.validate()?;
        Ok(entity)
    }

    /// Apply a JSON merge patch (RFC 7386) to a copy of this entity.
    fn merged(&self, patch: &Value) -> Result<Self> {
        let mut current = serde_json::to_value(self)?;
        merge_patch(&mut current, patch);
        let entity: Self = serde_json::from_value(current)?;
        entity.validate()?;
        Ok(entity)
    }

    /// Extract ids from a collection listing.
    ///
    /// Accepts `[id, ...]`, `[{id, ...}, ...]`, or either wrapped as
    /// `{"items": [...]}`.
    fn ids_from_listing(listing: Value) -> Result<Vec<Self::Key>> {
        let items = match listing {
            Value::Object(mut map) => map.remove("items").ok_or_else(|| {
                Error::InvalidResponse("listing object has no `items` field".to_string())
            })?,
            other => other,
        };

        let Value::Array(items) = items else {
            return Err(Error::InvalidResponse(format!(
                "listing for `{}` is not an array",
                Self::resource()
            )));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut map) => {
                    let id = map.remove(Self::id_field()).ok_or_else(|| {
                        Error::InvalidResponse(format!(
                            "listing item has no `{}` field",
                            Self::id_field()
                        ))
                    })?;
                    Ok(serde_json::from_value(id)?)
                }
                other => Ok(serde_json::from_value(other)?),
            })
            .collect()
    }

    /// Extract the id of a freshly created entity from the create response.
    ///
    /// The response may be the bare id or an object carrying the id field.
    fn key_from_response(response: &Value) -> Option<Self::Key> {
        match response {
            Value::Null => None,
            Value::Object(map) => map
                .get(Self::id_field())
                .and_then(|id| serde_json::from_value(id.clone()).ok()),
            other => serde_json::from_value(other.clone()).ok(),
        }
    }
}

/// RFC 7386 merge: objects merge recursively, `null` deletes, anything else replaces.
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Some(map) = target.as_object_mut() {
        for (key, value) in patch_map {
            if value.is_null() {
                map.remove(key);
            } else {
                merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
