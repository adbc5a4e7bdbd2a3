//! Resource path building.
//!
//! Every entity type lives under one collection path (`Entity::resource()`);
//! items and their deep sub-resources hang off it.

use crate::entity::Entity;

/// Builder for transport paths.
pub struct ResourcePath;

impl ResourcePath {
    /// Collection path: `"{resource}"`.
    pub fn collection<V: Entity>() -> String {
        V::resource().trim_end_matches('/').to_string()
    }

    /// Item path: `"{resource}/{id}"`.
    pub fn item<V: Entity>(id: &V::Key) -> String {
        format!("{}/{}", Self::collection::<V>(), id)
    }

    /// Sub-resource of an item: `"{resource}/{id}/{sub}"`.
    pub fn nested<V: Entity>(id: &V::Key, sub: &str) -> String {
        format!("{}/{}", Self::item::<V>(id), sub.trim_start_matches('/'))
    }
}
