//! Array-like field classification.

use crate::config::TranslatableConfig;
use crate::model::ModelSchema;

/// Decides whether a translatable attribute holds an opaque structured value.
///
/// Array-like attributes are stored whole per locale and are never read as a
/// `locale -> value` map, even when their keys look like locale tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldClassifier {
    attributes: Vec<String>,
    casts: Vec<String>,
    declared_casts: Vec<(String, String)>,
}

impl FieldClassifier {
    /// Build the classifier for one host record type.
    ///
    /// Attribute names and cast kinds are the de-duplicated union of the
    /// global configuration and the record type's own overrides.
    pub fn for_model(config: &TranslatableConfig, schema: &ModelSchema) -> Self {
        let declared_casts = schema
            .casts()
            .map(|(field, cast)| (field.to_string(), cast.to_string()))
            .collect();

        Self {
            attributes: union(&config.array_like_attributes, schema.array_like_attributes()),
            casts: union(&config.array_like_casts, schema.array_like_casts()),
            declared_casts,
        }
    }

    pub fn is_array_like(&self, key: &str) -> bool {
        if self.attributes.iter().any(|attr| attr == key) {
            return true;
        }

        self.declared_casts
            .iter()
            .find(|(field, _)| field == key)
            .map(|(_, cast)| self.casts.iter().any(|kind| kind == cast))
            .unwrap_or(false)
    }

    pub fn array_like_attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn array_like_casts(&self) -> &[String] {
        &self.casts
    }
}

fn union(global: &[String], local: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(global.len() + local.len());
    for item in global.iter().chain(local) {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}
