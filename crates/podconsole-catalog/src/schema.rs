//! File-Based Catalog records
//!
//! A catalog feed is a sequence of JSON objects tagged by `schema`. Three
//! schemas are stored: packages, channels and bundles. Every stored object
//! gets a composite id `catalog~package[~object]` so identically named
//! objects from different catalogs and packages never collide.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Separator between the parts of a composite id
pub const ID_SEPARATOR: char = '~';

/// Bundle property carrying the CSV metadata
pub const CSV_METADATA_PROPERTY: &str = "olm.csv.metadata";

/// Bundle property carrying the package name and version
pub const PACKAGE_PROPERTY: &str = "olm.package";

/// Stored object schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Schema {
    /// `olm.package`
    #[serde(rename = "olm.package")]
    Package,
    /// `olm.channel`
    #[serde(rename = "olm.channel")]
    Channel,
    /// `olm.bundle`
    #[serde(rename = "olm.bundle")]
    Bundle,
}

impl Schema {
    /// All stored schemas
    pub const ALL: [Schema; 3] = [Schema::Package, Schema::Channel, Schema::Bundle];

    /// Parse a schema tag; unknown tags yield `None`
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "olm.package" => Some(Self::Package),
            "olm.channel" => Some(Self::Channel),
            "olm.bundle" => Some(Self::Bundle),
            _ => None,
        }
    }

    /// Schema tag as it appears in feeds
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "olm.package",
            Self::Channel => "olm.channel",
            Self::Bundle => "olm.bundle",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite id rules
///
/// Schemas listed in `suffixless` are keyed by `catalog~package`; all others
/// get the object name appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdScheme {
    /// Schema tags whose ids carry no object suffix
    #[serde(default = "default_suffixless")]
    pub suffixless: Vec<String>,
}

fn default_suffixless() -> Vec<String> {
    vec![Schema::Package.as_str().to_string()]
}

impl Default for IdScheme {
    fn default() -> Self {
        Self {
            suffixless: default_suffixless(),
        }
    }
}

impl IdScheme {
    /// Fully-qualified package id
    #[must_use]
    pub fn package_id(catalog: &str, package: &str) -> String {
        format!("{catalog}{ID_SEPARATOR}{package}")
    }

    /// Composite id of an object
    #[must_use]
    pub fn object_id(&self, schema: Schema, catalog: &str, package: &str, name: &str) -> String {
        let package_id = Self::package_id(catalog, package);
        if self.suffixless.iter().any(|s| s == schema.as_str()) {
            package_id
        } else {
            format!("{package_id}{ID_SEPARATOR}{name}")
        }
    }
}

/// A catalog to ingest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogSource {
    /// Catalog name, used in ids and in the feed URL
    pub name: String,
}

impl CatalogSource {
    /// Create a source
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One stored package, channel or bundle
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    /// Composite id
    pub id: String,
    /// Schema of the object
    pub schema: Schema,
    /// Owning catalog
    pub catalog: String,
    /// Fully-qualified package id (`catalog~package`)
    pub package: String,
    /// Object name
    pub name: String,
    /// Decoded object, unchanged
    pub body: Value,
}

/// Why a decoded object was not turned into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// Schema not stored by this pipeline
    UnknownSchema(String),
    /// Bundle without CSV metadata
    MissingCsvMetadata(String),
}

impl CatalogRecord {
    /// Classify a decoded feed object.
    ///
    /// Returns `Ok(Err(skip))` for objects that are deliberately not stored
    /// and `Err` for objects of a stored schema that lack required fields.
    pub fn from_object(
        catalog: &str,
        body: Value,
        ids: &IdScheme,
    ) -> Result<std::result::Result<Self, Skip>> {
        let tag = body.get("schema").and_then(Value::as_str).unwrap_or_default();
        let Some(schema) = Schema::from_tag(tag) else {
            return Ok(Err(Skip::UnknownSchema(tag.to_string())));
        };

        let name = string_field(&body, "name")
            .ok_or_else(|| Error::InvalidObject(format!("{schema} object without a name")))?
            .to_string();
        let package = match schema {
            Schema::Package => name.clone(),
            Schema::Channel | Schema::Bundle => string_field(&body, "package")
                .ok_or_else(|| Error::InvalidObject(format!("{schema} {name} without a package")))?
                .to_string(),
        };

        if schema == Schema::Bundle && property(&body, CSV_METADATA_PROPERTY).is_none() {
            return Ok(Err(Skip::MissingCsvMetadata(name)));
        }

        Ok(Ok(Self {
            id: ids.object_id(schema, catalog, &package, &name),
            schema,
            catalog: catalog.to_string(),
            package: IdScheme::package_id(catalog, &package),
            name,
            body,
        }))
    }
}

fn string_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Value of the first bundle property of `kind`
#[must_use]
pub fn property<'a>(bundle: &'a Value, kind: &str) -> Option<&'a Value> {
    bundle
        .get("properties")?
        .as_array()?
        .iter()
        .find(|p| p.get("type").and_then(Value::as_str) == Some(kind))?
        .get("value")
}

/// Denormalized per-package entry shown in the catalog browser
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// `catalog~package`
    pub id: String,
    /// Owning catalog
    pub catalog: String,
    /// Package name
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Default channel of the package
    pub default_channel: Option<String>,
    /// Channel name to ordered entry names
    pub channels: BTreeMap<String, Vec<String>>,
    /// Version of the newest bundle
    pub latest_version: Option<String>,
    /// Short description
    pub description: Option<String>,
    /// Provider name
    pub provider: Option<String>,
    /// Categories
    pub categories: Vec<String>,
    /// Operator capability level
    pub capabilities: Option<String>,
    /// Search keywords
    pub keywords: Vec<String>,
    /// Icon as a `data:` URI
    pub icon: Option<String>,
    /// Source repository
    pub repository: Option<String>,
    /// Operator container image
    pub container_image: Option<String>,
    /// Support link or contact
    pub support: Option<String>,
    /// Creation timestamp as published
    pub created_at: Option<String>,
    /// Subscriptions the operator is valid for
    pub valid_subscription: Vec<String>,
    /// Source catalog name
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(with_csv: bool) -> Value {
        let mut properties = vec![json!({
            "type": "olm.package",
            "value": {"packageName": "etcd", "version": "0.9.4"}
        })];
        if with_csv {
            properties.push(json!({"type": "olm.csv.metadata", "value": {"displayName": "etcd"}}));
        }
        json!({
            "schema": "olm.bundle",
            "name": "etcdoperator.v0.9.4",
            "package": "etcd",
            "properties": properties,
        })
    }

    #[test]
    fn test_package_id_has_no_suffix() {
        let record = CatalogRecord::from_object(
            "community",
            json!({"schema": "olm.package", "name": "etcd", "defaultChannel": "stable"}),
            &IdScheme::default(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(record.id, "community~etcd");
        assert_eq!(record.package, "community~etcd");
        assert_eq!(record.schema, Schema::Package);
    }

    #[test]
    fn test_channel_and_bundle_ids_have_suffix() {
        let ids = IdScheme::default();
        let channel = CatalogRecord::from_object(
            "community",
            json!({"schema": "olm.channel", "name": "stable", "package": "etcd", "entries": []}),
            &ids,
        )
        .unwrap()
        .unwrap();
        assert_eq!(channel.id, "community~etcd~stable");

        let bundle = CatalogRecord::from_object("community", bundle(true), &ids)
            .unwrap()
            .unwrap();
        assert_eq!(bundle.id, "community~etcd~etcdoperator.v0.9.4");
        assert_eq!(bundle.package, "community~etcd");
    }

    #[test]
    fn test_configurable_suffixless_schemas() {
        let ids = IdScheme {
            suffixless: vec!["olm.package".into(), "olm.channel".into()],
        };
        assert_eq!(
            ids.object_id(Schema::Channel, "c", "p", "stable"),
            "c~p"
        );
        assert_eq!(ids.object_id(Schema::Bundle, "c", "p", "b"), "c~p~b");
    }

    #[test]
    fn test_bundle_without_csv_metadata_is_skipped() {
        let outcome =
            CatalogRecord::from_object("community", bundle(false), &IdScheme::default()).unwrap();
        assert_eq!(
            outcome,
            Err(Skip::MissingCsvMetadata("etcdoperator.v0.9.4".into()))
        );
    }

    #[test]
    fn test_unknown_schema_is_skipped() {
        let outcome = CatalogRecord::from_object(
            "community",
            json!({"schema": "olm.deprecations", "package": "etcd"}),
            &IdScheme::default(),
        )
        .unwrap();
        assert_eq!(outcome, Err(Skip::UnknownSchema("olm.deprecations".into())));
    }

    #[test]
    fn test_missing_name_is_invalid() {
        let err = CatalogRecord::from_object(
            "community",
            json!({"schema": "olm.channel", "package": "etcd"}),
            &IdScheme::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_object");
    }

    #[test]
    fn test_property_lookup() {
        let bundle = bundle(true);
        assert_eq!(
            property(&bundle, "olm.package").and_then(|v| v.get("version")),
            Some(&json!("0.9.4"))
        );
        assert!(property(&bundle, "olm.gvk").is_none());
    }
}
