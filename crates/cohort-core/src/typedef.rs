//! Type definitions and monotonic patches.
//!
//! A TypeDef name resolves to exactly one semantic definition across the
//! cohort. Structural comparison ignores the version number and the order of
//! attributes; the GUID, category, supertype and attribute set must agree.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_ATTRIBUTES_PER_TYPEDEF;
use crate::constants::MAX_NAME_LENGTH;
use crate::error::CoreError;
use crate::ids::Guid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDefCategory {
    Entity,
    Relationship,
    Classification,
}

impl fmt::Display for TypeDefCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeDefCategory::Entity => "entity",
            TypeDefCategory::Relationship => "relationship",
            TypeDefCategory::Classification => "classification",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefAttribute {
    pub name: String,
    pub attribute_type: String,
    #[serde(default)]
    pub required: bool,
}

impl TypeDefAttribute {
    pub fn new(name: impl Into<String>, attribute_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: attribute_type.into(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub guid: Guid,
    pub name: String,
    pub version: u64,
    pub category: TypeDefCategory,
    #[serde(default)]
    pub attributes: Vec<TypeDefAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supertype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Result of comparing a held definition with an incoming one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefCompatibility {
    /// Same structure; versions may differ.
    Identical,
    /// The incoming definition is an additive extension at a higher version.
    Extends,
    /// The held definition already extends the incoming one.
    ExtendedBy,
    /// The definitions cannot both be true.
    Incompatible(String),
}

impl TypeDefCompatibility {
    pub fn is_compatible(&self) -> bool {
        !matches!(self, TypeDefCompatibility::Incompatible(_))
    }
}

impl TypeDef {
    /// A version 1 definition with no attributes.
    pub fn new(guid: Guid, name: impl Into<String>, category: TypeDefCategory) -> Self {
        Self {
            guid,
            name: name.into(),
            version: 1,
            category,
            attributes: Vec::new(),
            supertype: None,
            description: None,
        }
    }

    pub fn with_attribute(mut self, attribute: TypeDefAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_supertype(mut self, supertype: impl Into<String>) -> Self {
        self.supertype = Some(supertype.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&TypeDefAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    fn attribute_map(&self) -> BTreeMap<&str, &TypeDefAttribute> {
        self.attributes.iter().map(|a| (a.name.as_str(), a)).collect()
    }

    /// Structural equality ignoring version, description and attribute order.
    pub fn is_structurally_identical(&self, other: &TypeDef) -> bool {
        self.guid == other.guid
            && self.name == other.name
            && self.category == other.category
            && self.supertype == other.supertype
            && self.attribute_map() == other.attribute_map()
    }

    /// Whether `extension` adds to `self` without changing anything held.
    fn is_extended_by(&self, extension: &TypeDef) -> bool {
        let supertype_kept = match (&self.supertype, &extension.supertype) {
            (Some(held), Some(ext)) => held == ext,
            (None, _) => true,
            (Some(_), None) => false,
        };
        if !supertype_kept {
            return false;
        }
        let ext_attrs = extension.attribute_map();
        self.attributes.iter().all(|a| ext_attrs.get(a.name.as_str()) == Some(&a))
    }

    /// Compare the held definition (`self`) with an incoming one.
    pub fn compatibility(&self, incoming: &TypeDef) -> TypeDefCompatibility {
        if self.name != incoming.name {
            return TypeDefCompatibility::Incompatible(format!(
                "names differ: held {}, incoming {}",
                self.name, incoming.name
            ));
        }
        if self.guid != incoming.guid {
            return TypeDefCompatibility::Incompatible(format!(
                "guid {} differs from held guid {}",
                incoming.guid, self.guid
            ));
        }
        if self.category != incoming.category {
            return TypeDefCompatibility::Incompatible(format!(
                "category {} differs from held category {}",
                incoming.category, self.category
            ));
        }
        if self.is_structurally_identical(incoming) {
            return TypeDefCompatibility::Identical;
        }
        if incoming.version > self.version && self.is_extended_by(incoming) {
            return TypeDefCompatibility::Extends;
        }
        if self.version > incoming.version && incoming.is_extended_by(self) {
            return TypeDefCompatibility::ExtendedBy;
        }
        TypeDefCompatibility::Incompatible(format!(
            "structure of version {} diverges from held version {}",
            incoming.version, self.version
        ))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(CoreError::invalid("typedef.name", format!("invalid name '{}'", self.name)));
        }
        if self.guid.is_empty() {
            return Err(CoreError::invalid("typedef.guid", format!("{} has no guid", self.name)));
        }
        if self.version == 0 {
            return Err(CoreError::invalid("typedef.version", format!("{} has version 0", self.name)));
        }
        if self.attributes.len() > MAX_ATTRIBUTES_PER_TYPEDEF {
            return Err(CoreError::invalid(
                "typedef.attributes",
                format!("{} has {} attributes (max {})", self.name, self.attributes.len(), MAX_ATTRIBUTES_PER_TYPEDEF),
            ));
        }
        let mut seen = BTreeSet::new();
        for attribute in &self.attributes {
            if attribute.name.trim().is_empty() || attribute.name.len() > MAX_NAME_LENGTH {
                return Err(CoreError::invalid("typedef.attributes", format!("{} has an unnamed attribute", self.name)));
            }
            if !seen.insert(attribute.name.as_str()) {
                return Err(CoreError::invalid(
                    "typedef.attributes",
                    format!("{} declares attribute {} twice", self.name, attribute.name),
                ));
            }
        }
        if self.supertype.as_deref() == Some(self.name.as_str()) {
            return Err(CoreError::invalid("typedef.supertype", format!("{} is its own supertype", self.name)));
        }
        Ok(())
    }

    /// Produce the patched definition at `version + 1`.
    ///
    /// Fails with [`CoreError::VersionMismatch`] if the patch is bound to a
    /// different version; `self` is never modified.
    pub fn apply_patch(&self, patch: &TypeDefPatch) -> Result<TypeDef, CoreError> {
        if patch.type_name != self.name {
            return Err(CoreError::invalid(
                "patch.type_name",
                format!("patch for {} applied to {}", patch.type_name, self.name),
            ));
        }
        if patch.applies_to_version != self.version {
            return Err(CoreError::VersionMismatch {
                subject: self.name.clone(),
                expected: patch.applies_to_version,
                actual: self.version,
            });
        }
        if patch.is_empty() {
            return Err(CoreError::invalid("patch", format!("patch for {} changes nothing", self.name)));
        }

        let mut patched = self.clone();
        for attribute in &patch.new_attributes {
            if patched.attribute(&attribute.name).is_some() {
                return Err(CoreError::invalid(
                    "patch.new_attributes",
                    format!("{} already has attribute {}", self.name, attribute.name),
                ));
            }
            patched.attributes.push(attribute.clone());
        }
        if let Some(supertype) = &patch.new_supertype {
            match &self.supertype {
                Some(existing) if existing != supertype => {
                    return Err(CoreError::invalid(
                        "patch.new_supertype",
                        format!("{} already has supertype {}", self.name, existing),
                    ));
                }
                _ => patched.supertype = Some(supertype.clone()),
            }
        }
        if let Some(description) = &patch.new_description {
            patched.description = Some(description.clone());
        }
        patched.version = self.version + 1;
        patched.validate()?;
        Ok(patched)
    }
}

/// Additive delta bound to a specific prior version of a TypeDef.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefPatch {
    pub type_name: String,
    pub applies_to_version: u64,
    #[serde(default)]
    pub new_attributes: Vec<TypeDefAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_supertype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_description: Option<String>,
}

impl TypeDefPatch {
    pub fn new(type_name: impl Into<String>, applies_to_version: u64) -> Self {
        Self {
            type_name: type_name.into(),
            applies_to_version,
            new_attributes: Vec::new(),
            new_supertype: None,
            new_description: None,
        }
    }

    pub fn add_attribute(mut self, attribute: TypeDefAttribute) -> Self {
        self.new_attributes.push(attribute);
        self
    }

    pub fn set_supertype(mut self, supertype: impl Into<String>) -> Self {
        self.new_supertype = Some(supertype.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_attributes.is_empty() && self.new_supertype.is_none() && self.new_description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset() -> TypeDef {
        TypeDef::new(Guid::new("asset-guid"), "Asset", TypeDefCategory::Entity)
            .with_attribute(TypeDefAttribute::new("name", "string").required())
            .with_attribute(TypeDefAttribute::new("owner", "string"))
    }

    #[test]
    fn test_attribute_order_and_version_are_ignored() {
        let mut reordered = asset().with_version(4);
        reordered.attributes.reverse();
        assert!(asset().is_structurally_identical(&reordered));
        assert_eq!(asset().compatibility(&reordered), TypeDefCompatibility::Identical);
    }

    #[test]
    fn test_different_guid_is_incompatible() {
        let mut other = asset();
        other.guid = Guid::new("other-guid");
        assert!(!asset().compatibility(&other).is_compatible());
    }

    #[test]
    fn test_different_attribute_type_is_incompatible() {
        let mut other = asset().with_version(2);
        other.attributes[1].attribute_type = "int".to_string();
        assert!(!asset().compatibility(&other).is_compatible());
    }

    #[test]
    fn test_additive_extension_at_higher_version_is_compatible() {
        let extended = asset().with_version(2).with_attribute(TypeDefAttribute::new("zone", "string"));
        assert_eq!(asset().compatibility(&extended), TypeDefCompatibility::Extends);
        assert_eq!(extended.compatibility(&asset()), TypeDefCompatibility::ExtendedBy);
    }

    #[test]
    fn test_extension_at_same_version_is_incompatible() {
        let extended = asset().with_attribute(TypeDefAttribute::new("zone", "string"));
        assert!(!asset().compatibility(&extended).is_compatible());
    }

    #[test]
    fn test_patch_applies_to_exact_version_only() {
        let patch = TypeDefPatch::new("Asset", 2).add_attribute(TypeDefAttribute::new("zone", "string"));
        let err = asset().apply_patch(&patch).unwrap_err();
        assert_eq!(err, CoreError::VersionMismatch {
            subject: "Asset".to_string(),
            expected: 2,
            actual: 1,
        });

        let v2 = asset()
            .apply_patch(&TypeDefPatch::new("Asset", 1).add_attribute(TypeDefAttribute::new("zone", "string")))
            .unwrap();
        assert_eq!(v2.version, 2);
        let v3 = v2.apply_patch(&TypeDefPatch::new("Asset", 2).set_supertype("Referenceable")).unwrap();
        assert_eq!(v3.version, 3);
        assert_eq!(v3.supertype.as_deref(), Some("Referenceable"));
        assert_eq!(v3.compatibility(&asset()), TypeDefCompatibility::ExtendedBy);
    }

    #[test]
    fn test_patch_rejects_existing_attribute_and_empty_delta() {
        let dup = TypeDefPatch::new("Asset", 1).add_attribute(TypeDefAttribute::new("name", "string"));
        assert!(matches!(asset().apply_patch(&dup), Err(CoreError::InvalidParameter { .. })));
        assert!(matches!(asset().apply_patch(&TypeDefPatch::new("Asset", 1)), Err(CoreError::InvalidParameter { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicate_attributes() {
        let bad = asset().with_attribute(TypeDefAttribute::new("name", "string"));
        assert!(bad.validate().is_err());
        assert!(asset().validate().is_ok());
    }
}
