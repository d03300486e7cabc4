//! Catalog data model
//!
//! Defines the record stored for every character together with the typed
//! field updates that may be applied to it:
//! - `CatalogRecord`: the persisted entry
//! - `Rarity`: closed set of rarity labels keyed by a small integer code
//! - `FieldUpdate`: operator-facing edits, one variant per editable field
//! - `RecordField`: store-level writes (operator edits plus the mirror reference)

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counter name used for character ids
pub const CHARACTER_SEQUENCE: &str = "character_id";

/// Minimum width of a formatted character id ("00", "01", ...)
pub const ID_WIDTH: usize = 2;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Zero-padded numeric character id. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(String);

impl CharacterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Format an allocated sequence value as a catalog id
    pub fn from_sequence(value: u64) -> Self {
        Self(format!("{:0width$}", value, width = ID_WIDTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a record's published representation on the display surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalRef(String);

impl ExternalRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RARITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Rare,
    Legendary,
    Medium,
    Special,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Rare,
        Rarity::Legendary,
        Rarity::Medium,
        Rarity::Special,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Rarity::Common),
            2 => Some(Rarity::Rare),
            3 => Some(Rarity::Legendary),
            4 => Some(Rarity::Medium),
            5 => Some(Rarity::Special),
            _ => None,
        }
    }

    /// Parse the textual code an operator typed ("3")
    pub fn parse_code(raw: &str) -> RegistryResult<Self> {
        raw.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_code)
            .ok_or_else(|| {
                RegistryError::Validation(format!(
                    "invalid rarity '{}', use one of 1, 2, 3, 4 or 5",
                    raw.trim()
                ))
            })
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label() == label)
    }

    pub fn code(self) -> u8 {
        match self {
            Rarity::Common => 1,
            Rarity::Rare => 2,
            Rarity::Legendary => 3,
            Rarity::Medium => 4,
            Rarity::Special => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rarity::Common => "Common",
            Rarity::Rare => "Rare",
            Rarity::Legendary => "Legendary",
            Rarity::Medium => "Medium",
            Rarity::Special => "Special",
        }
    }

    /// Glyph shown in front of the label on the channel
    pub fn marker(self) -> &'static str {
        match self {
            Rarity::Common => "⚪️",
            Rarity::Rare => "🟣",
            Rarity::Legendary => "🟡",
            Rarity::Medium => "🟢",
            Rarity::Special => "💮",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// FIELD VALIDATION
// ============================================================================

/// Turn an operator-typed name ("demon-slayer") into its display form ("Demon Slayer").
///
/// Hyphens become spaces, then every alphabetic run is capitalised and the
/// rest of the run lowercased.
pub fn normalize_name(raw: &str) -> RegistryResult<String> {
    let spaced = raw.trim().replace('-', " ");
    if spaced.trim().is_empty() {
        return Err(RegistryError::Validation("name must not be empty".to_string()));
    }

    let mut out = String::with_capacity(spaced.len());
    let mut in_word = false;
    for c in spaced.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    Ok(out)
}

/// Check that an image reference is an absolute http(s) URL
pub fn validate_image_url(raw: &str) -> RegistryResult<String> {
    let raw = raw.trim();
    let parsed = url::Url::parse(raw)
        .map_err(|e| RegistryError::Validation(format!("invalid image URL '{}': {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(RegistryError::Validation(format!(
            "image URL must be an http(s) address: {}",
            raw
        )));
    }
    Ok(raw.to_string())
}

// ============================================================================
// RECORDS
// ============================================================================

/// Validated input for a new catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCharacter {
    pub image_url: String,
    pub display_name: String,
    pub group_name: String,
    pub rarity: Rarity,
}

impl NewCharacter {
    pub fn new(image_url: &str, name: &str, anime: &str, rarity: Rarity) -> RegistryResult<Self> {
        Ok(Self {
            image_url: validate_image_url(image_url)?,
            display_name: normalize_name(name)?,
            group_name: normalize_name(anime)?,
            rarity,
        })
    }

    /// Same as [`NewCharacter::new`] with the rarity given as its textual code
    pub fn parse(image_url: &str, name: &str, anime: &str, rarity: &str) -> RegistryResult<Self> {
        Self::new(image_url, name, anime, Rarity::parse_code(rarity)?)
    }

    pub fn into_record(self, id: CharacterId) -> CatalogRecord {
        CatalogRecord {
            id,
            image_url: self.image_url,
            display_name: self.display_name,
            group_name: self.group_name,
            rarity: self.rarity,
            external_ref: None,
        }
    }
}

/// A single catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: CharacterId,
    pub image_url: String,
    pub display_name: String,
    pub group_name: String,
    pub rarity: Rarity,
    /// Present iff the record currently has a live mirror
    pub external_ref: Option<ExternalRef>,
}

impl CatalogRecord {
    pub fn is_mirrored(&self) -> bool {
        self.external_ref.is_some()
    }

    /// Apply a field write in place. The id is never touched.
    pub fn apply(&mut self, field: &RecordField) {
        match field {
            RecordField::ImageUrl(url) => self.image_url = url.clone(),
            RecordField::Name(name) => self.display_name = name.clone(),
            RecordField::Anime(anime) => self.group_name = anime.clone(),
            RecordField::Rarity(rarity) => self.rarity = *rarity,
            RecordField::ExternalRef(ext) => self.external_ref = ext.clone(),
        }
    }

    pub fn with_applied(&self, field: &RecordField) -> Self {
        let mut next = self.clone();
        next.apply(field);
        next
    }
}

// ============================================================================
// UPDATES
// ============================================================================

/// An operator edit, resolved from the `(field, value)` pair of an update
/// command. Each variant carries an already validated value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    ImageUrl(String),
    Name(String),
    Anime(String),
    Rarity(Rarity),
}

impl FieldUpdate {
    /// Field names accepted on the command surface
    pub const FIELD_NAMES: [&'static str; 4] = ["img_url", "name", "anime", "rarity"];

    pub fn parse(field: &str, value: &str) -> RegistryResult<Self> {
        match field.trim().to_ascii_lowercase().as_str() {
            "img_url" | "image_url" => Ok(FieldUpdate::ImageUrl(validate_image_url(value)?)),
            "name" => Ok(FieldUpdate::Name(normalize_name(value)?)),
            "anime" => Ok(FieldUpdate::Anime(normalize_name(value)?)),
            "rarity" => Ok(FieldUpdate::Rarity(Rarity::parse_code(value)?)),
            other => Err(RegistryError::InvalidField(format!(
                "'{}', valid fields are: {}",
                other,
                Self::FIELD_NAMES.join(", ")
            ))),
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            FieldUpdate::ImageUrl(_) => "img_url",
            FieldUpdate::Name(_) => "name",
            FieldUpdate::Anime(_) => "anime",
            FieldUpdate::Rarity(_) => "rarity",
        }
    }

    /// Whether the edit changes the published image rather than just its caption
    pub fn changes_visual(&self) -> bool {
        matches!(self, FieldUpdate::ImageUrl(_))
    }
}

/// A write the record store can apply to one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordField {
    ImageUrl(String),
    Name(String),
    Anime(String),
    Rarity(Rarity),
    ExternalRef(Option<ExternalRef>),
}

impl RecordField {
    pub fn field_name(&self) -> &'static str {
        match self {
            RecordField::ImageUrl(_) => "img_url",
            RecordField::Name(_) => "name",
            RecordField::Anime(_) => "anime",
            RecordField::Rarity(_) => "rarity",
            RecordField::ExternalRef(_) => "message_id",
        }
    }
}

impl From<FieldUpdate> for RecordField {
    fn from(update: FieldUpdate) -> Self {
        match update {
            FieldUpdate::ImageUrl(url) => RecordField::ImageUrl(url),
            FieldUpdate::Name(name) => RecordField::Name(name),
            FieldUpdate::Anime(anime) => RecordField::Anime(anime),
            FieldUpdate::Rarity(rarity) => RecordField::Rarity(rarity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_zero_padding() {
        assert_eq!(CharacterId::from_sequence(0).as_str(), "00");
        assert_eq!(CharacterId::from_sequence(7).as_str(), "07");
        assert_eq!(CharacterId::from_sequence(42).as_str(), "42");
        assert_eq!(CharacterId::from_sequence(123).as_str(), "123");
    }

    #[test]
    fn test_rarity_codes() {
        assert_eq!(Rarity::from_code(1), Some(Rarity::Common));
        assert_eq!(Rarity::from_code(3), Some(Rarity::Legendary));
        assert_eq!(Rarity::from_code(5), Some(Rarity::Special));
        assert_eq!(Rarity::from_code(0), None);
        assert_eq!(Rarity::from_code(6), None);

        for rarity in Rarity::ALL {
            assert_eq!(Rarity::from_code(rarity.code()), Some(rarity));
            assert_eq!(Rarity::from_label(rarity.label()), Some(rarity));
        }
    }

    #[test]
    fn test_rarity_parse_code_rejects_garbage() {
        assert_eq!(Rarity::parse_code(" 2 ").unwrap(), Rarity::Rare);
        for bad in ["0", "6", "-1", "three", "", "3.0"] {
            let err = Rarity::parse_code(bad).unwrap_err();
            assert!(
                matches!(err, RegistryError::Validation(_)),
                "'{}' should be a validation error, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("muzan-kibutsuji").unwrap(), "Muzan Kibutsuji");
        assert_eq!(normalize_name("demon-slayer").unwrap(), "Demon Slayer");
        assert_eq!(normalize_name("NARUTO").unwrap(), "Naruto");
        assert_eq!(normalize_name("jojo's-bizarre").unwrap(), "Jojo'S Bizarre");
        assert_eq!(normalize_name("re:zero").unwrap(), "Re:Zero");
        assert!(normalize_name("  ").is_err());
        assert!(normalize_name("-").is_err());
    }

    #[test]
    fn test_validate_image_url() {
        assert!(validate_image_url("https://x/a.png").is_ok());
        assert!(validate_image_url("http://cdn.example.com/img.jpg").is_ok());
        assert!(validate_image_url("ftp://x/a.png").is_err());
        assert!(validate_image_url("not a url").is_err());
        assert!(validate_image_url("").is_err());
    }

    #[test]
    fn test_new_character_normalizes() {
        let new = NewCharacter::parse("https://x/a.png", "muzan-kibutsuji", "demon-slayer", "3")
            .unwrap();
        assert_eq!(new.display_name, "Muzan Kibutsuji");
        assert_eq!(new.group_name, "Demon Slayer");
        assert_eq!(new.rarity, Rarity::Legendary);

        let record = new.into_record(CharacterId::from_sequence(0));
        assert_eq!(record.id.as_str(), "00");
        assert!(!record.is_mirrored());
    }

    #[test]
    fn test_field_update_parse() {
        assert_eq!(
            FieldUpdate::parse("rarity", "3").unwrap(),
            FieldUpdate::Rarity(Rarity::Legendary)
        );
        assert_eq!(
            FieldUpdate::parse("name", "tanjiro-kamado").unwrap(),
            FieldUpdate::Name("Tanjiro Kamado".to_string())
        );
        assert!(FieldUpdate::parse("img_url", "https://x/b.png")
            .unwrap()
            .changes_visual());

        match FieldUpdate::parse("power", "9000").unwrap_err() {
            RegistryError::InvalidField(msg) => assert!(msg.contains("power")),
            other => panic!("Expected InvalidField, got: {:?}", other),
        }
        assert!(matches!(
            FieldUpdate::parse("rarity", "9").unwrap_err(),
            RegistryError::Validation(_)
        ));
    }

    #[test]
    fn test_apply_keeps_id() {
        let record = NewCharacter::parse("https://x/a.png", "a", "b", "1")
            .unwrap()
            .into_record(CharacterId::new("04"));

        let updated = record.with_applied(&RecordField::Rarity(Rarity::Legendary));
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.image_url, record.image_url);
        assert_eq!(updated.rarity, Rarity::Legendary);

        let mirrored = updated.with_applied(&RecordField::ExternalRef(Some(ExternalRef::new("9"))));
        assert!(mirrored.is_mirrored());
    }

    #[test]
    fn test_record_serializes_rarity_label() {
        let record = NewCharacter::parse("https://x/a.png", "a", "b", "3")
            .unwrap()
            .into_record(CharacterId::new("00"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["rarity"], "Legendary");
        assert_eq!(json["id"], "00");
        assert!(json["external_ref"].is_null());
    }
}
