use crate::category::AssetCategory;
use crate::error::AssetStoreError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File suffix that marks a remote object as a manifest.
pub const MANIFEST_SUFFIX: &str = ".json";

/// Object metadata field carrying the category tag.
pub const CATEGORY_METADATA_KEY: &str = "category";

/// A manifest exactly as stored on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub author: String,

    /// Remote key of the payload.
    pub asset_name: String,

    /// Remote key of the thumbnail.
    pub thumbnail: String,

    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// ISO-8601 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
}

/// A well-formed asset described by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub name: String,
    pub description: String,
    pub author: String,
    pub category: AssetCategory,
    pub asset_name: String,
    pub thumbnail: String,
    pub version: Option<String>,
    pub updated_date: Option<DateTime<Utc>>,
}

impl AssetRecord {
    /// Builds a record from its parts, resolving `category_tag` against the
    /// registry.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
        category_tag: &str,
        asset_name: impl Into<String>,
        thumbnail: impl Into<String>,
    ) -> Result<Self, AssetStoreError> {
        Self::try_from(Manifest {
            name: name.into(),
            description: description.into(),
            author: author.into(),
            asset_name: asset_name.into(),
            thumbnail: thumbnail.into(),
            category: category_tag.to_string(),
            version: None,
            updated_date: None,
        })
    }

    /// Parses and validates manifest JSON.
    pub fn from_json(data: &[u8]) -> Result<Self, AssetStoreError> {
        let manifest: Manifest = serde_json::from_slice(data)
            .map_err(|e| AssetStoreError::InvalidManifest(e.to_string()))?;
        Self::try_from(manifest)
    }

    pub fn to_manifest(&self) -> Manifest {
        Manifest {
            name: self.name.clone(),
            description: self.description.clone(),
            author: self.author.clone(),
            asset_name: self.asset_name.clone(),
            thumbnail: self.thumbnail.clone(),
            category: self.category.tag().to_string(),
            version: self.version.clone(),
            updated_date: self
                .updated_date
                .map(|d| d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_manifest())
    }

    /// Last update time, or the earliest representable instant when unknown.
    pub fn updated_or_min(&self) -> DateTime<Utc> {
        self.updated_date.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl TryFrom<Manifest> for AssetRecord {
    type Error = AssetStoreError;

    fn try_from(m: Manifest) -> Result<Self, Self::Error> {
        let category = AssetCategory::from_tag(&m.category)?;

        if m.asset_name.trim().is_empty() {
            return Err(AssetStoreError::InvalidManifest("AssetName is empty".into()));
        }
        if m.thumbnail.trim().is_empty() {
            return Err(AssetStoreError::InvalidManifest("Thumbnail is empty".into()));
        }

        let updated_date = m.updated_date.as_deref().map(parse_timestamp).transpose()?;

        Ok(Self {
            name: m.name,
            description: m.description,
            author: m.author,
            category,
            asset_name: m.asset_name,
            thumbnail: m.thumbnail,
            version: m.version,
            updated_date,
        })
    }
}

/// Accepts RFC 3339 as well as offset-less date-times and bare dates, which
/// are taken as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AssetStoreError> {
    let raw = raw.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Ok(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(d.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| AssetStoreError::InvalidManifest(format!("UpdatedDate '{raw}' is not ISO-8601")))
}

/// A cached or local manifest after parsing.
///
/// Malformed manifests are kept as [`Asset::Invalid`] so batch loading and
/// upload validation can report them without aborting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Valid(AssetRecord),
    Invalid { path: PathBuf, reason: String },
}

impl Asset {
    pub fn from_file_contents(path: &Path, data: &[u8]) -> Self {
        match AssetRecord::from_json(data) {
            Ok(record) => Asset::Valid(record),
            Err(e) => Asset::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Asset::Valid(_))
    }

    pub fn record(&self) -> Option<&AssetRecord> {
        match self {
            Asset::Valid(record) => Some(record),
            Asset::Invalid { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<AssetRecord, AssetStoreError> {
        match self {
            Asset::Valid(record) => Ok(record),
            Asset::Invalid { reason, .. } => Err(AssetStoreError::InvalidManifest(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MAP_MANIFEST: &str = r#"{
        "Name": "Skatepark",
        "Description": "A park",
        "Author": "someone",
        "AssetName": "skatepark.zip",
        "Thumbnail": "skatepark.png",
        "Category": "maps",
        "Version": "1.2",
        "UpdatedDate": "2021-04-03T10:20:30Z"
    }"#;

    #[test]
    fn parses_a_full_manifest() {
        let record = AssetRecord::from_json(MAP_MANIFEST.as_bytes()).unwrap();
        assert_eq!(record.name, "Skatepark");
        assert_eq!(record.category, AssetCategory::Maps);
        assert_eq!(record.asset_name, "skatepark.zip");
        assert_eq!(record.thumbnail, "skatepark.png");
        assert_eq!(record.version.as_deref(), Some("1.2"));
        assert_eq!(
            record.updated_date,
            Some(Utc.with_ymd_and_hms(2021, 4, 3, 10, 20, 30).unwrap())
        );
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let json = r#"{"Name":"n","Description":"d","Author":"a","AssetName":"deck.zip","Thumbnail":"deck.png","Category":"decks"}"#;
        let record = AssetRecord::from_json(json.as_bytes()).unwrap();
        assert_eq!(record.version, None);
        assert_eq!(record.updated_date, None);
        assert_eq!(record.updated_or_min(), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let json = r#"{"Name":"n","Description":"d","Author":"a","Thumbnail":"t.png","Category":"maps"}"#;
        let err = AssetRecord::from_json(json.as_bytes()).unwrap_err();
        match err {
            AssetStoreError::InvalidManifest(reason) => assert!(reason.contains("AssetName")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_category_fails_construction() {
        let mut manifest: Manifest = serde_json::from_str(MAP_MANIFEST).unwrap();
        manifest.category = "session-bogus".into();
        let err = AssetRecord::try_from(manifest).unwrap_err();
        assert!(matches!(err, AssetStoreError::UnknownCategory(tag) if tag == "session-bogus"));
    }

    #[test]
    fn new_resolves_the_category_tag() {
        let record = AssetRecord::new("Hat", "", "me", "hats", "hat.zip", "hat.png").unwrap();
        assert_eq!(record.category, AssetCategory::Hats);

        let err = AssetRecord::new("Hat", "", "me", "caps", "hat.zip", "hat.png").unwrap_err();
        assert!(matches!(err, AssetStoreError::UnknownCategory(tag) if tag == "caps"));
    }

    #[test]
    fn lenient_timestamps() {
        let naive = parse_timestamp("2020-01-02T03:04:05.5").unwrap();
        assert_eq!(naive.timestamp_millis(), Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap().timestamp_millis() + 500);

        let date = parse_timestamp("2020-01-02").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap());

        assert!(parse_timestamp("last tuesday").is_err());
    }

    #[test]
    fn record_survives_manifest_round_trip() {
        let record = AssetRecord::from_json(MAP_MANIFEST.as_bytes()).unwrap();
        let reparsed = AssetRecord::from_json(record.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(record, reparsed);

        let sparse = AssetRecord {
            version: None,
            updated_date: None,
            ..record
        };
        let json = sparse.to_json().unwrap();
        assert!(!json.contains("Version"));
        assert!(!json.contains("UpdatedDate"));
        assert_eq!(AssetRecord::from_json(json.as_bytes()).unwrap(), sparse);
    }

    #[test]
    fn invalid_asset_keeps_reason() {
        let asset = Asset::from_file_contents(Path::new("broken.json"), b"{ not json");
        assert!(!asset.is_valid());
        assert!(asset.record().is_none());
        match asset {
            Asset::Invalid { path, reason } => {
                assert_eq!(path, PathBuf::from("broken.json"));
                assert!(!reason.is_empty());
            }
            Asset::Valid(_) => unreachable!(),
        }
    }
}
