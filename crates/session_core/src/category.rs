use crate::error::AssetStoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of asset kinds hosted by the store.
///
/// The tag of a category is used both as the `category` metadata value on
/// remote objects and as the name of its local manifest cache directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetCategory {
    Maps,
    Griptapes,
    Hats,
    Shirts,
    Pants,
    Shoes,
    Decks,
    Trucks,
    Wheels,
    Meshes,
    Characters,
}

impl AssetCategory {
    /// Every category, in registry order.
    pub const ALL: [AssetCategory; 11] = [
        AssetCategory::Maps,
        AssetCategory::Griptapes,
        AssetCategory::Hats,
        AssetCategory::Shirts,
        AssetCategory::Pants,
        AssetCategory::Shoes,
        AssetCategory::Decks,
        AssetCategory::Trucks,
        AssetCategory::Wheels,
        AssetCategory::Meshes,
        AssetCategory::Characters,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            AssetCategory::Maps => "maps",
            AssetCategory::Griptapes => "griptapes",
            AssetCategory::Hats => "hats",
            AssetCategory::Shirts => "shirts",
            AssetCategory::Pants => "pants",
            AssetCategory::Shoes => "shoes",
            AssetCategory::Decks => "decks",
            AssetCategory::Trucks => "trucks",
            AssetCategory::Wheels => "wheels",
            AssetCategory::Meshes => "meshes",
            AssetCategory::Characters => "characters",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, AssetStoreError> {
        Self::ALL
            .into_iter()
            .find(|c| c.tag() == tag)
            .ok_or_else(|| AssetStoreError::UnknownCategory(tag.to_string()))
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AssetCategory {
    type Err = AssetStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

impl TryFrom<String> for AssetCategory {
    type Error = AssetStoreError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        Self::from_tag(&tag)
    }
}

impl From<AssetCategory> for String {
    fn from(category: AssetCategory) -> Self {
        category.tag().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_tag_round_trips() {
        for category in AssetCategory::ALL {
            assert_eq!(AssetCategory::from_tag(category.tag()).unwrap(), category);
            assert_eq!(category.to_string().parse::<AssetCategory>().unwrap(), category);
        }
    }

    #[test]
    fn tags_are_unique() {
        let tags: HashSet<_> = AssetCategory::ALL.iter().map(|c| c.tag()).collect();
        assert_eq!(tags.len(), AssetCategory::ALL.len());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = AssetCategory::from_tag("session-bogus").unwrap_err();
        assert!(matches!(err, AssetStoreError::UnknownCategory(tag) if tag == "session-bogus"));

        // Tags are matched exactly.
        assert!(AssetCategory::from_tag("Maps").is_err());
        assert!(AssetCategory::from_tag("").is_err());
    }

    #[test]
    fn serde_uses_the_tag() {
        let json = serde_json::to_string(&AssetCategory::Griptapes).unwrap();
        assert_eq!(json, "\"griptapes\"");

        let parsed: AssetCategory = serde_json::from_str("\"wheels\"").unwrap();
        assert_eq!(parsed, AssetCategory::Wheels);

        assert!(serde_json::from_str::<AssetCategory>("\"skateboards\"").is_err());
    }
}
