//! Domain record types shared by the store, the handlers, and the import
//! pipeline.
//!
//! Field names are serialized in camelCase, matching both the Postgres column
//! names (quoted camelCase identifiers, as the catalogue schema defines them)
//! and the JSON the web client exchanges.

use serde::{Deserialize, Serialize};

/// A signed-in user, as stored by the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub open_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
}

/// A named card collection owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A single card row as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    pub collection_id: i64,
    pub player_name: String,
    pub team_id: Option<i64>,
    pub brand_id: Option<i64>,
    pub series_id: Option<i64>,
    pub insert_id: Option<i64>,
    pub parallel_id: Option<i64>,
    pub memorabilia: Option<String>,
    pub season: String,
    pub card_number: String,
    pub autograph: bool,
    pub autograph_type_id: Option<i64>,
    pub numbered: bool,
    pub numbered_current: Option<i32>,
    pub numbered_of: Option<i32>,
    pub grading_company_id: Option<i64>,
    pub grade: Option<String>,
    pub front_image_url: Option<String>,
    pub back_image_url: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Insert payload for a card.
///
/// Every field is always serialized (no `skip_serializing_if`): PostgREST
/// bulk inserts require uniform keys across all elements of the array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub collection_id: i64,
    pub player_name: String,
    pub team_id: Option<i64>,
    pub brand_id: Option<i64>,
    pub series_id: Option<i64>,
    pub insert_id: Option<i64>,
    pub parallel_id: Option<i64>,
    pub memorabilia: Option<String>,
    pub season: String,
    pub card_number: String,
    pub autograph: bool,
    pub autograph_type_id: Option<i64>,
    pub numbered: bool,
    pub numbered_current: Option<i32>,
    pub numbered_of: Option<i32>,
    pub grading_company_id: Option<i64>,
    pub grade: Option<String>,
    pub front_image_url: Option<String>,
    pub back_image_url: Option<String>,
    pub notes: Option<String>,
}

/// One entry of an admin-curated reference vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabEntry {
    pub id: i64,
    pub name: String,
}

/// The reference vocabularies administrators curate.
///
/// All but [`VocabKind::Categories`] are referenced by card rows; categories
/// classify collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VocabKind {
    Brands,
    Series,
    Inserts,
    Parallels,
    Teams,
    AutographTypes,
    GradingCompanies,
    Categories,
}

impl VocabKind {
    /// The vocabularies card rows reference by foreign key. Declaration order
    /// is also the order missing-reference reports are assembled in.
    pub const CARD_REFS: [VocabKind; 7] = [
        VocabKind::Brands,
        VocabKind::Series,
        VocabKind::Inserts,
        VocabKind::Parallels,
        VocabKind::Teams,
        VocabKind::AutographTypes,
        VocabKind::GradingCompanies,
    ];

    /// Parse a URL path segment into a vocabulary kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "brands" => Some(Self::Brands),
            "series" => Some(Self::Series),
            "inserts" => Some(Self::Inserts),
            "parallels" => Some(Self::Parallels),
            "teams" => Some(Self::Teams),
            "autograph-types" => Some(Self::AutographTypes),
            "grading-companies" => Some(Self::GradingCompanies),
            "categories" => Some(Self::Categories),
            _ => None,
        }
    }

    /// Backing table name in the catalogue schema.
    pub fn table(self) -> &'static str {
        match self {
            Self::Brands => "brands",
            Self::Series => "series",
            Self::Inserts => "inserts",
            Self::Parallels => "parallels",
            Self::Teams => "teams",
            Self::AutographTypes => "autograph_types",
            Self::GradingCompanies => "grading_companies",
            Self::Categories => "categories",
        }
    }

    /// Human-readable singular label, used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Brands => "brand",
            Self::Series => "series",
            Self::Inserts => "insert",
            Self::Parallels => "parallel",
            Self::Teams => "team",
            Self::AutographTypes => "autograph type",
            Self::GradingCompanies => "grading company",
            Self::Categories => "category",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocab_kind_round_trips_path_segments() {
        for kind in [
            VocabKind::Brands,
            VocabKind::Series,
            VocabKind::Inserts,
            VocabKind::Parallels,
            VocabKind::Teams,
            VocabKind::AutographTypes,
            VocabKind::GradingCompanies,
            VocabKind::Categories,
        ] {
            let seg = serde_json::to_value(kind).unwrap();
            let seg = seg.as_str().unwrap();
            assert_eq!(VocabKind::from_str(seg), Some(kind));
        }
        assert_eq!(VocabKind::from_str("specialties"), None);
    }

    #[test]
    fn new_card_serializes_uniform_keys() {
        let blank = serde_json::to_value(NewCard::default()).unwrap();
        let full = serde_json::to_value(NewCard {
            collection_id: 7,
            player_name: "Michael Jordan".into(),
            brand_id: Some(1),
            ..Default::default()
        })
        .unwrap();
        let keys = |v: &serde_json::Value| {
            let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
            k.sort();
            k
        };
        assert_eq!(keys(&blank), keys(&full));
        assert_eq!(full["playerName"], "Michael Jordan");
        assert_eq!(blank["brandId"], serde_json::Value::Null);
    }
}
