//! The canonical card-field registry and the import template generator.
//!
//! [`TEMPLATE_COLUMNS`] is the single source of truth for what the import
//! wizard understands: it defines the generated template's header row, the
//! targets the auto-matcher maps uploaded columns onto, and (via
//! [`CardField::field_type`]) how the importer coerces cell text.

use crate::schema::VocabKind;
use anyhow::Result;
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};

/// Suggested filename for the generated template.
pub const TEMPLATE_FILENAME: &str = "card-import-template.xlsx";

/// Canonical identifier for a card attribute, independent of whatever header
/// text appears in an uploaded spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardField {
    PlayerName,
    TeamId,
    BrandId,
    SeriesId,
    InsertId,
    ParallelId,
    Memorabilia,
    Season,
    CardNumber,
    Autograph,
    AutographTypeId,
    Numbered,
    NumberedCurrent,
    NumberedOf,
    GradingCompanyId,
    Grade,
    Notes,
}

/// How the importer interprets a cell mapped to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Trimmed string, `NULL` when empty.
    Text,
    /// Free-text vocabulary name resolved to a foreign key.
    Reference(VocabKind),
    /// True iff the trimmed, lowercased cell is "yes" or "true".
    Flag,
    /// Parsed integer, `NULL` when empty or unparseable.
    Integer,
}

impl CardField {
    /// The camelCase identifier, as used in mappings and preview rows.
    pub fn name(self) -> &'static str {
        match self {
            Self::PlayerName => "playerName",
            Self::TeamId => "teamId",
            Self::BrandId => "brandId",
            Self::SeriesId => "seriesId",
            Self::InsertId => "insertId",
            Self::ParallelId => "parallelId",
            Self::Memorabilia => "memorabilia",
            Self::Season => "season",
            Self::CardNumber => "cardNumber",
            Self::Autograph => "autograph",
            Self::AutographTypeId => "autographTypeId",
            Self::Numbered => "numbered",
            Self::NumberedCurrent => "numberedCurrent",
            Self::NumberedOf => "numberedOf",
            Self::GradingCompanyId => "gradingCompanyId",
            Self::Grade => "grade",
            Self::Notes => "notes",
        }
    }

    /// Parse a canonical identifier. Returns `None` for unknown names and the
    /// "skip" sentinel alike; callers treat both as unmapped.
    pub fn from_name(s: &str) -> Option<Self> {
        TEMPLATE_COLUMNS
            .iter()
            .map(|c| c.field)
            .find(|f| f.name() == s)
    }

    pub fn field_type(self) -> FieldType {
        match self {
            Self::TeamId => FieldType::Reference(VocabKind::Teams),
            Self::BrandId => FieldType::Reference(VocabKind::Brands),
            Self::SeriesId => FieldType::Reference(VocabKind::Series),
            Self::InsertId => FieldType::Reference(VocabKind::Inserts),
            Self::ParallelId => FieldType::Reference(VocabKind::Parallels),
            Self::AutographTypeId => FieldType::Reference(VocabKind::AutographTypes),
            Self::GradingCompanyId => FieldType::Reference(VocabKind::GradingCompanies),
            Self::Autograph | Self::Numbered => FieldType::Flag,
            Self::NumberedCurrent | Self::NumberedOf => FieldType::Integer,
            _ => FieldType::Text,
        }
    }
}

/// One column of the import template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateColumn {
    pub header: &'static str,
    pub field: CardField,
    pub required: bool,
    pub example: Option<&'static str>,
}

const fn col(
    header: &'static str,
    field: CardField,
    required: bool,
    example: &'static str,
) -> TemplateColumn {
    TemplateColumn {
        header,
        field,
        required,
        example: Some(example),
    }
}

/// The template columns, in the order they appear in the generated sheet.
/// Declaration order also breaks ties in the auto-matcher.
pub const TEMPLATE_COLUMNS: &[TemplateColumn] = &[
    col("Player Name", CardField::PlayerName, true, "Michael Jordan"),
    col("Team", CardField::TeamId, false, "Chicago Bulls"),
    col("Brand", CardField::BrandId, false, "Panini"),
    col("Series", CardField::SeriesId, false, "Prizm"),
    col("Insert", CardField::InsertId, false, "Silver"),
    col("Parallel", CardField::ParallelId, false, "Rookie"),
    col("Memorabilia", CardField::Memorabilia, false, "Jersey Patch"),
    col("Season / Year", CardField::Season, true, "2012-13"),
    col("Card Number", CardField::CardNumber, true, "147"),
    col("Autograph", CardField::Autograph, false, "Yes"),
    col(
        "Type of Autograph",
        CardField::AutographTypeId,
        false,
        "On-card",
    ),
    col("Numbered", CardField::Numbered, false, "Yes"),
    col("Current #", CardField::NumberedCurrent, false, "221"),
    col("Of #", CardField::NumberedOf, false, "499"),
    col(
        "Grading Company",
        CardField::GradingCompanyId,
        false,
        "PSA",
    ),
    col("Grade", CardField::Grade, false, "9.5"),
    col("Notes", CardField::Notes, false, "Mint condition"),
];

/// Generate the import template: a single-sheet xlsx workbook whose first and
/// only row is the template headers, in declaration order. Column widths are
/// cosmetic.
pub fn generate_template() -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Cards")?;

    for (i, column) in TEMPLATE_COLUMNS.iter().enumerate() {
        sheet.write_string(0, i as u16, column.header)?;
        sheet.set_column_width(i as u16, 20)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_parser::parse_sheet;

    #[test]
    fn template_header_row_matches_registry() {
        let bytes = generate_template().unwrap();
        let parsed = parse_sheet(TEMPLATE_FILENAME, &bytes).unwrap();

        let expected: Vec<&str> = TEMPLATE_COLUMNS.iter().map(|c| c.header).collect();
        assert_eq!(parsed.headers, expected);
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn required_fields_are_player_season_number() {
        let required: Vec<CardField> = TEMPLATE_COLUMNS
            .iter()
            .filter(|c| c.required)
            .map(|c| c.field)
            .collect();
        assert_eq!(
            required,
            vec![CardField::PlayerName, CardField::Season, CardField::CardNumber]
        );
    }

    #[test]
    fn field_names_round_trip() {
        for column in TEMPLATE_COLUMNS {
            assert_eq!(CardField::from_name(column.field.name()), Some(column.field));
        }
        assert_eq!(CardField::from_name("skip"), None);
        assert_eq!(CardField::from_name("specialtyId"), None);
    }

    #[test]
    fn serde_name_agrees_with_field_name() {
        for column in TEMPLATE_COLUMNS {
            let json = serde_json::to_value(column.field).unwrap();
            assert_eq!(json.as_str().unwrap(), column.field.name());
        }
    }
}
