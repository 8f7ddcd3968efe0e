//! The card import pipeline: column auto-matching, validation, and row
//! building.
//!
//! Everything here is a pure function of its inputs — vocabulary snapshots
//! are taken by the HTTP handlers and passed in, so the whole pipeline is
//! testable without a database. The validator accumulates: it always walks
//! every row and returns the complete error list. The importer re-resolves
//! reference names on its own snapshot and performs no validation of its own;
//! callers are expected to import only after a clean validation of the same
//! (file, mappings) pair.

use crate::schema::{NewCard, VocabEntry, VocabKind};
use crate::sheet_parser::RowRecord;
use crate::template::{CardField, FieldType, TEMPLATE_COLUMNS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// A confirmed (or auto-suggested) association between an uploaded column and
/// a canonical field. `canonical_field` holds the field identifier, or the
/// literal `"skip"` — anything that is not a known field name is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub excel_column: String,
    pub canonical_field: String,
}

/// Heuristically map uploaded headers onto canonical fields.
///
/// Per header, case-insensitive and whitespace-trimmed comparison against the
/// template headers in declaration order: exact match first, then substring
/// in either direction. Each canonical field is claimed at most once; headers
/// with no match are omitted (implicitly "skip"). Advisory only — the user
/// confirms or edits the result before validation.
pub fn auto_match_columns(headers: &[String]) -> Vec<ColumnMapping> {
    let mut mappings = Vec::new();
    let mut claimed: HashSet<CardField> = HashSet::new();

    for header in headers {
        let normalized = header.trim().to_lowercase();
        if normalized.is_empty() {
            // An empty header would substring-match every template column.
            continue;
        }

        let matched = TEMPLATE_COLUMNS
            .iter()
            .filter(|c| !claimed.contains(&c.field))
            .find(|c| c.header.to_lowercase() == normalized)
            .or_else(|| {
                TEMPLATE_COLUMNS
                    .iter()
                    .filter(|c| !claimed.contains(&c.field))
                    .find(|c| {
                        let template = c.header.to_lowercase();
                        template.contains(&normalized) || normalized.contains(&template)
                    })
            });

        if let Some(column) = matched {
            claimed.insert(column.field);
            mappings.push(ColumnMapping {
                excel_column: header.clone(),
                canonical_field: column.field.name().to_string(),
            });
        }
    }

    mappings
}

/// Resolve mappings to a field → uploaded-column lookup. Later mappings win
/// when the same field is targeted twice; "skip" and unknown names drop out.
fn field_map(mappings: &[ColumnMapping]) -> HashMap<CardField, &str> {
    mappings
        .iter()
        .filter_map(|m| {
            CardField::from_name(&m.canonical_field).map(|f| (f, m.excel_column.as_str()))
        })
        .collect()
}

/// One validation finding. `row` 0 marks a whole-file problem; otherwise it
/// is the 1-based spreadsheet row number (data row index + 2, accounting for
/// the header row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub row: usize,
    pub field: String,
    pub message: String,
}

/// Free-text names seen in the upload that match no current vocabulary entry,
/// per vocabulary. Not errors: the remedy is administrative (create the
/// entries), not a spreadsheet fix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingReferences {
    pub brands: Vec<String>,
    pub series: Vec<String>,
    pub inserts: Vec<String>,
    pub parallels: Vec<String>,
    pub teams: Vec<String>,
    pub autograph_types: Vec<String>,
    pub grading_companies: Vec<String>,
}

impl MissingReferences {
    pub fn is_empty(&self) -> bool {
        VocabKind::CARD_REFS.iter().all(|k| self.names(*k).is_empty())
    }

    pub fn names(&self, kind: VocabKind) -> &[String] {
        match kind {
            VocabKind::Brands => &self.brands,
            VocabKind::Series => &self.series,
            VocabKind::Inserts => &self.inserts,
            VocabKind::Parallels => &self.parallels,
            VocabKind::Teams => &self.teams,
            VocabKind::AutographTypes => &self.autograph_types,
            VocabKind::GradingCompanies => &self.grading_companies,
            VocabKind::Categories => &[],
        }
    }

    fn push_unique(&mut self, kind: VocabKind, name: &str) {
        let list = match kind {
            VocabKind::Brands => &mut self.brands,
            VocabKind::Series => &mut self.series,
            VocabKind::Inserts => &mut self.inserts,
            VocabKind::Parallels => &mut self.parallels,
            VocabKind::Teams => &mut self.teams,
            VocabKind::AutographTypes => &mut self.autograph_types,
            VocabKind::GradingCompanies => &mut self.grading_companies,
            VocabKind::Categories => return,
        };
        let lowered = name.to_lowercase();
        if !list.iter().any(|n| n.to_lowercase() == lowered) {
            list.push(name.to_string());
        }
    }
}

/// One preview entry: the row's spreadsheet row number plus every resolved
/// field value, validated or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub row_number: usize,
    #[serde(flatten)]
    pub fields: BTreeMap<CardField, String>,
}

/// Outcome of validating (rows, mappings) against a vocabulary snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub missing_data: MissingReferences,
    pub preview: Vec<PreviewRow>,
}

/// Case-insensitive name sets for every card-referenced vocabulary, read once
/// per validation call.
#[derive(Debug, Default)]
pub struct ReferenceSets {
    sets: HashMap<VocabKind, HashSet<String>>,
}

impl ReferenceSets {
    pub fn from_entries<'a, I>(vocab: I) -> Self
    where
        I: IntoIterator<Item = (VocabKind, &'a [VocabEntry])>,
    {
        let sets = vocab
            .into_iter()
            .map(|(kind, entries)| {
                (
                    kind,
                    entries.iter().map(|e| e.name.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { sets }
    }

    pub fn contains(&self, kind: VocabKind, name: &str) -> bool {
        self.sets
            .get(&kind)
            .map(|s| s.contains(&name.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Case-insensitive name → id maps for the same vocabularies, read
/// independently by the importer (snapshots are advisory, never shared
/// across the validate/import round trip).
#[derive(Debug, Default)]
pub struct ReferenceIds {
    maps: HashMap<VocabKind, HashMap<String, i64>>,
}

impl ReferenceIds {
    pub fn from_entries<'a, I>(vocab: I) -> Self
    where
        I: IntoIterator<Item = (VocabKind, &'a [VocabEntry])>,
    {
        let maps = vocab
            .into_iter()
            .map(|(kind, entries)| {
                (
                    kind,
                    entries
                        .iter()
                        .map(|e| (e.name.to_lowercase(), e.id))
                        .collect(),
                )
            })
            .collect();
        Self { maps }
    }

    pub fn resolve(&self, kind: VocabKind, name: &str) -> Option<i64> {
        self.maps.get(&kind)?.get(&name.to_lowercase()).copied()
    }
}

/// Validate parsed rows against the confirmed mappings and the current
/// vocabulary snapshot.
pub fn validate_rows(
    rows: &[RowRecord],
    mappings: &[ColumnMapping],
    refs: &ReferenceSets,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut missing = MissingReferences::default();
    let mut preview = Vec::new();

    let fields = field_map(mappings);

    // All-or-nothing mapping completeness: without every required field
    // mapped, row-level validation is not attempted at all.
    for column in TEMPLATE_COLUMNS.iter().filter(|c| c.required) {
        if !fields.contains_key(&column.field) {
            errors.push(ValidationError {
                row: 0,
                field: column.field.name().to_string(),
                message: format!("Required field \"{}\" is not mapped", column.header),
            });
        }
    }
    if !errors.is_empty() {
        return ValidationResult {
            valid: false,
            errors,
            missing_data: missing,
            preview: Vec::new(),
        };
    }

    for (i, row) in rows.iter().enumerate() {
        // +2: spreadsheets are 1-indexed and row 1 is the header
        let row_number = i + 2;

        let resolved: BTreeMap<CardField, String> = fields
            .iter()
            .map(|(&field, &column)| {
                let value = row.get(column).map(|v| v.trim()).unwrap_or("");
                (field, value.to_string())
            })
            .collect();

        let value_of = |f: CardField| resolved.get(&f).map(String::as_str).unwrap_or("");

        if value_of(CardField::PlayerName).is_empty() {
            errors.push(ValidationError {
                row: row_number,
                field: CardField::PlayerName.name().to_string(),
                message: "Player Name is required".to_string(),
            });
        }
        if value_of(CardField::Season).is_empty() {
            errors.push(ValidationError {
                row: row_number,
                field: CardField::Season.name().to_string(),
                message: "Season/Year is required".to_string(),
            });
        }
        if value_of(CardField::CardNumber).is_empty() {
            errors.push(ValidationError {
                row: row_number,
                field: CardField::CardNumber.name().to_string(),
                message: "Card Number is required".to_string(),
            });
        }

        for (&field, value) in &resolved {
            if value.is_empty() {
                continue;
            }
            if let FieldType::Reference(kind) = field.field_type() {
                if !refs.contains(kind, value) {
                    missing.push_unique(kind, value);
                }
            }
        }

        preview.push(PreviewRow {
            row_number,
            fields: resolved,
        });
    }

    let valid = errors.is_empty() && missing.is_empty();
    ValidationResult {
        valid,
        errors,
        missing_data: missing,
        preview,
    }
}

/// What the importer does with a reference name its snapshot cannot resolve.
///
/// [`ImportPolicy::NullUnresolved`] silently inserts a NULL foreign key;
/// [`ImportPolicy::RejectUnresolved`] fails the whole import, naming the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportPolicy {
    #[default]
    NullUnresolved,
    RejectUnresolved,
}

/// A reference name the importer could not resolve, under
/// [`ImportPolicy::RejectUnresolved`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("row {row}: unknown {} name \"{value}\"", .kind.label())]
pub struct UnresolvedReference {
    pub row: usize,
    pub kind: VocabKind,
    pub value: String,
}

/// Build one insertable card per input row.
///
/// Reference names are re-resolved against `ids`; flags are true iff the
/// trimmed lowercase cell is "yes" or "true"; numeric fields parse to NULL on
/// empty or unparseable text; everything else is a trimmed string or NULL.
pub fn build_card_rows(
    collection_id: i64,
    rows: &[RowRecord],
    mappings: &[ColumnMapping],
    ids: &ReferenceIds,
    policy: ImportPolicy,
) -> Result<Vec<NewCard>, UnresolvedReference> {
    let fields = field_map(mappings);
    let mut cards = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let row_number = i + 2;
        let mut card = NewCard {
            collection_id,
            ..NewCard::default()
        };

        for (&field, &column) in &fields {
            let value = row.get(column).map(|v| v.trim()).unwrap_or("");

            match field.field_type() {
                FieldType::Reference(kind) => {
                    if value.is_empty() {
                        continue;
                    }
                    let id = ids.resolve(kind, value);
                    if id.is_none() && policy == ImportPolicy::RejectUnresolved {
                        return Err(UnresolvedReference {
                            row: row_number,
                            kind,
                            value: value.to_string(),
                        });
                    }
                    set_reference(&mut card, field, id);
                }
                FieldType::Flag => {
                    let on = matches!(value.to_lowercase().as_str(), "yes" | "true");
                    match field {
                        CardField::Autograph => card.autograph = on,
                        CardField::Numbered => card.numbered = on,
                        _ => {}
                    }
                }
                FieldType::Integer => {
                    let parsed = if value.is_empty() {
                        None
                    } else {
                        value.parse::<i32>().ok()
                    };
                    match field {
                        CardField::NumberedCurrent => card.numbered_current = parsed,
                        CardField::NumberedOf => card.numbered_of = parsed,
                        _ => {}
                    }
                }
                FieldType::Text => {
                    let text = (!value.is_empty()).then(|| value.to_string());
                    match field {
                        CardField::PlayerName => card.player_name = value.to_string(),
                        CardField::Season => card.season = value.to_string(),
                        CardField::CardNumber => card.card_number = value.to_string(),
                        CardField::Memorabilia => card.memorabilia = text,
                        CardField::Grade => card.grade = text,
                        CardField::Notes => card.notes = text,
                        _ => {}
                    }
                }
            }
        }

        cards.push(card);
    }

    Ok(cards)
}

fn set_reference(card: &mut NewCard, field: CardField, id: Option<i64>) {
    match field {
        CardField::TeamId => card.team_id = id,
        CardField::BrandId => card.brand_id = id,
        CardField::SeriesId => card.series_id = id,
        CardField::InsertId => card.insert_id = id,
        CardField::ParallelId => card.parallel_id = id,
        CardField::AutographTypeId => card.autograph_type_id = id,
        CardField::GradingCompanyId => card.grading_company_id = id,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn record(pairs: &[(&str, &str)]) -> RowRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn entries(names: &[(&str, i64)]) -> Vec<VocabEntry> {
        names
            .iter()
            .map(|(name, id)| VocabEntry {
                id: *id,
                name: name.to_string(),
            })
            .collect()
    }

    fn sets(vocab: &[(VocabKind, &[(&str, i64)])]) -> (ReferenceSets, ReferenceIds) {
        let owned: Vec<(VocabKind, Vec<VocabEntry>)> = vocab
            .iter()
            .map(|(kind, names)| (*kind, entries(names)))
            .collect();
        let refs =
            ReferenceSets::from_entries(owned.iter().map(|(k, e)| (*k, e.as_slice())));
        let ids = ReferenceIds::from_entries(owned.iter().map(|(k, e)| (*k, e.as_slice())));
        (refs, ids)
    }

    const FIVE_HEADERS: [&str; 5] = [
        "Player Name",
        "Brand",
        "Series",
        "Season / Year",
        "Card Number",
    ];

    #[test]
    fn auto_match_exact_headers() {
        let mappings = auto_match_columns(&headers(&FIVE_HEADERS));
        let fields: Vec<&str> = mappings.iter().map(|m| m.canonical_field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["playerName", "brandId", "seriesId", "season", "cardNumber"]
        );
    }

    #[test]
    fn auto_match_is_case_and_whitespace_insensitive() {
        let mappings = auto_match_columns(&headers(&["  player name  ", "BRAND"]));
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].canonical_field, "playerName");
        assert_eq!(mappings[1].canonical_field, "brandId");
    }

    #[test]
    fn auto_match_substring_both_directions() {
        // uploaded ⊃ template and template ⊃ uploaded
        let mappings = auto_match_columns(&headers(&["Brand Name", "Memo"]));
        assert_eq!(mappings[0].canonical_field, "brandId");
        assert_eq!(mappings[1].canonical_field, "memorabilia");
    }

    #[test]
    fn auto_match_never_claims_a_field_twice() {
        let mappings = auto_match_columns(&headers(&["Brand", "Brand Name"]));
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].excel_column, "Brand");
    }

    #[test]
    fn auto_match_omits_unknown_and_empty_headers() {
        let mappings = auto_match_columns(&headers(&["", "Shoe Size"]));
        assert!(mappings.is_empty());
    }

    #[test]
    fn auto_match_is_idempotent() {
        let h = headers(&FIVE_HEADERS);
        assert_eq!(auto_match_columns(&h), auto_match_columns(&h));
    }

    #[test]
    fn validate_accepts_known_references() {
        let (refs, _) = sets(&[
            (VocabKind::Brands, &[("Panini", 1)]),
            (VocabKind::Series, &[("Prizm", 4)]),
        ]);
        let mappings = auto_match_columns(&headers(&FIVE_HEADERS));
        let rows = vec![record(&[
            ("Player Name", "LeBron James"),
            ("Brand", "Panini"),
            ("Series", "Prizm"),
            ("Season / Year", "2012-13"),
            ("Card Number", "1"),
        ])];

        let result = validate_rows(&rows, &mappings, &refs);

        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.missing_data.is_empty());
        assert_eq!(result.preview.len(), 1);
        let preview = &result.preview[0];
        assert_eq!(preview.row_number, 2);
        assert_eq!(preview.fields[&CardField::PlayerName], "LeBron James");
        assert_eq!(preview.fields[&CardField::BrandId], "Panini");
        assert_eq!(preview.fields[&CardField::SeriesId], "Prizm");
    }

    #[test]
    fn validate_reports_missing_references_without_errors() {
        let (refs, _) = sets(&[(VocabKind::Series, &[("Prizm", 4)])]);
        let mappings = auto_match_columns(&headers(&FIVE_HEADERS));
        let rows = vec![record(&[
            ("Player Name", "LeBron James"),
            ("Brand", "Panini"),
            ("Series", "Prizm"),
            ("Season / Year", "2012-13"),
            ("Card Number", "1"),
        ])];

        let result = validate_rows(&rows, &mappings, &refs);

        assert!(!result.valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.missing_data.brands, vec!["Panini"]);
        // Missing data never suppresses the preview
        assert_eq!(result.preview.len(), 1);
    }

    #[test]
    fn validate_aborts_on_unmapped_required_field() {
        let mut mappings = auto_match_columns(&headers(&FIVE_HEADERS));
        mappings.retain(|m| m.canonical_field != "cardNumber");
        let rows = vec![record(&[("Player Name", "LeBron James")])];

        let result = validate_rows(&rows, &mappings, &ReferenceSets::default());

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].row, 0);
        assert_eq!(result.errors[0].field, "cardNumber");
        assert!(result.preview.is_empty());
    }

    #[test]
    fn validate_accumulates_row_errors_across_all_rows() {
        let (refs, _) = sets(&[]);
        let mappings = auto_match_columns(&headers(&FIVE_HEADERS));
        let rows = vec![
            record(&[
                ("Player Name", ""),
                ("Season / Year", "2012-13"),
                ("Card Number", "1"),
            ]),
            record(&[
                ("Player Name", "Luka Doncic"),
                ("Season / Year", "  "),
                ("Card Number", ""),
            ]),
        ];

        let result = validate_rows(&rows, &mappings, &refs);

        assert!(!result.valid);
        let found: Vec<(usize, &str)> = result
            .errors
            .iter()
            .map(|e| (e.row, e.field.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![(2, "playerName"), (3, "season"), (3, "cardNumber")]
        );
        assert_eq!(result.preview.len(), 2);
    }

    #[test]
    fn missing_names_dedup_case_insensitively() {
        let (refs, _) = sets(&[]);
        let mappings = auto_match_columns(&headers(&FIVE_HEADERS));
        let row = |brand: &str| {
            record(&[
                ("Player Name", "X"),
                ("Brand", brand),
                ("Season / Year", "2020"),
                ("Card Number", "9"),
            ])
        };
        let rows = vec![row("Topps"), row("topps"), row("Panini")];

        let result = validate_rows(&rows, &mappings, &refs);

        assert_eq!(result.missing_data.brands, vec!["Topps", "Panini"]);
    }

    #[test]
    fn validator_is_deterministic() {
        let (refs, _) = sets(&[(VocabKind::Brands, &[("Panini", 1)])]);
        let mappings = auto_match_columns(&headers(&FIVE_HEADERS));
        let rows = vec![record(&[
            ("Player Name", "LeBron James"),
            ("Brand", "panini"),
            ("Season / Year", "2012-13"),
            ("Card Number", "1"),
        ])];

        let a = serde_json::to_value(validate_rows(&rows, &mappings, &refs)).unwrap();
        let b = serde_json::to_value(validate_rows(&rows, &mappings, &refs)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn build_rows_resolves_ids_and_coerces_values() {
        let (_, ids) = sets(&[
            (VocabKind::Brands, &[("Panini", 11)]),
            (VocabKind::Series, &[("Prizm", 42)]),
        ]);
        let all_headers = headers(&[
            "Player Name",
            "Brand",
            "Series",
            "Season / Year",
            "Card Number",
            "Autograph",
            "Numbered",
            "Current #",
            "Of #",
            "Notes",
        ]);
        let mappings = auto_match_columns(&all_headers);
        let rows = vec![record(&[
            ("Player Name", " LeBron James "),
            ("Brand", "PANINI"),
            ("Series", "Prizm"),
            ("Season / Year", "2012-13"),
            ("Card Number", "1"),
            ("Autograph", "Yes"),
            ("Numbered", "no"),
            ("Current #", "221"),
            ("Of #", ""),
            ("Notes", ""),
        ])];

        let cards =
            build_card_rows(7, &rows, &mappings, &ids, ImportPolicy::NullUnresolved).unwrap();

        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.collection_id, 7);
        assert_eq!(card.player_name, "LeBron James");
        assert_eq!(card.brand_id, Some(11));
        assert_eq!(card.series_id, Some(42));
        assert!(card.autograph);
        assert!(!card.numbered);
        assert_eq!(card.numbered_current, Some(221));
        assert_eq!(card.numbered_of, None);
        assert_eq!(card.notes, None);
    }

    #[test]
    fn build_rows_tags_every_row_with_the_collection() {
        let (_, ids) = sets(&[]);
        let mappings = auto_match_columns(&headers(&["Player Name"]));
        let rows = vec![
            record(&[("Player Name", "A")]),
            record(&[("Player Name", "B")]),
            record(&[("Player Name", "C")]),
        ];

        let cards =
            build_card_rows(99, &rows, &mappings, &ids, ImportPolicy::NullUnresolved).unwrap();

        assert_eq!(cards.len(), rows.len());
        assert!(cards.iter().all(|c| c.collection_id == 99));
    }

    #[test]
    fn null_unresolved_policy_inserts_null_foreign_keys() {
        let (_, ids) = sets(&[]);
        let mappings = auto_match_columns(&headers(&["Player Name", "Brand"]));
        let rows = vec![record(&[("Player Name", "X"), ("Brand", "Nobody")])];

        let cards =
            build_card_rows(1, &rows, &mappings, &ids, ImportPolicy::NullUnresolved).unwrap();
        assert_eq!(cards[0].brand_id, None);
    }

    #[test]
    fn template_round_trips_through_the_pipeline() {
        // A template filled in with one valid row referencing only existing
        // vocabulary names validates cleanly end to end.
        let template_bytes = crate::template::generate_template().unwrap();
        let template = crate::sheet_parser::parse_sheet("template.xlsx", &template_bytes).unwrap();

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (c, header) in template.headers.iter().enumerate() {
            sheet.write_string(0, c as u16, header).unwrap();
        }
        let filled = [
            ("Player Name", "Michael Jordan"),
            ("Brand", "Fleer"),
            ("Season / Year", "1986-87"),
            ("Card Number", "57"),
        ];
        for (c, header) in template.headers.iter().enumerate() {
            let value = filled
                .iter()
                .find(|(h, _)| h == header)
                .map(|(_, v)| *v)
                .unwrap_or("");
            if !value.is_empty() {
                sheet.write_string(1, c as u16, value).unwrap();
            }
        }
        let bytes = workbook.save_to_buffer().unwrap();

        let parsed = crate::sheet_parser::parse_sheet("upload.xlsx", &bytes).unwrap();
        let mappings = auto_match_columns(&parsed.headers);
        // Every template header maps straight back to its own field
        assert_eq!(mappings.len(), crate::template::TEMPLATE_COLUMNS.len());

        let (refs, _) = sets(&[(VocabKind::Brands, &[("Fleer", 3)])]);
        let result = validate_rows(&parsed.rows, &mappings, &refs);

        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.missing_data.is_empty());
        assert_eq!(result.preview.len(), 1);
        assert_eq!(result.preview[0].row_number, 2);
    }

    #[test]
    fn reject_unresolved_policy_names_the_offending_row() {
        let (_, ids) = sets(&[(VocabKind::Brands, &[("Panini", 1)])]);
        let mappings = auto_match_columns(&headers(&["Player Name", "Brand"]));
        let rows = vec![
            record(&[("Player Name", "X"), ("Brand", "Panini")]),
            record(&[("Player Name", "Y"), ("Brand", "Nobody")]),
        ];

        let err = build_card_rows(1, &rows, &mappings, &ids, ImportPolicy::RejectUnresolved)
            .unwrap_err();
        assert_eq!(err.row, 3);
        assert_eq!(err.kind, VocabKind::Brands);
        assert_eq!(err.value, "Nobody");
        assert!(err.to_string().contains("brand"));
    }
}
