use crate::models::SchoolRecord;
use crate::reasons::fold_diacritics;
use std::collections::HashMap;
use tracing::debug;

/// Institution-id → display name, and facility-id → institution-id lookups.
#[derive(Debug, Clone, Default)]
pub struct SchoolReference {
    names: HashMap<String, String>,
    facility_to_institution: HashMap<String, String>,
}

impl SchoolReference {
    pub fn from_records(records: &[SchoolRecord]) -> Self {
        // Rows that are actual schools go first so their name wins for shared ids
        let mut ordered: Vec<&SchoolRecord> = records.iter().collect();
        ordered.sort_by_key(|record| !looks_like_school(&record.name));

        let mut reference = SchoolReference::default();
        for record in ordered {
            let institution = normalize_id(&record.institution_id);
            let facility = normalize_id(&record.facility_id);
            if institution.is_empty() || facility.is_empty() {
                continue;
            }

            let name = display_name(record);
            reference.names.entry(institution.clone()).or_insert_with(|| name.clone());
            reference.names.entry(facility.clone()).or_insert(name);

            reference
                .facility_to_institution
                .entry(facility)
                .or_insert_with(|| institution.clone());
            // Some feeds already use the institution id in student data
            reference
                .facility_to_institution
                .entry(institution.clone())
                .or_insert(institution);
        }

        debug!(
            names = reference.names.len(),
            facilities = reference.facility_to_institution.len(),
            "school reference built"
        );
        reference
    }

    pub fn school_name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Display name, or a traceable placeholder embedding the raw id.
    pub fn resolve_name(&self, id: &str) -> String {
        self.school_name(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Neznámá škola ({})", id))
    }

    /// Institution owning this facility. Unknown ids are assumed to already
    /// be institution ids.
    pub fn institution_for(&self, facility_id: &str) -> String {
        self.facility_to_institution
            .get(facility_id)
            .cloned()
            .unwrap_or_else(|| facility_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Field code → field name.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    names: HashMap<String, String>,
}

impl FieldCatalog {
    pub fn new(names: HashMap<String, String>) -> Self {
        let names = names
            .into_iter()
            .map(|(code, name)| (code.trim().to_string(), name.trim().to_string()))
            .collect();
        Self { names }
    }

    /// Field name, falling back to the raw code.
    pub fn resolve_name(&self, code: &str) -> String {
        self.names.get(code).cloned().unwrap_or_else(|| code.to_string())
    }

    /// `"<name> (<code>)"`, used for grouping and display.
    pub fn label(&self, code: &str) -> String {
        format!("{} ({})", self.resolve_name(code), code)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Integer-looking ids lose any `.0` fraction so that ids read from numeric
/// and text cells compare equal.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 => format!("{}", n as i64),
        _ => trimmed.to_string(),
    }
}

fn looks_like_school(name: &str) -> bool {
    let folded = fold_diacritics(name).to_lowercase();
    ["skola", "gymnazium", "lyceum"].iter().any(|k| folded.contains(k))
}

fn display_name(record: &SchoolRecord) -> String {
    let full = record.display_name.trim();
    let mut name = if full.is_empty() || full.eq_ignore_ascii_case("nan") {
        if record.name.trim().is_empty() {
            record.short_name.trim().to_string()
        } else {
            record.name.trim().to_string()
        }
    } else {
        full.to_string()
    };

    let location = record.location.trim();
    if !location.is_empty() && !name.to_lowercase().contains(&location.to_lowercase()) {
        name = format!("{} ({})", name, location);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn school(institution: &str, facility: &str, name: &str, full: &str, location: &str) -> SchoolRecord {
        SchoolRecord {
            institution_id: institution.into(),
            facility_id: facility.into(),
            name: name.into(),
            display_name: full.into(),
            short_name: String::new(),
            location: location.into(),
        }
    }

    #[test]
    fn both_ids_resolve_to_the_display_name() {
        let reference = SchoolReference::from_records(&[school(
            "600001",
            "102001",
            "Gymnázium Jana Nerudy",
            "Gymnázium Jana Nerudy, škola hl. m. Prahy",
            "Praha",
        )]);
        assert_eq!(
            reference.school_name("600001"),
            Some("Gymnázium Jana Nerudy, škola hl. m. Prahy")
        );
        assert_eq!(reference.school_name("102001"), reference.school_name("600001"));
    }

    #[test]
    fn location_appended_once() {
        let reference = SchoolReference::from_records(&[school("1", "2", "Gymnázium", "Gymnázium", "Brno")]);
        assert_eq!(reference.resolve_name("1"), "Gymnázium (Brno)");
        let reference = SchoolReference::from_records(&[school("1", "2", "x", "Gymnázium Brno", "brno")]);
        assert_eq!(reference.resolve_name("1"), "Gymnázium Brno");
    }

    #[test]
    fn schools_win_over_other_facilities() {
        let reference = SchoolReference::from_records(&[
            school("600001", "300001", "Školní jídelna", "Školní jídelna", ""),
            school("600001", "102001", "Gymnázium Botičská", "Gymnázium Botičská", ""),
        ]);
        assert_eq!(reference.resolve_name("600001"), "Gymnázium Botičská");
        assert_eq!(reference.resolve_name("300001"), "Školní jídelna");

        let reference = SchoolReference::from_records(&[
            school("600002", "300002", "Domov mládeže", "Domov mládeže", ""),
            school("600002", "102002", "Lyceum Praha", "Lyceum Praha", ""),
        ]);
        assert_eq!(reference.resolve_name("600002"), "Lyceum Praha");
    }

    #[test]
    fn facility_translation_falls_back_to_itself() {
        let reference = SchoolReference::from_records(&[school("600001", "102001", "Gymnázium", "", "")]);
        assert_eq!(reference.institution_for("102001"), "600001");
        assert_eq!(reference.institution_for("600001"), "600001");
        assert_eq!(reference.institution_for("999"), "999");
    }

    #[test]
    fn unknown_school_placeholder() {
        let reference = SchoolReference::default();
        assert_eq!(reference.resolve_name("123"), "Neznámá škola (123)");
    }

    #[test]
    fn field_label_keeps_code_when_unresolved() {
        let catalog = FieldCatalog::new(HashMap::from([("79-41-K/41".to_string(), "Gymnázium".to_string())]));
        assert_eq!(catalog.label("79-41-K/41"), "Gymnázium (79-41-K/41)");
        assert_eq!(catalog.label("18-20-M/01"), "18-20-M/01 (18-20-M/01)");
        assert_eq!(catalog.resolve_name("79-41-K/41"), catalog.resolve_name("79-41-K/41"));
    }

    #[test]
    fn ids_normalize_numeric_text() {
        assert_eq!(normalize_id("600001234.0"), "600001234");
        assert_eq!(normalize_id(" 600001234 "), "600001234");
        assert_eq!(normalize_id("A17"), "A17");
    }
}
