use crate::models::{CapacityRecord, RawTable, ScalarValue, SchoolRecord};
use crate::reference::normalize_id;
use anyhow::{Context, Result};
use encoding_rs::WINDOWS_1250;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Applicant exports of one year (`PZ<year>*.csv`), capacity files excluded.
pub fn discover_year_files(data_dir: &Path, year: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("PZ{}", year);
    let mut files = Vec::new();

    for entry in fs::read_dir(data_dir).with_context(|| format!("Failed to read directory: {}", data_dir.display()))? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        let is_csv = path.extension().and_then(|s| s.to_str()) == Some("csv");
        if is_csv && name.starts_with(&prefix) && !name.contains("kapacity") {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Conventional capacity file name for a year and round.
pub fn capacity_file_name(year: &str, round: u32) -> String {
    format!("PZ{}_kolo{}_skolobory_kapacity.csv", year, round)
}

/// Read an applicant export. Text that is not valid UTF-8 is read as cp1250;
/// whatever the header decodes to is left for the column normalizer.
pub fn read_applicant_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(path)?)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let headers = reader
        .byte_headers()
        .with_context(|| format!("Failed to read header row: {}", path.display()))?
        .iter()
        .map(|h| decode_text(h).into_owned())
        .collect::<Vec<_>>();
    let mut table = RawTable::new(headers);

    for record in reader.byte_records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        table.push_row(record.iter().map(|cell| parse_cell(&decode_text(cell))).collect());
    }

    debug!(file = %path.display(), rows = table.rows.len(), "applicant table read");
    Ok(table)
}

/// Read the `;`-separated school register. The register is published in
/// cp1250; UTF-8 copies are accepted as-is.
pub fn read_school_reference(path: &Path) -> Result<Vec<SchoolRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open school register: {}", path.display()))?;

    let headers = decoded_headers(&mut reader)?;
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (red_izo, izo) = match (column("RED_IZO"), column("IZO")) {
        (Some(r), Some(i)) => (r, i),
        _ => anyhow::bail!("School register {} lacks RED_IZO/IZO columns", path.display()),
    };
    let name = column("Nazev");
    let short_name = column("Zkraceny_nazev");
    let full_name = column("Plny_nazev");
    let location = column("Misto");

    let mut records = Vec::new();
    for row in reader.byte_records() {
        let row = row.with_context(|| format!("Malformed row in {}", path.display()))?;
        let get = |index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .map(|v| decode_text(v).trim().to_string())
                .unwrap_or_default()
        };
        records.push(SchoolRecord {
            institution_id: normalize_id(&get(Some(red_izo))),
            facility_id: normalize_id(&get(Some(izo))),
            name: get(name),
            display_name: get(full_name),
            short_name: get(short_name),
            location: get(location),
        });
    }

    debug!(file = %path.display(), schools = records.len(), "school register read");
    Ok(records)
}

/// Field code → name map from JSON. A missing file yields an empty map.
pub fn read_field_map(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        warn!(file = %path.display(), "field map not found, field names fall back to codes");
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let map = serde_json::from_str(&content).with_context(|| format!("Invalid field map: {}", path.display()))?;
    Ok(map)
}

/// Capacity rows (`REDIZO`, `KKOV`, `KAPACITA`) for one round. A missing file
/// yields no rows; rows with an unusable key or seat count are skipped.
pub fn read_capacity_table(path: &Path, round: u32) -> Result<Vec<CapacityRecord>> {
    if !path.exists() {
        debug!(file = %path.display(), "no capacity file for round");
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(path)?)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open capacity file: {}", path.display()))?;
    let headers = decoded_headers(&mut reader)?;
    let column = |names: &[&str]| headers.iter().position(|h| names.contains(&h.trim()));
    let (id_col, field_col, seats_col) = match (
        column(&["REDIZO", "RED_IZO", "IZO"]),
        column(&["KKOV"]),
        column(&["KAPACITA"]),
    ) {
        (Some(i), Some(f), Some(s)) => (i, f, s),
        _ => anyhow::bail!("Capacity file {} lacks REDIZO/KKOV/KAPACITA columns", path.display()),
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in reader.byte_records() {
        let row = row.with_context(|| format!("Malformed row in {}", path.display()))?;
        let cell = |i: usize| parse_cell(&decode_text(row.get(i).unwrap_or_default()));

        let institution_id = cell(id_col).as_text().map(|id| normalize_id(&id));
        let field_code = cell(field_col).as_text();
        let seats = cell(seats_col).as_number().filter(|n| *n >= 0.0);
        match (institution_id, field_code, seats) {
            (Some(institution_id), Some(field_code), Some(seats)) => records.push(CapacityRecord {
                institution_id,
                field_code,
                round,
                planned_seats: seats as u32,
            }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(file = %path.display(), skipped, "capacity rows without a usable key");
    }
    Ok(records)
}

/// Cell text → typed value: empty or `nan` → null, `true`/`false` → bool, numbers
/// (decimal comma allowed) → number, anything else stays text.
pub fn parse_cell(raw: &str) -> ScalarValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return ScalarValue::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return ScalarValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return ScalarValue::Bool(false);
    }
    match trimmed.replace(',', ".").parse::<f64>() {
        Ok(n) if n.is_finite() => ScalarValue::Number(n),
        _ => ScalarValue::Text(trimmed.to_string()),
    }
}

fn decoded_headers(reader: &mut csv::Reader<fs::File>) -> Result<Vec<String>> {
    Ok(reader
        .byte_headers()?
        .iter()
        .map(|h| decode_text(h).into_owned())
        .collect())
}

/// UTF-8 when the bytes are valid UTF-8, cp1250 otherwise.
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1250.decode_without_bom_handling(bytes).0,
    }
}

/// Exports come both comma- and semicolon-separated; pick by the header line.
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    Ok(if semicolons > commas { b';' } else { b',' })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_typed() {
        assert_eq!(parse_cell(""), ScalarValue::Null);
        assert_eq!(parse_cell("nan"), ScalarValue::Null);
        assert_eq!(parse_cell(" TRUE "), ScalarValue::Bool(true));
        assert_eq!(parse_cell("71,5"), ScalarValue::Number(71.5));
        assert_eq!(parse_cell("79-41-K/41"), ScalarValue::Text("79-41-K/41".into()));
    }

    #[test]
    fn cp1250_text_is_decoded() {
        assert_eq!(decode_text(b"\xc8esk\xfd Krumlov"), "Český Krumlov");
        assert_eq!(decode_text("Gymnázium".as_bytes()), "Gymnázium");
    }

    #[test]
    fn capacity_file_name_convention() {
        assert_eq!(capacity_file_name("2024", 2), "PZ2024_kolo2_skolobory_kapacity.csv");
    }
}
