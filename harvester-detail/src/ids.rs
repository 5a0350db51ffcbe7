use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;

/// Read the record ids to fetch from the id-column export. Ids are
/// deduplicated in order; empty and null cells are dropped.
pub fn read_record_ids(path: &Path) -> anyhow::Result<Vec<String>> {
    if !path.exists() {
        anyhow::bail!("ids file {} does not exist", path.display());
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open ids file {}", path.display()))?;

    let headers = reader.headers().context("ids file has no header row")?;
    let id_column = headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case("id"))
        .unwrap_or(0);

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed row in ids file")?;
        let Some(value) = record.get(id_column) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("null") {
            continue;
        }
        if seen.insert(value.to_string()) {
            ids.push(value.to_string());
        }
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn dedupes_and_drops_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract_ids.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "id,region").unwrap();
        writeln!(file, "24-001,I").unwrap();
        writeln!(file, "24-002,II").unwrap();
        writeln!(file, "24-001,I").unwrap();
        writeln!(file, "null,III").unwrap();
        writeln!(file, ",IV").unwrap();

        let ids = read_record_ids(&path).unwrap();
        assert_eq!(ids, vec!["24-001", "24-002"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_record_ids(&dir.path().join("nope.csv")).is_err());
    }

    #[test]
    fn falls_back_to_the_first_column_without_an_id_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        std::fs::write(&path, "contract,area\n24-003,X\n24-004,Y\n").unwrap();

        let ids = read_record_ids(&path).unwrap();
        assert_eq!(ids, vec!["24-003", "24-004"]);
    }
}
