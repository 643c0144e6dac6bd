//! CSV rendering and file placement for history exports.

use csv::{QuoteStyle, WriterBuilder};
use lib_common::connections::Row;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Renders `rows` with a header line; `columns` fixes the order. Every field
/// that is not a number is quoted.
pub fn rows_to_csv(rows: &[Row], columns: &[&str]) -> Result<String, csv::Error> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| cell(row.get(*c))))?;
    }
    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// `<base>/<name>.csv`, or `<name> (n).csv` with the first free `n`.
pub fn unique_csv_path(base: &Path, name: &str) -> PathBuf {
    let mut path = base.join(format!("{}.csv", name));
    let mut count = 1;
    while path.exists() {
        path = base.join(format!("{} ({}).csv", name, count));
        count += 1;
    }
    path
}

/// Writes `csv` under `base` (created if missing) and returns the file used.
pub fn save_csv(base: &Path, name: &str, csv: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(base)?;
    let path = unique_csv_path(base, name);
    fs::write(&path, csv)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_stay_bare_and_everything_else_is_quoted() {
        let rows: Vec<Row> = vec![
            json!({"recipe_no": 2, "date": "2024-03-01", "ng_count": 7}).as_object().cloned().unwrap(),
            json!({"recipe_no": 2, "date": "say \"hi\", twice", "ng_count": null}).as_object().cloned().unwrap(),
        ];
        let csv = rows_to_csv(&rows, &["recipe_no", "date", "ng_count"]).unwrap();
        assert_eq!(
            csv,
            "\"recipe_no\",\"date\",\"ng_count\"\n2,\"2024-03-01\",7\n2,\"say \"\"hi\"\", twice\",\"\"\n"
        );
    }

    #[test]
    fn test_embedded_line_breaks_stay_inside_one_field() {
        let rows: Vec<Row> = vec![json!({"note": "lane 3\nrecalibrated"}).as_object().cloned().unwrap()];
        let csv = rows_to_csv(&rows, &["note"]).unwrap();
        assert_eq!(csv, "\"note\"\n\"lane 3\nrecalibrated\"\n");

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "lane 3\nrecalibrated");
    }

    #[test]
    fn test_existing_files_get_a_counter_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = save_csv(dir.path(), "20240301_recipe2", "a").unwrap();
        let second = save_csv(dir.path(), "20240301_recipe2", "b").unwrap();
        let third = save_csv(dir.path(), "20240301_recipe2", "c").unwrap();

        assert_eq!(first.file_name().unwrap(), "20240301_recipe2.csv");
        assert_eq!(second.file_name().unwrap(), "20240301_recipe2 (1).csv");
        assert_eq!(third.file_name().unwrap(), "20240301_recipe2 (2).csv");
        assert_eq!(fs::read_to_string(second).unwrap(), "b");
    }

    #[test]
    fn test_missing_base_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("exports").join("csv");
        let path = save_csv(&base, "x", "a").unwrap();
        assert!(path.starts_with(&base));
    }
}
