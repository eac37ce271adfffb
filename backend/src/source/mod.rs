//! Source loading: resolve a path pattern to files and parse them into records.
//!
//! A source path is either a literal file or a wildcard pattern such as
//! `/data/input/events/person/*`. Every matched file is parsed and each
//! record is tagged with the file it came from.
//!
//! Loading is all-or-nothing: the first unreadable file or malformed line
//! aborts the whole load.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{DataFormat, Source};
use crate::error::{SourceLoadError, SourceResult};
use crate::models::{Dataset, Record, TrackedRecord};

/// Loads sources into datasets.
pub struct SourceLoader;

impl SourceLoader {
    /// Load a configured source into a dataset named after it.
    pub fn load(source: &Source) -> SourceResult<Dataset> {
        Self::load_files(&source.name, &source.path, source.format)
    }

    /// Load from an untyped format name, as found in raw metadata.
    #[cfg(test)]
    pub fn load_path(name: &str, pattern: &str, format: &str) -> SourceResult<Dataset> {
        let format = DataFormat::parse(format)
            .ok_or_else(|| SourceLoadError::UnsupportedFormat(format.to_string()))?;
        Self::load_files(name, pattern, format)
    }

    fn load_files(name: &str, pattern: &str, format: DataFormat) -> SourceResult<Dataset> {
        let files = resolve(pattern)?;
        let mut records = Vec::new();

        for path in files {
            let source_file: Arc<str> = Arc::from(path.display().to_string());
            let parsed = read_records(&path, format)?;
            tracing::debug!(file = %source_file, records = parsed.len(), "parsed source file");
            records.extend(
                parsed
                    .into_iter()
                    .map(|record| TrackedRecord::loaded(record, Arc::clone(&source_file), name)),
            );
        }

        Ok(Dataset::new(name, records))
    }
}

/// Whether a path contains glob metacharacters.
pub fn is_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Resolve a source path to the files it designates, sorted.
///
/// A path naming an existing file is used as is. Wildcard patterns must match at least one file; a missing parent
/// directory is reported as such rather than as an empty match.
pub fn resolve(pattern: &str) -> SourceResult<Vec<PathBuf>> {
    let path = Path::new(pattern);

    // An existing file is taken literally, even if its name contains `[` or `?`
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !is_pattern(pattern) {
        return Err(SourceLoadError::FileNotFound(path.to_path_buf()));
    }

    if let Some(parent) = path.parent() {
        let parent_str = parent.to_string_lossy();
        if !parent_str.is_empty() && !is_pattern(&parent_str) && !parent.is_dir() {
            return Err(SourceLoadError::DirectoryNotFound(parent.to_path_buf()));
        }
    }

    let entries = glob::glob(pattern).map_err(|e| SourceLoadError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let file = entry.map_err(|e| SourceLoadError::Io {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        // Only include actual files, not directories
        if file.is_file() {
            files.push(file);
        }
    }

    if files.is_empty() {
        return Err(SourceLoadError::NoMatches(pattern.to_string()));
    }

    files.sort();
    Ok(files)
}

/// Parse one file into records.
pub fn read_records(path: &Path, format: DataFormat) -> SourceResult<Vec<Record>> {
    let content = fs::read_to_string(path).map_err(|source| SourceLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match format {
        DataFormat::Json => parse_documents(path, &content),
        DataFormat::JsonLines => parse_lines(path, &content),
    }
}

/// A file holding one JSON object, or several objects separated by whitespace.
fn parse_documents(path: &Path, content: &str) -> SourceResult<Vec<Record>> {
    let mut records = Vec::new();
    let mut stream = serde_json::Deserializer::from_str(content).into_iter::<Value>();

    while let Some(item) = stream.next() {
        match item {
            Ok(Value::Object(map)) => records.push(Record::new(map)),
            Ok(_) => {
                return Err(SourceLoadError::NotAnObject {
                    path: path.to_path_buf(),
                    line: line_at(content, stream.byte_offset()),
                })
            }
            Err(source) => {
                return Err(SourceLoadError::InvalidJson {
                    path: path.to_path_buf(),
                    line: source.line(),
                    source,
                })
            }
        }
    }

    Ok(records)
}

/// One JSON object per non-empty line.
fn parse_lines(path: &Path, content: &str) -> SourceResult<Vec<Record>> {
    let mut records = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        // Skip empty lines
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => records.push(Record::new(map)),
            Ok(_) => {
                return Err(SourceLoadError::NotAnObject {
                    path: path.to_path_buf(),
                    line: idx + 1,
                })
            }
            Err(source) => {
                return Err(SourceLoadError::InvalidJson {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })
            }
        }
    }

    Ok(records)
}

fn line_at(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_glob_tags_source_file() {
        let dir = tempdir().unwrap();
        write(dir.path(), "b.json", "{\"name\":\"B\",\"office\":\"SEVILLA\"}\n");
        write(
            dir.path(),
            "a.json",
            "{\"name\":\"A\",\"age\":30,\"office\":\"MADRID\"}\n\n{\"name\":\"C\",\"age\":40,\"office\":\"\"}\n",
        );

        let pattern = format!("{}/*", dir.path().display());
        let dataset = SourceLoader::load_path("person_inputs", &pattern, "JSON").unwrap();

        assert_eq!(dataset.name, "person_inputs");
        assert_eq!(dataset.len(), 3);
        // Files are processed in sorted order
        assert_eq!(dataset.records[0].record.get("name").unwrap(), "A");
        assert_eq!(dataset.records[1].record.get("name").unwrap(), "C");
        assert_eq!(dataset.records[2].record.get("name").unwrap(), "B");
        assert!(dataset.records[2].source_file.ends_with("b.json"));
        assert_eq!(dataset.records[0].transformation_path, "person_inputs");
    }

    #[test]
    fn test_literal_file_with_glob_metacharacters() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "people[2024].json", "{\"name\":\"A\"}\n");

        let dataset = SourceLoader::load_path("s", &path.display().to_string(), "JSON").unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(&*dataset.records[0].source_file, path.display().to_string());
    }

    #[test]
    fn test_pretty_printed_single_document() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "one.json", "{\n  \"name\": \"A\",\n  \"age\": 30\n}\n");

        let records = read_records(&path, DataFormat::Json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("age").unwrap(), 30);
    }

    #[test]
    fn test_glob_without_matches_fails() {
        let dir = tempdir().unwrap();
        write(dir.path(), "data.txt", "{}");

        let pattern = format!("{}/*.json", dir.path().display());
        let err = SourceLoader::load_path("s1", &pattern, "JSON").unwrap_err();
        assert!(matches!(err, SourceLoadError::NoMatches(_)));
    }

    #[test]
    fn test_glob_missing_directory() {
        let dir = tempdir().unwrap();
        let pattern = format!("{}/missing/*", dir.path().display());

        let err = resolve(&pattern).unwrap_err();
        assert!(matches!(err, SourceLoadError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_missing_literal_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.json");

        let err = resolve(&path.display().to_string()).unwrap_err();
        assert!(matches!(err, SourceLoadError::FileNotFound(_)));
    }

    #[test]
    fn test_malformed_line_reports_file_and_line() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "bad.json", "{\"name\":\"A\"}\n\n{\"name\":\n");

        let err = read_records(&path, DataFormat::JsonLines).unwrap_err();
        match err {
            SourceLoadError::InvalidJson { path: p, line, .. } => {
                assert_eq!(p, path);
                assert_eq!(line, 3);
            }
            other => panic!("expected InvalidJson, got {other}"),
        }
    }

    #[test]
    fn test_non_object_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "arr.json", "{\"a\":1}\n[1, 2]\n");

        let err = read_records(&path, DataFormat::Json).unwrap_err();
        assert!(matches!(err, SourceLoadError::NotAnObject { line: 2, .. }));
    }

    #[test]
    fn test_unsupported_format() {
        let err = SourceLoader::load_path("s1", "whatever.csv", "CSV").unwrap_err();
        assert!(matches!(err, SourceLoadError::UnsupportedFormat(f) if f == "CSV"));
    }
}
