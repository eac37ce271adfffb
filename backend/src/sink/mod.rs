//! Sink writing: persist a dataset as JSON lines under a destination directory.
//!
//! Every sink writes one file, `<destination>/output.json`, containing one
//! JSON object per line. Invalid records carry their error list under
//! [`ERRORS_FIELD`](crate::models::ERRORS_FIELD).

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{SaveMode, Sink};
use crate::error::{SinkError, SinkResult};
use crate::models::{Dataset, TrackedRecord};
use crate::observability::logs::log_warning;

/// File name written inside every sink destination.
pub const OUTPUT_FILE: &str = "output.json";

/// Writes datasets to their sink destinations.
pub struct SinkWriter;

impl SinkWriter {
    /// Write `dataset` to the sink's first path. Returns the output file and record count.
    pub fn write(dataset: &Dataset, sink: &Sink) -> SinkResult<(PathBuf, usize)> {
        if sink.paths.len() > 1 {
            log_warning(format!(
                "Sink '{}' declares {} paths; only {} is written",
                sink.name,
                sink.paths.len(),
                sink.primary_path()
            ));
        }

        let file = write_records(&dataset.records, Path::new(sink.primary_path()), sink.save_mode)?;
        Ok((file, dataset.len()))
    }

    /// Write with untyped format and save mode names, as found in raw metadata.
    /// Both are checked before anything touches the filesystem.
    #[cfg(test)]
    pub fn write_output(
        records: &[TrackedRecord],
        destination: &Path,
        format: &str,
        save_mode: &str,
    ) -> SinkResult<PathBuf> {
        crate::config::DataFormat::parse(format).ok_or_else(|| SinkError::UnsupportedFormat(format.to_string()))?;
        let save_mode =
            SaveMode::parse(save_mode).ok_or_else(|| SinkError::UnsupportedSaveMode(save_mode.to_string()))?;
        write_records(records, destination, save_mode)
    }
}

/// Path of the file a sink writes for `destination`.
pub fn output_path(destination: &Path) -> PathBuf {
    destination.join(OUTPUT_FILE)
}

/// JSON and JSON-lines sinks share one layout: one object per line.
fn write_records(records: &[TrackedRecord], destination: &Path, save_mode: SaveMode) -> SinkResult<PathBuf> {
    fs::create_dir_all(destination).map_err(|source| SinkError::Io {
        path: destination.to_path_buf(),
        source,
    })?;

    let path = output_path(destination);
    let mut options = OpenOptions::new();
    match save_mode {
        SaveMode::Overwrite => options.write(true).create(true).truncate(true),
        SaveMode::Append => options.append(true).create(true),
    };

    let io_err = |source| SinkError::Io {
        path: path.clone(),
        source,
    };

    let file = options.open(&path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, &record.to_output()?)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;

    Ok(path)
}
