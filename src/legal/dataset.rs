//! Matters/contacts dataset loading.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DatasetConfig;
use crate::error::DataLoadError;

pub const COL_ATTORNEY: &str = "Attorney";
pub const COL_PRACTICE_AREA: &str = "Practice Area";
pub const COL_MATTER_DESCRIPTION: &str = "Matter Description";
pub const COL_WORK_EMAIL: &str = "Work Email";
pub const COL_ROLE_DETAIL: &str = "Role Detail";
pub const COL_CLIENT_NAME: &str = "Client Name";
pub const COL_MATTER: &str = "Matter";

const REQUIRED_COLUMNS: &[&str] = &[COL_ATTORNEY, COL_MATTER_DESCRIPTION];

/// One row of the matters dataset. A blank cell is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatterRecord {
    #[serde(rename = "Attorney", default)]
    pub attorney: Option<String>,
    #[serde(rename = "Practice Area", default)]
    pub practice_area: Option<String>,
    #[serde(rename = "Matter Description", default)]
    pub matter_description: Option<String>,
    #[serde(rename = "Work Email", default)]
    pub work_email: Option<String>,
    #[serde(rename = "Role Detail", default)]
    pub role_detail: Option<String>,
    #[serde(rename = "Client Name", default)]
    pub client_name: Option<String>,
    #[serde(rename = "Matter", default)]
    pub matter: Option<String>,
}

impl MatterRecord {
    /// Text fed to the similarity index.
    pub fn description_text(&self) -> &str {
        self.matter_description.as_deref().unwrap_or_default()
    }

    fn normalize_cells(mut self) -> Self {
        for cell in [
            &mut self.attorney,
            &mut self.practice_area,
            &mut self.matter_description,
            &mut self.work_email,
            &mut self.role_detail,
            &mut self.client_name,
            &mut self.matter,
        ] {
            *cell = cell
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        self
    }
}

/// Read-only collection of matter records, in file order.
#[derive(Debug, Clone)]
pub struct MatterDataset {
    source: PathBuf,
    records: Vec<MatterRecord>,
}

impl MatterDataset {
    pub fn load(config: &DatasetConfig) -> Result<Self, DataLoadError> {
        Self::load_path(&config.path, config.delimiter)
    }

    pub fn load_path(path: &Path, delimiter: u8) -> Result<Self, DataLoadError> {
        let bytes = std::fs::read(path).map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_bytes(path, &bytes, delimiter)?;
        tracing::info!(
            path = %path.display(),
            rows = dataset.len(),
            "Loaded matters dataset"
        );
        Ok(dataset)
    }

    /// Parse delimited bytes. `source` is only used for error reporting.
    pub fn from_bytes(source: &Path, bytes: &[u8], delimiter: u8) -> Result<Self, DataLoadError> {
        let decoded = decode_text(bytes);
        if matches!(decoded, Cow::Owned(_)) {
            tracing::warn!(
                path = %source.display(),
                "Dataset is not valid UTF-8; decoded as Latin-1"
            );
        }
        let text: &str = decoded.as_ref();
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let csv_err = |e: csv::Error| DataLoadError::Csv {
            path: source.to_path_buf(),
            source: e,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let headers: csv::StringRecord = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(normalize_header)
            .collect();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == *column) {
                return Err(DataLoadError::MissingColumn {
                    path: source.to_path_buf(),
                    column: (*column).to_string(),
                });
            }
        }
        reader.set_headers(headers);

        let mut records = Vec::new();
        for row in reader.deserialize::<MatterRecord>() {
            records.push(row.map_err(csv_err)?.normalize_cells());
        }

        if records.is_empty() {
            return Err(DataLoadError::Empty {
                path: source.to_path_buf(),
            });
        }

        Ok(Self {
            source: source.to_path_buf(),
            records,
        })
    }

    /// Build a dataset from records already in memory.
    pub fn from_records(records: Vec<MatterRecord>) -> Self {
        Self {
            source: PathBuf::from("<memory>"),
            records: records.into_iter().map(MatterRecord::normalize_cells).collect(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn records(&self) -> &[MatterRecord] {
        &self.records
    }

    pub fn get(&self, row: usize) -> Option<&MatterRecord> {
        self.records.get(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The default row used when retrieval finds nothing.
    pub fn first_with_attorney(&self) -> Option<&MatterRecord> {
        self.records.iter().find(|r| r.attorney.is_some())
    }

    /// Every row handled by `attorney`, in dataset order.
    pub fn matters_for_attorney(&self, attorney: &str) -> Vec<&MatterRecord> {
        self.records
            .iter()
            .filter(|r| r.attorney.as_deref() == Some(attorney))
            .collect()
    }
}

/// Decode as UTF-8, falling back to Latin-1 when the bytes are not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Trim a header and collapse internal whitespace runs to one space.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
