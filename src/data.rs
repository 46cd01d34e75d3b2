use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Header columns an uploaded file must carry.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "Nama",
    "Prodi",
    "NIM",
    "Jenjang",
    "IP",
    "IPK",
    "Jumlah Cuti",
    "Jumlah Semester",
    "Jumlah Kehadiran",
    "Status",
];

/// Predictor columns, in the order the model expects them.
pub const FEATURE_COLUMNS: [&str; 4] = ["IP", "IPK", "Jumlah Cuti", "Jumlah Kehadiran"];

/// Classification label. `Do` is the positive class (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "Tidak DO")]
    TidakDo,
    #[serde(rename = "DO")]
    Do,
}

impl Status {
    pub const ALL: [Status; 2] = [Status::TidakDo, Status::Do];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Do => "DO",
            Status::TidakDo => "Tidak DO",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "DO" => Some(Status::Do),
            "Tidak DO" => Some(Status::TidakDo),
            _ => None,
        }
    }

    pub fn from_label(label: bool) -> Self {
        if label {
            Status::Do
        } else {
            Status::TidakDo
        }
    }

    pub fn label(self) -> bool {
        self == Status::Do
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized row of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub nama: String,
    pub prodi: String,
    pub nim: String,
    pub jenjang: String,
    pub ip: f64,
    pub ipk: f64,
    pub jumlah_cuti: f64,
    pub jumlah_semester: f64,
    pub jumlah_kehadiran: f64,
    pub status: Status,
}

impl StudentRecord {
    pub fn features(&self) -> [f64; 4] {
        [self.ip, self.ipk, self.jumlah_cuti, self.jumlah_kehadiran]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentBatch {
    pub records: Vec<StudentRecord>,
}

impl StudentBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// N×4 matrix of `FEATURE_COLUMNS`.
    pub fn features(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.records.len(), FEATURE_COLUMNS.len()));
        for (mut row, record) in matrix.rows_mut().into_iter().zip(&self.records) {
            row.assign(&ArrayView1::from(&record.features()[..]));
        }
        matrix
    }

    /// Ground truth, `true` meaning DO.
    pub fn targets(&self) -> Array1<bool> {
        self.records.iter().map(|r| r.status.label()).collect()
    }
}

/// Parses a locale-formatted number: `"3,25"` becomes `3.25`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn load_batch(path: &Path) -> Result<StudentBatch> {
    let file = std::fs::File::open(path)?;
    read_batch(file)
}

/// Reads a `;`-delimited upload. Any malformed row aborts the whole batch.
pub fn read_batch<R: Read>(input: R) -> Result<StudentBatch> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .trim(Trim::All)
        .from_reader(input);

    let headers = rdr.headers()?.clone();
    let columns = ColumnIndex::resolve(&headers)?;

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        records.push(columns.normalize(&record, idx + 1)?);
    }

    Ok(StudentBatch { records })
}

struct ColumnIndex([usize; REQUIRED_COLUMNS.len()]);

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let mut positions = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| Error::MissingColumn(name.to_string()))?;
        }
        Ok(ColumnIndex(positions))
    }

    fn text<'r>(&self, record: &'r StringRecord, column: usize) -> &'r str {
        record.get(self.0[column]).unwrap_or("")
    }

    fn number(&self, record: &StringRecord, column: usize, row: usize) -> Result<f64> {
        let raw = self.text(record, column);
        parse_decimal(raw).ok_or_else(|| Error::InvalidValue {
            row,
            column: REQUIRED_COLUMNS[column],
            value: raw.to_string(),
        })
    }

    fn normalize(&self, record: &StringRecord, row: usize) -> Result<StudentRecord> {
        let status_text = self.text(record, 9);
        let status = Status::parse(status_text).ok_or_else(|| Error::UnknownStatus {
            row,
            value: status_text.to_string(),
        })?;

        Ok(StudentRecord {
            nama: self.text(record, 0).to_string(),
            prodi: self.text(record, 1).to_string(),
            nim: self.text(record, 2).to_string(),
            jenjang: self.text(record, 3).to_string(),
            ip: self.number(record, 4, row)?,
            ipk: self.number(record, 5, row)?,
            jumlah_cuti: self.number(record, 6, row)?,
            jumlah_semester: self.number(record, 7, row)?,
            jumlah_kehadiran: self.number(record, 8, row)?,
            status,
        })
    }
}
