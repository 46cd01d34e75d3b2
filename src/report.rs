use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::Status;
use crate::database::StatusCount;

/// One row of the per-program pivot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramCounts {
    #[serde(rename = "Prodi")]
    pub prodi: String,
    #[serde(rename = "Tidak DO")]
    pub tidak_do: i64,
    #[serde(rename = "DO")]
    pub do_count: i64,
}

/// Long-form `(prodi, status, count)` triple used by the bar chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub prodi: String,
    pub status: Status,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSummary {
    pub max_do: Option<ProgramCounts>,
    pub min_do: Option<ProgramCounts>,
    pub max_message: String,
    pub min_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub table: Vec<ProgramCounts>,
    pub chart: Vec<ChartPoint>,
    pub summary: ProgramSummary,
    pub message: Option<String>,
}

/// Pivots grouped counts into one row per program, ordered by program name.
/// A missing `(prodi, status)` combination counts as zero.
pub fn pivot(counts: &[StatusCount]) -> Vec<ProgramCounts> {
    let mut table: BTreeMap<&str, ProgramCounts> = BTreeMap::new();

    for group in counts {
        let Some(status) = Status::parse(&group.status) else {
            continue;
        };
        let row = table
            .entry(group.prodi.as_str())
            .or_insert_with(|| ProgramCounts {
                prodi: group.prodi.clone(),
                tidak_do: 0,
                do_count: 0,
            });
        match status {
            Status::Do => row.do_count += group.count,
            Status::TidakDo => row.tidak_do += group.count,
        }
    }

    table.into_values().collect()
}

pub fn melt(table: &[ProgramCounts]) -> Vec<ChartPoint> {
    table
        .iter()
        .flat_map(|row| {
            [
                ChartPoint {
                    prodi: row.prodi.clone(),
                    status: Status::TidakDo,
                    count: row.tidak_do,
                },
                ChartPoint {
                    prodi: row.prodi.clone(),
                    status: Status::Do,
                    count: row.do_count,
                },
            ]
        })
        .collect()
}

/// Programs with the most and the fewest DO students.
///
/// Returns `None` when the table is empty or holds no DO at all. Ties go to
/// the program that sorts first.
pub fn summarize(table: &[ProgramCounts]) -> Option<(ProgramCounts, ProgramCounts)> {
    if table.iter().all(|row| row.do_count == 0) {
        return None;
    }

    let mut max = &table[0];
    let mut min = &table[0];
    for row in &table[1..] {
        if row.do_count > max.do_count {
            max = row;
        }
        if row.do_count < min.do_count {
            min = row;
        }
    }

    Some((max.clone(), min.clone()))
}

pub fn build_report(counts: &[StatusCount]) -> ReportView {
    let table = pivot(counts);
    let chart = melt(&table);

    let summary = match summarize(&table) {
        Some((max, min)) => ProgramSummary {
            max_message: format!(
                "Program studi dengan jumlah DO paling banyak adalah {} dengan {} DO.",
                max.prodi, max.do_count
            ),
            min_message: format!(
                "Program studi dengan jumlah DO paling sedikit adalah {} dengan {} DO.",
                min.prodi, min.do_count
            ),
            max_do: Some(max),
            min_do: Some(min),
        },
        None => ProgramSummary {
            max_do: None,
            min_do: None,
            max_message: "Tidak ada data DO untuk menentukan program studi dengan jumlah DO paling banyak.".to_string(),
            min_message: "Tidak ada data DO untuk menentukan program studi dengan jumlah DO paling sedikit.".to_string(),
        },
    };

    let message = table
        .is_empty()
        .then(|| "Data kosong atau tidak ada data untuk laporan.".to_string());

    ReportView {
        table,
        chart,
        summary,
        message,
    }
}
