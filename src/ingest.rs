use serde::Serialize;
use tracing::{info, warn};

use crate::analytics::{self, Evaluation, ProgramStatusShare, StatusShare};
use crate::data::{self, Status, StudentBatch, StudentRecord};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::model::Classifier;

/// An uploaded row together with the model's verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub record: StudentRecord,
    pub predicted_status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedBatch {
    pub rows: Vec<ClassifiedRecord>,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistOutcome {
    pub inserted: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadView {
    #[serde(flatten)]
    pub classified: ClassifiedBatch,
    pub persisted: PersistOutcome,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    #[serde(flatten)]
    pub classified: ClassifiedBatch,
    pub status_distribution: Vec<StatusShare>,
    pub status_by_program: Vec<ProgramStatusShare>,
}

pub fn duplicate_warning(nim: &str) -> String {
    format!("Data dengan NIM {nim} sudah ada di database dan tidak akan diupload.")
}

/// Runs the model over a normalized batch and scores it against the
/// ground-truth `Status` column.
pub fn classify(classifier: &dyn Classifier, batch: StudentBatch) -> Result<ClassifiedBatch> {
    let predicted = classifier.predict(&batch.features())?;
    if predicted.len() != batch.len() {
        return Err(Error::Model(format!(
            "model returned {} labels for {} rows",
            predicted.len(),
            batch.len()
        )));
    }

    let evaluation = analytics::evaluate(&batch.targets(), &predicted);
    let rows = batch
        .records
        .into_iter()
        .zip(predicted.iter())
        .map(|(record, &label)| ClassifiedRecord {
            record,
            predicted_status: Status::from_label(label),
        })
        .collect();

    Ok(ClassifiedBatch { rows, evaluation })
}

impl PersistOutcome {
    fn skip(&mut self, nim: &str) {
        warn!(nim, "Skipping duplicate student");
        self.skipped += 1;
        self.warnings.push(duplicate_warning(nim));
    }
}

/// Stores each row in file order. Existing NIMs are skipped with a warning,
/// including one stored by a concurrent upload between the check and the
/// insert. Each insert commits on its own, so a failure keeps the rows before
/// it.
pub async fn persist(db: &Database, rows: &[ClassifiedRecord]) -> Result<PersistOutcome> {
    let mut outcome = PersistOutcome::default();

    for row in rows {
        let nim = row.record.nim.as_str();
        if db.exists(nim).await? {
            outcome.skip(nim);
            continue;
        }

        match db.insert(&row.record).await? {
            Some(id) => {
                db.insert_result(id, row.predicted_status).await?;
                outcome.inserted += 1;
            }
            None => outcome.skip(nim),
        }
    }

    info!(
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        "Upload persisted"
    );
    Ok(outcome)
}

/// Upload flow: normalize, classify, evaluate, then persist.
pub async fn classify_upload(
    db: &Database,
    classifier: &dyn Classifier,
    csv: &[u8],
) -> Result<UploadView> {
    let batch = data::read_batch(csv)?;
    info!(rows = batch.len(), "Classifying upload");

    let classified = classify(classifier, batch)?;
    let persisted = persist(db, &classified.rows).await?;

    Ok(UploadView {
        classified,
        persisted,
        message: "Proses upload selesai!".to_string(),
    })
}

pub fn dashboard(classifier: &dyn Classifier, batch: StudentBatch) -> Result<DashboardView> {
    let status_distribution = analytics::status_distribution(&batch);
    let status_by_program = analytics::status_by_program(&batch);
    let classified = classify(classifier, batch)?;

    Ok(DashboardView {
        classified,
        status_distribution,
        status_by_program,
    })
}
