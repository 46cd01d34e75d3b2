use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{StudentBatch, FEATURE_COLUMNS};
use crate::error::{Error, Result};

/// Scores a feature matrix (one row per student, `FEATURE_COLUMNS` wide).
/// `true` means the student is predicted to drop out.
pub trait Classifier: Send + Sync {
    fn predict(&self, features: &Array2<f64>) -> Result<Array1<bool>>;
}

/// Kernel used when fitting a new pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Linear,
    Gaussian { eps: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingParams {
    pub kernel: Kernel,
    /// Penalty applied to both classes.
    pub c: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            kernel: Kernel::Linear,
            c: 1.0,
        }
    }
}

/// Per-column standardization fitted on the training set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(records: &Array2<f64>) -> Result<Self> {
        let mean = records
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::Model("cannot fit scaler on an empty matrix".to_string()))?;
        // Constant columns are left unscaled.
        let scale = records
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, records: &Array2<f64>) -> Array2<f64> {
        (records - &self.mean) / &self.scale
    }
}

/// Scaler followed by a support vector machine, stored as one JSON artifact.
#[derive(Serialize, Deserialize)]
pub struct SvmPipeline {
    scaler: StandardScaler,
    svm: Svm<f64, bool>,
}

impl SvmPipeline {
    pub fn fit(batch: &StudentBatch, params: TrainingParams) -> Result<Self> {
        let records = batch.features();
        let targets = batch.targets();

        let positives = targets.iter().filter(|&&t| t).count();
        if positives == 0 || positives == targets.len() {
            return Err(Error::Model(
                "training data must contain both DO and Tidak DO rows".to_string(),
            ));
        }

        let scaler = StandardScaler::fit(&records)?;
        let dataset = Dataset::new(scaler.transform(&records), targets);

        let svm_params = Svm::<f64, bool>::params().pos_neg_weights(params.c, params.c);
        let svm_params = match params.kernel {
            Kernel::Linear => svm_params.linear_kernel(),
            Kernel::Gaussian { eps } => svm_params.gaussian_kernel(eps),
        };
        let svm = svm_params
            .fit(&dataset)
            .map_err(|e| Error::Model(format!("failed to train SVM: {e}")))?;

        info!(rows = batch.len(), kernel = ?params.kernel, c = params.c, "SVM pipeline trained");
        Ok(Self { scaler, svm })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let pipeline = serde_json::from_reader(reader)?;
        info!("Loaded model artifact from {}", path.display());
        Ok(pipeline)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}

impl Classifier for SvmPipeline {
    fn predict(&self, features: &Array2<f64>) -> Result<Array1<bool>> {
        check_width(features)?;
        if features.nrows() == 0 {
            return Ok(Array1::from(Vec::new()));
        }
        let scaled = self.scaler.transform(features);
        let predicted: Array1<bool> = self.svm.predict(&scaled);
        Ok(predicted)
    }
}

pub(crate) fn check_width(features: &Array2<f64>) -> Result<()> {
    if features.ncols() != FEATURE_COLUMNS.len() {
        return Err(Error::Model(format!(
            "expected {} feature columns, got {}",
            FEATURE_COLUMNS.len(),
            features.ncols()
        )));
    }
    Ok(())
}
