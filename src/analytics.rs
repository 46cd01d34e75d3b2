use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array1;
use serde::Serialize;

use crate::data::{Status, StudentBatch};

/// 2×2 matrix with label order `[Tidak DO, DO]`; rows are actual, columns
/// predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub labels: [Status; 2],
    pub matrix: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_labels(actual: &Array1<bool>, predicted: &Array1<bool>) -> Self {
        let mut matrix = [[0usize; 2]; 2];
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            matrix[usize::from(a)][usize::from(p)] += 1;
        }
        Self {
            labels: Status::ALL,
            matrix,
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.matrix[0][0] + self.matrix[1][1]) as f64 / total as f64
    }

    fn class_metrics(&self, class: usize) -> ClassMetrics {
        let other = 1 - class;
        let tp = self.matrix[class][class];
        let fp = self.matrix[other][class];
        let fn_ = self.matrix[class][other];

        // Undefined ratios evaluate to 1.0.
        let ratio = |num: usize, den: usize| if den == 0 { 1.0 } else { num as f64 / den as f64 };

        ClassMetrics {
            label: self.labels[class],
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, tp + fn_),
            f1_score: ratio(2 * tp, 2 * tp + fp + fn_),
            support: tp + fn_,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: Status,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

impl ClassificationReport {
    pub fn from_matrix(cm: &ConfusionMatrix) -> Self {
        let classes: Vec<ClassMetrics> = (0..2).map(|c| cm.class_metrics(c)).collect();
        let support: usize = classes.iter().map(|c| c.support).sum();

        let average = |weight: &dyn Fn(&ClassMetrics) -> f64| {
            let total: f64 = classes.iter().map(|c| weight(c)).sum();
            let mean = |metric: fn(&ClassMetrics) -> f64| {
                if total == 0.0 {
                    0.0
                } else {
                    classes.iter().map(|c| metric(c) * weight(c)).sum::<f64>() / total
                }
            };
            AverageMetrics {
                precision: mean(|c| c.precision),
                recall: mean(|c| c.recall),
                f1_score: mean(|c| c.f1_score),
                support,
            }
        };

        let macro_avg = average(&|_| 1.0);
        let weighted_avg = average(&|c| c.support as f64);

        Self {
            accuracy: cm.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label.as_str(),
                class.precision,
                class.recall,
                class.f1_score,
                class.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1_score, avg.support
            )?;
        }
        Ok(())
    }
}

/// Everything shown under "Hasil Evaluasi" for a classified batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub report: ClassificationReport,
    pub report_text: String,
}

pub fn evaluate(actual: &Array1<bool>, predicted: &Array1<bool>) -> Evaluation {
    let confusion_matrix = ConfusionMatrix::from_labels(actual, predicted);
    let report = ClassificationReport::from_matrix(&confusion_matrix);
    Evaluation {
        accuracy: confusion_matrix.accuracy(),
        report_text: report.to_string(),
        confusion_matrix,
        report,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusShare {
    pub status: Status,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramStatusShare {
    pub prodi: String,
    pub status: Status,
    pub count: usize,
}

/// Count of ground-truth statuses, both labels always present.
pub fn status_distribution(batch: &StudentBatch) -> Vec<StatusShare> {
    Status::ALL
        .iter()
        .map(|&status| StatusShare {
            status,
            count: batch.records.iter().filter(|r| r.status == status).count(),
        })
        .collect()
}

/// Ground-truth status counts per program, ordered by program then status.
pub fn status_by_program(batch: &StudentBatch) -> Vec<ProgramStatusShare> {
    let mut groups: BTreeMap<(&str, Status), usize> = BTreeMap::new();
    for record in &batch.records {
        *groups.entry((record.prodi.as_str(), record.status)).or_insert(0) += 1;
    }

    groups
        .into_iter()
        .map(|((prodi, status), count)| ProgramStatusShare {
            prodi: prodi.to_string(),
            status,
            count,
        })
        .collect()
}
