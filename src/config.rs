use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::{Kernel, TrainingParams};

#[derive(Parser, Debug)]
#[command(name = "dropout_classifier")]
#[command(about = "Classifies students as at risk of dropout (DO) and reports on the results")]
#[command(version)]
pub struct Cli {
    /// Database location
    #[arg(long, global = true, env = "DATABASE_URL", default_value = "sqlite://klasifikasi.db")]
    pub database_url: String,

    /// Pretrained model artifact
    #[arg(long, global = true, env = "MODEL_PATH", default_value = "svm_model.json")]
    pub model: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dashboard HTTP server
    Serve(ServeArgs),
    /// Fit the SVM pipeline on a labeled CSV and write the model artifact
    Train(TrainArgs),
    /// Classify a CSV and store the results without going through the server
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Reference dataset shown on the dashboard page
    #[arg(long, env = "DATASET_PATH")]
    pub dataset: Option<PathBuf>,

    /// Cookie signing key, at least 64 bytes. A random key is used when unset.
    #[arg(long, env = "SESSION_KEY", hide_env_values = true)]
    pub session_key: Option<String>,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg {
    Linear,
    Gaussian,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Labeled training data in the upload format
    #[arg(long)]
    pub csv: PathBuf,

    #[arg(long, value_enum, default_value_t = KernelArg::Linear)]
    pub kernel: KernelArg,

    /// Gaussian kernel width
    #[arg(long, default_value_t = 1.0)]
    pub eps: f64,

    /// Misclassification penalty
    #[arg(long, default_value_t = 1.0)]
    pub c: f64,
}

impl TrainArgs {
    pub fn params(&self) -> TrainingParams {
        let kernel = match self.kernel {
            KernelArg::Linear => Kernel::Linear,
            KernelArg::Gaussian => Kernel::Gaussian { eps: self.eps },
        };
        TrainingParams { kernel, c: self.c }
    }
}
