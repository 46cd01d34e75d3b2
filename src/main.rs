use std::sync::Arc;

use actix_web::cookie::Key;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dropout_classifier::api::{self, AppState};
use dropout_classifier::config::{Cli, Commands, ServeArgs, TrainArgs};
use dropout_classifier::data;
use dropout_classifier::database::Database;
use dropout_classifier::ingest;
use dropout_classifier::model::{Classifier, SvmPipeline};

fn session_key(args: &ServeArgs) -> anyhow::Result<Key> {
    match &args.session_key {
        Some(secret) => Key::try_from(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("SESSION_KEY must be at least 64 bytes: {e}")),
        None => {
            warn!("SESSION_KEY not set; sessions will not survive a restart");
            Ok(Key::generate())
        }
    }
}

async fn start_api(
    db: Database,
    classifier: Arc<dyn Classifier>,
    args: ServeArgs,
) -> anyhow::Result<()> {
    let key = session_key(&args)?;
    let state = web::Data::new(AppState {
        db,
        classifier,
        dataset: args.dataset.clone(),
    });
    let payload_limit = args.max_upload_bytes;

    info!("Starting dashboard on http://{}:{}", args.bind, args.port);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(api::session_middleware(key.clone()))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(payload_limit))
            .configure(api::configure)
    })
    .bind((args.bind.as_str(), args.port))?
    .run()
    .await
    .context("server error")
}

fn train(args: &TrainArgs, out: &std::path::Path) -> anyhow::Result<()> {
    let batch = data::load_batch(&args.csv)
        .with_context(|| format!("failed to load {}", args.csv.display()))?;
    info!("Loaded {} student records", batch.len());

    let pipeline = SvmPipeline::fit(&batch, args.params())?;
    let predicted = pipeline.predict(&batch.features())?;
    let evaluation = dropout_classifier::analytics::evaluate(&batch.targets(), &predicted);
    info!("Training accuracy: {:.2}%", evaluation.accuracy * 100.0);
    info!("Classification report:\n{}", evaluation.report_text);

    pipeline
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!("Model artifact written to {}", out.display());
    Ok(())
}

fn load_model(path: &std::path::Path) -> anyhow::Result<Arc<dyn Classifier>> {
    if !path.exists() {
        bail!(
            "model artifact {} not found; create one with the `train` command",
            path.display()
        );
    }
    let pipeline = SvmPipeline::load(path)
        .with_context(|| format!("failed to load model from {}", path.display()))?;
    Ok(Arc::new(pipeline))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropout_classifier=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => train(&args, &cli.model)?,
        Commands::Serve(args) => {
            let classifier = load_model(&cli.model)?;
            let db = Database::connect(&cli.database_url)
                .await
                .context("failed to open database")?;
            start_api(db, classifier, args).await?;
        }
        Commands::Import { csv } => {
            let classifier = load_model(&cli.model)?;
            let db = Database::connect(&cli.database_url)
                .await
                .context("failed to open database")?;
            let bytes = std::fs::read(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;

            let view = ingest::classify_upload(&db, classifier.as_ref(), &bytes).await?;
            for warning in &view.persisted.warnings {
                warn!("{warning}");
            }
            info!(
                "Accuracy {:.2}; inserted {} of {} rows from {}",
                view.classified.evaluation.accuracy,
                view.persisted.inserted,
                view.classified.rows.len(),
                csv.display()
            );
        }
    }

    Ok(())
}
