use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};

use autograder::config::load_config;
use autograder::report::Formatter;

const DEFAULT_CONFIG: &str = "./grader.toml";
const DEFAULT_RESULTS_PATH: &str = "/autograder/results/results.json";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autograder=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config_path =
        PathBuf::from(std::env::var("GRADER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.into()));
    let results_path = PathBuf::from(
        std::env::var("RESULTS_PATH").unwrap_or_else(|_| DEFAULT_RESULTS_PATH.into()),
    );
    let submission_override = std::env::var("SUBMISSION_PATH").ok().map(PathBuf::from);

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut autograders = Vec::with_capacity(config.autograders.len());
    for ag_config in &config.autograders {
        autograders.push(ag_config.build(submission_override.as_deref())?);
    }

    for autograder in autograders.iter_mut() {
        info!("Running autograder {}", autograder.name());
        if let Err(e) = autograder.execute().await {
            error!("Autograder {} aborted: {}", autograder.name(), e);
            return Err(e).context("Grading run aborted");
        }
    }

    let report = Formatter::new(config.report).format_autograders(&autograders);
    report.export(&results_path).await?;
    info!(
        "Graded {} test(s), score {:.4}",
        report.tests.len(),
        report.score
    );

    for autograder in autograders {
        autograder.cleanup()?;
    }
    Ok(())
}
