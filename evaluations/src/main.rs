//! CLI entrypoint for the offline evaluation harness: seeds a corpus fixture into a database and
//! runs every fixture question through the orchestrator, printing a verification-score and
//! citation-coverage report. Not part of the shipped service; invoked manually or from CI.

use std::path::PathBuf;

use clap::Parser;
use common::{storage::db::SurrealDbClient, utils::config::get_config, utils::llm::LlmClient};
use evaluations::{fixture::FixtureCorpus, runner};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(about = "Runs the query-answering core against a fixture corpus and scores the results")]
struct Args {
    /// Path to a fixture corpus JSON file (see `evaluations::fixture::FixtureCorpus`).
    #[arg(long)]
    corpus: PathBuf,

    /// If set, seeds an ephemeral in-memory database instead of the one named by
    /// `SURREALDB_*` environment variables. Use this for a self-contained local run.
    #[arg(long, default_value_t = true)]
    in_memory: bool,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let config = get_config()?;
    let corpus = FixtureCorpus::load(&args.corpus)?;

    let db = if args.in_memory {
        SurrealDbClient::memory("evaluations", &format!("run-{}", uuid::Uuid::new_v4())).await?
    } else {
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
            config.db_timeout_secs,
        )
        .await?
    };
    db.apply_migrations().await?;
    runner::seed_corpus(&db, &corpus).await?;

    let llm = LlmClient::new(&config);
    let report = runner::run(&db, &llm, &config, &corpus).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "\n{} cases, mean verification score {:?}, mean citation coverage {:.2}",
        report.cases.len(),
        report.mean_verification_score,
        report.mean_citation_coverage
    );

    Ok(())
}
