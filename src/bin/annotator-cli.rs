use anyhow::{Context, Result, bail};
use clap::Parser;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::sync::Arc;

use rsml_annotator::catalog::{BatchId, FileId};
use rsml_annotator::http_catalog::HttpCatalog;
use rsml_annotator::logging;
use rsml_annotator::navigator::Navigator;
use rsml_annotator::save::SaveOrchestrator;
use rsml_annotator::{Opts, Session};
use tracing::info;
use tracing::level_filters::LevelFilter;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_with_default(LevelFilter::WARN);
    let params = get_params()?;

    let (catalog, user) = HttpCatalog::login(&params.server, &params.email, &params.password)
        .await
        .context("login failed")?;
    info!(user_id = %user.id, "logged in");

    let catalog = Arc::new(catalog);
    let opts = Opts::default();
    let navigator = Navigator::new(catalog.clone(), &opts);
    let saver = SaveOrchestrator::new(catalog, &opts);

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());

    let mut session = Session::new();
    let Some(file) = params.file else {
        let files = navigator.select_batch(&mut session, params.batch).await?;
        serde_json::to_writer_pretty(&mut writer, &files)?;
        writeln!(writer)?;
        return Ok(());
    };
    navigator.open(&mut session, params.batch, file).await?;

    let Some(edits_path) = &params.edits else {
        serde_json::to_writer_pretty(&mut writer, session.segments())?;
        writeln!(writer)?;
        return Ok(());
    };

    for (id, markup) in read_edits(edits_path)? {
        session
            .edit(&id, markup)
            .with_context(|| format!("cannot apply edit for segment '{id}'"))?;
    }

    let mut report = saver.save_all(&mut session).await;
    if params.retry && !report.is_complete() {
        info!(failed = report.fail_count, "retrying failed segments");
        report = saver.retry_failed(&mut session, &report).await;
    }

    serde_json::to_writer_pretty(&mut writer, &report)?;
    writeln!(writer)?;
    writer.flush()?;

    if !report.is_complete() {
        bail!("{} segment(s) failed to save", report.fail_count);
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "annotator-cli")]
#[command(about = "Load and save RSML annotations against an annotator-server")]
struct Params {
    /// Base URL of the server.
    #[arg(short = 's', long = "server", default_value = "http://127.0.0.1:5000")]
    pub server: String,

    #[arg(short = 'e', long = "email")]
    pub email: String,

    #[arg(long = "password", env = "ANNOTATOR_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[arg(short = 'b', long = "batch")]
    pub batch: BatchId,

    /// File to open. Without it, the batch's file list is printed.
    #[arg(short = 'f', long = "file")]
    pub file: Option<FileId>,

    /// JSON object mapping segment id to new markup; applied and saved in one pass.
    #[arg(long = "edits")]
    pub edits: Option<String>,

    /// Retry the failed segments once after a partial save.
    #[arg(long = "retry", default_value_t = false)]
    pub retry: bool,
}

fn get_params() -> Result<Params> {
    Ok(Params::parse())
}

fn read_edits(path: &str) -> Result<BTreeMap<String, String>> {
    let file = File::open(path).with_context(|| format!("open edits file '{path}'"))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parse edits file '{path}'"))
}
