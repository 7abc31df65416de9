use std::path::Path;

use chrono::{Datelike, Local};
use sweep_core::{PeriodError, PeriodQuery, StatusSnapshot, StatusView};
use sweep_engine::{
    ensure_dir, EngineError, ExportError, ExportOptions, FileStore, PanelError, PersistError,
    StartOutcome, StoreError, SweepEngine, SweepSettings,
};
use sweep_logging::sweep_info;
use thiserror::Error;

use crate::preferences::{load_preferences, save_preferences};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Panel(#[from] PanelError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Period(#[from] PeriodError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

fn open_engine(data_dir: &Path, settings: SweepSettings) -> Result<SweepEngine, AppError> {
    ensure_dir(data_dir)?;
    Ok(SweepEngine::new(settings, FileStore::new(data_dir))?)
}

fn print_status(status: &StatusSnapshot) {
    let view = StatusView::from(status);
    println!(
        "{} ({}%), {} records, {} pending, {} stalled",
        view.headline, view.percent, view.record_count, status.pending, view.stalled
    );
}

pub async fn cmd_count(data_dir: &Path, listing: &str) -> Result<(), AppError> {
    let engine = open_engine(data_dir, SweepSettings::default())?;
    let panel = engine.panel();
    let context = panel.open_listing(listing).await?;
    let count = panel.link_count(context).await?;
    println!("{count} detail links on {listing}");
    Ok(())
}

pub async fn cmd_start(
    data_dir: &Path,
    listing: &str,
    batch_size: Option<usize>,
) -> Result<(), AppError> {
    let mut prefs = load_preferences(data_dir);
    if let Some(requested) = batch_size {
        prefs.set_batch_size(requested);
        save_preferences(data_dir, &prefs);
    }

    let settings = SweepSettings::default().with_batch_size(prefs.batch_size());
    let batch_size = settings.batch_size;
    let engine = open_engine(data_dir, settings)?;
    let panel = engine.panel();
    let context = panel.open_listing(listing).await?;

    match panel.start(context, batch_size).await? {
        StartOutcome::NothingFound => {
            println!("No detail links found on {listing}; nothing started.");
            return Ok(());
        }
        StartOutcome::Started { total, batch_size } => {
            println!("Started: {total} links in batches of {batch_size}");
        }
    }

    // Contexts live in this process, so follow the run until it settles.
    let mut last_headline = String::new();
    let status = panel
        .wait_until_settled(|status| {
            let view = StatusView::from(status);
            if view.headline != last_headline {
                print_status(status);
                last_headline = view.headline;
            }
        })
        .await?;

    if status.stalled > 0 {
        println!("{} items never reported:", status.stalled);
        for item in engine.store().stalled_work()? {
            println!("  {} {}", item.ticket, item.address);
        }
    }
    sweep_info!("run {} settled as {:?}", status.run.run_id, status.run.phase);
    print_status(&status);
    Ok(())
}

pub async fn cmd_status(data_dir: &Path) -> Result<(), AppError> {
    let engine = open_engine(data_dir, SweepSettings::default())?;
    let status = engine.panel().status().await?;
    print_status(&status);
    for item in engine.store().stalled_work()? {
        println!("  stalled: {} {}", item.ticket, item.address);
    }
    Ok(())
}

pub fn cmd_export(data_dir: &Path, out: &Path, prefix: String) -> Result<(), AppError> {
    let engine = open_engine(data_dir, SweepSettings::default())?;
    let options = ExportOptions {
        prefix,
        ..ExportOptions::default()
    };
    let summary = engine
        .panel()
        .export(out, &options, Local::now().date_naive())?;
    println!(
        "Exported {} records to {}",
        summary.record_count,
        summary.path.display()
    );
    Ok(())
}

pub async fn cmd_clear(data_dir: &Path) -> Result<(), AppError> {
    let engine = open_engine(data_dir, SweepSettings::default())?;
    engine.panel().clear().await?;
    println!("Run state and records cleared.");
    Ok(())
}

pub fn cmd_address(
    data_dir: &Path,
    month: Option<u32>,
    year: Option<i32>,
    base: Option<String>,
) -> Result<(), AppError> {
    let now = Local::now();
    let mut prefs = load_preferences(data_dir);
    let month = month.or(prefs.month).unwrap_or_else(|| now.month());
    let year = year.or(prefs.year).unwrap_or_else(|| now.year());

    let mut query = PeriodQuery::default();
    if let Some(base) = base {
        query.base = base;
    }
    let address = query.address(month, year, &now)?;

    prefs.month = Some(month);
    prefs.year = Some(year);
    save_preferences(data_dir, &prefs);
    println!("{address}");
    Ok(())
}
