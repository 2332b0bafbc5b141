//! KPI aggregation engine.
//!
//! Every level is computed straight from the fact tables joined up through
//! school → block → district → state, so rates are weighted by people and
//! never by averaging the KPIs of the level below.

pub mod composite;
pub mod level;
pub mod metric;
pub mod types;

pub use composite::{AnchorPolicy, CompositeOptions, MissingDataPolicy};
pub use level::Level;
pub use metric::MetricKind;
pub use types::*;

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::integrity;
use crate::storage::{repository, Database};

/// Run `f` inside one read transaction after an integrity scan over the
/// same snapshot. Refuses to run `f` when the scan finds blocking violations.
pub(crate) async fn run_pass<T, F>(db: &Database, validate_domains: bool, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
{
    let (report, output) = db
        .reader()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let report = integrity::scan(&tx)?;
            let output = if report.blocking_error(validate_domains).is_some() {
                None
            } else {
                Some(f(&tx)?)
            };
            tx.commit()?;
            Ok::<_, rusqlite::Error>((report, output))
        })
        .await?;

    match output {
        Some(output) => Ok(output),
        None => Err(report
            .blocking_error(validate_domains)
            .unwrap_or_else(|| Error::Other("aggregation pass refused".into()))),
    }
}

/// One metric for every node of `level` that has facts for it.
pub async fn compute_metric(
    db: &Database,
    level: Level,
    kind: MetricKind,
) -> Result<Vec<MetricRow>> {
    log::info!("Computing {kind} at {level} level");
    run_pass(db, false, move |conn| {
        metric::metric_rows(conn, level, kind)
    })
    .await
}

/// All six metrics at `level`, from one consistent snapshot.
pub async fn compute_metrics(db: &Database, level: Level) -> Result<Vec<MetricSeries>> {
    log::info!("Computing all metrics at {level} level");
    run_pass(db, false, move |conn| {
        MetricKind::ALL
            .into_iter()
            .map(|metric| {
                Ok(MetricSeries {
                    level,
                    metric,
                    rows: metric::metric_rows(conn, level, metric)?,
                })
            })
            .collect()
    })
    .await
}

/// The weighted performance index for every anchored node of `level`.
pub async fn compute_composite(
    db: &Database,
    level: Level,
    opts: &CompositeOptions,
) -> Result<Vec<CompositeRow>> {
    log::info!(
        "Computing composite at {level} level (anchor={}, missing={})",
        opts.anchor,
        opts.missing_data
    );
    let opts = *opts;
    run_pass(db, opts.validate_domains, move |conn| {
        composite::composite_rows(conn, level, &opts)
    })
    .await
}

/// Composite options from the `kpi_anchor` and `kpi_missing_data` config keys.
pub async fn load_options(db: &Database) -> Result<CompositeOptions> {
    let (anchor, missing) = db
        .reader()
        .call(|conn| {
            let anchor = repository::get_config(conn, CompositeOptions::ANCHOR_KEY)?;
            let missing = repository::get_config(conn, CompositeOptions::MISSING_DATA_KEY)?;
            Ok::<_, rusqlite::Error>((anchor, missing))
        })
        .await?;
    CompositeOptions::from_config(anchor.as_deref(), missing.as_deref())
}
