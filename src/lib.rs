pub mod error;
pub mod ingest;
pub mod integrity;
pub mod kpi;
pub mod llm;
pub mod model;
pub mod report;
pub mod snapshot;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use error::{Error, Result};
pub use ingest::{Dataset, IngestProgress, IngestReport, IngestStatus, NoopProgress};
pub use integrity::IntegrityReport;
pub use kpi::{
    AnchorPolicy, CompositeOptions, CompositeRow, Level, MetricKind, MetricRow, MetricSeries,
    MissingDataPolicy,
};
pub use llm::analysis::{AnalysisResult, AnalysisType};
pub use report::{AtRiskQuery, AtRiskStudent, PerformanceBand, ReportRow};
pub use snapshot::SnapshotSummary;
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::SnapshotRow;

use storage::{repository, schema};

/// Main entry point for the school KPI warehouse.
pub struct SchoolKpi {
    db: Database,
}

impl SchoolKpi {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Loading ────────────────────────────────────────────────────

    pub async fn import(
        &self,
        dataset: Dataset,
        progress: Arc<dyn IngestProgress>,
    ) -> Result<IngestReport> {
        ingest::ingest(&self.db, dataset, progress).await
    }

    pub async fn validate(&self) -> Result<IntegrityReport> {
        integrity::check(&self.db).await
    }

    // ── KPIs ───────────────────────────────────────────────────────

    /// Composite options from config, with any explicit overrides applied.
    pub async fn options(
        &self,
        anchor: Option<AnchorPolicy>,
        missing_data: Option<MissingDataPolicy>,
        validate_domains: bool,
    ) -> Result<CompositeOptions> {
        let mut opts = kpi::load_options(&self.db).await?;
        if let Some(a) = anchor {
            opts.anchor = a;
        }
        if let Some(m) = missing_data {
            opts.missing_data = m;
        }
        opts.validate_domains = validate_domains;
        Ok(opts)
    }

    pub async fn metric(&self, level: Level, kind: MetricKind) -> Result<Vec<MetricRow>> {
        kpi::compute_metric(&self.db, level, kind).await
    }

    pub async fn metrics(&self, level: Level) -> Result<Vec<MetricSeries>> {
        kpi::compute_metrics(&self.db, level).await
    }

    pub async fn composite(
        &self,
        level: Level,
        opts: &CompositeOptions,
    ) -> Result<Vec<CompositeRow>> {
        kpi::compute_composite(&self.db, level, opts).await
    }

    // ── Reports ────────────────────────────────────────────────────

    pub async fn report(&self, level: Level, opts: &CompositeOptions) -> Result<Vec<ReportRow>> {
        report::level_report(&self.db, level, opts).await
    }

    pub async fn at_risk(&self, query: AtRiskQuery) -> Result<Vec<AtRiskStudent>> {
        query.students(&self.db).await
    }

    pub async fn snapshot(&self, level: Level, opts: &CompositeOptions) -> Result<SnapshotSummary> {
        snapshot::materialize(&self.db, level, opts).await
    }

    pub async fn history(&self, level: Level, node_id: i64) -> Result<Vec<SnapshotRow>> {
        snapshot::history(&self.db, level, node_id).await
    }

    pub async fn analyze(
        &self,
        analysis_type: AnalysisType,
        model: Option<String>,
        opts: &CompositeOptions,
    ) -> Result<AnalysisResult> {
        let settings = llm::LlmSettings::load(&self.db).await?.with_model(model);
        llm::analysis::analyze(&self.db, &settings, analysis_type, opts).await
    }

    /// Row counts per input table.
    pub async fn status(&self) -> Result<Vec<(&'static str, i64)>> {
        let counts = self
            .db
            .reader()
            .call(|conn| schema::table_counts(conn))
            .await?;
        Ok(counts)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await?;
        Ok(value)
    }

    /// Store a setting. Values for recognized keys are checked first.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        validate_config(key, value)?;
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        let entries = self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        Ok(entries)
    }
}

fn validate_config(key: &str, value: &str) -> Result<()> {
    match key {
        CompositeOptions::ANCHOR_KEY => value.parse::<AnchorPolicy>().map(|_| ()),
        CompositeOptions::MISSING_DATA_KEY => value.parse::<MissingDataPolicy>().map(|_| ()),
        llm::PROVIDER_KEY => match value {
            "bedrock" | "anthropic" => Ok(()),
            other => Err(Error::Config(format!(
                "unknown llm_provider: {other} (expected bedrock or anthropic)"
            ))),
        },
        _ => Ok(()),
    }
}
