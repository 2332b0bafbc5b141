use std::sync::Arc;

use clap::{Parser, Subcommand};
use schoolkpi::report::csv_escape;
use schoolkpi::{
    AnalysisType, AnchorPolicy, AtRiskQuery, CompositeOptions, Dataset, Level, MetricKind,
    MissingDataPolicy, SchoolKpi,
};

#[derive(Parser)]
#[command(name = "schoolkpi", about = "School monitoring KPI warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.schoolkpi/schoolkpi.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that shape a composite pass. Unset flags fall back to config.
#[derive(clap::Args)]
struct PassArgs {
    /// Which nodes get a composite: universe (every node) or attendance (legacy)
    #[arg(long, value_parser = parse_anchor)]
    anchor: Option<AnchorPolicy>,
    /// What a missing metric means: zero or exclude
    #[arg(long, value_parser = parse_missing)]
    missing: Option<MissingDataPolicy>,
    /// Fail on out-of-domain inputs (e.g. inspection scores outside 0-10)
    #[arg(long)]
    strict: bool,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl schoolkpi::IngestProgress for StderrProgress {
    fn on_table_start(&self, table: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Loading {}...", index + 1, total, table);
    }

    fn on_row_rejected(&self, rejection: &schoolkpi::ingest::Rejection) {
        eprintln!("  Rejected row {}: {}", rejection.index, rejection.reason);
    }

    fn on_table_complete(&self, report: &schoolkpi::ingest::TableReport) {
        eprintln!("  Done: {} loaded, {} rejected", report.loaded, report.rejected);
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSON dataset (one array per table) into the warehouse
    Import {
        /// Path to the dataset file
        path: String,
        /// Output the ingest report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check referential integrity and value domains
    Validate {
        #[arg(long)]
        json: bool,
    },
    /// Per-metric KPIs for a level
    Metrics {
        /// school, block, district or state
        #[arg(value_parser = parse_level)]
        level: Level,
        /// Only this metric (e.g. exam_pass, student_attendance)
        #[arg(long, value_parser = parse_metric)]
        metric: Option<MetricKind>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        csv: bool,
    },
    /// Composite performance index for a level
    Composite {
        #[arg(value_parser = parse_level)]
        level: Level,
        #[command(flatten)]
        pass: PassArgs,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        csv: bool,
    },
    /// Ranked report with parent names and performance bands
    Report {
        #[arg(value_parser = parse_level, default_value = "district")]
        level: Level,
        #[command(flatten)]
        pass: PassArgs,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        csv: bool,
    },
    /// Active students with low marks or attendance
    AtRisk {
        /// Average marks threshold
        #[arg(long, default_value = "60")]
        marks_below: f64,
        /// Attendance percentage threshold
        #[arg(long, default_value = "70")]
        attendance_below: f64,
        /// Restrict to one district id
        #[arg(long)]
        district: Option<i64>,
        /// Maximum results
        #[arg(long, default_value = "20")]
        limit: u32,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        csv: bool,
    },
    /// Store the current composite for a level as a timestamped snapshot
    Snapshot {
        #[arg(value_parser = parse_level)]
        level: Level,
        #[command(flatten)]
        pass: PassArgs,
    },
    /// Show stored snapshots for one node
    History {
        #[arg(value_parser = parse_level)]
        level: Level,
        node_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Generate an LLM narrative over the district report
    Analyze {
        /// comprehensive, at_risk, quick_summary, at_risk_students or predictive
        #[arg(default_value = "comprehensive")]
        analysis_type: String,
        /// Model override (e.g. haiku)
        #[arg(long)]
        model: Option<String>,
        #[command(flatten)]
        pass: PassArgs,
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse row counts
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_level(s: &str) -> Result<Level, String> {
    s.parse().map_err(|e: schoolkpi::Error| e.to_string())
}

fn parse_metric(s: &str) -> Result<MetricKind, String> {
    s.parse().map_err(|e: schoolkpi::Error| e.to_string())
}

fn parse_anchor(s: &str) -> Result<AnchorPolicy, String> {
    s.parse().map_err(|e: schoolkpi::Error| e.to_string())
}

fn parse_missing(s: &str) -> Result<MissingDataPolicy, String> {
    s.parse().map_err(|e: schoolkpi::Error| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => schoolkpi::Database::open_at(path).await?,
        None => schoolkpi::Database::open().await?,
    };
    let kpi = SchoolKpi::new(db);

    match cli.command {
        Commands::Import { path, json } => {
            let dataset = Dataset::from_path(&path).await?;
            let report = kpi.import(dataset, Arc::new(StderrProgress)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Import {:?}: {} rows loaded, {} rejected",
                    report.status, report.rows_loaded, report.rows_rejected
                );
            }
        }
        Commands::Validate { json } => {
            let report = kpi.validate().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_clean() {
                println!("No integrity or domain violations found.");
            } else {
                println!("Dangling references: {}", report.dangling.len());
                for v in &report.dangling {
                    println!("  {v}");
                }
                println!("Out-of-domain values: {}", report.out_of_domain.len());
                for v in &report.out_of_domain {
                    println!("  {v}");
                }
            }
        }
        Commands::Metrics {
            level,
            metric,
            json,
            csv,
        } => {
            let series = match metric {
                Some(kind) => vec![schoolkpi::MetricSeries {
                    level,
                    metric: kind,
                    rows: kpi.metric(level, kind).await?,
                }],
                None => kpi.metrics(level).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else if csv {
                println!("metric,node_id,node_name,value,observations");
                for s in &series {
                    for row in &s.rows {
                        println!(
                            "{},{},{},{},{}",
                            s.metric,
                            row.node_id,
                            csv_escape(&row.node_name),
                            fmt_opt(row.value),
                            row.observations
                        );
                    }
                }
            } else {
                for s in &series {
                    print_metric_series(s);
                }
            }
        }
        Commands::Composite {
            level,
            pass,
            json,
            csv,
        } => {
            let opts = pass_options(&kpi, &pass).await?;
            let rows = kpi.composite(level, &opts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if csv {
                println!("node_id,node_name,performance_index");
                for r in &rows {
                    println!(
                        "{},{},{:.2}",
                        r.node_id,
                        csv_escape(&r.node_name),
                        r.performance_index
                    );
                }
            } else {
                println!(
                    "{} composite (anchor={}, missing={}), {} node(s)",
                    level,
                    opts.anchor,
                    opts.missing_data,
                    rows.len()
                );
                for r in &rows {
                    println!("  {:>8.2}  {} ({})", r.performance_index, r.node_name, r.node_id);
                    let missing = r.metrics.missing();
                    if !missing.is_empty() {
                        let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
                        println!("            missing: {}", names.join(", "));
                    }
                }
            }
        }
        Commands::Report {
            level,
            pass,
            json,
            csv,
        } => {
            let opts = pass_options(&kpi, &pass).await?;
            let rows = kpi.report(level, &opts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if csv {
                print!("{}", schoolkpi::report::report_to_csv(&rows));
            } else {
                print_report(level, &rows);
            }
        }
        Commands::AtRisk {
            marks_below,
            attendance_below,
            district,
            limit,
            json,
            csv,
        } => {
            let mut query = AtRiskQuery::new()
                .marks_below(marks_below)
                .attendance_below(attendance_below)
                .limit(limit);
            if let Some(d) = district {
                query = query.district(d);
            }
            let students = kpi.at_risk(query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else if csv {
                print!("{}", schoolkpi::report::at_risk::students_to_csv(&students));
            } else if students.is_empty() {
                println!("No at-risk students identified.");
            } else {
                println!("{} at-risk student(s)", students.len());
                for s in &students {
                    println!(
                        "  {:<24} {:<24} {:<16} marks {:>6}  attendance {:>6}",
                        s.student_name,
                        s.school_name,
                        s.district_name,
                        fmt_opt(s.avg_marks),
                        fmt_opt(s.attendance_pct)
                    );
                }
            }
        }
        Commands::Snapshot { level, pass } => {
            let opts = pass_options(&kpi, &pass).await?;
            let summary = kpi.snapshot(level, &opts).await?;
            println!(
                "Stored {} snapshot {} ({} node(s))",
                summary.level, summary.snapshot_at, summary.nodes
            );
        }
        Commands::History {
            level,
            node_id,
            json,
        } => {
            let rows = kpi.history(level, node_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No snapshots for {level} {node_id}.");
            } else {
                println!("{} ({level} {node_id})", rows[0].node_name);
                for r in &rows {
                    println!("  {}  {:>8.2}", r.snapshot_at, r.performance_index);
                }
            }
        }
        Commands::Analyze {
            analysis_type,
            model,
            pass,
            json,
        } => {
            let analysis_type: AnalysisType = analysis_type.parse()?;
            let opts = pass_options(&kpi, &pass).await?;
            let result = kpi.analyze(analysis_type, model, &opts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.analysis);
                eprintln!(
                    "\n[{} | {} record(s) | {:.1}s{}]",
                    result.analysis_type,
                    result.records_analyzed,
                    result.execution_time_seconds,
                    result
                        .model
                        .as_deref()
                        .map(|m| format!(" | {m}"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => match kpi.config_get(&key).await? {
                Some(val) => println!("{val}"),
                None => println!("(not set)"),
            },
            ConfigAction::Set { key, value } => {
                kpi.config_set(&key, &value).await?;
                println!("Set {key} = {value}");
            }
            ConfigAction::List => {
                let items = kpi.config_list().await?;
                if items.is_empty() {
                    println!("No configuration set.");
                } else {
                    for (k, v) in &items {
                        println!("{k} = {v}");
                    }
                }
            }
        },
        Commands::Status => {
            let counts = kpi.status().await?;
            println!("Warehouse Status");
            for (table, n) in &counts {
                println!("  {:<24} {n}", format!("{table}:"));
            }
        }
    }

    Ok(())
}

async fn pass_options(kpi: &SchoolKpi, pass: &PassArgs) -> anyhow::Result<CompositeOptions> {
    Ok(kpi.options(pass.anchor, pass.missing, pass.strict).await?)
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn print_metric_series(s: &schoolkpi::MetricSeries) {
    println!("{} by {} ({} node(s))", s.metric, s.level, s.rows.len());
    for row in &s.rows {
        println!(
            "  {:>8}  {} ({}), n={}",
            fmt_opt(row.value),
            row.node_name,
            row.node_id,
            row.observations
        );
    }
}

fn print_report(level: Level, rows: &[schoolkpi::ReportRow]) {
    println!("{} performance report ({} node(s))", level, rows.len());
    println!(
        "  {:<24} {:<20} {:>7} {:<18} {:>7} {:>7} {:>7} {:>7} {:>7} {:>5}",
        "Name", "Parent", "Index", "Band", "Attend", "Pass", "Sports", "Activ", "Teach", "Insp"
    );
    for r in rows {
        println!(
            "  {:<24} {:<20} {:>7.2} {:<18} {:>7.2} {:>7.2} {:>7.2} {:>7.2} {:>7.2} {:>5.2}",
            r.node_name,
            r.parent_name.as_deref().unwrap_or("-"),
            r.performance_index,
            r.band.label(),
            r.student_attendance,
            r.pass_rate,
            r.sports_participation,
            r.activity_engagement,
            r.teacher_attendance,
            r.inspection_score
        );
    }
}
