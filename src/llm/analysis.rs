use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::{build_agent, LlmSettings};
use crate::error::{Error, Result};
use crate::kpi::{CompositeOptions, Level};
use crate::report::{self, AtRiskQuery, AtRiskStudent, ReportRow};
use crate::storage::repository;
use crate::storage::Database;

const PROMPT_VERSION: &str = "analysis-v1";

/// Districts below this index count as at risk.
const AT_RISK_INDEX: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Comprehensive,
    AtRisk,
    QuickSummary,
    AtRiskStudents,
    Predictive,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::Comprehensive,
        AnalysisType::AtRisk,
        AnalysisType::QuickSummary,
        AnalysisType::AtRiskStudents,
        AnalysisType::Predictive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Comprehensive => "comprehensive",
            AnalysisType::AtRisk => "at_risk",
            AnalysisType::QuickSummary => "quick_summary",
            AnalysisType::AtRiskStudents => "at_risk_students",
            AnalysisType::Predictive => "predictive",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        AnalysisType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::Config(format!("unknown analysis type: {s}")))
    }
}

/// The records an analysis is run over.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisInput {
    Districts(Vec<ReportRow>),
    Students(Vec<AtRiskStudent>),
}

impl AnalysisInput {
    pub fn len(&self) -> usize {
        match self {
            AnalysisInput::Districts(rows) => rows.len(),
            AnalysisInput::Students(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub analysis_type: AnalysisType,
    /// `None` when no model was called.
    pub model: Option<String>,
    pub records_analyzed: u64,
    pub execution_time_seconds: f64,
    pub analysis: String,
    pub generated_at: String,
    /// Row id in `analysis_reports`, when stored.
    pub report_id: Option<i64>,
}

/// Load the records for `analysis_type` from the KPI reports.
pub async fn gather_input(
    db: &Database,
    analysis_type: AnalysisType,
    opts: &CompositeOptions,
) -> Result<AnalysisInput> {
    match analysis_type {
        AnalysisType::AtRiskStudents => Ok(AnalysisInput::Students(
            AtRiskQuery::new().students(db).await?,
        )),
        AnalysisType::AtRisk => {
            let rows = report::level_report(db, Level::District, opts).await?;
            Ok(AnalysisInput::Districts(
                rows.into_iter()
                    .filter(|r| r.performance_index < AT_RISK_INDEX)
                    .collect(),
            ))
        }
        _ => Ok(AnalysisInput::Districts(
            report::level_report(db, Level::District, opts).await?,
        )),
    }
}

/// Message returned instead of a model call when there is nothing to analyze.
pub fn empty_input_message(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::AtRiskStudents => {
            "No at-risk students identified. All students are performing well!"
        }
        AnalysisType::AtRisk => {
            "No at-risk districts identified. Every district is at or above 60."
        }
        _ => "No district data available.",
    }
}

pub fn build_prompt(analysis_type: AnalysisType, data_json: &str) -> String {
    match analysis_type {
        AnalysisType::Comprehensive => format!(
            r#"You are an expert education data analyst for government schools in India.

Analyze this district performance data:

{data_json}

Provide a comprehensive analysis including:

1. EXECUTIVE SUMMARY
   - Overall state of districts (2-3 sentences)
   - Key finding

2. TOP PERFORMERS
   - List top 3 districts
   - What makes them successful?
   - Common success patterns

3. UNDERPERFORMERS
   - List bottom 3 districts
   - What are their main issues?
   - Root causes

4. KEY INSIGHTS
   - Correlation between KPIs
   - Surprising patterns
   - Critical observations

5. RECOMMENDATIONS
   - 5 specific, actionable recommendations
   - Priority level (High/Medium/Low)
   - Expected impact
   - Timeline for implementation

Format with clear sections and bullet points."#
        ),
        AnalysisType::AtRisk => format!(
            r#"Analyze these at-risk districts (performance index < 60):

{data_json}

For each district:
1. RISK LEVEL: High/Medium/Low
2. PRIMARY ISSUES: What's causing poor performance?
3. IMMEDIATE ACTIONS: What to do in next 30 days?
4. MEDIUM-TERM PLAN: 3-6 month improvement strategy
5. RESOURCES NEEDED: Budget, staff, infrastructure

Prioritize by urgency and feasibility."#
        ),
        AnalysisType::QuickSummary => format!(
            r#"Provide a brief summary of district performance:

{data_json}

Include:
- Overall state (1 sentence)
- Top 3 performers
- Bottom 3 performers
- One key recommendation

Keep it concise (under 200 words)."#
        ),
        AnalysisType::AtRiskStudents => format!(
            r#"Analyze these at-risk students:

{data_json}

For each student or group:
1. RISK ASSESSMENT: High/Medium/Low risk level
2. RISK FACTORS: What's causing the issues?
3. INTERVENTION PLAN: Specific actions to take
4. TIMELINE: When to implement interventions
5. SUCCESS METRICS: How to measure improvement

Prioritize students by risk level."#
        ),
        AnalysisType::Predictive => format!(
            r#"Based on this current performance data:

{data_json}

Provide predictive analysis:
1. TRENDS: Which districts are improving/declining?
2. PREDICTIONS: Expected performance next quarter
3. EARLY WARNINGS: Signs of potential problems
4. OPPORTUNITIES: Districts ready for breakthrough
5. PREVENTIVE ACTIONS: What to do now to improve outcomes

Use data-driven reasoning."#
        ),
    }
}

/// Run one analysis and store it in `analysis_reports`. An empty input
/// short-circuits with a fixed message and no model call.
pub async fn analyze(
    db: &Database,
    settings: &LlmSettings,
    analysis_type: AnalysisType,
    opts: &CompositeOptions,
) -> Result<AnalysisResult> {
    let started = Instant::now();
    let input = gather_input(db, analysis_type, opts).await?;

    if input.is_empty() {
        log::info!("Nothing to analyze for {analysis_type}");
        return Ok(AnalysisResult {
            analysis_type,
            model: None,
            records_analyzed: 0,
            execution_time_seconds: started.elapsed().as_secs_f64(),
            analysis: empty_input_message(analysis_type).to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            report_id: None,
        });
    }

    let data_json = serde_json::to_string_pretty(&input)?;
    let prompt = build_prompt(analysis_type, &data_json);
    log::info!(
        "Running {analysis_type} analysis over {} record(s) with {}/{}",
        input.len(),
        settings.provider,
        settings.model
    );

    let agent = build_agent(settings).await?;
    let response = agent
        .run(&prompt)
        .await
        .map_err(|e| Error::Llm(e.to_string()))?;
    let analysis = response.text().trim().to_string();
    log::debug!("Received {} characters", analysis.len());

    let mut result = AnalysisResult {
        analysis_type,
        model: Some(settings.model.clone()),
        records_analyzed: input.len() as u64,
        execution_time_seconds: started.elapsed().as_secs_f64(),
        analysis,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        report_id: None,
    };
    result.report_id = Some(store_result(db, &result).await?);
    Ok(result)
}

async fn store_result(db: &Database, result: &AnalysisResult) -> Result<i64> {
    let analysis_type = result.analysis_type.as_str();
    let model = result.model.clone().unwrap_or_default();
    let records = result.records_analyzed;
    let seconds = result.execution_time_seconds;
    let analysis = result.analysis.clone();
    let generated_at = result.generated_at.clone();

    let id = db
        .writer()
        .call(move |conn| {
            repository::insert_analysis_report(
                conn,
                analysis_type,
                &model,
                PROMPT_VERSION,
                records,
                seconds,
                &analysis,
                &generated_at,
            )
        })
        .await?;
    Ok(id)
}

/// The most recent stored analysis of a type.
pub async fn latest(
    db: &Database,
    analysis_type: AnalysisType,
) -> Result<Option<repository::StoredAnalysis>> {
    let kind = analysis_type.as_str();
    let stored = db
        .reader()
        .call(move |conn| repository::latest_analysis_report(conn, kind))
        .await?;
    Ok(stored)
}
