use std::path::Path;

use chrono::NaiveDate;

use crate::engine::{EngineKind, EngineOutcome, EngineRun, EngineRuns};
use crate::error::AppError;
use crate::report::ann::AnnDocument;
use crate::report::assets::image_data_uri;
use crate::report::eo::{self, EoArtifacts};
use crate::report::{
    AnnSection, ConfidenceLevel, DATA_HEADERS, EoSection, FlowchartCounts, ReportModel,
    SkippedRow, retain_applied,
};
use crate::request::{AnalysisRequest, display_name};
use crate::telemetry::metrics::REPORT_SAMPLES;
use crate::workspace::Workspace;

/// Everything the assembler reconciles, owned so it can move onto a blocking thread.
#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub request: AnalysisRequest,
    pub workspace: Workspace,
    pub runs: EngineRuns,
    pub web_skipped: Vec<SkippedRow>,
    pub staged_rows: u64,
    pub report_date: NaiveDate,
}

/// Number of samples in the staged dataset: non-blank lines after the header.
pub async fn count_samples(input: &Path) -> Result<u64, AppError> {
    let text = tokio::fs::read_to_string(input).await?;
    Ok(count_data_rows(&text))
}

fn count_data_rows(text: &str) -> u64 {
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count() as u64
}

#[tracing::instrument(
    name = "pipeline_stage assemble",
    skip_all,
    fields(ann.ok = input.runs.ann.succeeded(), eo.ok = input.runs.eo.succeeded())
)]
pub fn assemble(input: AssemblyInput) -> Result<ReportModel, AppError> {
    let AssemblyInput {
        request,
        workspace,
        runs,
        web_skipped,
        staged_rows,
        report_date,
    } = input;

    let ann = ann_section(&runs.ann, workspace.stem())?;
    let eo = eo_section(&runs.eo, workspace.stem());

    let input_count = staged_rows + web_skipped.len() as u64;
    let flowchart = FlowchartCounts::compute(
        input_count,
        web_skipped.len() as u64,
        eo.skipped.len() as u64,
        ann.skipped_count,
    )?;

    let parts = request.filename_parts();
    REPORT_SAMPLES.record(staged_rows as f64, &[]);

    Ok(ReportModel {
        report_date: report_date.format("%Y-%m-%d").to_string(),
        country_name: display_name(&request.country).to_string(),
        project_name: display_name(&request.project).to_string(),
        field_site_name: display_name(&request.field_site).to_string(),
        dataset_name: parts.dataset_name,
        num_samples: staged_rows,
        num_optimize: parts.num_optimize,
        confidence_level: ConfidenceLevel::from_code(&parts.confidence_code)
            .label()
            .to_string(),
        data_headers: DATA_HEADERS.to_vec(),
        web_skipped,
        ann,
        eo,
        flowchart,
    })
}

fn log_sentinel(run: &EngineRun) {
    if let EngineOutcome::Failed { cause } = run.outcome() {
        tracing::info!(engine = %run.engine, %cause, "Assembling without engine output");
    }
}

fn ann_section(run: &EngineRun, stem: &str) -> Result<AnnSection, AppError> {
    debug_assert_eq!(run.engine, EngineKind::Ann);
    let Some(diagnostic) = run.diagnostic() else {
        log_sentinel(run);
        return Ok(AnnSection::default());
    };

    let page = run.output_dir.join(format!("{stem}.html"));
    // engine pages are not guaranteed to be UTF-8
    let document = match std::fs::read(&page) {
        Ok(bytes) => AnnDocument::parse(&String::from_utf8_lossy(&bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %page.display(), "ANN engine produced no document");
            AnnDocument::default()
        }
        Err(e) => return Err(AppError::Assembly(format!("read {}: {e}", page.display()))),
    };

    Ok(AnnSection {
        results_table: document.results_table,
        version: document.version,
        delta_t: document.delta_t,
        frc_image: image_data_uri(&run.output_dir.join(format!("{stem}-frc.jpg"))),
        skipped_table: document.skipped_table,
        skipped_count: document.skipped_count,
        ruleset: retain_applied(document.ruleset),
        diagnostic: Some(diagnostic.to_string()),
    })
}

fn eo_section(run: &EngineRun, stem: &str) -> EoSection {
    debug_assert_eq!(run.engine, EngineKind::Eo);
    let Some(diagnostic) = run.diagnostic() else {
        log_sentinel(run);
        return EoSection {
            frc: eo::DEFAULT_FRC,
            ..Default::default()
        };
    };

    let files = EoArtifacts::new(&run.output_dir, stem);
    EoSection {
        results_table: eo::workbook_table(&files.results_workbook),
        backcheck_image: image_data_uri(&files.backcheck_image),
        contour_image: image_data_uri(&files.contour_image),
        histogram_image: image_data_uri(&files.histogram_image),
        skipped: eo::read_skipped_rows(&files.skipped_rows),
        ruleset: retain_applied(eo::read_ruleset(&files.ruleset)),
        frc: eo::frc_or_default(Some(diagnostic)),
        diagnostic: Some(diagnostic.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dispatch::run_engines;
    use crate::pipeline::testing::{FakeEngine, Harness, sample_input};
    use crate::request::AnalysisQuery;

    fn request(filename: &str) -> AnalysisRequest {
        AnalysisRequest::try_from(AnalysisQuery {
            filename: Some(filename.to_string()),
            recipient: Some("user@example.org".to_string()),
            country: Some("Sudan-12".to_string()),
            project: Some("Water-3".to_string()),
            fieldsite: Some("Camp-9".to_string()),
            dataset: Some("ds1".to_string()),
            prefix: None,
        })
        .unwrap()
    }

    async fn assemble_with(harness: &Harness, filename: &str) -> Result<ReportModel, AppError> {
        let request = request(filename);
        let workspace = harness.workspace(&request.staged_filename());
        workspace.prepare().await.unwrap();
        std::fs::write(workspace.input_path(), sample_input()).unwrap();
        let runs = run_engines(&harness.pipeline, &workspace).await;

        assemble(AssemblyInput {
            request,
            workspace,
            runs,
            web_skipped: vec![SkippedRow::default(), SkippedRow::default()],
            staged_rows: 20,
            report_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        })
    }

    #[test]
    fn test_count_data_rows_ignores_header_and_blank_lines() {
        assert_eq!(count_data_rows("a,b\n1,2\n\n3,4\n"), 2);
        assert_eq!(count_data_rows("a,b\r\n1,2\r\n"), 1);
        assert_eq!(count_data_rows(""), 0);
    }

    #[tokio::test]
    async fn test_assemble_both_engines() {
        let harness = Harness::healthy();
        let model = assemble_with(&harness, "Camp1__TS__168__maxDecay.csv").await.unwrap();

        assert_eq!(model.report_date, "2024-03-01");
        assert_eq!(model.country_name, "Sudan");
        assert_eq!(model.field_site_name, "Camp");
        assert_eq!(model.dataset_name, "Camp1");
        assert_eq!(model.num_optimize, "168");
        assert_eq!(model.confidence_level, "Maximum Decay Scenario");
        assert_eq!(model.eo.frc, 0.8);
        assert_eq!(model.eo.skipped.len(), 3);
        assert_eq!(model.ann.skipped_count, 1);
        assert!(model.ann.frc_image.is_some());
        assert!(model.eo.contour_image.is_some());
        assert!(model.eo.backcheck_image.is_none());

        // zero-count rules are dropped, the rest keep their counts
        assert_eq!(model.ann.ruleset.len(), 1);
        assert_eq!(model.eo.ruleset.len(), 1);
        assert_eq!(model.eo.ruleset[0].count, 3);

        let f = model.flowchart;
        assert_eq!(f.input_count, 22);
        assert_eq!(f.remaining_after_web, 20);
        assert_eq!(f.remaining_after_eo, 17);
        assert_eq!(f.remaining_after_ann, 16);
    }

    #[tokio::test]
    async fn test_ann_page_with_invalid_utf8_is_read_lossily() {
        let harness = Harness::healthy();
        let request = request("Camp1__168__maxDecay.csv");
        let workspace = harness.workspace(&request.staged_filename());
        workspace.prepare().await.unwrap();
        std::fs::write(workspace.input_path(), sample_input()).unwrap();
        let runs = run_engines(&harness.pipeline, &workspace).await;

        let page = workspace.engine_dir(EngineKind::Ann).join("Camp1__168__maxDecay.html");
        let mut bytes = std::fs::read(&page).unwrap();
        bytes.extend_from_slice(b"<p>Temp\xe9rature</p>");
        std::fs::write(&page, bytes).unwrap();

        let model = assemble(AssemblyInput {
            request,
            workspace,
            runs,
            web_skipped: vec![],
            staged_rows: 20,
            report_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        })
        .unwrap();

        assert_eq!(model.ann.version, "ANN test");
        assert_eq!(model.ann.skipped_count, 1);
        assert_eq!(model.eo.frc, 0.8);
    }

    #[tokio::test]
    async fn test_failed_engine_contributes_sentinel() {
        let harness = Harness::new(FakeEngine::ann_ok(), FakeEngine::failing(EngineKind::Eo));
        let model = assemble_with(&harness, "Camp1__168__optimumDecay.csv").await.unwrap();

        assert_eq!(model.eo.diagnostic, None);
        assert_eq!(model.eo.frc, 0.0);
        assert!(model.eo.skipped.is_empty());
        assert_eq!(model.ann.skipped_count, 1);
        assert_eq!(model.flowchart.remaining_after_ann, 19);
    }

    #[tokio::test]
    async fn test_inconsistent_counts_are_an_assembly_error() {
        let harness = Harness::new(FakeEngine::ann_ok(), FakeEngine::eo_skipping(25));
        let result = assemble_with(&harness, "Camp1__168__maxDecay.csv").await;
        assert!(matches!(result, Err(AppError::Assembly(_))));
    }
}
