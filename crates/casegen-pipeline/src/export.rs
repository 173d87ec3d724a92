//! Export bundles
//!
//! Serializes a request's surviving corpus (non-duplicate, non-failed
//! tests plus coverage rows) into a downloadable bundle. Zip archives
//! carry one Python file per test plus a JSON manifest.

use std::io::{Cursor, Write};
use std::str::FromStr;
use std::sync::Arc;

use casegen_model::{CoverageAnalysis, RequestId, TestCase};
use casegen_store::Store;
use serde::Serialize;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::error::PipelineError;

/// Supported bundle formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Zip with one `.py` file per test + manifest
    Zip,
    /// Single JSON document
    Json,
    /// Single YAML document
    Yaml,
}

impl FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

/// A rendered bundle ready for download
#[derive(Debug, Clone)]
pub struct ExportBundle {
    /// Suggested file name
    pub filename: String,
    /// MIME type
    pub content_type: &'static str,
    /// Bundle bytes
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct BundleDocument<'a> {
    request: RequestSummary<'a>,
    tests: &'a [TestCase],
    coverage: &'a [CoverageAnalysis],
}

#[derive(Debug, Serialize)]
struct RequestSummary<'a> {
    id: RequestId,
    url: &'a str,
    requirements: &'a [String],
    status: casegen_model::RequestStatus,
    result_summary: &'a casegen_model::DetailMap,
}

/// Build a bundle for one request
///
/// `failed` tests and duplicates never appear in any format.
pub async fn build(
    store: &Arc<dyn Store>,
    request_id: RequestId,
    format: ExportFormat,
) -> Result<ExportBundle, PipelineError> {
    let request = store.get_request(request_id).await?;
    let tests: Vec<TestCase> = store
        .tests_for_request(request_id)
        .await?
        .into_iter()
        .filter(TestCase::is_exportable)
        .collect();
    let coverage = store.coverage_for_request(request_id).await?;

    let document = BundleDocument {
        request: RequestSummary {
            id: request.id,
            url: &request.url,
            requirements: &request.requirements,
            status: request.status,
            result_summary: &request.result_summary,
        },
        tests: &tests,
        coverage: &coverage,
    };

    let stem = format!("casegen-{}", request.id);
    match format {
        ExportFormat::Json => {
            let bytes = serde_json::to_vec_pretty(&document)
                .map_err(|e| PipelineError::Export(e.to_string()))?;
            Ok(ExportBundle {
                filename: format!("{stem}.json"),
                content_type: "application/json",
                bytes,
            })
        }
        ExportFormat::Yaml => {
            let text = serde_yaml::to_string(&document)
                .map_err(|e| PipelineError::Export(e.to_string()))?;
            Ok(ExportBundle {
                filename: format!("{stem}.yaml"),
                content_type: "application/yaml",
                bytes: text.into_bytes(),
            })
        }
        ExportFormat::Zip => {
            let bytes = build_zip(&document, &tests)?;
            Ok(ExportBundle {
                filename: format!("{stem}.zip"),
                content_type: "application/zip",
                bytes,
            })
        }
    }
}

fn build_zip(
    document: &BundleDocument<'_>,
    tests: &[TestCase],
) -> Result<Vec<u8>, PipelineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = serde_json::to_vec_pretty(document)
        .map_err(|e| PipelineError::Export(e.to_string()))?;
    writer
        .start_file("manifest.json", options)
        .map_err(|e| PipelineError::Export(e.to_string()))?;
    writer
        .write_all(&manifest)
        .map_err(|e| PipelineError::Export(e.to_string()))?;

    for (index, test) in tests.iter().enumerate() {
        let path = format!("tests/{:03}_{}.py", index, sanitize(&test.name));
        writer
            .start_file(path, options)
            .map_err(|e| PipelineError::Export(e.to_string()))?;
        writer
            .write_all(test.code.as_bytes())
            .map_err(|e| PipelineError::Export(e.to_string()))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| PipelineError::Export(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
