//! CSV export handler.
//!
//! Renders the payload's `data` array into a CSV file under the configured
//! output directory, named after the job id.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tracing::info;

use super::JobHandler;

/// Handler for `CSV_EXPORT` jobs.
///
/// Expects a payload of the shape `{"data": [{...}, ...]}` where every
/// element is an object. Column order follows the first row's keys.
pub struct CsvExportHandler {
    output_dir: PathBuf,
}

impl CsvExportHandler {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn render_csv(data: &[JsonValue]) -> Result<String> {
        let first = data[0]
            .as_object()
            .context("Invalid data: expected array of objects")?;
        let headers: Vec<String> = first.keys().cloned().collect();

        let mut csv = headers.join(",");
        csv.push('\n');

        for row in data {
            let object = row
                .as_object()
                .context("Invalid data: expected array of objects")?;
            let values: Vec<String> = headers
                .iter()
                .map(|header| csv_field(object.get(header)))
                .collect();
            csv.push_str(&values.join(","));
            csv.push('\n');
        }

        Ok(csv)
    }
}

/// Render one CSV cell. Strings containing commas or quotes are quoted with
/// embedded quotes doubled; missing and null values render empty.
fn csv_field(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => {
            if s.contains(',') || s.contains('"') {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.clone()
            }
        }
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl JobHandler for CsvExportHandler {
    async fn execute(&self, job_id: &str, payload: &JsonValue) -> Result<JsonValue> {
        let data = match payload.get("data").and_then(|d| d.as_array()) {
            Some(data) if !data.is_empty() => data,
            _ => bail!("Invalid data: expected non-empty array"),
        };

        let csv = Self::render_csv(data)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create output dir {:?}", self.output_dir))?;

        let file_path = self.output_dir.join(format!("{}.csv", job_id));
        tokio::fs::write(&file_path, csv)
            .await
            .with_context(|| format!("Failed to write CSV file {:?}", file_path))?;

        info!("CSV export {} written to {:?}", job_id, file_path);

        Ok(serde_json::json!({
            "filePath": file_path.to_string_lossy(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_handler() -> (CsvExportHandler, TempDir) {
        let dir = TempDir::new().unwrap();
        let handler = CsvExportHandler::new(dir.path().to_path_buf());
        (handler, dir)
    }

    #[tokio::test]
    async fn test_writes_csv_file_with_headers_and_rows() {
        let (handler, dir) = make_handler();

        let payload = json!({
            "data": [
                {"name": "Ada", "age": 36},
                {"name": "Grace", "age": 45},
            ]
        });

        let result = handler.execute("job-1", &payload).await.unwrap();

        let file_path = dir.path().join("job-1.csv");
        assert_eq!(
            result.get("filePath").and_then(|p| p.as_str()),
            Some(file_path.to_string_lossy().as_ref())
        );

        let content = std::fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "age,name");
        assert_eq!(lines[1], "36,Ada");
        assert_eq!(lines[2], "45,Grace");
    }

    #[tokio::test]
    async fn test_quotes_values_containing_commas_and_quotes() {
        let (handler, dir) = make_handler();

        let payload = json!({
            "data": [
                {"quote": "she said \"hi\"", "title": "last, first"},
            ]
        });

        handler.execute("job-2", &payload).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("job-2.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "quote,title");
        assert_eq!(lines[1], "\"she said \"\"hi\"\"\",\"last, first\"");
    }

    #[tokio::test]
    async fn test_missing_and_null_values_render_empty() {
        let (handler, dir) = make_handler();

        let payload = json!({
            "data": [
                {"a": 1, "b": "x"},
                {"a": null},
            ]
        });

        handler.execute("job-3", &payload).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("job-3.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "a,b");
        assert_eq!(lines[1], "1,x");
        assert_eq!(lines[2], ",");
    }

    #[tokio::test]
    async fn test_empty_data_array_fails() {
        let (handler, _dir) = make_handler();

        let err = handler
            .execute("job-4", &json!({"data": []}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid data"));
    }

    #[tokio::test]
    async fn test_missing_data_key_fails() {
        let (handler, _dir) = make_handler();

        let err = handler
            .execute("job-5", &json!({"rows": [1, 2]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid data"));
    }

    #[tokio::test]
    async fn test_non_object_row_fails() {
        let (handler, _dir) = make_handler();

        let err = handler
            .execute("job-6", &json!({"data": [42]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected array of objects"));
    }
}
