//! Upload pipeline and the file-backed executor
//!
//! Converted rows are written as JSON Lines regardless of the target
//! template's format; the format's extension is kept in the file name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use reshape_core::{Config, Profile, Row, detect, map_rows, parser_for};
use reshape_runtime::{ContentFetcher, ShutdownSignal, TransformationExecutor};

/// Size-check, detect, parse and map one payload
pub fn convert_bytes(config: &Config, profile: &Profile, bytes: &[u8], hint: Option<&str>) -> Result<Vec<Row>> {
    let settings = config.settings();
    let format = detect(bytes, hint);
    settings.check_upload_size(format, bytes.len() as u64)?;

    tracing::debug!(%format, profile = %profile.name, len = bytes.len(), "converting");
    let rows = parser_for(format, &settings.parsing).parse(Box::new(bytes))?;
    let mapped = map_rows(rows, profile, settings.on_row_error)?;
    Ok(mapped)
}

/// Write rows as one JSON object per line
pub fn write_jsonl(path: &Path, rows: &[Row]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Executor that converts into the project's output directory
pub struct FileExecutor {
    config: Config,
    fetcher: ContentFetcher,
    output_dir: PathBuf,
    shutdown: ShutdownSignal,
}

impl FileExecutor {
    /// Create an executor for a loaded project
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = ContentFetcher::from_settings(config.settings())?;
        let output_dir = config.resolve(&config.settings().output_dir);
        Ok(Self {
            config,
            fetcher,
            output_dir,
            shutdown: ShutdownSignal::never(),
        })
    }

    /// Stop remote fetches once `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn output_path(&self, mapping_template_id: &str, output_extension: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}-{}.{}.jsonl",
            mapping_template_id,
            uuid::Uuid::new_v4(),
            output_extension
        ))
    }

    fn write(&self, mapping_template_id: &str, output_extension: &str, rows: &[Row]) -> Result<String> {
        let path = self.output_path(mapping_template_id, output_extension);
        write_jsonl(&path, rows)?;
        tracing::info!(rows = rows.len(), output = %path.display(), "wrote converted rows");
        Ok(path.display().to_string())
    }
}

#[async_trait]
impl TransformationExecutor for FileExecutor {
    async fn transform_upload(
        &self,
        mapping_template_id: &str,
        path: &Path,
        output_extension: &str,
    ) -> Result<String> {
        let profile = self.config.profile(mapping_template_id)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let hint = path.file_name().and_then(|n| n.to_str());

        let rows = convert_bytes(&self.config, &profile, &bytes, hint)?;
        self.write(mapping_template_id, output_extension, &rows)
    }

    async fn transform_from_url(
        &self,
        mapping_template_id: &str,
        url: &str,
        output_extension: &str,
    ) -> Result<String> {
        let profile = self.config.profile(mapping_template_id)?;
        let content = self.fetcher.fetch(url, &self.shutdown).await?;

        let rows = convert_bytes(&self.config, &profile, &content.bytes, Some(&content.final_url))
            .with_context(|| format!("Failed to convert {}", url))?;
        self.write(mapping_template_id, output_extension, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reshape_runtime::shutdown;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::create_dir_all(dir.path().join("profiles")).unwrap();
        std::fs::write(dir.path().join("reshape.yaml"), "name: pipeline-test\n").unwrap();
        std::fs::write(
            dir.path().join("templates/people-json.yaml"),
            "name: people-json\nformat: json\nfields:\n  - {name: FullName, kind: String}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("profiles/people.yaml"),
            "name: people\ntarget_template: people-json\nrules:\n  - {source: Name, target: FullName, kind: String}\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_transform_from_url_writes_jsonl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Name\nAlice\n"))
            .mount(&server)
            .await;
        let dir = project();
        let executor = FileExecutor::new(Config::load(dir.path()).unwrap()).unwrap();

        let link = executor
            .transform_from_url("people", &format!("{}/people.csv", server.uri()), "json")
            .await
            .unwrap();
        let written = std::fs::read_to_string(&link).unwrap();
        assert_eq!(written, "{\"FullName\":\"Alice\"}\n");
    }

    #[tokio::test]
    async fn test_transform_from_url_stops_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("Name\nAlice\n")
                    .set_delay(Duration::from_secs(8)),
            )
            .mount(&server)
            .await;
        let dir = project();
        let (trigger, signal) = shutdown::channel();
        let executor = FileExecutor::new(Config::load(dir.path()).unwrap())
            .unwrap()
            .with_shutdown(signal);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });
        let started = std::time::Instant::now();
        let err = executor
            .transform_from_url("people", &format!("{}/people.csv", server.uri()), "json")
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        let cause = err.downcast_ref::<reshape_runtime::Error>().unwrap();
        assert!(cause.is_cancelled());
        assert!(!dir.path().join("output").exists());
    }
}
