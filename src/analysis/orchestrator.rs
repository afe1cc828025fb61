//! Per-file fan-out over the configured models.
//!
//! Each (model, file) call is an independent future producing an
//! immutable [`ModelResult`]; results are joined per file and merged
//! only afterwards. A shared semaphore caps the number of calls in
//! flight and a cancellation token stops new calls from being issued
//! while letting in-flight ones finish.

use crate::config::RunSettings;
use crate::error::CallError;
use crate::llm::{self, build_prompt, invoke_with_retry, ModelClient, Prompt};
use crate::models::{FileAnalysis, FileRecord, ModelResult};
use crate::scanner::FileScanner;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a run produced before aggregation.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub analyses: Vec<FileAnalysis>,
    /// Files that could not be read.
    pub skipped: Vec<String>,
}

/// Drives model calls for files.
pub struct Orchestrator<'a> {
    client: &'a dyn ModelClient,
    settings: &'a RunSettings,
    limiter: Semaphore,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        client: &'a dyn ModelClient,
        settings: &'a RunSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            settings,
            limiter: Semaphore::new(settings.concurrency.max(1)),
            cancel,
        }
    }

    /// Ask every configured model about one file.
    ///
    /// Results are returned in configured model order regardless of which
    /// call finishes first.
    pub async fn analyze_file(&self, file: &FileRecord, content: &str) -> Vec<ModelResult> {
        let prompt = build_prompt(&file.path, content);

        let calls = self
            .settings
            .models
            .iter()
            .map(|model| self.analyze_with_model(model, file, &prompt));

        join_all(calls).await
    }

    /// Read and analyze every file, at most `concurrency` files at a time.
    pub async fn analyze_all(
        &self,
        scanner: &FileScanner,
        files: &[FileRecord],
        progress: Option<&ProgressBar>,
    ) -> RunOutcome {
        let results: Vec<Result<FileAnalysis, String>> = stream::iter(files)
            .map(|file| async move {
                let outcome = match scanner.read(file).await {
                    Ok(content) => Ok(FileAnalysis {
                        file: file.clone(),
                        results: self.analyze_file(file, &content).await,
                    }),
                    Err(e) => {
                        warn!("Skipping file: {}", e);
                        Err(file.path.clone())
                    }
                };
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                outcome
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut outcome = RunOutcome::default();
        for result in results {
            match result {
                Ok(analysis) => {
                    let failures = analysis.failures();
                    info!(
                        "{}: {} smells, {} failed calls",
                        analysis.file.path,
                        analysis.total_smells(),
                        failures
                    );
                    outcome.analyses.push(analysis);
                }
                Err(path) => outcome.skipped.push(path),
            }
        }
        outcome
    }

    async fn analyze_with_model(
        &self,
        model: &str,
        file: &FileRecord,
        prompt: &Prompt,
    ) -> ModelResult {
        if self.cancel.is_cancelled() {
            return cancelled(model, file);
        }

        let Ok(_permit) = self.limiter.acquire().await else {
            return cancelled(model, file);
        };

        // Cancellation may have arrived while waiting for a slot
        if self.cancel.is_cancelled() {
            return cancelled(model, file);
        }

        debug!("Querying {} for {}", model, file.path);

        let raw = match invoke_with_retry(
            self.client,
            model,
            prompt,
            &self.settings.invoke,
            &self.settings.retry,
            &self.cancel,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{} failed on {}: {}", model, file.path, e);
                return ModelResult::failed(model, &file.path, e.to_string(), None);
            }
        };

        match llm::parse(&raw) {
            Ok(parsed) => {
                debug!(
                    "{} found {} smells in {} ({} dropped)",
                    model,
                    parsed.smells.len(),
                    file.path,
                    parsed.dropped
                );
                if let Some(claimed) = parsed.reported_total {
                    if claimed as usize != parsed.smells.len() + parsed.dropped {
                        debug!(
                            "{} claimed {} smells for {} but listed {}",
                            model,
                            claimed,
                            file.path,
                            parsed.smells.len() + parsed.dropped
                        );
                    }
                }
                if let Some(ref echoed) = parsed.file_analyzed {
                    if !file.path.ends_with(echoed.trim_start_matches("./")) {
                        debug!("{} echoed file {} for {}", model, echoed, file.path);
                    }
                }
                for smell in parsed.smells.iter().filter(|s| !s.smell_type.is_classified()) {
                    debug!("{} used unclassified smell type '{}'", model, smell.smell_type);
                }
                ModelResult::succeeded(model, &file.path, parsed.smells, parsed.dropped, raw)
            }
            Err(failure) => {
                warn!("{} returned unparseable output for {}", model, file.path);
                ModelResult::failed(model, &file.path, failure.to_string(), Some(failure.raw))
            }
        }
    }
}

fn cancelled(model: &str, file: &FileRecord) -> ModelResult {
    ModelResult::failed(model, &file.path, CallError::Cancelled.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::InvokeOptions;
    use crate::scanner::ScanConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const ONE_SMELL: &str = r#"{"smells": [{"smell_type": "Long Method", "category": "Bloaters",
        "location": "record_and_check_match()", "severity": "High"}]}"#;

    /// Returns a scripted response per model after an optional delay.
    struct ScriptedClient {
        responses: HashMap<String, (Duration, Result<String, CallError>)>,
        calls: AtomicUsize,
        cancel_on_call: Option<CancellationToken>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<(&str, u64, Result<&str, CallError>)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(m, delay, r)| {
                        (
                            m.to_string(),
                            (Duration::from_millis(delay), r.map(String::from)),
                        )
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
                cancel_on_call: None,
            }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn invoke(
            &self,
            model: &str,
            _prompt: &Prompt,
            _options: &InvokeOptions,
        ) -> Result<String, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref token) = self.cancel_on_call {
                token.cancel();
            }
            let (delay, response) = self.responses[model].clone();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response
        }
    }

    fn settings(models: &[&str], concurrency: usize) -> RunSettings {
        settings_with_retries(models, concurrency, 0)
    }

    fn settings_with_retries(models: &[&str], concurrency: usize, retries: u32) -> RunSettings {
        let mut config = Config::default();
        config.model.models = models.iter().map(|m| m.to_string()).collect();
        config.general.concurrency = concurrency;
        config.model.retries = retries;
        config.model.retry_backoff_ms = 1;
        config.into_settings().unwrap()
    }

    fn file(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            release_tag: "1.0".to_string(),
            size: 10,
        }
    }

    #[tokio::test]
    async fn test_timeout_does_not_stop_other_models() {
        let client = ScriptedClient::new(vec![
            ("a", 0, Ok(ONE_SMELL)),
            ("b", 0, Err(CallError::Timeout)),
            ("c", 0, Ok(r#"{"smells": []}"#)),
        ]);
        let settings = settings(&["a", "b", "c"], 4);
        let orchestrator = Orchestrator::new(&client, &settings, CancellationToken::new());

        let results = orchestrator.analyze_file(&file("1.0/x.py"), "code").await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert_eq!(results[0].smells.len(), 1);

        assert!(!results[1].success);
        assert!(results[1].smells.is_empty());
        assert_eq!(results[1].error.as_deref(), Some("timeout"));

        assert!(results[2].success);
        assert!(results[2].smells.is_empty());
    }

    #[tokio::test]
    async fn test_results_follow_model_order_not_completion_order() {
        let client = ScriptedClient::new(vec![
            ("slow", 50, Ok(ONE_SMELL)),
            ("fast", 0, Ok(r#"{"smells": []}"#)),
        ]);
        let settings = settings(&["slow", "fast"], 4);
        let orchestrator = Orchestrator::new(&client, &settings, CancellationToken::new());

        let results = orchestrator.analyze_file(&file("x.py"), "code").await;
        let names: Vec<_> = results.iter().map(|r| r.model_name.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        assert_eq!(results[0].smells.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_raw_text() {
        let client = ScriptedClient::new(vec![("a", 0, Ok("no json here"))]);
        let settings = settings(&["a"], 1);
        let orchestrator = Orchestrator::new(&client, &settings, CancellationToken::new());

        let results = orchestrator.analyze_file(&file("x.py"), "code").await;
        assert!(!results[0].success);
        assert!(results[0].smells.is_empty());
        assert_eq!(results[0].raw_response.as_deref(), Some("no json here"));
    }

    #[test]
    fn test_cancelled_run_issues_no_calls() {
        let client = ScriptedClient::new(vec![("a", 0, Ok(ONE_SMELL)), ("b", 0, Ok(ONE_SMELL))]);
        let settings = settings(&["a", "b"], 2);
        let token = CancellationToken::new();
        token.cancel();
        let orchestrator = Orchestrator::new(&client, &settings, token);

        let results = tokio_test::block_on(orchestrator.analyze_file(&file("x.py"), "code"));

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert!(results
            .iter()
            .all(|r| !r.success && r.error.as_deref() == Some("cancelled")));
    }

    #[tokio::test]
    async fn test_in_flight_call_is_recorded_after_cancellation() {
        let token = CancellationToken::new();
        let mut client =
            ScriptedClient::new(vec![("a", 0, Ok(ONE_SMELL)), ("b", 0, Ok(ONE_SMELL))]);
        client.cancel_on_call = Some(token.clone());
        let settings = settings(&["a", "b"], 1);
        let orchestrator = Orchestrator::new(&client, &settings, token);

        let results = orchestrator.analyze_file(&file("x.py"), "code").await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(results[0].success);
        assert_eq!(results[0].smells.len(), 1);
        assert_eq!(results[1].error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let token = CancellationToken::new();
        let mut client = ScriptedClient::new(vec![("a", 0, Err(CallError::Timeout))]);
        client.cancel_on_call = Some(token.clone());
        let settings = settings_with_retries(&["a"], 1, 3);
        let orchestrator = Orchestrator::new(&client, &settings, token);

        let results = orchestrator.analyze_file(&file("x.py"), "code").await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_when_not_cancelled() {
        let client = ScriptedClient::new(vec![("a", 0, Err(CallError::Timeout))]);
        let settings = settings_with_retries(&["a"], 1, 2);
        let orchestrator = Orchestrator::new(&client, &settings, CancellationToken::new());

        let results = orchestrator.analyze_file(&file("x.py"), "code").await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert!(!results[0].success);
    }

    #[tokio::test]
    async fn test_analyze_all_skips_unreadable_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("1.0")).unwrap();
        std::fs::write(dir.path().join("1.0/present.py"), "x = 1").unwrap();

        let client = ScriptedClient::new(vec![("a", 0, Ok(ONE_SMELL))]);
        let settings = settings(&["a"], 2);
        let orchestrator = Orchestrator::new(&client, &settings, CancellationToken::new());
        let scanner = FileScanner::new(dir.path().to_path_buf(), ScanConfig::default());

        let files = vec![file("1.0/present.py"), file("1.0/missing.py")];
        let outcome = orchestrator.analyze_all(&scanner, &files, None).await;

        assert_eq!(outcome.analyses.len(), 1);
        assert_eq!(outcome.analyses[0].file.path, "1.0/present.py");
        assert_eq!(outcome.analyses[0].total_smells(), 1);
        assert_eq!(outcome.skipped, vec!["1.0/missing.py".to_string()]);
    }
}
