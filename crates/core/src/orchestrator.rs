use crate::config::Config;
use crate::error::{ExportError, GenerationError, PipelineError, RenderError};
use crate::export::{save_text, DocumentExporter, ExportReport, DOD_FALLBACK_TITLE, GUIDE_FALLBACK_TITLE};
use crate::models::{PipelineRun, TrackerRecord};
use crate::publish::Publisher;
use crate::render::RenderReport;
use crate::stores::page_id_from_reference;
use crate::summarize::{build_prompt, missing_sections};
use crate::tracker::{extract_reference_link, StatusPoller};
use crate::traits::{AssetFetcher, BlockSource, DocumentRenderer, RecordStore, Summarizer};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Cancels a running [`Pipeline::monitor`] loop.
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

#[derive(Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the trigger fires. Never resolves if the trigger is dropped unused.
    pub async fn wait(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, Shutdown { receiver })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub attempts: u64,
    /// Observed status differed from the previous check, the first observation included.
    pub status_changes: u64,
    pub completed: bool,
    pub cancelled: bool,
}

struct Observation {
    status: Option<String>,
    trigger: Option<(TrackerRecord, String)>,
}

struct Cycle {
    status: Option<String>,
    result: Result<PipelineRun, PipelineError>,
}

/// Runs DETECT, EXPORT, SUMMARIZE, RENDER and PUBLISH in order; a failed stage ends the run.
pub struct Pipeline<S, A, M, R>
where
    S: BlockSource + RecordStore,
    A: AssetFetcher,
    M: Summarizer,
    R: DocumentRenderer,
{
    store: S,
    assets: A,
    summarizer: M,
    renderer: R,
    config: Config,
}

impl<S, A, M, R> Pipeline<S, A, M, R>
where
    S: BlockSource + RecordStore,
    A: AssetFetcher,
    M: Summarizer,
    R: DocumentRenderer,
{
    pub fn new(store: S, assets: A, summarizer: M, renderer: R, config: Config) -> Self {
        Self {
            store,
            assets,
            summarizer,
            renderer,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn observe(&self) -> Observation {
        let poller = StatusPoller::new(
            &self.store,
            self.config.tracker_database_id.as_str(),
            self.config.target_functionality.as_str(),
        );
        let detection = match poller.poll().await {
            Ok(Some(detection)) => detection,
            Ok(None) => {
                return Observation {
                    status: None,
                    trigger: None,
                }
            }
            Err(err) => {
                error!(stage = "detect", error = %err, "release tracker query failed");
                return Observation {
                    status: None,
                    trigger: None,
                };
            }
        };

        let status = detection.status.clone();
        if !detection.reached(&self.config.target_status) {
            info!(
                status = ?detection.status,
                target = %self.config.target_status,
                "status is not the target, nothing to do"
            );
            return Observation {
                status,
                trigger: None,
            };
        }

        info!(status = %self.config.target_status, "target status detected");
        let trigger = extract_reference_link(&detection.record).map(|link| (detection.record, link));
        if trigger.is_none() {
            error!(stage = "detect", "target status reached but the record has no reference link");
        }
        Observation { status, trigger }
    }

    /// The target record and its reference link when the run should proceed, `(None, None)`
    /// otherwise. Store failures are logged and reported the same way.
    pub async fn detect(&self) -> (Option<TrackerRecord>, Option<String>) {
        match self.observe().await.trigger {
            Some((record, link)) => (Some(record), Some(link)),
            None => (None, None),
        }
    }

    pub async fn export_reference(&self, reference_link: &str) -> Result<ExportReport, PipelineError> {
        info!(stage = "export", reference_link, "stage started");
        let page_id = page_id_from_reference(reference_link).map_err(ExportError::from)?;
        let exporter = DocumentExporter::new(
            &self.store,
            &self.assets,
            self.config.image_dir(),
            DOD_FALLBACK_TITLE,
        );
        Ok(exporter.export_to_file(&page_id, &self.config.dod_path()).await?)
    }

    pub async fn summarize(&self, dod_markdown: &str) -> Result<String, PipelineError> {
        info!(stage = "summarize", "stage started");
        let guide = DocumentExporter::text_only(&self.store, GUIDE_FALLBACK_TITLE)
            .export_to_file(&self.config.guide_page_id, &self.config.guide_path())
            .await
            .map_err(PipelineError::Guide)?;

        let prompt = build_prompt(dod_markdown, &guide.markdown);
        let summary = self.summarizer.summarize(&prompt).await?;
        if summary.trim().is_empty() {
            return Err(GenerationError::EmptyResponse.into());
        }

        let missing = missing_sections(&summary);
        if !missing.is_empty() {
            warn!(missing = ?missing, "generated one-pager lacks some sections");
        }

        let path = self.config.summary_path();
        save_text(&path, &summary).await.map_err(GenerationError::from)?;
        info!(path = %path.display(), chars = summary.chars().count(), "one-pager text saved");
        Ok(summary)
    }

    pub fn render(
        &self,
        summary: &str,
        subtitle: &str,
        images: &[PathBuf],
    ) -> Result<RenderReport, PipelineError> {
        info!(stage = "render", images = images.len(), "stage started");
        let path = self.config.pdf_path();
        let report = self.renderer.render(summary, subtitle, images, &path)?;
        if !report.path.exists() {
            return Err(RenderError::MissingOutput(report.path.display().to_string()).into());
        }
        Ok(report)
    }

    pub async fn publish(&self, record: &TrackerRecord) -> Result<String, PipelineError> {
        info!(stage = "publish", "stage started");
        let pdf_url = self.config.hosting.raw_file_url(&self.config.hosted_pdf_path);
        info!(url = %pdf_url, "public pdf url");

        let outcome = Publisher::new(&self.store, self.config.link_property.as_str())
            .publish(
                &record.id,
                &self.config.publication_page_id,
                &pdf_url,
                &self.config.pdf_file_name(),
            )
            .await;
        if !outcome.is_complete() {
            return Err(PipelineError::Publish(format!(
                "record updated: {}, publication page updated: {}",
                outcome.record_updated, outcome.page_updated
            )));
        }
        Ok(pdf_url)
    }

    async fn cycle(&self) -> Cycle {
        info!(
            target = %self.config.target_functionality,
            status = %self.config.target_status,
            "pipeline run started"
        );
        let observation = self.observe().await;
        let status = observation.status.clone();
        let result = match observation.trigger {
            Some((record, link)) => self.run_stages(record, link).await,
            None => Err(PipelineError::NotTriggered(format!(
                "{} is not in status {} with a reference link",
                self.config.target_functionality, self.config.target_status
            ))),
        };
        Cycle { status, result }
    }

    async fn run_stages(&self, record: TrackerRecord, link: String) -> Result<PipelineRun, PipelineError> {
        let dod = self.export_reference(&link).await?;
        let summary = self.summarize(&dod.markdown).await?;

        let subtitle = record
            .title()
            .unwrap_or_else(|| self.config.target_functionality.clone());
        let report = self.render(&summary, &subtitle, &dod.images)?;
        let pdf_url = self.publish(&record).await?;

        Ok(PipelineRun {
            record: Some(record),
            reference_link: Some(link),
            dod_markdown: Some(dod.markdown),
            summary_markdown: Some(summary),
            pdf_path: Some(report.path),
            pdf_url: Some(pdf_url),
        })
    }

    pub async fn try_run(&self) -> Result<PipelineRun, PipelineError> {
        self.cycle().await.result
    }

    pub async fn run_once(&self) -> bool {
        report(self.try_run().await)
    }

    /// Repeats [`Self::run_once`] every `interval` until a run completes or `shutdown` fires.
    pub async fn monitor(&self, interval: Duration, mut shutdown: Shutdown) -> MonitorSummary {
        info!(interval_secs = interval.as_secs(), "monitoring started");
        let mut summary = MonitorSummary {
            attempts: 0,
            status_changes: 0,
            completed: false,
            cancelled: false,
        };
        let mut previous: Option<String> = None;

        loop {
            if shutdown.is_triggered() {
                summary.cancelled = true;
                break;
            }

            summary.attempts += 1;
            info!(attempt = summary.attempts, "checking release tracker");
            let cycle = self.cycle().await;

            if cycle.status != previous {
                info!(from = ?previous, to = ?cycle.status, "deployment status changed");
                summary.status_changes += 1;
                previous = cycle.status.clone();
            }

            if report(cycle.result) {
                summary.completed = true;
                break;
            }

            info!(next_check_secs = interval.as_secs(), "waiting for next check");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.wait() => {
                    summary.cancelled = true;
                    break;
                }
            }
        }

        info!(
            attempts = summary.attempts,
            status_changes = summary.status_changes,
            completed = summary.completed,
            cancelled = summary.cancelled,
            "monitoring finished"
        );
        summary
    }
}

fn report(result: Result<PipelineRun, PipelineError>) -> bool {
    match result {
        Ok(run) => {
            info!(
                pdf = ?run.pdf_path,
                url = ?run.pdf_url,
                "pipeline completed"
            );
            true
        }
        Err(PipelineError::NotTriggered(reason)) => {
            info!(reason = %reason, "pipeline not triggered");
            false
        }
        Err(err) => {
            error!(stage = err.stage(), error = %err, "pipeline stopped");
            false
        }
    }
}
