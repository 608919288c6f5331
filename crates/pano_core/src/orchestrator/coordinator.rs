//! Pipeline coordinator: catalog, pair, then stitch/upload/clean every unit.
//!
//! Units are independent. A unit's failure is recorded in its report and
//! the next unit is attempted; only catalog failures end the run early.
//! Stitching is strictly sequential. With `pipeline.upload_workers > 1`,
//! uploads of finished artifacts run on a bounded worker pool while the
//! next unit is being stitched.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use super::errors::{PipelineError, PipelineResult};
use super::pipeline::{CancelHandle, Pipeline, PipelineRunResult};
use super::summary::{RunSummary, UnitReport};
use super::types::{Context, UnitState};
use super::{create_delivery_pipeline, create_stitch_pipeline, create_unit_pipeline};
use crate::capability::{CommandStitcher, CommandUploader, Stitcher, Uploader};
use crate::catalog::{CatalogScan, SegmentCatalog};
use crate::config::Settings;
use crate::logging::{LogCallback, UnitLogger};
use crate::models::{StitchUnit, UnitOutcome};
use crate::naming::{destination_key, first_duplicate, plan_artifact_names};
use crate::pairing::{resolve_pairs, Resolution};

/// Catalog and pairing result for a source, without side effects.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub scan: CatalogScan,
    pub resolution: Resolution,
    /// Artifact file name per unit, in unit order; all distinct.
    pub artifact_names: Vec<String>,
}

impl RunPlan {
    pub fn units(&self) -> &[StitchUnit] {
        &self.resolution.units
    }
}

/// A stitched unit waiting for its upload.
struct Delivery {
    index: usize,
    state: UnitState,
    logger: Arc<UnitLogger>,
}

/// Drives whole ingest runs.
pub struct Coordinator {
    settings: Settings,
    stitcher: Box<dyn Stitcher>,
    uploader: Box<dyn Uploader>,
    catalog: SegmentCatalog,
    cancel: CancelHandle,
    log_callback: Option<LogCallback>,
}

impl Coordinator {
    /// Create a coordinator with explicit capabilities.
    pub fn new(settings: Settings, stitcher: Box<dyn Stitcher>, uploader: Box<dyn Uploader>) -> Self {
        let catalog = SegmentCatalog::from_settings(&settings.catalog);
        Self {
            settings,
            stitcher,
            uploader,
            catalog,
            cancel: CancelHandle::new(),
            log_callback: None,
        }
    }

    /// Create a coordinator driving the configured command-line tools.
    pub fn from_settings(settings: Settings) -> Self {
        let stitcher = CommandStitcher::from_settings(&settings.stitch);
        let uploader = CommandUploader::from_settings(&settings.upload);
        Self::new(settings, Box::new(stitcher), Box::new(uploader))
    }

    /// Receive every unit log line (e.g. to echo on the console).
    pub fn with_log_callback(mut self, callback: LogCallback) -> Self {
        self.log_callback = Some(callback);
        self
    }

    /// Share an existing handle, e.g. one already used for the device wait.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling or aborting runs of this coordinator.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Catalog `source` and resolve pairs. Read-only.
    pub fn plan(&self, source: &Path) -> PipelineResult<RunPlan> {
        let scan = self.catalog.scan(source)?;
        let resolution = resolve_pairs(&scan.segments);

        tracing::info!(
            "Found {} segments in {}: {} units ({} paired, {} single), {} rejected",
            scan.segments.len(),
            scan.root.display(),
            resolution.units.len(),
            resolution.paired_count(),
            resolution.unpaired_count(),
            scan.rejected.len()
        );

        let artifact_names =
            plan_artifact_names(&resolution.units, &self.settings.stitch.output_extension);
        if let Some(name) = first_duplicate(&artifact_names) {
            return Err(PipelineError::NameCollision {
                name: name.to_string(),
            });
        }

        Ok(RunPlan {
            scan,
            resolution,
            artifact_names,
        })
    }

    /// Process every unit found under `source`.
    ///
    /// Returns a summary even when units fail; errors are only returned when
    /// nothing could be attempted.
    pub fn run(&self, source: &Path) -> PipelineResult<RunSummary> {
        let started_at = Local::now();
        let plan = self.plan(source)?;

        if self.cancel.is_cancelled() {
            return Err(PipelineError::RunCancelled);
        }

        let output_dir = self.settings.paths.output_folder().to_path_buf();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            PipelineError::setup_failed(format!(
                "cannot create output folder {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let logs_folder = self.settings.paths.logs_folder();
        let run_dir = create_run_dir(logs_folder, &started_at).map_err(|e| {
            PipelineError::setup_failed(format!(
                "cannot create log folder under {}: {}",
                logs_folder.display(),
                e
            ))
        })?;

        let units = plan.units();
        let names = &plan.artifact_names;
        let workers = self.settings.pipeline.upload_workers.max(1);
        let reports = if workers == 1 || units.len() < 2 {
            self.run_sequential(units, names, &output_dir, &run_dir)
        } else {
            self.run_with_upload_pool(units, names, &output_dir, &run_dir, workers)
        };

        let summary = RunSummary {
            source: plan.scan.root.clone(),
            started_at: started_at.to_rfc3339(),
            finished_at: Local::now().to_rfc3339(),
            cancelled: self.cancel.is_cancelled(),
            units: reports,
            warnings: plan.resolution.warnings.clone(),
            rejected: plan.scan.rejected.clone(),
        };

        match summary.write_json(&run_dir) {
            Ok(path) => tracing::info!("Summary written to {}", path.display()),
            Err(e) => tracing::warn!("Could not write run summary: {}", e),
        }

        tracing::info!(
            "Run finished: {} done, {} retained, {} failed, {} skipped",
            summary.count(UnitOutcome::Done),
            summary.count(UnitOutcome::Retained),
            summary.count(UnitOutcome::Failed),
            summary.count(UnitOutcome::Skipped)
        );

        Ok(summary)
    }

    fn run_sequential(
        &self,
        units: &[StitchUnit],
        names: &[String],
        output_dir: &Path,
        run_dir: &Path,
    ) -> Vec<UnitReport> {
        let pipeline = create_unit_pipeline();
        let mut reports = Vec::with_capacity(units.len());

        for (unit, name) in units.iter().zip(names) {
            if self.cancel.is_cancelled() {
                reports.push(UnitReport::skipped(unit, "cancelled"));
                continue;
            }

            let logger = self.open_logger(run_dir, unit);
            let ctx = self.context(unit, name, output_dir, Arc::clone(&logger));
            let mut state = UnitState::new(unit.index());
            let result = self.run_pipeline(&pipeline, &ctx, &mut state);
            reports.push(self.classify(unit, &state, result, &logger));
        }

        reports
    }

    fn run_with_upload_pool(
        &self,
        units: &[StitchUnit],
        names: &[String],
        output_dir: &Path,
        run_dir: &Path,
        workers: usize,
    ) -> Vec<UnitReport> {
        let stitch = create_stitch_pipeline();
        let delivery = create_delivery_pipeline();
        let slots: Mutex<Vec<Option<UnitReport>>> = Mutex::new(vec![None; units.len()]);
        let (tx, rx) = mpsc::sync_channel::<Delivery>(workers);
        let rx = Mutex::new(rx);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    // Lock only while taking the next job.
                    let job = rx.lock().recv();
                    let Ok(job) = job else { break };

                    let unit = &units[job.index];
                    let name = &names[job.index];
                    let ctx = self.context(unit, name, output_dir, Arc::clone(&job.logger));
                    let mut state = job.state;
                    let result = self.run_pipeline(&delivery, &ctx, &mut state);
                    let report = self.classify(unit, &state, result, &job.logger);
                    slots.lock()[job.index] = Some(report);
                });
            }

            for (index, (unit, name)) in units.iter().zip(names).enumerate() {
                if self.cancel.is_cancelled() {
                    slots.lock()[index] = Some(UnitReport::skipped(unit, "cancelled"));
                    continue;
                }

                let logger = self.open_logger(run_dir, unit);
                let ctx = self.context(unit, name, output_dir, Arc::clone(&logger));
                let mut state = UnitState::new(unit.index());
                let result = self.run_pipeline(&stitch, &ctx, &mut state);

                if result.is_ok() && state.has_artifact() {
                    let job = Delivery {
                        index,
                        state,
                        logger,
                    };
                    if let Err(mpsc::SendError(job)) = tx.send(job) {
                        // All workers are gone; deliver inline.
                        let mut state = job.state;
                        let result = self.run_pipeline(&delivery, &ctx, &mut state);
                        slots.lock()[index] = Some(self.classify(unit, &state, result, &job.logger));
                    }
                } else {
                    slots.lock()[index] = Some(self.classify(unit, &state, result, &logger));
                }
            }

            drop(tx);
        });

        slots
            .into_inner()
            .into_iter()
            .zip(units)
            .map(|(slot, unit)| slot.unwrap_or_else(|| UnitReport::skipped(unit, "not processed")))
            .collect()
    }

    fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        ctx: &Context,
        state: &mut UnitState,
    ) -> PipelineResult<PipelineRunResult> {
        let result = pipeline.run(ctx, state);
        ctx.logger.flush();
        result
    }

    fn context<'a>(
        &'a self,
        unit: &'a StitchUnit,
        artifact_name: &str,
        output_dir: &'a Path,
        logger: Arc<UnitLogger>,
    ) -> Context<'a> {
        Context::new(
            unit,
            &self.settings,
            self.stitcher.as_ref(),
            self.uploader.as_ref(),
            &self.cancel,
            output_dir,
            logger,
        )
        .with_artifact_name(artifact_name)
    }

    /// Open the unit's log file, falling back to a file-less logger.
    fn open_logger(&self, run_dir: &Path, unit: &StitchUnit) -> Arc<UnitLogger> {
        let name = format!("unit_{:03}_{}", unit.index() + 1, unit.base_name());
        let config = self.settings.logging.log_config();

        let logger = match UnitLogger::new(&name, run_dir, config.clone(), self.log_callback.clone()) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::warn!("Cannot open log file for {}: {}", unit.label(), e);
                UnitLogger::detached(name, config, self.log_callback.clone())
            }
        };

        logger.info(&format!("Unit {}", unit.label()));
        for member in unit.members() {
            logger.info(&format!("  {} track: {}", member.role(), member.path().display()));
        }
        Arc::new(logger)
    }

    /// Map a unit's final state to its outcome.
    ///
    /// An artifact that is still recorded but not cleaned up is always
    /// `Retained`, whatever went wrong after the stitch.
    fn classify(
        &self,
        unit: &StitchUnit,
        state: &UnitState,
        result: PipelineResult<PipelineRunResult>,
        logger: &UnitLogger,
    ) -> UnitReport {
        let artifact = state.artifact.as_ref();

        let (outcome, error) = match result {
            Ok(_) if state.cleaned_up => (UnitOutcome::Done, None),
            Ok(_) if state.skipped.is_some() => (UnitOutcome::Skipped, state.skipped.clone()),
            Ok(_) if artifact.is_some() => (
                UnitOutcome::Retained,
                Some("artifact was not cleaned up".to_string()),
            ),
            Ok(_) => (UnitOutcome::Failed, Some("no artifact produced".to_string())),
            Err(e) => {
                let outcome = if artifact.is_some() {
                    UnitOutcome::Retained
                } else if matches!(e, PipelineError::Cancelled { .. }) {
                    UnitOutcome::Skipped
                } else {
                    UnitOutcome::Failed
                };
                (outcome, Some(e.summary_message()))
            }
        };

        match outcome {
            UnitOutcome::Done => logger.success(&format!("{} done", unit.label())),
            UnitOutcome::Retained => logger.warn(&format!(
                "{} retained at {}",
                unit.label(),
                artifact.map(|a| a.path.display().to_string()).unwrap_or_default()
            )),
            UnitOutcome::Failed => logger.error(&format!("{} failed", unit.label())),
            UnitOutcome::Skipped => logger.info(&format!("{} skipped", unit.label())),
        }
        logger.flush();

        tracing::info!("{}: {}", unit.label(), outcome);

        let destination_key = state
            .transfer
            .as_ref()
            .map(|t| t.destination_key.clone())
            .or_else(|| {
                artifact.map(|a| destination_key(&self.settings.upload.key_prefix, &a.file_name()))
            });

        UnitReport {
            index: unit.index(),
            label: unit.label(),
            base_name: unit.base_name().to_string(),
            members: unit.members().iter().map(|m| m.path().to_path_buf()).collect(),
            outcome,
            artifact: artifact.map(|a| a.path.clone()),
            destination_key,
            error,
            log_file: non_empty(logger.log_path()),
        }
    }
}

fn non_empty(path: &Path) -> Option<PathBuf> {
    (!path.as_os_str().is_empty()).then(|| path.to_path_buf())
}

/// Create a fresh folder for this run's logs and summary.
///
/// Named `run_{YYYYMMDD_HHMMSS_mmm}`; a `_N` suffix is added when a run
/// started in the same millisecond already owns the name.
fn create_run_dir(logs_folder: &Path, started_at: &DateTime<Local>) -> io::Result<PathBuf> {
    std::fs::create_dir_all(logs_folder)?;
    let base = format!("run_{}", started_at.format("%Y%m%d_%H%M%S_%3f"));

    let mut attempt = 0;
    loop {
        let name = match attempt {
            0 => base.clone(),
            n => format!("{}_{}", base, n),
        };
        let dir = logs_folder.join(name);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::{FakeStitcher, FakeUploader, StitchBehavior, UploadBehavior};
    use std::fs;
    use tempfile::TempDir;

    fn setup(files: &[&str]) -> (TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();
        for name in files {
            fs::write(source.join(name), b"raw").unwrap();
        }

        let mut settings = Settings::default();
        settings.paths.output_folder = dir.path().join("out").to_string_lossy().into_owned();
        settings.paths.logs_folder = dir.path().join("logs").to_string_lossy().into_owned();
        (dir, settings)
    }

    /// Lets a test keep its own handle on the uploader the coordinator owns.
    struct SharedUploader(Arc<FakeUploader>);

    impl Uploader for SharedUploader {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn upload(
            &self,
            request: &crate::capability::UploadRequest,
            cancel: &CancelHandle,
        ) -> crate::capability::CapabilityResult<crate::capability::ToolOutput> {
            self.0.upload(request, cancel)
        }
    }

    fn coordinator(settings: Settings, stitch: StitchBehavior, upload: UploadBehavior) -> Coordinator {
        Coordinator::new(
            settings,
            Box::new(FakeStitcher::new(stitch)),
            Box::new(FakeUploader::new(upload)),
        )
    }

    #[test]
    fn plan_has_no_side_effects() {
        let (dir, settings) = setup(&["REC001_00_001.insv", "REC001_10_001.insv"]);
        let coord = coordinator(settings, StitchBehavior::Succeed, UploadBehavior::Succeed);

        let plan = coord.plan(&dir.path().join("source")).unwrap();

        assert_eq!(plan.units().len(), 1);
        assert!(plan.units()[0].is_paired());
        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("logs").exists());
    }

    #[test]
    fn missing_source_is_fatal() {
        let (dir, settings) = setup(&[]);
        let coord = coordinator(settings, StitchBehavior::Succeed, UploadBehavior::Succeed);

        let err = coord.run(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, PipelineError::Catalog(_)));
    }

    #[test]
    fn cancel_before_start_is_fatal() {
        let (dir, settings) = setup(&["REC001_00_001.insv"]);
        let coord = coordinator(settings, StitchBehavior::Succeed, UploadBehavior::Succeed);

        coord.cancel_handle().cancel();
        let err = coord.run(&dir.path().join("source")).unwrap_err();
        assert!(matches!(err, PipelineError::RunCancelled));
    }

    #[test]
    fn failed_upload_is_retained_with_key() {
        let (dir, settings) = setup(&["REC001_00_001.insv", "REC001_10_001.insv"]);
        let coord = coordinator(settings, StitchBehavior::Succeed, UploadBehavior::Fail);

        let summary = coord.run(&dir.path().join("source")).unwrap();
        let report = &summary.units[0];

        assert_eq!(report.outcome, UnitOutcome::Retained);
        assert!(report.artifact.as_ref().unwrap().exists());
        assert!(report.destination_key.as_ref().unwrap().starts_with("REC001_001"));
        assert!(report.error.as_ref().unwrap().contains("Transfer"));
        assert!(report.log_file.as_ref().unwrap().exists());
    }

    #[test]
    fn stitch_timeout_fails_the_unit() {
        let (dir, settings) = setup(&["REC001_00_001.insv", "REC001_10_001.insv"]);
        let coord = coordinator(settings, StitchBehavior::TimeOut, UploadBehavior::Succeed);

        let summary = coord.run(&dir.path().join("source")).unwrap();
        let report = &summary.units[0];

        assert_eq!(report.outcome, UnitOutcome::Failed);
        assert!(report.artifact.is_none());
        assert!(report.error.as_ref().unwrap().contains("timed out after 5s"));
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
    }

    #[test]
    fn upload_timeout_retains_the_artifact() {
        let (dir, settings) = setup(&["REC001_00_001.insv", "REC001_10_001.insv"]);
        let coord = coordinator(settings, StitchBehavior::Succeed, UploadBehavior::TimeOut);

        let summary = coord.run(&dir.path().join("source")).unwrap();
        let report = &summary.units[0];

        assert_eq!(report.outcome, UnitOutcome::Retained);
        assert!(report.artifact.as_ref().unwrap().exists());
        assert!(report.error.as_ref().unwrap().contains("timed out after 1.5s"));
    }

    #[test]
    fn colliding_names_get_distinct_artifacts_and_keys() {
        let (dir, mut settings) = setup(&[]);
        settings.pipeline.upload_workers = 2;
        let source = dir.path().join("source");
        // 2024-01-02 03:04:05 UTC
        let recorded = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_704_164_645);
        for relative in ["a/R_00_1.insv", "b/R_10_1.insv"] {
            let path = source.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"raw").unwrap();
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(recorded)
                .unwrap();
        }
        let uploader = Arc::new(FakeUploader::new(UploadBehavior::Succeed));
        let coord = Coordinator::new(
            settings,
            Box::new(FakeStitcher::new(StitchBehavior::Succeed)),
            Box::new(SharedUploader(Arc::clone(&uploader))),
        );

        let plan = coord.plan(&source).unwrap();
        assert_eq!(plan.units().len(), 2);
        assert_ne!(plan.artifact_names[0], plan.artifact_names[1]);

        let summary = coord.run(&source).unwrap();
        assert_eq!(summary.count(UnitOutcome::Done), 2);

        let mut keys = uploader.uploaded_keys();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 2);
        let reported: Vec<_> = summary
            .units
            .iter()
            .map(|u| u.destination_key.clone().unwrap())
            .collect();
        assert_ne!(reported[0], reported[1]);
    }

    #[test]
    fn run_folders_in_the_same_second_do_not_clash() {
        let dir = tempfile::tempdir().unwrap();
        let started_at = Local::now();

        let first = create_run_dir(dir.path(), &started_at).unwrap();
        let second = create_run_dir(dir.path(), &started_at).unwrap();

        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
        assert!(second
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_1"));
    }

    #[test]
    fn writes_summary_into_run_folder() {
        let (dir, settings) = setup(&["REC001_00_001.insv"]);
        let coord = coordinator(settings, StitchBehavior::Succeed, UploadBehavior::Succeed);

        let summary = coord.run(&dir.path().join("source")).unwrap();
        assert_eq!(summary.count(UnitOutcome::Done), 1);

        let run_dirs: Vec<_> = fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(run_dirs.len(), 1);
        assert!(run_dirs[0].join(crate::orchestrator::SUMMARY_FILE).exists());
    }
}
