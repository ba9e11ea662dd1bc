//! Per-file execution of a run configuration.
//!
//! Every input file is processed on a bounded rayon pool: its events are
//! read in batches, each batch runs through the pipeline on a fresh context,
//! and the configured output variables are written to one file per input.
//! In [`Mode::Summarize`] the per-file outputs land in a temporary directory
//! and are concatenated in input order once all workers are done.

use crate::out_of_core::BatchSizing;
use crate::packed::Table;
use crate::reader::{read_table, Container, EventFile};
use crate::writer::write_table;
use crate::{Error, Result};
use g4post_core::ProcessingContext;
use g4post_pipeline::{Mode, Resources, RunConfig};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};

/// Receives progress notifications from workers.
///
/// Methods are called concurrently from several worker threads.
pub trait Progress: Send + Sync {
    fn start(&self, _file: &Path, _total_rows: usize) {}
    fn advance(&self, _file: &Path, _rows: usize) {}
    fn finish(&self, _file: &Path, _status: &FileStatus) {}
}

/// Progress sink that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

impl<P: Progress + ?Sized> Progress for &P {
    fn start(&self, file: &Path, total_rows: usize) {
        (**self).start(file, total_rows);
    }

    fn advance(&self, file: &Path, rows: usize) {
        (**self).advance(file, rows);
    }

    fn finish(&self, file: &Path, status: &FileStatus) {
        (**self).finish(file, status);
    }
}

/// What happened to one input file.
#[derive(Debug)]
pub enum FileStatus {
    Written { rows: usize },
    /// The output already existed.
    Skipped,
    Failed(Error),
}

#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: FileStatus,
}

/// Per-file outcomes of a run, in input order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<FileOutcome>,
    /// The combined output written in [`Mode::Summarize`].
    pub combined: Option<PathBuf>,
}

impl RunReport {
    #[must_use]
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Written { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed(_)))
    }

    /// Events processed across all written files.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                FileStatus::Written { rows } => rows,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Runs a [`RunConfig`] over its input folder.
pub struct Runner<'a> {
    config: &'a RunConfig,
    resources: &'a Resources,
    overwrite: bool,
    threads: usize,
    sizing: BatchSizing,
    progress: Box<dyn Progress + 'a>,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub fn new(config: &'a RunConfig, resources: &'a Resources) -> Self {
        Self {
            config,
            resources,
            overwrite: false,
            threads: config.threads,
            sizing: BatchSizing::default()
                .with_memory_fraction(config.memory_fraction)
                .with_concurrent_batches(config.threads)
                .with_expansion(config.pipeline.len() + 1),
            progress: Box::new(NoProgress),
        }
    }

    /// Reprocess files whose output already exists.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Overrides the configured worker count; values less than 1 are clamped to 1.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self.sizing = self.sizing.with_concurrent_batches(self.threads);
        self
    }

    #[must_use]
    pub fn with_sizing(mut self, sizing: BatchSizing) -> Self {
        self.sizing = sizing;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: impl Progress + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Files in the input folder carrying the configured extension, sorted by path.
    ///
    /// # Errors
    /// Returns an error if the folder cannot be listed.
    pub fn input_files(&self) -> Result<Vec<PathBuf>> {
        let wanted = self.config.input_format.trim_start_matches('.');
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.config.input_folder)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Processes every input file.
    ///
    /// Failures of individual files are reported in the returned
    /// [`RunReport`] and do not stop the others.
    ///
    /// # Errors
    /// Returns an error when the run cannot start (missing resources,
    /// unreadable input folder, unusable output location, thread pool
    /// creation) or when the combined output cannot be written.
    pub fn run(&self) -> Result<RunReport> {
        self.config.pipeline.prepare(self.resources)?;
        let inputs = self.input_files()?;
        if inputs.is_empty() {
            log::warn!(
                "no `.{}` files in {}",
                self.config.input_format,
                self.config.input_folder.display()
            );
        }

        match self.config.mode {
            Mode::PerFile => {
                fs::create_dir_all(&self.config.output)?;
                let outcomes = self.process_all(&inputs, &self.config.output)?;
                Ok(RunReport {
                    outcomes,
                    combined: None,
                })
            }
            Mode::Summarize => self.summarize(&inputs),
        }
    }

    fn summarize(&self, inputs: &[PathBuf]) -> Result<RunReport> {
        let combined = &self.config.output;
        Container::from_path(combined)?;
        if combined.exists() && !self.overwrite {
            log::warn!("{} exists, skipping run", combined.display());
            let outcomes = inputs
                .iter()
                .map(|input| FileOutcome {
                    input: input.clone(),
                    output: combined.clone(),
                    status: FileStatus::Skipped,
                })
                .collect();
            return Ok(RunReport {
                outcomes,
                combined: None,
            });
        }
        if let Some(parent) = combined.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let scratch = tempfile::Builder::new().prefix("g4post-").tempdir()?;
        let outcomes = self.process_all(inputs, scratch.path())?;

        let mut tables = Vec::new();
        for outcome in &outcomes {
            if let FileStatus::Written { .. } = outcome.status {
                let table = read_table(&outcome.output)?;
                if !table.is_empty() {
                    tables.push(table);
                }
            }
        }
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o.status, FileStatus::Failed(_)))
            .count();
        if failed > 0 {
            log::warn!("{failed} file(s) failed and are missing from {}", combined.display());
        }
        let table = Table::concat(tables)?;
        write_table(combined, &table)?;
        log::info!("{}: {} rows combined", combined.display(), table.len());
        Ok(RunReport {
            outcomes,
            combined: Some(combined.clone()),
        })
    }

    fn process_all(&self, inputs: &[PathBuf], out_dir: &Path) -> Result<Vec<FileOutcome>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        let extension = self.config.output_format.extension();
        Ok(pool.install(|| {
            inputs
                .par_iter()
                .map(|input| {
                    let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
                    name.push(".");
                    name.push(extension);
                    let output = out_dir.join(name);
                    let status = self.run_file(input, &output);
                    self.progress.finish(input, &status);
                    FileOutcome {
                        input: input.clone(),
                        output,
                        status,
                    }
                })
                .collect()
        }))
    }

    fn run_file(&self, input: &Path, output: &Path) -> FileStatus {
        if output.exists() && !self.overwrite {
            log::info!("{}: output exists, skipping", input.display());
            return FileStatus::Skipped;
        }
        match self.process_file(input, output) {
            Ok(rows) => {
                log::info!("{}: {rows} rows -> {}", input.display(), output.display());
                FileStatus::Written { rows }
            }
            Err(e) => {
                log::error!("{}: {e}", input.display());
                FileStatus::Failed(e)
            }
        }
    }

    /// Runs the pipeline over one file and writes its output; returns the row count.
    fn process_file(&self, input: &Path, output: &Path) -> Result<usize> {
        let events = EventFile::open(input, &self.config.input)?;
        let total = events.rows();
        self.progress.start(input, total);
        let step_size = match self.config.step_size {
            Some(step_size) => step_size,
            None => self.sizing.rows_for(events.table())?,
        };
        log::debug!("{}: batches of {step_size} rows", input.display());

        let mut parts = Vec::new();
        for batch in events.batches(step_size) {
            let batch = batch?;
            let rows = batch.rows();
            let mut ctx = batch.into_context();
            self.config.pipeline.run(&mut ctx, self.resources)?;
            parts.push(self.output_table(ctx)?);
            self.progress.advance(input, rows);
        }
        write_table(output, &Table::concat(parts)?)?;
        Ok(total)
    }

    fn output_table(&self, ctx: ProcessingContext) -> Result<Table> {
        let mut columns = ctx.into_columns();
        let mut table = Table::new();
        for name in &self.config.outputs {
            let column = columns
                .remove(name)
                .ok_or_else(|| g4post_core::Error::MissingVariable(name.clone()))?;
            table.insert(name.clone(), column)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(input: &Path, output: &Path, mode: &str) -> RunConfig {
        let json = serde_json::json!({
            "io": {"input": {"folder": input, "format": "json"}, "output": output},
            "para": {"threads": 2, "mode": mode, "step_size": 1},
            "input": {"tree": "hit", "var": {"edep": "hit/edep"}},
            "output": ["esum"],
            "modules": [
                {"name": "total", "module": "sum", "input": {"val": "edep"}, "output": {"val": "esum"}}
            ]
        });
        RunConfig::from_json(&json.to_string()).unwrap()
    }

    #[derive(Default)]
    struct Counter {
        rows: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Progress for Counter {
        fn advance(&self, _file: &Path, rows: usize) {
            self.rows.fetch_add(rows, Ordering::Relaxed);
        }

        fn finish(&self, _file: &Path, _status: &FileStatus) {
            self.finished.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_input_files_sorted_by_extension() {
        let input = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.JSON", "c.txt"] {
            fs::write(input.path().join(name), "{}").unwrap();
        }
        fs::create_dir(input.path().join("d.json")).unwrap();
        let config = config(input.path(), input.path(), "");
        let resources = Resources::new();
        let files = Runner::new(&config, &resources).input_files().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.JSON", "b.json"]);
    }

    #[test]
    fn test_progress_and_skip() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(
            input.path().join("run0.json"),
            r#"{"length": 2, "columns": {"edep": {"dtype": "float64", "depth": 2, "offsets": [[0, 1, 3]], "data": [1, 2, 3]}}}"#,
        )
        .unwrap();
        let config = config(input.path(), output.path(), "per_file");
        let resources = Resources::new();
        let counter = Counter::default();

        let report = Runner::new(&config, &resources)
            .with_progress(&counter)
            .run()
            .unwrap();
        assert_eq!(report.written(), 1);
        assert_eq!(report.rows(), 2);
        assert_eq!(counter.rows.load(Ordering::Relaxed), 2);
        assert_eq!(counter.finished.load(Ordering::Relaxed), 1);

        let again = Runner::new(&config, &resources).run().unwrap();
        assert_eq!(again.skipped(), 1);
        let forced = Runner::new(&config, &resources)
            .with_overwrite(true)
            .run()
            .unwrap();
        assert_eq!(forced.written(), 1);
    }
}
