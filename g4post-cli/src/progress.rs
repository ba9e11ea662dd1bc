//! Terminal progress bars fed by the runner.

use g4post_io::{FileStatus, Progress};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const TEMPLATE_FILE: &str = "{spinner:.green} {msg:30!} [{bar:40.cyan/blue}] {pos}/{len} events";
const TEMPLATE_TOTAL: &str = "{prefix:.bold} [{bar:40.green/white}] {pos}/{len} files ({elapsed})";

/// One bar per file in flight plus an overall file counter.
pub struct BarProgress {
    multi: MultiProgress,
    total: ProgressBar,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl BarProgress {
    /// Creates the bars; `hidden` draws nothing.
    pub fn new(files: usize, hidden: bool) -> Self {
        let multi = MultiProgress::new();
        if hidden {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }
        let total = multi.add(ProgressBar::new(to_u64(files)));
        total.set_style(style(TEMPLATE_TOTAL));
        total.set_prefix("files");
        Self {
            multi,
            total,
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Leaves the overall bar on screen.
    pub fn complete(&self) {
        self.total.finish();
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

fn label(file: &Path) -> String {
    file.file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned())
}

impl Progress for BarProgress {
    fn start(&self, file: &Path, total_rows: usize) {
        let bar = self
            .multi
            .insert_before(&self.total, ProgressBar::new(to_u64(total_rows)));
        bar.set_style(style(TEMPLATE_FILE));
        bar.set_message(label(file));
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file.to_path_buf(), bar);
    }

    fn advance(&self, file: &Path, rows: usize) {
        if let Some(bar) = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file)
        {
            bar.inc(to_u64(rows));
        }
    }

    fn finish(&self, file: &Path, status: &FileStatus) {
        let bar = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file);
        if let Some(bar) = bar {
            match status {
                FileStatus::Failed(_) => bar.abandon_with_message(format!("{} failed", label(file))),
                _ => bar.finish_and_clear(),
            }
        }
        self.total.inc(1);
    }
}
