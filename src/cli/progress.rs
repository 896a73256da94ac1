use crate::progress::{ProgressEvent, ProgressHandler};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

const BAR_TEMPLATE: &str = "{msg:20} [{bar:40}] {bytes}/{total_bytes} ({eta})";

/// Draws model downloads as a progress bar on stderr
pub struct PullProgressBar {
    bar: Mutex<Option<ProgressBar>>,
}

impl PullProgressBar {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut bar) = self.bar.lock() {
            f(&mut bar);
        }
    }
}

impl Default for PullProgressBar {
    fn default() -> Self {
        Self::new()
    }
}

fn new_bar(model: &str) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(format!("pulling {}", model));
    bar
}

impl ProgressHandler for PullProgressBar {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::BackendResolved { descriptor } => {
                eprintln!("Using {}", descriptor);
            }
            ProgressEvent::PullStarted { model } => {
                self.with_bar(|bar| *bar = Some(new_bar(model)));
            }
            ProgressEvent::PullStatus {
                status,
                completed,
                total,
                ..
            } => self.with_bar(|bar| {
                if let Some(bar) = bar {
                    if let Some(total) = total {
                        bar.set_length(*total);
                    }
                    if let Some(completed) = completed {
                        bar.set_position(*completed);
                    }
                    bar.set_message(status.clone());
                }
            }),
            ProgressEvent::PullCompleted { model, elapsed } => self.with_bar(|bar| {
                if let Some(bar) = bar.take() {
                    bar.finish_with_message(format!(
                        "pulled {} in {:.1}s",
                        model,
                        elapsed.as_secs_f64()
                    ));
                }
            }),
            ProgressEvent::PullFailed { model, error } => self.with_bar(|bar| {
                if let Some(bar) = bar.take() {
                    bar.abandon_with_message(format!("pulling {} failed: {}", model, error));
                }
            }),
        }
    }
}
