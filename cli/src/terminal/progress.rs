use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use transfer_core::transfer::ProgressEvent;

use crate::terminal::colors;

const BAR_TEMPLATE: &str =
    "{spinner:.blue} {msg} [{bar:24.green/black}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

pub(crate) static PROGRESS: OnceLock<ProgressBar> = OnceLock::new();

/// The shared rewrite progress bar. Hidden until [`init_progress`] enables it.
pub fn get_progress() -> &'static ProgressBar {
    PROGRESS.get_or_init(|| ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden()))
}

pub fn init_progress(enabled: bool) {
    let pb = get_progress();
    if !enabled {
        return;
    }

    let style = match ProgressStyle::with_template(BAR_TEMPLATE) {
        Ok(style) => style.progress_chars("█▆▁").tick_strings(&[
            "▁▁▁▁▁",
            "▁▂▂▂▁",
            "▁▄▂▄▁",
            "▂▄▆▄▂",
            "▄▆█▆▄",
            "▂▄▆▄▂",
            "▁▄▂▄▁",
            "▁▂▂▂▁",
        ]),
        Err(_) => ProgressStyle::default_bar(),
    };

    pb.set_style(style);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(100));
}

/// Feeds service events into the progress bar.
pub fn report(event: ProgressEvent<'_>) {
    let pb = get_progress();
    match event {
        ProgressEvent::Started {
            index,
            total,
            target,
            size,
            ..
        } => {
            pb.reset();
            pb.set_length(size);
            pb.set_message(format!(
                "[{}/{}] {}",
                (index + 1).to_string().color(colors::ACCENT),
                total,
                target.path.color(colors::BUCKET)
            ));
        }
        ProgressEvent::Rewriting { progress, .. } => {
            pb.set_length(progress.object_size);
            pb.set_position(progress.bytes_rewritten);
        }
        ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. } => {
            pb.set_message(String::new());
        }
    }
}

pub fn finish() {
    get_progress().finish_and_clear();
}

/// Routes log output above the progress bar while it is drawn.
pub struct ProgressWriter;

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let pb = get_progress();
        if pb.is_hidden() || pb.is_finished() {
            return std::io::stderr().write(buf);
        }

        let msg = String::from_utf8_lossy(buf);
        pb.println(msg.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}
