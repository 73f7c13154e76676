use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Chunk-level progress bar for one outbound transfer. Length is set on the
/// first progress callback, once the chunk count is known.
pub fn transfer_bar(path: &Path) -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{msg} [{bar:30.green}] {pos}/{len} chunks")
        .unwrap()
        .progress_chars("█▓░");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(100));

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    bar.set_message(name);
    bar
}
