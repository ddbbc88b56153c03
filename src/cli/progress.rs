use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Bar counting processed chunk files.
pub fn create_progress_bar(multi: &MultiProgress, total_files: u64) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new(total_files));
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} files ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
    )?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("reading chunks");
    Ok(pb)
}

/// Prints `text` to stdout without tearing an active progress bar.
pub fn print_suspended(pb: Option<&ProgressBar>, text: &str) {
    match pb {
        Some(pb) => pb.suspend(|| print!("{text}")),
        None => print!("{text}"),
    }
}
