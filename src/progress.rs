use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::LevelFilter;

const BAR_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {percent}% [{pos:>2}/{len:2}] [Remaining: {eta}]";

/// Create a progress bar of a specified length with desired styling.
///
/// The bar is hidden when informational logging is disabled.
pub fn progress_bar(len: u64) -> ProgressBar {
    if log::max_level() < LevelFilter::Info {
        return ProgressBar::hidden();
    }

    let progress_bar = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr());
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .expect("Invalid progress style."),
    );

    progress_bar
}
