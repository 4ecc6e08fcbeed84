use indicatif::ProgressStyle;

/// Spinner for a clone whose size is not known yet (one per job in
/// `clone-all`), with the time spent so far dimmed on the right.
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {wide_msg} \x1b[2m{elapsed}\x1b[0m")
        .unwrap()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"])
}

/// Object-count bar shown while a single clone transfers.
pub fn transfer_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "\x1b[33m{spinner}\x1b[0m {msg} [{bar:30}] {pos}/{len} objects ({percent}%)",
    )
    .unwrap()
    .progress_chars("=> ")
}

/// A clone that was published at its destination.
pub fn ok_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[32m✔\x1b[0m {wide_msg} \x1b[2min {elapsed}\x1b[0m").unwrap()
}

/// A clone that was rolled back.
pub fn err_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[31m✘\x1b[0m {wide_msg} \x1b[2m(nothing left behind)\x1b[0m")
        .unwrap()
}
