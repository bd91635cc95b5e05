//! Logger setup.
//!
//! Log lines go to stderr as `[%Y.%m.%d %H:%M:%S] LEVEL message`, keeping stdout free
//! for device listings, state dumps and JSON.

use fern::Dispatch;

#[inline]
pub(crate) fn timestamp() -> String {
    chrono::Local::now().format("%Y.%m.%d %H:%M:%S").to_string()
}

/// Install the global logger. `verbose` lowers this crate's level to `Debug`.
pub fn setup(verbose: bool) -> Result<(), log::SetLoggerError> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {:<5} {}", timestamp(), record.level(), message))
        })
        .level(log::LevelFilter::Warn)
        .level_for("stickprobe", level)
        .chain(std::io::stderr())
        .apply()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_has_date_and_time() {
        let ts = timestamp();
        assert_eq!(ts.len(), "2024.01.02 03:04:05".len());
        assert_eq!(&ts[4..5], ".");
        assert_eq!(&ts[10..11], " ");
    }
}
