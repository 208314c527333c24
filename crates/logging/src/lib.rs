//! Logging setup for processes which embed the datastore.
//!
//! The datastore only ever talks to the `log` facade and never looks at the environment itself.  Whoever owns the
//! process decides where that output goes by calling one of these once, early.
use std::io::Write;

fn build_logger(is_test: bool) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    builder
        .format(|buf, record| {
            let now = time::OffsetDateTime::now_utc();

            writeln!(
                buf,
                "{} {} time={} target={}",
                record.level(),
                record.args(),
                now,
                record.target()
            )
        })
        .is_test(is_test);

    builder
}

/// Log to stderr, filtered by `RUST_LOG` and defaulting to `info`.
///
/// If called multiple times in the same process, only applies once.
pub fn log_to_stderr() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        build_logger(false).init();
    });
}

/// Like [log_to_stderr], but output goes through the test harness's capture so that it only shows for failing tests.
///
/// Tests run in parallel and each may call this; a logger installed by someone else is left alone.
pub fn log_for_tests() {
    // Another logger already being installed is fine here.
    let _ = build_logger(true).try_init();
    log::debug!("Test logging enabled");
}
