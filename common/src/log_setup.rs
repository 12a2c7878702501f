use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use std::sync::OnceLock;

static LOGGER: OnceLock<LoggerHandle> = OnceLock::new();

/// Installs the process-wide logger.
///
/// Writes to `logs/` with size-based rotation, mirrors everything to stdout
/// and warnings to stderr. `base_level` takes the usual `log` spec syntax,
/// e.g. `"info"` or `"info, fusion::icp=debug"`. Calling it twice is a no-op.
pub fn setup_logging(base_level: &str) {
    LOGGER.get_or_init(|| {
        Logger::try_with_env_or_str(base_level)
            .unwrap_or_else(|e| panic!("Invalid log specification: {}", e))
            .log_to_file(
                FileSpec::default()
                    .directory("logs")
                    .basename("fusion"),
            )
            .duplicate_to_stderr(Duplicate::Warn)
            .duplicate_to_stdout(Duplicate::All)
            .rotate(
                Criterion::Size(1024 * 1024), //1MB
                Naming::Timestamps,
                Cleanup::KeepLogFiles(5),
            )
            .start()
            .unwrap_or_else(|e| panic!("Logger initialization failed with {}", e))
    });
}
