use std::path::Path;

use color_eyre::eyre::Result as EyreResult;
use flexi_logger::{FileSpec, LogSpecification, Logger, LoggerHandle};
use log::LevelFilter;

/// Start logging to `log_file`, or to standard error when none is given.
///
/// The returned handle must be kept alive for as long as the program logs.
pub fn setup_logger(level: LevelFilter, log_file: Option<&Path>) -> EyreResult<LoggerHandle> {
    let spec = LogSpecification::builder().default(level).build();
    let logger = Logger::with(spec).format(flexi_logger::detailed_format);

    let logger = match log_file {
        Some(path) => logger.log_to_file(FileSpec::try_from(path)?).append(),
        None => logger.log_to_stderr(),
    };

    Ok(logger.start()?)
}
