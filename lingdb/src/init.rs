//! Process initialization: environment-driven logging setup plus the
//! default schema registry.

use crate::logging::Logger;
use crate::result::LdbResult;
use crate::schema::Registry;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

pub struct InitOptions {
    /// Skip logging initialization.
    /// Useful when the caller installs its own log handler.
    pub skip_logging: bool,

    /// Application name to use with syslog.
    pub appname: Option<String>,
}

impl InitOptions {
    pub fn new() -> InitOptions {
        InitOptions {
            skip_logging: false,
            appname: None,
        }
    }
}

impl Default for InitOptions {
    fn default() -> InitOptions {
        InitOptions::new()
    }
}

/// Read environment variables, set up logging, and load the default
/// schema registry.
///
/// * `LINGDB_LOG_LEVEL` - numeric level, 1 (errors only) through 5
///   (trace)
/// * `LINGDB_LOG_FACILITY` - syslog facility, e.g. LOG_LOCAL0
pub fn init() -> LdbResult<Arc<Registry>> {
    with_options(&InitOptions::new())
}

pub fn with_options(options: &InitOptions) -> LdbResult<Arc<Registry>> {
    if !options.skip_logging {
        let mut logger = Logger::new();

        if let Ok(level) = env::var("LINGDB_LOG_LEVEL") {
            logger.set_loglevel(Logger::log_level_from_str(&level));
        }

        if let Ok(facility) = env::var("LINGDB_LOG_FACILITY") {
            let facility = syslog::Facility::from_str(&facility)
                .or_else(|_| Err(format!("Invalid syslog facility: {facility}")))?;
            logger.set_facility(facility);
        }

        if let Some(name) = options.appname.as_ref() {
            logger.set_application(name);
        }

        logger
            .init()
            .or_else(|e| Err(format!("Error initializing logger: {e}")))?;
    }

    Ok(Arc::new(Registry::fieldwork()))
}
