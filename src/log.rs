//! Logging setup: a runtime-adjustable [`tracing`] filter so `SIGHUP`
//! can change verbosity without a restart (spec §6 "Signals").

use std::fmt;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// The state of the daemon logger.
pub struct Logger {
    filter: Handle<EnvFilter, Registry>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    /// Install the global subscriber at the given starting level.
    ///
    /// # Panics
    ///
    /// Panics if a global [`tracing`] subscriber has already been set.
    pub fn launch(level: &str) -> &'static Logger {
        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        let (filter, handle) = reload::Layer::new(filter);

        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();

        Box::leak(Box::new(Logger { filter: handle }))
    }

    /// Replace the active filter, e.g. on `SIGHUP` or a `log_level`
    /// change in the daemon config.
    pub fn set_level(&self, level: &str) -> Result<(), String> {
        let new_filter = EnvFilter::try_new(level).map_err(|err| err.to_string())?;
        self.filter
            .reload(new_filter)
            .map_err(|err| err.to_string())
    }
}

/// Prefix used by a unit's log lines, matching the two-letter tags used
/// throughout (`KM` Keystore, `ZS` Zone Store, `RE` Refresh Engine, `QE`
/// Query Engine, `UP` Update Pipeline, `DS` Delegation Sync, `NF`
/// Notifier, `TF` Transport Front-End).
pub const TAG_KEYSTORE: &str = "KM";
pub const TAG_ZONE_STORE: &str = "ZS";
pub const TAG_REFRESH: &str = "RE";
pub const TAG_QUERY: &str = "QE";
pub const TAG_UPDATE: &str = "UP";
pub const TAG_DELEGATION_SYNC: &str = "DS";
pub const TAG_NOTIFIER: &str = "NF";
pub const TAG_TRANSPORT: &str = "TF";
