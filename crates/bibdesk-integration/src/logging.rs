//! Log subscriber setup
//!
//! The subscriber is installed before settings are read so that loading them
//! is logged too; the settings' filter is applied afterwards through a reload
//! handle.

use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, reload, EnvFilter, Registry};

use crate::settings::Settings;

/// Handle adjusting the installed filter once settings are known
pub struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogFilter {
    /// Switch to the settings' filter; a filter from RUST_LOG is kept
    pub fn apply(&self, settings: &Settings) -> Result<(), reload::Error> {
        if self.from_env {
            return Ok(());
        }
        self.handle.reload(EnvFilter::new(settings.log_filter()))
    }
}

/// Subscriber writing to stderr, filtered by RUST_LOG or `info`
pub fn subscriber() -> (impl Subscriber + Send + Sync + 'static, LogFilter) {
    build(EnvFilter::try_from_default_env().ok())
}

fn build(env: Option<EnvFilter>) -> (impl Subscriber + Send + Sync + 'static, LogFilter) {
    let from_env = env.is_some();
    let (filter, handle) = reload::Layer::new(env.unwrap_or_else(|| EnvFilter::new("info")));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    (subscriber, LogFilter { handle, from_env })
}
