//! Log setup shared by the glagol binaries.

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid RUST_LOG: {0}")]
    Filter(#[from] tracing_subscriber::filter::FromEnvError),
}

pub struct TracingBuilder {
    level: Level,
    ansi: bool,
}

impl Default for TracingBuilder {
    fn default() -> Self {
        TracingBuilder {
            level: Level::WARN,
            ansi: true,
        }
    }
}

impl TracingBuilder {
    /// Set the log level of the stderr layer. RUST_LOG still has a
    /// higher priority over this value.
    pub fn level(mut self, level: Level) -> TracingBuilder {
        self.level = level;
        self
    }

    /// Disable colours in the log output, e.g. when stderr is not a
    /// terminal.
    pub fn plain(mut self) -> TracingBuilder {
        self.ansi = false;
        self
    }

    /// Installs a global subscriber writing compact lines to stderr,
    /// filtered by an EnvFilter defaulting to the configured level.
    ///
    /// Fails if a global subscriber has already been set.
    pub fn build(self) -> Result<(), Error> {
        let filter = EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env()?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::Layer::new()
                    .with_writer(std::io::stderr)
                    .with_ansi(self.ansi)
                    .compact(),
            )
            .try_init()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_subscriber_can_be_installed() {
        // RUST_LOG may be set by whoever runs the tests; an invalid one
        // makes the first build fail too, so only check the second call.
        let _ = TracingBuilder::default().level(Level::DEBUG).build();
        assert!(matches!(
            TracingBuilder::default().build(),
            Err(Error::Init(_)) | Err(Error::Filter(_))
        ));
    }
}
