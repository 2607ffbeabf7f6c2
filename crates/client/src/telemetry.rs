use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber. `RUST_LOG` wins over `level` when set.
///
/// Returns whether this call installed it. Calling again, or after someone
/// else installed a subscriber, leaves the existing one in place.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
    {
        Ok(()) => true,
        Err(err) => {
            debug!("Keeping existing tracing subscriber: {}", err);
            false
        }
    }
}
