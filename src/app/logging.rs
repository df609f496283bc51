use tracing_subscriber::EnvFilter;

// Bridge subprocess chatter lands at debug; the crate's own operations at
// info. RUST_LOG still overrides everything.
const DEFAULT_FILTER: &str = "warn,droidbridge=info";

pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_a_valid_directive() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
