use env_logger::Env;

/// Initializes env_logger for binaries; `RUST_LOG` overrides the default.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// Initializes env_logger for tests; repeated calls are harmless.
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
