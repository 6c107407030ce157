use std::sync::Once;

/// Tag shown in logcat
#[cfg(target_os = "android")]
const LOG_TAG: &str = "LocationBridge";

static INIT: Once = Once::new();

/// Install the log backend once per process: logcat on Android, `env_logger`
/// (driven by `RUST_LOG`, default `info`) everywhere else.
pub fn init_logging() {
    INIT.call_once(|| {
        #[cfg(target_os = "android")]
        {
            if android_log::init(LOG_TAG).is_ok() {
                log::set_max_level(log::LevelFilter::Debug);
            }
        }

        #[cfg(not(target_os = "android"))]
        {
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            )
            .try_init();
        }
    });
}
