pub mod host;
pub mod kinect;
pub mod object;

use std::path::PathBuf;
use std::sync::Arc;

use host::{Atom, TracingConsole};
use kinect::api::Freenect2Api;
use kinect::config::Config;
use kinect::dummy::{DummyDriver, NullDriver};
use kinect::types::LogLevel;
use object::Kinect2Object;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "KINECT2_CONFIG";

/// Install a fmt subscriber for `tracing` output.
///
/// `RUST_LOG` wins over `level` when set. A subscriber already installed by
/// the host is left in place.
pub fn init_tracing(level: LogLevel) {
    let default_directive = level.level_filter().to_string().to_lowercase();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .with_target(true)
        .with_level(true)
        .try_init();
}

/// Create the sensor driver.
///
/// When `DUMMY_KINECT=1` is set, a simulated sensor is used instead. Without
/// a native backend the null driver reports no devices.
pub fn create_driver() -> Arc<dyn Freenect2Api> {
    if DummyDriver::is_enabled() {
        tracing::info!("using dummy Kinect driver");
        return Arc::new(DummyDriver::new());
    }
    Arc::new(NullDriver)
}

/// Config file named by `KINECT2_CONFIG`, if set.
pub fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV).map(PathBuf::from)
}

/// Load the config named by `KINECT2_CONFIG`, falling back to defaults.
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    match Config::load(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("ignoring {}: {e}", path.display());
            Config::default()
        }
    }
}

/// Entry point for the host's `new` method.
pub fn create_object(args: &[Atom]) -> Kinect2Object {
    let config = load_config();
    init_tracing(config.logging);
    Kinect2Object::new(create_driver(), Arc::new(TracingConsole), config, args)
        .with_config_path(config_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinect::types::SessionState;
    use parking_lot::Mutex;
    use std::io;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing(LogLevel::Debug);
        init_tracing(LogLevel::None);
    }

    #[test]
    fn null_driver_object_reports_no_device() {
        let object = Kinect2Object::new(
            Arc::new(NullDriver),
            Arc::new(TracingConsole),
            Config::default(),
            &[],
        );
        assert_eq!(object.dispatch("open", &[]), None);
        assert_eq!(object.session().state(), SessionState::Closed);
    }

    #[test]
    fn failed_open_logs_one_line() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let object = Kinect2Object::new(
                Arc::new(NullDriver),
                Arc::new(TracingConsole),
                Config::default(),
                &[],
            );
            object.dispatch("open", &[]);
        });

        let lines = capture.lines();
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("no Kinect v2 device connected"));
    }

    #[test]
    fn dummy_driver_object_streams() {
        let object = Kinect2Object::new(
            Arc::new(DummyDriver::new()),
            Arc::new(TracingConsole),
            Config::default(),
            &[],
        );
        object.dispatch("open", &[]);
        object.dispatch("bang", &[]);
        object.dispatch("bang", &[]);
        assert_eq!(object.session().stats().frame_count, 2);
        assert_eq!(object.dispatch("close", &[]), None);
    }
}
