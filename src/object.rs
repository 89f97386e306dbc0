//! The host object: one per instance in a patch.
//!
//! Owns the capture session, the two outlet matrices and the attribute
//! config. Every failure is posted to the console exactly once and never
//! propagates to the host.

use std::path::PathBuf;
use std::sync::Arc;

use jit_matrix::{FrameLayout, Matrix};
use parking_lot::Mutex;

use crate::host::{outlet_assist, Atom, HostConsole};
use crate::kinect::api::Freenect2Api;
use crate::kinect::config::{Config, ATTRIBUTES};
use crate::kinect::error::{KinectError, Result};
use crate::kinect::session::Session;
use crate::kinect::types::{
    LogLevel, Transition, DEPTH_HEIGHT, DEPTH_WIDTH, RGB_HEIGHT, RGB_WIDTH,
};

/// Prefix of every console line.
pub const OBJECT_NAME: &str = "ta.jit.kinect2";

/// Dumpout reply: atoms the host sends out of the dumpout outlet.
type Reply = Option<Vec<Atom>>;
type Handler = fn(&Kinect2Object, &[Atom]) -> Result<Reply>;

/// Messages with a fixed handler. Attribute names and their `get` forms
/// are resolved after this table.
const MESSAGES: &[(&str, Handler)] = &[
    ("open", Kinect2Object::handle_open),
    ("close", Kinect2Object::handle_close),
    ("bang", Kinect2Object::handle_bang),
    ("outputmatrix", Kinect2Object::handle_bang),
    ("getstate", Kinect2Object::handle_getstate),
    ("getstats", Kinect2Object::handle_getstats),
    ("write", Kinect2Object::handle_write),
];

pub struct Kinect2Object {
    sdk: Arc<dyn Freenect2Api>,
    console: Arc<dyn HostConsole>,
    session: Session<dyn Freenect2Api>,
    config: Mutex<Config>,
    config_path: Option<PathBuf>,
    depth: Matrix,
    color: Matrix,
}

impl Kinect2Object {
    /// Create an instance, applying `@name value` creation arguments on
    /// top of `config` and installing the driver logger.
    pub fn new(
        sdk: Arc<dyn Freenect2Api>,
        console: Arc<dyn HostConsole>,
        config: Config,
        args: &[Atom],
    ) -> Self {
        let object = Self {
            session: Session::new(Arc::clone(&sdk)),
            sdk,
            console,
            config: Mutex::new(config),
            config_path: None,
            depth: Matrix::new(FrameLayout::DEPTH.info_for(DEPTH_WIDTH, DEPTH_HEIGHT)),
            color: Matrix::new(FrameLayout::COLOR.info_for(RGB_WIDTH, RGB_HEIGHT)),
        };
        object.apply_creation_args(args);

        let logging = object.config.lock().logging;
        object.sdk.set_log_level(logging);
        tracing::debug!("{OBJECT_NAME} created, driver log level {}", logging.as_str());
        object
    }

    /// Default target of the `write` message.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    fn apply_creation_args(&self, args: &[Atom]) {
        let mut rest = args;
        while let Some((first, tail)) = rest.split_first() {
            rest = tail;
            let Some(name) = first.as_sym().and_then(|s| s.strip_prefix('@')) else {
                self.report(&KinectError::UnknownMessage(first.to_string()));
                continue;
            };
            let Some((value, tail)) = rest.split_first() else {
                self.report(&KinectError::invalid_value(name, "(missing)"));
                break;
            };
            rest = tail;
            if let Err(e) = self.set_attr(name, value) {
                self.report(&e);
            }
        }
    }

    /// Handle one message from the inlet.
    ///
    /// Returns the atoms to send out the dumpout outlet, if any.
    pub fn dispatch(&self, message: &str, args: &[Atom]) -> Reply {
        match self.route(message, args) {
            Ok(reply) => reply,
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    fn route(&self, message: &str, args: &[Atom]) -> Result<Reply> {
        if let Some((_, handler)) = MESSAGES.iter().find(|(name, _)| *name == message) {
            return handler(self, args);
        }
        if ATTRIBUTES.contains(&message) {
            let value = args
                .first()
                .ok_or_else(|| KinectError::invalid_value(message, "(missing)"))?;
            self.set_attr(message, value)?;
            return Ok(None);
        }
        if let Some(attr) = message.strip_prefix("get") {
            if ATTRIBUTES.contains(&attr) {
                let value = self.config.lock().get_attr(attr)?;
                return Ok(Some(vec![Atom::from(attr), value]));
            }
        }
        Err(KinectError::UnknownMessage(message.to_string()))
    }

    fn set_attr(&self, name: &str, value: &Atom) -> Result<()> {
        let logging = {
            let mut config = self.config.lock();
            let before = config.logging;
            config.set_attr(name, value)?;
            (config.logging != before).then_some(config.logging)
        };
        if let Some(level) = logging {
            self.sdk.set_log_level(level);
        }
        tracing::debug!("{name} = {value}");
        Ok(())
    }

    fn handle_open(&self, _args: &[Atom]) -> Result<Reply> {
        let config = self.config.lock().clone();
        match self.session.open(&config) {
            Ok(Transition::Changed) | Err(KinectError::Cancelled) => {}
            Ok(Transition::Unchanged) => self.console.post(&format!(
                "{OBJECT_NAME}: device already {}",
                self.session.state().as_str()
            )),
            Err(e) => return Err(e),
        }
        Ok(None)
    }

    fn handle_close(&self, _args: &[Atom]) -> Result<Reply> {
        self.session.close()?;
        Ok(None)
    }

    fn handle_bang(&self, _args: &[Atom]) -> Result<Reply> {
        // Snapshot so attribute changes do not wait on a blocked grab.
        let config = self.config.lock().clone();
        match self.session.grab(&config, &self.depth, Some(&self.color)) {
            Ok(()) => Ok(None),
            Err(KinectError::Cancelled) => {
                tracing::debug!("grab cancelled by close");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// `write [path]`: save the attributes as JSON.
    fn handle_write(&self, args: &[Atom]) -> Result<Reply> {
        let path = match args.first() {
            Some(atom) => atom
                .as_sym()
                .map(PathBuf::from)
                .ok_or_else(|| KinectError::invalid_value("write", atom))?,
            None => self
                .config_path
                .clone()
                .ok_or_else(|| KinectError::Config("no file to write to".to_string()))?,
        };
        self.config.lock().save(&path)?;
        self.console
            .post(&format!("{OBJECT_NAME}: wrote {}", path.display()));
        Ok(None)
    }

    fn handle_getstate(&self, _args: &[Atom]) -> Result<Reply> {
        let mut reply = vec![
            Atom::from("state"),
            Atom::from(self.session.state().as_str()),
        ];
        if let Some(info) = self.session.device_info() {
            reply.push(Atom::Sym(info.serial));
            reply.push(Atom::Sym(info.firmware));
        }
        Ok(Some(reply))
    }

    fn handle_getstats(&self, _args: &[Atom]) -> Result<Reply> {
        let value = serde_json::to_value(self.session.stats())
            .map_err(|e| KinectError::Config(e.to_string()))?;
        let mut reply = vec![Atom::from("stats")];
        if let serde_json::Value::Object(fields) = value {
            for (key, field) in fields {
                reply.push(Atom::Sym(key));
                reply.push(json_atom(&field));
            }
        }
        Ok(Some(reply))
    }

    fn report(&self, error: &KinectError) {
        self.console.error(&format!("{OBJECT_NAME}: {error}"));
    }

    /// Assist text for an outlet.
    pub fn assist(&self, outlet: usize) -> Option<&'static str> {
        outlet_assist(outlet)
    }

    pub fn depth_output(&self) -> &Matrix {
        &self.depth
    }

    pub fn color_output(&self) -> &Matrix {
        &self.color
    }

    pub fn config(&self) -> Config {
        self.config.lock().clone()
    }

    pub fn session(&self) -> &Session<dyn Freenect2Api> {
        &self.session
    }
}

impl Drop for Kinect2Object {
    fn drop(&mut self) {
        if let Err(e) = self.session.close() {
            self.report(&e);
        }
        self.sdk.set_log_level(LogLevel::None);
    }
}

fn json_atom(value: &serde_json::Value) -> Atom {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Atom::Int)
            .unwrap_or_else(|| Atom::Float(n.as_f64().unwrap_or(0.0))),
        serde_json::Value::Bool(b) => Atom::Int(i64::from(*b)),
        serde_json::Value::String(s) => Atom::Sym(s.clone()),
        _ => Atom::from("none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::RecordingConsole;
    use crate::host::{OUTLET_COLOR, OUTLET_DEPTH, OUTLET_DUMPOUT};
    use crate::kinect::mock::{full_frame_set, MockFreenect2};
    use crate::kinect::types::{DepthProcessor, SessionState};
    use jit_matrix::{ElementType, MatrixBuffer};

    struct Fixture {
        mock: Arc<MockFreenect2>,
        console: Arc<RecordingConsole>,
        object: Kinect2Object,
    }

    impl Fixture {
        fn errors(&self) -> Vec<String> {
            self.console.errors.lock().clone()
        }
    }

    fn fixture(mock: MockFreenect2, args: &[Atom]) -> Fixture {
        let mock = Arc::new(mock);
        let console = Arc::new(RecordingConsole::default());
        let config = Config {
            frame_timeout_ms: 200,
            ..Config::default()
        };
        let object = Kinect2Object::new(mock.clone(), console.clone(), config, args);
        Fixture {
            mock,
            console,
            object,
        }
    }

    #[test]
    fn open_without_device_posts_one_diagnostic() {
        let f = fixture(MockFreenect2::new(), &[]);
        assert_eq!(f.object.dispatch("open", &[]), None);

        let errors = f.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with(OBJECT_NAME));
        assert!(errors[0].contains("no Kinect v2 device"));
        assert_eq!(f.object.session().state(), SessionState::Closed);
    }

    #[test]
    fn invalid_processor_keeps_selection() {
        let f = fixture(MockFreenect2::new(), &[]);
        f.object.dispatch("depth_processor", &[Atom::Int(1)]);
        f.object.dispatch("depth_processor", &[Atom::Int(99)]);

        assert_eq!(f.object.config().depth_processor, DepthProcessor::OpenGl);
        let errors = f.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid value 99 for depth_processor"));
    }

    #[test]
    fn double_open_is_a_no_op() {
        let f = fixture(MockFreenect2::new().with_device("SER1"), &[]);
        f.object.dispatch("open", &[]);
        f.object.dispatch("open", &[]);

        assert_eq!(f.mock.open_calls(), 1);
        assert!(f.errors().is_empty());
        assert_eq!(f.console.posts.lock().len(), 1);
        assert_eq!(f.object.session().state(), SessionState::Open);
    }

    #[test]
    fn close_while_closed_is_a_no_op() {
        let f = fixture(MockFreenect2::new().with_device("SER1"), &[]);
        f.object.dispatch("close", &[]);
        assert!(f.errors().is_empty());
        assert_eq!(f.mock.close_calls(), 0);
    }

    #[test]
    fn bang_fills_both_outlets() {
        let f = fixture(
            MockFreenect2::new()
                .with_device("SER1")
                .with_frame_set(full_frame_set(1)),
            &[],
        );
        f.object.dispatch("open", &[]);
        f.object.dispatch("bang", &[]);
        assert!(f.errors().is_empty());

        let depth = f.object.depth_output().lock();
        assert_eq!(depth.info().element_type, ElementType::Float32);
        assert_eq!(depth.read_f32(0, 1), Some(DEPTH_WIDTH as f32));
        let color = f.object.color_output().lock();
        assert_eq!(color.cell(0, 0).unwrap(), &[0xFF, 2, 1, 0]);
        assert_eq!(f.mock.frames_released(), 1);
    }

    #[test]
    fn bang_when_closed_reports_not_open() {
        let f = fixture(MockFreenect2::new().with_device("SER1"), &[]);
        f.object.dispatch("bang", &[]);
        let errors = f.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("no device open"));
    }

    #[test]
    fn timeout_is_reported_once_and_session_stays_open() {
        let f = fixture(MockFreenect2::new().with_device("SER1"), &[]);
        f.object.dispatch("open", &[]);
        f.object.dispatch("outputmatrix", &[]);
        assert_eq!(f.errors().len(), 1);
        assert_eq!(f.object.session().state(), SessionState::Open);
    }

    #[test]
    fn unknown_message_posts_one_diagnostic() {
        let f = fixture(MockFreenect2::new(), &[]);
        assert_eq!(f.object.dispatch("frobnicate", &[Atom::Int(1)]), None);
        let errors = f.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown message: frobnicate"));
    }

    #[test]
    fn getters_reply_on_dumpout() {
        let f = fixture(MockFreenect2::new(), &[]);
        assert_eq!(
            f.object.dispatch("getrgb_frames", &[]),
            Some(vec![Atom::from("rgb_frames"), Atom::Int(1)])
        );
        assert_eq!(
            f.object.dispatch("getstate", &[]),
            Some(vec![Atom::from("state"), Atom::from("closed")])
        );
        let stats = f.object.dispatch("getstats", &[]).unwrap();
        assert_eq!(stats[0], Atom::from("stats"));
        assert!(stats.contains(&Atom::from("frameCount")));
    }

    #[test]
    fn getstate_includes_device_identity_when_open() {
        let f = fixture(MockFreenect2::new().with_device("SER1"), &[]);
        f.object.dispatch("open", &[]);
        let reply = f.object.dispatch("getstate", &[]).unwrap();
        assert_eq!(reply[1], Atom::from("open"));
        assert_eq!(reply[2], Atom::from("SER1"));
    }

    #[test]
    fn creation_args_set_attributes() {
        let f = fixture(
            MockFreenect2::new().with_device("SER1"),
            &[
                Atom::from("@depth_processor"),
                Atom::Int(2),
                Atom::from("@rgb_frames"),
                Atom::Int(0),
            ],
        );
        let config = f.object.config();
        assert_eq!(config.depth_processor, DepthProcessor::OpenCl);
        assert!(!config.rgb_frames);

        f.object.dispatch("open", &[]);
        assert_eq!(f.mock.pipeline(), Some(DepthProcessor::OpenCl));
    }

    #[test]
    fn bad_creation_args_are_reported_and_skipped() {
        let f = fixture(
            MockFreenect2::new(),
            &[
                Atom::from("@depth_processor"),
                Atom::Int(7),
                Atom::from("@logging"),
                Atom::Int(4),
                Atom::from("@rgb_frames"),
            ],
        );
        assert_eq!(f.errors().len(), 2);
        assert_eq!(f.object.config().depth_processor, DepthProcessor::Cpu);
        assert_eq!(f.object.config().logging, LogLevel::Debug);
    }

    #[test]
    fn logging_attribute_reaches_driver() {
        let f = fixture(MockFreenect2::new(), &[]);
        assert_eq!(f.mock.log_level(), Some(LogLevel::Info));
        f.object.dispatch("logging", &[Atom::Int(1)]);
        assert_eq!(f.mock.log_level(), Some(LogLevel::Error));
    }

    #[test]
    fn drop_closes_and_removes_logger() {
        let f = fixture(MockFreenect2::new().with_device("SER1"), &[]);
        f.object.dispatch("open", &[]);
        let mock = Arc::clone(&f.mock);
        drop(f);

        assert!(!mock.is_streaming());
        assert_eq!(mock.close_calls(), 1);
        assert_eq!(mock.log_level(), Some(LogLevel::None));
    }

    #[test]
    fn close_cancelling_a_bang_is_not_an_error() {
        let mock = Arc::new(MockFreenect2::new().with_device("SER1"));
        let console = Arc::new(RecordingConsole::default());
        let config = Config {
            frame_timeout_ms: 10_000,
            ..Config::default()
        };
        let object = Arc::new(Kinect2Object::new(mock.clone(), console.clone(), config, &[]));
        object.dispatch("open", &[]);

        let bang = {
            let object = Arc::clone(&object);
            std::thread::spawn(move || object.dispatch("bang", &[]))
        };
        std::thread::sleep(std::time::Duration::from_millis(150));
        object.dispatch("close", &[]);

        assert_eq!(bang.join().unwrap(), None);
        assert!(console.errors.lock().is_empty());
        assert_eq!(object.session().state(), SessionState::Closed);
    }

    #[test]
    fn write_saves_attributes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kinect2.json");
        let f = fixture(MockFreenect2::new(), &[]);
        let object = f.object.with_config_path(Some(path.clone()));

        object.dispatch("depth_processor", &[Atom::Int(2)]);
        object.dispatch("rgb_frames", &[Atom::Int(0)]);
        object.dispatch("write", &[]);

        assert!(f.console.errors.lock().is_empty());
        assert_eq!(Config::load(&path).unwrap(), object.config());

        let other = dir.path().join("other.json");
        object.dispatch("write", &[Atom::from(other.to_str().unwrap())]);
        assert_eq!(Config::load(&other).unwrap().depth_processor, DepthProcessor::OpenCl);
    }

    #[test]
    fn write_without_a_path_is_reported() {
        let f = fixture(MockFreenect2::new(), &[]);
        f.object.dispatch("write", &[]);
        f.object.dispatch("write", &[Atom::Int(3)]);
        assert_eq!(f.errors().len(), 2);
    }

    #[test]
    fn assist_names_outlets() {
        let f = fixture(MockFreenect2::new(), &[]);
        assert_eq!(f.object.assist(OUTLET_DEPTH), Some("(matrix) depth"));
        assert_eq!(f.object.assist(OUTLET_COLOR), Some("(matrix) rgb"));
        assert_eq!(f.object.assist(OUTLET_DUMPOUT), Some("dumpout"));
        assert_eq!(f.object.assist(3), None);
    }

    #[test]
    fn outlets_start_with_sensor_layout() {
        let f = fixture(MockFreenect2::new(), &[]);
        assert_eq!(f.object.depth_output().info().dim, vec![DEPTH_WIDTH, DEPTH_HEIGHT]);
        assert_eq!(f.object.color_output().info().planecount, 4);
    }
}
