//! Host boundary: message atoms, the console and outlet descriptions.

use std::fmt;

/// A single message argument as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Int(i64),
    Float(f64),
    Sym(String),
}

impl Atom {
    /// Integer value, truncating floats the way the host does.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            Self::Sym(_) => None,
        }
    }

    pub fn as_sym(&self) -> Option<&str> {
        match self {
            Self::Sym(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Sym(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Atom {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Atom {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Self::Sym(s.to_string())
    }
}

/// The host's diagnostic channel (the console window).
pub trait HostConsole: Send + Sync {
    /// Informational line.
    fn post(&self, message: &str);

    /// Error line. Never fatal.
    fn error(&self, message: &str);
}

/// Console that forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl HostConsole for TracingConsole {
    fn post(&self, message: &str) {
        tracing::info!(target: "kinect2", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "kinect2", "{message}");
    }
}

/// Outlet indices of the object.
pub const OUTLET_DEPTH: usize = 0;
pub const OUTLET_COLOR: usize = 1;
pub const OUTLET_DUMPOUT: usize = 2;

/// Assist string shown by the host when hovering an outlet.
pub fn outlet_assist(outlet: usize) -> Option<&'static str> {
    match outlet {
        OUTLET_DEPTH => Some("(matrix) depth"),
        OUTLET_COLOR => Some("(matrix) rgb"),
        OUTLET_DUMPOUT => Some("dumpout"),
        _ => None,
    }
}
