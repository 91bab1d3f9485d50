use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Where an error came from: the file or key involved, what was found there,
/// and which component was reading it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Config key or file path, e.g. `thresholds.cpu` or `/sys/fs/cgroup/cpu.max`.
    pub field_path: Option<String>,
    pub details: Option<String>,
    /// Reporting component, e.g. `cgroup_v2` or `process_probe`.
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Context for a file read by a discovery or sampling component.
    pub fn for_file(path: &Path, source: &str) -> Self {
        Self::new()
            .with_field_path(path.display().to_string())
            .with_source(source)
    }

    fn is_empty(&self) -> bool {
        self.field_path.is_none() && self.details.is_none() && self.source.is_none()
    }
}

/// Renders as ` (field: .., details: .., source: ..)`, or nothing when empty.
impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let parts = [
            ("field", &self.field_path),
            ("details", &self.details),
            ("source", &self.source),
        ];
        let rendered: Vec<String> = parts
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}: {v}")))
            .collect();
        write!(f, " ({})", rendered.join(", "))
    }
}

/// Errors from configuration, limit discovery, resource sampling and
/// off-runtime workload execution.
///
/// None of these reach a placement decision: the controller turns a failed
/// sample into an offload, and discovery falls through to the next layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Limit discovery error: {message}{context}")]
    Discovery {
        message: String,
        context: ErrorContext,
    },

    #[error("Sampling error: {message}{context}")]
    Sampling {
        message: String,
        context: ErrorContext,
    },

    #[error("Workload error: {message}{context}")]
    Workload {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn discovery_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Discovery {
            message: msg.into(),
            context,
        }
    }

    pub fn sampling_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Sampling {
            message: msg.into(),
            context,
        }
    }

    pub fn workload_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Workload {
            message: msg.into(),
            context,
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Discovery { context, .. }
            | Error::Sampling { context, .. }
            | Error::Workload { context, .. } => Some(context),
            Error::Io(_) | Error::Yaml(_) | Error::Serialization(_) => None,
        }
    }
}
