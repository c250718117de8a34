use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Service has no manager")]
    #[diagnostic(
        code(warden::service::no_manager),
        help("Register the service with Manager::add_service before operating on it")
    )]
    NoManager,

    #[error("Conflicting service enabled")]
    #[diagnostic(
        code(warden::service::conflict),
        help("Disable the conflicting service first, then retry")
    )]
    Conflict,

    #[error("Service is enabled")]
    #[diagnostic(
        code(warden::service::is_enabled),
        help("Disable the service before removing it from the manager")
    )]
    IsEnabled,

    #[error("Service is not running")]
    NotRunning,

    #[error("Restarting too quickly")]
    #[diagnostic(
        code(warden::service::rate_limited),
        help("Wait for the cool-down to expire, or clear the service to reset its start count")
    )]
    RateLimited,

    #[error("Service faulted: {0}")]
    Faulted(String),

    #[error("Bad property type")]
    BadPropType,

    #[error("Bad property name")]
    BadPropName,

    #[error("Bad property value: {0}")]
    BadPropValue(String),

    #[error("Property not changeable")]
    PropReadOnly,

    #[error("Invalid service name: {0}")]
    #[diagnostic(
        code(warden::service::bad_name),
        help("Names are alphanumeric/underscore, optionally base:variant with a single colon")
    )]
    BadName(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Manifest error: {0}")]
    #[diagnostic(
        code(warden::manifest::invalid),
        help("Check the JSON descriptor; required fields are name and command")
    )]
    Manifest(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Server returned {code}: {message}")]
    Server { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Conflict => Some(
                "A conflicting service is enabled. Check `warden status` and disable it first."
                    .to_string(),
            ),
            Error::IsEnabled => {
                Some("Disable the service before deleting it from the manager.".to_string())
            }
            Error::RateLimited => Some(
                "The service hit its restart rate limit. It becomes startable again after \
                 two quiet rate periods, or immediately after `warden clear <name>`."
                    .to_string(),
            ),
            Error::Server { code: 401, .. } => {
                Some("Authentication required. Pass --user and --pass.".to_string())
            }
            Error::Server { code: 404, .. } => {
                Some("Unknown service. List available names with `warden services`.".to_string())
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
