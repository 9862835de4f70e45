use std::process::ExitCode;

/// Errors that cause comms-bridge to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("console unreachable at {url}: {message}")]
    ConsoleUnreachable { url: String, message: String },

    #[error("{what} not found at {path}")]
    Missing { what: String, path: String },

    #[error("{message}")]
    WithCode { code: u8, message: String },

    #[error("{0}")]
    Other(String),
}

impl ExitError {
    pub fn new(code: u8, message: String) -> Self {
        ExitError::WithCode { code, message }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            ExitError::Config(_) => ExitCode::from(2),
            ExitError::ConsoleUnreachable { .. } => ExitCode::from(3),
            ExitError::Missing { .. } => ExitCode::from(4),
            ExitError::WithCode { code, .. } => ExitCode::from(*code),
            ExitError::Other(_) => ExitCode::from(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            ExitError::Config("bad".into()).exit_code(),
            ExitError::ConsoleUnreachable {
                url: "http://x".into(),
                message: "refused".into(),
            }
            .exit_code(),
            ExitError::Missing {
                what: "context.md".into(),
                path: "/tmp/context.md".into(),
            }
            .exit_code(),
            ExitError::Other("x".into()).exit_code(),
        ]
        .map(|c| format!("{c:?}"));
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn missing_message_names_path() {
        let err = ExitError::Missing {
            what: "context.md".into(),
            path: "/w/context.md".into(),
        };
        assert_eq!(err.to_string(), "context.md not found at /w/context.md");
    }
}
