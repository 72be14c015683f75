//! Conversions from library errors

use super::AppError;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            operation: "io_operation".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigParse {
            message: err.to_string(),
            line: err.location().map(|loc| loc.line()),
        }
    }
}

/// The URL is dropped from the message since it may carry credentials.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        Self::HttpClient {
            message: err.without_url().to_string(),
            status_code,
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::config_validation(format!("Invalid URL: {err}"), None::<String>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_errors_keep_line_information() {
        let err: serde_yaml::Error =
            serde_yaml::from_str::<Vec<u32>>("- 1\n- two\n").unwrap_err();
        match AppError::from(err) {
            AppError::ConfigParse { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn not_found_message_mentions_key_when_present() {
        let err = AppError::key_not_found("openai", "primary");
        assert_eq!(err.to_string(), "Key primary not found for provider openai");
        let err = AppError::provider_not_found("openai");
        assert_eq!(err.to_string(), "Provider openai not found");
    }
}
