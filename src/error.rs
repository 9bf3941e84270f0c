use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("{0}")]
    Api(String),

    #[error("No rows deleted")]
    NothingDeleted,

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_backend_message_verbatim() {
        let err = AppError::Api("new row violates row-level security policy".to_string());
        assert_eq!(err.to_string(), "new row violates row-level security policy");
    }

    #[test]
    fn nothing_deleted_has_readable_message() {
        assert_eq!(AppError::NothingDeleted.to_string(), "No rows deleted");
    }

    #[test]
    fn anyhow_errors_convert() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
