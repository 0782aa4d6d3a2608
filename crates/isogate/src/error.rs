// Custom error type for gateway construction and upstream transfers
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("Invalid manifest: {0}")]
    ManifestError(String),

    #[error("Invalid gateway configuration: {0}")]
    ConfigError(String),
}
