use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

use isogate_engine::{ProxyAuth, ProxyConfig, ProxyType};

use crate::error::AppError;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Cross-origin-isolation gateway server",
    long_about = "Fronts a single origin and makes it cross-origin isolated without any\n\
                  server-side changes: every same-origin response is answered with the\n\
                  COOP/COEP headers SharedArrayBuffer needs, and large static assets are\n\
                  accelerated through a generation-versioned local cache that prefers\n\
                  precompressed (.br/.gz) variants listed in the precache manifest."
)]
pub struct CliArgs {
    /// Origin to front, e.g. "https://play.example.com"
    #[arg(
        required = true,
        help = "Upstream origin URL the gateway fronts (http or https)"
    )]
    pub origin: Url,

    /// Address the gateway listens on
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:8787",
        help = "Local address and port to serve on"
    )]
    pub bind: SocketAddr,

    /// Precache manifest file
    #[arg(
        short,
        long,
        help = "Path to a JSON precache manifest listing assets to fetch at install time"
    )]
    pub manifest: Option<PathBuf>,

    /// Cache directory
    #[arg(
        long,
        help = "Directory for the generation-versioned asset cache (default: a temp directory)"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Cache generation to run as
    #[arg(
        short,
        long,
        default_value = "1",
        help = "Cache generation number; bump it together with the asset build to discard old stores"
    )]
    pub generation: u32,

    /// Entry document path
    #[arg(
        long,
        default_value = "/index.html",
        help = "Document served for bare navigations to \"/\""
    )]
    pub entry_path: String,

    /// Path prefix for on-demand caching
    #[arg(
        long,
        help = "Only cache assets under this root-relative prefix, e.g. \"/emulators/\" (default: everything)"
    )]
    pub cache_scope: Option<String>,

    /// Budget for the in-memory cache tier, in megabytes
    #[arg(
        long,
        default_value = "64",
        help = "In-memory cache budget in MB; larger assets are served from disk only"
    )]
    pub memory_cache_mb: u64,

    /// Retries per precache fetch
    #[arg(
        long,
        default_value = "2",
        help = "How many times to retry each precache fetch before skipping the asset"
    )]
    pub precache_retries: u32,

    /// Overall timeout in seconds for upstream requests
    #[arg(
        long,
        default_value = "60",
        help = "Overall timeout in seconds for upstream HTTP requests"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Connection timeout in seconds for upstream HTTP requests"
    )]
    pub connect_timeout: u64,

    /// Read timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Read timeout in seconds for upstream HTTP requests"
    )]
    pub read_timeout: u64,

    /// Do not follow upstream redirects
    #[arg(long, help = "Serve upstream redirects as-is instead of following them")]
    pub no_follow_redirects: bool,

    /// Custom user agent for upstream requests
    #[arg(long, help = "User agent sent on upstream requests")]
    pub user_agent: Option<String>,

    /// Egress proxy URL
    #[arg(
        long,
        help = "Proxy server for upstream traffic, e.g. \"http://proxy.example.com:8080\""
    )]
    pub proxy: Option<String>,

    /// Egress proxy type
    #[arg(
        long,
        default_value = "http",
        help = "Proxy type: http, https, socks5 or all"
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_password: Option<String>,

    /// Honor system proxy settings
    #[arg(
        long,
        help = "Use system proxy settings when no explicit proxy is configured"
    )]
    pub use_system_proxy: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

impl CliArgs {
    /// Assemble the egress proxy configuration, if one was requested
    pub fn proxy_config(&self) -> Result<Option<ProxyConfig>, AppError> {
        let Some(url) = &self.proxy else {
            return Ok(None);
        };

        let proxy_type = match self.proxy_type.as_str() {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks5" => ProxyType::Socks5,
            "all" => ProxyType::All,
            other => {
                return Err(AppError::InvalidInput(format!(
                    "unknown proxy type: {other}"
                )));
            }
        };

        let auth = match (&self.proxy_user, &self.proxy_password) {
            (Some(username), Some(password)) => Some(ProxyAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::InvalidInput(
                    "proxy user and password must be provided together".to_string(),
                ));
            }
        };

        Ok(Some(ProxyConfig {
            url: url.clone(),
            proxy_type,
            auth,
        }))
    }
}
