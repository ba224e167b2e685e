//! Server configuration

use std::net::SocketAddr;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 1984;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Payloads queued per client before the stream is backpressured
    pub output_buffer: usize,

    /// Playlist that Safari clients are redirected to (None = never redirect)
    pub hls_redirect: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            output_buffer: 64,
            hls_redirect: Some("stream.m3u8".to_string()),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the per-client output buffer depth (at least 1)
    pub fn output_buffer(mut self, depth: usize) -> Self {
        self.output_buffer = depth.max(1);
        self
    }

    /// Set the redirect playlist for Safari
    pub fn hls_redirect(mut self, target: impl Into<String>) -> Self {
        self.hls_redirect = Some(target.into());
        self
    }

    /// Serve fragmented MP4 to Safari too
    pub fn disable_hls_redirect(mut self) -> Self {
        self.hls_redirect = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 1984);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.output_buffer, 64);
        assert_eq!(config.hls_redirect.as_deref(), Some("stream.m3u8"));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8554".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 8554);
    }

    #[test]
    fn test_builder_output_buffer_floor() {
        let config = ServerConfig::default().output_buffer(0);

        assert_eq!(config.output_buffer, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:1984".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .output_buffer(16)
            .hls_redirect("live.m3u8");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.output_buffer, 16);
        assert_eq!(config.hls_redirect.as_deref(), Some("live.m3u8"));

        let config = config.disable_hls_redirect();
        assert!(config.hls_redirect.is_none());
    }
}
