//! Protocol fetch and format dispatch
//!
//! [`Sniffer::resolve`] opens the upstream named by a locator and picks an
//! adapter for it. HTTP responses are routed by their declared content type
//! through [`CONTENT_TYPES`]; everything unlisted, and every raw TCP socket,
//! goes through magic-byte probing.

use std::io;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use tokio::net::TcpStream;
use tokio_util::io::StreamReader;

use super::locator::{scheme_of, Locator};
use super::probe::ProbeOptions;
use super::{ByteSource, FlvClient, MjpegClient, ProbeClient, Producer};
use crate::error::{Error, Result};

/// Sniffer configuration
#[derive(Debug, Clone)]
pub struct SnifferConfig {
    /// Bound on TCP connect, for raw sockets and HTTP alike
    pub dial_timeout: Duration,

    /// Bound on probing a source, FLV describe included
    pub probe_timeout: Duration,

    /// Tags read while describing an FLV source before giving up
    pub describe_tag_limit: usize,

    /// User-Agent sent upstream
    pub user_agent: Option<String>,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(5),
            describe_tag_limit: 64,
            user_agent: None,
        }
    }
}

impl SnifferConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn describe_tag_limit(mut self, limit: usize) -> Self {
        self.describe_tag_limit = limit;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            timeout: self.probe_timeout,
            describe_tag_limit: self.describe_tag_limit,
        }
    }
}

/// Adapter family selected by content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Single JPEG or multipart MJPEG
    ImageStream,
    /// FLV container
    LegacyContainer,
    /// Unknown; classify by magic bytes
    Probe,
}

/// Declared content types with a dedicated adapter. Anything else maps to
/// [`ContentKind::Probe`].
pub const CONTENT_TYPES: &[(&str, ContentKind)] = &[
    ("image/jpeg", ContentKind::ImageStream),
    ("multipart/x-mixed-replace", ContentKind::ImageStream),
    ("video/x-flv", ContentKind::LegacyContainer),
];

/// Drop parameters after `;`, trim and lowercase
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl ContentKind {
    /// Look up a normalized content type
    pub fn classify(content_type: Option<&str>) -> Self {
        content_type
            .and_then(|ct| {
                CONTENT_TYPES
                    .iter()
                    .find(|(known, _)| *known == ct)
                    .map(|(_, kind)| *kind)
            })
            .unwrap_or(ContentKind::Probe)
    }
}

/// Resolves locators into producers
#[derive(Debug, Clone)]
pub struct Sniffer {
    config: SnifferConfig,
    http: Client,
    /// Used for `httpx://`, skips certificate verification
    insecure: Client,
}

impl Sniffer {
    pub fn new(config: SnifferConfig) -> Result<Self> {
        let http = client_builder(&config).build()?;
        let insecure = client_builder(&config)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            config,
            http,
            insecure,
        })
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    /// Dispatch on the locator scheme
    pub async fn resolve(&self, raw: &str) -> Result<Producer> {
        let locator = Locator::parse(raw)?;
        let scheme = scheme_of(&locator.address)
            .ok_or_else(|| Error::UnsupportedScheme(locator.address.clone()))?;

        match scheme.as_str() {
            "http" | "https" | "httpx" => self.resolve_http(raw).await,
            "tcp" => self.resolve_tcp(raw).await,
            _ => Err(Error::UnsupportedScheme(scheme)),
        }
    }

    /// GET the address and pick an adapter by content type
    pub async fn resolve_http(&self, raw: &str) -> Result<Producer> {
        let locator = Locator::parse(raw)?;

        let (client, url) = match strip_httpx(&locator.address) {
            Some(rest) => (&self.insecure, format!("https://{}", rest)),
            None => (&self.http, locator.address.clone()),
        };

        let mut request = client.get(&url);
        if let Some((name, value)) = &locator.header {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %locator.address, status = %status, "Upstream rejected request");
            return Err(Error::UpstreamStatus(status.to_string()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(normalize_content_type);
        let kind = ContentKind::classify(content_type.as_deref());

        tracing::debug!(
            url = %locator.address,
            content_type = content_type.as_deref().unwrap_or("-"),
            kind = ?kind,
            "Upstream responded"
        );

        let body = body_reader(response);
        match kind {
            ContentKind::ImageStream => Ok(Producer::Mjpeg(MjpegClient::new(
                body,
                locator.address,
                content_type,
            ))),
            ContentKind::LegacyContainer => {
                let mut client = FlvClient::accept(body, locator.address).await?;
                client.describe(self.config.describe_tag_limit).await?;
                Ok(Producer::Flv(client))
            }
            ContentKind::Probe => {
                let client = ProbeClient::probe(body, self.config.probe_options()).await?;
                Ok(Producer::Probe(
                    client
                        .with_desc("HTTP active producer")
                        .with_url(locator.address),
                ))
            }
        }
    }

    /// Dial `tcp://host:port` and probe the socket
    pub async fn resolve_tcp(&self, raw: &str) -> Result<Producer> {
        let locator = Locator::parse(raw)?;
        if locator.header.is_some() {
            return Err(Error::MalformedLocator(format!(
                "{}: tcp locators take no header",
                locator.address
            )));
        }
        let addr = tcp_address(&locator.address)?;

        let stream = tokio::time::timeout(self.config.dial_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::DialTimeout {
                addr: addr.clone(),
                timeout: self.config.dial_timeout,
            })?
            .map_err(|source| Error::Dial {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::debug!(addr = %addr, "Upstream connected");

        let client = ProbeClient::probe(Box::new(stream), self.config.probe_options()).await?;
        Ok(Producer::Probe(
            client.with_desc("TCP active producer").with_url(raw),
        ))
    }
}

fn client_builder(config: &SnifferConfig) -> reqwest::ClientBuilder {
    let builder = Client::builder().connect_timeout(config.dial_timeout);
    match &config.user_agent {
        Some(agent) => builder.user_agent(agent.clone()),
        None => builder.user_agent(concat!("relay-rs/", env!("CARGO_PKG_VERSION"))),
    }
}

fn strip_httpx(address: &str) -> Option<&str> {
    let (scheme, rest) = address.split_once("://")?;
    scheme.eq_ignore_ascii_case("httpx").then_some(rest)
}

/// `tcp://host:port` to `host:port`
fn tcp_address(address: &str) -> Result<String> {
    let url = Url::parse(address).map_err(|e| Error::MalformedLocator(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::MalformedLocator(format!("{}: missing host", address)))?;
    let port = url
        .port()
        .ok_or_else(|| Error::MalformedLocator(format!("{}: missing port", address)))?;
    Ok(format!("{}:{}", host, port))
}

fn body_reader(response: Response) -> ByteSource {
    let stream = response.bytes_stream().map_err(io::Error::other);
    Box::new(StreamReader::new(Box::pin(stream)))
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::media::Codec;
    use crate::source::flv::tests::flv_stream;
    use crate::source::ProbeFormat;

    const JPEG_HEAD: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

    fn sniffer() -> Sniffer {
        Sniffer::new(SnifferConfig::default()).unwrap()
    }

    async fn serve(route: &str, template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_classify_content_type() {
        let cases = [
            ("image/jpeg", ContentKind::ImageStream),
            (
                "multipart/x-mixed-replace; boundary=frame",
                ContentKind::ImageStream,
            ),
            ("Video/X-FLV", ContentKind::LegacyContainer),
            ("video/mp2t", ContentKind::Probe),
            ("application/octet-stream", ContentKind::Probe),
        ];
        for (raw, kind) in cases {
            let ct = normalize_content_type(raw);
            assert_eq!(ContentKind::classify(Some(&ct)), kind, "{raw}");
        }
        assert_eq!(ContentKind::classify(None), ContentKind::Probe);
    }

    #[test]
    fn test_config_builder() {
        let config = SnifferConfig::new()
            .dial_timeout(Duration::from_millis(500))
            .probe_timeout(Duration::from_secs(1))
            .describe_tag_limit(8)
            .user_agent("cam-relay");

        assert_eq!(config.dial_timeout, Duration::from_millis(500));
        assert_eq!(config.user_agent.as_deref(), Some("cam-relay"));
        let options = config.probe_options();
        assert_eq!(options.timeout, Duration::from_secs(1));
        assert_eq!(options.describe_tag_limit, 8);
    }

    #[test]
    fn test_tcp_address() {
        assert_eq!(tcp_address("tcp://10.0.0.5:8000").unwrap(), "10.0.0.5:8000");
        assert!(matches!(
            tcp_address("tcp://10.0.0.5"),
            Err(Error::MalformedLocator(_))
        ));
    }

    #[tokio::test]
    async fn test_jpeg_yields_image_stream() {
        let server = serve(
            "/snap.jpg",
            ResponseTemplate::new(200).set_body_raw(JPEG_HEAD, "image/jpeg"),
        )
        .await;
        let locator = format!("{}/snap.jpg", server.uri());

        let producer = sniffer().resolve(&locator).await.unwrap();
        assert!(matches!(producer, Producer::Mjpeg(_)));
        assert_eq!(producer.desc(), "MJPEG active producer");
        assert_eq!(producer.url(), locator);
        assert_eq!(producer.medias()[0].codec, Codec::Jpeg);
    }

    #[tokio::test]
    async fn test_flv_accepted_and_described() {
        let server = serve(
            "/live.flv",
            ResponseTemplate::new(200).set_body_raw(flv_stream(), "video/x-flv"),
        )
        .await;

        let producer = sniffer()
            .resolve(&format!("{}/live.flv", server.uri()))
            .await
            .unwrap();
        assert!(matches!(producer, Producer::Flv(_)));
        let codecs: Vec<Codec> = producer.medias().iter().map(|m| m.codec).collect();
        assert_eq!(codecs, vec![Codec::H264, Codec::Aac]);
    }

    #[tokio::test]
    async fn test_flv_handshake_failure_yields_no_producer() {
        let server = serve(
            "/live.flv",
            ResponseTemplate::new(200).set_body_raw(b"GIF89a not a flv".to_vec(), "video/x-flv"),
        )
        .await;

        let err = sniffer()
            .resolve(&format!("{}/live.flv", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handshake(_)), "{err}");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;

        let err = sniffer()
            .resolve(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamStatus(_)));
        assert_eq!(err.to_string(), "404 Not Found");
    }

    #[tokio::test]
    async fn test_unknown_content_type_falls_back_to_probe() {
        let body = [0u8, 0, 0, 1, 0x67, 0x42, 0xC0, 0x0D, 0, 0, 0, 1, 0x68];
        let server = serve(
            "/raw",
            ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/octet-stream"),
        )
        .await;
        let locator = format!("{}/raw", server.uri());

        let producer = sniffer().resolve(&locator).await.unwrap();
        let Producer::Probe(client) = &producer else {
            panic!("expected probe producer, got {producer:?}");
        };
        assert_eq!(client.format(), ProbeFormat::H264);
        assert_eq!(producer.desc(), "HTTP active producer");
        assert_eq!(producer.url(), locator);
    }

    #[tokio::test]
    async fn test_probe_errors_propagate() {
        let server = serve(
            "/short",
            ResponseTemplate::new(200).set_body_raw(vec![0x47, 0x40], "video/mp2t"),
        )
        .await;

        let err = sniffer()
            .resolve(&format!("{}/short", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData { needed: 8, got: 2 }));
    }

    #[tokio::test]
    async fn test_header_directive_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .and(header("authorization", "Bearer s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(JPEG_HEAD, "image/jpeg"))
            .mount(&server)
            .await;

        let locator = format!("{}/private Authorization s3cr3t", server.uri());
        let producer = sniffer().resolve(&locator).await.unwrap();
        assert!(matches!(producer, Producer::Mjpeg(_)));

        // Without the header the mock does not match
        let err = sniffer()
            .resolve(&format!("{}/private", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamStatus(_)));
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(JPEG_HEAD).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let locator = format!("tcp://{}", addr);
        let producer = sniffer().resolve(&locator).await.unwrap();
        let Producer::Probe(client) = &producer else {
            panic!("expected probe producer, got {producer:?}");
        };
        assert_eq!(client.format(), ProbeFormat::Jpeg);
        assert_eq!(producer.desc(), "TCP active producer");
        assert_eq!(producer.url(), locator);
    }

    #[tokio::test]
    async fn test_tcp_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = sniffer()
            .resolve(&format!("tcp://{}", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Dial { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_tcp_rejects_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let err = sniffer()
            .resolve(&format!("tcp://{} Authorization secret", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedLocator(_)), "{err}");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let err = sniffer().resolve("rtsp://cam.local/live").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(ref s) if s == "rtsp"));

        let err = sniffer().resolve("cam1").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn test_malformed_locator() {
        let err = sniffer()
            .resolve("http://cam.local/a X-Api-Key")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedLocator(_)));
    }
}
