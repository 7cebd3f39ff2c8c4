//! HTTP transport over an Ethernet host
//!
//! An open handle owns a small current-thread runtime that drives the async
//! reqwest client. Each request runs on a scoped worker thread, so handles can
//! be used from plain threads and from inside a tokio runtime alike.

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tether_core::error::check_buffer;
use tether_core::transport::unsupported;
use tether_core::{
    CommunicationError, DeviceInfo, EndpointDirection, EndpointInfo, EthernetDeviceInfo, HttpVerb,
    NativeHandle, Result, TransferConfiguration, Transport, TransportKind,
};
use tokio::runtime::Runtime;
use tracing::{debug, info, trace};

use crate::probe::PROBE_TIMEOUT_MS;

/// Port probed for HTTP criteria that leave the port unset
pub const DEFAULT_HTTP_PORT: u16 = 80;

fn default_timeout_ms() -> u32 {
    PROBE_TIMEOUT_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfiguration {
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
}

impl Default for HttpConfiguration {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Client plus the runtime its connections live on
struct HttpSession {
    client: Client,
    runtime: Runtime,
}

impl HttpSession {
    fn new(timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CommunicationError::Resource(format!("failed to create HTTP runtime: {}", e)))?;

        let client = {
            let _guard = runtime.enter();
            Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout)
                .build()
        }
        .map_err(|e| CommunicationError::Resource(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, runtime })
    }

    /// Drive `future` to completion on this session's runtime.
    ///
    /// The worker thread never carries an ambient tokio context, which keeps
    /// `block_on` legal regardless of the caller's thread.
    fn run<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send,
        F::Output: Send,
    {
        std::thread::scope(|scope| scope.spawn(move || self.runtime.block_on(future)).join())
            .map_err(|_| CommunicationError::Resource("HTTP worker thread panicked".to_string()))
    }

    fn shutdown(self) {
        drop(self.client);
        self.runtime.shutdown_background();
    }
}

async fn exchange(
    client: Client,
    method: Method,
    url: String,
    body: Option<Vec<u8>>,
) -> reqwest::Result<(StatusCode, Vec<u8>)> {
    let mut request = client.request(method, &url);
    if let Some(body) = body {
        request = request.body(body);
    }

    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    Ok((status, body.to_vec()))
}

/// HTTP session with one discovered host
pub struct HttpCommunication {
    info: EthernetDeviceInfo,
    configuration: HttpConfiguration,
    session: Option<HttpSession>,
}

impl HttpCommunication {
    pub fn new(info: EthernetDeviceInfo) -> Self {
        Self {
            info,
            configuration: HttpConfiguration::default(),
            session: None,
        }
    }

    pub fn device(&self) -> &EthernetDeviceInfo {
        &self.info
    }

    fn url(&self, path: &str) -> String {
        let authority = SocketAddr::new(IpAddr::from(self.info.ip), self.info.port);
        if path.starts_with('/') {
            format!("http://{}{}", authority, path)
        } else {
            format!("http://{}/{}", authority, path)
        }
    }

    /// Validate the transfer and return its verb and path
    fn request_target<'a>(
        &self,
        transfer: &'a TransferConfiguration,
        len: usize,
    ) -> Result<(HttpVerb, &'a str, &HttpSession)> {
        let TransferConfiguration::Http { verb, path } = transfer else {
            return Err(unsupported(TransportKind::Http, transfer));
        };
        check_buffer(len)?;
        let session = self.session.as_ref().ok_or(CommunicationError::NotConnected)?;
        if path.is_empty() {
            return Err(CommunicationError::InvalidArgument(
                "resource path must not be empty".to_string(),
            ));
        }
        Ok((*verb, path.as_str(), session))
    }

    /// Send one request and return the body of a 2xx response
    fn send(&self, session: &HttpSession, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let url = self.url(path);
        let result = session.run(exchange(session.client.clone(), method.clone(), url.clone(), body))?;

        let (status, body) = result.map_err(|e| {
            debug!(url = %url, error = %e, "HTTP request failed");
            if e.is_connect() || e.is_timeout() {
                CommunicationError::Unreachable(format!("{}: {}", url, e))
            } else {
                CommunicationError::Resource(e.to_string())
            }
        })?;

        trace!(method = %method, url = %url, status = status.as_u16(), "HTTP response");
        if !status.is_success() {
            return Err(CommunicationError::Native {
                code: i32::from(status.as_u16()),
                message: self.error_string(i32::from(status.as_u16())),
            });
        }

        Ok(body)
    }
}

fn method(verb: HttpVerb) -> Method {
    match verb {
        HttpVerb::Get => Method::GET,
        HttpVerb::Post => Method::POST,
        HttpVerb::Put => Method::PUT,
        HttpVerb::Patch => Method::PATCH,
        HttpVerb::Delete => Method::DELETE,
    }
}

impl Transport for HttpCommunication {
    type Configuration = HttpConfiguration;

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::Ethernet(self.info.clone())
    }

    fn configuration(&self) -> &HttpConfiguration {
        &self.configuration
    }

    fn set_configuration(&mut self, configuration: HttpConfiguration) {
        self.configuration = configuration;
    }

    fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let timeout = Duration::from_millis(u64::from(self.configuration.timeout_ms.max(1)));
        self.session = Some(HttpSession::new(timeout)?);
        info!(device = %self.info, "HTTP device opened");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(device = %self.info, "Closing HTTP device");
            session.shutdown();
        }
    }

    fn endpoints(&self) -> Vec<EndpointInfo> {
        if self.session.is_none() {
            return Vec::new();
        }
        vec![EndpointInfo::new(EndpointDirection::Duplex, self.info.port)]
    }

    /// `GET` the resource, copying as much of the body as fits into `buffer`
    fn read(&mut self, transfer: &TransferConfiguration, buffer: &mut [u8]) -> Result<usize> {
        let (verb, path, session) = self.request_target(transfer, buffer.len())?;
        if verb != HttpVerb::Get {
            return Err(CommunicationError::InvalidArgument(format!(
                "HTTP reads use GET, not {}",
                verb
            )));
        }

        let body = self.send(session, Method::GET, path, None)?;
        let len = body.len().min(buffer.len());
        buffer[..len].copy_from_slice(&body[..len]);
        Ok(len)
    }

    /// Send `buffer` as the request body with `POST`, `PUT`, `PATCH` or `DELETE`
    fn write(&mut self, transfer: &TransferConfiguration, buffer: &[u8]) -> Result<usize> {
        let (verb, path, session) = self.request_target(transfer, buffer.len())?;
        if verb == HttpVerb::Get {
            return Err(CommunicationError::InvalidArgument(
                "HTTP writes cannot use GET".to_string(),
            ));
        }

        self.send(session, method(verb), path, Some(buffer.to_vec()))?;
        Ok(buffer.len())
    }

    fn error_string(&self, code: i32) -> String {
        u16::try_from(code)
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .and_then(|status| status.canonical_reason())
            .map(|reason| reason.to_string())
            .unwrap_or_else(|| format!("HTTP status {}", code))
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        None
    }
}

impl Drop for HttpCommunication {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;
    use tether_core::{EthernetProtocol, MacAddress};

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    /// Serve one canned response per connection, returning the raw requests
    fn serve(responses: Vec<&'static str>) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                requests.push(read_request(&mut stream));
                stream.write_all(response.as_bytes()).unwrap();
            }
            requests
        });
        (port, handle)
    }

    fn device(port: u16) -> HttpCommunication {
        HttpCommunication::new(EthernetDeviceInfo {
            hostname: "localhost".to_string(),
            ip: "127.0.0.1".parse().unwrap(),
            mac: MacAddress([0x02, 0, 0, 0, 0, 0x01]),
            port,
            protocol: EthernetProtocol::Tcp,
        })
    }

    #[test]
    fn test_get_truncates_to_buffer() {
        let (port, server) =
            serve(vec!["HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world"]);

        let mut dev = device(port);
        dev.open().unwrap();
        let mut buf = [0u8; 5];
        let n = dev
            .read(&TransferConfiguration::http(HttpVerb::Get, "/status"), &mut buf)
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /status HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_open_and_get_inside_runtime() {
        let (port, server) =
            serve(vec!["HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"]);

        let mut dev = device(port);
        dev.open().unwrap();
        let mut buf = [0u8; 8];
        let n = dev
            .read(&TransferConfiguration::http(HttpVerb::Get, "/health"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..n], b"ok");

        // Closing and dropping inside the runtime must not panic either
        dev.close();
        dev.open().unwrap();
        drop(dev);

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /health HTTP/1.1"));
    }

    #[test]
    fn test_post_sends_body() {
        let (port, server) =
            serve(vec!["HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"]);

        let mut dev = device(port);
        dev.open().unwrap();
        let n = dev
            .write(&TransferConfiguration::http(HttpVerb::Post, "config"), b"{\"led\":1}")
            .unwrap();
        assert_eq!(n, 9);

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /config HTTP/1.1"));
        assert!(requests[0].ends_with("{\"led\":1}"));
    }

    #[test]
    fn test_non_success_status_is_native_error() {
        let (port, server) =
            serve(vec!["HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"]);

        let mut dev = device(port);
        dev.open().unwrap();
        let mut buf = [0u8; 16];
        match dev.read(&TransferConfiguration::http(HttpVerb::Get, "/missing"), &mut buf) {
            Err(CommunicationError::Native { code, message }) => {
                assert_eq!(code, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_preconditions() {
        let mut dev = device(8080);
        let mut buf = [0u8; 4];
        let get = TransferConfiguration::http(HttpVerb::Get, "/");

        assert!(matches!(dev.read(&get, &mut buf), Err(CommunicationError::NotConnected)));
        assert!(matches!(
            dev.read(&TransferConfiguration::Bulk { endpoint: 1 }, &mut buf),
            Err(CommunicationError::UnsupportedTransferKind { .. })
        ));
        assert!(dev.endpoints().is_empty());

        dev.open().unwrap();
        assert_eq!(dev.endpoints(), vec![EndpointInfo::new(EndpointDirection::Duplex, 8080)]);
        assert!(matches!(
            dev.read(&TransferConfiguration::http(HttpVerb::Get, ""), &mut buf),
            Err(CommunicationError::InvalidArgument(_))
        ));
        assert!(matches!(dev.read(&get, &mut []), Err(CommunicationError::InvalidArgument(_))));
        assert!(matches!(dev.write(&get, b"x"), Err(CommunicationError::InvalidArgument(_))));

        dev.close();
        dev.close();
        assert!(!dev.is_open());
    }

    #[test]
    fn test_error_string() {
        let dev = device(80);
        assert_eq!(dev.error_string(503), "Service Unavailable");
        assert_eq!(dev.error_string(-1), "HTTP status -1");
    }
}
