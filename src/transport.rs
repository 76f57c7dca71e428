use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};

use rustls::pki_types::ServerName;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::{timeout, timeout_at},
};
use tokio_rustls::TlsConnector;
use url::{Host, Url};

use crate::{
    config::{ACCEPT_ENCODING, BROWSER_HEADERS, CONNECT_TIMEOUT, TRANSFER_TIMEOUT, USER_AGENT},
    exchange::parse_header_block,
    target::RequestTarget,
    tls::{self, CertInfo},
    Error, Result,
};

const MAX_HEADERS: usize = 128;

trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// What goes on the wire besides the target itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Do not advertise any content encoding
    pub plaintext: bool,
    /// Skip certificate verification
    pub insecure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "HTTP"),
            Scheme::Https => write!(f, "HTTPS"),
        }
    }
}

/// Cumulative phase timestamps in microseconds, non-decreasing in field order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub namelookup: u64,
    pub connect: u64,
    pub appconnect: u64,
    pub pretransfer: u64,
    pub starttransfer: u64,
    pub total: u64,
}

/// Durations of the individual phases, derived from [`Timings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub tcp_handshake: u64,
    pub tls_handshake: u64,
    pub time_to_first_byte: u64,
    pub transfer: u64,
}

impl Timings {
    pub fn phases(&self) -> Phases {
        Phases {
            tcp_handshake: self.connect.saturating_sub(self.namelookup),
            tls_handshake: self.appconnect.saturating_sub(self.connect),
            time_to_first_byte: self.starttransfer.saturating_sub(self.pretransfer),
            transfer: self.total.saturating_sub(self.starttransfer),
        }
    }
}

/// Everything the transport learned about one exchange.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub status_line: String,
    pub scheme: Scheme,
    pub http_version: String,
    pub local: SocketAddr,
    pub remote: SocketAddr,
    /// Absolute target of a 3xx response carrying a `Location` header
    pub redirect_url: Option<String>,
    /// Length of the header block at the start of `raw`, blank line included
    pub header_size: usize,
    /// Header block followed by the body with any chunked framing removed
    pub raw: Vec<u8>,
    pub size_download: u64,
    /// Bytes per second over the whole exchange
    pub speed_download: f64,
    pub certs: Vec<CertInfo>,
    pub timings: Timings,
}

struct Clock(Instant);

impl Clock {
    fn micros(&self) -> u64 {
        self.0.elapsed().as_micros() as u64
    }
}

/// Perform one GET request without following redirects.
pub async fn fetch(target: &RequestTarget, options: RequestOptions) -> Result<Transfer> {
    let url = target.url();
    let clock = Clock(Instant::now());
    let deadline = tokio::time::Instant::now() + CONNECT_TIMEOUT;
    let timed_out = || {
        Error::Transport(format!(
            "Connection timed out after {} milliseconds",
            CONNECT_TIMEOUT.as_millis()
        ))
    };

    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::Transport(format!("No port known for {}", url)))?;
    let (server, remote) = timeout_at(deadline, resolve(url, port))
        .await
        .map_err(|_| timed_out())??;
    let namelookup = clock.micros();
    log::debug!("Resolved {} to {} in {} μs", server, remote, namelookup);

    let tcp = timeout_at(deadline, TcpStream::connect(remote))
        .await
        .map_err(|_| timed_out())?
        .map_err(|e| Error::Transport(format!("Failed to connect to {}: {}", remote, e)))?;
    let connect = clock.micros();
    let local = tcp.local_addr()?;
    log::debug!("Connected {} -> {}", local, remote);

    let (mut stream, certs, scheme) = if target.is_https() {
        let config = tls::client_config(options.insecure)?;
        let server_name = ServerName::try_from(server.clone())
            .map_err(|e| Error::Transport(format!("Invalid server name {}: {}", server, e)))?;
        let tls_stream = timeout_at(
            deadline,
            TlsConnector::from(Arc::new(config)).connect(server_name, tcp),
        )
        .await
        .map_err(|_| timed_out())?
        .map_err(|e| Error::Transport(format!("TLS handshake with {} failed: {}", server, e)))?;
        let certs = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .map(tls::describe_chain)
            .unwrap_or_default();
        let stream: Box<dyn Connection> = Box::new(tls_stream);
        (stream, certs, Scheme::Https)
    } else {
        let stream: Box<dyn Connection> = Box::new(tcp);
        (stream, Vec::new(), Scheme::Http)
    };
    let appconnect = clock.micros();

    let request = build_request(url, options.plaintext);
    let pretransfer = clock.micros();
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::Transport(format!("Failed to send request: {}", e)))?;
    stream.flush().await?;

    let (head, mut raw, starttransfer) =
        timeout(TRANSFER_TIMEOUT, read_response(&mut stream, &clock))
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "Operation timed out after {} milliseconds",
                    TRANSFER_TIMEOUT.as_millis()
                ))
            })??;
    let total = clock.micros();

    let headers = parse_header_block(&raw[..head.size]);
    let mut body = raw.split_off(head.size);
    match head.body {
        BodyLength::Exact(len) => body.truncate(len),
        BodyLength::Chunked => body = decode_chunked(&body),
        BodyLength::UntilClose => {}
    }
    let size_download = body.len() as u64;
    let speed_download = if total > 0 {
        size_download as f64 * 1_000_000.0 / total as f64
    } else {
        0.0
    };

    let redirect_url = if (300..400).contains(&head.status) {
        headers
            .get("location")
            .filter(|location| !location.is_empty())
            .and_then(|location| match url.join(location) {
                Ok(next) => Some(next.to_string()),
                Err(e) => {
                    log::warn!("Ignoring unusable Location {:?}: {}", location, e);
                    None
                }
            })
    } else {
        None
    };
    raw.extend_from_slice(&body);

    Ok(Transfer {
        url: target.as_str().to_string(),
        method: "GET".to_string(),
        status: head.status,
        status_line: head.status_line,
        scheme,
        http_version: head.version,
        local,
        remote,
        redirect_url,
        header_size: head.size,
        raw,
        size_download,
        speed_download,
        certs,
        timings: Timings {
            namelookup,
            connect,
            appconnect,
            pretransfer,
            starttransfer,
            total,
        },
    })
}

/// Resolve the host of `url`, returning the name to present in TLS and the first address.
async fn resolve(url: &Url, port: u16) -> Result<(String, SocketAddr)> {
    match url.host() {
        Some(Host::Ipv4(ip)) => Ok((ip.to_string(), SocketAddr::new(IpAddr::V4(ip), port))),
        Some(Host::Ipv6(ip)) => Ok((ip.to_string(), SocketAddr::new(IpAddr::V6(ip), port))),
        Some(Host::Domain(domain)) => {
            let addr = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| Error::Transport(format!("Could not resolve host {}: {}", domain, e)))?
                .next()
                .ok_or_else(|| Error::Transport(format!("Could not resolve host {}", domain)))?;
            Ok((domain.to_string(), addr))
        }
        None => Err(Error::Transport(format!("No host in {}", url))),
    }
}

fn build_request(url: &Url, plaintext: bool) -> String {
    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    let mut host = url.host_str().unwrap_or_default().to_string();
    if let Some(port) = url.port() {
        host.push_str(&format!(":{}", port));
    }
    let mut request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\n",
        path, host, USER_AGENT
    );
    if !plaintext {
        request.push_str(&format!("Accept-Encoding: {}\r\n", ACCEPT_ENCODING));
    }
    for (name, value) in BROWSER_HEADERS {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("Connection: close\r\n\r\n");
    request
}

/// How the end of a response body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyLength {
    Exact(usize),
    Chunked,
    UntilClose,
}

/// A parsed response head.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Head {
    /// Bytes up to and including the blank line
    size: usize,
    status: u16,
    status_line: String,
    version: String,
    body: BodyLength,
}

impl Head {
    fn is_interim(&self) -> bool {
        (100..200).contains(&self.status)
    }

    fn is_complete(&self, body: &[u8]) -> bool {
        match self.body {
            BodyLength::Exact(len) => body.len() >= len,
            BodyLength::Chunked => walk_chunks(body, |_| {}) != Framing::Partial,
            BodyLength::UntilClose => false,
        }
    }
}

/// Parse the response head at the start of `data`; `None` until the blank line has arrived.
fn parse_head(data: &[u8]) -> Result<Option<Head>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let mut config = httparse::ParserConfig::default();
    config
        .allow_spaces_after_header_name_in_responses(true)
        .allow_obsolete_multiline_headers_in_responses(true);
    let size = match config.parse_response(&mut response, data) {
        Ok(httparse::Status::Complete(size)) => size,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(Error::Transport(format!("Malformed response: {}", e))),
    };

    let status = response.code.unwrap_or_default();
    let mut chunked = false;
    let mut transfer_encoded = false;
    let mut content_length = None;
    for header in response.headers.iter() {
        let value = String::from_utf8_lossy(header.value);
        if header.name.eq_ignore_ascii_case("transfer-encoding") {
            transfer_encoded = true;
            chunked |= value.to_ascii_lowercase().contains("chunked");
        } else if header.name.eq_ignore_ascii_case("content-length") {
            content_length = Some(value.trim().to_string());
        }
    }
    let bad_length = || Error::Transport("Malformed response: bad Content-Length".to_string());
    let body = if (100..200).contains(&status) || status == 204 || status == 304 {
        BodyLength::Exact(0)
    } else if chunked {
        BodyLength::Chunked
    } else if transfer_encoded {
        BodyLength::UntilClose
    } else if let Some(length) = content_length {
        let length: usize = length.parse().map_err(|_| bad_length())?;
        size.checked_add(length).ok_or_else(bad_length)?;
        BodyLength::Exact(length)
    } else {
        BodyLength::UntilClose
    };

    let status_line = String::from_utf8_lossy(&data[..size])
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(Some(Head {
        size,
        status,
        status_line,
        version: format!("1.{}", response.version.unwrap_or(1)),
        body,
    }))
}

/// Read one response, skipping interim `1xx` heads.
///
/// Stops at EOF or once the body framing of the final head is satisfied. Returns that head, the
/// bytes starting at it and the time the first byte came in.
async fn read_response(
    stream: &mut Box<dyn Connection>,
    clock: &Clock,
) -> Result<(Head, Vec<u8>, u64)> {
    let mut raw = Vec::new();
    let mut buf = vec![0u8; 16 * 1024];
    let mut starttransfer = None;
    let mut head: Option<Head> = None;
    let mut received = false;
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            // Plenty of servers drop TLS connections without close_notify
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && received => 0,
            Err(e) => return Err(Error::Transport(format!("Failed to receive response: {}", e))),
        };
        if n == 0 {
            break;
        }
        received = true;
        starttransfer.get_or_insert_with(|| clock.micros());
        raw.extend_from_slice(&buf[..n]);

        while head.is_none() {
            match parse_head(&raw)? {
                Some(interim) if interim.is_interim() => {
                    log::debug!("Skipping interim response: {}", interim.status_line);
                    raw.drain(..interim.size);
                }
                Some(last) => head = Some(last),
                None => break,
            }
        }
        if let Some(head) = &head {
            if head.is_complete(&raw[head.size..]) {
                break;
            }
        }
    }

    let starttransfer = starttransfer.unwrap_or_else(|| clock.micros());
    match head {
        Some(head) => Ok((head, raw, starttransfer)),
        None if received => Err(Error::Transport(
            "Malformed response: no end of headers".to_string(),
        )),
        None => Err(Error::Transport("Empty reply from server".to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Complete,
    Partial,
    Malformed,
}

/// Walk chunked framing, handing every piece of chunk data to `sink`.
fn walk_chunks(body: &[u8], mut sink: impl FnMut(&[u8])) -> Framing {
    let mut pos = 0;
    loop {
        let (line_len, size) = match httparse::parse_chunk_size(&body[pos..]) {
            Ok(httparse::Status::Complete(parsed)) => parsed,
            Ok(httparse::Status::Partial) => return Framing::Partial,
            Err(_) => return Framing::Malformed,
        };
        pos += line_len;
        if size == 0 {
            let mut trailers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            return match httparse::parse_headers(&body[pos..], &mut trailers) {
                Ok(httparse::Status::Complete(_)) => Framing::Complete,
                Ok(httparse::Status::Partial) => Framing::Partial,
                Err(_) => Framing::Malformed,
            };
        }
        let rest = &body[pos..];
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        if rest.len() < size {
            sink(rest);
            return Framing::Partial;
        }
        sink(&rest[..size]);
        match rest.get(size..size + 2) {
            Some(crlf) if crlf == b"\r\n" => pos += size + 2,
            Some(_) => return Framing::Malformed,
            None => return Framing::Partial,
        }
    }
}

/// Strip chunked transfer framing. Broken framing keeps whatever was decoded so far.
fn decode_chunked(body: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(body.len());
    match walk_chunks(body, |data| decoded.extend_from_slice(data)) {
        Framing::Complete => {}
        Framing::Partial => log::warn!("Chunked body ended before its last chunk"),
        Framing::Malformed => log::warn!("Malformed chunked framing"),
    }
    decoded
}
