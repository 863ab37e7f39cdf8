//! Blocking byte sources that [`Fetcher`](super::Fetcher) runs on worker
//! threads.
//!
//! | Transport | Status | Use |
//! |---|---|---|
//! | [`FileTransport`] | always 0 | assets on disk |
//! | `HttpTransport` | the server's | assets behind a URL (feature `http`) |
//! | [`MemoryTransport`] | as configured | tests, embedded assets |

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

/// Status code and body of a finished fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP-style status. File reads report 0, like `file://` requests.
    pub status: u16,
    pub body: Vec<u8>,
}

/// Something that can turn a URL into bytes.
///
/// `progress` receives `(bytes_loaded, bytes_total)` as the body arrives;
/// the total is `None` when unknown.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> io::Result<Response>;
}

const CHUNK: usize = 64 * 1024;

/// Reads URLs as paths below a root directory. A `file://` prefix is
/// stripped.
#[derive(Debug, Clone)]
pub struct FileTransport {
    root: PathBuf,
}

impl FileTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Transport for FileTransport {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> io::Result<Response> {
        let path = self.root.join(url.trim_start_matches("file://"));
        let mut file = File::open(&path)?;
        let total = file.metadata()?.len();
        progress(0, Some(total));

        let mut body = Vec::with_capacity(total as usize);
        let mut chunk = vec![0; CHUNK];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
            progress(body.len() as u64, Some(total));
        }
        Ok(Response { status: 0, body })
    }
}

/// Fetches over HTTP(S) with a blocking `reqwest` client.
///
/// Relative URLs are joined onto the base given at construction; absolute
/// `http://` or `https://` URLs are used as they are. The server's status is
/// passed through, so [`Fetcher`](super::Fetcher) decides what a 404 means.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// A transport with a five minute request timeout.
    pub fn new(base_url: impl Into<String>) -> io::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(io::Error::other)?;
        Ok(Self::with_client(base_url, client))
    }

    /// Use a preconfigured client (proxies, headers, TLS roots).
    pub fn with_client(base_url: impl Into<String>, client: reqwest::blocking::Client) -> Self {
        Self { base_url: base_url.into(), client }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") || self.base_url.is_empty() {
            return url.to_string();
        }
        format!("{}/{}", self.base_url.trim_end_matches('/'), url.trim_start_matches('/'))
    }
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> io::Result<Response> {
        let mut response = self.client.get(self.resolve(url)).send().map_err(io::Error::other)?;
        let status = response.status().as_u16();
        let total = response.content_length();
        progress(0, total);

        let mut body = Vec::with_capacity(total.unwrap_or(0).min(CHUNK as u64 * 16) as usize);
        let mut chunk = vec![0; CHUNK];
        loop {
            let n = response.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
            progress(body.len() as u64, total);
        }
        log::debug!("{url}: status {status}, {} bytes", body.len());
        Ok(Response { status, body })
    }
}

/// A fixed table of responses. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    entries: HashMap<String, Response>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(url.to_string(), Response { status, body: body.into() });
        self
    }

    pub fn with_bytes(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.with_response(url, 200, body)
    }

    pub fn with_text(self, url: &str, text: &str) -> Self {
        self.with_response(url, 200, text.as_bytes())
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> io::Result<Response> {
        let response = self
            .entries
            .get(url)
            .cloned()
            .unwrap_or_else(|| Response { status: 404, body: Vec::new() });
        let len = response.body.len() as u64;
        progress(len, Some(len));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_transport_reports_status_zero_and_progress() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), vec![b'x'; CHUNK + 10]).unwrap();
        let transport = FileTransport::new(dir.path());

        let mut seen = Vec::new();
        let response = transport.fetch("file://a.txt", &mut |loaded, total| seen.push((loaded, total))).unwrap();
        assert_eq!(response.status, 0);
        assert_eq!(response.body.len(), CHUNK + 10);
        let total = Some((CHUNK + 10) as u64);
        assert_eq!(seen.first(), Some(&(0, total)));
        assert_eq!(seen.last(), Some(&((CHUNK + 10) as u64, total)));

        let missing = transport.fetch("nope.txt", &mut |_, _| {}).unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(feature = "http")]
    mod http {
        use std::cell::RefCell;
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpListener;
        use std::rc::Rc;
        use std::thread;

        use super::super::*;
        use crate::error::LoadError;
        use crate::io::Fetcher;

        /// Serves `requests` connections: `/ok` answers 200 with a body,
        /// anything else 404.
        fn serve(requests: usize) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            thread::spawn(move || {
                for stream in listener.incoming().take(requests) {
                    let mut stream = stream.unwrap();
                    let mut reader = BufReader::new(stream.try_clone().unwrap());
                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).unwrap();
                    loop {
                        let mut header = String::new();
                        if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                            break;
                        }
                    }
                    let (status, body) = match request_line.starts_with("GET /ok ") {
                        true => ("200 OK", "shader source"),
                        false => ("404 Not Found", ""),
                    };
                    write!(
                        stream,
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    )
                    .unwrap();
                }
            });
            format!("http://{addr}")
        }

        fn transport(base: &str) -> HttpTransport {
            let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
            HttpTransport::with_client(base, client)
        }

        #[test]
        fn passes_the_server_status_through() {
            let base = serve(2);
            let http = transport(&base);
            let ok = http.fetch("ok", &mut |_, _| {}).unwrap();
            assert_eq!(ok.status, 200);
            assert_eq!(ok.body, b"shader source");
            assert_eq!(http.fetch(&format!("{base}/missing"), &mut |_, _| {}).unwrap().status, 404);
        }

        #[test]
        fn fetcher_maps_200_to_success_and_404_to_status_error() {
            let base = serve(2);
            let mut fetcher = Fetcher::with_workers(transport(&base), 1);
            let results = Rc::new(RefCell::new(Vec::new()));
            for url in ["ok", "missing"] {
                let results = Rc::clone(&results);
                fetcher.load_text(url, move |r| results.borrow_mut().push(r));
            }
            fetcher.wait();

            let results = results.borrow();
            assert_eq!(results[0].as_deref().unwrap(), "shader source");
            assert!(matches!(&results[1], Err(LoadError::Status { status: 404, url }) if url == "missing"));
        }
    }

    #[test]
    fn memory_transport_answers_404_for_unknown_urls() {
        let transport = MemoryTransport::new().with_text("a", "hi").with_response("b", 500, "boom");
        assert_eq!(transport.fetch("a", &mut |_, _| {}).unwrap().body, b"hi");
        assert_eq!(transport.fetch("b", &mut |_, _| {}).unwrap().status, 500);
        assert_eq!(transport.fetch("c", &mut |_, _| {}).unwrap().status, 404);
    }
}
