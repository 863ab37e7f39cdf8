//! # Asynchronous Loading
//!
//! Fetches run on worker threads; their results come back to the owning
//! thread and are handed to callbacks there, so callbacks may freely touch
//! `Rc`/`RefCell` state such as a backend or a program cache.
//!
//! ## How It Works
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Fetcher (owning thread)                                 │
//! │                                                          │
//! │  load_*(url, cb) ──► jobs (mpsc) ──► worker pool         │
//! │                        N threads share one queue,        │
//! │                        transport.fetch(url),             │
//! │                        send Progress / Done over mpsc    │
//! │                                                          │
//! │  rx ◄──────────────── receives messages                  │
//! │  requests ── request id → (url, callback, Progress)      │
//! └──────────────────────────────────────────────────────────┘
//!
//! Per-frame: fetcher.poll()
//!   1. Drain rx: update Progress, run callbacks of finished requests
//!   2. A transport that panicked fails only its own request, with
//!      LoadError::Disconnected; the worker keeps serving the queue
//! ```
//!
//! ## Status Codes
//!
//! A status of 200, or 0 for local files, is success. Anything else reaches
//! the callback as [`LoadError::Status`]. There are no retries and no
//! cancellation: every request ends in exactly one callback.
//!
//! ## Grouping
//!
//! [`Loader`] counts outstanding loads and fires a single completion callback
//! when all of them, and all nested loaders, have finished.

mod loader;
mod transport;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;

pub use loader::Loader;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{FileTransport, MemoryTransport, Response, Transport};

use crate::error::LoadError;

// ── Progress ────────────────────────────────────────────────────────────────

/// Bytes loaded against bytes known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressInfo {
    pub bytes_loaded: u64,
    pub bytes_total: u64,
}

impl ProgressInfo {
    /// Completed fraction in percent, 0 when nothing is known yet.
    pub fn percent(&self) -> f32 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_loaded as f64 / self.bytes_total as f64 * 100.0) as f32
    }
}

#[derive(Debug, Default)]
struct ProgressNode {
    loaded: u64,
    total: Option<u64>,
    done: bool,
    children: Vec<Progress>,
}

/// Shared progress of one request or of a group of them.
///
/// Cloning yields another handle to the same node.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    node: Rc<RefCell<ProgressNode>>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&self, child: Progress) {
        self.node.borrow_mut().children.push(child);
    }

    pub(crate) fn update(&self, loaded: u64, total: Option<u64>) {
        let mut node = self.node.borrow_mut();
        node.loaded = loaded;
        node.total = total.or(node.total);
    }

    pub(crate) fn finish(&self) {
        let mut node = self.node.borrow_mut();
        node.done = true;
        if node.total.is_none() {
            node.total = Some(node.loaded);
        }
    }

    /// Whether this node and all children are done.
    pub fn is_done(&self) -> bool {
        let node = self.node.borrow();
        node.done && node.children.iter().all(Progress::is_done)
    }

    /// Totals over this node and its children, counting only requests whose
    /// size is known.
    pub fn known(&self) -> ProgressInfo {
        let node = self.node.borrow();
        let mut info = match node.total {
            Some(total) => ProgressInfo { bytes_loaded: node.loaded, bytes_total: total },
            None => ProgressInfo::default(),
        };
        for child in &node.children {
            let c = child.known();
            info.bytes_loaded += c.bytes_loaded;
            info.bytes_total += c.bytes_total;
        }
        info
    }
}

// ── Fetcher ─────────────────────────────────────────────────────────────────

/// Worker threads a [`Fetcher`] starts unless told otherwise.
pub const DEFAULT_WORKERS: usize = 4;

struct Job {
    request: u64,
    url: String,
}

enum Message {
    Progress { request: u64, loaded: u64, total: Option<u64> },
    Done { request: u64, result: io::Result<Response> },
    Panicked { request: u64 },
}

type Callback = Box<dyn FnOnce(Result<Vec<u8>, LoadError>)>;

struct Request {
    url: String,
    on_done: Callback,
    progress: Progress,
}

/// Runs a [`Transport`] on a fixed pool of worker threads and dispatches
/// results in [`poll`](Self::poll).
///
/// Dropping the fetcher closes the job queue; workers exit once their
/// current fetch returns.
pub struct Fetcher {
    jobs: mpsc::Sender<Job>,
    rx: mpsc::Receiver<Message>,
    requests: HashMap<u64, Request>,
    next_request: u64,
}

impl Fetcher {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_workers(transport, DEFAULT_WORKERS)
    }

    /// A fetcher with `workers` threads (at least one). Requests beyond that
    /// wait in the queue in the order they were made.
    pub fn with_workers(transport: impl Transport + 'static, workers: usize) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let (jobs, job_rx) = mpsc::channel();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (tx, rx) = mpsc::channel();
        for _ in 0..workers.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let transport = Arc::clone(&transport);
            let tx = tx.clone();
            thread::spawn(move || work(&job_rx, transport.as_ref(), &tx));
        }
        Self { jobs, rx, requests: HashMap::new(), next_request: 0 }
    }

    /// Fetch raw bytes. The returned [`Progress`] tracks this request.
    pub fn load_bytes(
        &mut self,
        url: &str,
        on_done: impl FnOnce(Result<Vec<u8>, LoadError>) + 'static,
    ) -> Progress {
        let request = self.next_request;
        self.next_request += 1;

        let progress = Progress::new();
        if self.jobs.send(Job { request, url: url.to_string() }).is_err() {
            // Every worker is gone; report it from the next poll like any
            // other failure.
            log::warn!("no fetch workers left for {url}");
        }
        self.requests.insert(
            request,
            Request { url: url.to_string(), on_done: Box::new(on_done), progress: progress.clone() },
        );
        log::debug!("fetching {url}");
        progress
    }

    /// Fetch UTF-8 text.
    pub fn load_text(&mut self, url: &str, on_done: impl FnOnce(Result<String, LoadError>) + 'static) -> Progress {
        let owned = url.to_string();
        self.load_bytes(url, move |result| {
            on_done(result.and_then(|bytes| String::from_utf8(bytes).map_err(|_| LoadError::Utf8 { url: owned })))
        })
    }

    /// Fetch and deserialize JSON.
    pub fn load_json<T: DeserializeOwned + 'static>(
        &mut self,
        url: &str,
        on_done: impl FnOnce(Result<T, LoadError>) + 'static,
    ) -> Progress {
        let owned = url.to_string();
        self.load_bytes(url, move |result| {
            on_done(result.and_then(|bytes| {
                serde_json::from_slice(&bytes).map_err(|source| LoadError::Json { url: owned, source })
            }))
        })
    }

    /// Requests still waiting for their callback.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    /// Deliver everything that has arrived. Returns the number of callbacks
    /// run. Never blocks.
    pub fn poll(&mut self) -> usize {
        self.drain()
    }

    /// Block until every request has been delivered.
    pub fn wait(&mut self) {
        while !self.requests.is_empty() {
            if self.poll() > 0 {
                continue;
            }
            match self.rx.recv_timeout(Duration::from_millis(5)) {
                Ok(message) => {
                    self.handle(message);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.fail_all();
                    break;
                }
            }
        }
    }

    /// Fail every outstanding request once no worker can answer any more.
    fn fail_all(&mut self) {
        for (_, request) in self.requests.drain() {
            request.progress.finish();
            (request.on_done)(Err(LoadError::Disconnected { url: request.url }));
        }
    }

    fn drain(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    if self.handle(message) {
                        delivered += 1;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    delivered += self.requests.len();
                    self.fail_all();
                    break;
                }
            }
        }
        delivered
    }

    /// Apply one message; true when a callback ran.
    fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Progress { request, loaded, total } => {
                if let Some(r) = self.requests.get(&request) {
                    r.progress.update(loaded, total);
                }
                false
            }
            Message::Done { request, result } => {
                let Some(r) = self.requests.remove(&request) else { return false };
                r.progress.finish();
                let result = match result {
                    Ok(Response { status: 200 | 0, body }) => Ok(body),
                    Ok(Response { status, .. }) => Err(LoadError::Status { url: r.url.clone(), status }),
                    Err(source) => Err(LoadError::Io { url: r.url.clone(), source }),
                };
                if let Err(e) = &result {
                    log::warn!("{e}");
                }
                (r.on_done)(result);
                true
            }
            Message::Panicked { request } => {
                let Some(r) = self.requests.remove(&request) else { return false };
                log::warn!("fetch of {} panicked", r.url);
                r.progress.finish();
                (r.on_done)(Err(LoadError::Disconnected { url: r.url }));
                true
            }
        }
    }
}

/// Worker loop: take jobs until the queue closes or the fetcher is gone.
fn work(jobs: &Mutex<mpsc::Receiver<Job>>, transport: &dyn Transport, tx: &mpsc::Sender<Message>) {
    loop {
        let job = match jobs.lock() {
            Ok(queue) => queue.recv(),
            Err(_) => return,
        };
        let Ok(Job { request, url }) = job else { return };

        let fetched = panic::catch_unwind(AssertUnwindSafe(|| {
            transport.fetch(&url, &mut |loaded, total| {
                let _ = tx.send(Message::Progress { request, loaded, total });
            })
        }));
        let message = match fetched {
            Ok(result) => Message::Done { request, result },
            Err(_) => Message::Panicked { request },
        };
        if tx.send(message).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Settings {
        speed: f32,
    }

    fn collect<T: 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnOnce(T) + 'static) {
        let out = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&out);
        (out, move |v| sink.borrow_mut().push(v))
    }

    #[test]
    fn text_json_and_status_errors() {
        let transport = MemoryTransport::new()
            .with_text("a.txt", "hello")
            .with_text("s.json", r#"{ "speed": 2.5 }"#)
            .with_response("gone", 410, "")
            .with_bytes("bad", vec![0xff, 0xfe]);
        let mut fetcher = Fetcher::new(transport);

        let (text, on_text) = collect();
        fetcher.load_text("a.txt", on_text);
        let (json, on_json) = collect();
        fetcher.load_json::<Settings>("s.json", on_json);
        let (gone, on_gone) = collect();
        fetcher.load_bytes("gone", on_gone);
        let (bad, on_bad) = collect();
        fetcher.load_text("bad", on_bad);
        assert_eq!(fetcher.pending(), 4);

        fetcher.wait();
        assert_eq!(fetcher.pending(), 0);
        assert_eq!(text.borrow()[0].as_deref().unwrap(), "hello");
        assert_eq!(json.borrow()[0].as_ref().unwrap(), &Settings { speed: 2.5 });
        assert!(matches!(gone.borrow()[0], Err(LoadError::Status { status: 410, .. })));
        assert!(matches!(bad.borrow()[0], Err(LoadError::Utf8 { .. })));
    }

    #[test]
    fn file_status_zero_is_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shader.wgsl"), "// empty").unwrap();
        let mut fetcher = Fetcher::new(FileTransport::new(dir.path()));
        let (out, on_done) = collect();
        let progress = fetcher.load_text("shader.wgsl", on_done);
        let (missing, on_missing) = collect();
        fetcher.load_text("missing.wgsl", on_missing);
        fetcher.wait();

        assert_eq!(out.borrow()[0].as_deref().unwrap(), "// empty");
        assert!(matches!(missing.borrow()[0], Err(LoadError::Io { .. })));
        assert!(progress.is_done());
        assert_eq!(progress.known(), ProgressInfo { bytes_loaded: 8, bytes_total: 8 });
    }

    #[test]
    fn progress_sums_children_with_known_sizes() {
        let root = Progress::new();
        let a = Progress::new();
        let b = Progress::new();
        let c = Progress::new();
        root.add_child(a.clone());
        root.add_child(b.clone());
        root.add_child(c.clone());
        root.finish();

        a.update(50, Some(100));
        b.update(10, Some(300));
        c.update(5, None);
        assert_eq!(root.known(), ProgressInfo { bytes_loaded: 60, bytes_total: 400 });
        assert_eq!(root.known().percent(), 15.0);
        assert!(!root.is_done());

        for p in [&a, &b, &c] {
            p.finish();
        }
        assert!(root.is_done());
        assert_eq!(root.known().bytes_total, 405);
    }

    struct Panicking;

    impl Transport for Panicking {
        fn fetch(&self, _url: &str, _progress: &mut dyn FnMut(u64, Option<u64>)) -> io::Result<Response> {
            panic!("transport failure");
        }
    }

    #[test]
    fn panicking_transport_reports_disconnected() {
        let mut fetcher = Fetcher::new(Panicking);
        let (out, on_done) = collect();
        fetcher.load_bytes("x", on_done);
        fetcher.wait();
        assert!(matches!(out.borrow()[0], Err(LoadError::Disconnected { .. })));
    }

    /// Panics on "boom", answers everything else with its own URL.
    struct Echo;

    impl Transport for Echo {
        fn fetch(&self, url: &str, _progress: &mut dyn FnMut(u64, Option<u64>)) -> io::Result<Response> {
            if url == "boom" {
                panic!("transport failure");
            }
            Ok(Response { status: 200, body: url.as_bytes().to_vec() })
        }
    }

    #[test]
    fn single_worker_serves_the_queue_in_order() {
        let mut fetcher = Fetcher::with_workers(Echo, 1);
        let order = Rc::new(RefCell::new(Vec::new()));
        let urls: Vec<String> = (0..16).map(|i| format!("req{i}")).collect();
        for url in &urls {
            let order = Rc::clone(&order);
            fetcher.load_text(url, move |r| order.borrow_mut().push(r.unwrap_or_default()));
        }
        assert_eq!(fetcher.pending(), 16);
        fetcher.wait();
        assert_eq!(*order.borrow(), urls);
    }

    #[test]
    fn worker_survives_a_panicking_fetch() {
        let mut fetcher = Fetcher::with_workers(Echo, 1);
        let (first, on_first) = collect();
        fetcher.load_text("boom", on_first);
        let (second, on_second) = collect();
        fetcher.load_text("after", on_second);
        fetcher.wait();
        assert!(matches!(first.borrow()[0], Err(LoadError::Disconnected { .. })));
        assert_eq!(second.borrow()[0].as_deref().unwrap(), "after");
    }
}
