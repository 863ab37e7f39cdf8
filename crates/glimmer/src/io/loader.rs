use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::de::DeserializeOwned;

use super::{Fetcher, Progress};
use crate::error::LoadError;

struct LoaderState {
    count: usize,
    on_finished: Option<Box<dyn FnOnce()>>,
}

fn count_down(state: &Rc<RefCell<LoaderState>>) {
    let on_finished = {
        let mut s = state.borrow_mut();
        s.count = s.count.saturating_sub(1);
        if s.count == 0 { s.on_finished.take() } else { None }
    };
    if let Some(on_finished) = on_finished {
        on_finished();
    }
}

/// Groups loads and fires one callback when all of them are done.
///
/// The count starts at 1 so that completion cannot fire while loads are
/// still being queued; call [`finish`](Self::finish) after queuing the last
/// one. An empty loader completes on `finish`.
///
/// ```no_run
/// # use glimmer::io::{Fetcher, FileTransport, Loader};
/// let mut fetcher = Fetcher::new(FileTransport::new("assets"));
/// let loader = Loader::new(|| log::info!("all assets loaded"));
/// loader.load_text(&mut fetcher, "shaders/sky.vs.wgsl", |src| { /* ... */ });
/// loader.load_text(&mut fetcher, "shaders/sky.fs.wgsl", |src| { /* ... */ });
/// loader.finish();
/// fetcher.wait();
/// ```
pub struct Loader {
    state: Rc<RefCell<LoaderState>>,
    progress: Progress,
    finished: Cell<bool>,
}

impl Loader {
    pub fn new(on_finished: impl FnOnce() + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(LoaderState { count: 1, on_finished: Some(Box::new(on_finished)) })),
            progress: Progress::new(),
            finished: Cell::new(false),
        }
    }

    /// Outstanding loads, including the initial count until `finish`.
    pub fn pending(&self) -> usize {
        self.state.borrow().count
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    fn begin(&self) -> Rc<RefCell<LoaderState>> {
        self.state.borrow_mut().count += 1;
        Rc::clone(&self.state)
    }

    pub fn load_bytes(
        &self,
        fetcher: &mut Fetcher,
        url: &str,
        on_loaded: impl FnOnce(Result<Vec<u8>, LoadError>) + 'static,
    ) {
        let state = self.begin();
        let child = fetcher.load_bytes(url, move |result| {
            on_loaded(result);
            count_down(&state);
        });
        self.progress.add_child(child);
    }

    pub fn load_text(
        &self,
        fetcher: &mut Fetcher,
        url: &str,
        on_loaded: impl FnOnce(Result<String, LoadError>) + 'static,
    ) {
        let state = self.begin();
        let child = fetcher.load_text(url, move |result| {
            on_loaded(result);
            count_down(&state);
        });
        self.progress.add_child(child);
    }

    pub fn load_json<T: DeserializeOwned + 'static>(
        &self,
        fetcher: &mut Fetcher,
        url: &str,
        on_loaded: impl FnOnce(Result<T, LoadError>) + 'static,
    ) {
        let state = self.begin();
        let child = fetcher.load_json(url, move |result| {
            on_loaded(result);
            count_down(&state);
        });
        self.progress.add_child(child);
    }

    /// A nested loader. Its own callback runs first, then it counts as one
    /// finished load of this loader.
    pub fn create_child(&self, on_finished: impl FnOnce() + 'static) -> Loader {
        let state = self.begin();
        let child = Loader::new(move || {
            on_finished();
            count_down(&state);
        });
        self.progress.add_child(child.progress.clone());
        child
    }

    /// Drop the initial count: no more loads will be queued. Later calls do
    /// nothing.
    pub fn finish(&self) {
        if self.finished.replace(true) {
            return;
        }
        self.progress.finish();
        count_down(&self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryTransport;

    fn counter() -> (Rc<Cell<u32>>, impl FnOnce() + 'static) {
        let fired = Rc::new(Cell::new(0));
        let inc = Rc::clone(&fired);
        (fired, move || inc.set(inc.get() + 1))
    }

    #[test]
    fn empty_loader_completes_once_on_finish() {
        let (fired, on_finished) = counter();
        let loader = Loader::new(on_finished);
        assert_eq!(fired.get(), 0);
        loader.finish();
        assert_eq!(fired.get(), 1);
        loader.finish();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn repeated_finish_does_not_release_pending_loads() {
        let mut fetcher = Fetcher::new(MemoryTransport::new().with_text("a", "1"));
        let (fired, on_finished) = counter();
        let loader = Loader::new(on_finished);
        loader.load_text(&mut fetcher, "a", |_| {});
        loader.finish();
        loader.finish();
        loader.finish();
        assert_eq!(loader.pending(), 1);
        assert_eq!(fired.get(), 0);

        fetcher.wait();
        assert_eq!(loader.pending(), 0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn completion_waits_for_every_load_and_child() {
        let transport = MemoryTransport::new().with_text("a", "1").with_text("b", "2").with_text("c", "3");
        let mut fetcher = Fetcher::new(transport);
        let (fired, on_finished) = counter();
        let loader = Loader::new(on_finished);

        let texts = Rc::new(RefCell::new(Vec::new()));
        for url in ["a", "b"] {
            let texts = Rc::clone(&texts);
            loader.load_text(&mut fetcher, url, move |r| texts.borrow_mut().push(r.unwrap_or_default()));
        }
        let (child_fired, on_child) = counter();
        let child = loader.create_child(on_child);
        child.load_text(&mut fetcher, "c", |_| {});
        loader.finish();
        assert_eq!(loader.pending(), 3);

        fetcher.wait();
        assert_eq!(fired.get(), 0, "child not finished yet");
        child.finish();
        assert_eq!(child_fired.get(), 1);
        assert_eq!(fired.get(), 1);
        assert_eq!(texts.borrow().len(), 2);
        assert!(loader.progress().is_done());
    }

    #[test]
    fn failed_loads_still_count_down() {
        let mut fetcher = Fetcher::new(MemoryTransport::new());
        let (fired, on_finished) = counter();
        let loader = Loader::new(on_finished);
        let failed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&failed);
        loader.load_bytes(&mut fetcher, "missing", move |r| flag.set(r.is_err()));
        loader.finish();
        fetcher.wait();
        assert!(failed.get());
        assert_eq!(fired.get(), 1);
    }
}
