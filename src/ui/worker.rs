// Blocking loads run off the UI thread and report back over a channel

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use log::{debug, error};

use crate::cache::{SessionStore, read_session_file};
use crate::errors::BoxboxError;
use crate::loader::SessionLoader;
use crate::provider::SessionProvider;
use crate::session::{EventInfo, Session, SessionKey};

pub(crate) enum LoadRequest {
    Session(SessionKey),
    Refresh(SessionKey),
    Events(i32),
    File(PathBuf),
}

pub(crate) enum LoadResult {
    Session(Result<Arc<Session>, BoxboxError>),
    Events {
        year: i32,
        events: Result<Vec<EventInfo>, BoxboxError>,
    },
}

pub(crate) struct LoadWorker<P, S> {
    loader: Arc<SessionLoader<P, S>>,
    results_tx: Sender<LoadResult>,
    results_rx: Receiver<LoadResult>,
    pending: usize,
}

impl<P, S> LoadWorker<P, S>
where
    P: SessionProvider + 'static,
    S: SessionStore + 'static,
{
    pub(crate) fn new(loader: Arc<SessionLoader<P, S>>) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            loader,
            results_tx,
            results_rx,
            pending: 0,
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.pending > 0
    }

    /// Run a request on its own thread. `ctx` is repainted once the result is
    /// ready so the UI picks it up without polling.
    pub(crate) fn submit(&mut self, request: LoadRequest, ctx: &egui::Context) {
        let loader = self.loader.clone();
        let results_tx = self.results_tx.clone();
        let ctx = ctx.clone();
        self.pending += 1;
        thread::spawn(move || {
            let result = match request {
                LoadRequest::Session(key) => LoadResult::Session(loader.load(&key)),
                LoadRequest::Refresh(key) => LoadResult::Session(loader.refresh(&key)),
                LoadRequest::Events(year) => LoadResult::Events {
                    year,
                    events: loader.list_events(year),
                },
                LoadRequest::File(path) => {
                    LoadResult::Session(read_session_file(&path).map(Arc::new))
                }
            };
            if results_tx.send(result).is_err() {
                debug!("Dashboard closed before the load finished");
            }
            ctx.request_repaint();
        });
    }

    /// Results that arrived since the last call
    pub(crate) fn poll(&mut self) -> Vec<LoadResult> {
        let results: Vec<LoadResult> = self.results_rx.try_iter().collect();
        self.pending = self.pending.saturating_sub(results.len());
        for result in &results {
            if let LoadResult::Session(Err(e)) = result {
                error!("Loading failed: {}", e);
            }
        }
        results
    }
}
