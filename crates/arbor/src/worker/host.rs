//! The evaluation worker thread and its caller-side handle.

use std::{
    collections::BTreeMap,
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use scopeguard::guard;
use tracing::{info, warn};

use super::{
    protocol::{RequestBody, WorkerRequest, WorkerResponse},
    session::EvalSession,
};
use crate::error::{Error, Result};

/// Handle to a worker thread that owns an [`EvalSession`].
///
/// Requests are handled one at a time in the order sent. Responses carry
/// the request id; [`EvalWorker::call`] waits for its own id and holds on to
/// responses for other ids until they are asked for.
#[derive(Debug)]
pub struct EvalWorker {
    /// Request channel; `None` once stopped.
    tx: Option<Sender<WorkerRequest>>,
    /// Response channel.
    rx: Receiver<WorkerResponse>,
    /// Responses received while waiting for another id.
    pending: BTreeMap<String, WorkerResponse>,
    /// Next request id.
    next_id: u64,
    /// Worker thread.
    handle: Option<thread::JoinHandle<()>>,
}

impl EvalWorker {
    /// Move `session` onto a new thread.
    pub fn spawn(session: EvalSession) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<WorkerRequest>();
        let (resp_tx, resp_rx) = mpsc::channel::<WorkerResponse>();
        let handle = thread::spawn(move || {
            info!("evaluation worker started");
            // Dispose on every exit path, including a panicking handler.
            let mut session = guard(session, |mut s| {
                s.dispose();
                info!("evaluation worker stopped");
            });
            while let Ok(req) = req_rx.recv() {
                let resp = session.handle(&req);
                if resp_tx.send(resp).is_err() {
                    break;
                }
            }
        });
        Self {
            tx: Some(req_tx),
            rx: resp_rx,
            pending: BTreeMap::new(),
            next_id: 0,
            handle: Some(handle),
        }
    }

    /// Queue a request and return its id without waiting.
    pub fn send(&mut self, body: RequestBody) -> Result<String> {
        self.next_id += 1;
        let id = self.next_id.to_string();
        self.tx
            .as_ref()
            .ok_or_else(|| Error::Worker("evaluation worker stopped".into()))?
            .send(WorkerRequest::new(id.clone(), body))
            .map_err(|e| Error::Worker(e.to_string()))?;
        Ok(id)
    }

    /// Wait for the response to request `id`.
    pub fn wait(&mut self, id: &str) -> Result<WorkerResponse> {
        if let Some(resp) = self.pending.remove(id) {
            return Ok(resp);
        }
        loop {
            let resp = self.rx.recv()?;
            if resp.request_id == id {
                return Ok(resp);
            }
            self.pending.insert(resp.request_id.clone(), resp);
        }
    }

    /// Send a request and wait for its response.
    pub fn call(&mut self, body: RequestBody) -> Result<WorkerResponse> {
        let id = self.send(body)?;
        self.wait(&id)
    }

    /// Stop the worker after it drains queued requests.
    pub fn shutdown(mut self) {
        self.stop();
    }

    /// Close the request channel and join the thread.
    fn stop(&mut self) {
        self.tx.take();
        if let Some(h) = self.handle.take()
            && h.join().is_err()
        {
            warn!("evaluation worker panicked");
        }
    }
}

impl Drop for EvalWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
