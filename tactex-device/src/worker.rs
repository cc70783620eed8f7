//! Background force sampling with an explicit start/join handoff.
//!
//! The trial loop calls [`SamplingWorker::start`] right after sending a tap,
//! carries on with its own timing, then calls [`SamplingWorker::join`] which
//! blocks until the window has been fully read. Both channels hold a single
//! item, so at most one window is ever in flight.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tactex_timing::Timer;
use tracing::debug;

use crate::force::{ForceReading, ForceSampler};
use crate::WorkerError;

enum Request {
    Sample(Duration),
    Clear,
}

pub struct SamplingWorker {
    requests: Option<SyncSender<Request>>,
    results: Receiver<Option<ForceReading>>,
    handle: Option<JoinHandle<()>>,
    connected: bool,
    in_flight: bool,
}

impl SamplingWorker {
    pub fn spawn<T>(mut sampler: ForceSampler<T>) -> Result<Self, WorkerError>
    where
        T: Timer + 'static,
    {
        let connected = sampler.connected();
        let (requests, request_rx) = mpsc::sync_channel::<Request>(1);
        let (result_tx, results) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("force-sampler".into())
            .spawn(move || {
                for request in request_rx {
                    match request {
                        Request::Clear => sampler.clear_input(),
                        Request::Sample(window) => {
                            let reading = sampler.sample(window);
                            if result_tx.send(reading).is_err() {
                                break;
                            }
                        }
                    }
                }
                debug!("force sampling worker stopped");
            })?;

        Ok(Self {
            requests: Some(requests),
            results,
            handle: Some(handle),
            connected,
            in_flight: false,
        })
    }

    /// Whether the sampler had a sensor attached when the worker started.
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn clear_input(&mut self) -> Result<(), WorkerError> {
        self.request(Request::Clear)
    }

    /// Begin a sampling window. Fails if the previous window was not joined.
    pub fn start(&mut self, window: Duration) -> Result<(), WorkerError> {
        if self.in_flight {
            return Err(WorkerError::AlreadySampling);
        }
        self.request(Request::Sample(window))?;
        self.in_flight = true;
        Ok(())
    }

    /// Block until the running window completes and take its data.
    pub fn join(&mut self) -> Result<Option<ForceReading>, WorkerError> {
        if !self.in_flight {
            return Err(WorkerError::NotStarted);
        }
        self.in_flight = false;
        self.results.recv().map_err(|_| WorkerError::Stopped)
    }

    fn request(&self, request: Request) -> Result<(), WorkerError> {
        self.requests
            .as_ref()
            .ok_or(WorkerError::Stopped)?
            .send(request)
            .map_err(|_| WorkerError::Stopped)
    }
}

impl Drop for SamplingWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
