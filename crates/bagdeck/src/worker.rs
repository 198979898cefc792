// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background decode worker.
//!
//! Container parsing and series extraction run on a dedicated thread so the
//! thread driving playback never blocks.
//!
//! ```text
//! WorkerHandle ──submit(session, request)──► [crossbeam] ──► worker thread
//!      ▲                                                        │
//!      └──────── poll(): Progress / Completed ◄── [crossbeam] ◄─┘
//! ```
//!
//! Every event carries `(session, request)`. [`WorkerHandle::cancel`] bumps
//! the session generation; events from older generations are dropped on
//! poll. The worker keeps per-session panel paths and nothing else.

use crate::codec::{decode_bytes, CodecError, DecodeOptions, SharedMessage};
use crate::path::{extract_series, MessagePath, SeriesPoint, TopicPath};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::{BTreeMap, HashMap};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Panel or consumer identifier.
pub type SessionId = u64;

/// Per-handle request counter.
pub type RequestId = u64;

/// Worker errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("Worker thread is gone")]
    Disconnected,

    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Work submitted to the worker.
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    /// Decode container bytes into a sorted message list.
    ParseContainer {
        bytes: Vec<u8>,
        options: DecodeOptions,
    },

    /// Extract a plot series from already decoded messages.
    ExtractSeries {
        messages: Vec<SharedMessage>,
        topic: String,
        path: MessagePath,
    },

    /// Paths extracted for the session after every parse.
    ConfigurePanel { paths: Vec<TopicPath> },
}

/// Result payloads.
#[derive(Debug)]
pub enum WorkerOutput {
    /// Decoded messages plus series for the session's panel paths, keyed
    /// by the path text.
    Decoded {
        messages: Vec<SharedMessage>,
        series: BTreeMap<String, Vec<SeriesPoint>>,
    },

    Series(Vec<SeriesPoint>),

    Configured { paths: usize },
}

/// Events delivered by [`WorkerHandle::poll`].
#[derive(Debug)]
pub enum WorkerEvent {
    Progress {
        session: SessionId,
        request: RequestId,
        stage: &'static str,
        done: usize,
    },
    Completed {
        session: SessionId,
        request: RequestId,
        result: Result<WorkerOutput, WorkerError>,
    },
}

impl WorkerEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Progress { session, .. } | Self::Completed { session, .. } => *session,
        }
    }

    pub fn request(&self) -> RequestId {
        match self {
            Self::Progress { request, .. } | Self::Completed { request, .. } => *request,
        }
    }
}

struct Envelope {
    session: SessionId,
    request: RequestId,
    generation: u64,
    body: WorkerRequest,
}

struct Reply {
    generation: u64,
    event: WorkerEvent,
}

/// Worker thread state.
pub struct DecodeWorker {
    panels: HashMap<SessionId, Vec<TopicPath>>,
}

impl DecodeWorker {
    /// Spawn the worker thread.
    pub fn spawn() -> Result<WorkerHandle, WorkerError> {
        let (request_tx, request_rx) = unbounded::<Envelope>();
        let (event_tx, event_rx) = unbounded::<Reply>();

        let handle = thread::Builder::new()
            .name("bagdeck-decode".to_string())
            .spawn(move || {
                let mut worker = DecodeWorker {
                    panels: HashMap::new(),
                };
                worker.run(request_rx, event_tx);
            })?;

        tracing::debug!("Decode worker started");

        Ok(WorkerHandle {
            requests: Some(request_tx),
            events: event_rx,
            thread: Some(handle),
            generations: HashMap::new(),
            next_request: 1,
        })
    }

    fn run(&mut self, requests: Receiver<Envelope>, events: Sender<Reply>) {
        for envelope in requests.iter() {
            let Envelope {
                session,
                request,
                generation,
                body,
            } = envelope;

            let progress = |stage: &'static str, done: usize| {
                let _ = events.send(Reply {
                    generation,
                    event: WorkerEvent::Progress {
                        session,
                        request,
                        stage,
                        done,
                    },
                });
            };

            let result = self.process(session, body, progress);
            let reply = Reply {
                generation,
                event: WorkerEvent::Completed {
                    session,
                    request,
                    result,
                },
            };
            if events.send(reply).is_err() {
                break;
            }
        }
        tracing::debug!("Decode worker stopped");
    }

    fn process<F>(
        &mut self,
        session: SessionId,
        body: WorkerRequest,
        progress: F,
    ) -> Result<WorkerOutput, WorkerError>
    where
        F: Fn(&'static str, usize),
    {
        match body {
            WorkerRequest::ParseContainer { bytes, options } => {
                progress("Parsing container", 0);
                let messages = decode_bytes(bytes, &options)?;
                progress("Decoded messages", messages.len());

                let mut series = BTreeMap::new();
                for path in self.panels.get(&session).into_iter().flatten() {
                    let decoded = messages.iter().map(|m| m.as_ref());
                    let points = extract_series(decoded, &path.topic, &path.path);
                    series.insert(path.to_string(), points);
                }
                Ok(WorkerOutput::Decoded { messages, series })
            }
            WorkerRequest::ExtractSeries {
                messages,
                topic,
                path,
            } => {
                let points = extract_series(messages.iter().map(|m| m.as_ref()), &topic, &path);
                progress("Extracted series", points.len());
                Ok(WorkerOutput::Series(points))
            }
            WorkerRequest::ConfigurePanel { paths } => {
                let count = paths.len();
                self.panels.insert(session, paths);
                Ok(WorkerOutput::Configured { paths: count })
            }
        }
    }
}

/// Owner side of a [`DecodeWorker`].
pub struct WorkerHandle {
    requests: Option<Sender<Envelope>>,
    events: Receiver<Reply>,
    thread: Option<JoinHandle<()>>,
    generations: HashMap<SessionId, u64>,
    next_request: RequestId,
}

impl WorkerHandle {
    /// Queue a request for a session.
    pub fn submit(
        &mut self,
        session: SessionId,
        body: WorkerRequest,
    ) -> Result<RequestId, WorkerError> {
        let request = self.next_request;
        self.next_request += 1;

        let envelope = Envelope {
            session,
            request,
            generation: self.generation(session),
            body,
        };
        self.requests
            .as_ref()
            .ok_or(WorkerError::Disconnected)?
            .send(envelope)
            .map_err(|_| WorkerError::Disconnected)?;
        Ok(request)
    }

    /// Drop every in-flight result of a session.
    pub fn cancel(&mut self, session: SessionId) {
        *self.generations.entry(session).or_insert(0) += 1;
        tracing::debug!("Cancelled in-flight work for session {}", session);
    }

    /// Drain available events, skipping cancelled ones.
    pub fn poll(&mut self) -> Vec<WorkerEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(reply) => {
                    if let Some(event) = self.current(reply) {
                        out.push(event);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Block until the next current event or the timeout.
    pub fn wait(&mut self, timeout: Duration) -> Option<WorkerEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(reply) => {
                    if let Some(event) = self.current(reply) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Block until request `request` completes.
    pub fn wait_for(
        &mut self,
        request: RequestId,
        timeout: Duration,
    ) -> Option<Result<WorkerOutput, WorkerError>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.wait(remaining)? {
                WorkerEvent::Completed {
                    request: id,
                    result,
                    ..
                } if id == request => return Some(result),
                _ => continue,
            }
        }
    }

    /// Stop the worker and join its thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn generation(&self, session: SessionId) -> u64 {
        self.generations.get(&session).copied().unwrap_or(0)
    }

    fn current(&self, reply: Reply) -> Option<WorkerEvent> {
        let session = reply.event.session();
        if reply.generation == self.generation(session) {
            Some(reply.event)
        } else {
            tracing::debug!(
                "Dropping stale result for session {} request {}",
                session,
                reply.event.request()
            );
            None
        }
    }

    fn stop(&mut self) {
        self.requests.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Decode worker panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
