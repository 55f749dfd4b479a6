// In-process endpoint driven by its caller.
//
// `FeedEndpoint` has no transport: whoever holds the paired `FeedHandle`
// pushes snapshots and errors into the same single-slot streams a polling
// endpoint would. Useful for embedding other discovery sources and for
// driving the reconciler deterministically.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::endpoint::{Endpoint, EndpointStreams, SlotSender, slots};
use crate::error::Error;
use crate::lldp::{LocalSystemData, Snapshot};

type SharedSender = Arc<Mutex<Option<SlotSender>>>;

/// Endpoint fed through a [`FeedHandle`].
pub struct FeedEndpoint {
    name: String,
    sender: SharedSender,
    streams: Option<EndpointStreams>,
}

/// Producer side of a [`FeedEndpoint`]. Cheap to clone.
#[derive(Clone)]
pub struct FeedHandle {
    name: String,
    sender: SharedSender,
}

impl FeedEndpoint {
    pub fn new(name: impl Into<String>) -> (Self, FeedHandle) {
        let name = name.into();
        let (sender, streams) = slots();
        let sender = Arc::new(Mutex::new(Some(sender)));
        (
            Self {
                name: name.clone(),
                sender: Arc::clone(&sender),
                streams: Some(streams),
            },
            FeedHandle { name, sender },
        )
    }
}

impl Endpoint for FeedEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<EndpointStreams, Error> {
        self.streams.take().ok_or_else(|| Error::AlreadyStarted {
            device: self.name.clone(),
        })
    }

    fn stop(&mut self) {
        let taken = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = taken {
            debug!(device = %self.name, "feed endpoint stopped");
            sender.publish_error(Error::Stopped {
                device: self.name.clone(),
            });
        }
    }
}

impl FeedHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a snapshot. Returns `false` once the endpoint is stopped.
    pub fn push(&self, local: LocalSystemData) -> bool {
        self.push_snapshot(Snapshot::new(local))
    }

    pub fn push_snapshot(&self, snapshot: Snapshot) -> bool {
        self.with_sender(|s| s.publish_snapshot(snapshot))
    }

    /// Publish an error. Returns `false` once the endpoint is stopped.
    pub fn push_error(&self, error: Error) -> bool {
        self.with_sender(|s| s.publish_error(error))
    }

    /// Drop the sending half without a final error, as a worker that dies
    /// would. The consumer sees the streams end.
    pub fn close(&self) {
        let taken = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_some() {
            debug!(device = %self.name, "feed closed");
        }
    }

    /// `true` while the endpoint has not been stopped or closed.
    pub fn is_open(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn with_sender(&self, f: impl FnOnce(&SlotSender)) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => {
                f(sender);
                true
            }
            None => false,
        }
    }
}
