//! Hand-off of delayed and remote execution requests.
//!
//! `delayExec` and `remoteExec` do not run anything themselves: they pack the
//! current context (see [`serial`](crate::serial)) and pass it to a
//! [`Submitter`] supplied by the embedding server.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::engine::Engine;
use crate::serial::{self, DeserializeError};
use crate::types::{ExecutionContext, ParamArray, RequestId, RuleError};

/// A body to run later, with the context it was submitted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedRequest {
    /// Scheduling condition, interpreted by the submitter (for example
    /// `<PLUSET>1m</PLUSET>`).
    pub condition: String,
    pub body: String,
    pub recovery: String,
    /// Output of [`serial::pack`].
    pub packed: Vec<u8>,
}

impl DelayedRequest {
    /// Unpack the submitting context.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`] if the packed bytes were damaged.
    pub fn context(&self) -> Result<ExecutionContext, DeserializeError> {
        serial::unpack(&self.packed)
    }
}

/// A body to run on another server, with the context it was submitted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub host: String,
    pub condition: String,
    pub body: String,
    pub recovery: String,
    pub packed: Vec<u8>,
}

impl RemoteRequest {
    /// Unpack the submitting context.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`] if the packed bytes were damaged.
    pub fn context(&self) -> Result<ExecutionContext, DeserializeError> {
        serial::unpack(&self.packed)
    }
}

/// Receives delayed and remote requests. Every method defaults to refusing.
pub trait Submitter: Send + Sync {
    /// Queue `request` and return its id.
    ///
    /// # Errors
    ///
    /// [`RuleError::Submission`] if the request is refused.
    fn submit_delayed(&self, request: DelayedRequest) -> Result<RequestId, RuleError> {
        let _ = request;
        Err(unsupported("delayed execution"))
    }

    /// Withdraw a queued request.
    ///
    /// # Errors
    ///
    /// [`RuleError::Submission`] if the request is unknown or already running.
    fn cancel_delayed(&self, id: RequestId) -> Result<(), RuleError> {
        let _ = id;
        Err(unsupported("cancelling delayed execution"))
    }

    /// Run `request` on its host and return the resulting parameters.
    ///
    /// # Errors
    ///
    /// [`RuleError::Submission`] if the host cannot be reached, or the failure
    /// the remote body ended with.
    fn submit_remote(&self, request: RemoteRequest) -> Result<ParamArray, RuleError> {
        let _ = request;
        Err(unsupported("remote execution"))
    }
}

fn unsupported(what: &str) -> RuleError {
    RuleError::Submission {
        message: format!("{what} is not supported"),
    }
}

/// In-memory delayed-execution queue. Requests wait until [`drain`](Self::drain)ed.
#[derive(Debug, Default)]
pub struct DelayQueue {
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: RequestId,
    pending: BTreeMap<RequestId, DelayedRequest>,
}

impl DelayQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().pending.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.state().pending.contains_key(&id)
    }

    /// Remove and return every pending request, oldest first.
    pub fn drain(&self) -> Vec<(RequestId, DelayedRequest)> {
        std::mem::take(&mut self.state().pending).into_iter().collect()
    }
}

impl Submitter for DelayQueue {
    fn submit_delayed(&self, request: DelayedRequest) -> Result<RequestId, RuleError> {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        debug!(id, body = %request.body, "delayed request queued");
        state.pending.insert(id, request);
        Ok(id)
    }

    fn cancel_delayed(&self, id: RequestId) -> Result<(), RuleError> {
        match self.state().pending.remove(&id) {
            Some(_) => {
                debug!(id, "delayed request cancelled");
                Ok(())
            }
            None => Err(RuleError::Submission {
                message: format!("no pending delayed request {id}"),
            }),
        }
    }
}

/// Runs remote requests on another engine in the same process.
#[derive(Debug, Clone)]
pub struct LocalPeer {
    engine: Arc<Engine>,
}

impl LocalPeer {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

impl Submitter for LocalPeer {
    fn submit_remote(&self, request: RemoteRequest) -> Result<ParamArray, RuleError> {
        let mut ctx = request.context().map_err(|err| RuleError::Submission {
            message: err.to_string(),
        })?;
        debug!(host = %request.host, "running remote request in process");
        let body = format!(
            "{}|{}|{}",
            request.condition, request.body, request.recovery
        );
        self.engine.exec_my_rule(&mut ctx, &body)?;
        Ok(ctx.params().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamValue, SessionRecord, Status};

    fn request(body: &str) -> DelayedRequest {
        let ctx = ExecutionContext::new(SessionRecord::new().set("client.user", "rods"));
        DelayedRequest {
            condition: "<PLUSET>1m</PLUSET>".into(),
            body: body.into(),
            recovery: "nop".into(),
            packed: serial::pack(&ctx).unwrap(),
        }
    }

    #[test]
    fn queue_assigns_increasing_ids() {
        let queue = DelayQueue::new();
        let a = queue.submit_delayed(request("msiA")).unwrap();
        let b = queue.submit_delayed(request("msiB")).unwrap();
        assert!(b > a);
        assert_eq!(queue.len(), 2);
        assert!(queue.contains(a));
    }

    #[test]
    fn cancel_removes_request() {
        let queue = DelayQueue::new();
        let id = queue.submit_delayed(request("msiA")).unwrap();
        queue.cancel_delayed(id).unwrap();
        assert!(queue.is_empty());
        assert!(matches!(
            queue.cancel_delayed(id),
            Err(RuleError::Submission { .. })
        ));
    }

    #[test]
    fn drain_returns_in_submission_order() {
        let queue = DelayQueue::new();
        queue.submit_delayed(request("msiA")).unwrap();
        queue.submit_delayed(request("msiB")).unwrap();
        let drained: Vec<String> = queue.drain().into_iter().map(|(_, r)| r.body).collect();
        assert_eq!(drained, vec!["msiA", "msiB"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn request_context_unpacks() {
        let ctx = request("msiA").context().unwrap();
        assert_eq!(
            ctx.session().get("client.user"),
            Some(&crate::types::ParamValue::from("rods"))
        );
    }

    #[test]
    fn local_peer_returns_parameters() {
        let remote = Engine::builder()
            .native("msiWhere", 1, |args, _| {
                args[0].value = "remote".into();
                Ok(Status::Success)
            })
            .build();
        let peer = LocalPeer::new(Arc::new(remote));
        let ctx = ExecutionContext::new(SessionRecord::new());
        let reply = peer
            .submit_remote(RemoteRequest {
                host: "peer.example.org".into(),
                condition: String::new(),
                body: "msiWhere(*Where)".into(),
                recovery: "nop".into(),
                packed: serial::pack(&ctx).unwrap(),
            })
            .unwrap();
        assert_eq!(reply.value("*Where"), Some(&ParamValue::from("remote")));
    }

    #[test]
    fn default_submitter_refuses() {
        struct Refusing;
        impl Submitter for Refusing {}
        assert!(matches!(
            Refusing.submit_delayed(request("msiA")),
            Err(RuleError::Submission { .. })
        ));
        assert!(Refusing.cancel_delayed(1).is_err());
    }
}
