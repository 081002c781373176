//! Request correlation
//!
//! The router owns every outstanding request record:
//! - publish: one-shot, removed on the first frame carrying its id
//! - subscribe: persistent, keeps its filter for replay after reconnect
//!
//! Inbound frames go to a publish record first, then to a subscription,
//! otherwise they are unhandled.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

use super::error::{SessionError, SessionResult};
use super::frame::{InboundFrame, Request};

/// Reply channel of a publish
pub type PublishReply = oneshot::Sender<SessionResult<InboundFrame>>;

/// Sink shared by the ids of one subscription
pub type FrameSink = mpsc::UnboundedSender<InboundFrame>;

struct SubscriptionRecord {
    seq: u64,
    filter: Value,
    sink: FrameSink,
}

/// Where an inbound frame went
#[derive(Debug, PartialEq)]
pub enum Dispatch {
    /// Completed a publish
    Publish,
    /// Delivered to a subscription
    Subscription,
    /// Belonged to a subscription whose receiver is gone; the record was removed
    Orphaned(String),
    /// No record matched
    Unhandled(InboundFrame),
}

/// Correlates requests with responses
#[derive(Default)]
pub struct RequestRouter {
    counter: u64,
    pending: HashMap<String, PublishReply>,
    subscriptions: HashMap<String, SubscriptionRecord>,
}

impl RequestRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Next correlation id: `r{counter}-{unix_millis}`
    pub fn next_id(&mut self) -> String {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let id = format!("r{}-{}", self.counter, millis);
        self.counter += 1;
        id
    }

    /// Record a publish awaiting its response
    pub fn track_publish(&mut self, id: String, reply: PublishReply) {
        self.pending.insert(id, reply);
    }

    /// Drop a publish record without answering it
    pub fn forget_publish(&mut self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Record a subscription
    pub fn track_subscription(&mut self, id: String, filter: Value, sink: FrameSink) {
        let seq = self.counter;
        self.subscriptions
            .insert(id, SubscriptionRecord { seq, filter, sink });
    }

    /// Remove a subscription record
    pub fn remove_subscription(&mut self, id: &str) -> bool {
        self.subscriptions.remove(id).is_some()
    }

    /// Route an inbound frame
    pub fn dispatch(&mut self, frame: InboundFrame) -> Dispatch {
        if let Some(reply) = self.pending.remove(&frame.id) {
            // Caller may have stopped waiting
            let _ = reply.send(Ok(frame));
            return Dispatch::Publish;
        }

        if let Some(record) = self.subscriptions.get(&frame.id) {
            let id = frame.id.clone();
            if record.sink.send(frame).is_err() {
                self.subscriptions.remove(&id);
                return Dispatch::Orphaned(id);
            }
            return Dispatch::Subscription;
        }

        Dispatch::Unhandled(frame)
    }

    /// Fail every pending publish with a closure notification
    pub fn fail_pending(&mut self, code: u16, reason: &str) -> usize {
        let count = self.pending.len();
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(SessionError::ConnectionLost {
                code,
                reason: reason.to_string(),
            }));
        }
        count
    }

    /// Drop every record without notification
    pub fn clear(&mut self) {
        self.pending.clear();
        self.subscriptions.clear();
    }

    /// `SUB` requests re-creating every subscription, oldest first
    pub fn replay_requests(&self) -> Vec<Request> {
        let mut records: Vec<_> = self.subscriptions.iter().collect();
        records.sort_by_key(|(_, record)| record.seq);
        records
            .into_iter()
            .map(|(id, record)| Request::subscribe(id.clone(), record.filter.clone()))
            .collect()
    }

    /// Whether a subscription id is active
    pub fn has_subscription(&self, id: &str) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Number of publishes awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of active subscription ids
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::frame::RequestKind;
    use serde_json::json;

    fn frame(id: &str, payload: Value) -> InboundFrame {
        InboundFrame {
            kind: "EVENT".to_string(),
            id: id.to_string(),
            payload,
            extra: Vec::new(),
        }
    }

    #[test]
    fn test_ids_unique_and_ordered() {
        let mut router = RequestRouter::new();
        let first = router.next_id();
        let second = router.next_id();

        assert!(first.starts_with("r0-"));
        assert!(second.starts_with("r1-"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_publish_is_one_shot() {
        let mut router = RequestRouter::new();
        let (tx, mut rx) = oneshot::channel();
        router.track_publish("p".to_string(), tx);

        assert_eq!(router.dispatch(frame("p", json!(true))), Dispatch::Publish);
        assert_eq!(rx.try_recv().unwrap().unwrap().payload, json!(true));

        assert!(matches!(
            router.dispatch(frame("p", json!(true))),
            Dispatch::Unhandled(_)
        ));
    }

    #[test]
    fn test_publish_takes_precedence() {
        let mut router = RequestRouter::new();
        let (sink, mut frames) = mpsc::unbounded_channel();
        let (tx, _rx) = oneshot::channel();
        router.track_subscription("x".to_string(), json!({}), sink);
        router.track_publish("x".to_string(), tx);

        assert_eq!(router.dispatch(frame("x", json!(1))), Dispatch::Publish);
        assert!(frames.try_recv().is_err());
        assert_eq!(router.dispatch(frame("x", json!(2))), Dispatch::Subscription);
        assert_eq!(frames.try_recv().unwrap().payload, json!(2));
    }

    #[test]
    fn test_subscription_persists() {
        let mut router = RequestRouter::new();
        let (sink, mut frames) = mpsc::unbounded_channel();
        router.track_subscription("s".to_string(), json!({"code": 1}), sink);

        for n in 0..3 {
            assert_eq!(router.dispatch(frame("s", json!(n))), Dispatch::Subscription);
        }
        assert_eq!(frames.try_recv().unwrap().payload, json!(0));
        assert_eq!(router.subscription_count(), 1);

        assert!(router.remove_subscription("s"));
        assert!(!router.remove_subscription("s"));
        assert!(matches!(router.dispatch(frame("s", json!(9))), Dispatch::Unhandled(_)));
    }

    #[test]
    fn test_orphaned_subscription_removed() {
        let mut router = RequestRouter::new();
        let (sink, frames) = mpsc::unbounded_channel();
        router.track_subscription("s".to_string(), json!({}), sink);
        drop(frames);

        assert_eq!(
            router.dispatch(frame("s", json!(1))),
            Dispatch::Orphaned("s".to_string())
        );
        assert!(!router.has_subscription("s"));
    }

    #[test]
    fn test_fail_pending_notifies() {
        let mut router = RequestRouter::new();
        let (tx, mut rx) = oneshot::channel();
        router.track_publish("p".to_string(), tx);

        assert_eq!(router.fail_pending(1006, ""), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(SessionError::ConnectionLost {
                code: 1006,
                reason: String::new()
            })
        );
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn test_clear_cancels_silently() {
        let mut router = RequestRouter::new();
        let (tx, mut rx) = oneshot::channel();
        let (sink, mut frames) = mpsc::unbounded_channel();
        router.track_publish("p".to_string(), tx);
        router.track_subscription("s".to_string(), json!({}), sink);

        router.clear();

        assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
        assert!(matches!(
            frames.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_replay_in_subscription_order() {
        let mut router = RequestRouter::new();
        let (sink, _frames) = mpsc::unbounded_channel();

        let mut ids = Vec::new();
        for code in 0..5 {
            let id = router.next_id();
            router.track_subscription(id.clone(), json!({ "code": code }), sink.clone());
            ids.push(id);
        }

        let replay = router.replay_requests();
        assert_eq!(replay.len(), 5);
        for (n, (request, id)) in replay.iter().zip(&ids).enumerate() {
            assert_eq!(request.kind, RequestKind::Subscribe);
            assert_eq!(&request.id, id);
            assert_eq!(request.payload, json!({ "code": n }));
        }
    }
}
