//! Server-side fan-out: every live flow owns an outbound queue, and a broadcast pushes one
//! copy of a line onto each of them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use crate::peer::FlowId;

/// Maps each live flow to the sending half of its outbound queue.
///
/// Registration and removal take the write lock, broadcasts hold the read lock for the whole
/// pass. A broadcast therefore sees one consistent set of flows, and a flow whose entry is
/// gone can no longer be written to.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    routes: RwLock<HashMap<FlowId, UnboundedSender<String>>>,
}

impl BroadcastRouter {
    pub fn new() -> Arc<BroadcastRouter> {
        Arc::new(BroadcastRouter::default())
    }

    /// Adds a flow and hands back its queue. The route lives exactly as long as the returned
    /// [`Registration`].
    pub fn register(self: &Arc<Self>, id: FlowId) -> (Registration, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!(flow = id, "route added");

        let registration = Registration {
            router: Arc::clone(self),
            id,
        };
        (registration, rx)
    }

    /// Enqueues `message` for every registered flow. Returns how many queues took it.
    pub fn broadcast(&self, message: &str) -> usize {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for (id, tx) in routes.iter() {
            // A closed queue belongs to a flow that is shutting down.
            if tx.send(message.to_owned()).is_ok() {
                delivered += 1;
            } else {
                trace!(flow = *id, "queue closed, dropping message");
            }
        }
        delivered
    }

    pub fn contains(&self, id: FlowId) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: FlowId) {
        let removed = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!(flow = id, "route removed");
        }
    }
}

/// Keeps a flow's route alive; dropping it unregisters the flow.
#[derive(Debug)]
pub struct Registration {
    router: Arc<BroadcastRouter>,
    id: FlowId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.router.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn broadcast_reaches_every_flow_including_the_sender() {
        let router = BroadcastRouter::new();
        let mut queues: Vec<_> = (0..3).map(|id| router.register(id)).collect();

        assert_eq!(router.broadcast("hello"), 3);
        for (_, rx) in queues.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), "hello");
        }
    }

    #[test]
    fn queues_are_fifo() {
        let router = BroadcastRouter::new();
        let (_reg, mut rx) = router.register(1);

        router.broadcast("a");
        router.broadcast("b");
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn dropping_the_registration_removes_the_route() {
        let router = BroadcastRouter::new();
        let (reg, _rx) = router.register(7);
        assert!(router.contains(7));

        drop(reg);
        assert!(!router.contains(7));
        assert_eq!(router.broadcast("nobody"), 0);
    }

    #[test]
    fn closed_queue_is_skipped_silently() {
        let router = BroadcastRouter::new();
        let (_reg, rx) = router.register(1);
        let (_other, mut other_rx) = router.register(2);
        drop(rx);

        assert_eq!(router.broadcast("still here"), 1);
        assert_eq!(other_rx.try_recv().unwrap(), "still here");
    }

    #[test]
    fn churn_does_not_disturb_stable_flows() {
        let router = BroadcastRouter::new();
        let (_a, mut rx_a) = router.register(1);
        let (_b, mut rx_b) = router.register(2);

        let churn = {
            let router = Arc::clone(&router);
            thread::spawn(move || {
                for id in 100..600 {
                    let (reg, rx) = router.register(id);
                    drop(rx);
                    drop(reg);
                }
            })
        };
        for i in 0..500 {
            router.broadcast(&i.to_string());
        }
        churn.join().unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
            let expected: Vec<String> = (0..500).map(|i| i.to_string()).collect();
            assert_eq!(received, expected);
        }
        assert_eq!(router.len(), 2);
    }
}
