//! A `ClientRef`: a cheap, cloneable handle a `GameActor` uses to push
//! frames to one subscribing process, paired with the receiving half the
//! subscriber actually polls.
//!
//! Each client gets its own unbounded channel instead of sharing a single
//! broadcast channel, so the actor can dedupe and evict per client
//! identity.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use protocol::Frame;
use tokio::sync::mpsc;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(0);

/// A handle a `GameActor` holds to deliver frames to one subscriber.
///
/// Two `ClientHandle`s compare equal iff they came from the same
/// [`client_channel`] call, regardless of how many times either has been
/// cloned — this is the identity `GameActor` subscriber sets dedupe on.
#[derive(Clone)]
pub struct ClientHandle {
    id: u64,
    sender: mpsc::UnboundedSender<Frame>,
}

impl ClientHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Best-effort delivery. A full receiver backlog never happens (the
    /// channel is unbounded); a dropped receiver just means the client is
    /// gone, which the actor's monitor will also observe separately.
    pub(crate) fn send(&self, frame: Frame) -> Result<(), ()> {
        self.sender.send(frame).map_err(|_| ())
    }

    /// Resolves when the paired receiver has been dropped. Used by
    /// `GameActor` to install a liveness monitor per subscribing client.
    pub(crate) async fn closed(&self) {
        self.sender.closed().await;
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientHandle {}

impl Hash for ClientHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle").field("id", &self.id).finish()
    }
}

/// Creates a fresh client identity: the `ClientHandle` side a `GameActor`
/// keeps, and the receiver side whoever subscribes actually reads frames
/// from (a `PlaySession`, or a test harness).
pub fn client_channel() -> (ClientHandle, mpsc::UnboundedReceiver<Frame>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    (ClientHandle { id, sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_of_the_same_handle_compare_equal() {
        let (handle, _rx) = client_channel();
        let clone = handle.clone();
        assert_eq!(handle, clone);
        assert_eq!(handle.id(), clone.id());
    }

    #[test]
    fn distinct_channels_get_distinct_identities() {
        let (a, _rx_a) = client_channel();
        let (b, _rx_b) = client_channel();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn dropping_the_receiver_resolves_closed() {
        let (handle, rx) = client_channel();
        drop(rx);
        handle.closed().await;
    }

    #[tokio::test]
    async fn send_delivers_a_frame_to_the_paired_receiver() {
        let (handle, mut rx) = client_channel();
        let frame = Frame {
            sequence: 1,
            board_state: Default::default(),
            dimensions: protocol::Dimensions { rows: 1, cols: 1 },
        };
        assert!(handle.send(frame.clone()).is_ok());
        let received = rx.recv().await.expect("frame arrives");
        assert_eq!(received.sequence, frame.sequence);
    }
}
