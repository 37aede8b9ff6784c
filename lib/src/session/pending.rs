//! Single-slot correlation between a control request and its response.
//!
//! The control channel carries no request ids: whatever arrives next is the
//! answer to the one request in flight. The slot therefore holds at most one
//! waiter. Every operation is a single short critical section and no lock is
//! ever held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{debug, trace};
use tokio::sync::oneshot;

pub type ResponseSender = oneshot::Sender<Vec<u8>>;
pub type ResponseReceiver = oneshot::Receiver<Vec<u8>>;

struct PendingRequest {
    id: u64,
    responder: ResponseSender,
}

#[derive(Default)]
pub struct PendingSlot {
    next_id: AtomicU64,
    slot: Mutex<Option<PendingRequest>>,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new waiter if the slot is empty.
    ///
    /// Returns `None` when another request already occupies the slot.
    pub fn claim(&self) -> Option<PendingGuard<'_>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (responder, receiver) = oneshot::channel();
        *slot = Some(PendingRequest { id, responder });
        trace!("Claimed response slot for request {id}");
        Some(PendingGuard {
            owner: self,
            id,
            receiver: Some(receiver),
        })
    }

    /// Hands `response` to the waiting request, if there is one.
    ///
    /// Returns the bytes back when nobody was waiting for them.
    pub fn resolve(&self, response: Vec<u8>) -> Result<(), Vec<u8>> {
        let pending = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match pending {
            Some(pending) => {
                trace!("Resolving request {}", pending.id);
                // The waiter may have given up between the take and the send.
                pending.responder.send(response)
            }
            None => Err(response),
        }
    }

    /// Drops the current waiter, if any. Its receiver observes a closed channel.
    pub fn abort(&self) -> bool {
        let pending = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pending) = &pending {
            debug!("Aborting pending request {}", pending.id);
        }
        pending.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn release(&self, id: u64) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|pending| pending.id == id) {
            *slot = None;
            trace!("Released response slot for request {id}");
        }
    }
}

/// Ownership of one claim on a [`PendingSlot`].
///
/// Dropping the guard clears the slot if it still holds this claim, so the
/// slot is freed on every exit path, including a cancelled caller.
pub struct PendingGuard<'a> {
    owner: &'a PendingSlot,
    id: u64,
    receiver: Option<ResponseReceiver>,
}

impl PendingGuard<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Takes the receiving end. Only the first call returns `Some`.
    pub fn take_receiver(&mut self) -> Option<ResponseReceiver> {
        self.receiver.take()
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.owner.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_rejected() {
        let slot = PendingSlot::new();
        let guard = slot.claim().unwrap();
        assert!(slot.claim().is_none());
        drop(guard);
        assert!(!slot.is_pending());
        assert!(slot.claim().is_some());
    }

    #[tokio::test]
    async fn test_resolve_delivers_response() {
        let slot = PendingSlot::new();
        let mut guard = slot.claim().unwrap();
        let receiver = guard.take_receiver().unwrap();

        assert!(slot.resolve(vec![0x03, 0x60]).is_ok());
        assert_eq!(receiver.await.unwrap(), vec![0x03, 0x60]);
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_resolve_without_waiter_returns_bytes() {
        let slot = PendingSlot::new();
        assert_eq!(slot.resolve(vec![1, 2]), Err(vec![1, 2]));
    }

    #[test]
    fn test_stale_guard_does_not_clear_newer_claim() {
        let slot = PendingSlot::new();
        let first = slot.claim().unwrap();
        let first_id = first.id();
        // Response arrives, the slot empties and a new request claims it
        // before the first guard is dropped.
        let _ = slot.resolve(vec![0]);
        let second = slot.claim().unwrap();
        assert_ne!(first_id, second.id());

        drop(first);
        assert!(slot.is_pending());
        drop(second);
        assert!(!slot.is_pending());
    }

    #[tokio::test]
    async fn test_abort_closes_receiver() {
        let slot = PendingSlot::new();
        let mut guard = slot.claim().unwrap();
        let receiver = guard.take_receiver().unwrap();

        assert!(slot.abort());
        assert!(receiver.await.is_err());
        assert!(!slot.abort());
    }
}
