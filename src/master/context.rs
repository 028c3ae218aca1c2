use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::Result;
use crate::messages::RawPdu;

pub(crate) type Completion = oneshot::Receiver<Result<RawPdu>>;

/// A request between submission and completion-or-timeout.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub request: RawPdu,
    completion: Mutex<Option<oneshot::Sender<Result<RawPdu>>>>,
}

impl PendingRequest {
    /// Delivers the outcome to the waiting caller. Only the first call has
    /// any effect; returns whether this call was it and the caller was still
    /// listening.
    pub fn complete(&self, result: Result<RawPdu>) -> bool {
        match lock(&self.completion).take() {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }
}

//This struct is meant to hold the state of the on going modbus transactions
pub(crate) struct TransactionContext {
    on_going: Mutex<HashMap<u16, Arc<PendingRequest>>>,
    current_transaction_id: AtomicU16,
}

impl TransactionContext {
    pub fn new() -> Self {
        TransactionContext {
            on_going: Mutex::new(HashMap::new()),
            current_transaction_id: AtomicU16::new(1),
        }
    }

    /// Wraps from 0xFFFF back to 0.
    fn next_transaction_id(&self) -> u16 {
        self.current_transaction_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocates a transaction id and records the request under it.
    pub fn register(&self, unit_id: u8, request: RawPdu) -> (Arc<PendingRequest>, Completion) {
        let (sender, receiver) = oneshot::channel();

        let pending = Arc::new(PendingRequest {
            transaction_id: self.next_transaction_id(),
            unit_id,
            request,
            completion: Mutex::new(Some(sender)),
        });

        lock(&self.on_going).insert(pending.transaction_id, pending.clone());

        (pending, receiver)
    }

    /// Removes the record, if it is still awaited.
    pub fn take(&self, transaction_id: u16) -> Option<Arc<PendingRequest>> {
        lock(&self.on_going).remove(&transaction_id)
    }

    pub fn drain(&self) -> Vec<Arc<PendingRequest>> {
        lock(&self.on_going).drain().map(|(_, pending)| pending).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.on_going).len()
    }
}

/// A panic while holding one of these locks cannot leave the guarded data
/// half-updated, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ModbusError;

    fn request() -> RawPdu {
        RawPdu::new(vec![0x03, 0x00, 0x00, 0x00, 0x01]).unwrap()
    }

    #[test]
    fn test_transaction_ids_are_unique_and_wrap() {
        let context = TransactionContext::new();
        let (first, _) = context.register(1, request());
        let (second, _) = context.register(1, request());
        assert_eq!(first.transaction_id, 1);
        assert_eq!(second.transaction_id, 2);
        assert_eq!(context.len(), 2);

        context.current_transaction_id.store(0xFFFF, Ordering::Relaxed);
        assert_eq!(context.next_transaction_id(), 0xFFFF);
        assert_eq!(context.next_transaction_id(), 0);
    }

    #[test]
    fn test_concurrent_registration_never_duplicates() {
        let context = Arc::new(TransactionContext::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let context = context.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| context.register(1, request()).0.transaction_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u16> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 800);
        assert_eq!(context.len(), 800);
    }

    #[test]
    fn test_completion_is_delivered_once() {
        let context = TransactionContext::new();
        let (pending, mut completion) = context.register(7, request());

        let taken = context.take(pending.transaction_id).unwrap();
        assert!(context.take(pending.transaction_id).is_none());

        assert!(taken.complete(Ok(request())));
        assert!(!taken.complete(Err(ModbusError::Closed)));
        assert_eq!(completion.try_recv().unwrap().unwrap(), request());
    }

    #[test]
    fn test_drain_empties_the_map() {
        let context = TransactionContext::new();
        context.register(1, request());
        context.register(2, request());

        let drained = context.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(context.len(), 0);
    }
}
