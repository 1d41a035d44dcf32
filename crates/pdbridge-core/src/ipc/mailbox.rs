//! Single-slot rendezvous mailboxes
//!
//! A mailbox holds at most one pending notification. Notifying a full
//! mailbox does not accumulate and reports the overrun by returning `false`,
//! so at most one block can ever be in flight per direction.

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Sleep between polls once spinning has backed off
const PARK_INTERVAL: Duration = Duration::from_micros(50);

/// In-process mailbox on a bounded(1) channel
#[derive(Debug, Clone)]
pub(crate) struct LocalMailbox {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl LocalMailbox {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn notify(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    /// `None` waits forever
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(()) => true,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
            },
            None => self.rx.recv().is_ok(),
        }
    }
}

/// Post to a shared-memory mailbox flag
pub(crate) fn notify_flag(flag: &AtomicU32) -> bool {
    flag.swap(1, Ordering::AcqRel) == 0
}

/// Consume a shared-memory mailbox flag, waiting up to `timeout` (`None` waits forever)
pub(crate) fn wait_flag(flag: &AtomicU32, timeout: Option<Duration>) -> bool {
    let deadline = timeout.map(|t| Instant::now() + t);
    let backoff = Backoff::new();

    loop {
        if flag
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return true;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }
        if backoff.is_completed() {
            thread::sleep(PARK_INTERVAL);
        } else {
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_local_single_slot() {
        let mailbox = LocalMailbox::new();
        assert!(mailbox.notify());
        assert!(!mailbox.notify(), "second notify must report the overrun");
        assert!(mailbox.wait(Some(Duration::from_millis(10))));
        assert!(!mailbox.wait(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_flag_single_slot() {
        let flag = AtomicU32::new(0);
        assert!(notify_flag(&flag));
        assert!(!notify_flag(&flag));
        assert!(wait_flag(&flag, Some(Duration::from_millis(10))));
        assert!(!wait_flag(&flag, Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_flag_wakes_waiter_across_threads() {
        let flag = Arc::new(AtomicU32::new(0));
        let waiter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || wait_flag(&flag, Some(Duration::from_secs(2))))
        };
        thread::sleep(Duration::from_millis(5));
        notify_flag(&flag);
        assert!(waiter.join().unwrap());
    }
}
