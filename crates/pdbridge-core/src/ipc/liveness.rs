//! Heartbeat bookkeeping and the `ipc-ping` thread

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::error::{IpcError, IpcResult};

/// Result of one heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Alive,
    /// Countdown expired but the remote has not answered since (re)connecting
    AwaitingFirstReply,
    /// Countdown expired after the remote had answered
    Lost,
}

/// Ping countdown shared between the ping thread and message receivers
#[derive(Debug)]
pub(crate) struct Liveness {
    ticks: i64,
    countdown: AtomicI64,
    received_any: AtomicBool,
}

impl Liveness {
    pub fn new(ticks: u32) -> Self {
        Self {
            ticks: i64::from(ticks),
            countdown: AtomicI64::new(i64::from(ticks)),
            received_any: AtomicBool::new(false),
        }
    }

    pub fn ping_received(&self) {
        self.countdown.store(self.ticks, Ordering::Release);
        self.received_any.store(true, Ordering::Release);
    }

    /// Fresh connection: full countdown, no reply seen yet
    pub fn reset(&self) {
        self.countdown.store(self.ticks, Ordering::Release);
        self.received_any.store(false, Ordering::Release);
    }

    pub fn tick(&self) -> Tick {
        let left = self.countdown.fetch_sub(1, Ordering::AcqRel) - 1;
        if left > 0 {
            Tick::Alive
        } else if self.received_any.load(Ordering::Acquire) {
            Tick::Lost
        } else {
            Tick::AwaitingFirstReply
        }
    }
}

/// Background thread calling `on_tick` every interval until stopped
pub(crate) struct PingThread {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PingThread {
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> IpcResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("ipc-ping".to_string())
            .spawn(move || loop {
                on_tick();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(IpcError::ThreadSpawn)?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to finish
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("ipc-ping thread panicked");
            }
        }
    }
}

impl Drop for PingThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_countdown_expiry() {
        let liveness = Liveness::new(2);
        assert_eq!(liveness.tick(), Tick::Alive);
        assert_eq!(liveness.tick(), Tick::AwaitingFirstReply);

        liveness.ping_received();
        assert_eq!(liveness.tick(), Tick::Alive);
        assert_eq!(liveness.tick(), Tick::Lost);

        liveness.reset();
        assert_eq!(liveness.tick(), Tick::Alive);
        assert_eq!(liveness.tick(), Tick::AwaitingFirstReply);
    }

    #[test]
    fn test_thread_ticks_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut pinger = {
            let count = Arc::clone(&count);
            PingThread::spawn(Duration::from_millis(5), move || {
                count.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap()
        };
        thread::sleep(Duration::from_millis(50));
        pinger.stop();

        let ticks = count.load(Ordering::Relaxed);
        assert!(ticks >= 2, "only {} ticks", ticks);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::Relaxed), ticks);
    }
}
