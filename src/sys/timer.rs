//! A single reschedulable task running on its own thread.
//!
//! Scheduling while a task is pending replaces it; there is never more than
//! one pending task per timer. The callback gets a [`TimerHandle`] so it can
//! re-arm itself (retries, periodic checks).

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{trace, warn};

enum Message<T> {
    Schedule(Instant, T),
    Cancel,
    Shutdown,
}

pub struct TimerHandle<T>(Sender<Message<T>>);

impl<T> Clone for TimerHandle<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> TimerHandle<T> {
    pub fn schedule(&self, delay: Duration, task: T) { self.schedule_at(Instant::now() + delay, task) }

    pub fn schedule_at(&self, deadline: Instant, task: T) {
        // Send only fails once the timer thread is gone.
        _ = self.0.send(Message::Schedule(deadline, task));
    }

    pub fn cancel(&self) { _ = self.0.send(Message::Cancel); }
}

/// Owns the timer thread. Dropping it stops the thread; a task that is
/// already running finishes first.
pub struct Timer<T> {
    handle: TimerHandle<T>,
}

impl<T: Send + 'static> Timer<T> {
    pub fn spawn<F>(name: &str, mut callback: F) -> std::io::Result<Self>
    where F: FnMut(T, &TimerHandle<T>) + Send + 'static {
        let (tx, rx) = unbounded();
        let handle = TimerHandle(tx);
        let inner = handle.clone();
        let name = name.to_string();
        thread::Builder::new().name(name.clone()).spawn(move || {
            run(&name, &rx, &inner, &mut callback);
        })?;
        Ok(Self { handle })
    }

    pub fn handle(&self) -> TimerHandle<T> { self.handle.clone() }

    pub fn schedule(&self, delay: Duration, task: T) { self.handle.schedule(delay, task) }

    pub fn cancel(&self) { self.handle.cancel() }
}

impl<T> Drop for Timer<T> {
    fn drop(&mut self) { _ = self.handle.0.send(Message::Shutdown); }
}

fn run<T, F>(name: &str, rx: &Receiver<Message<T>>, handle: &TimerHandle<T>, callback: &mut F)
where F: FnMut(T, &TimerHandle<T>) {
    let mut pending: Option<(Instant, T)> = None;
    loop {
        let message = match &pending {
            Some((deadline, _)) => match rx.recv_deadline(*deadline) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            },
        };
        match message {
            Some(Message::Schedule(deadline, task)) => {
                if pending.is_some() {
                    trace!(timer = name, "rescheduled pending task");
                }
                pending = Some((deadline, task));
            }
            Some(Message::Cancel) => pending = None,
            Some(Message::Shutdown) => break,
            None => {
                if let Some((_, task)) = pending.take() {
                    trace!(timer = name, "firing");
                    callback(task, handle);
                }
            }
        }
    }
    if pending.is_some() {
        warn!(timer = name, "timer stopped with a task still pending");
    }
}
