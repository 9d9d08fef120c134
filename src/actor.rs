//! Message plumbing shared by the reactor inbox and the broadcast feed.
//!
//! Both are unbounded channels. Every message carries the span it was sent
//! under, so the receiving side logs inside the sender's context.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{Span, trace};

pub mod broadcast;
pub mod drag_swap;
pub mod reactor;

pub struct Sender<Event>(UnboundedSender<(Span, Event)>);
pub type Receiver<Event> = UnboundedReceiver<(Span, Event)>;

pub fn channel<Event>() -> (Sender<Event>, Receiver<Event>) {
    let (tx, rx) = unbounded_channel();
    (Sender(tx), rx)
}

impl<Event> Sender<Event> {
    /// Queues `event` under the current span. Returns false when nobody is
    /// listening any more; the message is dropped.
    pub fn send(&self, event: Event) -> bool {
        let delivered = self.0.send((Span::current(), event)).is_ok();
        if !delivered {
            trace!(kind = std::any::type_name::<Event>(), "receiver gone, message dropped");
        }
        delivered
    }
}

impl<Event> Clone for Sender<Event> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

/// Takes everything queued on `rx` without waiting.
pub fn drain<Event>(rx: &mut Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).map(|(_, event)| event).collect()
}
