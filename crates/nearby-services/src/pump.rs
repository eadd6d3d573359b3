//! Event pump — moves service callbacks into their owner, one at a time.
//!
//! The platform delivers events on its own threads. They land on an unbounded
//! channel and a single pump task hands them to the owner in arrival order, so
//! owners never see two events concurrently and never see them reordered.

use std::sync::Weak;

use tokio::sync::{broadcast, mpsc};

/// Something that consumes events of type `E`.
pub trait EventSink<E>: Send + Sync {
    fn handle_event(&self, event: E);
}

/// Drains one event channel into one sink.
///
/// Holds the sink weakly: once the owner is dropped the pump exits on the
/// next event instead of keeping it alive.
pub struct EventPump<E, S> {
    sink: Weak<S>,
    events: mpsc::UnboundedReceiver<E>,
}

impl<E, S> EventPump<E, S>
where
    E: Send + 'static,
    S: EventSink<E> + 'static,
{
    pub fn new(sink: Weak<S>, events: mpsc::UnboundedReceiver<E>) -> Self {
        Self { sink, events }
    }

    /// Deliver events until shutdown, the channel closes, or the sink is gone.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("event pump shutting down");
                    return;
                }

                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("event channel closed");
                        return;
                    };
                    let Some(sink) = self.sink.upgrade() else {
                        tracing::debug!("event sink dropped");
                        return;
                    };
                    sink.handle_event(event);
                }
            }
        }
    }

    /// Deliver everything queued right now without waiting. Returns how many
    /// events were delivered.
    pub fn drain(&mut self) -> usize {
        let Some(sink) = self.sink.upgrade() else {
            return 0;
        };
        let mut delivered = 0;
        while let Ok(event) = self.events.try_recv() {
            sink.handle_event(event);
            delivered += 1;
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
    }

    impl EventSink<u32> for Recorder {
        fn handle_event(&self, event: u32) {
            self.seen.lock().unwrap().push(event);
        }
    }

    #[test]
    fn drain_delivers_in_order() {
        let sink = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut pump = EventPump::new(Arc::downgrade(&sink), rx);

        for n in [3, 1, 2] {
            tx.send(n).unwrap();
        }
        assert_eq!(pump.drain(), 3);
        assert_eq!(*sink.seen.lock().unwrap(), vec![3, 1, 2]);
        assert_eq!(pump.drain(), 0);
    }

    #[tokio::test]
    async fn run_exits_when_sink_dropped() {
        let sink = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let pump = EventPump::new(Arc::downgrade(&sink), rx);
        let task = tokio::spawn(pump.run(shutdown_rx));

        drop(sink);
        tx.send(1).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("pump should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let sink = Arc::new(Recorder::default());
        let (_tx, rx) = mpsc::unbounded_channel::<u32>();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(EventPump::new(Arc::downgrade(&sink), rx).run(shutdown_rx));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("pump should exit")
            .unwrap();
    }
}
