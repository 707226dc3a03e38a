//! Handoff queue between the acquisition task and the consumer.
//!
//! Single writer, single reader, unbounded: the producer never blocks and the
//! consumer never waits.

use chronoamp_frame::Record;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// Create a connected sender/receiver pair.
pub fn handoff_queue() -> (RecordSender, RecordReceiver) {
    let (tx, rx) = unbounded();
    (RecordSender { tx }, RecordReceiver { rx })
}

/// Producer half, owned by the acquisition loop.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: Sender<Record>,
}

impl RecordSender {
    /// Enqueue a record. Returns it back if the consumer has gone away.
    pub fn push(&self, record: Record) -> Result<(), Record> {
        self.tx.send(record).map_err(|err| err.into_inner())
    }
}

/// Result of a non-blocking poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueuePoll {
    Record(Record),
    /// Nothing queued right now; the producer is still alive.
    Empty,
    /// Nothing queued and the producer has finished.
    Closed,
}

/// Consumer half.
#[derive(Debug)]
pub struct RecordReceiver {
    rx: Receiver<Record>,
}

impl RecordReceiver {
    /// Take the next record without blocking.
    pub fn poll(&self) -> QueuePoll {
        match self.rx.try_recv() {
            Ok(record) => QueuePoll::Record(record),
            Err(TryRecvError::Empty) => QueuePoll::Empty,
            Err(TryRecvError::Disconnected) => QueuePoll::Closed,
        }
    }

    /// Records currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seed: f64) -> Record {
        Record::new([seed; 12])
    }

    #[test]
    fn fifo_order_then_closed() {
        let (tx, rx) = handoff_queue();
        assert_eq!(rx.poll(), QueuePoll::Empty);

        tx.push(record(1.0)).unwrap();
        tx.push(record(2.0)).unwrap();
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.poll(), QueuePoll::Record(record(1.0)));
        assert_eq!(rx.poll(), QueuePoll::Record(record(2.0)));
        assert_eq!(rx.poll(), QueuePoll::Empty);

        drop(tx);
        assert_eq!(rx.poll(), QueuePoll::Closed);
    }

    #[test]
    fn queued_records_survive_producer_exit() {
        let (tx, rx) = handoff_queue();
        std::thread::spawn(move || {
            for i in 0..100 {
                tx.push(record(f64::from(i))).unwrap();
            }
        })
        .join()
        .unwrap();

        let mut seen = Vec::new();
        loop {
            match rx.poll() {
                QueuePoll::Record(r) => seen.push(r.fields()[0]),
                QueuePoll::Empty => continue,
                QueuePoll::Closed => break,
            }
        }
        assert_eq!(seen.len(), 100);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn push_after_consumer_dropped_returns_record() {
        let (tx, rx) = handoff_queue();
        drop(rx);
        assert_eq!(tx.push(record(3.0)), Err(record(3.0)));
    }
}
