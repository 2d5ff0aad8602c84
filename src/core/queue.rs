//! Inbound payload queue between producers and a broadcaster

use super::kpi::Payload;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Producer side of the queue
pub type PayloadSender = Sender<Payload>;

/// Broadcaster side of the queue
pub type PayloadReceiver = Receiver<Payload>;

/// Create a FIFO payload queue
///
/// `None` gives an unbounded queue. With a capacity, producers block while
/// the queue is full.
pub fn payload_queue(capacity: Option<usize>) -> (PayloadSender, PayloadReceiver) {
    match capacity {
        Some(cap) => bounded(cap),
        None => unbounded(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kpi::{Kpi, PacketKind};

    #[test]
    fn test_fifo_order() {
        let (tx, rx) = payload_queue(None);
        for i in 0..5i32 {
            tx.send(Payload::new(f64::from(i), PacketKind::Update, vec![Kpi::unitless("N", i)]))
                .unwrap();
        }
        drop(tx);

        let stamps: Vec<f64> = rx.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_bounded_backpressure() {
        let (tx, _rx) = payload_queue(Some(1));
        tx.try_send(Payload::new(0.0, PacketKind::All, Vec::new())).unwrap();
        assert!(tx.try_send(Payload::new(1.0, PacketKind::All, Vec::new())).is_err());
    }
}
