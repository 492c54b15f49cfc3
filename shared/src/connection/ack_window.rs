use std::collections::VecDeque;

use log::trace;

use crate::{connection::error::NotifyError, sequencer::Sequencer};

/// Width of the selective ack mask carried in every notify header
pub const ACK_MASK_BITS: i64 = 64;

/// Receives the verdict for every message that went through the ack window.
/// Exactly one of the two methods is called per token.
pub trait NotifyCallback<T> {
    fn on_delivered(&mut self, token: T);
    fn on_lost(&mut self, token: T);
}

/// Collects verdicts in the order they were reached
#[derive(Debug)]
pub struct NotifyOutcomes<T> {
    pub delivered: Vec<T>,
    pub lost: Vec<T>,
}

impl<T> Default for NotifyOutcomes<T> {
    fn default() -> Self {
        Self {
            delivered: Vec::new(),
            lost: Vec::new(),
        }
    }
}

impl<T> NotifyOutcomes<T> {
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.lost.is_empty()
    }
}

impl<T> NotifyCallback<T> for NotifyOutcomes<T> {
    fn on_delivered(&mut self, token: T) {
        self.delivered.push(token);
    }

    fn on_lost(&mut self, token: T) {
        self.lost.push(token);
    }
}

/// What the receiver should do with the payload of a notify packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveVerdict {
    /// First arrival of a newer sequence, process the payload
    Accepted,
    /// Duplicate or older than what was already applied, drop the payload
    Stale,
}

struct SentNotify<T> {
    sequence: u64,
    token: T,
}

/// Per-connection sliding ack window.
///
/// `receive_sequence`/`receive_mask` describe what we have received from the
/// peer: bit `k` of the mask set means `receive_sequence - k` arrived.
/// `send_window` holds our own in-flight sends in send order, drained from
/// the front once the peer's acks resolve them.
pub struct AckWindow<T> {
    sequencer: Sequencer,
    receive_sequence: u64,
    receive_mask: u64,
    send_window: VecDeque<SentNotify<T>>,
    capacity: usize,
}

impl<T> AckWindow<T> {
    pub fn new(sequencer: Sequencer, capacity: usize) -> Self {
        // start one behind zero so the peer's first sequence is distance 1
        let receive_sequence = sequencer.move_in_bounds(u64::MAX);
        Self {
            sequencer,
            receive_sequence,
            receive_mask: 0,
            send_window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.send_window.len()
    }

    pub fn is_full(&self) -> bool {
        self.send_window.len() >= self.capacity
    }

    pub fn receive_sequence(&self) -> u64 {
        self.receive_sequence
    }

    pub fn receive_mask(&self) -> u64 {
        self.receive_mask
    }

    fn last_sent(&self) -> u64 {
        self.sequencer
            .move_in_bounds(self.sequencer.current().wrapping_sub(1))
    }

    /// Allocates the next sequence for `token`. When the window is full the
    /// token is handed back untouched so the caller can report it lost.
    pub fn try_push(&mut self, token: T) -> Result<u64, T> {
        if self.is_full() {
            return Err(token);
        }
        let sequence = self.sequencer.next();
        self.send_window.push_back(SentNotify { sequence, token });
        Ok(sequence)
    }

    /// Records an incoming sequence number. Stale arrivals leave the window
    /// untouched.
    pub fn receive(&mut self, sequence: u64) -> Result<ReceiveVerdict, NotifyError> {
        let sequence = self.sequencer.move_in_bounds(sequence);
        let distance = self.sequencer.distance(sequence, self.receive_sequence);

        if distance.unsigned_abs() > self.capacity as u64 {
            return Err(NotifyError::SequenceOutOfWindow {
                sequence: sequence as u16,
                receive_sequence: self.receive_sequence as u16,
                distance,
                capacity: self.capacity,
            });
        }

        if distance <= 0 {
            return Ok(ReceiveVerdict::Stale);
        }

        self.receive_sequence = sequence;
        if distance >= ACK_MASK_BITS {
            self.receive_mask = 1;
        } else {
            self.receive_mask = (self.receive_mask << distance) | 1;
        }

        Ok(ReceiveVerdict::Accepted)
    }

    /// Resolves in-flight sends against the peer's view of what it received.
    pub fn reconcile(
        &mut self,
        latest_ack: u64,
        ack_mask: u64,
        callback: &mut dyn NotifyCallback<T>,
    ) -> Result<(), NotifyError> {
        let latest_ack = self.sequencer.move_in_bounds(latest_ack);
        let last_sent = self.last_sent();
        if self.sequencer.distance(latest_ack, last_sent) > 0 {
            return Err(NotifyError::AckAhead {
                latest_ack: latest_ack as u16,
                last_sent: last_sent as u16,
            });
        }

        while let Some(front) = self.send_window.front() {
            let distance = self.sequencer.distance(front.sequence, latest_ack);
            if distance > 0 {
                break;
            }

            let Some(entry) = self.send_window.pop_front() else {
                break;
            };

            let lost = distance <= -ACK_MASK_BITS || (ack_mask & (1u64 << -distance)) == 0;

            if lost {
                trace!("notify sequence {} lost", entry.sequence);
                callback.on_lost(entry.token);
            } else {
                trace!("notify sequence {} delivered", entry.sequence);
                callback.on_delivered(entry.token);
            }
        }

        Ok(())
    }

    /// Takes every unresolved token, oldest first. Used on teardown.
    pub fn drain_in_flight(&mut self) -> Vec<T> {
        self.send_window.drain(..).map(|entry| entry.token).collect()
    }
}
