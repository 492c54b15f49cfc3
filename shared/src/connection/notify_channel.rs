use std::time::{Duration, Instant};

use meridian_serde::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

use crate::{
    connection::{
        ack_window::{AckWindow, NotifyCallback, ReceiveVerdict},
        connection_config::ConnectionConfig,
        error::{ConfigError, NotifyError},
    },
    sequencer::Sequencer,
};

/// Prepended to every notify message: our sequence, then our view of the
/// peer's sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyHeader {
    pub sequence: u16,
    pub latest_ack: u16,
    pub ack_mask: u64,
}

impl Serde for NotifyHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.sequence.ser(writer);
        self.latest_ack.ser(writer);
        self.ack_mask.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            sequence: u16::de(reader)?,
            latest_ack: u16::de(reader)?,
            ack_mask: u64::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        <Self as ConstBitLength>::const_bit_length()
    }
}

impl ConstBitLength for NotifyHeader {
    fn const_bit_length() -> u32 {
        16 + 16 + 64
    }
}

/// The ack half of a NotifyHeader, sent alone when there is nothing else to
/// carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHeader {
    pub latest_ack: u16,
    pub ack_mask: u64,
}

impl Serde for AckHeader {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.latest_ack.ser(writer);
        self.ack_mask.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            latest_ack: u16::de(reader)?,
            ack_mask: u64::de(reader)?,
        })
    }

    fn bit_length(&self) -> u32 {
        16 + 64
    }
}

/// Sends messages over an unreliable channel and reports, per message,
/// whether the peer received it. Nothing is retransmitted.
pub struct NotifyChannel<T> {
    window: AckWindow<T>,
    ack_timeout: Duration,
    last_send: Instant,
    // the receive state moved since our last outgoing header
    ack_pending: bool,
}

impl<T> NotifyChannel<T> {
    pub fn new(config: &ConnectionConfig, now: Instant) -> Result<Self, ConfigError> {
        config.validate()?;
        let sequencer = Sequencer::try_new(config.sequence_bits).map_err(|_| {
            ConfigError::InvalidSequenceBits {
                bits: config.sequence_bits,
            }
        })?;
        Ok(Self {
            window: AckWindow::new(sequencer, config.notify_window_capacity),
            ack_timeout: config.ack_timeout,
            last_send: now,
            ack_pending: false,
        })
    }

    pub fn window(&self) -> &AckWindow<T> {
        &self.window
    }

    fn current_ack(&self) -> (u16, u64) {
        (
            self.window.receive_sequence() as u16,
            self.window.receive_mask(),
        )
    }

    /// Queues `token` and returns the header to put in front of its payload.
    /// If the window is full the token is reported lost right away and
    /// nothing should be transmitted.
    pub fn send(
        &mut self,
        token: T,
        now: Instant,
        callback: &mut dyn NotifyCallback<T>,
    ) -> Option<NotifyHeader> {
        match self.window.try_push(token) {
            Ok(sequence) => {
                let (latest_ack, ack_mask) = self.current_ack();
                self.last_send = now;
                self.ack_pending = false;
                Some(NotifyHeader {
                    sequence: sequence as u16,
                    latest_ack,
                    ack_mask,
                })
            }
            Err(token) => {
                callback.on_lost(token);
                None
            }
        }
    }

    /// Applies an incoming notify header. On `Stale` the caller must drop the
    /// payload, and no ack state has changed.
    pub fn receive_notify(
        &mut self,
        header: &NotifyHeader,
        callback: &mut dyn NotifyCallback<T>,
    ) -> Result<ReceiveVerdict, NotifyError> {
        let verdict = self.window.receive(header.sequence as u64)?;
        if verdict == ReceiveVerdict::Stale {
            return Ok(verdict);
        }
        self.ack_pending = true;
        self.window
            .reconcile(header.latest_ack as u64, header.ack_mask, callback)?;
        Ok(verdict)
    }

    pub fn receive_ack(
        &mut self,
        header: &AckHeader,
        callback: &mut dyn NotifyCallback<T>,
    ) -> Result<(), NotifyError> {
        self.window
            .reconcile(header.latest_ack as u64, header.ack_mask, callback)
    }

    /// True when the channel has been quiet for the ack timeout and the peer
    /// has not yet heard about something we received.
    pub fn should_send_ack(&self, now: Instant) -> bool {
        self.ack_pending && now.saturating_duration_since(self.last_send) >= self.ack_timeout
    }

    pub fn write_ack_header(&mut self, now: Instant) -> AckHeader {
        let (latest_ack, ack_mask) = self.current_ack();
        self.last_send = now;
        self.ack_pending = false;
        AckHeader {
            latest_ack,
            ack_mask,
        }
    }

    pub fn drain_in_flight(&mut self) -> Vec<T> {
        self.window.drain_in_flight()
    }
}
