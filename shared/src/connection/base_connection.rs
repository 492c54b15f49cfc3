use std::{collections::VecDeque, net::SocketAddr, time::Instant};

use log::{trace, warn};

use meridian_serde::{BitReader, BitWrite, ConstBitLength, Serde, StreamWriter, MTU_SIZE_BITS};

use crate::{
    connection::{
        ack_window::{NotifyOutcomes, ReceiveVerdict},
        connection_config::ConnectionConfig,
        disconnect_reason::DisconnectReason,
        error::{ConfigError, ConnectionError},
        notify_channel::{AckHeader, NotifyChannel, NotifyHeader},
        packet_type::PacketType,
    },
    messages::{message::Message, message::MessageContainer, message_kinds::MessageKinds},
    rpc::reply_table::ReplyTable,
    timer::Timer,
    transport::{Transport, TransportChannel},
};

/// Handle for one notify message, reported back as delivered or lost
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifyKey(pub u64);

/// Builds a datagram: the packet type byte followed by whatever `body`
/// writes
pub fn write_packet(packet_type: PacketType, body: impl FnOnce(&mut StreamWriter)) -> Box<[u8]> {
    let mut writer = StreamWriter::new();
    packet_type.ser(&mut writer);
    body(&mut writer);
    writer.to_bytes()
}

/// Represents a connection to a remote host, and provides functionality to
/// manage the connection and the communications to it
pub struct BaseConnection {
    address: SocketAddr,
    notify: NotifyChannel<NotifyKey>,
    next_notify_key: u64,
    notify_outcomes: NotifyOutcomes<NotifyKey>,
    heartbeat_timer: Timer,
    timeout_timer: Timer,
    pub reply_table: ReplyTable,
    outgoing: VecDeque<(TransportChannel, Box<[u8]>)>,
}

impl BaseConnection {
    pub fn new(
        address: SocketAddr,
        config: &ConnectionConfig,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            address,
            notify: NotifyChannel::new(config, now)?,
            next_notify_key: 0,
            notify_outcomes: NotifyOutcomes::default(),
            heartbeat_timer: Timer::new(config.heartbeat_interval, now),
            timeout_timer: Timer::new(config.disconnection_timeout, now),
            reply_table: ReplyTable::new(),
            outgoing: VecDeque::new(),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn notify_channel(&self) -> &NotifyChannel<NotifyKey> {
        &self.notify
    }

    // Heartbeats & Timeouts

    /// Record that a message has been received from the remote host
    pub fn mark_heard(&mut self, now: Instant) {
        self.timeout_timer.reset(now);
    }

    /// Whether the remote host has been silent for longer than the
    /// disconnection timeout
    pub fn should_drop(&self, now: Instant) -> bool {
        self.timeout_timer.ringing(now)
    }

    pub fn should_send_heartbeat(&self, now: Instant) -> bool {
        self.heartbeat_timer.ringing(now)
    }

    // Outgoing

    pub fn queue_packet(&mut self, channel: TransportChannel, packet: Box<[u8]>) {
        self.outgoing.push_back((channel, packet));
    }

    /// Queues a message on the reliable channel
    pub fn queue_message<M: Message>(
        &mut self,
        message_kinds: &MessageKinds,
        message: &M,
    ) -> Result<(), ConnectionError> {
        let body = message_kinds.encode(message)?;
        let packet = write_packet(PacketType::Data, |writer| writer.write_bytes(&body));
        self.queue_packet(TransportChannel::Reliable, packet);
        Ok(())
    }

    /// Queues a message on the notify channel. If the in-flight window is
    /// full the message is not sent and is reported lost on the next
    /// `take_notify_outcomes`.
    pub fn queue_notify<M: Message>(
        &mut self,
        message_kinds: &MessageKinds,
        message: &M,
        now: Instant,
    ) -> Result<NotifyKey, ConnectionError> {
        let body = message_kinds.encode(message)?;
        let bits = <PacketType as ConstBitLength>::const_bit_length()
            + <NotifyHeader as ConstBitLength>::const_bit_length()
            + (body.len() as u32) * 8;
        if bits > MTU_SIZE_BITS {
            return Err(ConnectionError::PacketTooLarge {
                bits,
                max_bits: MTU_SIZE_BITS,
            });
        }

        let key = NotifyKey(self.next_notify_key);
        self.next_notify_key = self.next_notify_key.wrapping_add(1);

        match self.notify.send(key, now, &mut self.notify_outcomes) {
            Some(header) => {
                trace!("notify {:?} sent as sequence {}", key, header.sequence);
                let packet = write_packet(PacketType::Notify, |writer| {
                    header.ser(writer);
                    writer.write_bytes(&body);
                });
                self.queue_packet(TransportChannel::Unreliable, packet);
            }
            None => {
                warn!(
                    "notify window to {} is full, reporting message {:?} lost",
                    self.address, key
                );
            }
        }
        Ok(key)
    }

    pub fn queue_disconnect(&mut self, reason: DisconnectReason) {
        let packet = write_packet(PacketType::Disconnect, |writer| reason.ser(writer));
        self.queue_packet(TransportChannel::Unreliable, packet);
    }

    /// Queues the idle ack and the heartbeat if they are due
    pub fn queue_keepalive(&mut self, now: Instant) {
        if self.notify.should_send_ack(now) {
            let header = self.notify.write_ack_header(now);
            let packet = write_packet(PacketType::Ack, |writer| header.ser(writer));
            self.queue_packet(TransportChannel::Unreliable, packet);
        }
        if self.outgoing.is_empty() && self.should_send_heartbeat(now) {
            let packet = write_packet(PacketType::Heartbeat, |_| {});
            self.queue_packet(TransportChannel::Unreliable, packet);
        }
    }

    /// Hands every queued packet to the transport
    pub fn send_packets<T: Transport>(&mut self, transport: &mut T, now: Instant) {
        if self.outgoing.is_empty() {
            return;
        }
        while let Some((channel, packet)) = self.outgoing.pop_front() {
            if let Err(error) = transport.send(&self.address, channel, &packet) {
                warn!("dropping packet to {}: {}", self.address, error);
            }
        }
        self.heartbeat_timer.reset(now);
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // Incoming

    /// Reads the body of a `Data`, `Notify`, `Ack` or `Heartbeat` packet.
    /// Returns the embedded message, or `None` when there is nothing to
    /// dispatch: acks, heartbeats, and stale or duplicate notify packets.
    pub fn read_packet(
        &mut self,
        packet_type: PacketType,
        reader: &mut BitReader,
        message_kinds: &MessageKinds,
        now: Instant,
    ) -> Result<Option<MessageContainer>, ConnectionError> {
        self.mark_heard(now);
        match packet_type {
            PacketType::Data => Ok(Some(message_kinds.read(reader)?)),
            PacketType::Notify => {
                let header = NotifyHeader::de(reader)?;
                match self
                    .notify
                    .receive_notify(&header, &mut self.notify_outcomes)?
                {
                    ReceiveVerdict::Accepted => Ok(Some(message_kinds.read(reader)?)),
                    ReceiveVerdict::Stale => {
                        trace!("dropping stale notify sequence {}", header.sequence);
                        Ok(None)
                    }
                }
            }
            PacketType::Ack => {
                let header = AckHeader::de(reader)?;
                self.notify.receive_ack(&header, &mut self.notify_outcomes)?;
                Ok(None)
            }
            PacketType::Heartbeat => Ok(None),
            packet_type => Err(ConnectionError::UnexpectedPacket { packet_type }),
        }
    }

    /// Takes the notify keys still awaiting a verdict. Used on teardown,
    /// where they count as lost.
    pub fn drain_in_flight(&mut self) -> Vec<NotifyKey> {
        self.notify.drain_in_flight()
    }

    /// Delivered and lost notify keys resolved since the last call, each in
    /// send order
    pub fn take_notify_outcomes(&mut self) -> NotifyOutcomes<NotifyKey> {
        std::mem::take(&mut self.notify_outcomes)
    }
}
