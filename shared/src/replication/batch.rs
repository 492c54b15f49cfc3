use meridian_serde::{packed_u64_len, write_packed_u64, BitReader, BitWrite, Serde, StreamWriter};

use crate::replication::{error::BatchError, identity::NetId};

/// Groups the updates of several objects into outer messages no larger
/// than `max_bytes`. Each object is framed by its NetId and byte length.
pub struct UpdateBatcher {
    max_bytes: usize,
    writer: StreamWriter,
    bytes: usize,
    entries: usize,
}

fn framed_len(net_id: NetId, payload: &[u8]) -> usize {
    (packed_u64_len(net_id.0 as u64) + packed_u64_len(payload.len() as u64)) as usize
        + payload.len()
}

impl UpdateBatcher {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            writer: StreamWriter::new(),
            bytes: 0,
            entries: 0,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    /// Appends one object's update. When it does not fit, the batch built
    /// so far is returned and the update starts the next one.
    pub fn try_push(
        &mut self,
        net_id: NetId,
        payload: &[u8],
    ) -> Result<Option<Box<[u8]>>, BatchError> {
        let framed = framed_len(net_id, payload);
        if framed > self.max_bytes {
            return Err(BatchError::PayloadTooLarge {
                net_id,
                bytes: framed,
                max_bytes: self.max_bytes,
            });
        }

        let full = if self.bytes + framed > self.max_bytes {
            self.finish()
        } else {
            None
        };

        net_id.ser(&mut self.writer);
        write_packed_u64(&mut self.writer, payload.len() as u64);
        self.writer.write_bytes(payload);
        self.bytes += framed;
        self.entries += 1;

        Ok(full)
    }

    /// Takes the batch built so far, if any
    pub fn finish(&mut self) -> Option<Box<[u8]>> {
        if self.entries == 0 {
            return None;
        }
        self.bytes = 0;
        self.entries = 0;
        Some(std::mem::take(&mut self.writer).to_bytes())
    }
}

/// Splits a batch back into its per-object updates
pub fn read_batch(bytes: &[u8]) -> Result<Vec<(NetId, Box<[u8]>)>, BatchError> {
    let mut reader = BitReader::new(bytes);
    let mut updates = Vec::new();
    while reader.bits_remaining() >= 8 {
        let net_id = NetId::de(&mut reader)?;
        let payload = Box::<[u8]>::de(&mut reader)?;
        updates.push((net_id, payload));
    }
    Ok(updates)
}
