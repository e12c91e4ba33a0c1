//! IMU FIFO wire format.
//!
//! Each record is 7 bytes: a tag byte followed by three little-endian i16
//! axes. Tag byte layout: bits [7:3] record type, bits [2:1] wrap counter,
//! bit 0 parity (ignored).

use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use contracts::{Batch, ContractError, Sample, SensorTag, Source, AXES, MAX_BATCH_RECORDS};

use crate::error::{IngestionError, Result};

/// Size of one FIFO record in bytes
pub const FIFO_RECORD_LEN: usize = std::mem::size_of::<FifoRecord>();

/// Raw FIFO record
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FifoRecord {
    pub tag: u8,
    pub data: [u8; 2 * AXES],
}

impl FifoRecord {
    pub fn encode(sample: &Sample) -> Self {
        let mut data = [0u8; 2 * AXES];
        for (axis, value) in sample.axes.iter().enumerate() {
            data[2 * axis..2 * axis + 2].copy_from_slice(&value.to_le_bytes());
        }
        Self {
            tag: (sample.tag.id() << 3) | ((sample.tag_count & 0x03) << 1),
            data,
        }
    }

    pub fn decode(&self) -> Sample {
        let mut axes = [0i16; AXES];
        for (axis, value) in axes.iter_mut().enumerate() {
            *value = i16::from_le_bytes([self.data[2 * axis], self.data[2 * axis + 1]]);
        }
        Sample {
            tag: SensorTag::from_id(self.tag >> 3),
            tag_count: (self.tag >> 1) & 0x03,
            axes,
        }
    }
}

/// Serialize records as they would be read from the device.
pub fn encode_fifo(records: &[FifoRecord]) -> Bytes {
    Bytes::copy_from_slice(bytemuck::cast_slice(records))
}

/// Decode one FIFO read into a batch.
pub fn decode_fifo(source: Source, read_time: u64, bytes: &[u8]) -> Result<Batch> {
    let records: &[FifoRecord] =
        bytemuck::try_cast_slice(bytes).map_err(|e| IngestionError::MalformedFifo {
            source_id: source,
            message: format!("{} bytes: {e:?}", bytes.len()),
        })?;

    if records.len() > MAX_BATCH_RECORDS {
        return Err(ContractError::oversized_batch(source, records.len(), MAX_BATCH_RECORDS).into());
    }

    let mut batch = Batch::empty(source, read_time);
    for record in records {
        batch.push(record.decode())?;
    }
    Ok(batch)
}
