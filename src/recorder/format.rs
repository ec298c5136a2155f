//! File format structures for packet stream files
//!
//! File structure:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Header (fixed 16 bytes)                │
//! │  - Magic, source ID, reserved           │
//! ├─────────────────────────────────────────┤
//! │  Frame 1                                │
//! │  - Length prefix (u32 LE)               │
//! │  - Packet bytes (header + all slots)    │
//! ├─────────────────────────────────────────┤
//! │  ...                                    │
//! ├─────────────────────────────────────────┤
//! │  Footer (fixed 40 bytes)                │
//! │  - Magic, checksum, packet/event counts │
//! └─────────────────────────────────────────┘
//! ```

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use xxhash_rust::xxh64::xxh64;

use crate::common::{LogSink, PacketError, PacketResult, TracingSink};
use crate::packet::{DynapseConfigPacket, EVENT_SIZE, HEADER_SIZE};

/// Magic bytes at the start of a stream file
pub const STREAM_MAGIC: [u8; 8] = *b"DYNCFGPK";

/// Footer magic bytes (different from header to detect truncation)
pub const FOOTER_MAGIC: [u8; 8] = *b"DYNCFEND";

/// Fixed header size in bytes
pub const STREAM_HEADER_SIZE: usize = 16;

/// Fixed footer size in bytes
pub const FOOTER_SIZE: usize = 40;

/// Frames larger than this are treated as corruption
pub const MAX_FRAME_SIZE: usize = 100_000_000;

/// Largest packet capacity whose frame fits in `MAX_FRAME_SIZE`
pub const MAX_PACKET_CAPACITY: i32 = ((MAX_FRAME_SIZE - HEADER_SIZE) / EVENT_SIZE) as i32;

/// Stream file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Source ID of the producer that wrote the file
    pub source_id: i16,
}

impl StreamHeader {
    pub fn new(source_id: i16) -> Self {
        Self { source_id }
    }

    pub fn to_bytes(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf[0..8].copy_from_slice(&STREAM_MAGIC);
        buf[8..10].copy_from_slice(&self.source_id.to_le_bytes());
        // Reserved (6 bytes) - already zeroed
        buf
    }

    pub fn from_bytes(data: &[u8; STREAM_HEADER_SIZE]) -> PacketResult<Self> {
        if data[0..8] != STREAM_MAGIC {
            return Err(PacketError::decode("invalid stream magic bytes"));
        }
        Ok(Self {
            source_id: i16::from_le_bytes([data[8], data[9]]),
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> PacketResult<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> PacketResult<Self> {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

/// Stream file footer with checksum and totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFooter {
    /// Combined xxHash64 of all frames (length prefix + packet bytes)
    pub data_checksum: u64,
    /// Number of frames
    pub total_packets: u64,
    /// Sum of event numbers over all packets
    pub total_events: u64,
    /// Sum of valid counts over all packets
    pub valid_events: u64,
}

impl Default for StreamFooter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFooter {
    pub fn new() -> Self {
        Self {
            data_checksum: 0,
            total_packets: 0,
            total_events: 0,
            valid_events: 0,
        }
    }

    /// Account for one written packet
    pub fn add_packet(&mut self, packet: &DynapseConfigPacket) {
        self.total_packets += 1;
        self.total_events += packet.event_number() as u64;
        self.valid_events += packet.event_valid() as u64;
    }

    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&FOOTER_MAGIC);
        buf[8..16].copy_from_slice(&self.data_checksum.to_le_bytes());
        buf[16..24].copy_from_slice(&self.total_packets.to_le_bytes());
        buf[24..32].copy_from_slice(&self.total_events.to_le_bytes());
        buf[32..40].copy_from_slice(&self.valid_events.to_le_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8; FOOTER_SIZE]) -> PacketResult<Self> {
        if data[0..8] != FOOTER_MAGIC {
            return Err(PacketError::decode("invalid footer magic bytes"));
        }
        let word = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[at..at + 8]);
            u64::from_le_bytes(bytes)
        };
        Ok(Self {
            data_checksum: word(8),
            total_packets: word(16),
            total_events: word(24),
            valid_events: word(32),
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> PacketResult<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> PacketResult<Self> {
        let mut buf = [0u8; FOOTER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

/// Incremental checksum calculator using xxHash64
#[derive(Debug, Clone, Default)]
pub struct ChecksumCalculator {
    state: u64,
    bytes_processed: u64,
}

impl ChecksumCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one block into the running checksum
    pub fn update(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let block_hash = xxh64(data, 0);
        self.state = self.state.rotate_left(5) ^ block_hash;
        self.bytes_processed += data.len() as u64;
    }

    pub fn finalize(&self) -> u64 {
        self.state ^ self.bytes_processed
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

/// Result of stream validation
#[derive(Debug)]
pub struct StreamValidation {
    /// Footer present, checksum and totals match
    pub is_valid: bool,
    pub header: StreamHeader,
    pub footer: Option<StreamFooter>,
    /// Frames that decode cleanly, in order from the start
    pub readable_packets: u64,
    pub errors: Vec<String>,
}

impl StreamValidation {
    /// Data is present but the file was not closed cleanly
    pub fn needs_recovery(&self) -> bool {
        !self.is_valid && self.readable_packets > 0
    }
}

/// Reader for packet stream files
pub struct PacketStreamReader<R> {
    reader: R,
    header: StreamHeader,
    file_size: u64,
    log: Arc<dyn LogSink>,
}

impl<R: Read + Seek> PacketStreamReader<R> {
    /// Open a stream; decoded packets log through `tracing`
    pub fn new(reader: R) -> PacketResult<Self> {
        Self::with_log(reader, Arc::new(TracingSink))
    }

    /// Open a stream; decoded packets report to `log`
    pub fn with_log(mut reader: R, log: Arc<dyn LogSink>) -> PacketResult<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header = StreamHeader::read_from(&mut reader)?;
        Ok(Self {
            reader,
            header,
            file_size,
            log,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Read the footer; fails for files that were not finished
    pub fn read_footer(&mut self) -> PacketResult<StreamFooter> {
        if self.file_size < (STREAM_HEADER_SIZE + FOOTER_SIZE) as u64 {
            return Err(PacketError::decode("file too short to hold a footer"));
        }
        self.reader.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        StreamFooter::read_from(&mut self.reader)
    }

    /// End of the frame region, assuming a footer when one fits
    fn data_end(&self, with_footer: bool) -> u64 {
        if with_footer {
            self.file_size.saturating_sub(FOOTER_SIZE as u64)
        } else {
            self.file_size
        }
    }

    /// Iterate over frames from the start of the file
    ///
    /// With `with_footer` false the last 40 bytes are read as frame data,
    /// which is what recovery of an unfinished file needs.
    pub fn packets(&mut self, with_footer: bool) -> PacketIterator<'_, R> {
        let data_end = self.data_end(with_footer);
        let start = self.reader.seek(SeekFrom::Start(STREAM_HEADER_SIZE as u64));
        PacketIterator {
            reader: &mut self.reader,
            log: self.log.clone(),
            data_end,
            checksum: ChecksumCalculator::new(),
            done: start.is_err(),
        }
    }

    /// Check footer, checksum and totals
    pub fn validate(&mut self) -> StreamValidation {
        let mut result = StreamValidation {
            is_valid: false,
            header: self.header,
            footer: None,
            readable_packets: 0,
            errors: Vec::new(),
        };

        let footer = match self.read_footer() {
            Ok(footer) => Some(footer),
            Err(e) => {
                result.errors.push(format!("Failed to read footer: {}", e));
                None
            }
        };
        result.footer = footer;

        let mut totals = StreamFooter::new();
        let mut corrupted = false;
        let mut iter = self.packets(footer.is_some());
        for packet in iter.by_ref() {
            match packet {
                Ok(packet) => totals.add_packet(&packet),
                Err(e) => {
                    result.errors.push(format!("Corrupted frame: {}", e));
                    corrupted = true;
                    break;
                }
            }
        }
        totals.data_checksum = iter.checksum();
        let clean_end = iter.reached_end();
        result.readable_packets = totals.total_packets;

        if let Some(footer) = footer {
            if footer.data_checksum != totals.data_checksum {
                result.errors.push(
                    PacketError::ChecksumMismatch {
                        expected: footer.data_checksum,
                        actual: totals.data_checksum,
                    }
                    .to_string(),
                );
            } else if footer != totals {
                result.errors.push(format!(
                    "Footer totals {:?} do not match content {:?}",
                    footer, totals
                ));
            } else if clean_end && !corrupted {
                result.is_valid = true;
            }
        }

        result
    }
}

/// Iterator over packets in a stream file
pub struct PacketIterator<'a, R> {
    reader: &'a mut R,
    log: Arc<dyn LogSink>,
    data_end: u64,
    checksum: ChecksumCalculator,
    done: bool,
}

impl<R: Read + Seek> PacketIterator<'_, R> {
    /// Checksum over the frames read so far
    pub fn checksum(&self) -> u64 {
        self.checksum.finalize()
    }

    /// True when iteration stopped exactly at the end of the frame region
    pub fn reached_end(&mut self) -> bool {
        matches!(self.reader.stream_position(), Ok(pos) if pos == self.data_end)
    }
}

impl<R: Read + Seek> Iterator for PacketIterator<'_, R> {
    type Item = PacketResult<DynapseConfigPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let pos = match self.reader.stream_position() {
            Ok(p) => p,
            Err(e) => {
                self.done = true;
                return Some(Err(PacketError::Io(e)));
            }
        };
        if pos >= self.data_end {
            self.done = true;
            return None;
        }

        // Read length prefix
        let mut len_bytes = [0u8; 4];
        if let Err(e) = self.reader.read_exact(&mut len_bytes) {
            self.done = true;
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return None;
            }
            return Some(Err(PacketError::Io(e)));
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len == 0 || len > MAX_FRAME_SIZE || pos + 4 + len as u64 > self.data_end {
            self.done = true;
            return Some(Err(PacketError::decode(format!(
                "frame at offset {} has invalid length {}",
                pos, len
            ))));
        }

        let mut data = vec![0u8; len];
        if let Err(e) = self.reader.read_exact(&mut data) {
            self.done = true;
            return Some(Err(PacketError::Io(e)));
        }
        self.checksum.update(&len_bytes);
        self.checksum.update(&data);

        match DynapseConfigPacket::from_bytes_with_log(&data, self.log.clone()) {
            Ok(packet) => Some(Ok(packet)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
