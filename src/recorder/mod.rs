//! Recorder - writes configuration event packets to stream files
//!
//! Every packet is stored whole (header plus all `event_capacity` slots) so
//! that a reader gets back exactly what was written, including unused slots
//! and invalidated records.
//!
//! File format:
//! - Header: Magic "DYNCFGPK" + source ID (i16 LE) + 6 reserved bytes
//! - Frames: length (4 bytes LE) + packet bytes (repeated)
//! - Footer: Fixed 40 bytes with magic "DYNCFEND", checksum and totals

mod format;

pub use format::{
    ChecksumCalculator, PacketIterator, PacketStreamReader, StreamFooter, StreamHeader,
    StreamValidation, FOOTER_MAGIC, FOOTER_SIZE, MAX_FRAME_SIZE, MAX_PACKET_CAPACITY,
    STREAM_HEADER_SIZE, STREAM_MAGIC,
};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::common::{PacketError, PacketResult};
use crate::packet::DynapseConfigPacket;

/// Writer for packet stream files
///
/// Call [`finish`](Self::finish) to write the footer; a stream dropped
/// without it is left unfinished and fails validation.
pub struct PacketStreamWriter<W: Write> {
    writer: W,
    header: StreamHeader,
    checksum: ChecksumCalculator,
    footer: StreamFooter,
    bytes_written: u64,
}

impl PacketStreamWriter<BufWriter<File>> {
    /// Create a stream file, creating parent directories as needed
    pub fn create<P: AsRef<Path>>(path: P, source_id: i16) -> PacketResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        info!(path = %path.display(), source_id, "Opened packet stream file");
        Self::new(BufWriter::new(file), source_id)
    }
}

impl<W: Write> PacketStreamWriter<W> {
    /// Start a stream on `writer`; the header is written immediately
    pub fn new(mut writer: W, source_id: i16) -> PacketResult<Self> {
        let header = StreamHeader::new(source_id);
        header.write_to(&mut writer)?;
        Ok(Self {
            writer,
            header,
            checksum: ChecksumCalculator::new(),
            footer: StreamFooter::new(),
            bytes_written: STREAM_HEADER_SIZE as u64,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Totals so far (checksum is filled in by `finish`)
    pub fn footer(&self) -> &StreamFooter {
        &self.footer
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append one packet as a length-prefixed frame
    pub fn write_packet(&mut self, packet: &DynapseConfigPacket) -> PacketResult<()> {
        let data = packet.to_bytes();
        if data.len() > MAX_FRAME_SIZE {
            return Err(PacketError::invalid_argument(format!(
                "packet of {} bytes exceeds frame limit {}",
                data.len(),
                MAX_FRAME_SIZE
            )));
        }
        let len_bytes = (data.len() as u32).to_le_bytes();

        self.writer.write_all(&len_bytes)?;
        self.writer.write_all(&data)?;

        self.checksum.update(&len_bytes);
        self.checksum.update(&data);
        self.footer.add_packet(packet);
        self.bytes_written += (len_bytes.len() + data.len()) as u64;

        debug!(
            packet = self.footer.total_packets,
            events = packet.event_number(),
            valid = packet.event_valid(),
            bytes = data.len(),
            "Wrote packet"
        );
        Ok(())
    }

    /// Write the footer, flush and hand back the underlying writer
    pub fn finish(mut self) -> PacketResult<(W, StreamFooter)> {
        self.footer.data_checksum = self.checksum.finalize();
        self.footer.write_to(&mut self.writer)?;
        self.writer.flush()?;
        self.bytes_written += FOOTER_SIZE as u64;

        info!(
            packets = self.footer.total_packets,
            events = self.footer.total_events,
            valid = self.footer.valid_events,
            bytes = self.bytes_written,
            checksum = format!("{:016x}", self.footer.data_checksum),
            "Closed packet stream"
        );
        Ok((self.writer, self.footer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_packet(source: i16) -> DynapseConfigPacket {
        let mut packet = DynapseConfigPacket::allocate(4, source, 1).unwrap();
        packet.push_event(2, 7, 10).unwrap();
        packet.push_event(3, 9, 20).unwrap();
        packet.push_event(2, 11, 30).unwrap();
        packet.invalidate(1).unwrap();
        packet
    }

    fn written_stream(packets: &[DynapseConfigPacket]) -> (Vec<u8>, StreamFooter) {
        let mut writer = PacketStreamWriter::new(Vec::new(), 5).unwrap();
        for packet in packets {
            writer.write_packet(packet).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_write_and_read_back() {
        let packets = vec![sample_packet(5), sample_packet(5)];
        let (bytes, footer) = written_stream(&packets);

        assert_eq!(footer.total_packets, 2);
        assert_eq!(footer.total_events, 6);
        assert_eq!(footer.valid_events, 4);

        let mut reader = PacketStreamReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().source_id, 5);
        assert_eq!(reader.read_footer().unwrap(), footer);

        let read: Vec<_> = reader
            .packets(true)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(read, packets);
    }

    #[test]
    fn test_validate_clean_stream() {
        let (bytes, _) = written_stream(&[sample_packet(5)]);
        let mut reader = PacketStreamReader::new(Cursor::new(bytes)).unwrap();
        let result = reader.validate();
        assert!(result.is_valid, "errors: {:?}", result.errors);
        assert_eq!(result.readable_packets, 1);
        assert!(!result.needs_recovery());
    }

    #[test]
    fn test_empty_stream() {
        let (bytes, footer) = written_stream(&[]);
        assert_eq!(bytes.len(), STREAM_HEADER_SIZE + FOOTER_SIZE);
        assert_eq!(footer.total_packets, 0);

        let mut reader = PacketStreamReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.packets(true).count(), 0);
        assert!(reader.validate().is_valid);
    }

    #[test]
    fn test_corrupted_frame_fails_checksum() {
        let (mut bytes, _) = written_stream(&[sample_packet(5)]);
        // Flip a bit in the data field of record 0
        let data_at = STREAM_HEADER_SIZE + 4 + 28 + 1;
        bytes[data_at] ^= 0x01;

        let mut reader = PacketStreamReader::new(Cursor::new(bytes)).unwrap();
        let result = reader.validate();
        assert!(!result.is_valid);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_unfinished_stream_needs_recovery() {
        let mut writer = PacketStreamWriter::new(Vec::new(), 5).unwrap();
        writer.write_packet(&sample_packet(5)).unwrap();
        writer.write_packet(&sample_packet(5)).unwrap();
        let bytes = writer.writer.clone();

        let mut reader = PacketStreamReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.read_footer().is_err());

        let result = reader.validate();
        assert!(!result.is_valid);
        assert!(result.footer.is_none());
        assert_eq!(result.readable_packets, 2);
        assert!(result.needs_recovery());

        let recovered: Vec<_> = reader.packets(false).filter_map(Result::ok).collect();
        assert_eq!(recovered.len(), 2);
    }

    #[test]
    fn test_create_writes_file() {
        let dir = std::env::temp_dir().join(format!("dynapse_recorder_{}", std::process::id()));
        let path = dir.join("nested").join("stream.dyn");

        let mut writer = PacketStreamWriter::create(&path, 9).unwrap();
        writer.write_packet(&sample_packet(9)).unwrap();
        assert_eq!(writer.footer().total_packets, 1);
        writer.finish().unwrap();

        let file = File::open(&path).unwrap();
        let mut reader = PacketStreamReader::new(file).unwrap();
        assert_eq!(reader.header().source_id, 9);
        assert!(reader.validate().is_valid);

        fs::remove_dir_all(&dir).unwrap();
    }
}
