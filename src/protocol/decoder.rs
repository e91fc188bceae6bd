//! Stream decoder for inbound console traffic
//!
//! TCP delivers the console's output as an unframed byte stream: messages
//! may be split across reads, several may arrive in one read, and the
//! console interleaves keepalive bytes anywhere. `StreamDecoder` buffers
//! the bytes and hands out one typed event at a time.
//!
//! Each call to [`StreamDecoder::next_event`] either consumes at least one
//! byte or reports that more input is needed, so decoding always terminates
//! and never loses sync for more than one byte on garbage input.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use super::address::{self, ChannelAddress};
use super::level::level_to_db;
use super::{
    format_hex, CONTROL_CHANGE, DATA_ENTRY, FADER_LEN, KEEPALIVE, NOTE_ON, NOTE_ON_LEN, NRPN_FADER_PARAM,
    NRPN_LSB, NRPN_MSB, SYSEX_END, SYSEX_HEADER, SYSEX_NAME_RESPONSE, SYSEX_START, VELOCITY_THRESHOLD,
};

/// Buffer size past which the stream is considered unrecoverable
pub const MAX_BUFFER: usize = 1024;

/// Longest unterminated SysEx block tolerated while waiting for `F7`
pub const MAX_SYSEX_LEN: usize = 128;

/// Longest partial fader message tolerated while waiting for more bytes
const MAX_PARTIAL_FADER: usize = 32;

/// Offset of the channel code inside a name SysEx
const SYSEX_CODE_OFFSET: usize = SYSEX_HEADER.len() + 1;

/// Shortest name SysEx: header, sub-code, channel code, terminator
const SYSEX_MIN_LEN: usize = SYSEX_CODE_OFFSET + 2;

/// A message decoded from the console
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Mute status changed on a channel
    MuteChanged { address: ChannelAddress, muted: bool },
    /// Fader moved on a channel
    FaderChanged { address: ChannelAddress, db: f64 },
    /// Channel name reported in reply to a name request
    NameReceived { address: ChannelAddress, name: String },
    /// Bytes that do not form a known message
    Unrecognized { raw: Vec<u8> },
}

/// Counters for framing diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Complete messages framed (including ignored ones)
    pub messages: u64,
    /// Keepalive bytes skipped
    pub keepalives: u64,
    /// Single bytes dropped while resynchronizing on a false `B0`
    pub resyncs: u64,
    /// Bytes emitted as `Unrecognized`
    pub unrecognized: u64,
    /// Bytes thrown away by the overflow and malformed-message guards
    pub discarded: u64,
}

/// Outcome of one classification step
enum Step {
    Event(DecodedEvent),
    Consumed,
    NeedMore,
}

/// Incremental decoder over an append-only receive buffer
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: BytesMut,
    stats: DecoderStats,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes received from the console
    pub fn feed(&mut self, data: &[u8]) {
        if data.len() > 1 || data.first() != Some(&KEEPALIVE) {
            trace!("RX {} bytes: {}", data.len(), format_hex(data));
        }
        self.buf.extend_from_slice(data);
    }

    /// Decode the next event, or `None` once the buffer needs more input
    pub fn next_event(&mut self) -> Option<DecodedEvent> {
        loop {
            match self.step() {
                Step::Event(event) => return Some(event),
                Step::Consumed => continue,
                Step::NeedMore => return None,
            }
        }
    }

    /// Lazily drain every event the buffer currently holds
    pub fn events(&mut self) -> Events<'_> {
        Events { decoder: self }
    }

    /// Bytes waiting for the rest of a message
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop any buffered partial message (new session)
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn discard_all(&mut self, reason: &str) {
        warn!("{} ({} bytes), discarding buffer", reason, self.buf.len());
        self.stats.discarded += self.buf.len() as u64;
        self.buf.clear();
    }

    fn step(&mut self) -> Step {
        let Some(&lead) = self.buf.first() else {
            return Step::NeedMore;
        };

        if lead == KEEPALIVE {
            self.buf.advance(1);
            self.stats.keepalives += 1;
            return Step::Consumed;
        }

        let step = match lead {
            SYSEX_START => self.step_sysex(),
            NOTE_ON => self.step_note_on(),
            CONTROL_CHANGE => self.step_fader(),
            _ => {
                warn!("Unknown message type 0x{:02X}, discarding byte", lead);
                self.buf.advance(1);
                self.stats.unrecognized += 1;
                Step::Event(DecodedEvent::Unrecognized { raw: vec![lead] })
            }
        };

        // Stalled on an oversized buffer
        if matches!(step, Step::NeedMore) && self.buf.len() > MAX_BUFFER {
            self.discard_all("Receive buffer overflow");
        }
        step
    }

    fn step_sysex(&mut self) -> Step {
        let Some(end) = self.buf.iter().position(|&b| b == SYSEX_END) else {
            if self.buf.len() > MAX_SYSEX_LEN {
                self.discard_all("Malformed SysEx message (no F7 end marker)");
            } else {
                debug!("Incomplete SysEx message, waiting for more data");
            }
            return Step::NeedMore;
        };

        let block = self.buf.split_to(end + 1);
        self.stats.messages += 1;
        match parse_sysex(&block) {
            Some(event) => Step::Event(event),
            None => {
                trace!("Ignoring SysEx: {}", format_hex(&block));
                Step::Consumed
            }
        }
    }

    fn step_note_on(&mut self) -> Step {
        if self.buf.len() < NOTE_ON_LEN {
            debug!("Incomplete Note On message, waiting for more data");
            return Step::NeedMore;
        }

        let msg = self.buf.split_to(NOTE_ON_LEN);
        self.stats.messages += 1;
        let (code, velocity) = (msg[1], msg[2]);

        if velocity == 0 {
            trace!("Note On 0x{:02X} with velocity 0, ignored", code);
            return Step::Consumed;
        }

        match address::resolve(code) {
            Some(address) => {
                let muted = velocity >= VELOCITY_THRESHOLD;
                debug!("{} mute -> {}", address, muted);
                Step::Event(DecodedEvent::MuteChanged { address, muted })
            }
            None => Step::Event(DecodedEvent::Unrecognized { raw: msg.to_vec() }),
        }
    }

    fn step_fader(&mut self) -> Step {
        if self.buf.len() < FADER_LEN {
            if self.buf.len() > MAX_PARTIAL_FADER {
                self.discard_all("Malformed fader message");
            } else {
                debug!("Incomplete fader message, waiting for more data");
            }
            return Step::NeedMore;
        }

        let b = &self.buf;
        if b[1] != NRPN_MSB
            || b[3] != NRPN_LSB
            || b[4] != NRPN_FADER_PARAM
            || b[5] != DATA_ENTRY
            || b[2] & 0x80 != 0
            || b[6] & 0x80 != 0
        {
            warn!("Invalid fader message format, discarding byte");
            self.buf.advance(1);
            self.stats.resyncs += 1;
            return Step::Consumed;
        }

        let msg = self.buf.split_to(FADER_LEN);
        self.stats.messages += 1;
        let (code, level) = (msg[2], msg[6]);

        match address::resolve(code) {
            Some(address) => {
                let db = level_to_db(level);
                debug!("{} fader -> {:.1} dB (level {})", address, db, level);
                Step::Event(DecodedEvent::FaderChanged { address, db })
            }
            None => {
                warn!("Unknown channel code in fader message: 0x{:02X}", code);
                Step::Event(DecodedEvent::Unrecognized { raw: msg.to_vec() })
            }
        }
    }
}

/// Iterator returned by [`StreamDecoder::events`]
pub struct Events<'a> {
    decoder: &'a mut StreamDecoder,
}

impl Iterator for Events<'_> {
    type Item = DecodedEvent;

    fn next(&mut self) -> Option<DecodedEvent> {
        self.decoder.next_event()
    }
}

/// Parse a complete `F0 .. F7` block. Only name responses produce an event.
fn parse_sysex(block: &[u8]) -> Option<DecodedEvent> {
    if block.len() < SYSEX_MIN_LEN
        || block[..SYSEX_HEADER.len()] != SYSEX_HEADER
        || block[SYSEX_HEADER.len()] != SYSEX_NAME_RESPONSE
    {
        return None;
    }

    let code = block[SYSEX_CODE_OFFSET];
    let name_bytes = &block[SYSEX_CODE_OFFSET + 1..block.len() - 1];
    trace!("Raw name bytes: {}", format_hex(name_bytes));

    let address = address::resolve(code)?;
    let name = decode_name(name_bytes);
    debug!("{} name -> \"{}\"", address, name);
    Some(DecodedEvent::NameReceived { address, name })
}

/// Keep printable ASCII only, then trim surrounding whitespace
pub fn decode_name(bytes: &[u8]) -> String {
    let name: String = bytes
        .iter()
        .filter(|b| (0x20..=0x7E).contains(*b))
        .map(|&b| b as char)
        .collect();
    name.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::address::ChannelType;

    fn addr(channel_type: ChannelType, index: u16) -> ChannelAddress {
        ChannelAddress::new(channel_type, index).unwrap()
    }

    fn decode_all(decoder: &mut StreamDecoder, data: &[u8]) -> Vec<DecodedEvent> {
        decoder.feed(data);
        decoder.events().collect()
    }

    const FADER_IN5: [u8; 7] = [0xB0, 0x63, 0x24, 0x62, 0x17, 0x06, 0x7F];

    #[test]
    fn test_mute_on_and_off() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &[0x90, 0x24, 0x7F, 0x90, 0x24, 0x3F]);
        assert_eq!(
            events,
            vec![
                DecodedEvent::MuteChanged { address: addr(ChannelType::Input, 5), muted: true },
                DecodedEvent::MuteChanged { address: addr(ChannelType::Input, 5), muted: false },
            ]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_mute_boundary_velocity_is_on() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &[0x90, 0x10, 0x40]);
        assert_eq!(
            events,
            vec![DecodedEvent::MuteChanged { address: addr(ChannelType::Dca, 1), muted: true }]
        );
    }

    #[test]
    fn test_velocity_zero_consumes_without_event() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &[0x90, 0x24, 0x00]);
        assert!(events.is_empty());
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.stats().messages, 1);
    }

    #[test]
    fn test_fader_message() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &FADER_IN5);
        assert_eq!(
            events,
            vec![DecodedEvent::FaderChanged { address: addr(ChannelType::Input, 5), db: 10.0 }]
        );
    }

    #[test]
    fn test_fader_split_at_every_point() {
        let mut whole = StreamDecoder::new();
        let expected = decode_all(&mut whole, &FADER_IN5);

        for split in 1..FADER_IN5.len() {
            let mut decoder = StreamDecoder::new();
            let first = decode_all(&mut decoder, &FADER_IN5[..split]);
            assert!(first.is_empty(), "split {}", split);
            let second = decode_all(&mut decoder, &FADER_IN5[split..]);
            assert_eq!(second, expected, "split {}", split);
        }
    }

    #[test]
    fn test_false_fader_marker_resyncs_one_byte() {
        let mut decoder = StreamDecoder::new();
        let mut data = vec![0xB0, 0x00, 0x00, 0xC0, 0x05, 0x00, 0x00];
        data.extend_from_slice(&[0x90, 0x61, 0x7F]);
        let events = decode_all(&mut decoder, &data);

        assert_eq!(decoder.stats().resyncs, 1);
        assert_eq!(
            events.last(),
            Some(&DecodedEvent::MuteChanged { address: addr(ChannelType::Mix, 2), muted: true })
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_keepalive_bytes_are_skipped() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &[0xFE, 0x90, 0x20]);
        assert!(events.is_empty());
        assert_eq!(decoder.pending(), 2);

        let events = decode_all(&mut decoder, &[0x7F]);
        assert_eq!(
            events,
            vec![DecodedEvent::MuteChanged { address: addr(ChannelType::Input, 1), muted: true }]
        );
        assert_eq!(decoder.stats().keepalives, 1);
    }

    #[test]
    fn test_keepalive_between_messages() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &[0xFE, 0xFE, 0x90, 0x00, 0x7F, 0xFE]);
        assert_eq!(events.len(), 1);
        assert_eq!(decoder.stats().keepalives, 3);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_name_response() {
        let mut decoder = StreamDecoder::new();
        let mut msg = SYSEX_HEADER.to_vec();
        msg.extend_from_slice(&[0x02, 0x21, b'V', b'o', b'x', 0x00, 0x00, 0xF7]);
        let events = decode_all(&mut decoder, &msg);
        assert_eq!(
            events,
            vec![DecodedEvent::NameReceived {
                address: addr(ChannelType::Input, 2),
                name: "Vox".to_string()
            }]
        );
    }

    #[test]
    fn test_name_response_split_across_reads() {
        let mut decoder = StreamDecoder::new();
        let mut msg = SYSEX_HEADER.to_vec();
        msg.extend_from_slice(&[0x02, 0x62, b' ', b'L', b'R', 0x85, b' ', 0xF7]);

        assert!(decode_all(&mut decoder, &msg[..6]).is_empty());
        let events = decode_all(&mut decoder, &msg[6..]);
        assert_eq!(
            events,
            vec![DecodedEvent::NameReceived {
                address: addr(ChannelType::Mix, 3),
                name: "LR".to_string()
            }]
        );
    }

    #[test]
    fn test_name_request_echo_is_ignored() {
        let mut decoder = StreamDecoder::new();
        let mut msg = SYSEX_HEADER.to_vec();
        msg.extend_from_slice(&[0x01, 0x21, 0xF7]);
        msg.extend_from_slice(&[0xF0, 0x7E, 0x00, 0xF7]);
        let events = decode_all(&mut decoder, &msg);
        assert!(events.is_empty());
        assert_eq!(decoder.stats().messages, 2);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_unterminated_sysex_waits_then_discards() {
        let mut decoder = StreamDecoder::new();
        let mut data = vec![0xF0];
        data.extend(std::iter::repeat(0x41).take(100));
        assert!(decode_all(&mut decoder, &data).is_empty());
        assert_eq!(decoder.pending(), 101);

        assert!(decode_all(&mut decoder, &[0x41; 40]).is_empty());
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.stats().discarded, 141);

        // Decoding resumes on the next message
        let events = decode_all(&mut decoder, &[0x90, 0x00, 0x7F]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_garbage_bytes_are_dropped_one_at_a_time() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &[0x12, 0x34, 0x90, 0x20, 0x7F]);
        assert_eq!(
            events,
            vec![
                DecodedEvent::Unrecognized { raw: vec![0x12] },
                DecodedEvent::Unrecognized { raw: vec![0x34] },
                DecodedEvent::MuteChanged { address: addr(ChannelType::Input, 1), muted: true },
            ]
        );
    }

    #[test]
    fn test_high_code_is_unrecognized() {
        let mut decoder = StreamDecoder::new();
        let events = decode_all(&mut decoder, &[0x90, 0x85, 0x7F]);
        assert_eq!(events, vec![DecodedEvent::Unrecognized { raw: vec![0x90, 0x85, 0x7F] }]);
    }

    #[test]
    fn test_overflow_clears_buffer_and_recovers() {
        let mut decoder = StreamDecoder::new();
        // A SysEx opener followed by more than MAX_BUFFER bytes in a single feed
        let mut data = vec![0xF0];
        data.extend(std::iter::repeat(0x00).take(MAX_BUFFER + 10));
        assert!(decode_all(&mut decoder, &data).is_empty());
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.stats().discarded, (MAX_BUFFER + 11) as u64);

        let events = decode_all(&mut decoder, &FADER_IN5);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_large_feed_of_valid_messages_is_fully_decoded() {
        let mut decoder = StreamDecoder::new();
        let data: Vec<u8> = std::iter::repeat([0x90, 0x20, 0x7F]).take(400).flatten().collect();
        assert!(data.len() > MAX_BUFFER);

        let events = decode_all(&mut decoder, &data);
        assert_eq!(events.len(), 400);
        assert!(events.iter().all(|e| *e
            == DecodedEvent::MuteChanged { address: addr(ChannelType::Input, 1), muted: true }));
        assert_eq!(decoder.stats().discarded, 0);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_status_byte_in_fader_level_resyncs() {
        let mut decoder = StreamDecoder::new();
        let data = [0xB0, 0x63, 0x20, 0x62, 0x17, 0x06, 0x90, 0x21, 0x7F];
        let events = decode_all(&mut decoder, &data);

        assert!(!events.iter().any(|e| matches!(e, DecodedEvent::FaderChanged { .. })));
        assert_eq!(
            events.last(),
            Some(&DecodedEvent::MuteChanged { address: addr(ChannelType::Input, 2), muted: true })
        );
        assert_eq!(decoder.stats().resyncs, 1);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decode_name_filters_and_trims() {
        assert_eq!(decode_name(b"  Kick In \x00\x00"), "Kick In");
        assert_eq!(decode_name(&[0x01, b'A', 0xC3, 0xA9, b'B', 0x7F]), "AB");
        assert_eq!(decode_name(&[]), "");
    }
}
