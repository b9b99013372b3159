use crate::bits::flip_nibble;
use crate::error::PacketError;

/// RTP protocol version carried by every valid packet.
pub const RTP_VERSION: u8 = 2;

/// Length of the fixed RTP header in bytes.
pub const FIXED_HEADER_LEN: usize = 12;

/// Length of the header-extension preamble (profile id + word count).
const EXTENSION_PREAMBLE_LEN: usize = 4;

/// RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Byte 0 is `V(7..6) P(5) X(4) CC(3..0)`, byte 1 is `M(7) PT(6..0)`, and
/// the remaining fields are big-endian.
///
/// The CC nibble is stored bit-reversed on the wire by the upload agents.
/// [`decode`](Self::decode) and [`encode`](Self::encode) both pass it
/// through [`flip_nibble`], so `csrc_count` always holds the logical count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Protocol version (2 bits).
    pub version: u8,
    /// Padding flag: the payload ends with padding octets.
    pub padding: bool,
    /// Extension flag: a header extension follows the CSRC list.
    pub extension: bool,
    /// Number of CSRC identifiers following the fixed header (0–15).
    pub csrc_count: u8,
    /// Marker bit; for H.264 it flags the last packet of an access unit.
    pub marker: bool,
    /// Payload type (7 bits, RFC 3551).
    pub payload_type: u8,
    /// Sequence number, wrapping modulo 65536.
    pub sequence_number: u16,
    /// Media clock timestamp.
    pub timestamp: u32,
    /// Synchronization source identifier.
    pub ssrc: u32,
}

impl RtpHeader {
    /// Decode the 12-byte fixed header at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(PacketError::TooShort { len: buf.len() });
        }

        let b0 = buf[0];
        let b1 = buf[1];

        let version = b0 >> 6;
        if version != RTP_VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            padding: b0 & 0b0010_0000 != 0,
            extension: b0 & 0b0001_0000 != 0,
            csrc_count: flip_nibble(b0 & 0x0F),
            marker: b1 & 0x80 != 0,
            payload_type: b1 & 0x7F,
            sequence_number: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// Serialize the fixed header in wire order.
    ///
    /// Only needed for round-trips and fixtures; ingestion never writes RTP.
    pub fn encode(&self) -> [u8; FIXED_HEADER_LEN] {
        let first_byte = ((self.version & 0x03) << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | flip_nibble(self.csrc_count);
        let second_byte = ((self.marker as u8) << 7) | (self.payload_type & 0x7F);

        let mut header = [0u8; FIXED_HEADER_LEN];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        header
    }

    /// Bytes occupied by the fixed header plus the CSRC list.
    pub fn csrc_end(&self) -> usize {
        FIXED_HEADER_LEN + 4 * self.csrc_count as usize
    }
}

/// RTP header extension (RFC 3550 §5.3.1).
///
/// `data` borrows the `4 * length` opaque bytes that follow the preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeaderExtension<'a> {
    /// Profile-specific identifier.
    pub profile: u16,
    /// Number of 32-bit words following the preamble.
    pub length: u16,
    /// The extension words, uninterpreted.
    pub data: &'a [u8],
}

impl RtpHeaderExtension<'_> {
    /// Total bytes on the wire, preamble included.
    pub fn wire_len(&self) -> usize {
        EXTENSION_PREAMBLE_LEN + 4 * self.length as usize
    }
}

/// A parsed RTP packet borrowing from the input buffer.
///
/// Nothing is copied: the CSRC list, extension and payload are all views
/// into the slice given to [`parse`](Self::parse).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub header: RtpHeader,
    csrc: &'a [u8],
    pub extension: Option<RtpHeaderExtension<'a>>,
    payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse one RTP packet.
    ///
    /// Consumes the fixed header, `4 * csrc_count` bytes of CSRC ids and,
    /// when the extension flag is set, the extension preamble and its words.
    /// Whatever remains (possibly nothing) is the payload. Padding is left in
    /// the payload.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        let header = RtpHeader::decode(buf)?;

        let csrc_end = header.csrc_end();
        if buf.len() < csrc_end {
            return Err(PacketError::TruncatedCsrc {
                count: header.csrc_count,
                available: buf.len() - FIXED_HEADER_LEN,
            });
        }
        let csrc = &buf[FIXED_HEADER_LEN..csrc_end];
        let mut cursor = csrc_end;

        let extension = if header.extension {
            let available = buf.len() - cursor;
            if available < EXTENSION_PREAMBLE_LEN {
                return Err(PacketError::TruncatedExtension {
                    needed: EXTENSION_PREAMBLE_LEN,
                    available,
                });
            }
            let profile = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
            let length = u16::from_be_bytes([buf[cursor + 2], buf[cursor + 3]]);
            let needed = EXTENSION_PREAMBLE_LEN + 4 * length as usize;
            if available < needed {
                return Err(PacketError::TruncatedExtension { needed, available });
            }
            let data = &buf[cursor + EXTENSION_PREAMBLE_LEN..cursor + needed];
            cursor += needed;
            Some(RtpHeaderExtension {
                profile,
                length,
                data,
            })
        } else {
            None
        };

        Ok(Self {
            header,
            csrc,
            extension,
            payload: &buf[cursor..],
        })
    }

    /// Contributing source identifiers, in wire order.
    pub fn csrcs(&self) -> impl Iterator<Item = u32> + use<'a> {
        self.csrc
            .chunks_exact(4)
            .map(|id| u32::from_be_bytes([id[0], id[1], id[2], id[3]]))
    }

    /// Bytes consumed before the payload.
    pub fn header_len(&self) -> usize {
        self.header.csrc_end() + self.extension.map_or(0, |ext| ext.wire_len())
    }

    /// The payload view.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> RtpHeader {
        RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: true,
            payload_type: 96,
            sequence_number: 1000,
            timestamp: 90000,
            ssrc: 0xdeadbeef,
        }
    }

    #[test]
    fn header_round_trip() {
        let header = make_header();
        let wire = header.encode();
        assert_eq!(RtpHeader::decode(&wire).unwrap(), header);
    }

    #[test]
    fn wire_layout() {
        let wire = make_header().encode();
        assert_eq!(wire[0] >> 6, 2);
        assert_eq!(wire[1], 0x80 | 96);
        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]), 1000);
        assert_eq!(
            u32::from_be_bytes([wire[4], wire[5], wire[6], wire[7]]),
            90000
        );
        assert_eq!(&wire[8..12], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn eleven_bytes_too_short() {
        let wire = make_header().encode();
        assert_eq!(
            RtpPacket::parse(&wire[..11]),
            Err(PacketError::TooShort { len: 11 })
        );
    }

    #[test]
    fn announced_csrc_missing() {
        let header = RtpHeader {
            csrc_count: 1,
            ..make_header()
        };
        let wire = header.encode();
        assert_eq!(
            RtpPacket::parse(&wire),
            Err(PacketError::TruncatedCsrc {
                count: 1,
                available: 0
            })
        );
    }

    #[test]
    fn csrc_nibble_is_bit_reversed_on_wire() {
        let header = RtpHeader {
            csrc_count: 1,
            ..make_header()
        };
        let wire = header.encode();
        assert_eq!(wire[0] & 0x0F, 0b1000);

        // A raw nibble of 0b0100 reads back as two CSRC ids.
        let mut raw = make_header().encode().to_vec();
        raw[0] |= 0b0100;
        raw.extend_from_slice(&[0, 0, 0, 7, 0, 0, 0, 9, 0xAB]);
        let packet = RtpPacket::parse(&raw).unwrap();
        assert_eq!(packet.header.csrc_count, 2);
        assert_eq!(packet.csrcs().collect::<Vec<_>>(), vec![7, 9]);
        assert_eq!(packet.payload(), &[0xAB]);
    }

    #[test]
    fn rejects_version_one() {
        let mut wire = make_header().encode();
        wire[0] = (wire[0] & 0x3F) | (1 << 6);
        assert_eq!(
            RtpPacket::parse(&wire),
            Err(PacketError::UnsupportedVersion(1))
        );
    }

    #[test]
    fn payload_after_fixed_header() {
        let mut wire = make_header().encode().to_vec();
        wire.extend_from_slice(&[0x65, 0x88, 0x80]);
        let packet = RtpPacket::parse(&wire).unwrap();
        assert_eq!(packet.header_len(), 12);
        assert_eq!(packet.payload(), &[0x65, 0x88, 0x80]);
        assert!(packet.extension.is_none());
    }

    #[test]
    fn empty_payload_is_valid() {
        let wire = make_header().encode();
        let packet = RtpPacket::parse(&wire).unwrap();
        assert_eq!(packet.payload_size(), 0);
    }

    #[test]
    fn extension_skipped() {
        let header = RtpHeader {
            extension: true,
            ..make_header()
        };
        let mut wire = header.encode().to_vec();
        wire.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01]);
        wire.extend_from_slice(&[1, 2, 3, 4]);
        wire.extend_from_slice(&[0x41, 0x9A]);

        let packet = RtpPacket::parse(&wire).unwrap();
        let ext = packet.extension.unwrap();
        assert_eq!(ext.profile, 0xBEDE);
        assert_eq!(ext.length, 1);
        assert_eq!(ext.data, &[1, 2, 3, 4]);
        assert_eq!(packet.header_len(), 20);
        assert_eq!(packet.payload(), &[0x41, 0x9A]);
    }

    #[test]
    fn extension_preamble_truncated() {
        let header = RtpHeader {
            extension: true,
            ..make_header()
        };
        let mut wire = header.encode().to_vec();
        wire.extend_from_slice(&[0xBE, 0xDE]);
        assert_eq!(
            RtpPacket::parse(&wire),
            Err(PacketError::TruncatedExtension {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn extension_words_truncated() {
        let header = RtpHeader {
            extension: true,
            ..make_header()
        };
        let mut wire = header.encode().to_vec();
        wire.extend_from_slice(&[0x10, 0x00, 0x00, 0x02]);
        wire.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(
            RtpPacket::parse(&wire),
            Err(PacketError::TruncatedExtension {
                needed: 12,
                available: 8
            })
        );
    }

    #[test]
    fn sequence_number_wraps_through_encode() {
        let header = RtpHeader {
            sequence_number: u16::MAX,
            ..make_header()
        };
        let next = RtpHeader {
            sequence_number: header.sequence_number.wrapping_add(1),
            ..header
        };
        assert_eq!(RtpHeader::decode(&next.encode()).unwrap().sequence_number, 0);
    }
}
