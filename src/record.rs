//! Flow record schema and wire codec
//!
//! Records arrive as fixed-size frames; integers are big-endian, addresses
//! are the raw 16-byte slot described in [`crate::net::FlowAddr`]. Flagged
//! records are re-encoded with the exact inverse layout, so forwarding is
//! byte-identical.
//!
//! Wire layout (75 bytes):
//!
//! | offset | size | field        |
//! |-------:|-----:|--------------|
//! |      0 |   16 | src_addr     |
//! |     16 |   16 | dst_addr     |
//! |     32 |    8 | first        |
//! |     40 |    8 | last         |
//! |     48 |    8 | linkbitfield |
//! |     56 |    8 | bytes        |
//! |     64 |    4 | packets      |
//! |     68 |    2 | src_port     |
//! |     70 |    2 | dst_port     |
//! |     72 |    1 | protocol     |
//! |     73 |    1 | tcp_flags    |
//! |     74 |    1 | dirbitfield  |

use crate::error::{Result, SpoofmonError};
use crate::net::{AddrFamily, FlowAddr};

/// Size of one record frame on the wire.
pub const RECORD_WIRE_SIZE: usize = 75;

/// A unidirectional flow record.
///
/// `first` and `last` carry seconds since the epoch in their upper 32
/// bits; the lower 32 bits are sub-second fraction and are never
/// interpreted by the filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    pub src_addr: FlowAddr,
    pub dst_addr: FlowAddr,
    pub first: u64,
    pub last: u64,
    pub linkbitfield: u64,
    pub bytes: u64,
    pub packets: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub tcp_flags: u8,
    pub dirbitfield: u8,
}

impl Default for FlowRecord {
    fn default() -> Self {
        Self {
            src_addr: FlowAddr::from_v4(std::net::Ipv4Addr::UNSPECIFIED),
            dst_addr: FlowAddr::from_v4(std::net::Ipv4Addr::UNSPECIFIED),
            first: 0,
            last: 0,
            linkbitfield: 0,
            bytes: 0,
            packets: 0,
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            tcp_flags: 0,
            dirbitfield: 0,
        }
    }
}

impl FlowRecord {
    /// Decode one frame. The frame must be exactly [`RECORD_WIRE_SIZE`]
    /// bytes; callers handle the short end-of-stream marker themselves.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() != RECORD_WIRE_SIZE {
            return Err(SpoofmonError::RecordSize {
                expected: RECORD_WIRE_SIZE,
                got: frame.len(),
            });
        }

        let u64_at = |off: usize| u64::from_be_bytes(frame[off..off + 8].try_into().unwrap());

        Ok(Self {
            src_addr: FlowAddr::from_wire(frame[0..16].try_into().unwrap()),
            dst_addr: FlowAddr::from_wire(frame[16..32].try_into().unwrap()),
            first: u64_at(32),
            last: u64_at(40),
            linkbitfield: u64_at(48),
            bytes: u64_at(56),
            packets: u32::from_be_bytes(frame[64..68].try_into().unwrap()),
            src_port: u16::from_be_bytes(frame[68..70].try_into().unwrap()),
            dst_port: u16::from_be_bytes(frame[70..72].try_into().unwrap()),
            protocol: frame[72],
            tcp_flags: frame[73],
            dirbitfield: frame[74],
        })
    }

    pub fn encode(&self) -> [u8; RECORD_WIRE_SIZE] {
        let mut out = [0u8; RECORD_WIRE_SIZE];
        out[0..16].copy_from_slice(self.src_addr.octets());
        out[16..32].copy_from_slice(self.dst_addr.octets());
        out[32..40].copy_from_slice(&self.first.to_be_bytes());
        out[40..48].copy_from_slice(&self.last.to_be_bytes());
        out[48..56].copy_from_slice(&self.linkbitfield.to_be_bytes());
        out[56..64].copy_from_slice(&self.bytes.to_be_bytes());
        out[64..68].copy_from_slice(&self.packets.to_be_bytes());
        out[68..70].copy_from_slice(&self.src_port.to_be_bytes());
        out[70..72].copy_from_slice(&self.dst_port.to_be_bytes());
        out[72] = self.protocol;
        out[73] = self.tcp_flags;
        out[74] = self.dirbitfield;
        out
    }

    /// Family of the record, taken from the source address.
    pub fn family(&self) -> AddrFamily {
        self.src_addr.family()
    }

    pub fn is_outbound(&self) -> bool {
        self.dirbitfield == 0
    }

    pub fn is_inbound(&self) -> bool {
        self.dirbitfield == 1
    }

    /// Flow start in whole seconds (upper 32 bits of `first`).
    pub fn first_secs(&self) -> u64 {
        self.first >> 32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v4() -> FlowRecord {
        FlowRecord {
            src_addr: FlowAddr::from_ip("192.0.2.5".parse().unwrap()),
            dst_addr: FlowAddr::from_ip("203.0.113.1".parse().unwrap()),
            first: 1_700_000_000u64 << 32 | 0x8000_0000,
            last: 1_700_000_010u64 << 32,
            linkbitfield: 0b0010,
            bytes: 1420,
            packets: 3,
            src_port: 49152,
            dst_port: 53,
            protocol: 17,
            tcp_flags: 0,
            dirbitfield: 0,
        }
    }

    #[test]
    fn test_codec_roundtrip_v4() {
        let rec = sample_v4();
        let wire = rec.encode();
        assert_eq!(wire.len(), RECORD_WIRE_SIZE);
        let back = FlowRecord::decode(&wire).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.family(), AddrFamily::V4);
        assert_eq!(back.encode(), wire);
    }

    #[test]
    fn test_codec_roundtrip_v6() {
        let rec = FlowRecord {
            src_addr: FlowAddr::from_ip("2001:db8:1::1".parse().unwrap()),
            dst_addr: FlowAddr::from_ip("2001:db8:2::9".parse().unwrap()),
            dirbitfield: 1,
            ..FlowRecord::default()
        };
        let back = FlowRecord::decode(&rec.encode()).unwrap();
        assert_eq!(back.family(), AddrFamily::V6);
        assert_eq!(back.src_addr.to_string(), "2001:db8:1::1");
        assert!(back.is_inbound());
    }

    #[test]
    fn test_decode_rejects_wrong_size() {
        let err = FlowRecord::decode(&[0u8; 40]).unwrap_err();
        assert!(matches!(
            err,
            SpoofmonError::RecordSize {
                expected: RECORD_WIRE_SIZE,
                got: 40
            }
        ));
    }

    #[test]
    fn test_first_secs() {
        let rec = sample_v4();
        assert_eq!(rec.first_secs(), 1_700_000_000);
    }

    #[test]
    fn test_direction_flags() {
        let rec = sample_v4();
        assert!(rec.is_outbound());
        assert!(!rec.is_inbound());

        let inbound = FlowRecord {
            dirbitfield: 1,
            ..sample_v4()
        };
        assert!(inbound.is_inbound());
    }
}
