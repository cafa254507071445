//! Wire frame header and body codecs.
//!
//! Every frame is a 9-byte header (network byte order) followed by a
//! `data_type`-specific body. Decoding never allocates on failure and never
//! mutates caller state; it either returns a fully-formed value or a
//! [`FrameError`] describing exactly which field was wrong.

use std::fmt;

pub const SIGNATURE: u16 = 0xAA55;
pub const VERSION: u8 = 1;

pub const SUBSCRIBE: u8 = 0x01;
pub const DATA: u8 = 0x02;
pub const ALIVE: u8 = 0x03;

pub const MAX_BODY_LEN: u32 = 10 * 1024 * 1024;

/// Bit 0 of a Subscribe body's `data_type_mask`.
pub const MASK_WHALE: u8 = 0b01;
/// Bit 1 of a Subscribe body's `data_type_mask`.
pub const MASK_VWAP: u8 = 0b10;

#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    BadSignature(u16),
    BadVersion(u8),
    BadMsgNum(u8),
    BodyTooLarge(u32),
    UnknownDataType(u8),
    Truncated { expected: usize, got: usize },
    SymbolTooLong(usize),
    UnknownSymbol,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSignature(s) => write!(f, "bad signature: 0x{s:04X} (expected 0x{SIGNATURE:04X})"),
            Self::BadVersion(v) => write!(f, "unsupported version: {v} (expected {VERSION})"),
            Self::BadMsgNum(n) => write!(f, "unexpected msg_num: {n} (expected 0)"),
            Self::BodyTooLarge(n) => write!(f, "body length {n} exceeds cap {MAX_BODY_LEN}"),
            Self::UnknownDataType(t) => write!(f, "unknown data_type: 0x{t:02X}"),
            Self::Truncated { expected, got } => {
                write!(f, "truncated frame: expected {expected} bytes, got {got}")
            }
            Self::SymbolTooLong(n) => write!(f, "symbol length {n} exceeds u8 range"),
            Self::UnknownSymbol => write!(f, "symbol not found in registry"),
        }
    }
}

impl std::error::Error for FrameError {}

/// The 9-byte frame header, decoded from its wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub data_type: u8,
    pub msg_num: u8,
    pub len: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 9;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&SIGNATURE.to_be_bytes());
        buf[2] = VERSION;
        buf[3] = self.data_type;
        buf[4] = self.msg_num;
        buf[5..9].copy_from_slice(&self.len.to_be_bytes());
        buf
    }

    /// Validates signature, version, body-length cap, and that `data_type`
    /// is one of the three known frame kinds. `msg_num` semantics (e.g. "must
    /// be 0 for Subscribe") are direction- and state-dependent, so they are
    /// checked by the caller, not here.
    pub fn decode(buf: &[u8; Self::SIZE]) -> Result<Self, FrameError> {
        let signature = u16::from_be_bytes([buf[0], buf[1]]);
        if signature != SIGNATURE {
            return Err(FrameError::BadSignature(signature));
        }
        let version = buf[2];
        if version != VERSION {
            return Err(FrameError::BadVersion(version));
        }
        let data_type = buf[3];
        if !matches!(data_type, SUBSCRIBE | DATA | ALIVE) {
            return Err(FrameError::UnknownDataType(data_type));
        }
        let msg_num = buf[4];
        let len = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);
        if len > MAX_BODY_LEN {
            return Err(FrameError::BodyTooLarge(len));
        }
        Ok(Self {
            data_type,
            msg_num,
            len,
        })
    }
}

/// Assemble a complete frame (header + body) ready to write to a socket.
pub fn build_frame(data_type: u8, msg_num: u8, body: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        data_type,
        msg_num,
        len: body.len() as u32,
    };
    let mut out = Vec::with_capacity(FrameHeader::SIZE + body.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(body);
    out
}

/// Client → server Subscribe body.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeBody {
    pub data_type_mask: u8,
    pub symbol: String,
    pub whale_threshold: f64,
}

impl SubscribeBody {
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let symbol_bytes = self.symbol.as_bytes();
        if symbol_bytes.len() > u8::MAX as usize {
            return Err(FrameError::SymbolTooLong(symbol_bytes.len()));
        }
        let mut out = Vec::with_capacity(2 + symbol_bytes.len() + 8);
        out.push(self.data_type_mask);
        out.push(symbol_bytes.len() as u8);
        out.extend_from_slice(symbol_bytes);
        out.extend_from_slice(&self.whale_threshold.to_bits().to_be_bytes());
        Ok(out)
    }

    pub fn decode(body: &[u8]) -> Result<Self, FrameError> {
        if body.len() < 2 {
            return Err(FrameError::Truncated {
                expected: 2,
                got: body.len(),
            });
        }
        let data_type_mask = body[0];
        let symbol_len = body[1] as usize;
        let expected = 2 + symbol_len + 8;
        if body.len() < expected {
            return Err(FrameError::Truncated {
                expected,
                got: body.len(),
            });
        }
        let symbol = String::from_utf8_lossy(&body[2..2 + symbol_len]).into_owned();
        let threshold_bytes: [u8; 8] = body[2 + symbol_len..expected].try_into().unwrap();
        let whale_threshold = f64::from_bits(u64::from_be_bytes(threshold_bytes));
        Ok(Self {
            data_type_mask,
            symbol,
            whale_threshold,
        })
    }
}

/// A single record inside a Data (0x02) frame body.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub price: f64,
    pub quantity: f64,
    pub is_sell: bool,
    pub timestamp_ms: u64,
    pub symbol: String,
    pub vwap_session: f64,
    pub vwap_roll50: f64,
    pub delta_roll: f64,
}

impl DataRecord {
    fn encoded_len(&self) -> usize {
        8 + 8 + 1 + 8 + 2 + self.symbol.len() + 8 + 8 + 8
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), FrameError> {
        let symbol_bytes = self.symbol.as_bytes();
        if symbol_bytes.len() > u16::MAX as usize {
            return Err(FrameError::SymbolTooLong(symbol_bytes.len()));
        }
        out.extend_from_slice(&self.price.to_bits().to_be_bytes());
        out.extend_from_slice(&self.quantity.to_bits().to_be_bytes());
        out.push(self.is_sell as u8);
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out.extend_from_slice(&(symbol_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(symbol_bytes);
        out.extend_from_slice(&self.vwap_session.to_bits().to_be_bytes());
        out.extend_from_slice(&self.vwap_roll50.to_bits().to_be_bytes());
        out.extend_from_slice(&self.delta_roll.to_bits().to_be_bytes());
        Ok(())
    }

    fn decode_from(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        let mut cursor = 0usize;
        let need = |cursor: usize, n: usize| -> Result<(), FrameError> {
            if buf.len() < cursor + n {
                Err(FrameError::Truncated {
                    expected: cursor + n,
                    got: buf.len(),
                })
            } else {
                Ok(())
            }
        };

        need(cursor, 8)?;
        let price = f64::from_bits(u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap()));
        cursor += 8;

        need(cursor, 8)?;
        let quantity = f64::from_bits(u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap()));
        cursor += 8;

        need(cursor, 1)?;
        let is_sell = buf[cursor] != 0;
        cursor += 1;

        need(cursor, 8)?;
        let timestamp_ms = u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;

        need(cursor, 2)?;
        let symbol_len = u16::from_be_bytes(buf[cursor..cursor + 2].try_into().unwrap()) as usize;
        cursor += 2;

        need(cursor, symbol_len)?;
        let symbol = String::from_utf8_lossy(&buf[cursor..cursor + symbol_len]).into_owned();
        cursor += symbol_len;

        need(cursor, 8)?;
        let vwap_session =
            f64::from_bits(u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap()));
        cursor += 8;

        need(cursor, 8)?;
        let vwap_roll50 =
            f64::from_bits(u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap()));
        cursor += 8;

        need(cursor, 8)?;
        let delta_roll =
            f64::from_bits(u64::from_be_bytes(buf[cursor..cursor + 8].try_into().unwrap()));
        cursor += 8;

        Ok((
            Self {
                price,
                quantity,
                is_sell,
                timestamp_ms,
                symbol,
                vwap_session,
                vwap_roll50,
                delta_roll,
            },
            cursor,
        ))
    }
}

/// Encode a full Data-frame body: `count: u32 BE` followed by each record
/// in dispatch order.
pub fn encode_data_body(records: &[DataRecord]) -> Result<Vec<u8>, FrameError> {
    let body_len: usize = 4 + records.iter().map(DataRecord::encoded_len).sum::<usize>();
    let mut out = Vec::with_capacity(body_len);
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for r in records {
        r.encode_into(&mut out)?;
    }
    Ok(out)
}

pub fn decode_data_body(body: &[u8]) -> Result<Vec<DataRecord>, FrameError> {
    if body.len() < 4 {
        return Err(FrameError::Truncated {
            expected: 4,
            got: body.len(),
        });
    }
    let count = u32::from_be_bytes(body[0..4].try_into().unwrap()) as usize;
    let mut records = Vec::with_capacity(count);
    let mut cursor = 4usize;
    for _ in 0..count {
        let (record, used) = DataRecord::decode_from(&body[cursor..])?;
        cursor += used;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let h = FrameHeader {
            data_type: DATA,
            msg_num: 7,
            len: 128,
        };
        let bytes = h.encode();
        assert_eq!(FrameHeader::decode(&bytes).unwrap(), h);
    }

    #[test]
    fn header_rejects_bad_signature() {
        let mut bytes = FrameHeader {
            data_type: DATA,
            msg_num: 0,
            len: 0,
        }
        .encode();
        bytes[0] = 0;
        assert_eq!(
            FrameHeader::decode(&bytes),
            Err(FrameError::BadSignature(0x00AA))
        );
    }

    #[test]
    fn header_rejects_oversized_body() {
        let bytes = FrameHeader {
            data_type: SUBSCRIBE,
            msg_num: 0,
            len: MAX_BODY_LEN + 1,
        }
        .encode();
        assert_eq!(
            FrameHeader::decode(&bytes),
            Err(FrameError::BodyTooLarge(MAX_BODY_LEN + 1))
        );
    }

    #[test]
    fn header_rejects_unknown_data_type() {
        let bytes = FrameHeader {
            data_type: 0x7F,
            msg_num: 0,
            len: 0,
        }
        .encode();
        assert_eq!(
            FrameHeader::decode(&bytes),
            Err(FrameError::UnknownDataType(0x7F))
        );
    }

    #[test]
    fn subscribe_body_round_trips() {
        let body = SubscribeBody {
            data_type_mask: MASK_WHALE | MASK_VWAP,
            symbol: "BTCUSDT".to_string(),
            whale_threshold: 100_000.0,
        };
        let encoded = body.encode().unwrap();
        assert_eq!(SubscribeBody::decode(&encoded).unwrap(), body);
    }

    #[test]
    fn subscribe_body_rejects_truncated_input() {
        let body = SubscribeBody {
            data_type_mask: MASK_WHALE,
            symbol: "ETHUSDT".to_string(),
            whale_threshold: 70_000.0,
        };
        let mut encoded = body.encode().unwrap();
        encoded.truncate(encoded.len() - 3);
        assert!(SubscribeBody::decode(&encoded).is_err());
    }

    #[test]
    fn data_body_round_trips_multiple_records() {
        let records = vec![
            DataRecord {
                price: 96000.0,
                quantity: 1.2,
                is_sell: true,
                timestamp_ms: 1_700_000_000_000,
                symbol: "BTCUSDT".to_string(),
                vwap_session: 95675.67,
                vwap_roll50: 0.0,
                delta_roll: 0.0,
            },
            DataRecord {
                price: 2700.0,
                quantity: 30.0,
                is_sell: false,
                timestamp_ms: 1_700_000_000_500,
                symbol: "ETHUSDT".to_string(),
                vwap_session: 2699.1,
                vwap_roll50: 2695.4,
                delta_roll: 4.6,
            },
        ];
        let encoded = encode_data_body(&records).unwrap();
        let decoded = decode_data_body(&encoded).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn data_body_with_zero_records_round_trips() {
        let encoded = encode_data_body(&[]).unwrap();
        assert_eq!(decode_data_body(&encoded).unwrap(), vec![]);
    }

    #[test]
    fn full_frame_begins_with_signature_and_matching_length() {
        let body = encode_data_body(&[]).unwrap();
        let frame = build_frame(DATA, 0, &body);
        assert_eq!(&frame[0..2], &SIGNATURE.to_be_bytes());
        assert_eq!(frame[2], VERSION);
        let len = u32::from_be_bytes(frame[5..9].try_into().unwrap());
        assert_eq!(len as usize, body.len());
    }
}
