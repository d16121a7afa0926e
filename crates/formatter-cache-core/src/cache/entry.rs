use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};

const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 8 + 1;

/// A stored render. Replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub bytes: Bytes,
    /// Record state the bytes were rendered from
    pub change_date: DateTime<Utc>,
    /// Whether anonymous users could view the record at render time
    pub published: bool,
}

impl CacheEntry {
    pub const fn new(bytes: Bytes, change_date: DateTime<Utc>, published: bool) -> Self {
        Self {
            bytes,
            change_date,
            published,
        }
    }

    /// Size used for memory budget accounting
    pub fn weight(&self) -> u32 {
        (self.bytes.len() + HEADER_LEN).try_into().unwrap_or(u32::MAX)
    }

    /// Serialize for the disk tier: `version | change millis (BE) | published | payload`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.bytes.len());
        buf.put_u8(FORMAT_VERSION);
        buf.put_i64(self.change_date.timestamp_millis());
        buf.put_u8(u8::from(self.published));
        buf.put_slice(&self.bytes);
        buf.to_vec()
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(Error::CacheRead(format!(
                "entry truncated ({} bytes)",
                raw.len()
            )));
        }

        let mut buf = raw;
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(Error::CacheRead(format!(
                "unknown entry format version {version}"
            )));
        }

        let millis = buf.get_i64();
        let change_date = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| Error::CacheRead(format!("invalid change date {millis}")))?;
        let published = buf.get_u8() != 0;

        Ok(Self {
            bytes: Bytes::copy_from_slice(buf),
            change_date,
            published,
        })
    }
}
