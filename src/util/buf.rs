use anyhow::anyhow;
use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::{VarIntSupport, VarIntSupportMut};

pub fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_usize_varint(s.len());
    buf.put_slice(s.as_bytes());
}

/// The length prefix is checked against the remaining buffer before anything is
///  allocated, so a mangled prefix cannot trigger a huge allocation.
pub fn try_get_string(buf: &mut impl Buf) -> anyhow::Result<String> {
    let len = buf.try_get_usize_varint()?;
    if buf.remaining() < len {
        return Err(anyhow!("string length {} exceeds the {} remaining bytes", len, buf.remaining()));
    }

    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    Ok(String::from_utf8(raw)?)
}
