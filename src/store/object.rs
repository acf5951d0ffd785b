//! store/object — кодек объекта хранилища.
//!
//! Формат записи в chapter-файле (LE):
//! - [object_size u32] — sizeof(hdr) + payload_size
//! - header (16 B): [handle i32][sid u64][size u32]
//! - payload (size байт)
//!
//! На диск sid пишется как SID_VACANT: читатель штампует реальный storage id
//! после чтения, поэтому персистентному полю доверять нельзя.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{OBJECT_HDR_SIZE, SID_VACANT};

/// Объект, материализованный из хранилища.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreObject {
    /// Хэндл store, записавшего объект.
    pub handle: i32,
    /// Storage id, проставленный читателем (1-based).
    pub sid: u64,
    /// Полезная нагрузка (buf1 ++ buf2 из enqueue).
    pub payload: Vec<u8>,
}

impl StoreObject {
    /// Размер полезной нагрузки.
    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Собрать полную запись [u32 size][hdr][data1][data2] для дозаписи.
pub(crate) fn encode_record(handle: i32, data1: &[u8], data2: &[u8]) -> Vec<u8> {
    let data_size = data1.len() + data2.len();
    let object_size = OBJECT_HDR_SIZE + data_size;
    let mut rec = vec![0u8; 4 + object_size];
    LittleEndian::write_u32(&mut rec[0..4], object_size as u32);
    LittleEndian::write_i32(&mut rec[4..8], handle);
    LittleEndian::write_u64(&mut rec[8..16], SID_VACANT);
    LittleEndian::write_u32(&mut rec[16..20], data_size as u32);
    rec[20..20 + data1.len()].copy_from_slice(data1);
    rec[20 + data1.len()..].copy_from_slice(data2);
    rec
}

/// Проставить sid в буфере объекта (hdr + payload).
pub(crate) fn stamp_sid(object_buf: &mut [u8], sid: u64) {
    LittleEndian::write_u64(&mut object_buf[4..12], sid);
}

/// Разобрать буфер объекта (hdr + payload) в StoreObject.
pub(crate) fn decode_object(object_buf: &[u8]) -> Option<StoreObject> {
    if object_buf.len() < OBJECT_HDR_SIZE {
        return None;
    }
    let handle = LittleEndian::read_i32(&object_buf[0..4]);
    let sid = LittleEndian::read_u64(&object_buf[4..12]);
    let size = LittleEndian::read_u32(&object_buf[12..16]) as usize;
    if object_buf.len() < OBJECT_HDR_SIZE + size {
        return None;
    }
    Some(StoreObject {
        handle,
        sid,
        payload: object_buf[OBJECT_HDR_SIZE..OBJECT_HDR_SIZE + size].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip_with_stamped_sid() {
        let rec = encode_record(7, b"AB", b"CD");
        assert_eq!(rec.len(), 4 + 16 + 4);
        assert_eq!(LittleEndian::read_u32(&rec[0..4]), 20);

        // Объект = запись без префикса размера.
        let mut obj = rec[4..].to_vec();
        // На диске sid вакантен.
        assert_eq!(LittleEndian::read_u64(&obj[4..12]), SID_VACANT);

        stamp_sid(&mut obj, 42);
        let o = decode_object(&obj).expect("decode");
        assert_eq!(o.handle, 7);
        assert_eq!(o.sid, 42);
        assert_eq!(o.payload, b"ABCD");
        assert_eq!(o.size(), 4);
    }

    #[test]
    fn decode_rejects_truncated() {
        assert!(decode_object(&[0u8; 8]).is_none());
        let mut rec = encode_record(1, b"XY", b"");
        rec.truncate(rec.len() - 1);
        assert!(decode_object(&rec[4..]).is_none());
    }
}
