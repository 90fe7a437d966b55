//! The server's HASH-partition bucket function.
//!
//! A HASH partition scheme with `b` buckets places a value in bucket `hash_bucket(v, b)`. The
//! client must compute exactly the bucket the server would, so the arithmetic here is pinned by
//! test vectors rather than chosen for distribution quality:
//!
//! * 8/16/32-bit integers (and the 32-bit temporal types) use `v % b`, with negative values first
//!   reinterpreted through `v + 2^32`.
//! * 64-bit integers (and the 64-bit temporal types) use `v % b`, with negative values folded
//!   through `i64::MAX`.
//! * Strings use MurmurHash2 over the server's modified UTF-8 encoding.
//! * 128-bit values (UUID, IPADDR, INT128) use MurmurHash2 over their four 32-bit words.
//!
//! Null values, floating point values and types the server does not hash have no bucket.

use crate::{Cell, DataType};

const M: u32 = 0x5bd1e995;
const R: u32 = 24;
const INT128_SEED: u32 = 16;

/// The bucket in `0..buckets` the server assigns `cell`, a value of `data_type`.
pub fn hash_bucket(data_type: DataType, cell: &Cell, buckets: usize) -> Option<usize> {
    if buckets == 0 || cell.is_null() {
        return None;
    }
    match (data_type, cell) {
        (DataType::Char, Cell::I8(v)) => Some(narrow_bucket(i64::from(*v), buckets)),
        (DataType::Short, Cell::I16(v)) => Some(narrow_bucket(i64::from(*v), buckets)),
        (
            DataType::Int
            | DataType::Date
            | DataType::Month
            | DataType::Time
            | DataType::Minute
            | DataType::Second
            | DataType::Datetime
            | DataType::DateHour
            | DataType::DateMinute,
            Cell::I32(v),
        ) => Some(narrow_bucket(i64::from(*v), buckets)),
        (
            DataType::Long | DataType::Timestamp | DataType::NanoTime | DataType::NanoTimestamp,
            Cell::I64(v),
        ) => Some(long_bucket(*v, buckets)),
        (DataType::String | DataType::Symbol, Cell::Text(s)) => {
            Some(string_hash(s) as usize % buckets)
        }
        (DataType::Uuid | DataType::Ip | DataType::Int128, Cell::I128(v)) => {
            Some(int128_hash(*v as u128) as usize % buckets)
        }
        _ => None,
    }
}

fn narrow_bucket(v: i64, buckets: usize) -> usize {
    let b = buckets as i64;
    if v >= 0 {
        (v % b) as usize
    } else {
        ((v + (1_i64 << 32)) % b) as usize
    }
}

fn long_bucket(v: i64, buckets: usize) -> usize {
    let b = buckets as i64;
    if v >= 0 {
        (v % b) as usize
    } else {
        // i64::MAX + v cannot overflow for v in (i64::MIN, 0)
        (((i64::MAX % b) + 2 + ((i64::MAX + v) % b)) % b) as usize
    }
}

/// Encode `s` the way the server does before hashing: NUL takes two bytes and every character
/// above U+07FF takes exactly three.
pub fn modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        let c = c as u32;
        match c {
            0x01..=0x7f => out.push(c as u8),
            0x00 | 0x80..=0x7ff => {
                out.push((0xc0 | ((c >> 6) & 0x1f)) as u8);
                out.push((0x80 | (c & 0x3f)) as u8);
            }
            _ => {
                out.push((0xe0 | ((c >> 12) & 0x0f)) as u8);
                out.push((0x80 | ((c >> 6) & 0x3f)) as u8);
                out.push((0x80 | (c & 0x3f)) as u8);
            }
        }
    }
    out
}

fn string_hash(s: &str) -> u32 {
    let bytes = modified_utf8(s);
    murmur2(&bytes, bytes.len() as u32)
}

/// 32-bit MurmurHash2 of `data`.
pub fn murmur2(data: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h = mix(h, k);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        for (i, byte) in tail.iter().enumerate() {
            h ^= u32::from(*byte) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    finalize(h)
}

fn int128_hash(v: u128) -> u32 {
    let low = v as u64;
    let high = (v >> 64) as u64;
    let words = [low as u32, (low >> 32) as u32, high as u32, (high >> 32) as u32];
    finalize(words.into_iter().fold(INT128_SEED, mix))
}

fn mix(h: u32, k: u32) -> u32 {
    let mut k = k.wrapping_mul(M);
    k ^= k >> R;
    k = k.wrapping_mul(M);
    h.wrapping_mul(M) ^ k
}

fn finalize(mut h: u32) -> u32 {
    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}
