#![allow(dead_code)]

use topspeed::block::{Block, BLOCK_SIZE, BLOCK_WORDS};
use topspeed::crypto::{swap_partner, Key};

pub const WINDOW_BASE: i32 = 0x4000_0000;

// ── Encryption ───────────────────────────────────────────────────────────────

/// Inverse of `Key::decrypt_block`: steps for key indices 0 up to 15.
pub fn encrypt_block(key: &Key, plain: &Block) -> Block {
    let mut v = *plain.values();
    for index in 0..BLOCK_WORDS {
        let k = key.words()[index];
        let j = swap_partner(k);
        let (pa, pb) = (v[index], v[j]);
        let a = (pa & k) | (pb & !k);
        let b = (pb & k) | (pa & !k);
        v[index] = a.wrapping_add(k);
        v[j] = b.wrapping_add(k);
    }
    Block::new(v)
}

pub fn encrypt(key: &Key, data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        let block = encrypt_block(key, &Block::from_bytes(chunk).unwrap());
        chunk.copy_from_slice(&block.to_bytes());
    }
    out
}

/// Key whose words lie in `WINDOW_BASE..WINDOW_BASE + 0x1000` and each
/// swap with themselves.
pub fn window_key() -> Key {
    Key::new(core::array::from_fn(|i| WINDOW_BASE | (i as i32) << 8 | i as i32))
}

// ── Run-length encoding ──────────────────────────────────────────────────────

fn run_len(data: &[u8], at: usize) -> usize {
    data[at..].iter().take_while(|b| **b == data[at]).count()
}

/// Encoder for the page body format; counts stay below 0x80.
pub fn rle(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let start = i;
        let mut repeats = 0;
        loop {
            let r = run_len(data, i).min(0x7F);
            if r >= 3 {
                i += 1;
                repeats = r - 1;
                break;
            }
            i += r;
            if i >= data.len() || i - start >= 0x70 {
                break;
            }
        }
        out.push((i - start) as u8);
        out.extend_from_slice(&data[start..i]);
        if i < data.len() {
            out.push(repeats as u8);
        }
        i += repeats;
    }
    out
}

// ── File builder ─────────────────────────────────────────────────────────────

/// Record chain of data records `1..=count` for `table`, sharing the table
/// prefix.  Payloads are mostly zero so they compress.
pub fn data_records(table: u32, count: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for n in 1..=count {
        let mut payload = vec![0u8; 24];
        payload[..4].copy_from_slice(&n.to_le_bytes());
        payload[20..].copy_from_slice(b"x   ");

        let mut data = table.to_be_bytes().to_vec();
        data.push(0xF3);
        data.extend(n.to_be_bytes());
        data.extend(&payload);

        if n == 1 {
            out.push(0xC0);
            out.extend((data.len() as u16).to_le_bytes());
            out.extend(9u16.to_le_bytes());
            out.extend(&data);
        } else {
            out.push(0x05);
            out.extend(&data[5..]);
        }
    }
    out
}

pub fn table_name_record(table: u32, name: &str) -> Vec<u8> {
    let mut data = vec![0xFE];
    data.extend(name.as_bytes());
    let header_length = data.len() as u16;
    data.extend(table.to_be_bytes());
    let mut out = vec![0xC0];
    out.extend((data.len() as u16).to_le_bytes());
    out.extend(header_length.to_le_bytes());
    out.extend(data);
    out
}

/// Page at `address` padded to a multiple of 0x100.
pub fn page(address: u32, records: u16, flags: u8, raw: &[u8], compress: bool) -> Vec<u8> {
    let body = if compress { rle(raw) } else { raw.to_vec() };
    let page_size = (13 + body.len()) as u16;
    let uncompressed = (13 + raw.len()) as u16;
    let mut out = address.to_le_bytes().to_vec();
    out.extend(page_size.to_le_bytes());
    out.extend(uncompressed.to_le_bytes());
    out.extend((uncompressed - 13).to_le_bytes());
    out.extend(records.to_le_bytes());
    out.push(flags);
    out.extend(body);
    let padded = out.len().div_ceil(0x100) * 0x100;
    out.resize(padded, 0);
    out
}

/// A file with three pages: compressed data records of table 1, a table
/// name page, and a page with non-zero flags.
pub fn sample_file(data_record_count: u32) -> Vec<u8> {
    let first = page(0x200, data_record_count as u16, 0, &data_records(1, data_record_count), true);
    let second_at = 0x200 + first.len() as u32;
    let second = page(second_at, 1, 0, &table_name_record(1, "PEOPLE"), false);
    let third_at = second_at + second.len() as u32;
    let third = page(third_at, 3, 0x01, &[0x11; 40], false);
    let pages = [first, second, third].concat();

    let end_ref = (pages.len() / 0x100) as u32;
    let mut file = header(&[(0, end_ref)]);
    file.extend(pages);
    file
}

pub fn header(ranges: &[(u32, u32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(0x200);
    out.extend(0u32.to_le_bytes());
    out.extend(0x200u16.to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.extend(b"tOpS");
    out.extend(0u16.to_le_bytes());
    out.extend(1u32.to_be_bytes());
    out.extend(1u32.to_le_bytes());
    out.extend(0u32.to_le_bytes());
    for i in 0..60 {
        out.extend(ranges.get(i).map_or(0, |r| r.0).to_le_bytes());
    }
    for i in 0..60 {
        out.extend(ranges.get(i).map_or(0, |r| r.1).to_le_bytes());
    }
    out
}
