//! Shared test harness: a scripted server on the far end of an in-memory
//! duplex stream.
//!
//! The server reads whole requests by honoring the length field at bytes
//! 2–3, mirrors the real server's implicit per-request sequence counter
//! (starting at 1, wrapping 0xFFFF → 0), and hands each request to a
//! response script. Whatever frames the script returns are written back.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use xlink::{Setup, wire};

/// Spawn the scripted server. `respond` is called with each complete
/// request buffer and the sequence number the server assigned it; an
/// empty return means no response.
pub fn spawn_server<F>(mut stream: DuplexStream, mut respond: F) -> JoinHandle<()>
where
    F: FnMut(&[u8], u16) -> Vec<u8> + Send + 'static,
{
    tokio::spawn(async move {
        let mut sequence: u16 = 0;
        loop {
            let mut header = [0u8; 4];
            if stream.read_exact(&mut header).await.is_err() {
                return;
            }
            let words = u16::from_le_bytes([header[2], header[3]]) as usize;
            let mut body = vec![0u8; words.saturating_mul(4).saturating_sub(4)];
            if stream.read_exact(&mut body).await.is_err() {
                return;
            }
            sequence = if sequence == u16::MAX { 0 } else { sequence + 1 };

            let mut request = header.to_vec();
            request.extend_from_slice(&body);
            let response = respond(&request, sequence);
            if !response.is_empty() && stream.write_all(&response).await.is_err() {
                return;
            }
        }
    })
}

/// A marshalled request: opcode at byte 0, length (in 4-byte units) at
/// bytes 2–3, zero padding elsewhere.
pub fn request(opcode: u8, words: u16) -> Vec<u8> {
    assert!(words >= 1);
    let mut buf = vec![0u8; words as usize * 4];
    buf[0] = opcode;
    buf[2..4].copy_from_slice(&words.to_le_bytes());
    buf
}

/// A 32-byte reply frame announcing `extra_words` additional 4-byte units.
pub fn reply_frame(sequence: u16, extra_words: u32) -> Vec<u8> {
    let mut frame = vec![0u8; wire::RESPONSE_HEADER_SIZE];
    frame[0] = wire::RESPONSE_REPLY;
    frame[2..4].copy_from_slice(&sequence.to_le_bytes());
    frame[4..8].copy_from_slice(&extra_words.to_le_bytes());
    frame
}

/// A 32-byte error frame.
pub fn error_frame(code: u8, sequence: u16) -> Vec<u8> {
    let mut frame = vec![0u8; wire::RESPONSE_HEADER_SIZE];
    frame[1] = code;
    frame[2..4].copy_from_slice(&sequence.to_le_bytes());
    frame
}

/// A 32-byte event frame.
pub fn event_frame(code: u8) -> Vec<u8> {
    let mut frame = vec![0u8; wire::RESPONSE_HEADER_SIZE];
    frame[0] = code;
    frame
}

/// An encoded setup success block (head included) advertising one bare
/// screen, as a server would send it after the client prologue.
pub fn setup_success_block(resource_id_base: u32, resource_id_mask: u32) -> Vec<u8> {
    let vendor = b"xlink test server";
    let mut buf = Vec::new();
    buf.push(1); // success
    buf.push(0);
    buf.extend_from_slice(&11u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    let len_at = buf.len();
    buf.extend_from_slice(&0u16.to_le_bytes()); // patched below
    buf.extend_from_slice(&1u32.to_le_bytes()); // release
    buf.extend_from_slice(&resource_id_base.to_le_bytes());
    buf.extend_from_slice(&resource_id_mask.to_le_bytes());
    buf.extend_from_slice(&256u32.to_le_bytes()); // motion buffer
    buf.extend_from_slice(&(vendor.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0xffffu16.to_le_bytes()); // max request length
    buf.push(1); // screens
    buf.push(0); // formats
    buf.extend_from_slice(&[0, 0, 32, 32, 8, 255]); // orders, units, keycodes
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(vendor);
    buf.extend_from_slice(&vec![0u8; wire::pad(vendor.len()) - vendor.len()]);

    // one screen, no depths
    buf.extend_from_slice(&0x123u32.to_le_bytes()); // root
    buf.extend_from_slice(&0x124u32.to_le_bytes()); // default colormap
    buf.extend_from_slice(&0x00ff_ffffu32.to_le_bytes()); // white
    buf.extend_from_slice(&0u32.to_le_bytes()); // black
    buf.extend_from_slice(&0u32.to_le_bytes()); // input masks
    for dim in [1920u16, 1080, 508, 286, 1, 1] {
        buf.extend_from_slice(&dim.to_le_bytes());
    }
    buf.extend_from_slice(&0x21u32.to_le_bytes()); // root visual
    buf.extend_from_slice(&[2, 0, 24, 0]); // backing stores, save unders, depth, no depths

    let words = ((buf.len() - 8) / 4) as u16;
    buf[len_at..len_at + 2].copy_from_slice(&words.to_le_bytes());
    buf
}

/// A setup block good enough to attach with: just the id space matters to
/// the transport.
pub fn test_setup(resource_id_base: u32, resource_id_mask: u32) -> Setup {
    Setup {
        protocol_major_version: 11,
        protocol_minor_version: 0,
        release_number: 1,
        resource_id_base,
        resource_id_mask,
        motion_buffer_size: 256,
        maximum_request_length: 0xffff,
        image_byte_order: 0,
        bitmap_format_bit_order: 0,
        bitmap_format_scanline_unit: 32,
        bitmap_format_scanline_pad: 32,
        min_keycode: 8,
        max_keycode: 255,
        vendor: "xlink test server".to_owned(),
        pixmap_formats: Vec::new(),
        roots: Vec::new(),
    }
}
