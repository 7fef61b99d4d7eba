//! The connection setup exchange and the server's setup block.
//!
//! Before any request flows, the client sends a short prologue naming the
//! protocol version and its authorization data; the server answers with
//! refusal, an authenticate challenge, or a success block describing
//! itself — including the resource-id space the client allocates from and
//! one [`Screen`] per root window.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use xlink_core::Xid;

use crate::error::ConnectError;
use crate::wire;

const PROTOCOL_MAJOR: u16 = 11;
const PROTOCOL_MINOR: u16 = 0;

const STATUS_FAILED: u8 = 0;
const STATUS_SUCCESS: u8 = 1;
const STATUS_AUTHENTICATE: u8 = 2;

/// Everything the server said about itself at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    /// Protocol major version the server speaks (11).
    pub protocol_major_version: u16,
    /// Protocol minor version the server speaks.
    pub protocol_minor_version: u16,
    /// Vendor release number.
    pub release_number: u32,
    /// Base value OR-ed into every client-allocated resource id.
    pub resource_id_base: u32,
    /// Mask of id bits the client may vary.
    pub resource_id_mask: u32,
    /// Size of the server's motion history buffer.
    pub motion_buffer_size: u32,
    /// Longest accepted request, in 4-byte units.
    pub maximum_request_length: u16,
    /// Byte order of image data (0 = LSB first, 1 = MSB first).
    pub image_byte_order: u8,
    /// Bit order within bitmap scanline units.
    pub bitmap_format_bit_order: u8,
    /// Bitmap scanline unit, in bits.
    pub bitmap_format_scanline_unit: u8,
    /// Bitmap scanline padding, in bits.
    pub bitmap_format_scanline_pad: u8,
    /// Smallest keycode the server transmits.
    pub min_keycode: u8,
    /// Largest keycode the server transmits.
    pub max_keycode: u8,
    /// Vendor identification string.
    pub vendor: String,
    /// Supported pixmap formats.
    pub pixmap_formats: Vec<Format>,
    /// One entry per root window.
    pub roots: Vec<Screen>,
}

/// A supported pixmap format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Depth this format applies to.
    pub depth: u8,
    /// Bits per pixel in images of this format.
    pub bits_per_pixel: u8,
    /// Scanline padding, in bits.
    pub scanline_pad: u8,
}

/// One root window and its display characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    /// The root window id.
    pub root: Xid,
    /// The default colormap id.
    pub default_colormap: Xid,
    /// Pixel value for white on this screen.
    pub white_pixel: u32,
    /// Pixel value for black on this screen.
    pub black_pixel: u32,
    /// Event mask clients have currently selected on the root.
    pub current_input_masks: u32,
    /// Width in pixels.
    pub width_in_pixels: u16,
    /// Height in pixels.
    pub height_in_pixels: u16,
    /// Width in millimeters.
    pub width_in_millimeters: u16,
    /// Height in millimeters.
    pub height_in_millimeters: u16,
    /// Minimum number of installed colormaps.
    pub min_installed_maps: u16,
    /// Maximum number of installed colormaps.
    pub max_installed_maps: u16,
    /// Visual id of the root window.
    pub root_visual: u32,
    /// When the server supports backing stores (0 never, 1 when mapped,
    /// 2 always).
    pub backing_stores: u8,
    /// Whether save-unders are supported.
    pub save_unders: bool,
    /// Depth of the root window.
    pub root_depth: u8,
    /// Depths, with their visuals, usable on this screen.
    pub allowed_depths: Vec<Depth>,
}

/// The visuals available at one depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depth {
    /// The depth in bits per pixel.
    pub depth: u8,
    /// Visual types available at this depth.
    pub visuals: Vec<VisualType>,
}

/// One visual type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualType {
    /// The visual's id, named in CreateWindow and colormap requests.
    pub visual_id: u32,
    /// Visual class (StaticGray .. DirectColor).
    pub class: u8,
    /// Log2 of distinct color values per channel.
    pub bits_per_rgb_value: u8,
    /// Number of colormap entries.
    pub colormap_entries: u16,
    /// Red channel mask for direct visuals.
    pub red_mask: u32,
    /// Green channel mask for direct visuals.
    pub green_mask: u32,
    /// Blue channel mask for direct visuals.
    pub blue_mask: u32,
}

/// Run the setup exchange on a fresh stream: send the prologue, read and
/// decode the server's answer.
pub(crate) async fn handshake<S>(
    stream: &mut S,
    auth_name: &str,
    auth_data: &[u8],
) -> Result<Setup, ConnectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&prologue(auth_name, auth_data)).await?;

    let mut head = [0u8; 8];
    stream.read_exact(&mut head).await?;
    let status = head[0];
    let reason_len = head[1] as usize;
    let major = wire::u16_at(&head, 2);
    let minor = wire::u16_at(&head, 4);
    let extra = wire::u16_at(&head, 6) as usize * 4;

    let mut block = vec![0u8; 8 + extra];
    block[..8].copy_from_slice(&head);
    stream.read_exact(&mut block[8..]).await?;

    match status {
        STATUS_FAILED => Err(ConnectError::Refused(reason(&block, reason_len))),
        STATUS_AUTHENTICATE => Err(ConnectError::AuthenticateRequired(reason(&block, extra))),
        STATUS_SUCCESS => {
            if major != PROTOCOL_MAJOR || minor != PROTOCOL_MINOR {
                return Err(ConnectError::VersionMismatch { major, minor });
            }
            parse_setup(&block)
        }
        other => Err(ConnectError::MalformedSetup(format!(
            "unexpected setup status {other}"
        ))),
    }
}

/// The client's opening bytes: little-endian marker, protocol 11.0, and
/// the authorization name and data, each padded to 4 bytes.
fn prologue(auth_name: &str, auth_data: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 12 + wire::pad(auth_name.len()) + wire::pad(auth_data.len())];
    buf[0] = 0x6c;
    wire::put_u16(&mut buf[2..], PROTOCOL_MAJOR);
    wire::put_u16(&mut buf[4..], PROTOCOL_MINOR);
    wire::put_u16(&mut buf[6..], auth_name.len() as u16);
    wire::put_u16(&mut buf[8..], auth_data.len() as u16);
    buf[12..12 + auth_name.len()].copy_from_slice(auth_name.as_bytes());
    let data_at = 12 + wire::pad(auth_name.len());
    buf[data_at..data_at + auth_data.len()].copy_from_slice(auth_data);
    buf
}

fn reason(block: &[u8], len: usize) -> String {
    let end = (8 + len).min(block.len());
    String::from_utf8_lossy(&block[8..end]).trim_end().to_owned()
}

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ConnectError> {
        if self.at + n > self.buf.len() {
            return Err(ConnectError::MalformedSetup(format!(
                "setup block truncated at offset {}",
                self.at
            )));
        }
        let slice = &self.buf[self.at..self.at + n];
        self.at += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ConnectError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ConnectError> {
        Ok(wire::u16_at(self.take(2)?, 0))
    }

    fn u32(&mut self) -> Result<u32, ConnectError> {
        Ok(wire::u32_at(self.take(4)?, 0))
    }

    fn skip(&mut self, n: usize) -> Result<(), ConnectError> {
        self.take(n).map(|_| ())
    }
}

/// Decode a success block, including its 8-byte head.
fn parse_setup(block: &[u8]) -> Result<Setup, ConnectError> {
    let mut r = Reader::new(block);
    r.skip(2)?; // status, unused
    let protocol_major_version = r.u16()?;
    let protocol_minor_version = r.u16()?;
    r.skip(2)?; // additional length, already consumed by the caller
    let release_number = r.u32()?;
    let resource_id_base = r.u32()?;
    let resource_id_mask = r.u32()?;
    let motion_buffer_size = r.u32()?;
    let vendor_len = r.u16()? as usize;
    let maximum_request_length = r.u16()?;
    let screen_count = r.u8()? as usize;
    let format_count = r.u8()? as usize;
    let image_byte_order = r.u8()?;
    let bitmap_format_bit_order = r.u8()?;
    let bitmap_format_scanline_unit = r.u8()?;
    let bitmap_format_scanline_pad = r.u8()?;
    let min_keycode = r.u8()?;
    let max_keycode = r.u8()?;
    r.skip(4)?;

    let vendor = String::from_utf8_lossy(r.take(vendor_len)?).into_owned();
    r.skip(wire::pad(vendor_len) - vendor_len)?;

    let mut pixmap_formats = Vec::with_capacity(format_count);
    for _ in 0..format_count {
        let depth = r.u8()?;
        let bits_per_pixel = r.u8()?;
        let scanline_pad = r.u8()?;
        r.skip(5)?;
        pixmap_formats.push(Format {
            depth,
            bits_per_pixel,
            scanline_pad,
        });
    }

    let mut roots = Vec::with_capacity(screen_count);
    for _ in 0..screen_count {
        roots.push(parse_screen(&mut r)?);
    }

    Ok(Setup {
        protocol_major_version,
        protocol_minor_version,
        release_number,
        resource_id_base,
        resource_id_mask,
        motion_buffer_size,
        maximum_request_length,
        image_byte_order,
        bitmap_format_bit_order,
        bitmap_format_scanline_unit,
        bitmap_format_scanline_pad,
        min_keycode,
        max_keycode,
        vendor,
        pixmap_formats,
        roots,
    })
}

fn parse_screen(r: &mut Reader<'_>) -> Result<Screen, ConnectError> {
    let root = Xid::new(r.u32()?);
    let default_colormap = Xid::new(r.u32()?);
    let white_pixel = r.u32()?;
    let black_pixel = r.u32()?;
    let current_input_masks = r.u32()?;
    let width_in_pixels = r.u16()?;
    let height_in_pixels = r.u16()?;
    let width_in_millimeters = r.u16()?;
    let height_in_millimeters = r.u16()?;
    let min_installed_maps = r.u16()?;
    let max_installed_maps = r.u16()?;
    let root_visual = r.u32()?;
    let backing_stores = r.u8()?;
    let save_unders = r.u8()? != 0;
    let root_depth = r.u8()?;
    let depth_count = r.u8()? as usize;

    let mut allowed_depths = Vec::with_capacity(depth_count);
    for _ in 0..depth_count {
        let depth = r.u8()?;
        r.skip(1)?;
        let visual_count = r.u16()? as usize;
        r.skip(4)?;
        let mut visuals = Vec::with_capacity(visual_count);
        for _ in 0..visual_count {
            visuals.push(VisualType {
                visual_id: r.u32()?,
                class: r.u8()?,
                bits_per_rgb_value: r.u8()?,
                colormap_entries: r.u16()?,
                red_mask: r.u32()?,
                green_mask: r.u32()?,
                blue_mask: r.u32()?,
            });
            r.skip(4)?;
        }
        allowed_depths.push(Depth { depth, visuals });
    }

    Ok(Screen {
        root,
        default_colormap,
        white_pixel,
        black_pixel,
        current_input_masks,
        width_in_pixels,
        height_in_pixels,
        width_in_millimeters,
        height_in_millimeters,
        min_installed_maps,
        max_installed_maps,
        root_visual,
        backing_stores,
        save_unders,
        root_depth,
        allowed_depths,
    })
}
