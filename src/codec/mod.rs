//! Pixel codec: bit-exact unpacking of tile pixels from raw bytes.
//!
//! This is a pure function library. Given raw bytes, a position and a tile
//! format it produces one [`Pixel`] or a range error; it holds no state.
//!
//! Supported depths: 32 (RGBA8888), 24 (RGB888), 16 (RGB565 or raw index),
//! 8 (index), 3 (eight pixels packed into three bytes), and 1/2/4 (packed
//! sub-byte indices). Other depths are decoder-specific extensions and are
//! rejected with a format error here.

use crate::error::{Error, Result};
use crate::tile::{Pixel, TileFormat, TilePosition};

/// Configuration-driven decode transforms.
///
/// Flips derive a new position before offset computation; channel reorders
/// apply after value extraction; `big_endian` selects the bit order of the
/// packed sub-byte branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    /// Reverse the in-byte (and, for 3 bpp, in-word) bit order.
    pub big_endian: bool,
    /// Mirror tiles horizontally.
    pub flip_x: bool,
    /// Mirror tiles vertically.
    pub flip_y: bool,
    /// Swap the R and B channels after extraction.
    pub swap_rb: bool,
    /// Treat the first packed byte as alpha (rotate the 32-bit word).
    pub alpha_first: bool,
}

/// Byte offset of a pixel: `i * bytes_per_tile + (x + y*w) * bpp / 8`,
/// with integer (floor) division.
pub fn pixel_offset(pos: &TilePosition, fmt: &TileFormat) -> usize {
    let nbytes = fmt.bytes_per_tile();
    let pixel_idx = pos.x as usize + pos.y as usize * fmt.w as usize;
    pos.i as usize * nbytes + pixel_idx * fmt.bpp as usize / 8
}

/// Apply flip transforms, deriving a new position.
///
/// The caller's position is left untouched to avoid aliasing surprises.
fn flipped(pos: &TilePosition, fmt: &TileFormat, opts: &CodecOptions) -> TilePosition {
    let mut p = *pos;
    if opts.flip_x {
        p.x = fmt.w as i32 - 1 - p.x;
    }
    if opts.flip_y {
        p.y = fmt.h as i32 - 1 - p.y;
    }
    p
}

fn check_bounds(offset: usize, needed: usize, size: usize) -> Result<()> {
    if offset + needed > size {
        return Err(Error::Range {
            offset,
            needed,
            size,
        });
    }
    Ok(())
}

/// Scale a packed index to 0..=255: `idx * 255 / (2^bpp - 1)`.
///
/// Exact at the endpoints (0 -> 0, max -> 255) and monotonic in between.
fn scale_index(idx: u32, bpp: u8) -> u8 {
    let max = (1u32 << bpp) - 1;
    (idx * 255 / max) as u8
}

/// Decode one pixel.
///
/// When `remain_index` is set the raw index/color value is stored in the
/// pixel's aliased 32-bit word and no display conversion happens.
pub fn decode_pixel(
    data: &[u8],
    pos: &TilePosition,
    fmt: &TileFormat,
    remain_index: bool,
    opts: &CodecOptions,
) -> Result<Pixel> {
    let pos = flipped(pos, fmt, opts);
    let bpp = fmt.bpp;

    let mut pixel = match bpp {
        32 => {
            let offset = pixel_offset(&pos, fmt);
            check_bounds(offset, 4, data.len())?;
            Pixel::rgba(
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            )
        }
        24 => {
            let offset = pixel_offset(&pos, fmt);
            check_bounds(offset, 3, data.len())?;
            let a = if remain_index { 0 } else { 255 };
            Pixel::rgba(data[offset], data[offset + 1], data[offset + 2], a)
        }
        16 => {
            let offset = pixel_offset(&pos, fmt);
            check_bounds(offset, 2, data.len())?;
            let v = u16::from_le_bytes([data[offset], data[offset + 1]]);
            if remain_index {
                Pixel::from_index(v as u32)
            } else {
                // RGB565: R bits 11-15, G bits 5-10, B bits 0-4, each
                // expanded to 8 bits by replicating the high bits.
                let r5 = ((v >> 11) & 0x1f) as u8;
                let g6 = ((v >> 5) & 0x3f) as u8;
                let b5 = (v & 0x1f) as u8;
                Pixel::rgba(
                    (r5 << 3) | (r5 >> 2),
                    (g6 << 2) | (g6 >> 4),
                    (b5 << 3) | (b5 >> 2),
                    255,
                )
            }
        }
        8 => {
            let offset = pixel_offset(&pos, fmt);
            check_bounds(offset, 1, data.len())?;
            let d = data[offset];
            if remain_index {
                Pixel::from_index(d as u32)
            } else {
                Pixel::gray(d)
            }
        }
        3 => {
            // Eight pixels packed into a 24-bit word of three bytes.
            let pixel_idx = pos.x as usize + pos.y as usize * fmt.w as usize;
            let offset = pos.i as usize * fmt.bytes_per_tile() + pixel_idx / 8 * 3;
            check_bounds(offset, 3, data.len())?;
            let shift = (pixel_idx % 8) * 3;
            let d = if opts.big_endian {
                let word = (data[offset] as u32) << 16
                    | (data[offset + 1] as u32) << 8
                    | data[offset + 2] as u32;
                (word >> (21 - shift)) & 0b111
            } else {
                let word = data[offset] as u32
                    | (data[offset + 1] as u32) << 8
                    | (data[offset + 2] as u32) << 16;
                (word >> shift) & 0b111
            };
            if remain_index {
                Pixel::from_index(d)
            } else {
                Pixel::gray(scale_index(d, 3))
            }
        }
        1 | 2 | 4 => {
            let offset = pixel_offset(&pos, fmt);
            check_bounds(offset, 1, data.len())?;
            let pixel_idx = pos.x as usize + pos.y as usize * fmt.w as usize;
            let mut shift = (pixel_idx % (8 / bpp as usize)) * bpp as usize;
            if opts.big_endian {
                shift = 8 - bpp as usize - shift;
            }
            let d = (data[offset] as u32 >> shift) & ((1 << bpp) - 1);
            if remain_index {
                Pixel::from_index(d)
            } else {
                Pixel::gray(scale_index(d, bpp))
            }
        }
        other => {
            return Err(Error::Format(format!(
                "unsupported bits per pixel: {other}"
            )))
        }
    };

    if !remain_index {
        if opts.swap_rb {
            std::mem::swap(&mut pixel.r, &mut pixel.b);
        }
        if opts.alpha_first {
            pixel = Pixel::from_index(pixel.index().rotate_left(8));
        }
    }
    Ok(pixel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(w: u32, h: u32, bpp: u8) -> TileFormat {
        TileFormat::new(w, h, bpp)
    }

    fn at(i: i32, x: i32, y: i32) -> TilePosition {
        TilePosition::new(i, x, y)
    }

    const NO_OPTS: CodecOptions = CodecOptions {
        big_endian: false,
        flip_x: false,
        flip_y: false,
        swap_rb: false,
        alpha_first: false,
    };

    #[test]
    fn test_offset_formula() {
        // offset = i * nbytes + (x + y*w) * bpp / 8
        let f = fmt(8, 8, 8);
        assert_eq!(pixel_offset(&at(0, 0, 0), &f), 0);
        assert_eq!(pixel_offset(&at(0, 3, 2), &f), 19);
        assert_eq!(pixel_offset(&at(2, 0, 0), &f), 128);

        // floor division for sub-byte depths
        let f = fmt(8, 8, 4);
        assert_eq!(pixel_offset(&at(0, 1, 0), &f), 0);
        assert_eq!(pixel_offset(&at(0, 3, 0), &f), 1);
    }

    #[test]
    fn test_bpp32_copies_verbatim() {
        let data = [0x11, 0x22, 0x33, 0x44, 0xaa, 0xbb, 0xcc, 0xdd];
        let p = decode_pixel(&data, &at(0, 1, 0), &fmt(2, 1, 32), false, &NO_OPTS).unwrap();
        assert_eq!(p, Pixel::rgba(0xaa, 0xbb, 0xcc, 0xdd));
    }

    #[test]
    fn test_bpp24_forces_alpha() {
        let data = [10, 20, 30];
        let p = decode_pixel(&data, &at(0, 0, 0), &fmt(1, 1, 24), false, &NO_OPTS).unwrap();
        assert_eq!(p, Pixel::rgba(10, 20, 30, 255));

        let p = decode_pixel(&data, &at(0, 0, 0), &fmt(1, 1, 24), true, &NO_OPTS).unwrap();
        assert_eq!(p.a, 0);
    }

    #[test]
    fn test_rgb565_unpack() {
        // 0xF800 = pure red, 0x07E0 = pure green, 0x001F = pure blue
        let red = 0xF800u16.to_le_bytes();
        let p = decode_pixel(&red, &at(0, 0, 0), &fmt(1, 1, 16), false, &NO_OPTS).unwrap();
        assert_eq!(p, Pixel::rgba(255, 0, 0, 255));

        let green = 0x07E0u16.to_le_bytes();
        let p = decode_pixel(&green, &at(0, 0, 0), &fmt(1, 1, 16), false, &NO_OPTS).unwrap();
        assert_eq!(p, Pixel::rgba(0, 255, 0, 255));

        let blue = 0x001Fu16.to_le_bytes();
        let p = decode_pixel(&blue, &at(0, 0, 0), &fmt(1, 1, 16), false, &NO_OPTS).unwrap();
        assert_eq!(p, Pixel::rgba(0, 0, 255, 255));

        // mid value: r5=16 -> 132, g6=32 -> 130, b5=16 -> 132
        let mid = ((16u16 << 11) | (32 << 5) | 16).to_le_bytes();
        let p = decode_pixel(&mid, &at(0, 0, 0), &fmt(1, 1, 16), false, &NO_OPTS).unwrap();
        assert_eq!(p, Pixel::rgba(132, 130, 132, 255));
    }

    #[test]
    fn test_bpp16_remain_index_little_endian() {
        let data = [0x34, 0x12];
        let p = decode_pixel(&data, &at(0, 0, 0), &fmt(1, 1, 16), true, &NO_OPTS).unwrap();
        assert_eq!(p.index(), 0x1234);
    }

    #[test]
    fn test_bpp8_grayscale_preview() {
        let data = [0x7f];
        let p = decode_pixel(&data, &at(0, 0, 0), &fmt(1, 1, 8), false, &NO_OPTS).unwrap();
        assert_eq!(p, Pixel::gray(0x7f));

        let p = decode_pixel(&data, &at(0, 0, 0), &fmt(1, 1, 8), true, &NO_OPTS).unwrap();
        assert_eq!(p.index(), 0x7f);
    }

    #[test]
    fn test_sub_byte_scaling_endpoints() {
        for bpp in [1u8, 2, 4] {
            let max = (1u32 << bpp) - 1;
            let zero = decode_pixel(&[0x00], &at(0, 0, 0), &fmt(1, 1, bpp), false, &NO_OPTS)
                .unwrap();
            assert_eq!(zero.r, 0, "bpp {bpp} zero endpoint");
            let full = decode_pixel(&[0xff], &at(0, 0, 0), &fmt(1, 1, bpp), false, &NO_OPTS)
                .unwrap();
            assert_eq!(full.r, 255, "bpp {bpp} max endpoint");

            // monotonic in the raw index
            let mut prev = -1i32;
            for idx in 0..=max {
                let v = (idx * 255 / max) as i32;
                assert!(v > prev, "bpp {bpp} scaling not monotonic");
                prev = v;
            }
        }
    }

    #[test]
    fn test_bpp4_big_endian_nibble() {
        // pixel_index 3: shift = 8 - 4 - ((3 % 2) * 4) = 0, low nibble
        let data = [0x00, 0b1010_0101];
        let f = fmt(4, 1, 4);
        let be = CodecOptions {
            big_endian: true,
            ..Default::default()
        };
        let p = decode_pixel(&data, &at(0, 3, 0), &f, true, &be).unwrap();
        assert_eq!(p.index(), 0b0101);

        // same position little-endian takes the high nibble
        let p = decode_pixel(&data, &at(0, 3, 0), &f, true, &NO_OPTS).unwrap();
        assert_eq!(p.index(), 0b1010);
    }

    #[test]
    fn test_bpp1_bit_order() {
        let data = [0b0000_0001];
        let f = fmt(8, 1, 1);
        let p = decode_pixel(&data, &at(0, 0, 0), &f, true, &NO_OPTS).unwrap();
        assert_eq!(p.index(), 1);

        // big-endian mode reads the most significant bit first
        let be = CodecOptions {
            big_endian: true,
            ..Default::default()
        };
        let p = decode_pixel(&data, &at(0, 7, 0), &f, true, &be).unwrap();
        assert_eq!(p.index(), 1);
        let p = decode_pixel(&data, &at(0, 0, 0), &f, true, &be).unwrap();
        assert_eq!(p.index(), 0);
    }

    #[test]
    fn test_bpp3_packed_little_endian() {
        // pack indices 0..=7 into one 24-bit word, 3 bits each
        let mut word: u32 = 0;
        for k in 0..8u32 {
            word |= k << (k * 3);
        }
        let data = [word as u8, (word >> 8) as u8, (word >> 16) as u8];
        let f = fmt(8, 1, 3);
        for k in 0..8 {
            let p = decode_pixel(&data, &at(0, k, 0), &f, true, &NO_OPTS).unwrap();
            assert_eq!(p.index(), k as u32, "pixel {k}");
        }
    }

    #[test]
    fn test_bpp3_packed_big_endian() {
        // big-endian: shift 21 - 3*(idx%8), bytes in reverse order
        let mut word: u32 = 0;
        for k in 0..8u32 {
            word |= k << (21 - k * 3);
        }
        let data = [(word >> 16) as u8, (word >> 8) as u8, word as u8];
        let f = fmt(8, 1, 3);
        let be = CodecOptions {
            big_endian: true,
            ..Default::default()
        };
        for k in 0..8 {
            let p = decode_pixel(&data, &at(0, k, 0), &f, true, &be).unwrap();
            assert_eq!(p.index(), k as u32, "pixel {k}");
        }
    }

    #[test]
    fn test_range_error_not_crash() {
        let data = [0u8; 64];
        let f = fmt(8, 8, 8);
        // last valid pixel of tile 0 decodes fine
        assert!(decode_pixel(&data, &at(0, 7, 7), &f, false, &NO_OPTS).is_ok());
        // first pixel of tile 1 is out of range
        let err = decode_pixel(&data, &at(1, 0, 0), &f, false, &NO_OPTS).unwrap_err();
        assert!(matches!(err, Error::Range { offset: 64, .. }));

        // multi-byte depth at the very end
        let f = fmt(2, 1, 16);
        let data = [0u8; 3];
        assert!(decode_pixel(&data, &at(0, 0, 0), &f, false, &NO_OPTS).is_ok());
        assert!(matches!(
            decode_pixel(&data, &at(0, 1, 0), &f, false, &NO_OPTS),
            Err(Error::Range { .. })
        ));
    }

    #[test]
    fn test_unsupported_bpp() {
        let data = [0u8; 16];
        assert!(matches!(
            decode_pixel(&data, &at(0, 0, 0), &fmt(1, 1, 64), false, &NO_OPTS),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_flip_transforms() {
        let data: Vec<u8> = (0..16).collect();
        let f = fmt(4, 4, 8);
        let fx = CodecOptions {
            flip_x: true,
            ..Default::default()
        };
        let p = decode_pixel(&data, &at(0, 0, 0), &f, true, &fx).unwrap();
        assert_eq!(p.index(), 3); // mirrored to x=3

        let fy = CodecOptions {
            flip_y: true,
            ..Default::default()
        };
        let p = decode_pixel(&data, &at(0, 1, 0), &f, true, &fy).unwrap();
        assert_eq!(p.index(), 13); // mirrored to y=3

        // caller's position is untouched
        let pos = at(0, 0, 0);
        let _ = decode_pixel(&data, &pos, &f, true, &fx).unwrap();
        assert_eq!(pos, at(0, 0, 0));
    }

    #[test]
    fn test_channel_reorder() {
        let data = [10, 20, 30, 40];
        let f = fmt(1, 1, 32);
        let swap = CodecOptions {
            swap_rb: true,
            ..Default::default()
        };
        let p = decode_pixel(&data, &at(0, 0, 0), &f, false, &swap).unwrap();
        assert_eq!(p, Pixel::rgba(30, 20, 10, 40));

        // remain_index leaves the raw word alone
        let p = decode_pixel(&data, &at(0, 0, 0), &f, true, &swap).unwrap();
        assert_eq!(p, Pixel::rgba(10, 20, 30, 40));
    }

    #[test]
    fn test_alpha_first_rotation() {
        let data = [10, 20, 30, 40];
        let f = fmt(1, 1, 32);
        let opts = CodecOptions {
            alpha_first: true,
            ..Default::default()
        };
        let p = decode_pixel(&data, &at(0, 0, 0), &f, false, &opts).unwrap();
        assert_eq!(p.index(), Pixel::rgba(10, 20, 30, 40).index().rotate_left(8));
    }

    #[test]
    fn test_decode_reencode_roundtrip() {
        // 32 bpp and 24 bpp have an exact inverse
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let f = fmt(2, 1, 32);
        for x in 0..2 {
            let p = decode_pixel(&data, &at(0, x, 0), &f, true, &NO_OPTS).unwrap();
            let bytes = p.index().to_le_bytes();
            assert_eq!(&bytes[..], &data[x as usize * 4..x as usize * 4 + 4]);
        }
    }
}
