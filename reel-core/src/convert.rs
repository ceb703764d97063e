// PIXEL / SAMPLE CONVERT - decoder output to presentation format
//
// Video: every supported source layout becomes tightly packed RGBA8.
// Audio: planar f32 becomes interleaved f32 with a channel count from the
// supported set.

use crate::error::{MediaError, MediaResult};
use crate::frame::Image;
use crate::stream::PixelFormat;

/// BT.601 limited range in 8.8 fixed point:
/// 1.164, 1.596, -0.391, -0.813, 2.018 (luma, Cr->R, Cb->G, Cr->G, Cb->B).
const BT601: (i32, i32, i32, i32, i32) = (298, 409, -100, -208, 516);

// ============================================================================
// Video
// ============================================================================

/// Converts one source layout at one size to RGBA8.
///
/// Lookup tables are built once per stream so the per-pixel path is integer
/// adds and a clamp.
pub struct RgbaConverter {
    format: PixelFormat,
    width: u32,
    height: u32,
    y_table: [i32; 256],
    u_table_g: [i32; 256],
    u_table_b: [i32; 256],
    v_table_r: [i32; 256],
    v_table_g: [i32; 256],
}

impl RgbaConverter {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::Unsupported(format!("empty frame size {}x{}", width, height)));
        }

        let mut converter = Self {
            format,
            width,
            height,
            y_table: [0; 256],
            u_table_g: [0; 256],
            u_table_b: [0; 256],
            v_table_r: [0; 256],
            v_table_g: [0; 256],
        };
        converter.build_tables();
        Ok(converter)
    }

    fn build_tables(&mut self) {
        let (luma, cr_r, cb_g, cr_g, cb_b) = BT601;

        for i in 0..256 {
            let y = i as i32 - 16;
            let uv = i as i32 - 128;

            self.y_table[i] = (y * luma + 128) >> 8;
            // Chroma terms stay scaled by 256 and are shifted when summed.
            self.u_table_g[i] = uv * cb_g;
            self.u_table_b[i] = uv * cb_b;
            self.v_table_r[i] = uv * cr_r;
            self.v_table_g[i] = uv * cr_g;
        }
    }

    pub fn source_format(&self) -> PixelFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Convert one tightly packed source buffer.
    pub fn convert(&self, data: &[u8]) -> MediaResult<Image> {
        let expected = self.format.buffer_size(self.width, self.height);
        if data.len() < expected {
            return Err(MediaError::DecodeFailed(format!(
                "{:?} frame is {} bytes, expected {}",
                self.format,
                data.len(),
                expected
            )));
        }

        let pixels = self.width as usize * self.height as usize;
        let mut rgba = vec![0u8; pixels * 4];

        match self.format {
            PixelFormat::Rgba8 => rgba.copy_from_slice(&data[..pixels * 4]),
            PixelFormat::Rgb8 => {
                for (dst, src) in rgba.chunks_exact_mut(4).zip(data.chunks_exact(3)) {
                    dst[..3].copy_from_slice(src);
                    dst[3] = 255;
                }
            }
            PixelFormat::Gray8 => {
                for (dst, &y) in rgba.chunks_exact_mut(4).zip(&data[..pixels]) {
                    let v = self.y_table[y as usize].clamp(0, 255) as u8;
                    dst.copy_from_slice(&[v, v, v, 255]);
                }
            }
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => {
                self.planar_yuv_to_rgba(data, &mut rgba);
            }
        }

        Ok(Image::new(self.width, self.height, PixelFormat::Rgba8, rgba))
    }

    fn planar_yuv_to_rgba(&self, data: &[u8], rgba: &mut [u8]) {
        let width = self.width as usize;
        let height = self.height as usize;
        let (sx, sy) = self.format.chroma_shift();
        let (cw, ch) = self.format.chroma_size(self.width, self.height);

        let y_plane = &data[..width * height];
        let u_plane = &data[width * height..width * height + cw * ch];
        let v_plane = &data[width * height + cw * ch..width * height + 2 * cw * ch];

        for y in 0..height {
            let y_row = y * width;
            let uv_row = (y >> sy) * cw;
            let dst_row = y * width * 4;

            for x in 0..width {
                let y_val = y_plane[y_row + x] as usize;
                let uv_idx = uv_row + (x >> sx);
                let u_val = u_plane[uv_idx] as usize;
                let v_val = v_plane[uv_idx] as usize;

                let y_contrib = self.y_table[y_val];
                let r = (y_contrib + (self.v_table_r[v_val] >> 8)).clamp(0, 255) as u8;
                let g = (y_contrib + ((self.u_table_g[u_val] + self.v_table_g[v_val]) >> 8)).clamp(0, 255) as u8;
                let b = (y_contrib + (self.u_table_b[u_val] >> 8)).clamp(0, 255) as u8;

                let dst_idx = dst_row + x * 4;
                rgba[dst_idx] = r;
                rgba[dst_idx + 1] = g;
                rgba[dst_idx + 2] = b;
                rgba[dst_idx + 3] = 255;
            }
        }
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Channel counts the presentation layer accepts as-is.
pub const SUPPORTED_CHANNEL_COUNTS: [u16; 5] = [1, 2, 6, 7, 8];

/// Output channel count for a source with `channels` channels. Anything
/// outside the supported set folds to stereo. The fold is lossy.
pub fn remap_channel_count(channels: u16) -> u16 {
    if SUPPORTED_CHANNEL_COUNTS.contains(&channels) {
        channels
    } else {
        2
    }
}

/// Interleave equal-length planes into one buffer.
pub fn interleave_planar(planes: &[Vec<f32>]) -> Vec<f32> {
    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planes.len());
    for i in 0..frames {
        for plane in planes {
            out.push(plane[i]);
        }
    }
    out
}

/// Planar decoder output to interleaved presentation samples.
/// Returns the output channel count alongside the samples.
pub fn to_presentation_audio(planes: &[Vec<f32>]) -> (u16, Vec<f32>) {
    let source = planes.len() as u16;
    let target = remap_channel_count(source);
    if target == source {
        return (target, interleave_planar(planes));
    }

    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    if planes.is_empty() {
        return (target, Vec::new());
    }

    // Even-indexed channels average into left, odd-indexed into right.
    let even: Vec<&Vec<f32>> = planes.iter().step_by(2).collect();
    let odd: Vec<&Vec<f32>> = planes.iter().skip(1).step_by(2).collect();

    let mut out = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let left = even.iter().map(|p| p[i]).sum::<f32>() / even.len() as f32;
        let right = if odd.is_empty() {
            left
        } else {
            odd.iter().map(|p| p[i]).sum::<f32>() / odd.len() as f32
        };
        out.push(left);
        out.push(right);
    }
    (target, out)
}
