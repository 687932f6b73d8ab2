/// WAV container helpers.
///
/// Generates standard 44-byte RIFF headers for finalized recordings and
/// decodes PCM WAV sources for waveform rendering.
use crate::models::error::CollageError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Wrap raw 16-bit PCM in a WAV container.
pub fn wrap_pcm16(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let header = generate_wav_header(sample_rate, 16, channels, pcm.len() as u32);
    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + pcm.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(pcm);
    out
}

/// Format fields read from a `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

/// A parsed PCM WAV file: its format and the byte range of the `data` chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo<'a> {
    pub spec: WavSpec,
    pub data: &'a [u8],
}

impl WavInfo<'_> {
    pub fn duration_secs(&self) -> f64 {
        let frame_bytes = self.spec.channels as usize * self.spec.bit_depth as usize / 8;
        if frame_bytes == 0 || self.spec.sample_rate == 0 {
            return 0.0;
        }
        (self.data.len() / frame_bytes) as f64 / self.spec.sample_rate as f64
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parse a RIFF/WAVE container, walking chunks until `fmt ` and `data` are found.
///
/// Only PCM (format code 1) is accepted. A `data` chunk whose declared size
/// runs past the end of the buffer is truncated to what is present, which is
/// what a streaming recorder leaves behind when the header was never patched.
pub fn parse_wav(bytes: &[u8]) -> Result<WavInfo<'_>, CollageError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(CollageError::Decode("not a RIFF/WAVE stream".into()));
    }

    let mut spec: Option<WavSpec> = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body = offset + 8;

        if id == b"fmt " {
            if size < 16 || body + 16 > bytes.len() {
                return Err(CollageError::Decode("truncated fmt chunk".into()));
            }
            let format = read_u16(bytes, body);
            if format != 1 {
                return Err(CollageError::Decode(format!("unsupported WAV format code {}", format)));
            }
            spec = Some(WavSpec {
                channels: read_u16(bytes, body + 2),
                sample_rate: read_u32(bytes, body + 4),
                bit_depth: read_u16(bytes, body + 14),
            });
        } else if id == b"data" {
            let spec = spec.ok_or_else(|| CollageError::Decode("data chunk before fmt chunk".into()))?;
            let end = body.saturating_add(size).min(bytes.len());
            return Ok(WavInfo {
                spec,
                data: &bytes[body..end],
            });
        }

        // Chunks are padded to an even length.
        offset = body.saturating_add(size).saturating_add(size & 1);
    }

    Err(CollageError::Decode("missing data chunk".into()))
}

/// Decode 16-bit PCM into mono f32 samples in [-1.0, 1.0].
pub fn decode_pcm16_mono(info: &WavInfo<'_>) -> Result<Vec<f32>, CollageError> {
    if info.spec.bit_depth != 16 {
        return Err(CollageError::Decode(format!(
            "unsupported bit depth: {}",
            info.spec.bit_depth
        )));
    }
    if info.spec.channels == 0 {
        return Err(CollageError::Decode("zero channels".into()));
    }
    let samples: Vec<f32> = info
        .data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
        .collect();
    Ok(downmix_to_mono(&samples, info.spec.channels as usize))
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / channels;
    let scale = 1.0 / channels as f32;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in 0..frame_count {
        let mut sum = 0.0f32;
        for ch in 0..channels {
            sum += samples[frame * channels + ch];
        }
        mono.push(sum * scale);
    }
    mono
}
