//! # PCM16 Audio Frame Codec
//!
//! Converts between floating-point audio samples and the fixed 16-bit
//! signed little-endian PCM wire format used on the session channel.
//!
//! ## Wire Format:
//! - **Encoding**: Little-endian signed 16-bit integers, mono
//! - **Scaling**: Asymmetric — negative samples scale by 32768, non-negative
//!   by 32767, reflecting the two's-complement range of i16
//! - **Clamping**: Every input sample is clamped to [-1.0, 1.0] before
//!   scaling, so no input can produce an out-of-range integer

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Encode floating-point samples into little-endian PCM16 bytes.
///
/// Each sample is clamped to [-1.0, 1.0] and scaled asymmetrically:
/// `s < 0 ? s * 32768 : s * 32767`. The resulting buffer is exactly
/// `samples.len() * 2` bytes.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let value = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        // Writing into a Vec cannot fail
        out.write_i16::<LittleEndian>(value)
            .expect("write into Vec");
    }
    out
}

/// Decode little-endian PCM16 bytes back into floating-point samples.
///
/// The inverse of [`encode`]: negative stored values divide by 32768,
/// non-negative by 32767, so all decoded samples land in [-1.0, 1.0].
///
/// ## Errors:
/// Returns an error message if the byte length is odd (16-bit samples
/// require an even number of bytes).
pub fn decode(data: &[u8]) -> Result<Vec<f32>, String> {
    if data.len() % 2 != 0 {
        return Err("PCM16 data length must be even".to_string());
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);

    while let Ok(value) = cursor.read_i16::<LittleEndian>() {
        let divisor = if value < 0 { 32768.0 } else { 32767.0 };
        samples.push(value as f32 / divisor);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_within_quantization_error() {
        let input = vec![0.0f32, 0.5, -0.5, 0.999, -0.999, 0.123_456, -0.654_321, 1.0, -1.0];
        let decoded = decode(&encode(&input)).unwrap();

        assert_eq!(decoded.len(), input.len());
        for (original, roundtripped) in input.iter().zip(decoded.iter()) {
            let clamped = original.clamp(-1.0, 1.0);
            assert!(
                (clamped - roundtripped).abs() <= 1.0 / 32767.0,
                "round-trip error too large: {} vs {}",
                clamped,
                roundtripped
            );
        }
    }

    #[test]
    fn test_clamping_out_of_range_input() {
        let input = vec![2.0f32, -3.5, 1.000_1, -1.000_1];
        let decoded = decode(&encode(&input)).unwrap();

        for value in decoded {
            assert!((-1.0..=1.0).contains(&value));
        }
        // Saturated positive input decodes as exactly full scale
        assert!((decoded_full_scale() - 1.0).abs() < f32::EPSILON);
    }

    fn decoded_full_scale() -> f32 {
        decode(&encode(&[5.0f32])).unwrap()[0]
    }

    #[test]
    fn test_extremes_are_monotonic() {
        // i16::MIN decodes to -1.0 and i16::MAX to 1.0
        let bytes = [0x00, 0x80, 0xFF, 0x7F]; // -32768, 32767
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(decode(&[0u8; 15]).is_err());
    }
}
