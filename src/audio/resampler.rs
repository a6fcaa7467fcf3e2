/*!
Sample-rate and channel conversion for whole decoded clips.

Clips are converted once, when they are decoded, into interleaved stereo at
the output stream's rate. Linear interpolation is plenty for ambient loops
and keeps the decode thread cheap.
*/

/// Fold interleaved audio with `channels` channels down (or up) to stereo.
///
/// Mono is duplicated to both sides; anything wider keeps the first two
/// channels.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        _ => samples
            .chunks_exact(channels)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

/// Resample interleaved f32 audio from `src_rate` to `dst_rate`.
pub fn resample(input: &[f32], channels: usize, src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if channels == 0 || src_rate == 0 || dst_rate == 0 {
        return Vec::new();
    }
    if src_rate == dst_rate {
        return input.to_vec();
    }

    let in_frames = input.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }

    // Source frames advanced per output frame.
    let step = src_rate as f64 / dst_rate as f64;
    let out_frames = ((in_frames as f64) / step).floor() as usize;
    let mut out = Vec::with_capacity(out_frames * channels);

    for frame in 0..out_frames {
        let pos = frame as f64 * step;
        let i = pos.floor() as usize;
        let frac = (pos - i as f64) as f32;
        let next = (i + 1).min(in_frames - 1);

        out.extend((0..channels).map(|c| {
            let s0 = input[i * channels + c];
            let s1 = input[next * channels + c];
            s0 + (s1 - s0) * frac
        }));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let input = vec![0.1, -0.1, 0.2, -0.2];
        assert_eq!(resample(&input, 2, 48_000, 48_000), input);
    }

    #[test]
    fn test_upsampling_doubles_length_and_interpolates() {
        let input = vec![0.0, 1.0, 2.0, 3.0];
        let out = resample(&input, 1, 24_000, 48_000);
        assert_eq!(out.len(), 8);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
        // Last frame holds instead of reading past the end.
        assert!((out[7] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_downsampling_keeps_channels_interleaved() {
        let input: Vec<f32> = (0..8).flat_map(|i| [i as f32, -(i as f32)]).collect();
        let out = resample(&input, 2, 48_000, 24_000);
        assert_eq!(out.len(), 8);
        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], -frame[1]);
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(resample(&[], 2, 44_100, 48_000).is_empty());
        assert!(resample(&[0.5], 0, 44_100, 48_000).is_empty());
        assert!(resample(&[0.5, 0.5], 2, 0, 48_000).is_empty());
    }

    #[test]
    fn test_to_stereo() {
        assert_eq!(to_stereo(&[0.25, 0.5], 1), vec![0.25, 0.25, 0.5, 0.5]);
        assert_eq!(to_stereo(&[0.1, 0.2], 2), vec![0.1, 0.2]);
        assert_eq!(
            to_stereo(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3),
            vec![0.1, 0.2, 0.4, 0.5]
        );
        assert!(to_stereo(&[0.1], 0).is_empty());
    }
}
