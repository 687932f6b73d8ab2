//! Level metering over f32 sample buffers.

/// Root-mean-square level of a window, accumulated in f64. Empty windows read 0.0.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / samples.len() as f64).sqrt() as f32
}

/// Split `samples` into `bars` equal windows and return one RMS level per
/// window, scaled so the loudest bar is 1.0.
///
/// Always returns exactly `bars` values; windows past the end of a short
/// buffer are silent.
pub fn bar_levels(samples: &[f32], bars: usize) -> Vec<f32> {
    if bars == 0 {
        return Vec::new();
    }
    let mut levels = vec![0.0f32; bars];
    if samples.is_empty() {
        return levels;
    }

    let window = samples.len().div_ceil(bars);
    for (level, chunk) in levels.iter_mut().zip(samples.chunks(window)) {
        *level = rms(chunk);
    }

    let loudest = levels.iter().copied().fold(0.0f32, f32::max);
    if loudest > 0.0 {
        for level in &mut levels {
            *level /= loudest;
        }
    }
    levels
}
