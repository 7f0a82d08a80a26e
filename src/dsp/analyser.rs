//! Analysis tap: keeps the most recent block of waveform samples.

use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, RingBuffer};

/// Fixed-size window over the latest samples that passed through the tap.
///
/// Always holds exactly `size` samples (zero-filled at construction), so
/// readers get a full window even before any audio has been rendered.
pub struct Analyser {
    buffer: HeapRb<f32>,
    size: usize,
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser").field("size", &self.size).finish()
    }
}

impl Analyser {
    pub fn new(size: usize) -> Self {
        let size = size.max(32);
        let mut buffer = HeapRb::new(size);
        for _ in 0..size {
            buffer.push_overwrite(0.0);
        }
        Analyser { buffer, size }
    }

    /// Window length in samples.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Half the window, as the host API reports for its FFT size.
    pub fn frequency_bin_count(&self) -> usize {
        self.size / 2
    }

    /// Record one sample, dropping the oldest.
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.buffer.push_overwrite(sample);
    }

    /// Copy the newest `out.len()` samples (oldest first). Returns the count written.
    pub fn time_domain_data(&self, out: &mut [f32]) -> usize {
        let len = self.buffer.occupied_len();
        let n = out.len().min(len);
        for (dst, src) in out.iter_mut().zip(self.buffer.iter().skip(len - n)) {
            *dst = *src;
        }
        n
    }
}

/// Map a float sample to the 8-bit view used by waveform displays (128 = silence).
pub fn sample_to_byte(sample: f32) -> u8 {
    (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8
}

/// Root mean square of a buffer.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_silent_and_full() {
        let a = Analyser::new(64);
        let mut out = vec![1.0f32; 64];
        assert_eq!(a.time_domain_data(&mut out), 64);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(a.frequency_bin_count(), 32);
    }

    #[test]
    fn keeps_newest_samples_in_order() {
        let mut a = Analyser::new(32);
        for i in 0..100 {
            a.push(i as f32);
        }
        let mut out = vec![0.0f32; 4];
        a.time_domain_data(&mut out);
        assert_eq!(out, vec![96.0, 97.0, 98.0, 99.0]);
    }

    #[test]
    fn oversized_request_is_truncated() {
        let a = Analyser::new(32);
        let mut out = vec![0.5f32; 40];
        assert_eq!(a.time_domain_data(&mut out), 32);
        assert_eq!(out[39], 0.5);
    }

    #[test]
    fn byte_mapping() {
        assert_eq!(sample_to_byte(0.0), 128);
        assert_eq!(sample_to_byte(-1.0), 0);
        assert_eq!(sample_to_byte(1.0), 255);
        assert_eq!(sample_to_byte(4.0), 255);
    }

    #[test]
    fn rms_of_square() {
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }
}
