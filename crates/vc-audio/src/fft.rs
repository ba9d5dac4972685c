use realfft::RealFftPlanner;

/// Windowed real FFT producing an amplitude spectrum.
///
/// Pre-allocates the FFT plan and scratch buffers; `magnitudes` performs no
/// allocation and returns a slice into an internal buffer of `N/2 + 1` bins.
/// Magnitudes are raw (not divided by the window size); downstream
/// descriptors are either scale-invariant ratios or defined on this scale.
///
/// # Example
/// ```
/// use vc_audio::fft::SpectrumAnalyzer;
/// let mut fft = SpectrumAnalyzer::new(256);
/// let samples = vec![0.0f32; 256];
/// assert_eq!(fft.magnitudes(&samples).len(), 129);
/// ```
pub struct SpectrumAnalyzer {
    size: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<realfft::num_complex::Complex<f32>>,
    scratch: Vec<realfft::num_complex::Complex<f32>>,
    magnitude_buf: Vec<f32>,
    plan: std::sync::Arc<dyn realfft::RealToComplex<f32>>,
    /// Hann window coefficients.
    window: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for blocks of `size` samples.
    ///
    /// # Panics
    /// Panics if `size` is 0.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let magnitude_buf = vec![0.0; spectrum_buf.len()];

        // Hann window
        let window: Vec<f32> = (0..size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size as f32 - 1.0)).cos())
            })
            .collect();

        Self {
            size,
            input_buf,
            spectrum_buf,
            scratch,
            magnitude_buf,
            plan,
            window,
        }
    }

    /// Window `samples` and compute the amplitude spectrum.
    ///
    /// Input shorter than the block size is zero-padded; longer input is
    /// truncated to the first `size` samples.
    pub fn magnitudes(&mut self, samples: &[f32]) -> &[f32] {
        let n = self.size.min(samples.len());

        for (i, slot) in self.input_buf.iter_mut().enumerate() {
            *slot = if i < n { samples[i] * self.window[i] } else { 0.0 };
        }

        if self
            .plan
            .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            self.magnitude_buf.fill(0.0);
            return &self.magnitude_buf;
        }

        for (mag, c) in self.magnitude_buf.iter_mut().zip(&self.spectrum_buf) {
            *mag = (c.re * c.re + c.im * c.im).sqrt();
        }
        &self.magnitude_buf
    }

    /// FFT block size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of spectrum bins (`N/2 + 1`).
    #[must_use]
    pub fn bins(&self) -> usize {
        self.magnitude_buf.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_zero_spectrum() {
        let mut fft = SpectrumAnalyzer::new(512);
        let silence = vec![0.0f32; 512];
        let mags = fft.magnitudes(&silence);
        assert!(mags.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn sine_peaks_at_expected_bin() {
        let size = 512;
        let sample_rate = 44_100.0f32;
        let freq = 2_756.25f32; // exactly bin 32 at 44.1 kHz / 512
        let samples: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let mut fft = SpectrumAnalyzer::new(size);
        let mags = fft.magnitudes(&samples);
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 32);
    }
}
