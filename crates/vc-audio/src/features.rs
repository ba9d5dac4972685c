use vc_core::frame::{FeatureFrame, N_CHROMA, N_MFCC};

use crate::fft::SpectrumAnalyzer;

/// Mel filterbank size feeding the cepstral coefficients.
const MEL_BANDS: usize = N_MFCC;

/// Critical-band (Bark) edges in Hz for the loudness measure.
const BARK_EDGES_HZ: [f32; 25] = [
    0.0, 100.0, 200.0, 300.0, 400.0, 510.0, 630.0, 770.0, 920.0, 1080.0, 1270.0, 1480.0, 1720.0,
    2000.0, 2320.0, 2700.0, 3150.0, 3700.0, 4400.0, 5300.0, 6400.0, 7700.0, 9500.0, 12000.0,
    15500.0,
];

/// Block-wise spectral feature extractor.
///
/// Computes one `FeatureFrame` per fixed-size sample block: MFCCs through a
/// mel filterbank + DCT-II, a 12-bin chroma fold against A440, centroid,
/// flatness, slope, kurtosis, and a Stevens-law Bark-band total loudness.
///
/// All filter weights and the DCT basis are precomputed in the constructor;
/// `analyze` allocates nothing beyond the returned frame.
pub struct BlockAnalyzer {
    fft: SpectrumAnalyzer,
    sample_rate: u32,
    bin_hz: f32,
    /// Dense triangular filter weights, `MEL_BANDS` rows of `bins` columns.
    mel_weights: Vec<f32>,
    /// Scratch: log mel energies.
    mel_log: Vec<f32>,
    /// DCT-II basis, `N_MFCC` rows of `MEL_BANDS` columns.
    dct: Vec<f32>,
    /// Pitch class per bin (bin 0 excluded via sentinel).
    chroma_class: Vec<usize>,
    /// Bark band per bin (sentinel for bins above the last edge).
    bark_band: Vec<usize>,
}

const NO_BAND: usize = usize::MAX;

impl BlockAnalyzer {
    /// Create an analyzer for `block_size`-sample blocks at `sample_rate`.
    ///
    /// # Panics
    /// Panics if `block_size` is 0 (via the FFT plan).
    #[must_use]
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        let fft = SpectrumAnalyzer::new(block_size);
        let bins = fft.bins();
        let bin_hz = sample_rate as f32 / block_size as f32;
        let nyquist = sample_rate as f32 / 2.0;

        // Triangular mel filterbank, MEL_BANDS filters from 0 Hz to Nyquist.
        let hz_to_mel = |f: f32| 2595.0 * (1.0 + f / 700.0).log10();
        let mel_to_hz = |m: f32| 700.0 * (10.0f32.powf(m / 2595.0) - 1.0);
        let mel_hi = hz_to_mel(nyquist);
        let points: Vec<f32> = (0..MEL_BANDS + 2)
            .map(|i| mel_to_hz(mel_hi * i as f32 / (MEL_BANDS + 1) as f32))
            .collect();

        let mut mel_weights = vec![0.0f32; MEL_BANDS * bins];
        for band in 0..MEL_BANDS {
            let (left, center, right) = (points[band], points[band + 1], points[band + 2]);
            for k in 0..bins {
                let f = k as f32 * bin_hz;
                let w = if f > left && f <= center {
                    (f - left) / (center - left).max(f32::EPSILON)
                } else if f > center && f < right {
                    (right - f) / (right - center).max(f32::EPSILON)
                } else {
                    0.0
                };
                mel_weights[band * bins + k] = w;
            }
        }

        // DCT-II basis for the cepstral transform.
        let mut dct = vec![0.0f32; N_MFCC * MEL_BANDS];
        for k in 0..N_MFCC {
            for n in 0..MEL_BANDS {
                dct[k * MEL_BANDS + n] =
                    (std::f32::consts::PI * k as f32 * (n as f32 + 0.5) / MEL_BANDS as f32).cos();
            }
        }

        // Pitch-class fold relative to A440.
        let chroma_class: Vec<usize> = (0..bins)
            .map(|k| {
                if k == 0 {
                    NO_BAND
                } else {
                    let f = k as f32 * bin_hz;
                    let semitones = (12.0 * (f / 440.0).log2()).round() as i64;
                    semitones.rem_euclid(12) as usize
                }
            })
            .collect();

        // Bark band per bin.
        let bark_band: Vec<usize> = (0..bins)
            .map(|k| {
                let f = k as f32 * bin_hz;
                BARK_EDGES_HZ
                    .windows(2)
                    .position(|edge| f >= edge[0] && f < edge[1])
                    .unwrap_or(NO_BAND)
            })
            .collect();

        Self {
            fft,
            sample_rate,
            bin_hz,
            mel_weights,
            mel_log: vec![0.0; MEL_BANDS],
            dct,
            chroma_class,
            bark_band,
        }
    }

    /// Samples per analysis block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.fft.size()
    }

    /// Sample rate the filter tables were built for.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Extract one feature frame from a block of mono samples.
    pub fn analyze(&mut self, samples: &[f32]) -> FeatureFrame {
        let spectrum = self.fft.magnitudes(samples);
        let bins = spectrum.len();
        let total: f32 = spectrum.iter().sum();

        if total < 1e-9 {
            return FeatureFrame::default();
        }

        // Loudness: per-Bark-band magnitude sums through Stevens's power law.
        let mut bark_sums = [0.0f32; BARK_EDGES_HZ.len() - 1];
        for (k, &mag) in spectrum.iter().enumerate() {
            let band = self.bark_band[k];
            if band != NO_BAND {
                bark_sums[band] += mag;
            }
        }
        let loudness = bark_sums.iter().map(|&s| s.powf(0.23)).sum();

        // Centroid as a fraction of Nyquist.
        let weighted: f32 = spectrum.iter().enumerate().map(|(k, &m)| k as f32 * m).sum();
        let centroid = (weighted / total / (bins - 1) as f32).clamp(0.0, 1.0);

        // Flatness: geometric mean over arithmetic mean.
        let n = bins as f32;
        let log_sum: f32 = spectrum.iter().map(|&m| (m + 1e-10).ln()).sum();
        let geo_mean = (log_sum / n).exp();
        let flatness = (geo_mean / (total / n)).clamp(0.0, 1.0);

        // Slope: least-squares fit of magnitude against frequency.
        let mean_f = self.bin_hz * (bins - 1) as f32 / 2.0;
        let mean_m = total / n;
        let mut cov = 0.0f32;
        let mut var = 0.0f32;
        for (k, &m) in spectrum.iter().enumerate() {
            let df = k as f32 * self.bin_hz - mean_f;
            cov += df * (m - mean_m);
            var += df * df;
        }
        let slope = if var > 0.0 { cov / var } else { 0.0 };

        // Kurtosis: 4th standardized moment around the centroid frequency.
        let centroid_hz = centroid * self.bin_hz * (bins - 1) as f32;
        let mut m2 = 0.0f32;
        let mut m4 = 0.0f32;
        for (k, &m) in spectrum.iter().enumerate() {
            let d = k as f32 * self.bin_hz - centroid_hz;
            m2 += m * d * d;
            m4 += m * d * d * d * d;
        }
        m2 /= total;
        m4 /= total;
        let kurtosis = if m2 > f32::EPSILON { m4 / (m2 * m2) } else { 0.0 };

        // MFCC: mel filterbank → log → DCT-II.
        for (band, slot) in self.mel_log.iter_mut().enumerate() {
            let row = &self.mel_weights[band * bins..(band + 1) * bins];
            let energy: f32 = row.iter().zip(spectrum).map(|(w, m)| w * m).sum();
            *slot = (energy + 1e-10).ln();
        }
        let mut mfcc = [0.0f32; N_MFCC];
        for (k, coeff) in mfcc.iter_mut().enumerate() {
            let row = &self.dct[k * MEL_BANDS..(k + 1) * MEL_BANDS];
            *coeff = row.iter().zip(&self.mel_log).map(|(c, e)| c * e).sum();
        }

        // Chroma: magnitude fold into pitch classes, max-normalized.
        let mut chroma = [0.0f32; N_CHROMA];
        for (k, &mag) in spectrum.iter().enumerate() {
            let class = self.chroma_class[k];
            if class != NO_BAND {
                chroma[class] += mag;
            }
        }
        let max_chroma = chroma.iter().fold(0.0f32, |a, &b| a.max(b));
        if max_chroma > 0.0 {
            for c in &mut chroma {
                *c /= max_chroma;
            }
        }

        FeatureFrame {
            mfcc,
            chroma,
            centroid,
            flatness,
            slope,
            kurtosis,
            loudness,
        }
    }
}
