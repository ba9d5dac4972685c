use std::collections::VecDeque;

use vc_core::frame::{FeatureFrame, FEATURE_DIM};

/// Bounded ring of the most recent admitted feature frames.
///
/// Newest-first retention: pushing beyond capacity evicts the oldest frame.
/// Inference consumes the window without draining it.
///
/// # Example
/// ```
/// use vc_predict::window::FeatureWindow;
/// let window = FeatureWindow::new(64);
/// assert!(window.mean_vector().is_none());
/// ```
pub struct FeatureWindow {
    frames: VecDeque<FeatureFrame>,
    capacity: usize,
}

impl FeatureWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest if the window is full.
    pub fn push(&mut self, frame: FeatureFrame) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Column-wise mean of the flattened feature vectors, or `None` when
    /// the window is empty.
    #[must_use]
    pub fn mean_vector(&self) -> Option<[f32; FEATURE_DIM]> {
        if self.frames.is_empty() {
            return None;
        }
        let mut mean = [0.0f32; FEATURE_DIM];
        for frame in &self.frames {
            for (slot, value) in mean.iter_mut().zip(frame.as_vector()) {
                *slot += value;
            }
        }
        let n = self.frames.len() as f32;
        for slot in &mut mean {
            *slot /= n;
        }
        Some(mean)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every buffered frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame_with_mfcc0(value: f32) -> FeatureFrame {
        let mut frame = FeatureFrame::default();
        frame.mfcc[0] = value;
        frame
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut window = FeatureWindow::new(3);
        for i in 0..5 {
            window.push(frame_with_mfcc0(i as f32));
        }
        assert_eq!(window.len(), 3);
        // 0 and 1 were evicted: mean of {2, 3, 4} = 3.
        let mean = window.mean_vector().unwrap();
        assert!((mean[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn mean_is_column_wise() {
        let mut window = FeatureWindow::new(8);
        let mut a = FeatureFrame {
            centroid: 0.4,
            ..FeatureFrame::default()
        };
        a.mfcc[1] = 2.0;
        let mut b = FeatureFrame {
            centroid: 0.8,
            ..FeatureFrame::default()
        };
        b.mfcc[1] = 4.0;
        window.push(a);
        window.push(b);

        let mean = window.mean_vector().unwrap();
        assert!((mean[1] - 3.0).abs() < 1e-6);
        let centroid_idx = vc_core::frame::N_MFCC + vc_core::frame::N_CHROMA;
        assert!((mean[centroid_idx] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn clear_empties_without_touching_capacity() {
        let mut window = FeatureWindow::new(4);
        window.push(FeatureFrame::default());
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 4);
        assert!(window.mean_vector().is_none());
    }
}
