use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which physical sensor(s) of the dual-sensor head are driven.
///
/// `Both` means the two sensors run jointly and their frames are aligned
/// into synchronized pairs; it is a session mode, not a frame-level tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorChannel {
    Ch1,
    Ch2,
    Both,
}

impl SensorChannel {
    /// Physical sensor ids active in this mode.
    pub const fn sensor_ids(self) -> &'static [u8] {
        match self {
            Self::Ch1 => &[0],
            Self::Ch2 => &[1],
            Self::Both => &[0, 1],
        }
    }

    /// True when both sensors run and frames must be pair-synchronized.
    pub const fn is_dual(self) -> bool {
        matches!(self, Self::Both)
    }

    pub fn accepts(self, sensor_id: u8) -> bool {
        self.sensor_ids().contains(&sensor_id)
    }
}

/// One decoded image delivered by a sensor channel.
///
/// Pixel data is shared immutably, so cloning a frame never copies the
/// buffer. `timestamp_us` is monotonic capture time in the grabber's clock
/// domain, comparable across channels; it carries no wall-clock meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Physical sensor that produced this frame (0 or 1).
    pub sensor_id: u8,

    /// Decoded pixel data, `width * height * bytes_per_pixel` bytes.
    pub pixels: Bytes,

    pub width: u32,
    pub height: u32,

    /// Pixel encoding width: 8 for raw sensor output, 24 for reconstructed
    /// RGB. 0 marks the empty "no frame yet" sentinel.
    pub bits_per_pixel: u8,

    /// Monotonic capture timestamp in microseconds.
    pub timestamp_us: u64,
}

impl Frame {
    /// The "no frame" sentinel: zero-length buffer, zero dimensions.
    pub fn empty(sensor_id: u8) -> Self {
        Self {
            sensor_id,
            pixels: Bytes::new(),
            width: 0,
            height: 0,
            bits_per_pixel: 0,
            timestamp_us: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Buffer length implied by the dimensions, rounding bits up to whole
    /// bytes per pixel.
    pub fn expected_len(&self) -> usize {
        let bytes_per_pixel = usize::from(self.bits_per_pixel).div_ceil(8);
        self.width as usize * self.height as usize * bytes_per_pixel
    }

    /// Whether buffer length and dimensions agree. The empty sentinel is
    /// well formed only with all-zero dimensions.
    pub fn is_well_formed(&self) -> bool {
        if self.pixels.is_empty() {
            return self.width == 0 && self.height == 0 && self.bits_per_pixel == 0;
        }
        self.width > 0
            && self.height > 0
            && self.bits_per_pixel > 0
            && self.pixels.len() == self.expected_len()
    }
}

/// What the frame queue delivers: a lone frame in single-sensor mode, a
/// timestamp-matched pair in dual mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutput {
    Single(Frame),
    /// `left` is sensor 0, `right` is sensor 1; timestamps differ by no
    /// more than the configured tolerance.
    Pair { left: Frame, right: Frame },
}

impl FrameOutput {
    /// Frames in this output, left before right.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        let (first, second) = match self {
            Self::Single(frame) => (frame, None),
            Self::Pair { left, right } => (left, Some(right)),
        };
        std::iter::once(first).chain(second)
    }

    /// The primary frame: the single frame, or the left half of a pair.
    pub fn primary(&self) -> &Frame {
        match self {
            Self::Single(frame) => frame,
            Self::Pair { left, .. } => left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, bpp: u8, len: usize) -> Frame {
        Frame {
            sensor_id: 0,
            pixels: Bytes::from(vec![0u8; len]),
            width,
            height,
            bits_per_pixel: bpp,
            timestamp_us: 0,
        }
    }

    #[test]
    fn empty_sentinel_is_well_formed() {
        let sentinel = Frame::empty(0);
        assert!(sentinel.is_empty());
        assert!(sentinel.is_well_formed());
    }

    #[test]
    fn rgb_frame_length_checks_out() {
        assert!(frame(4, 2, 24, 4 * 2 * 3).is_well_formed());
        assert!(!frame(4, 2, 24, 4 * 2).is_well_formed());
    }

    #[test]
    fn raw_frame_rounds_bits_to_bytes() {
        assert!(frame(320, 320, 8, 320 * 320).is_well_formed());
        // 10-bit pixels still occupy two bytes each
        assert_eq!(frame(4, 1, 10, 8).expected_len(), 8);
    }

    #[test]
    fn zero_length_with_dimensions_is_malformed() {
        assert!(!frame(4, 2, 24, 0).is_well_formed());
    }

    #[test]
    fn channel_sensor_ids() {
        assert_eq!(SensorChannel::Ch1.sensor_ids(), &[0]);
        assert_eq!(SensorChannel::Ch2.sensor_ids(), &[1]);
        assert_eq!(SensorChannel::Both.sensor_ids(), &[0, 1]);
        assert!(SensorChannel::Both.is_dual());
        assert!(!SensorChannel::Ch2.accepts(0));
    }

    #[test]
    fn output_iterates_left_then_right() {
        let left = frame(2, 2, 8, 4);
        let mut right = frame(2, 2, 8, 4);
        right.sensor_id = 1;
        let pair = FrameOutput::Pair {
            left: left.clone(),
            right,
        };
        let ids: Vec<u8> = pair.frames().map(|f| f.sensor_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(pair.primary(), &left);
    }
}
