//! Audio re-framing.
//!
//! The TTS backend delivers audio in arbitrarily sized pieces; the playback
//! consumer expects fixed-size frames. [`AudioFramer`] keeps the bytes that
//! do not yet fill a frame (the residue) and slices off every complete frame
//! as soon as it is available.

/// Fixed-size audio framer with a residue buffer.
#[derive(Debug, Clone)]
pub struct AudioFramer {
    frame_length: usize,
    residue: Vec<u8>,
}

impl AudioFramer {
    /// Create a framer producing `frame_length`-byte frames.
    ///
    /// A zero length is treated as one byte.
    #[must_use]
    pub fn new(frame_length: usize) -> Self {
        Self {
            frame_length: frame_length.max(1),
            residue: Vec::with_capacity(frame_length),
        }
    }

    /// Frame size in bytes.
    #[must_use]
    pub const fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Bytes waiting for a full frame.
    #[must_use]
    pub fn residue_len(&self) -> usize {
        self.residue.len()
    }

    /// Append `audio` and return every complete frame now available.
    pub fn push(&mut self, audio: &[u8]) -> Vec<Vec<u8>> {
        self.residue.extend_from_slice(audio);
        let full = self.residue.len() - self.residue.len() % self.frame_length;
        let frames = self.residue[..full]
            .chunks_exact(self.frame_length)
            .map(<[u8]>::to_vec)
            .collect();
        self.residue.drain(..full);
        frames
    }

    /// Append `audio`, return every complete frame, and turn any remaining
    /// residue into one final short frame. The residue is empty afterwards.
    pub fn flush(&mut self, audio: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = self.push(audio);
        if !self.residue.is_empty() {
            frames.push(std::mem::take(&mut self.residue));
        }
        frames
    }

    /// Discard the residue.
    pub fn clear(&mut self) {
        self.residue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random split points.
    fn splits(len: usize, seed: u64) -> Vec<usize> {
        let mut state = seed;
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < len {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let step = (state >> 33) as usize % 900 + 1;
            pos = (pos + step).min(len);
            out.push(pos);
        }
        out
    }

    #[test]
    fn frames_arbitrary_deliveries_exactly() {
        for (len, frame, seed) in [(0, 512, 1), (511, 512, 2), (512, 512, 3), (5000, 512, 4), (7777, 100, 5), (3, 1, 6)] {
            let input: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut framer = AudioFramer::new(frame);
            let mut frames = Vec::new();

            let cuts = splits(len, seed);
            let mut start = 0;
            for (i, &end) in cuts.iter().enumerate() {
                if i + 1 == cuts.len() {
                    frames.extend(framer.flush(&input[start..end]));
                } else {
                    frames.extend(framer.push(&input[start..end]));
                }
                start = end;
            }
            if cuts.is_empty() {
                frames.extend(framer.flush(&[]));
            }

            assert_eq!(frames.len(), len.div_ceil(frame), "len={len} frame={frame}");
            if let Some((last, rest)) = frames.split_last() {
                assert!(rest.iter().all(|f| f.len() == frame));
                assert!(!last.is_empty() && last.len() <= frame);
            }
            assert_eq!(frames.concat(), input);
            assert_eq!(framer.residue_len(), 0);
        }
    }

    #[test]
    fn push_keeps_partial_frame_as_residue() {
        let mut framer = AudioFramer::new(4);
        assert!(framer.push(&[1, 2, 3]).is_empty());
        assert_eq!(framer.residue_len(), 3);

        let frames = framer.push(&[4, 5]);
        assert_eq!(frames, vec![vec![1, 2, 3, 4]]);
        assert_eq!(framer.residue_len(), 1);
    }

    #[test]
    fn flush_emits_short_tail() {
        let mut framer = AudioFramer::new(4);
        let frames = framer.flush(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(frames, vec![vec![1, 2, 3, 4], vec![5, 6]]);
    }

    #[test]
    fn flush_of_nothing_yields_nothing() {
        let mut framer = AudioFramer::new(4);
        assert!(framer.flush(&[]).is_empty());
    }

    #[test]
    fn clear_discards_residue() {
        let mut framer = AudioFramer::new(4);
        framer.push(&[9, 9]);
        framer.clear();
        assert_eq!(framer.flush(&[1]), vec![vec![1]]);
    }
}
