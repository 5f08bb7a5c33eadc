// Audio buffers - planar, pre-allocated
//
// Every buffer is sized once for the maximum block size; processing a
// shorter block only touches the first `frames` samples of each channel.

#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    capacity: usize,
}

impl AudioBuffer {
    /// `num_channels` channels of `capacity` frames, zeroed
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| vec![0.0; capacity]).collect(),
            capacity,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Maximum frames per channel
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.channels.get_mut(index).map(Vec::as_mut_slice)
    }

    /// Zero every channel
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Zero the first `frames` samples of every channel
    pub fn clear_frames(&mut self, frames: usize) {
        let frames = frames.min(self.capacity);
        for channel in &mut self.channels {
            channel[..frames].fill(0.0);
        }
    }

    /// Mix `source` into channel `index` (sample-wise add)
    pub fn add_to_channel(&mut self, index: usize, source: &[f32]) {
        if let Some(channel) = self.channels.get_mut(index) {
            for (dst, src) in channel.iter_mut().zip(source) {
                *dst += *src;
            }
        }
    }

    /// Copy the first `frames` samples of each shared channel from `source`
    /// and zero the remaining channels of `self`
    pub fn copy_from(&mut self, source: &AudioBuffer, frames: usize) {
        let frames = frames.min(self.capacity).min(source.capacity);
        for (index, channel) in self.channels.iter_mut().enumerate() {
            match source.channels.get(index) {
                Some(src) => channel[..frames].copy_from_slice(&src[..frames]),
                None => channel[..frames].fill(0.0),
            }
        }
    }

    /// Peak absolute value over the first `frames` samples
    pub fn peak(&self, frames: usize) -> f32 {
        let frames = frames.min(self.capacity);
        self.channels
            .iter()
            .flat_map(|channel| channel[..frames].iter())
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_silent() {
        let buffer = AudioBuffer::new(2, 64);
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.peak(64), 0.0);
    }

    #[test]
    fn test_add_and_clear_frames() {
        let mut buffer = AudioBuffer::new(1, 8);
        buffer.add_to_channel(0, &[1.0; 8]);
        buffer.add_to_channel(0, &[0.5; 4]);
        assert_eq!(buffer.channel(0).unwrap()[0], 1.5);
        assert_eq!(buffer.channel(0).unwrap()[7], 1.0);

        buffer.clear_frames(4);
        assert_eq!(buffer.channel(0).unwrap()[3], 0.0);
        assert_eq!(buffer.channel(0).unwrap()[4], 1.0);
    }

    #[test]
    fn test_copy_from_zeroes_extra_channels() {
        let mut source = AudioBuffer::new(1, 4);
        source.channel_mut(0).unwrap().fill(0.25);

        let mut dest = AudioBuffer::new(2, 4);
        dest.channel_mut(1).unwrap().fill(1.0);
        dest.copy_from(&source, 4);

        assert_eq!(dest.channel(0).unwrap(), &[0.25; 4]);
        assert_eq!(dest.channel(1).unwrap(), &[0.0; 4]);
    }
}
