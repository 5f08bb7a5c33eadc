// Latency compensation - fixed sample delay per audio connection
//
// When two paths into a node carry different plugin latencies, the shorter
// one is delayed by the difference so both arrive time-aligned.

#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Delay of `delay` samples (0 = pass-through)
    pub fn new(delay: usize) -> Self {
        Self {
            buffer: vec![0.0; delay],
            write_pos: 0,
        }
    }

    pub fn delay(&self) -> usize {
        self.buffer.len()
    }

    /// Delay `block` in place
    pub fn process(&mut self, block: &mut [f32]) {
        if self.buffer.is_empty() {
            return;
        }
        for sample in block.iter_mut() {
            let delayed = self.buffer[self.write_pos];
            self.buffer[self.write_pos] = *sample;
            *sample = delayed;
            self.write_pos += 1;
            if self.write_pos == self.buffer.len() {
                self.write_pos = 0;
            }
        }
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_delay_is_passthrough() {
        let mut line = DelayLine::new(0);
        let mut block = [1.0, 2.0, 3.0];
        line.process(&mut block);
        assert_eq!(block, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_delay_across_blocks() {
        let mut line = DelayLine::new(3);

        let mut first = [1.0, 2.0];
        line.process(&mut first);
        assert_eq!(first, [0.0, 0.0]);

        let mut second = [3.0, 4.0, 5.0];
        line.process(&mut second);
        assert_eq!(second, [0.0, 1.0, 2.0]);

        line.reset();
        let mut third = [6.0];
        line.process(&mut third);
        assert_eq!(third, [0.0]);
    }
}
