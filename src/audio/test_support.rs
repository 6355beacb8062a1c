use super::SampleFrame;

pub fn sine_samples(frequency: f32, amplitude: f32, len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

pub fn sine_frame(frequency: f32, amplitude: f32, len: usize, sample_rate: u32) -> SampleFrame {
    SampleFrame::new(sine_samples(frequency, amplitude, len, sample_rate), sample_rate)
}

/// Sawtooth-like voice stand-in: a fundamental plus decaying harmonics.
pub fn harmonic_frame(fundamental: f32, amplitude: f32, len: usize, sample_rate: u32) -> SampleFrame {
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (1..=5)
                .map(|h| {
                    let phase = 2.0 * std::f32::consts::PI * fundamental * h as f32 * t;
                    amplitude * phase.sin() / h as f32
                })
                .sum::<f32>()
        })
        .collect();
    SampleFrame::new(samples, sample_rate)
}

pub fn noise_frame(amplitude: f32, len: usize, sample_rate: u32, seed: u64) -> SampleFrame {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let samples = (0..len)
        .map(|_| rng.gen_range(-amplitude..=amplitude))
        .collect();
    SampleFrame::new(samples, sample_rate)
}
