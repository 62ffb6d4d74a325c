// Tap Traffic Generator: seedable Poisson tap arrivals and write-failure draws

use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub struct TapTraffic {
    rng: ChaCha8Rng,
    pub taps_generated: u64,
    pub failures_drawn: u64,
}

impl TapTraffic {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self { rng, taps_generated: 0, failures_drawn: 0 }
    }

    /// Number of taps one device attempts during one second.
    /// `lambda` is the expected taps per second.
    pub fn taps_this_second(&mut self, lambda: f64) -> u32 {
        if lambda <= 0.0 {
            return 0;
        }
        let n = poisson_sample(&mut self.rng, lambda);
        self.taps_generated += u64::from(n);
        n
    }

    /// Whether the backend should fail the next write.
    pub fn write_fails(&mut self, failure_rate: f64) -> bool {
        if failure_rate <= 0.0 {
            return false;
        }
        let fails = self.rng.gen::<f64>() < failure_rate;
        if fails {
            self.failures_drawn += 1;
        }
        fails
    }

    /// Random order in which devices act within one second.
    pub fn device_order(&mut self, devices: u32) -> Vec<u32> {
        let mut order: Vec<u32> = (0..devices).collect();
        for i in (1..order.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            order.swap(i, j);
        }
        order
    }
}

/// Poisson sampling via Knuth algorithm.
/// For λ < 30, uses direct method. For larger λ, uses normal approximation.
fn poisson_sample(rng: &mut ChaCha8Rng, lambda: f64) -> u32 {
    if lambda < 30.0 {
        let l = (-lambda).exp();
        let mut k: u32 = 0;
        let mut p: f64 = 1.0;
        loop {
            k += 1;
            p *= rng.gen::<f64>();
            if p <= l {
                return k - 1;
            }
        }
    } else {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let result = lambda + lambda.sqrt() * z;
        result.round().max(0.0) as u32
    }
}
