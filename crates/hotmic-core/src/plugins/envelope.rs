//! Peak envelope follower shared by the dynamics plugins.

use libm::expf;

/// One-pole peak follower with separate attack and release.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    level: f32,
    attack_coeff: f32,
    release_coeff: f32,
    attack_ms: f32,
    release_ms: f32,
    sample_rate: f32,
}

fn coefficient(time_ms: f32, sample_rate: f32) -> f32 {
    expf(-1.0 / (time_ms * sample_rate / 1000.0))
}

impl EnvelopeFollower {
    /// A follower with the given times.
    pub fn new(sample_rate: f32, attack_ms: f32, release_ms: f32) -> Self {
        let mut env = Self {
            level: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            attack_ms: attack_ms.max(0.1),
            release_ms: release_ms.max(1.0),
            sample_rate,
        };
        env.recalculate();
        env
    }

    /// Change the sample rate, keeping the times.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate();
    }

    /// Attack time in ms (minimum 0.1).
    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        self.attack_ms = attack_ms.max(0.1);
        self.recalculate();
    }

    /// Release time in ms (minimum 1).
    pub fn set_release_ms(&mut self, release_ms: f32) {
        self.release_ms = release_ms.max(1.0);
        self.recalculate();
    }

    /// Feed one sample; returns the envelope level.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let x = input.abs();
        let coeff = if x > self.level {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.level = coeff * self.level + (1.0 - coeff) * x;
        self.level
    }

    /// Current level.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Zero the level.
    pub fn reset(&mut self) {
        self.level = 0.0;
    }

    fn recalculate(&mut self) {
        self.attack_coeff = coefficient(self.attack_ms, self.sample_rate);
        self.release_coeff = coefficient(self.release_ms, self.sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rises_and_falls() {
        let mut env = EnvelopeFollower::new(48000.0, 1.0, 10.0);
        for _ in 0..500 {
            env.process(1.0);
        }
        assert!(env.level() > 0.9);
        for _ in 0..1000 {
            env.process(0.0);
        }
        assert!(env.level() < 0.15, "level {}", env.level());
    }

    #[test]
    fn test_rectifies() {
        let mut env = EnvelopeFollower::new(48000.0, 1.0, 10.0);
        assert!(env.process(-0.5) > 0.0);
    }
}
