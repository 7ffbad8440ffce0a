//! Deterministic sample sequences fed into the pipeline.

use qsoftmax_common::GeneratorKind;

/// Endless sample sequence with its own position counter.
///
/// Two generators of the same kind always produce the same values, and
/// restarting a run means creating a fresh generator.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGenerator {
    kind: GeneratorKind,
    counter: u64,
}

impl SampleGenerator {
    pub fn new(kind: GeneratorKind) -> Self {
        Self { kind, counter: 0 }
    }

    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    /// Number of samples produced so far.
    pub fn position(&self) -> u64 {
        self.counter
    }

    /// The next `n` samples.
    pub fn take_samples(&mut self, n: usize) -> Vec<f32> {
        self.by_ref().take(n).collect()
    }
}

impl Iterator for SampleGenerator {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let i = self.counter;
        self.counter += 1;
        Some(match self.kind {
            GeneratorKind::Cosine => (i as f32 / 10.0).cos(),
            GeneratorKind::Ramp => (i + 1) as f32,
            GeneratorKind::Zeros => 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_starts_at_one() {
        let mut g = SampleGenerator::new(GeneratorKind::Cosine);
        let v = g.take_samples(11);
        assert_eq!(v[0], 1.0);
        assert!((v[10] - 1.0f32.cos()).abs() < 1e-7);
        assert_eq!(g.position(), 11);
    }

    #[test]
    fn generators_continue_where_they_stopped() {
        let mut g = SampleGenerator::new(GeneratorKind::Ramp);
        assert_eq!(g.take_samples(3), vec![1.0, 2.0, 3.0]);
        assert_eq!(g.take_samples(2), vec![4.0, 5.0]);
    }

    #[test]
    fn fresh_generators_are_independent() {
        let mut a = SampleGenerator::new(GeneratorKind::Cosine);
        a.take_samples(7);
        let mut b = SampleGenerator::new(GeneratorKind::Cosine);
        assert_eq!(b.take_samples(3), SampleGenerator::new(GeneratorKind::Cosine).take_samples(3));
        assert_ne!(a.position(), b.position());
    }

    #[test]
    fn zeros_are_zero() {
        let mut g = SampleGenerator::new(GeneratorKind::Zeros);
        assert!(g.take_samples(5).iter().all(|&v| v == 0.0));
    }
}
