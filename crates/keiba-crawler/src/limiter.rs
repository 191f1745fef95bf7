use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::config::Throttle;

impl Throttle {
    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = match *self {
            Self::Delay(secs) => secs,
            Self::Jitter { min, max } if max > min => rng.gen_range(min..max),
            Self::Jitter { min, .. } => min,
        };
        Duration::from_secs_f32(secs.max(0.))
    }

    /// Blocks the calling worker for one throttling delay.
    pub fn pause(&self) {
        let delay = self.delay(&mut rand::thread_rng());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        let throttle = Throttle::Jitter { min: 2., max: 3. };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let d = throttle.delay(&mut rng).as_secs_f32();
            assert!((2. ..3.).contains(&d), "{d}");
        }
    }

    #[test]
    fn degenerate_jitter_is_fixed() {
        let mut rng = StdRng::seed_from_u64(7);
        let throttle = Throttle::Jitter { min: 1.5, max: 1.5 };
        assert_eq!(throttle.delay(&mut rng), Duration::from_secs_f32(1.5));
        assert_eq!(Throttle::Delay(-1.).delay(&mut rng), Duration::ZERO);
    }
}
