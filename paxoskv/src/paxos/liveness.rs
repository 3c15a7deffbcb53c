//! Node availability and the failure simulator.
//!
//! A node marked down no-responds to prepare and accept until its window has
//! elapsed. Recovery is lazy: the flag is only cleared by the next status
//! check that observes the elapsed window.

use std::sync::Arc;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};

use crate::metrics;

#[derive(Debug, Default, Clone)]
pub struct Availability {
    down_since: Option<Instant>,
    window: Duration,
}

impl Availability {
    pub fn mark_down(&mut self, now: Instant, window: Duration) {
        self.down_since = Some(now);
        self.window = window;
    }

    /// Status check run on every prepare and accept.
    pub fn is_down(&mut self, now: Instant) -> bool {
        match self.down_since {
            Some(since) if now.saturating_duration_since(since) >= self.window => {
                self.down_since = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn down_since(&self) -> Option<Instant> {
        self.down_since
    }
}

/// Something that can take a replica out of service for a while.
pub trait FailureInjector: Send + Sync {
    fn replicas(&self) -> usize;

    fn mark_unavailable(&self, replica: usize, window: Duration);
}

/// Chooses which replica the simulator takes down next.
pub trait VictimPicker: Send {
    fn pick(&mut self, replicas: usize) -> usize;
}

/// Uniform random choice over the replica set.
pub struct RandomVictim {
    rng: StdRng,
}

impl RandomVictim {
    pub fn new() -> Self {
        RandomVictim {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        RandomVictim {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomVictim {
    fn default() -> Self {
        Self::new()
    }
}

impl VictimPicker for RandomVictim {
    fn pick(&mut self, replicas: usize) -> usize {
        self.rng.gen_range(0..replicas)
    }
}

pub struct FailureSimulator<I: ?Sized, P> {
    injector: Arc<I>,
    picker: P,
    initial_delay: Duration,
    period: Duration,
    window: Duration,
}

impl<I, P> FailureSimulator<I, P>
where
    I: FailureInjector + ?Sized + 'static,
    P: VictimPicker + 'static,
{
    pub fn new(
        injector: Arc<I>,
        picker: P,
        initial_delay: Duration,
        period: Duration,
        window: Duration,
    ) -> Self {
        FailureSimulator {
            injector,
            picker,
            initial_delay,
            period,
            window,
        }
    }

    /// Takes one replica down. Returns its index, or None for an empty replica set.
    pub fn fire(&mut self) -> Option<usize> {
        let replicas = self.injector.replicas();
        if replicas == 0 {
            return None;
        }
        let victim = self.picker.pick(replicas);
        self.injector.mark_unavailable(victim, self.window);
        metrics::FAILURE_COUNTER.inc();
        info!("replica {} is going down for {:?}", victim, self.window);
        Some(victim)
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.initial_delay, self.period);
            loop {
                ticker.tick().await;
                self.fire();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        marked: Mutex<Vec<(usize, Duration)>>,
    }

    impl FailureInjector for Recorder {
        fn replicas(&self) -> usize {
            5
        }

        fn mark_unavailable(&self, replica: usize, window: Duration) {
            self.marked.lock().unwrap().push((replica, window));
        }
    }

    struct Script(Vec<usize>);

    impl VictimPicker for Script {
        fn pick(&mut self, _replicas: usize) -> usize {
            self.0.remove(0)
        }
    }

    #[test]
    fn window_elapses_lazily() {
        let start = Instant::now();
        let mut availability = Availability::default();
        availability.mark_down(start, Duration::from_secs(100));

        assert!(availability.is_down(start));
        assert!(availability.is_down(start + Duration::from_secs(99)));
        assert!(availability.down_since().is_some());
        assert!(!availability.is_down(start + Duration::from_secs(100)));
        assert!(availability.down_since().is_none());
        assert!(!availability.is_down(start + Duration::from_secs(101)));
    }

    #[test]
    fn random_victim_stays_in_range() {
        let mut picker = RandomVictim::seeded(7);
        for _ in 0..200 {
            assert!(picker.pick(5) < 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn simulator_fires_after_delay_then_periodically() {
        let recorder = Arc::new(Recorder::default());
        let simulator = FailureSimulator::new(
            recorder.clone(),
            Script(vec![3, 1, 4]),
            Duration::from_secs(10),
            Duration::from_secs(100),
            Duration::from_secs(100),
        );
        let handle = simulator.spawn();

        time::sleep(Duration::from_secs(9)).await;
        assert!(recorder.marked.lock().unwrap().is_empty());

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            *recorder.marked.lock().unwrap(),
            vec![(3, Duration::from_secs(100))]
        );

        time::sleep(Duration::from_secs(200)).await;
        let victims: Vec<usize> = recorder
            .marked
            .lock()
            .unwrap()
            .iter()
            .map(|(v, _)| *v)
            .collect();
        assert_eq!(victims, vec![3, 1, 4]);
        handle.abort();
    }
}
