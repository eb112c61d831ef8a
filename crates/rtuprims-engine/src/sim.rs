//! Deterministic single-threaded driver: an [`Engine`] on virtual time wired
//! to a [`SimBus`].

use std::time::Duration;

use rtuprims_transport::{SimBus, SimPort, VirtualTimers};
use tracing::{trace, warn};

use crate::config::EngineConfig;
use crate::registry::Engine;

/// Upper bound on steps taken by [`Simulation::run_until_quiet`].
const MAX_STEPS: usize = 100_000;

/// An engine, its virtual clock and a shared simulated bus.
///
/// Every channel reserved on a port from [`Simulation::port`] talks to every
/// other such channel. Bus traffic is always delivered before time moves.
#[derive(Debug)]
pub struct Simulation {
    engine: Engine<VirtualTimers>,
    bus: SimBus,
}

impl Simulation {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(config, VirtualTimers::new()),
            bus: SimBus::new(),
        }
    }

    pub fn engine(&self) -> &Engine<VirtualTimers> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<VirtualTimers> {
        &mut self.engine
    }

    pub fn bus(&self) -> &SimBus {
        &self.bus
    }

    /// Attach a fresh port to the bus.
    pub fn port(&self) -> SimPort {
        self.bus.attach()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.engine.timers().now()
    }

    /// Deliver pending bus traffic, or else jump to the next timer deadline.
    ///
    /// Returns false when there was nothing left to do.
    pub fn step(&mut self) -> bool {
        if self.bus.has_pending() {
            for event in self.bus.drain() {
                self.engine.dispatch(event);
            }
            return true;
        }
        let expired = self.engine.timers_mut().advance_to_next();
        if expired.is_empty() {
            return false;
        }
        trace!(now = ?self.now(), count = expired.len(), "virtual timers expired");
        for handle in expired {
            self.engine.on_timer(handle);
        }
        true
    }

    /// Step until neither traffic nor timers remain. Returns the steps taken.
    pub fn run_until_quiet(&mut self) -> usize {
        let mut steps = 0;
        while steps < MAX_STEPS && self.step() {
            steps += 1;
        }
        if steps == MAX_STEPS {
            warn!(steps, "simulation still active after step limit");
        }
        steps
    }

    /// Run everything due within the next `duration` of virtual time, then
    /// leave the clock at exactly `now + duration`.
    pub fn run_for(&mut self, duration: Duration) {
        let target = self.now() + duration;
        loop {
            if self.bus.has_pending() {
                self.step();
                continue;
            }
            match self.engine.timers().next_deadline() {
                Some(deadline) if deadline <= target => {
                    self.step();
                }
                _ => break,
            }
        }
        let remaining = target.saturating_sub(self.now());
        for handle in self.engine.timers_mut().advance(remaining) {
            self.engine.on_timer(handle);
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelPhase;
    use crate::config::{LineConfig, RoleConfig};

    #[test]
    fn master_becomes_idle_after_one_silence_interval() {
        let mut sim = Simulation::default();
        let port = sim.port();
        let id = sim.engine_mut().reserve(RoleConfig::master(port)).unwrap();
        assert_eq!(sim.engine().phase(id).unwrap(), ChannelPhase::Starting);

        let silence = LineConfig::default().silence();
        sim.run_for(silence - Duration::from_micros(1));
        assert_eq!(sim.engine().phase(id).unwrap(), ChannelPhase::Starting);

        sim.run_for(Duration::from_micros(1));
        assert_eq!(sim.engine().phase(id).unwrap(), ChannelPhase::Idle);
        assert_eq!(sim.now(), silence);
    }

    #[test]
    fn quiet_engine_takes_no_steps() {
        let mut sim = Simulation::default();
        assert!(!sim.step());
        assert_eq!(sim.run_until_quiet(), 0);
    }

    #[test]
    fn run_until_quiet_settles_startup() {
        let mut sim = Simulation::default();
        let port = sim.port();
        let id = sim.engine_mut().reserve(RoleConfig::master(port)).unwrap();
        assert_eq!(sim.run_until_quiet(), 1);
        assert_eq!(sim.engine().phase(id).unwrap(), ChannelPhase::Idle);
        assert_eq!(sim.engine().timers().pending(), 0);
    }
}
