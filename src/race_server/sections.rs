//! Sections - Procedural track segments ahead of the field
//!
//! The generator keeps a bounded window of live sections: new ones are laid
//! at the frontier when the leader gets close to it, old ones are retired
//! once the slowest runner is well past them. Checks run on a fixed interval
//! rather than every tick.

use std::collections::VecDeque;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::race_server::config::SectionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub u32);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// One generated track segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub start_offset: f32,
    /// Which layout to build it from
    pub variant: usize,
    pub active: bool,
}

pub struct SectionGenerator {
    config: SectionConfig,
    rng: StdRng,
    frontier_z: f32,
    active: VecDeque<Section>,
    next_id: u32,
    running: bool,
    since_check: f32,
}

impl SectionGenerator {
    pub fn new(config: SectionConfig, seed: u64) -> Self {
        Self {
            frontier_z: config.initial_offset,
            config,
            rng: StdRng::seed_from_u64(seed),
            active: VecDeque::new(),
            next_id: 0,
            running: false,
            since_check: 0.0,
        }
    }

    pub fn start(&mut self) {
        if !self.running {
            log::debug!("Section generation started at frontier {}", self.frontier_z);
        }
        self.running = true;
        // First poll checks immediately
        self.since_check = self.config.check_interval;
    }

    pub fn stop(&mut self) {
        if self.running {
            log::debug!("Section generation stopped ({} active)", self.active.len());
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frontier_z(&self) -> f32 {
        self.frontier_z
    }

    pub fn active_count(&self) -> u32 {
        self.active.len() as u32
    }

    pub fn max_active(&self) -> u32 {
        self.config.max_active
    }

    pub fn active_sections(&self) -> impl Iterator<Item = &Section> {
        self.active.iter()
    }

    /// Lay one section at the frontier if the leader is close enough and the
    /// live-section budget allows it.
    pub fn tick(&mut self, furthest_z: f32) -> Option<Section> {
        if self.active_count() >= self.config.max_active {
            log::debug!(
                "Max sections reached ({}/{})",
                self.active_count(),
                self.config.max_active
            );
            return None;
        }
        if self.frontier_z - furthest_z > self.config.generation_distance {
            return None;
        }

        let variant = if self.config.variant_count > 1 {
            self.rng.gen_range(0..self.config.variant_count)
        } else {
            0
        };
        let section = Section {
            id: SectionId(self.next_id),
            start_offset: self.frontier_z,
            variant,
            active: true,
        };
        self.next_id += 1;
        self.frontier_z += self.config.section_length;
        self.active.push_back(section.clone());

        log::debug!(
            "Generated section {} at z {} | active {}/{}",
            section.id,
            section.start_offset,
            self.active_count(),
            self.config.max_active
        );
        Some(section)
    }

    /// Interval-gated generation check. Does nothing while stopped. At most
    /// one check runs per call; missed intervals are not replayed.
    pub fn poll(&mut self, delta: f32, furthest_z: f32) -> Option<Section> {
        if !self.running {
            return None;
        }

        self.since_check += delta;
        if self.since_check < self.config.check_interval {
            return None;
        }
        self.since_check = 0.0;
        self.tick(furthest_z)
    }

    /// A section was torn down elsewhere; frees the oldest live slot.
    pub fn on_section_retired(&mut self) -> Option<Section> {
        let mut section = self.active.pop_front()?;
        section.active = false;
        log::debug!(
            "Section {} retired | active {}/{}",
            section.id,
            self.active_count(),
            self.config.max_active
        );
        Some(section)
    }

    /// Retire every section the trailing runner has left far enough behind
    pub fn retire_behind(&mut self, trailing_z: f32) -> Vec<Section> {
        let mut retired = Vec::new();
        while let Some(front) = self.active.front() {
            if front.start_offset - trailing_z >= -self.config.retire_margin {
                break;
            }
            if let Some(section) = self.on_section_retired() {
                retired.push(section);
            }
        }
        retired
    }

    pub fn reset(&mut self) {
        self.frontier_z = self.config.initial_offset;
        self.active.clear();
        self.next_id = 0;
        self.running = false;
        self.since_check = 0.0;
        log::debug!("Section generation reset");
    }
}
