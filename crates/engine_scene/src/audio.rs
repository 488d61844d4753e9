//! Positional audio sources.
//!
//! [`AudioSystem`] advances playback and computes a distance-attenuated gain
//! per source. Device output belongs to the audio backend, which reads the
//! resulting [`AudioComponent`] state.

use engine_component::{Component, DescriptorSet, Entity};
use engine_system::{System, SystemContext};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::transform::TransformComponent;

/// One audio source attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioComponent {
    /// Audio backend clip handle.
    pub clip_id: u64,
    /// Base volume in `0.0..=1.0`.
    pub volume: f32,
    /// Playback speed multiplier.
    pub pitch: f32,
    /// Restart at the end of the clip.
    pub looping: bool,
    /// Whether playback is running.
    pub playing: bool,
    /// Clip length in seconds.
    pub duration: f32,
    /// Current playback position in seconds.
    pub position: f32,
    /// Gain after distance attenuation, written every tick.
    pub effective_gain: f32,
}

impl Default for AudioComponent {
    fn default() -> Self {
        Self {
            clip_id: 0,
            volume: 1.0,
            pitch: 1.0,
            looping: false,
            playing: false,
            duration: 0.0,
            position: 0.0,
            effective_gain: 0.0,
        }
    }
}

impl Component for AudioComponent {
    fn type_name() -> &'static str {
        "AudioComponent"
    }
}

impl AudioComponent {
    /// Advance playback by `delta` seconds of wall time.
    pub fn advance(&mut self, delta: f32) {
        if !self.playing {
            return;
        }
        self.position += delta * self.pitch;
        if self.duration > 0.0 && self.position >= self.duration {
            if self.looping {
                self.position %= self.duration;
            } else {
                self.position = self.duration;
                self.playing = false;
            }
        }
    }
}

/// Updates every entity carrying an [`AudioComponent`] and a
/// [`TransformComponent`].
#[derive(Debug, Default)]
pub struct AudioSystem {
    listener: Vec3,
    sources: Vec<Entity>,
}

impl AudioSystem {
    /// Create the System with the listener at the origin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the listener.
    pub fn set_listener(&mut self, position: Vec3) {
        self.listener = position;
    }

    /// Entities currently treated as sources.
    #[must_use]
    pub fn sources(&self) -> &[Entity] {
        &self.sources
    }
}

impl System for AudioSystem {
    fn name(&self) -> &str {
        "audio"
    }

    fn descriptors(&self) -> DescriptorSet {
        DescriptorSet::new()
            .write::<AudioComponent>()
            .read::<TransformComponent>()
    }

    fn on_entity_added(&mut self, entity: Entity) {
        self.sources.push(entity);
    }

    fn on_entity_removed(&mut self, entity: Entity) {
        if let Some(pos) = self.sources.iter().position(|e| *e == entity) {
            self.sources.swap_remove(pos);
        }
    }

    fn process(&mut self, ctx: &SystemContext<'_>, delta: f32) -> anyhow::Result<()> {
        let transforms = ctx.read::<TransformComponent>()?;
        let mut audio = ctx.write::<AudioComponent>()?;
        for &entity in &self.sources {
            let (Some(source), Some(transform)) = (audio.get_mut(entity), transforms.get(entity))
            else {
                continue;
            };
            source.advance(delta);
            let distance = transform.position.distance(self.listener);
            source.effective_gain = if source.playing {
                source.volume / (1.0 + distance)
            } else {
                0.0
            };
        }
        Ok(())
    }
}
