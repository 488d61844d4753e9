//! Runs one tick worth of `System::process` calls.
//!
//! A failing System (an `Err` return or a panic) is logged, recorded in the
//! [`TickReport`] and skipped for the rest of the tick; every other System
//! still runs.

use std::panic::{AssertUnwindSafe, catch_unwind};

use engine_component::SystemProcessError;
use tracing::{debug, error};

use crate::commands::{CommandReport, CommandSender};
use crate::context::SystemContext;
use crate::scheduler::Schedule;
use crate::storage::ComponentStorage;
use crate::system::{SystemSlot, SystemState};

/// Summary of one `EntityManager::update` call.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Tick counter after the update.
    pub tick_id: u64,
    /// Systems whose `process` ran (successfully or not).
    pub executed: usize,
    /// Systems that failed this tick.
    pub failures: Vec<SystemProcessError>,
    /// Outcome of draining the command queue at the start of the tick.
    pub commands: CommandReport,
}

impl TickReport {
    /// Returns `true` if every System succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Shared inputs for every System in one tick.
pub(crate) struct TickInputs<'a> {
    pub(crate) storage: &'a ComponentStorage,
    pub(crate) commands: &'a CommandSender,
    pub(crate) tick_id: u64,
    pub(crate) delta: f32,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Run one System with failure isolation.
fn run_one(slot: &mut SystemSlot, inputs: &TickInputs<'_>) -> Result<(), SystemProcessError> {
    let ctx = SystemContext::new(
        &slot.name,
        &slot.descriptors,
        inputs.storage,
        inputs.commands,
        inputs.tick_id,
    );
    let system = &mut slot.system;
    let outcome = catch_unwind(AssertUnwindSafe(|| system.process(&ctx, inputs.delta)));
    slot.state = SystemState::Active;

    let message = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => panic_message(&*payload),
    };
    let failure = SystemProcessError {
        system: slot.name.clone(),
        message,
    };
    error!(
        system = %failure.system,
        tick_id = inputs.tick_id,
        error = %failure.message,
        "system process failed"
    );
    Err(failure)
}

/// Run every System on the calling thread in `schedule.order`.
pub(crate) fn run_sequential(
    slots: &mut [SystemSlot],
    schedule: &Schedule,
    inputs: &TickInputs<'_>,
) -> Vec<SystemProcessError> {
    let mut failures = Vec::new();
    for &idx in &schedule.order {
        if let Err(failure) = run_one(&mut slots[idx], inputs) {
            failures.push(failure);
        }
    }
    failures
}

/// Run `schedule.stages` one after another, spreading each stage over up to
/// `max_workers` scoped threads.
pub(crate) fn run_parallel(
    slots: &mut [SystemSlot],
    schedule: &Schedule,
    inputs: &TickInputs<'_>,
    max_workers: usize,
) -> Vec<SystemProcessError> {
    let mut failures = Vec::new();
    let workers = max_workers.max(1);

    for (stage_idx, stage) in schedule.stages.iter().enumerate() {
        let mut members: Vec<&mut SystemSlot> = slots
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| stage.system_indices.binary_search(i).is_ok())
            .map(|(_, slot)| slot)
            .collect();

        debug!(
            tick_id = inputs.tick_id,
            stage = stage_idx,
            systems = members.len(),
            "executing stage"
        );

        if members.len() <= 1 || workers == 1 {
            for slot in members {
                if let Err(failure) = run_one(slot, inputs) {
                    failures.push(failure);
                }
            }
            continue;
        }

        let mut batches: Vec<Vec<&mut SystemSlot>> = (0..workers.min(members.len()))
            .map(|_| Vec::new())
            .collect();
        let batch_count = batches.len();
        for (i, slot) in members.drain(..).enumerate() {
            batches[i % batch_count].push(slot);
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .into_iter()
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .into_iter()
                            .filter_map(|slot| run_one(slot, inputs).err())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                failures.extend(handle.join().unwrap_or_default());
            }
        });
    }
    failures
}
