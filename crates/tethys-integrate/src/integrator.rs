//! Step orchestration.
//!
//! One `step` call runs the full sequence: virtual-site force
//! redistribution, step-size selection (variable mode), the two update
//! phases with constraint projection between and after them, virtual-site
//! position reconstruction, and bookkeeping. The phase machine makes the
//! ordering explicit and checkable; any error aborts the step and is
//! fatal for the run.

use std::time::Instant;

use tethys_compute::ComputeBackend;
use tethys_constraint::{ConstraintSolver, Projection, ProjectionReport};
use tethys_telemetry::{EventBus, EventKind, StepEvent};
use tethys_types::{ScalarEncoder, TethysResult};
use tethys_vsite::VirtualSiteTable;

use crate::config::{IntegratorConfig, StepMode};
use crate::state::{ParticleState, StepState};
use crate::stepsize::select_step_size;
use crate::verlet;

/// Where the integrator is inside a step. `Idle` between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Idle,
    ForcesReady,
    StepSizeSelected,
    VelocityPredicted,
    DeltaProjected,
    PositionCommitted,
    VelocityProjected,
}

/// The integration core: owns step bookkeeping and the compute backend,
/// borrows everything else per call.
pub struct Integrator {
    config: IntegratorConfig,
    encoder: ScalarEncoder,
    backend: Box<dyn ComputeBackend>,
    step_state: StepState,
    phase: StepPhase,
}

impl Integrator {
    /// Validates the configuration, initializes the backend, and resolves
    /// the precision mode to its encoder.
    pub fn new(config: IntegratorConfig, mut backend: Box<dyn ComputeBackend>) -> TethysResult<Self> {
        config.validate()?;
        backend.init()?;
        let encoder = config.precision.encoder();
        let step_state = StepState::new(config.initial_step_size());
        Ok(Self {
            config,
            encoder,
            backend,
            step_state,
            phase: StepPhase::Idle,
        })
    }

    /// Step bookkeeping (for checkpointing).
    pub fn step_state(&self) -> &StepState {
        &self.step_state
    }

    /// Restores bookkeeping from a checkpoint.
    pub fn restore(&mut self, step_state: StepState) {
        self.step_state = step_state;
        self.phase = StepPhase::Idle;
    }

    /// Current phase; `Idle` between steps. A phase other than `Idle`
    /// after `step` returned an error means the run is unrecoverable.
    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    /// The resolved scalar encoder.
    pub fn encoder(&self) -> &ScalarEncoder {
        &self.encoder
    }

    /// Advances the system by one step. `state.forces` must hold the
    /// forces for the current positions.
    pub fn step(
        &mut self,
        state: &mut ParticleState,
        mut constraints: Option<&mut ConstraintSolver>,
        sites: Option<&VirtualSiteTable>,
        bus: &mut EventBus,
    ) -> TethysResult<()> {
        let wall_start = Instant::now();
        let step = self.step_state.step_index;
        self.phase = StepPhase::ForcesReady;

        // Forces accumulated on virtual sites act through their parents.
        if let Some(table) = sites {
            table.redistribute_forces(&state.positions, &mut state.forces);
        }

        if let StepMode::Variable {
            error_tolerance,
            max_step_size,
            ..
        } = self.config.step_mode
        {
            // The controller clamps against the size currently in effect,
            // which on the first step is the configured initial size.
            let choice = select_step_size(
                self.backend.as_ref(),
                &state.forces,
                &state.inv_masses,
                self.step_state.step_size,
                error_tolerance,
                max_step_size,
            )?;
            self.step_state.step_size = choice.selected;
            bus.emit(StepEvent::new(
                step,
                EventKind::StepSizeSelected {
                    selected: choice.selected,
                    raw_candidate: choice.raw_candidate,
                    limited_by: choice.limited_by,
                },
            ));
        }
        self.phase = StepPhase::StepSizeSelected;

        let dt = self.step_state.step_size;
        bus.emit(StepEvent::new(
            step,
            EventKind::StepBegin {
                step_size: dt,
                sim_time: self.step_state.time,
            },
        ));

        verlet::predict(state, self.step_state.previous_step_size, dt);
        self.phase = StepPhase::VelocityPredicted;

        if let Some(solver) = constraints.as_deref_mut() {
            let report = solver.project(
                Projection::Positions {
                    positions: &state.positions,
                    deltas: &mut state.pos_delta,
                },
                self.config.constraint_tolerance,
            )?;
            emit_projection(bus, step, "positions", &report);
        }
        self.phase = StepPhase::DeltaProjected;

        verlet::commit(state, dt, &self.encoder);
        self.phase = StepPhase::PositionCommitted;

        if let Some(solver) = constraints.as_deref_mut() {
            let report = solver.project(
                Projection::Velocities {
                    positions: &state.positions,
                    velocities: &mut state.velocities,
                },
                self.config.constraint_tolerance,
            )?;
            emit_projection(bus, step, "velocities", &report);
        }
        self.phase = StepPhase::VelocityProjected;

        if let Some(table) = sites {
            table.compute_positions(&mut state.positions);
        }

        self.step_state.time += dt;
        self.step_state.previous_step_size = dt;
        self.step_state.step_index += 1;
        bus.emit(StepEvent::new(
            step,
            EventKind::StepEnd {
                wall_time: wall_start.elapsed().as_secs_f64(),
            },
        ));
        bus.flush();
        self.phase = StepPhase::Idle;
        Ok(())
    }
}

fn emit_projection(bus: &EventBus, step: u64, target: &'static str, report: &ProjectionReport) {
    bus.emit(StepEvent::new(
        step,
        EventKind::ConstraintProjection {
            target,
            iterations: report.iterations,
            max_violation: report.max_violation,
            converged: report.converged,
        },
    ));
}
