//! Reference models: small simulations that exercise the expression
//! language, state, and memory end to end.

use std::fmt;
use std::str::FromStr;

use crate::error::Result;
use crate::model::{Model, ModelConfig};
use crate::vector::Vector;

/// A named demo model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Demo {
    Adder,
    UnitCircle,
    Ballistic,
    Counter,
    Pushdown,
    Fibonacci,
}

impl Demo {
    pub const ALL: [Demo; 6] = [
        Demo::Adder,
        Demo::UnitCircle,
        Demo::Ballistic,
        Demo::Counter,
        Demo::Pushdown,
        Demo::Fibonacci,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Demo::Adder => "adder",
            Demo::UnitCircle => "unit-circle",
            Demo::Ballistic => "ballistic",
            Demo::Counter => "counter",
            Demo::Pushdown => "pushdown",
            Demo::Fibonacci => "fibonacci",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Demo::Adder => "adds one to its input",
            Demo::UnitCircle => "3 inside the unit circle, 7 outside",
            Demo::Ballistic => "Euler-integrated fall; input is the time step",
            Demo::Counter => "counts consecutive true inputs up to three",
            Demo::Pushdown => "stack in memory; true pushes, false pops; output is validity",
            Demo::Fibonacci => "stored-program machine computing the 7th Fibonacci number",
        }
    }

    /// Whether the demo starts with programmed memory worth saving.
    pub fn programs_memory(self) -> bool {
        matches!(self, Demo::Fibonacci)
    }

    pub fn build(self) -> Result<Model> {
        match self {
            Demo::Adder => adder(),
            Demo::UnitCircle => unit_circle(),
            Demo::Ballistic => ballistic(),
            Demo::Counter => counter(),
            Demo::Pushdown => pushdown(),
            Demo::Fibonacci => fibonacci(),
        }
    }
}

impl fmt::Display for Demo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Demo {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        Demo::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Demo::ALL.iter().map(|d| d.name()).collect();
                format!("unknown demo '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

// ─── Stateless ─────────────────────────────────────────────────────

/// `input + 1`.
pub fn adder() -> Result<Model> {
    Model::build(ModelConfig::new(1, 1), |b| {
        let x = b.input(0)?;
        let y = b.add(x, 1.0);
        b.set_output(0, y)
    })
}

/// 3 when `(x, y)` lies inside the unit circle, else 7.
pub fn unit_circle() -> Result<Model> {
    Model::build(ModelConfig::new(2, 1), |b| {
        let x = b.input(0)?;
        let y = b.input(1)?;
        let xx = b.multiply(x, x);
        let yy = b.multiply(y, y);
        let r = b.add(xx, yy);
        let inside = b.less_than(r, 1.0);
        let out = b.select(inside, 3.0, 7.0);
        b.set_output(0, out)
    })
}

// ─── Stateful ──────────────────────────────────────────────────────

/// One-dimensional trajectory under gravity. States are position and
/// velocity; the input is the step duration; the output is the position
/// before the step.
pub fn ballistic() -> Result<Model> {
    Model::build(ModelConfig::new(1, 1).with_states(vec![0.0, 9.8]), |b| {
        let dt = b.input(0)?;
        let position = b.state(0)?;
        let velocity = b.state(1)?;
        b.set_output(0, position)?;
        let travel = b.multiply(velocity, dt);
        let next_position = b.add(position, travel);
        b.set_state_output(0, next_position)?;
        let fall = b.scale(dt, 9.8);
        let next_velocity = b.subtract(velocity, fall);
        b.set_state_output(1, next_velocity)
    })
}

/// Four-state machine over two state bits counting successive true inputs
/// up to three; outputs the count as of the previous step.
pub fn counter() -> Result<Model> {
    Model::build(ModelConfig::new(1, 1).with_states(vec![0.0, 0.0]), |b| {
        let x = b.input(0)?;
        let hi = b.state(0)?;
        let lo = b.state(1)?;
        let doubled = b.scale(hi, 2.0);
        let count = b.add(doubled, lo);
        b.set_output(0, count)?;

        let either = b.or(hi, lo);
        let next_hi = b.and(x, either);
        b.set_state_output(0, next_hi)?;

        let not_lo = b.not(lo);
        let carry = b.or(hi, not_lo);
        let next_lo = b.and(x, carry);
        b.set_state_output(1, next_lo)
    })
}

/// Stack of ones in memory addressed by a stack pointer state. A true input
/// pushes, a false input pops; the output reports whether the stack was
/// valid after the previous step.
pub fn pushdown() -> Result<Model> {
    Model::build(ModelConfig::new(1, 1).with_states(vec![0.0]), |b| {
        let x = b.input(0)?;
        let sp = b.state(0)?;
        let top = b.fetch(0)?;
        let valid = b.greater_equal(top, 0.0);
        b.set_output(0, valid)?;

        let twice = b.scale(x, 2.0);
        let delta = b.subtract(twice, 1.0);
        let next_sp = b.add(sp, delta);
        b.set_state_output(0, next_sp)?;

        let shifted = b.add(sp, x);
        let slot = b.subtract(shifted, 1.0);
        b.set_position_output(0, slot)?;
        b.set_increment_output(0, delta)
    })
}

// ─── Stored program ────────────────────────────────────────────────

/// Opcodes of the Fibonacci machine.
const NOOP: f32 = 0.0;
const MOVE: f32 = 1.0;
const ADD: f32 = 2.0;
const DJGZ: f32 = 3.0;

/// Registers: previous, current, counter, tmp.
const REGISTERS: usize = 4;

/// Machine executing a stored program that computes the 7th Fibonacci
/// number. States are the program counter and four registers; memory holds
/// one `(opcode, dest, src-or-offset)` instruction per unit cell. The
/// output is the `current` register, which never exceeds the answer.
///
/// ```text
/// 0  move tmp, previous
/// 1  move previous, current
/// 2  add  current, tmp
/// 3  djgz counter, -3
/// ```
pub fn fibonacci() -> Result<Model> {
    let config = ModelConfig::new(1, 1)
        .with_states(vec![-0.5, 0.0, 1.0, 7.0, 0.0])
        .with_memory(1, 3);
    let mut model = Model::build(config, |b| {
        let current = b.state(2)?;
        b.set_output(0, current)?;

        let opcode = b.fetch(0)?;
        let dest = b.fetch(1)?;
        let operand = b.fetch(2)?;

        let pc = b.state(0)?;
        let is_jump = b.greater_than(opcode, 2.5);
        let dest_value = b.state_at(dest, 1, REGISTERS)?;
        let positive = b.greater_than(dest_value, 1.0);
        let taken = b.and(is_jump, positive);
        let offset = b.select(taken, operand, 1.0);
        let next_pc = b.add(pc, offset);
        b.set_state_output(0, next_pc)?;

        for register in 1..=REGISTERS {
            let value = b.state(register)?;
            let source = b.state_at(operand, 1, REGISTERS)?;
            let sum = b.add(value, source);
            let decremented = b.subtract(value, 1.0);
            let result = b.index(&[value, source, sum, decremented], NOOP, DJGZ, opcode)?;
            let targeted = b.is_index(dest, register - 1, REGISTERS);
            let next = b.select(targeted, result, value);
            b.set_state_output(register, next)?;
        }

        b.set_position_output(0, next_pc)
    })?;

    let program = [
        [MOVE, 3.0, 0.0],
        [MOVE, 0.0, 1.0],
        [ADD, 1.0, 3.0],
        [DJGZ, 2.0, -3.0],
    ]
    .map(|instruction| Vector::from_slice(&instruction));
    model.memory_mut().set(&[2.0], &[2.0], 0, &program)?;
    Ok(model)
}
