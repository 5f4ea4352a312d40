//! Combined input and output vector layout.
//!
//! ```text
//! input:  [bias | random.. | inputs.. | states.. | fetched contents..]
//! output: [outputs.. | next states.. | position.. | size.. | increment..]
//! ```

use serde::Serialize;

use super::ModelConfig;
use crate::stepper::Shape;

/// Element counts and offsets of a model's vectors, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub random_elements: usize,
    pub input_elements: usize,
    pub output_elements: usize,
    pub state_count: usize,
    pub position_elements: usize,
    pub content_elements: usize,

    pub input_count: usize,
    pub output_count: usize,

    pub input_offset: usize,
    pub state_input_offset: usize,
    pub contents_input_offset: usize,

    pub state_output_offset: usize,
    pub position_output_offset: usize,
    pub size_output_offset: usize,
    pub increment_output_offset: usize,
}

impl Layout {
    /// The constant `1.0` every terminal can scale into a bias.
    pub const BIAS_OFFSET: usize = 0;
    pub const RANDOM_OFFSET: usize = 1;

    pub fn new(config: &ModelConfig) -> Self {
        Self::from_counts(
            config.random_elements,
            config.input_elements,
            config.output_elements,
            config.states.len(),
            config.position_elements,
            config.content_elements,
        )
    }

    pub fn from_counts(
        random_elements: usize,
        input_elements: usize,
        output_elements: usize,
        state_count: usize,
        position_elements: usize,
        content_elements: usize,
    ) -> Self {
        let input_offset = Self::RANDOM_OFFSET + random_elements;
        let state_input_offset = input_offset + input_elements;
        let contents_input_offset = state_input_offset + state_count;
        let state_output_offset = output_elements;
        let position_output_offset = state_output_offset + state_count;
        let size_output_offset = position_output_offset + position_elements;
        let increment_output_offset = size_output_offset + position_elements;
        Self {
            random_elements,
            input_elements,
            output_elements,
            state_count,
            position_elements,
            content_elements,
            input_count: contents_input_offset + content_elements,
            output_count: increment_output_offset + content_elements,
            input_offset,
            state_input_offset,
            contents_input_offset,
            state_output_offset,
            position_output_offset,
            size_output_offset,
            increment_output_offset,
        }
    }

    pub fn shape(&self) -> Shape {
        Shape {
            inputs: self.input_count,
            outputs: self.output_count,
        }
    }
}
