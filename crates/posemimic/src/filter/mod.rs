//! Data filtering and smoothing.
//!
//! Filters are split into a parameter type implementing [`Filter`] and a separate state value, so
//! that one set of parameters can drive many independent signals (for example, every coordinate
//! of every landmark of a body).

pub mod ema;

use std::marker::PhantomData;

/// A filter for values of type `T`.
pub trait Filter<T> {
    /// Per-signal state carried between calls to [`Filter::filter`].
    type State: Default;

    /// Pushes a new value into the filter, returning the filtered value.
    fn filter(&self, state: &mut Self::State, value: T) -> T;
}

/// Bundles a [`Filter`] with the state of a single signal.
pub struct SimpleFilter<T, F: Filter<T>> {
    filter: F,
    state: F::State,
    _p: PhantomData<fn(T) -> T>,
}

impl<T, F: Filter<T>> SimpleFilter<T, F> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            state: F::State::default(),
            _p: PhantomData,
        }
    }

    pub fn filter(&mut self, value: T) -> T {
        self.filter.filter(&mut self.state, value)
    }

    /// Forgets all previously filtered values.
    pub fn reset(&mut self) {
        self.state = F::State::default();
    }
}
