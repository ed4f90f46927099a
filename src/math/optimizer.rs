// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Guiding trait to implement iterative optimization algorithms.

/// Enum used to indicate if iterations should continue or stop.
/// Must be returned by the stop_criterion function.
pub enum Continue {
    /// Stop iterations.
    Stop,
    /// Continue iterations.
    Forward,
}

/// A `State<Observations, EvalState, Model, Error>` is capable of
/// iteratively minimizing an energy function, provided the functions
/// evaluated during iterations. It is merely a skeleton for iterative
/// optimizers, flexible enough for our needs.
///
/// Generic types:
///
/// * `Observations`: the data used as reference during energy evaluations.
/// * `EvalState`: the result of a model evaluation.
///   It typically allows short-circuiting the computation of a full new
///   state when we already know that we are going to backtrack
///   (for example if the new energy is higher than the previous one).
/// * `Model`: the model of what is being optimized.
/// * `Error`: the type of step computation failures.
pub trait State<Observations, EvalState, Model, Error>
where
    Self: std::marker::Sized,
{
    /// Initialize the optimizer state.
    fn init(obs: &Observations, model: Model) -> Self;

    /// Compute the iteration step from the current optimizer state.
    fn step(&self) -> Result<Model, Error>;

    /// Evaluate the model.
    fn eval(&self, obs: &Observations, new_model: Model) -> EvalState;

    /// Decide if iterations should continue.
    /// Also returns the state used for the next iteration (or returned if we stop).
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue);

    /// Iteratively solve the optimization problem.
    /// Returns the final state and the number of iterations.
    ///
    /// A step failure before any successful iteration aborts with the error.
    /// A step failure afterwards (e.g. the system became singular once the
    /// residuals collapsed) simply stops iterations with the last good state.
    fn iterative_solve(obs: &Observations, initial_model: Model) -> Result<(Self, usize), Error> {
        let mut state = Self::init(obs, initial_model);
        let mut nb_iter = 0;
        loop {
            let new_model = match state.step() {
                Ok(model) => model,
                Err(error) if nb_iter == 0 => return Err(error),
                Err(_) => return Ok((state, nb_iter)),
            };
            nb_iter += 1;
            let eval_state = state.eval(obs, new_model);
            let (kept_state, continuation) = state.stop_criterion(nb_iter, eval_state);
            state = kept_state;
            if let Continue::Stop = continuation {
                return Ok((state, nb_iter));
            }
        }
    }
}
