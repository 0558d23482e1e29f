/// Fractional residual improvement below which a sweep counts as stalled.
pub(crate) const STALL_THRESHOLD: f64 = 0.01;
/// Spectrum step size under which the run is considered converged.
pub(crate) const MIN_ALPHA: f64 = 1e-4;

/// Residual of the previous sweep and the current step sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceState {
    pub previous_error: Option<f64>,
    pub alpha: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ConvergenceDecision {
    Continue,
    /// Step sizes were halved.
    Stalled,
    Converged,
    /// The residual is not finite.
    Diverged,
}

/// Adaptive step-size control, updated once per global iteration.
#[derive(Debug, Clone)]
pub(crate) struct ConvergenceController {
    state: ConvergenceState,
}

impl ConvergenceController {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            state: ConvergenceState {
                previous_error: None,
                alpha,
                beta,
            },
        }
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    pub fn alpha(&self) -> f64 {
        self.state.alpha
    }

    pub fn beta(&self) -> f64 {
        self.state.beta
    }

    /// Record the residual of sweep `iteration` (zero-based).
    pub fn observe(&mut self, iteration: usize, error: f64) -> ConvergenceDecision {
        if !error.is_finite() {
            return ConvergenceDecision::Diverged;
        }
        let mut decision = ConvergenceDecision::Continue;
        if let (true, Some(previous)) = (iteration > 0, self.state.previous_error) {
            // NaN from a 0/0 ratio compares false and leaves the steps alone.
            let improvement = (previous - error) / previous;
            if improvement < STALL_THRESHOLD {
                self.state.alpha *= 0.5;
                self.state.beta *= 0.5;
                decision = if self.state.alpha < MIN_ALPHA {
                    ConvergenceDecision::Converged
                } else {
                    ConvergenceDecision::Stalled
                };
            }
        }
        self.state.previous_error = Some(error);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_iteration_never_stalls() {
        let mut c = ConvergenceController::new(1.0, 0.1);
        assert_eq!(c.observe(0, 10.0), ConvergenceDecision::Continue);
        assert_eq!(c.alpha(), 1.0);
        assert_eq!(c.state().previous_error, Some(10.0));
    }

    #[test]
    fn stall_halves_both_steps_exactly() {
        let mut c = ConvergenceController::new(1.0, 0.1);
        c.observe(0, 10.0);
        assert_eq!(c.observe(1, 9.0), ConvergenceDecision::Continue);
        assert_eq!(c.observe(2, 8.95), ConvergenceDecision::Stalled);
        assert_eq!(c.alpha(), 0.5);
        assert_eq!(c.beta(), 0.05);
        assert_eq!(c.observe(3, 9.5), ConvergenceDecision::Stalled);
        assert_eq!(c.alpha(), 0.25);
    }

    #[test]
    fn tiny_alpha_converges_on_first_stall() {
        let mut c = ConvergenceController::new(1.5e-4, 0.1);
        c.observe(0, 1.0);
        assert_eq!(c.observe(1, 1.0), ConvergenceDecision::Converged);
        assert!(c.alpha() < MIN_ALPHA);
    }

    #[test]
    fn zero_residual_does_not_halve() {
        let mut c = ConvergenceController::new(1.0, 0.1);
        c.observe(0, 0.0);
        assert_eq!(c.observe(1, 0.0), ConvergenceDecision::Continue);
        assert_eq!(c.alpha(), 1.0);
    }

    #[test]
    fn non_finite_residual_diverges() {
        let mut c = ConvergenceController::new(1.0, 0.1);
        assert_eq!(c.observe(0, f64::NAN), ConvergenceDecision::Diverged);
        assert_eq!(c.observe(0, f64::INFINITY), ConvergenceDecision::Diverged);
    }
}
