/// Bisects the input of a monotonic function until its output is close enough to a target.
///
/// The caller drives the search: it evaluates the function at [`DoubleBinarySearch::input`]
/// and reports the result with [`DoubleBinarySearch::feedback`].
#[derive(Clone, Debug)]
pub struct DoubleBinarySearch {
    low_bound: f64,
    high_bound: f64,
    target: f64,
    error_margin: f64,
    decreasing: bool,
    input: f64,
    result: Option<f64>,
    raised_low_bound: bool,
    lowered_high_bound: bool,
}

impl DoubleBinarySearch {
    /// `decreasing` tells whether the function output decreases when its input increases.
    pub fn new(low_bound: f64, high_bound: f64, target: f64, error_margin: f64, decreasing: bool) -> Self {
        Self {
            low_bound,
            high_bound,
            target,
            error_margin,
            decreasing,
            input: (low_bound + high_bound) / 2.0,
            result: None,
            raised_low_bound: false,
            lowered_high_bound: false,
        }
    }

    /// The next input to evaluate.
    pub fn input(&self) -> f64 {
        self.input
    }

    pub fn complete(&self) -> bool {
        self.result.is_some()
    }

    /// The input whose output was within the margin, once the search is complete.
    pub fn result(&self) -> Option<f64> {
        self.result
    }

    pub fn has_raised_low_bound(&self) -> bool {
        self.raised_low_bound
    }

    pub fn has_lowered_high_bound(&self) -> bool {
        self.lowered_high_bound
    }

    pub fn low_bound(&self) -> f64 {
        self.low_bound
    }

    pub fn high_bound(&self) -> f64 {
        self.high_bound
    }

    /// Reports the output of the function for the current input.
    pub fn feedback(&mut self, output: f64) {
        if self.complete() {
            return;
        }
        if (output - self.target).abs() <= self.error_margin {
            self.result = Some(self.input);
            return;
        }
        if (output < self.target) == self.decreasing {
            self.high_bound = self.input;
            self.lowered_high_bound = true;
        } else {
            self.low_bound = self.input;
            self.raised_low_bound = true;
        }
        self.input = (self.low_bound + self.high_bound) / 2.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run<F: Fn(f64) -> f64>(search: &mut DoubleBinarySearch, f: F, max_iterations: usize) -> usize {
        let mut iterations = 0;
        while !search.complete() && iterations < max_iterations {
            let output = f(search.input());
            search.feedback(output);
            iterations += 1;
        }
        iterations
    }

    #[test]
    fn test_increasing_function() {
        let mut search = DoubleBinarySearch::new(0.0, 100.0, 42.0, 0.01, false);
        run(&mut search, |x| x, 100);
        assert!(search.complete());
        assert!((search.result().unwrap() - 42.0).abs() <= 0.01);
        assert!(search.has_raised_low_bound());
        assert!(search.has_lowered_high_bound());
    }

    #[test]
    fn test_decreasing_function() {
        let mut search = DoubleBinarySearch::new(1.0, 50.0, 10.0, 1e-3, true);
        run(&mut search, |v| 100.0 / v, 100);
        assert!(search.complete());
        assert!((100.0 / search.result().unwrap() - 10.0).abs() <= 1e-3);
    }

    #[test]
    fn test_target_above_bracket_never_completes() {
        // the output never gets below the target: the high bound is never lowered
        let mut search = DoubleBinarySearch::new(0.0, 10.0, -5.0, 0.1, false);
        run(&mut search, |x| x, 200);
        assert!(!search.complete());
        assert!(!search.has_raised_low_bound());
        assert!(search.has_lowered_high_bound());

        let mut search = DoubleBinarySearch::new(0.0, 10.0, 50.0, 0.1, false);
        run(&mut search, |x| x, 200);
        assert!(!search.complete());
        assert!(search.has_raised_low_bound());
        assert!(!search.has_lowered_high_bound());
    }

    proptest! {
        #[test]
        fn converges_on_monotonic_functions(
            low in -1000.0f64..1000.0,
            width in 1.0f64..1000.0,
            ratio in 0.0f64..1.0,
            slope in 0.1f64..1.0,
            decreasing in any::<bool>(),
            margin in 1e-3f64..1.0,
        ) {
            let high = low + width;
            let root = low + ratio * width;
            let sign = if decreasing { -1.0 } else { 1.0 };
            let f = |x: f64| sign * slope * (x - root);
            let target = 0.0;
            let mut search = DoubleBinarySearch::new(low, high, target, margin, decreasing);
            let max_iterations = ((high - low) / margin).log2().ceil().max(0.0) as usize + 2;
            run(&mut search, f, max_iterations);
            prop_assert!(search.complete());
            let result = search.result().unwrap();
            prop_assert!((f(result) - target).abs() <= margin);
        }

        #[test]
        fn never_completes_outside_of_the_bracket(
            width in 1.0f64..100.0,
            offset in 2.0f64..100.0,
            margin in 1e-3f64..1.0,
        ) {
            let target = width + offset;
            let mut search = DoubleBinarySearch::new(0.0, width, target, margin, false);
            run(&mut search, |x| x, 64);
            prop_assert!(!search.complete());
            prop_assert!(!search.has_lowered_high_bound());
        }
    }
}
