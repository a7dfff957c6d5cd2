//! P² streaming quantile estimator (spec §4.10), ported from the constant-
//! memory marker algorithm in `stream_aggregator.h`'s `quantile_estimator`.

/// Estimates a single quantile `p` from a stream in O(1) space using five
/// markers, without retaining the observed values.
#[derive(Debug, Clone)]
pub struct P2Estimator {
    p: f64,
    /// Marker heights.
    q: [f64; 5],
    /// Desired marker positions (fractional, accumulated each step).
    desired: [f64; 5],
    /// Increment to `desired` per observation.
    increment: [f64; 5],
    /// Actual integer marker positions.
    n: [i64; 5],
    initial: Vec<f64>,
    initialized: bool,
}

impl P2Estimator {
    pub fn new(p: f64) -> Self {
        Self {
            p,
            q: [0.0; 5],
            desired: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
            increment: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
            n: [0; 5],
            initial: Vec::with_capacity(5),
            initialized: false,
        }
    }

    pub fn quantile(self: &P2Estimator) -> f64 {
        self.p
    }

    fn parabolic(&self, i: usize, d: i64) -> f64 {
        let (qm1, qi, qp1) = (self.q[i - 1], self.q[i], self.q[i + 1]);
        let (nm1, ni, np1) = (self.n[i - 1] as f64, self.n[i] as f64, self.n[i + 1] as f64);
        let d = d as f64;
        qi + d / (np1 - nm1)
            * ((ni - nm1 + d) * (qp1 - qi) / (np1 - ni) + (np1 - ni - d) * (qi - qm1) / (ni - nm1))
    }

    fn linear(&self, i: usize, d: i64) -> f64 {
        let j = (i as i64 + d) as usize;
        self.q[i] + d as f64 * (self.q[j] - self.q[i]) / (self.n[j] - self.n[i]) as f64
    }

    /// Feed one observation into the estimator.
    pub fn add(&mut self, x: f64) {
        if !self.initialized {
            self.initial.push(x);
            if self.initial.len() == 5 {
                self.initial.sort_by(|a, b| a.partial_cmp(b).unwrap());
                for i in 0..5 {
                    self.q[i] = self.initial[i];
                    self.n[i] = i as i64;
                }
                self.initialized = true;
            }
            return;
        }

        let k = if x < self.q[0] {
            self.q[0] = x;
            0
        } else if x >= self.q[4] {
            self.q[4] = x;
            3
        } else {
            let mut found = 3;
            for i in 1..5 {
                if x < self.q[i] {
                    found = i - 1;
                    break;
                }
            }
            found
        };

        for i in (k + 1)..5 {
            self.n[i] += 1;
        }
        for i in 0..5 {
            self.desired[i] += self.increment[i];
        }

        for i in 1..4 {
            let d = self.desired[i] - self.n[i] as f64;
            if (d >= 1.0 && self.n[i + 1] - self.n[i] > 1) || (d <= -1.0 && self.n[i - 1] - self.n[i] < -1) {
                let di: i64 = if d >= 0.0 { 1 } else { -1 };
                let candidate = self.parabolic(i, di);
                self.q[i] = if self.q[i - 1] < candidate && candidate < self.q[i + 1] {
                    candidate
                } else {
                    self.linear(i, di)
                };
                self.n[i] += di;
            }
        }
    }

    /// Current best estimate of the `p`-quantile. `0.0` before the first
    /// five observations have arrived.
    pub fn estimate(&self) -> f64 {
        if self.initialized {
            self.q[2]
        } else if !self.initial.is_empty() {
            let mut sorted = self.initial.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let idx = ((sorted.len() - 1) as f64 * self.p).round() as usize;
            sorted[idx]
        } else {
            0.0
        }
    }
}
