//! Exponentially decaying linear regression of time against sample index.
//!
//! Each observation `(k, t)` pairs a cumulative sample count with the time at
//! which that count was reached. Older observations are down-weighted by
//! `(1 - alpha)` per update, so the fit follows slow clock drift.
//!
//! Sums are kept relative to an integer origin that is periodically moved to
//! the decayed means. `k` grows without bound over a run; recentering keeps
//! the magnitudes entering the second moments small.

const DEGENERATE_EPSILON: f64 = 1e-12;

/// Decaying least-squares fit of `t = f(k)`
#[derive(Debug, Clone)]
pub struct DecayingFitter {
    /// Decay rate per observation
    alpha: f64,
    /// Observations between origin shifts
    recenter_interval: u32,
    /// Observations since the last origin shift
    since_recenter: u32,
    /// Total observations
    observations: u64,
    /// Origin (index)
    index_offset: i64,
    /// Origin (time)
    time_offset: i64,
    k_sum: f64,
    k2_sum: f64,
    t_sum: f64,
    kt_sum: f64,
    /// Decayed observation weight
    n: f64,
}

impl DecayingFitter {
    /// Create an empty fitter.
    pub fn new(alpha: f64, recenter_interval: u32) -> Self {
        debug_assert!(alpha > 0.0 && alpha < 1.0, "alpha must be in (0, 1)");
        Self {
            alpha,
            recenter_interval: recenter_interval.max(1),
            since_recenter: 0,
            observations: 0,
            index_offset: 0,
            time_offset: 0,
            k_sum: 0.0,
            k2_sum: 0.0,
            t_sum: 0.0,
            kt_sum: 0.0,
            n: 0.0,
        }
    }

    /// Add one observation.
    pub fn coord(&mut self, k: i64, t: i64) {
        if self.observations == 0 {
            self.index_offset = k;
            self.time_offset = t;
            self.k_sum = 0.0;
            self.k2_sum = 0.0;
            self.t_sum = 0.0;
            self.kt_sum = 0.0;
            self.n = 1.0;
            self.observations = 1;
            return;
        }

        let x = (k - self.index_offset) as f64;
        let y = (t - self.time_offset) as f64;
        let alpha = self.alpha;

        self.k_sum += x - self.k_sum * alpha;
        self.k2_sum += x * x - self.k2_sum * alpha;
        self.t_sum += y - self.t_sum * alpha;
        self.kt_sum += x * y - self.kt_sum * alpha;
        self.n += 1.0 - self.n * alpha;
        self.observations += 1;

        self.since_recenter += 1;
        if self.since_recenter >= self.recenter_interval {
            self.recenter();
        }
    }

    /// Move the origin to the (rounded) decayed means.
    pub fn recenter(&mut self) {
        self.since_recenter = 0;
        if self.n <= 0.0 {
            return;
        }

        let dk = (self.k_sum / self.n).round();
        let dt = (self.t_sum / self.n).round();
        let n = self.n;

        // Second moments first: they need the old first moments.
        self.k2_sum += -2.0 * dk * self.k_sum + dk * dk * n;
        self.kt_sum += -dk * self.t_sum - dt * self.k_sum + dk * dt * n;
        self.k_sum -= dk * n;
        self.t_sum -= dt * n;

        self.index_offset += dk as i64;
        self.time_offset += dt as i64;
    }

    /// At least two observations with distinct indices.
    pub fn has_fit(&self) -> bool {
        self.observations >= 2 && self.denominator().abs() > DEGENERATE_EPSILON
    }

    fn denominator(&self) -> f64 {
        self.n * self.k2_sum - self.k_sum * self.k_sum
    }

    /// Time per unit index.
    ///
    /// Only meaningful once [`has_fit`](Self::has_fit) holds.
    pub fn slope(&self) -> f64 {
        debug_assert!(self.has_fit(), "slope() requires two distinct observations");
        (self.n * self.kt_sum - self.k_sum * self.t_sum) / self.denominator()
    }

    /// Fitted time at index `k`.
    pub fn time_for(&self, k: i64) -> f64 {
        let k_bar = self.k_sum / self.n;
        let t_bar = self.t_sum / self.n;
        let x = (k - self.index_offset) as f64;
        self.time_offset as f64 + t_bar + self.slope() * (x - k_bar)
    }

    /// Fitted index at time `t`, split into an integer index and a fraction
    /// in `[0, 1)`.
    pub fn sample_for(&self, t: f64) -> (i64, f64) {
        let k_bar = self.k_sum / self.n;
        let t_bar = self.t_sum / self.n;
        let x = k_bar + (t - self.time_offset as f64 - t_bar) / self.slope();
        let whole = x.floor();
        let mut frac = x - whole;
        let mut index = self.index_offset + whole as i64;
        if frac >= 1.0 {
            frac -= 1.0;
            index += 1;
        }
        (index, frac)
    }

    /// Total observations fed so far.
    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Decayed observation weight (saturates toward `1 / alpha`).
    pub fn effective_weight(&self) -> f64 {
        self.n
    }

    /// Current origin `(index, time)`.
    pub fn origin(&self) -> (i64, i64) {
        (self.index_offset, self.time_offset)
    }
}
