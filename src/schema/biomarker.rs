use serde::{Deserialize, Serialize};

/// Number of tracked metrics.
pub const METRIC_COUNT: usize = 10;

/// A tracked physiological metric.
///
/// The set is closed: interventions, travel penalties and noise all refer to
/// metrics by key, and an unknown key is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    SystolicBp,
    DiastolicBp,
    ApoB,
    LdlC,
    HsCrp,
    HbA1c,
    Bmi,
    HrvMs,
    RhrBpm,
    SleepHours,
}

impl Metric {
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::SystolicBp,
        Metric::DiastolicBp,
        Metric::ApoB,
        Metric::LdlC,
        Metric::HsCrp,
        Metric::HbA1c,
        Metric::Bmi,
        Metric::HrvMs,
        Metric::RhrBpm,
        Metric::SleepHours,
    ];

    /// Config key for this metric (e.g., "systolic_bp").
    pub fn key(&self) -> &'static str {
        match self {
            Self::SystolicBp => "systolic_bp",
            Self::DiastolicBp => "diastolic_bp",
            Self::ApoB => "apob",
            Self::LdlC => "ldl_c",
            Self::HsCrp => "hs_crp",
            Self::HbA1c => "hba1c",
            Self::Bmi => "bmi",
            Self::HrvMs => "hrv_ms",
            Self::RhrBpm => "rhr_bpm",
            Self::SleepHours => "sleep_hours",
        }
    }

    /// Parse a config key. Returns `None` for anything not in [`Metric::ALL`].
    pub fn from_key(key: &str) -> Option<Metric> {
        Self::ALL.iter().copied().find(|m| m.key() == key)
    }

    /// Short label used in composed text ("ApoB", "HRV").
    pub fn label(&self) -> &'static str {
        match self {
            Self::SystolicBp => "SBP",
            Self::DiastolicBp => "DBP",
            Self::ApoB => "ApoB",
            Self::LdlC => "LDL-C",
            Self::HsCrp => "hsCRP",
            Self::HbA1c => "HbA1c",
            Self::Bmi => "BMI",
            Self::HrvMs => "HRV",
            Self::RhrBpm => "RHR",
            Self::SleepHours => "sleep",
        }
    }

    /// Hard clamp range.
    pub fn range(&self) -> MetricRange {
        let (min, max) = match self {
            Self::SystolicBp => (95.0, 170.0),
            Self::DiastolicBp => (55.0, 110.0),
            Self::ApoB => (50.0, 200.0),
            Self::LdlC => (40.0, 250.0),
            Self::HsCrp => (0.2, 10.0),
            Self::HbA1c => (4.8, 7.0),
            Self::Bmi => (18.0, 35.0),
            Self::HrvMs => (20.0, 120.0),
            Self::RhrBpm => (45.0, 90.0),
            Self::SleepHours => (4.0, 9.0),
        };
        MetricRange { min, max }
    }

    /// Baseline reading at simulation start.
    pub fn baseline(&self) -> f64 {
        match self {
            Self::SystolicBp => 134.0,
            Self::DiastolicBp => 86.0,
            Self::ApoB => 105.0,
            Self::LdlC => 140.0,
            Self::HsCrp => 2.2,
            Self::HbA1c => 5.7,
            Self::Bmi => 26.0,
            Self::HrvMs => 40.0,
            Self::RhrBpm => 66.0,
            Self::SleepHours => 6.25,
        }
    }

    /// Decimal places used when a reading is rendered as a fact.
    pub fn precision(&self) -> usize {
        match self {
            Self::HsCrp | Self::HbA1c | Self::SleepHours => 2,
            _ => 1,
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// Inclusive physiological bounds for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Current physiological readings.
///
/// Every mutation goes through [`BiomarkerState::apply_delta`] or
/// [`BiomarkerState::set`], both of which re-clamp, so the state is always
/// within [`Metric::range`] for every metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerState {
    values: [f64; METRIC_COUNT],
}

impl Default for BiomarkerState {
    fn default() -> Self {
        let mut values = [0.0; METRIC_COUNT];
        for metric in Metric::ALL {
            values[metric.index()] = metric.baseline();
        }
        Self { values }
    }
}

impl BiomarkerState {
    /// Build a state from a baseline profile. Missing metrics use
    /// [`Metric::baseline`]; out-of-range values are clamped.
    pub fn from_profile<I>(profile: I) -> Self
    where
        I: IntoIterator<Item = (Metric, f64)>,
    {
        let mut state = Self::default();
        for (metric, value) in profile {
            state.set(metric, value);
        }
        state
    }

    pub fn get(&self, metric: Metric) -> f64 {
        self.values[metric.index()]
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values[metric.index()] = metric.range().clamp(value);
    }

    /// Add `delta` to a metric and clamp. Returns the change actually applied
    /// after clamping.
    pub fn apply_delta(&mut self, metric: Metric, delta: f64) -> f64 {
        let before = self.get(metric);
        self.set(metric, before + delta);
        self.get(metric) - before
    }

    /// True when every metric is inside its range.
    pub fn within_bounds(&self) -> bool {
        Metric::ALL
            .iter()
            .all(|m| m.range().contains(self.get(*m)))
    }

    /// Rounded reading for use in text.
    pub fn display(&self, metric: Metric) -> String {
        format!("{:.*}", metric.precision(), self.get(metric))
    }

    /// Blood pressure as "134/86".
    pub fn blood_pressure(&self) -> String {
        format!(
            "{:.0}/{:.0}",
            self.get(Metric::SystolicBp),
            self.get(Metric::DiastolicBp)
        )
    }
}
