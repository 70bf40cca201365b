use palette::Srgb;
use serde::Serialize;
use std::cmp::Ordering;

pub type Rgb = Srgb<u8>;

/// Segments without a direction (a missing endpoint) are drawn in this gray.
pub const NEUTRAL_GRAY: Rgb = Srgb::new(150, 150, 150);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gradient {
    pub start: Rgb,
    pub end: Rgb,
}

/// Increase or flat: light red to deep red.
pub const WARM: Gradient = Gradient {
    start: Srgb::new(255, 200, 200),
    end: Srgb::new(160, 0, 0),
};

/// Decrease: light blue to deep blue.
pub const COOL: Gradient = Gradient {
    start: Srgb::new(200, 220, 255),
    end: Srgb::new(0, 40, 140),
};

impl Gradient {
    /// Channel-wise linear blend, truncated toward zero.
    pub fn at(&self, fraction: f64) -> Rgb {
        let t = fraction.clamp(0.0, 1.0);
        let lerp = |a: u8, b: u8| -> u8 {
            let v = a as f64 + (b as f64 - a as f64) * t;
            v as u8
        };
        Srgb::new(
            lerp(self.start.red, self.end.red),
            lerp(self.start.green, self.end.green),
            lerp(self.start.blue, self.end.blue),
        )
    }
}

pub fn css_rgb(c: Rgb) -> String {
    format!("rgb({},{},{})", c.red, c.green, c.blue)
}

/// Keep digits and the first decimal point, then parse. Cells such as
/// `"85점"` become `85.0`; cells with no digit at all are missing.
pub fn parse_score(raw: &str) -> Option<f64> {
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut seen_point = false;
    let cleaned: String = raw
        .chars()
        .filter(|c| {
            if c.is_ascii_digit() {
                true
            } else if *c == '.' && !seen_point {
                seen_point = true;
                true
            } else {
                false
            }
        })
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    Neutral,
    Change(f64),
}

impl Delta {
    pub fn value(self) -> Option<f64> {
        match self {
            Delta::Neutral => None,
            Delta::Change(v) => Some(v),
        }
    }
}

pub fn delta(prev: Option<f64>, curr: Option<f64>) -> Delta {
    match (prev, curr) {
        (Some(p), Some(c)) => Delta::Change(c - p),
        _ => Delta::Neutral,
    }
}

/// Zero counts as an increase: flat segments get the warm gradient at its
/// lightest.
pub fn color_for_delta(delta: Delta, max_abs_delta: f64) -> Rgb {
    let Delta::Change(d) = delta else {
        return NEUTRAL_GRAY;
    };
    let fraction = if max_abs_delta > 0.0 {
        (d.abs() / max_abs_delta).min(1.0)
    } else {
        0.0
    };
    if d >= 0.0 {
        WARM.at(fraction)
    } else {
        COOL.at(fraction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub median: f64,
}

/// Mean and median over the present values. `None` when nothing is present,
/// in which case no comparison can be drawn.
pub fn summary_stats<I>(values: I) -> Option<SummaryStats>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut present: Vec<f64> = values.into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = present.len();
    let median = if n % 2 == 1 {
        present[n / 2]
    } else {
        (present[n / 2 - 1] + present[n / 2]) / 2.0
    };
    Some(SummaryStats { mean, median })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComparison {
    pub student_score: f64,
    pub mean: f64,
    pub median: f64,
}

pub fn compare<I>(student: Option<f64>, population: I) -> Option<ScoreComparison>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let student_score = student?;
    let stats = summary_stats(population)?;
    Some(ScoreComparison {
        student_score,
        mean: stats.mean,
        median: stats.median,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreSeries {
    pub entries: Vec<ScoreEntry>,
}

impl ScoreSeries {
    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let entries = cells
            .into_iter()
            .map(|(label, raw)| ScoreEntry {
                label: label.to_string(),
                value: parse_score(raw),
            })
            .collect();
        Self { entries }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub label: String,
    pub value: Option<f64>,
    /// Change from the previous point; neutral for the first point.
    pub delta: Delta,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSegment {
    pub from: usize,
    pub to: usize,
    pub delta: Delta,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendModel {
    pub points: Vec<TrendPoint>,
    pub segments: Vec<TrendSegment>,
    pub max_abs_delta: f64,
    pub present_count: usize,
}

impl TrendModel {
    pub fn has_values(&self) -> bool {
        self.present_count > 0
    }
}

pub fn analyze(series: &ScoreSeries) -> TrendModel {
    let entries = &series.entries;
    let deltas: Vec<Delta> = entries
        .windows(2)
        .map(|w| delta(w[0].value, w[1].value))
        .collect();
    let max_abs_delta = deltas
        .iter()
        .filter_map(|d| d.value())
        .map(f64::abs)
        .fold(0.0_f64, f64::max);

    let segments: Vec<TrendSegment> = deltas
        .iter()
        .enumerate()
        .map(|(i, d)| TrendSegment {
            from: i,
            to: i + 1,
            delta: *d,
            color: color_for_delta(*d, max_abs_delta),
        })
        .collect();

    let points = entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let (delta, color) = match i.checked_sub(1).and_then(|j| segments.get(j)) {
                Some(seg) => (seg.delta, seg.color),
                None => (Delta::Neutral, NEUTRAL_GRAY),
            };
            TrendPoint {
                label: e.label.clone(),
                value: e.value,
                delta,
                color,
            }
        })
        .collect();

    TrendModel {
        points,
        segments,
        max_abs_delta,
        present_count: entries.iter().filter(|e| e.value.is_some()).count(),
    }
}
