use chrono::{Datelike, Duration, NaiveDate};

fn round_off_1_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StudyComparison {
    pub diff_hours: f64,
    pub hours: i64,
    pub minutes: i64,
    /// Actual met or exceeded the goal.
    pub over: bool,
}

/// Only meaningful once both a goal and an actual time were entered.
pub fn compare_study(goal_hours: f64, actual_hours: f64) -> Option<StudyComparison> {
    if goal_hours <= 0.0 || actual_hours <= 0.0 {
        return None;
    }
    let diff = actual_hours - goal_hours;
    Some(StudyComparison {
        diff_hours: diff,
        hours: diff.abs().trunc() as i64,
        minutes: ((diff * 60.0).abs() % 60.0).trunc() as i64,
        over: diff >= 0.0,
    })
}

/// Monday through Sunday of the week containing `today`.
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    (start, start + Duration::days(6))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalKind {
    Textbook,
    Workbook,
    Vocabulary,
    Custom,
}

impl GoalKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "textbook" => Some(Self::Textbook),
            "workbook" => Some(Self::Workbook),
            "vocabulary" => Some(Self::Vocabulary),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Textbook => "textbook",
            Self::Workbook => "workbook",
            Self::Vocabulary => "vocabulary",
            Self::Custom => "custom",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Textbook => "Study the textbook",
            Self::Workbook => "Solve workbook problems",
            Self::Vocabulary => "Memorize vocabulary",
            Self::Custom => "Write your own",
        }
    }

    /// Allowed amount range and unit for counted goals.
    pub fn amount_range(self) -> Option<(i64, i64, &'static str)> {
        match self {
            Self::Textbook => Some((1, 1000, "pages")),
            Self::Workbook => Some((1, 500, "problems")),
            Self::Vocabulary => Some((1, 500, "words")),
            Self::Custom => None,
        }
    }

    pub fn detail(self, amount: Option<i64>, custom: Option<&str>) -> Result<String, String> {
        match self.amount_range() {
            Some((min, max, unit)) => {
                let n = amount.ok_or_else(|| format!("{} goal needs an amount", self.as_str()))?;
                if !(min..=max).contains(&n) {
                    return Err(format!("amount must be in {}..={}", min, max));
                }
                let verb = match self {
                    Self::Textbook => "study",
                    Self::Workbook => "solve",
                    _ => "memorize",
                };
                Ok(format!("{} {} {}", verb, n, unit))
            }
            None => {
                let text = custom.map(|s| s.trim()).unwrap_or_default();
                if text.is_empty() {
                    return Err("custom goal needs a detail".to_string());
                }
                Ok(text.to_string())
            }
        }
    }
}

pub fn goals_for(subject: &str, vocabulary_subjects: &[String]) -> Vec<GoalKind> {
    let mut goals = vec![GoalKind::Textbook, GoalKind::Workbook];
    if vocabulary_subjects.iter().any(|s| s == subject) {
        goals.push(GoalKind::Vocabulary);
    }
    goals.push(GoalKind::Custom);
    goals
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoStatus {
    Open,
    Done,
    Failed,
    Postponed,
    Partial,
}

impl TodoStatus {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "" => Some(Self::Open),
            "O" => Some(Self::Done),
            "X" => Some(Self::Failed),
            "→" => Some(Self::Postponed),
            "△" => Some(Self::Partial),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Open => "",
            Self::Done => "O",
            Self::Failed => "X",
            Self::Postponed => "→",
            Self::Partial => "△",
        }
    }

    /// Done is always 100, partial keeps the reported percentage, anything
    /// else counts as 0.
    pub fn progress(self, requested: Option<i64>) -> Result<i64, String> {
        match self {
            Self::Done => Ok(100),
            Self::Partial => {
                let p = requested.ok_or_else(|| "partial status needs progress".to_string())?;
                if !(0..=100).contains(&p) {
                    return Err("progress must be in 0..=100".to_string());
                }
                Ok(p)
            }
            _ => Ok(0),
        }
    }
}

/// Share of the day's total possible progress, as a percentage.
pub fn achievement(progress: &[i64]) -> f64 {
    if progress.is_empty() {
        return 0.0;
    }
    let done: i64 = progress.iter().sum();
    let total = 100 * progress.len() as i64;
    round_off_1_decimal(done as f64 / total as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn study_comparison_reports_hours_and_minutes() {
        let over = compare_study(2.0, 3.5).expect("both set");
        assert!(over.over);
        assert_eq!((over.hours, over.minutes), (1, 30));

        let under = compare_study(4.0, 2.5).expect("both set");
        assert!(!under.over);
        assert_eq!((under.hours, under.minutes), (1, 30));

        let equal = compare_study(2.0, 2.0).expect("both set");
        assert!(equal.over);
        assert_eq!((equal.hours, equal.minutes), (0, 0));

        assert_eq!(compare_study(0.0, 2.0), None);
    }

    #[test]
    fn week_starts_on_monday() {
        // 2026-10-18 is a Sunday.
        assert_eq!(
            week_bounds(date("2026-10-18")),
            (date("2026-10-12"), date("2026-10-18"))
        );
        assert_eq!(
            week_bounds(date("2026-10-12")),
            (date("2026-10-12"), date("2026-10-18"))
        );
    }

    #[test]
    fn goal_details_validate_amounts() {
        assert_eq!(
            GoalKind::Textbook.detail(Some(12), None).as_deref(),
            Ok("study 12 pages")
        );
        assert_eq!(
            GoalKind::Vocabulary.detail(Some(30), None).as_deref(),
            Ok("memorize 30 words")
        );
        assert!(GoalKind::Workbook.detail(Some(0), None).is_err());
        assert!(GoalKind::Workbook.detail(None, None).is_err());
        assert_eq!(
            GoalKind::Custom.detail(None, Some(" review notes ")).as_deref(),
            Ok("review notes")
        );
        assert!(GoalKind::Custom.detail(None, Some("  ")).is_err());
    }

    #[test]
    fn vocabulary_goal_only_for_listed_subjects() {
        let vocab = vec!["English".to_string()];
        assert!(goals_for("English", &vocab).contains(&GoalKind::Vocabulary));
        assert_eq!(
            goals_for("Math", &vocab),
            vec![GoalKind::Textbook, GoalKind::Workbook, GoalKind::Custom]
        );
    }

    #[test]
    fn status_progress_rules() {
        assert_eq!(TodoStatus::Done.progress(Some(10)), Ok(100));
        assert_eq!(TodoStatus::Partial.progress(Some(40)), Ok(40));
        assert!(TodoStatus::Partial.progress(Some(140)).is_err());
        assert_eq!(TodoStatus::Postponed.progress(Some(50)), Ok(0));
        assert_eq!(TodoStatus::parse("→"), Some(TodoStatus::Postponed));
        assert_eq!(TodoStatus::parse("?"), None);
    }

    #[test]
    fn achievement_rounds_to_one_decimal() {
        assert_eq!(achievement(&[]), 0.0);
        assert_eq!(achievement(&[100, 0, 0]), 33.3);
        assert_eq!(achievement(&[100, 50]), 75.0);
    }
}
