use crate::dataset::ColumnSpec;
use crate::db;
use crate::matcher::PartialPolicy;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Sheets,
    Lookup,
    Charts,
    Planner,
}

pub const ALL_SECTIONS: [SetupSection; 4] = [
    SetupSection::Sheets,
    SetupSection::Lookup,
    SetupSection::Charts,
    SetupSection::Planner,
];

impl SetupSection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sheets" => Some(Self::Sheets),
            "lookup" => Some(Self::Lookup),
            "charts" => Some(Self::Charts),
            "planner" => Some(Self::Planner),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sheets => "sheets",
            Self::Lookup => "lookup",
            Self::Charts => "charts",
            Self::Planner => "planner",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Sheets => "setup.sheets",
            Self::Lookup => "setup.lookup",
            Self::Charts => "setup.charts",
            Self::Planner => "setup.planner",
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Sheets => json!({
            "feedbackSummaryColumn": "summary",
            "feedbackScoreColumn": "score",
            "feedbackTextColumn": "feedback",
            "feedbackIdColumn": "id",
            "feedbackNameColumn": "name",
            "scoreIdColumn": "number",
            "scoreNameColumn": "name",
            "scoreClassColumn": null,
            "scoreValueColumns": null,
            "cacheTtlSeconds": 300
        }),
        SetupSection::Lookup => json!({
            "maxCandidates": 20,
            "partialMatch": "union"
        }),
        SetupSection::Charts => json!({
            "theme": "light",
            "scoreAxisMax": 100
        }),
        SetupSection::Planner => json!({
            "subjects": ["Korean", "Math", "English", "Social Studies", "Science"],
            "vocabularySubjects": ["English"],
            "maxStudyHours": 24
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_column_name(v: &Value, key: &str) -> Result<String, String> {
    let s = parse_string_max(v, key, 64)?;
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    Ok(s)
}

fn parse_string_list(v: &Value, key: &str, max_items: usize) -> Result<Vec<String>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if arr.len() > max_items {
        return Err(format!("{} must have at most {} items", key, max_items));
    }
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let s = parse_column_name(item, key)?;
        if out.contains(&s) {
            return Err(format!("{} contains duplicate '{}'", key, s));
        }
        out.push(s);
    }
    Ok(out)
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Sheets => match k.as_str() {
                "feedbackSummaryColumn" | "feedbackScoreColumn" | "feedbackTextColumn"
                | "feedbackIdColumn" | "feedbackNameColumn" | "scoreIdColumn"
                | "scoreNameColumn" => {
                    obj.insert(k.clone(), Value::String(parse_column_name(v, k)?));
                }
                "scoreClassColumn" => {
                    if v.is_null() {
                        obj.insert(k.clone(), Value::Null);
                    } else {
                        obj.insert(k.clone(), Value::String(parse_column_name(v, k)?));
                    }
                }
                "scoreValueColumns" => {
                    if v.is_null() {
                        obj.insert(k.clone(), Value::Null);
                    } else {
                        let cols = parse_string_list(v, k, 50)?;
                        if cols.is_empty() {
                            return Err("scoreValueColumns must be null or non-empty".into());
                        }
                        obj.insert(k.clone(), json!(cols));
                    }
                }
                "cacheTtlSeconds" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 3600)?));
                }
                _ => return Err(format!("unknown sheets field: {}", k)),
            },
            SetupSection::Lookup => match k.as_str() {
                "maxCandidates" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 200)?));
                }
                "partialMatch" => {
                    let s = parse_string_max(v, k, 16)?;
                    let Some(policy) = PartialPolicy::parse(&s) else {
                        return Err("partialMatch must be one of: union, idFirst".into());
                    };
                    obj.insert(k.clone(), Value::String(policy.as_str().to_string()));
                }
                _ => return Err(format!("unknown lookup field: {}", k)),
            },
            SetupSection::Charts => match k.as_str() {
                "theme" => {
                    let s = parse_string_max(v, k, 8)?.to_ascii_lowercase();
                    if s != "light" && s != "dark" {
                        return Err("theme must be one of: light, dark".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "scoreAxisMax" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 1000)?));
                }
                _ => return Err(format!("unknown charts field: {}", k)),
            },
            SetupSection::Planner => match k.as_str() {
                "subjects" => {
                    let subjects = parse_string_list(v, k, 20)?;
                    if subjects.is_empty() {
                        return Err("subjects must not be empty".into());
                    }
                    obj.insert(k.clone(), json!(subjects));
                }
                "vocabularySubjects" => {
                    obj.insert(k.clone(), json!(parse_string_list(v, k, 20)?));
                }
                "maxStudyHours" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 24)?));
                }
                _ => return Err(format!("unknown planner field: {}", k)),
            },
        }
    }
    Ok(())
}

/// Defaults overlaid with whatever the workspace saved. Without a workspace
/// the defaults stand alone.
pub fn load_section(conn: Option<&Connection>, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    let Some(conn) = conn else {
        return Ok(current);
    };
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                log::warn!("ignoring saved {} settings: {}", section.name(), e);
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string()
}

fn list_field(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(|a| a.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetSettings {
    pub feedback_summary: String,
    pub feedback_score: String,
    pub feedback_text: String,
    pub feedback_id: String,
    pub feedback_name: String,
    pub score_id: String,
    pub score_name: String,
    /// Kept out of the score columns when those are inferred.
    pub score_class: Option<String>,
    pub score_values: Option<Vec<String>>,
    pub cache_ttl: Duration,
}

impl SheetSettings {
    pub fn load(conn: Option<&Connection>) -> anyhow::Result<Self> {
        let v = load_section(conn, SetupSection::Sheets)?;
        let score_values = v
            .get("scoreValueColumns")
            .filter(|c| !c.is_null())
            .map(|_| list_field(&v, "scoreValueColumns"));
        Ok(Self {
            feedback_summary: str_field(&v, "feedbackSummaryColumn"),
            feedback_score: str_field(&v, "feedbackScoreColumn"),
            feedback_text: str_field(&v, "feedbackTextColumn"),
            feedback_id: str_field(&v, "feedbackIdColumn"),
            feedback_name: str_field(&v, "feedbackNameColumn"),
            score_id: str_field(&v, "scoreIdColumn"),
            score_name: str_field(&v, "scoreNameColumn"),
            score_class: v
                .get("scoreClassColumn")
                .and_then(|c| c.as_str())
                .map(|c| c.to_string()),
            score_values,
            cache_ttl: Duration::from_secs(
                v.get("cacheTtlSeconds").and_then(|n| n.as_u64()).unwrap_or(300),
            ),
        })
    }

    pub fn feedback_spec(&self) -> ColumnSpec {
        ColumnSpec {
            id: self.feedback_id.clone(),
            name: self.feedback_name.clone(),
            class_group: None,
            required: vec![
                self.feedback_summary.clone(),
                self.feedback_score.clone(),
                self.feedback_text.clone(),
            ],
        }
    }

    pub fn score_spec(&self) -> ColumnSpec {
        ColumnSpec {
            id: self.score_id.clone(),
            name: self.score_name.clone(),
            class_group: self.score_class.clone(),
            required: self.score_values.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupSettings {
    pub max_candidates: usize,
    pub partial: PartialPolicy,
}

impl LookupSettings {
    pub fn load(conn: Option<&Connection>) -> anyhow::Result<Self> {
        let v = load_section(conn, SetupSection::Lookup)?;
        Ok(Self {
            max_candidates: v
                .get("maxCandidates")
                .and_then(|n| n.as_u64())
                .unwrap_or(20) as usize,
            partial: PartialPolicy::parse(&str_field(&v, "partialMatch")).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSettings {
    pub dark: bool,
    pub score_axis_max: f64,
}

impl ChartSettings {
    pub fn load(conn: Option<&Connection>) -> anyhow::Result<Self> {
        let v = load_section(conn, SetupSection::Charts)?;
        Ok(Self {
            dark: str_field(&v, "theme") == "dark",
            score_axis_max: v.get("scoreAxisMax").and_then(|n| n.as_f64()).unwrap_or(100.0),
        })
    }

    /// Single bar color for the my-score / mean / median comparison.
    pub fn bar_color(&self) -> &'static str {
        if self.dark {
            "#7FDBFF"
        } else {
            "#1f77b4"
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub subjects: Vec<String>,
    pub vocabulary_subjects: Vec<String>,
    pub max_study_hours: f64,
}

impl PlannerSettings {
    pub fn load(conn: Option<&Connection>) -> anyhow::Result<Self> {
        let v = load_section(conn, SetupSection::Planner)?;
        Ok(Self {
            subjects: list_field(&v, "subjects"),
            vocabulary_subjects: list_field(&v, "vocabularySubjects"),
            max_study_hours: v.get("maxStudyHours").and_then(|n| n.as_f64()).unwrap_or(24.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("patch object")
    }

    #[test]
    fn sheets_patch_validates_columns_and_ttl() {
        let mut cur = default_section(SetupSection::Sheets);
        merge_section_patch(
            SetupSection::Sheets,
            &mut cur,
            &patch(json!({ "feedbackIdColumn": " 학번 ", "scoreValueColumns": ["t1", "t2"] })),
        )
        .expect("valid patch");
        assert_eq!(cur["feedbackIdColumn"], "학번");
        assert_eq!(cur["scoreValueColumns"], json!(["t1", "t2"]));

        let bad_ttl = merge_section_patch(
            SetupSection::Sheets,
            &mut cur,
            &patch(json!({ "cacheTtlSeconds": 99999 })),
        );
        assert!(bad_ttl.is_err());

        let dup = merge_section_patch(
            SetupSection::Sheets,
            &mut cur,
            &patch(json!({ "scoreValueColumns": ["t1", "t1"] })),
        );
        assert!(dup.is_err());
    }

    #[test]
    fn score_class_column_is_optional() {
        let defaults = SheetSettings::load(None).expect("sheets");
        assert_eq!(defaults.score_class, None);
        assert_eq!(defaults.score_spec().class_group, None);

        let mut cur = default_section(SetupSection::Sheets);
        merge_section_patch(
            SetupSection::Sheets,
            &mut cur,
            &patch(json!({ "scoreClassColumn": " class " })),
        )
        .expect("valid patch");
        assert_eq!(cur["scoreClassColumn"], "class");

        assert!(merge_section_patch(
            SetupSection::Sheets,
            &mut cur,
            &patch(json!({ "scoreClassColumn": "" })),
        )
        .is_err());

        merge_section_patch(
            SetupSection::Sheets,
            &mut cur,
            &patch(json!({ "scoreClassColumn": null })),
        )
        .expect("clear");
        assert!(cur["scoreClassColumn"].is_null());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut cur = default_section(SetupSection::Charts);
        let e = merge_section_patch(
            SetupSection::Charts,
            &mut cur,
            &patch(json!({ "palette": "rainbow" })),
        )
        .expect_err("unknown field");
        assert!(e.contains("unknown charts field"));
    }

    #[test]
    fn defaults_apply_without_workspace() {
        let sheets = SheetSettings::load(None).expect("sheets");
        assert_eq!(sheets.feedback_id, "id");
        assert_eq!(sheets.score_values, None);
        assert_eq!(sheets.cache_ttl, Duration::from_secs(300));
        let spec = sheets.feedback_spec();
        assert_eq!(spec.required, vec!["summary", "score", "feedback"]);

        let lookup = LookupSettings::load(None).expect("lookup");
        assert_eq!(lookup.max_candidates, 20);
        assert_eq!(lookup.partial, PartialPolicy::Union);

        let charts = ChartSettings::load(None).expect("charts");
        assert_eq!(charts.bar_color(), "#1f77b4");

        let planner = PlannerSettings::load(None).expect("planner");
        assert_eq!(planner.subjects.len(), 5);
        assert_eq!(planner.vocabulary_subjects, vec!["English"]);
    }

    #[test]
    fn lookup_policy_round_trips_through_patch() {
        let mut cur = default_section(SetupSection::Lookup);
        merge_section_patch(
            SetupSection::Lookup,
            &mut cur,
            &patch(json!({ "partialMatch": "idFirst", "maxCandidates": 5 })),
        )
        .expect("valid");
        assert_eq!(cur["partialMatch"], "idFirst");
        assert!(merge_section_patch(
            SetupSection::Lookup,
            &mut cur,
            &patch(json!({ "partialMatch": "nameFirst" })),
        )
        .is_err());
    }
}
