use serde::Serialize;

/// Digits-only form of a student number: `" 10-201 "` becomes `"10201"`.
pub fn normalize_id(raw: &str) -> String {
    raw.trim().chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Trimmed name with internal whitespace runs collapsed to a single space.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Anything that exposes an already-normalized id and name can be resolved.
pub trait Matchable {
    fn match_id(&self) -> &str;
    fn match_name(&self) -> &str;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub id: String,
    pub name: String,
}

impl Query {
    pub fn new(raw_id: &str, raw_name: &str) -> Self {
        Self {
            id: normalize_id(raw_id),
            name: normalize_name(raw_name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.name.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialPolicy {
    /// Id-contains and name-contains candidates together, in dataset order.
    #[default]
    Union,
    /// Id-contains only; name-contains is consulted when that comes back empty.
    IdFirst,
}

impl PartialPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "union" => Some(Self::Union),
            "idFirst" => Some(Self::IdFirst),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::IdFirst => "idFirst",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStage {
    IdAndName,
    IdOnly,
    NameOnly,
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<'a, T> {
    NotFound,
    Unique { record: &'a T, stage: MatchStage },
    Ambiguous { candidates: Vec<&'a T>, stage: MatchStage },
}

impl<'a, T> MatchOutcome<'a, T> {
    fn from_hits(hits: Vec<&'a T>, stage: MatchStage) -> Self {
        match hits.len() {
            0 => Self::NotFound,
            1 => Self::Unique {
                record: hits[0],
                stage,
            },
            _ => Self::Ambiguous {
                candidates: hits,
                stage,
            },
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unique { .. } => "found",
            Self::Ambiguous { .. } => "ambiguous",
        }
    }

    pub fn stage(&self) -> Option<MatchStage> {
        match self {
            Self::NotFound => None,
            Self::Unique { stage, .. } | Self::Ambiguous { stage, .. } => Some(*stage),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::NotFound => 0,
            Self::Unique { .. } => 1,
            Self::Ambiguous { candidates, .. } => candidates.len(),
        }
    }

    pub fn records(&self) -> Vec<&'a T> {
        match self {
            Self::NotFound => Vec::new(),
            Self::Unique { record, .. } => vec![*record],
            Self::Ambiguous { candidates, .. } => candidates.clone(),
        }
    }
}

fn exact<'a, T, F>(records: &'a [T], pred: F) -> Vec<&'a T>
where
    T: Matchable,
    F: Fn(&T) -> bool,
{
    records.iter().filter(|r| pred(*r)).collect()
}

/// Resolve a query against `records`. The first stage with any hit wins:
/// id+name, id, name, then substring containment.
pub fn resolve<'a, T: Matchable>(
    records: &'a [T],
    query: &Query,
    policy: PartialPolicy,
) -> MatchOutcome<'a, T> {
    let id = query.id.as_str();
    let name = query.name.as_str();

    if !id.is_empty() && !name.is_empty() {
        let hits = exact(records, |r| r.match_id() == id && r.match_name() == name);
        if !hits.is_empty() {
            return MatchOutcome::from_hits(hits, MatchStage::IdAndName);
        }
    }
    if !id.is_empty() {
        let hits = exact(records, |r| r.match_id() == id);
        if !hits.is_empty() {
            return MatchOutcome::from_hits(hits, MatchStage::IdOnly);
        }
    }
    if !name.is_empty() {
        let hits = exact(records, |r| r.match_name() == name);
        if !hits.is_empty() {
            return MatchOutcome::from_hits(hits, MatchStage::NameOnly);
        }
    }

    MatchOutcome::from_hits(partial(records, query, policy), MatchStage::Partial)
}

fn partial<'a, T: Matchable>(records: &'a [T], query: &Query, policy: PartialPolicy) -> Vec<&'a T> {
    let id = query.id.as_str();
    let name = query.name.as_str();
    let id_hit = |r: &T| !id.is_empty() && r.match_id().contains(id);
    let name_hit = |r: &T| !name.is_empty() && r.match_name().contains(name);

    log::debug!("partial match with policy {}", policy.as_str());
    match policy {
        PartialPolicy::Union => exact(records, |r| id_hit(r) || name_hit(r)),
        PartialPolicy::IdFirst => {
            let by_id = exact(records, id_hit);
            if !by_id.is_empty() {
                return by_id;
            }
            exact(records, name_hit)
        }
    }
}
