use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::matcher::{normalize_id, normalize_name, Matchable};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read sheet {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("sheet has no header row")]
    EmptySheet,

    #[error("missing expected column '{column}' (found: {})", .found.join(", "))]
    MissingColumn { column: String, found: Vec<String> },

    #[error("column '{column}' appears more than once in the header row")]
    DuplicateColumn { column: String },
}

impl DatasetError {
    pub fn code(&self) -> &'static str {
        match self {
            DatasetError::MissingColumn { .. } => "sheet_missing_column",
            DatasetError::DuplicateColumn { .. } => "sheet_duplicate_column",
            _ => "sheet_read_failed",
        }
    }
}

/// Which headers carry the identity columns, plus any other columns the
/// caller relies on. Every named column must exist or loading fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    pub id: String,
    pub name: String,
    pub class_group: Option<String>,
    pub required: Vec<String>,
}

impl ColumnSpec {
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.id,
            self.name,
            self.class_group.as_deref().unwrap_or(""),
            self.required.join(",")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    /// 1-based data row, header excluded.
    pub row: usize,
    pub id: String,
    pub name: String,
    pub raw_id: String,
    pub raw_name: String,
    pub class_group: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl StudentRecord {
    pub fn field(&self, column: &str) -> &str {
        self.fields.get(column).map(|s| s.as_str()).unwrap_or("")
    }
}

impl Matchable for StudentRecord {
    fn match_id(&self) -> &str {
        &self.id
    }

    fn match_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub records: Vec<StudentRecord>,
}

impl Dataset {
    pub fn from_path(path: &Path, spec: &ColumnSpec) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        Self::from_reader(file, spec)
    }

    pub fn from_csv_str(text: &str, spec: &ColumnSpec) -> Result<Self, DatasetError> {
        Self::from_reader(text.as_bytes(), spec)
    }

    pub fn from_reader<R: Read>(reader: R, spec: &ColumnSpec) -> Result<Self, DatasetError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            let cells: Vec<String> = rec.iter().map(|c| c.trim().to_string()).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            rows.push(cells);
        }

        let mut rows = rows.into_iter();
        let headers = rows.next().ok_or(DatasetError::EmptySheet)?;
        // Cells are keyed by header name, so a repeated name would shadow the
        // column that was validated.
        for (i, h) in headers.iter().enumerate() {
            if !h.is_empty() && headers[..i].contains(h) {
                return Err(DatasetError::DuplicateColumn { column: h.clone() });
            }
        }

        let column_index = |column: &str| -> Result<usize, DatasetError> {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| DatasetError::MissingColumn {
                    column: column.to_string(),
                    found: headers.clone(),
                })
        };
        let id_idx = column_index(&spec.id)?;
        let name_idx = column_index(&spec.name)?;
        let class_idx = match spec.class_group.as_deref() {
            Some(c) => Some(column_index(c)?),
            None => None,
        };
        for column in &spec.required {
            column_index(column)?;
        }

        let records = rows
            .enumerate()
            .map(|(i, cells)| {
                let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
                let raw_id = cell(id_idx);
                let raw_name = cell(name_idx);
                let class_group = class_idx.map(cell).filter(|c| !c.is_empty());
                let fields = headers
                    .iter()
                    .enumerate()
                    .map(|(j, h)| (h.clone(), cell(j)))
                    .collect();
                StudentRecord {
                    row: i + 1,
                    id: normalize_id(&raw_id),
                    name: normalize_name(&raw_name),
                    raw_id,
                    raw_name,
                    class_group,
                    fields,
                }
            })
            .collect();

        Ok(Self { headers, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn by_row(&self, row: usize) -> Option<&StudentRecord> {
        self.records.iter().find(|r| r.row == row)
    }

    /// Headers other than the identity columns, in sheet order.
    pub fn remaining_columns(&self, spec: &ColumnSpec) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| {
                **h != spec.id
                    && **h != spec.name
                    && spec.class_group.as_deref() != Some(h.as_str())
                    && !h.is_empty()
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ColumnSpec {
        ColumnSpec {
            id: "id".into(),
            name: "name".into(),
            class_group: None,
            required: vec!["score".into()],
        }
    }

    #[test]
    fn loads_trimmed_headers_and_normalizes_identity() {
        let csv = " id , name ,score\n 10-201 ,  Park   Young ,85점\n,,\n10202,Lee,90\n";
        let ds = Dataset::from_csv_str(csv, &spec()).expect("load");
        assert_eq!(ds.headers, vec!["id", "name", "score"]);
        assert_eq!(ds.len(), 2);
        let first = &ds.records[0];
        assert_eq!(first.row, 1);
        assert_eq!(first.id, "10201");
        assert_eq!(first.name, "Park Young");
        assert_eq!(first.raw_id, "10-201");
        assert_eq!(first.field("score"), "85점");
        assert_eq!(ds.records[1].row, 2);
        assert_eq!(ds.by_row(2).map(|r| r.id.as_str()), Some("10202"));
    }

    #[test]
    fn missing_column_fails_fast_with_header_list() {
        let err = Dataset::from_csv_str("id,name\n1,Kim\n", &spec()).expect_err("must fail");
        match &err {
            DatasetError::MissingColumn { column, found } => {
                assert_eq!(column, "score");
                assert_eq!(found, &vec!["id".to_string(), "name".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.code(), "sheet_missing_column");
        assert!(err.to_string().contains("missing expected column 'score'"));
    }

    #[test]
    fn repeated_header_is_rejected() {
        let err = Dataset::from_csv_str("id,name,score,score\n1,Kim,85,\n", &spec())
            .expect_err("duplicate score");
        assert!(matches!(
            &err,
            DatasetError::DuplicateColumn { column } if column == "score"
        ));
        assert_eq!(err.code(), "sheet_duplicate_column");

        // Blank header cells are not names and may repeat.
        let ds = Dataset::from_csv_str("id,name,score,,\n1,Kim,85,x,y\n", &spec()).expect("load");
        assert_eq!(ds.records[0].field("score"), "85");
    }

    #[test]
    fn empty_sheet_is_an_error_and_short_rows_are_padded() {
        let err = Dataset::from_csv_str("\n , \n", &spec()).expect_err("empty");
        assert!(matches!(err, DatasetError::EmptySheet));

        let ds = Dataset::from_csv_str("id,name,score\n7,Choi\n", &spec()).expect("load");
        assert_eq!(ds.records[0].field("score"), "");
    }

    #[test]
    fn remaining_columns_skip_identity_and_class() {
        let spec = ColumnSpec {
            id: "number".into(),
            name: "name".into(),
            class_group: Some("class".into()),
            required: Vec::new(),
        };
        let ds = Dataset::from_csv_str("number,name,class,t1,t2\n1,Kim,A,80,90\n", &spec)
            .expect("load");
        assert_eq!(ds.remaining_columns(&spec), vec!["t1", "t2"]);
        assert_eq!(ds.records[0].class_group.as_deref(), Some("A"));
    }
}
