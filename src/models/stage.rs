use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipeline board an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Deals,
    Brokers,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Deals => "deals",
            PipelineKind::Brokers => "brokers",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deals" | "deal" => Some(PipelineKind::Deals),
            "brokers" | "broker" => Some(PipelineKind::Brokers),
            _ => None,
        }
    }

    /// The static column table for this pipeline
    pub fn table(&self) -> &'static StageTable {
        match self {
            PipelineKind::Deals => &DEALS,
            PipelineKind::Brokers => &BROKERS,
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-authoritative stage value, opaque to the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stage(String);

impl Stage {
    pub fn new(stage: impl Into<String>) -> Self {
        Stage(stage.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Stage {
    fn from(s: &str) -> Self {
        Stage(s.to_string())
    }
}

impl PartialEq<&str> for Stage {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The "show everything not otherwise bucketed" column.
#[derive(Debug)]
pub struct CatchAllColumn {
    pub key: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

/// A column backed by a real backend stage.
///
/// `stage` is where a drop onto this column is persisted. `folds` lists further
/// backend stages that render here without being a drop target of their own.
#[derive(Debug)]
pub struct ExplicitColumn {
    pub key: &'static str,
    pub label: &'static str,
    pub color: &'static str,
    pub stage: &'static str,
    pub folds: &'static [&'static str],
}

impl ExplicitColumn {
    pub fn backend_stage(&self) -> Stage {
        Stage::from(self.stage)
    }

    fn renders(&self, stage: &Stage) -> bool {
        *stage == self.stage || self.folds.iter().any(|f| *stage == *f)
    }
}

/// A resolved reference to one rendered column
#[derive(Debug, Clone, Copy)]
pub enum ColumnRef {
    CatchAll(&'static CatchAllColumn),
    Explicit(&'static ExplicitColumn),
}

impl ColumnRef {
    pub fn key(&self) -> &'static str {
        match self {
            ColumnRef::CatchAll(c) => c.key,
            ColumnRef::Explicit(c) => c.key,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ColumnRef::CatchAll(c) => c.label,
            ColumnRef::Explicit(c) => c.label,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            ColumnRef::CatchAll(c) => c.color,
            ColumnRef::Explicit(c) => c.color,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, ColumnRef::CatchAll(_))
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ColumnRef {}

/// Declarative column table for one pipeline.
///
/// Every explicit column carries its backend stage, so the forward mapping
/// (column -> backend stage) is total by construction. The reverse mapping is
/// many-to-one and resolves to the lowest-ordinal column that renders the stage.
#[derive(Debug)]
pub struct StageTable {
    pub pipeline: PipelineKind,
    pub catch_all: CatchAllColumn,
    pub columns: &'static [ExplicitColumn],
    /// Every stage value the backend accepts for this pipeline
    pub stages: &'static [&'static str],
    /// Stage assigned to newly created entities
    pub default_stage: &'static str,
}

impl StageTable {
    /// Columns in display order, catch-all first
    pub fn ordered(&'static self) -> impl Iterator<Item = ColumnRef> {
        std::iter::once(ColumnRef::CatchAll(&self.catch_all))
            .chain(self.columns.iter().map(ColumnRef::Explicit))
    }

    pub fn catch_all(&'static self) -> ColumnRef {
        ColumnRef::CatchAll(&self.catch_all)
    }

    /// Look up a column by its UI key (case-insensitive)
    pub fn column(&'static self, key: &str) -> Option<ColumnRef> {
        self.ordered().find(|c| c.key().eq_ignore_ascii_case(key))
    }

    /// Forward mapping: UI column key to the backend stage a drop persists.
    /// `None` for the catch-all and for keys that name no column.
    pub fn to_backend_stage(&'static self, key: &str) -> Option<Stage> {
        match self.column(key)? {
            ColumnRef::Explicit(c) => Some(c.backend_stage()),
            ColumnRef::CatchAll(_) => None,
        }
    }

    /// Reverse mapping: the single column a backend stage renders in.
    pub fn column_for_stage(&'static self, stage: &Stage) -> ColumnRef {
        self.columns
            .iter()
            .find(|c| c.renders(stage))
            .map(ColumnRef::Explicit)
            .unwrap_or(ColumnRef::CatchAll(&self.catch_all))
    }

    /// Whether any explicit column renders this stage
    pub fn is_explicit(&self, stage: &Stage) -> bool {
        self.columns.iter().any(|c| c.renders(stage))
    }

    pub fn accepts(&self, stage: &str) -> bool {
        self.stages.contains(&stage)
    }
}

pub static DEALS: StageTable = StageTable {
    pipeline: PipelineKind::Deals,
    catch_all: CatchAllColumn { key: "all", label: "All", color: "black" },
    columns: &[
        ExplicitColumn {
            key: "response-received",
            label: "Response Received",
            color: "blue",
            stage: "prospect",
            folds: &[],
        },
        ExplicitColumn {
            key: "initial-diligence",
            label: "Initial Diligence",
            color: "yellow",
            stage: "due-diligence",
            folds: &[],
        },
        ExplicitColumn {
            key: "ioi-loi",
            label: "IOI/LOI",
            color: "green",
            stage: "term-sheet",
            folds: &["closing"],
        },
    ],
    stages: &["prospect", "due-diligence", "term-sheet", "closing", "closed"],
    default_stage: "prospect",
};

pub static BROKERS: StageTable = StageTable {
    pipeline: PipelineKind::Brokers,
    catch_all: CatchAllColumn { key: "all", label: "All", color: "bright_black" },
    columns: &[
        ExplicitColumn {
            key: "response-received",
            label: "Response Received",
            color: "yellow",
            stage: "response-received",
            folds: &[],
        },
        ExplicitColumn {
            key: "closing",
            label: "Closing",
            color: "green",
            stage: "closing",
            folds: &[],
        },
    ],
    stages: &["all", "response-received", "closing"],
    default_stage: "all",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_kind_conversion() {
        assert_eq!(PipelineKind::Deals.as_str(), "deals");
        assert_eq!(PipelineKind::from_str("brokers"), Some(PipelineKind::Brokers));
        assert_eq!(PipelineKind::from_str("Deal"), Some(PipelineKind::Deals));
        assert_eq!(PipelineKind::from_str("contacts"), None);
    }

    #[test]
    fn test_forward_mapping_is_total() {
        for table in [&DEALS, &BROKERS] {
            for column in table.columns {
                let stage = table.to_backend_stage(column.key).unwrap();
                assert!(table.accepts(stage.as_str()), "{} maps to unknown stage", column.key);
            }
            assert!(table.to_backend_stage(table.catch_all.key).is_none());
        }
    }

    #[test]
    fn test_deal_forward_mapping() {
        assert_eq!(DEALS.to_backend_stage("response-received"), Some(Stage::from("prospect")));
        assert_eq!(DEALS.to_backend_stage("initial-diligence"), Some(Stage::from("due-diligence")));
        assert_eq!(DEALS.to_backend_stage("ioi-loi"), Some(Stage::from("term-sheet")));
        assert_eq!(DEALS.to_backend_stage("closing"), None);
    }

    #[test]
    fn test_deal_reverse_mapping_folds() {
        assert_eq!(DEALS.column_for_stage(&Stage::from("prospect")).key(), "response-received");
        assert_eq!(DEALS.column_for_stage(&Stage::from("due-diligence")).key(), "initial-diligence");
        assert_eq!(DEALS.column_for_stage(&Stage::from("term-sheet")).key(), "ioi-loi");
        assert_eq!(DEALS.column_for_stage(&Stage::from("closing")).key(), "ioi-loi");
        assert!(DEALS.column_for_stage(&Stage::from("closed")).is_catch_all());
    }

    #[test]
    fn test_reverse_of_forward_is_identity() {
        for table in [&DEALS, &BROKERS] {
            for column in table.columns {
                let stage = column.backend_stage();
                assert_eq!(table.column_for_stage(&stage).key(), column.key);
            }
        }
    }

    #[test]
    fn test_broker_catch_all_membership() {
        assert!(BROKERS.column_for_stage(&Stage::from("all")).is_catch_all());
        assert!(BROKERS.column_for_stage(&Stage::from("")).is_catch_all());
        assert_eq!(BROKERS.column_for_stage(&Stage::from("closing")).key(), "closing");
    }

    #[test]
    fn test_column_lookup_case_insensitive() {
        assert_eq!(DEALS.column("IOI-LOI").map(|c| c.key()), Some("ioi-loi"));
        assert!(DEALS.column("All").map(|c| c.is_catch_all()).unwrap_or(false));
        assert!(DEALS.column("nowhere").is_none());
    }
}
