use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde uses the same string as the database column.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(CognitiveLevel {
    Recall => "recall",
    Application => "application",
    Analysis => "analysis",
});

str_enum!(UsagePhase {
    Practice => "practice",
    Archive => "archive",
    ExamSimulation => "exam_simulation",
});

str_enum!(ChunkStatus {
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

impl CognitiveLevel {
    /// One tier easier. Recall is the floor.
    pub fn step_down(self) -> Self {
        match self {
            Self::Analysis => Self::Application,
            Self::Application | Self::Recall => Self::Recall,
        }
    }

    /// Interpret free-form model text ("Application level", "analyze", "bilgi").
    /// Returns `None` when nothing recognisable is present.
    pub fn from_lenient(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }
        if lower.contains("appl") || lower.contains("uygula") {
            Some(Self::Application)
        } else if lower.contains("analy") || lower.contains("analiz") {
            Some(Self::Analysis)
        } else if lower.contains("recall")
            || lower.contains("know")
            || lower.contains("remember")
            || lower.contains("bilgi")
        {
            Some(Self::Recall)
        } else {
            None
        }
    }
}

impl UsagePhase {
    /// Phases in the order a run processes them.
    pub fn ordered() -> [UsagePhase; 3] {
        [Self::Practice, Self::Archive, Self::ExamSimulation]
    }
}
