use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// Variants serialize as their snake_case string. Declaration order is the
/// `Ord` order, so severity-like enums must be declared mildest first.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ValidationError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentType {
    Prescription => "prescription",
    LabReport => "lab_report",
    Other => "other",
});

str_enum!(Confidence {
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(Severity {
    Normal => "normal",
    Abnormal => "abnormal",
    Critical => "critical",
});

str_enum!(Direction {
    Low => "low",
    High => "high",
});

str_enum!(RiskLevel {
    Low => "low",
    Moderate => "moderate",
    High => "high",
    Critical => "critical",
});

str_enum!(OrganSystem {
    Hematologic => "hematologic",
    Immune => "immune",
    Renal => "renal",
    Hepatic => "hepatic",
    Metabolic => "metabolic",
    Cardiovascular => "cardiovascular",
    Endocrine => "endocrine",
    Electrolyte => "electrolyte",
    Coagulation => "coagulation",
    Nutritional => "nutritional",
    Other => "other",
});

str_enum!(ExplanationSource {
    Primary => "primary",
    Fallback => "fallback",
    Deterministic => "deterministic",
});

impl DocumentType {
    /// Tolerant parse for model output: "Lab Report", "lab-report", "LAB_REPORT".
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let key = normalize_enum_key(raw);
        match key.as_str() {
            "prescription" | "rx" | "medical_prescription" => Some(Self::Prescription),
            "lab_report" | "lab" | "lab_result" | "laboratory_report" | "blood_report"
            | "blood_test" => Some(Self::LabReport),
            "other" | "unknown" => Some(Self::Other),
            _ => None,
        }
    }
}

impl Confidence {
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        normalize_enum_key(raw).parse().ok()
    }
}

fn normalize_enum_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Biological sex as reported on the document or by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    #[serde(alias = "M", alias = "m", alias = "Male")]
    Male,
    #[serde(alias = "F", alias = "f", alias = "Female")]
    Female,
}

impl Sex {
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" | "man" => Some(Self::Male),
            "f" | "female" | "woman" => Some(Self::Female),
            _ => None,
        }
    }
}
