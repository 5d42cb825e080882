use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LetterGrade {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D-")]
    DMinus,
    #[serde(rename = "F")]
    F,
}

/// Lower percentage bound of each band, best first. Anything below the last
/// bound is an F.
const BANDS: [(f64, LetterGrade); 11] = [
    (93.0, LetterGrade::A),
    (90.0, LetterGrade::AMinus),
    (87.0, LetterGrade::BPlus),
    (83.0, LetterGrade::B),
    (80.0, LetterGrade::BMinus),
    (77.0, LetterGrade::CPlus),
    (73.0, LetterGrade::C),
    (70.0, LetterGrade::CMinus),
    (67.0, LetterGrade::DPlus),
    (63.0, LetterGrade::D),
    (60.0, LetterGrade::DMinus),
];

impl LetterGrade {
    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::DMinus => "D-",
            LetterGrade::F => "F",
        }
    }

    pub fn from_percent(percent: f64) -> Self {
        BANDS
            .iter()
            .find(|(min, _)| percent >= *min)
            .map(|(_, g)| *g)
            .unwrap_or(LetterGrade::F)
    }

    /// Leading letter, e.g. 'B' for B+.
    pub fn family(self) -> char {
        self.as_str().chars().next().unwrap_or('F')
    }
}

impl std::fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GradeError {
    #[error("max score must be greater than zero (got {0})")]
    NonPositiveMax(f64),
    #[error("score and max score must be finite numbers")]
    NotFinite,
}

pub fn percentage(score: f64, max_score: f64) -> Result<f64, GradeError> {
    if !score.is_finite() || !max_score.is_finite() {
        return Err(GradeError::NotFinite);
    }
    if max_score <= 0.0 {
        return Err(GradeError::NonPositiveMax(max_score));
    }
    Ok(score / max_score * 100.0)
}

pub fn letter_grade(score: f64, max_score: f64) -> Result<LetterGrade, GradeError> {
    percentage(score, max_score).map(LetterGrade::from_percent)
}
