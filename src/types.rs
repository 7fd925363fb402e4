use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

/// Number of reference cells on a panel
pub const PANEL_SIZE: usize = 11;

/// Red-cell antigens on the reference panel, in display order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Antigen {
    D,
    #[serde(rename = "C")]
    BigC,
    #[serde(rename = "c")]
    LittleC,
    #[serde(rename = "E")]
    BigE,
    #[serde(rename = "e")]
    LittleE,
    #[serde(rename = "K")]
    BigK,
    #[serde(rename = "k")]
    LittleK,
    Fya,
    Fyb,
    Jka,
    Jkb,
    M,
    N,
    #[serde(rename = "S")]
    BigS,
    #[serde(rename = "s")]
    LittleS,
}

/// Registry order used for every scan and every output list
pub const ANTIGEN_ORDER: [Antigen; 15] = [
    Antigen::D,
    Antigen::BigC,
    Antigen::LittleC,
    Antigen::BigE,
    Antigen::LittleE,
    Antigen::BigK,
    Antigen::LittleK,
    Antigen::Fya,
    Antigen::Fyb,
    Antigen::Jka,
    Antigen::Jkb,
    Antigen::M,
    Antigen::N,
    Antigen::BigS,
    Antigen::LittleS,
];

/// Allele pairs, listed once; `partner` reads them in both directions
const ALLELE_PAIRS: [(Antigen, Antigen); 7] = [
    (Antigen::BigC, Antigen::LittleC),
    (Antigen::BigE, Antigen::LittleE),
    (Antigen::BigK, Antigen::LittleK),
    (Antigen::Fya, Antigen::Fyb),
    (Antigen::Jka, Antigen::Jkb),
    (Antigen::M, Antigen::N),
    (Antigen::BigS, Antigen::LittleS),
];

impl Antigen {
    /// Position in the registry, also the index into a `Phenotype`
    pub fn index(self) -> usize {
        self as usize
    }

    /// Case-sensitive panel identifier ("C" and "c" are different antigens)
    pub fn symbol(self) -> &'static str {
        match self {
            Antigen::D => "D",
            Antigen::BigC => "C",
            Antigen::LittleC => "c",
            Antigen::BigE => "E",
            Antigen::LittleE => "e",
            Antigen::BigK => "K",
            Antigen::LittleK => "k",
            Antigen::Fya => "Fya",
            Antigen::Fyb => "Fyb",
            Antigen::Jka => "Jka",
            Antigen::Jkb => "Jkb",
            Antigen::M => "M",
            Antigen::N => "N",
            Antigen::BigS => "S",
            Antigen::LittleS => "s",
        }
    }

    /// Antithetical allele partner; D has none
    pub fn partner(self) -> Option<Antigen> {
        ALLELE_PAIRS.iter().find_map(|&(a, b)| {
            if a == self {
                Some(b)
            } else if b == self {
                Some(a)
            } else {
                None
            }
        })
    }

    pub fn from_symbol(symbol: &str) -> Option<Antigen> {
        ANTIGEN_ORDER.iter().copied().find(|a| a.symbol() == symbol)
    }

    /// Name of the antibody directed against this antigen
    pub fn antibody_name(self) -> String {
        format!("Anti-{}", self.symbol())
    }
}

impl fmt::Display for Antigen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Antigen {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Antigen::from_symbol(s.trim()).ok_or_else(|| AnalysisError::UnknownAntigen(s.to_string()))
    }
}

/// Presence/absence of every registry antigen on one cell
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Phenotype {
    present: [bool; 15],
}

impl Phenotype {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a phenotype where exactly the listed antigens are present
    pub fn with_antigens(antigens: &[Antigen]) -> Self {
        let mut phenotype = Self::new();
        for &antigen in antigens {
            phenotype.set(antigen, true);
        }
        phenotype
    }

    pub fn set(&mut self, antigen: Antigen, present: bool) {
        self.present[antigen.index()] = present;
    }

    pub fn has(&self, antigen: Antigen) -> bool {
        self.present[antigen.index()]
    }

    /// Present antigens in registry order
    pub fn antigens(&self) -> Vec<Antigen> {
        ANTIGEN_ORDER
            .iter()
            .copied()
            .filter(|&a| self.has(a))
            .collect()
    }
}

/// One reference cell of the panel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PanelCell {
    pub id: u8,
    pub phenotype: Phenotype,
}

impl PanelCell {
    pub fn new(id: u8, phenotype: Phenotype) -> Self {
        Self { id, phenotype }
    }
}

/// Validated 11-cell panel, ordered by cell id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Panel {
    cells: Vec<PanelCell>,
}

impl Panel {
    /// Validates that ids 1..=11 each appear exactly once; cells are stored sorted by id
    pub fn new(mut cells: Vec<PanelCell>) -> Result<Self, AnalysisError> {
        if cells.len() != PANEL_SIZE {
            return Err(AnalysisError::WrongCellCount {
                expected: PANEL_SIZE,
                found: cells.len(),
            });
        }

        let mut seen = [false; PANEL_SIZE];
        for cell in &cells {
            if cell.id == 0 || cell.id as usize > PANEL_SIZE {
                return Err(AnalysisError::CellOutOfRange(cell.id));
            }
            let slot = &mut seen[cell.id as usize - 1];
            if *slot {
                return Err(AnalysisError::DuplicateCell(cell.id));
            }
            *slot = true;
        }

        cells.sort_by_key(|c| c.id);
        Ok(Self { cells })
    }

    /// Builds a panel from phenotypes listed in cell order 1..=11
    pub fn from_phenotypes(phenotypes: Vec<Phenotype>) -> Result<Self, AnalysisError> {
        let cells = phenotypes
            .into_iter()
            .enumerate()
            .map(|(i, phenotype)| PanelCell::new(i as u8 + 1, phenotype))
            .collect();
        Self::new(cells)
    }

    pub fn cells(&self) -> &[PanelCell] {
        &self.cells
    }

    pub fn cell(&self, id: u8) -> Option<&PanelCell> {
        if id == 0 {
            return None;
        }
        self.cells.get(id as usize - 1)
    }
}

/// Agglutination grade recorded for one cell
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReactionGrade {
    #[serde(rename = "Neg")]
    Negative,
    #[serde(rename = "w+")]
    Weak,
    #[serde(rename = "1+")]
    One,
    #[serde(rename = "2+")]
    Two,
    #[serde(rename = "3+")]
    Three,
    #[serde(rename = "4+")]
    Four,
}

pub const REACTION_GRADES: [ReactionGrade; 6] = [
    ReactionGrade::Negative,
    ReactionGrade::Weak,
    ReactionGrade::One,
    ReactionGrade::Two,
    ReactionGrade::Three,
    ReactionGrade::Four,
];

impl ReactionGrade {
    pub fn strength(self) -> f32 {
        match self {
            ReactionGrade::Negative => 0.0,
            ReactionGrade::Weak => 0.5,
            ReactionGrade::One => 1.0,
            ReactionGrade::Two => 2.0,
            ReactionGrade::Three => 3.0,
            ReactionGrade::Four => 4.0,
        }
    }

    pub fn is_positive(self) -> bool {
        self.strength() > 0.0
    }

    pub fn label(self) -> &'static str {
        match self {
            ReactionGrade::Negative => "Neg",
            ReactionGrade::Weak => "w+",
            ReactionGrade::One => "1+",
            ReactionGrade::Two => "2+",
            ReactionGrade::Three => "3+",
            ReactionGrade::Four => "4+",
        }
    }
}

impl fmt::Display for ReactionGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReactionGrade {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neg" => Ok(ReactionGrade::Negative),
            "w+" => Ok(ReactionGrade::Weak),
            "1+" => Ok(ReactionGrade::One),
            "2+" => Ok(ReactionGrade::Two),
            "3+" => Ok(ReactionGrade::Three),
            "4+" => Ok(ReactionGrade::Four),
            _ => Err(AnalysisError::InvalidGrade(s.to_string())),
        }
    }
}

/// Patient reaction pattern, one grade per panel cell
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reactions {
    grades: Vec<ReactionGrade>,
}

impl Reactions {
    /// Grades listed in cell order 1..=11
    pub fn new(grades: Vec<ReactionGrade>) -> Result<Self, AnalysisError> {
        if grades.len() != PANEL_SIZE {
            return Err(AnalysisError::WrongReactionCount {
                expected: PANEL_SIZE,
                found: grades.len(),
            });
        }
        Ok(Self { grades })
    }

    /// Parses a comma or whitespace separated list such as "Neg, 2+, w+, ..."
    pub fn from_list(list: &str) -> Result<Self, AnalysisError> {
        let grades = list
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ReactionGrade>, _>>()?;
        Self::new(grades)
    }

    /// Builds the vector from (cell id, grade) pairs in any order
    pub fn from_keyed(entries: &[(u8, ReactionGrade)]) -> Result<Self, AnalysisError> {
        let mut slots: [Option<ReactionGrade>; PANEL_SIZE] = [None; PANEL_SIZE];
        for &(id, grade) in entries {
            if id == 0 || id as usize > PANEL_SIZE {
                return Err(AnalysisError::CellOutOfRange(id));
            }
            let slot = &mut slots[id as usize - 1];
            if slot.is_some() {
                return Err(AnalysisError::DuplicateCell(id));
            }
            *slot = Some(grade);
        }

        let mut grades = Vec::with_capacity(PANEL_SIZE);
        for (i, slot) in slots.iter().enumerate() {
            grades.push(slot.ok_or(AnalysisError::MissingReaction(i as u8 + 1))?);
        }
        Ok(Self { grades })
    }

    pub fn grade(&self, cell_id: u8) -> Option<ReactionGrade> {
        if cell_id == 0 {
            return None;
        }
        self.grades.get(cell_id as usize - 1).copied()
    }

    /// (cell id, grade) in ascending cell order
    pub fn iter(&self) -> impl Iterator<Item = (u8, ReactionGrade)> + '_ {
        self.grades
            .iter()
            .enumerate()
            .map(|(i, &g)| (i as u8 + 1, g))
    }

    /// Cell ids with strength 0, ascending
    pub fn negative_cells(&self) -> Vec<u8> {
        self.iter()
            .filter(|(_, g)| !g.is_positive())
            .map(|(id, _)| id)
            .collect()
    }

    /// Cell ids with strength > 0, ascending
    pub fn positive_cells(&self) -> Vec<u8> {
        self.iter()
            .filter(|(_, g)| g.is_positive())
            .map(|(id, _)| id)
            .collect()
    }
}

/// Patient autocontrol result
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
pub enum AutoControl {
    #[default]
    Negative,
    Positive,
}

impl fmt::Display for AutoControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoControl::Negative => f.write_str("Negative"),
            AutoControl::Positive => f.write_str("Positive"),
        }
    }
}

impl FromStr for AutoControl {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "negative" | "neg" => Ok(AutoControl::Negative),
            "positive" | "pos" => Ok(AutoControl::Positive),
            _ => Err(AnalysisError::InvalidAutoControl(s.to_string())),
        }
    }
}

/// Overall outcome of one identification run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnalysisStatus {
    /// Autocontrol positive; alloantibody logic not applied
    Suspended,
    /// Exactly one specificity fits the pattern
    Identified,
    /// More than one specificity fits the pattern
    Ambiguous,
    /// Every antigen was ruled out
    InconclusiveNoCandidates,
    /// Candidates survived but none explains every positive cell
    InconclusiveNoMatches,
}

impl AnalysisStatus {
    pub fn is_identified(self) -> bool {
        matches!(self, AnalysisStatus::Identified | AnalysisStatus::Ambiguous)
    }

    pub fn label(self) -> &'static str {
        match self {
            AnalysisStatus::Suspended => "Suspended",
            AnalysisStatus::Identified => "Identified",
            AnalysisStatus::Ambiguous => "Ambiguous",
            AnalysisStatus::InconclusiveNoCandidates => "Inconclusive (no candidates)",
            AnalysisStatus::InconclusiveNoMatches => "Inconclusive (no matches)",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one identification run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub matches: Vec<Antigen>,
    pub warnings: Vec<String>,
    pub exclusion_log: Vec<String>,
    pub candidates: Vec<Antigen>,
    pub excluded: Vec<Antigen>,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    /// Matched specificities rendered as antibody names, e.g. "Anti-Fya"
    pub fn antibody_names(&self) -> Vec<String> {
        self.matches.iter().map(|a| a.antibody_name()).collect()
    }
}

/// One patient work-up: reactions plus autocontrol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Case {
    pub case_id: String,
    pub reactions: Reactions,
    pub autocontrol: AutoControl,
}

impl Case {
    pub fn new(case_id: impl Into<String>, reactions: Reactions, autocontrol: AutoControl) -> Self {
        Self {
            case_id: case_id.into(),
            reactions,
            autocontrol,
        }
    }
}

/// A case together with its analysis, as written to reports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseReport {
    pub case_id: String,
    pub autocontrol: AutoControl,
    pub reactions: Vec<ReactionGrade>,
    pub result: AnalysisResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_relation_is_symmetric_and_total() {
        for antigen in ANTIGEN_ORDER {
            match antigen.partner() {
                Some(partner) => {
                    assert_ne!(antigen, Antigen::D);
                    assert_eq!(partner.partner(), Some(antigen));
                }
                None => assert_eq!(antigen, Antigen::D),
            }
        }
    }

    #[test]
    fn test_symbols_are_case_sensitive() {
        assert_eq!(Antigen::from_symbol("C"), Some(Antigen::BigC));
        assert_eq!(Antigen::from_symbol("c"), Some(Antigen::LittleC));
        assert_eq!(Antigen::from_symbol("fya"), None);
        assert!("Lua".parse::<Antigen>().is_err());
    }

    #[test]
    fn test_registry_index_matches_order() {
        for (i, antigen) in ANTIGEN_ORDER.iter().enumerate() {
            assert_eq!(antigen.index(), i);
        }
    }

    #[test]
    fn test_grade_strengths() {
        let strengths: Vec<f32> = REACTION_GRADES.iter().map(|g| g.strength()).collect();
        assert_eq!(strengths, vec![0.0, 0.5, 1.0, 2.0, 3.0, 4.0]);
        assert!(ReactionGrade::Weak.is_positive());
        assert!(!ReactionGrade::Negative.is_positive());
    }

    #[test]
    fn test_grade_parsing() {
        assert_eq!("Neg".parse::<ReactionGrade>(), Ok(ReactionGrade::Negative));
        assert_eq!(" W+ ".parse::<ReactionGrade>(), Ok(ReactionGrade::Weak));
        assert_eq!("3+".parse::<ReactionGrade>(), Ok(ReactionGrade::Three));
        assert_eq!(
            "5+".parse::<ReactionGrade>(),
            Err(AnalysisError::InvalidGrade("5+".to_string()))
        );
    }

    #[test]
    fn test_reactions_split_by_sign() {
        let reactions = Reactions::from_list("Neg,w+,1+,Neg,2+,Neg,3+,4+,Neg,Neg,1+").unwrap();
        assert_eq!(reactions.negative_cells(), vec![1, 4, 6, 9, 10]);
        assert_eq!(reactions.positive_cells(), vec![2, 3, 5, 7, 8, 11]);
    }

    #[test]
    fn test_reactions_require_eleven_entries() {
        assert_eq!(
            Reactions::from_list("Neg, 1+"),
            Err(AnalysisError::WrongReactionCount {
                expected: 11,
                found: 2
            })
        );
    }

    #[test]
    fn test_keyed_reactions_report_missing_cell() {
        let entries: Vec<(u8, ReactionGrade)> =
            (1..=10).map(|id| (id, ReactionGrade::Negative)).collect();
        assert_eq!(
            Reactions::from_keyed(&entries),
            Err(AnalysisError::MissingReaction(11))
        );
    }

    #[test]
    fn test_panel_rejects_duplicate_and_short_grids() {
        let mut cells: Vec<PanelCell> = (1..=11)
            .map(|id| PanelCell::new(id, Phenotype::new()))
            .collect();
        cells[10].id = 10;
        assert_eq!(Panel::new(cells), Err(AnalysisError::DuplicateCell(10)));

        assert_eq!(
            Panel::from_phenotypes(vec![Phenotype::new(); 4]),
            Err(AnalysisError::WrongCellCount {
                expected: 11,
                found: 4
            })
        );
    }

    #[test]
    fn test_autocontrol_parsing() {
        assert_eq!("Positive".parse::<AutoControl>(), Ok(AutoControl::Positive));
        assert_eq!("negative".parse::<AutoControl>(), Ok(AutoControl::Negative));
        assert!("maybe".parse::<AutoControl>().is_err());
    }
}
