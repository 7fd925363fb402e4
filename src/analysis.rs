use rayon::prelude::*;
use tracing::debug;

use crate::config::AnalysisSettings;
use crate::types::*;

pub const AUTOCONTROL_WARNING: &str = "Autocontrol positive: alloantibody identification is suspended. Suggest autoantibody workup (DAT).";
pub const NO_POSITIVE_WARNING: &str =
    "No positive reactions observed; no antibody specificity can be implicated";

const NO_CANDIDATES_ADVICE: &str =
    "No common alloantibodies found. Consider antibodies to low-frequency antigens.";
const VERIFY_PHENOTYPE_ADVICE: &str =
    "Verify patient phenotype is antigen-negative for each identified specificity";
const CONFIRM_CELLS_ADVICE: &str =
    "Confirm with at least 3 antigen-positive reactive and 3 antigen-negative non-reactive cells";
const SEPARATE_ADVICE: &str =
    "Multiple candidates detected. Use selected cells or an enzyme panel to separate them.";
const NO_MATCHES_ADVICE: &str =
    "Candidates remain but none fits the positive reaction pattern; consider a mixture of antibodies or further testing";

/// Whether `antigen` is expressed with full dosage on a cell.
///
/// D has no antithetical partner and always counts as homozygous. For paired
/// antigens the cell must carry the antigen and lack its partner.
pub fn is_homozygous(antigen: Antigen, phenotype: &Phenotype) -> bool {
    match antigen.partner() {
        None => true,
        Some(partner) => phenotype.has(antigen) && !phenotype.has(partner),
    }
}

/// Antigens ruled out by negative reactions, with an audit trail
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusion {
    pub excluded: Vec<Antigen>,
    pub candidates: Vec<Antigen>,
    pub log: Vec<String>,
}

/// Rule-out phase
pub struct ExclusionEngine;

impl ExclusionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Excludes an antigen on the first negative cell carrying it homozygously.
    ///
    /// Heterozygous carriers are skipped rather than treated as conclusive, so a
    /// later homozygous negative cell can still rule the antigen out.
    pub fn exclude(&self, panel: &Panel, negative_cells: &[u8]) -> Exclusion {
        let mut sorted = negative_cells.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut exclusion = Exclusion::default();

        for antigen in ANTIGEN_ORDER {
            let mut ruled_out = false;

            for &cell_id in &sorted {
                let Some(cell) = panel.cell(cell_id) else {
                    continue;
                };
                if !cell.phenotype.has(antigen) {
                    continue;
                }
                if is_homozygous(antigen, &cell.phenotype) {
                    exclusion
                        .log
                        .push(format!("Excluded {} (homozygous on cell {})", antigen, cell_id));
                    ruled_out = true;
                    break;
                }
                debug!(
                    "{} heterozygous on negative cell {}; not excluded",
                    antigen, cell_id
                );
            }

            if ruled_out {
                exclusion.excluded.push(antigen);
            } else {
                exclusion.candidates.push(antigen);
            }
        }

        exclusion
    }
}

impl Default for ExclusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidates that explain every positive reaction, and why the others do not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inclusion {
    pub matches: Vec<Antigen>,
    pub warnings: Vec<String>,
}

/// Rule-in phase
pub struct InclusionEngine {
    allow_vacuous_matches: bool,
}

impl InclusionEngine {
    pub fn new(allow_vacuous_matches: bool) -> Self {
        Self {
            allow_vacuous_matches,
        }
    }

    pub fn include(&self, panel: &Panel, candidates: &[Antigen], positive_cells: &[u8]) -> Inclusion {
        let mut inclusion = Inclusion::default();

        if positive_cells.is_empty() && !self.allow_vacuous_matches {
            inclusion.warnings.push(NO_POSITIVE_WARNING.to_string());
            return inclusion;
        }

        let mut ordered: Vec<Antigen> = candidates.to_vec();
        ordered.sort_by_key(|a| a.index());

        let mut positive = positive_cells.to_vec();
        positive.sort_unstable();
        positive.dedup();

        for candidate in ordered {
            let missed: Vec<u8> = positive
                .iter()
                .copied()
                .filter(|&id| {
                    panel
                        .cell(id)
                        .map(|cell| !cell.phenotype.has(candidate))
                        .unwrap_or(false)
                })
                .collect();

            if missed.is_empty() {
                debug!("{} present on every positive cell", candidate);
                inclusion.matches.push(candidate);
            } else {
                inclusion.warnings.push(mismatch_warning(candidate, &missed));
            }
        }

        inclusion
    }
}

impl Default for InclusionEngine {
    fn default() -> Self {
        Self::new(false)
    }
}

fn mismatch_warning(candidate: Antigen, missed: &[u8]) -> String {
    let ids = missed
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if missed.len() == 1 {
        format!(
            "{} is unlikely (reacted to cell {} which is antigen-negative)",
            candidate.antibody_name(),
            ids
        )
    } else {
        format!(
            "{} is unlikely (reacted to cells {} which are antigen-negative)",
            candidate.antibody_name(),
            ids
        )
    }
}

/// Runs the full identification: safety gate, rule-out, rule-in, status
pub struct AntibodyIdentifier {
    exclusion: ExclusionEngine,
    inclusion: InclusionEngine,
}

impl AntibodyIdentifier {
    pub fn new(settings: &AnalysisSettings) -> Self {
        Self {
            exclusion: ExclusionEngine::new(),
            inclusion: InclusionEngine::new(settings.allow_vacuous_matches),
        }
    }

    pub fn identify(
        &self,
        panel: &Panel,
        reactions: &Reactions,
        autocontrol: AutoControl,
    ) -> AnalysisResult {
        if autocontrol == AutoControl::Positive {
            return AnalysisResult {
                status: AnalysisStatus::Suspended,
                matches: Vec::new(),
                warnings: vec![AUTOCONTROL_WARNING.to_string()],
                exclusion_log: Vec::new(),
                candidates: Vec::new(),
                excluded: Vec::new(),
                recommendations: Vec::new(),
            };
        }

        let exclusion = self
            .exclusion
            .exclude(panel, &reactions.negative_cells());
        debug!(
            "{} excluded, {} candidates",
            exclusion.excluded.len(),
            exclusion.candidates.len()
        );

        if exclusion.candidates.is_empty() {
            return AnalysisResult {
                status: AnalysisStatus::InconclusiveNoCandidates,
                matches: Vec::new(),
                warnings: Vec::new(),
                exclusion_log: exclusion.log,
                candidates: Vec::new(),
                excluded: exclusion.excluded,
                recommendations: vec![NO_CANDIDATES_ADVICE.to_string()],
            };
        }

        let inclusion =
            self.inclusion
                .include(panel, &exclusion.candidates, &reactions.positive_cells());

        let status = match inclusion.matches.len() {
            0 => AnalysisStatus::InconclusiveNoMatches,
            1 => AnalysisStatus::Identified,
            _ => AnalysisStatus::Ambiguous,
        };

        let recommendations = match status {
            AnalysisStatus::Identified => vec![
                VERIFY_PHENOTYPE_ADVICE.to_string(),
                CONFIRM_CELLS_ADVICE.to_string(),
            ],
            AnalysisStatus::Ambiguous => vec![
                VERIFY_PHENOTYPE_ADVICE.to_string(),
                CONFIRM_CELLS_ADVICE.to_string(),
                SEPARATE_ADVICE.to_string(),
            ],
            _ => vec![NO_MATCHES_ADVICE.to_string()],
        };

        AnalysisResult {
            status,
            matches: inclusion.matches,
            warnings: inclusion.warnings,
            exclusion_log: exclusion.log,
            candidates: exclusion.candidates,
            excluded: exclusion.excluded,
            recommendations,
        }
    }

    pub fn identify_case(&self, panel: &Panel, case: &Case) -> CaseReport {
        CaseReport {
            case_id: case.case_id.clone(),
            autocontrol: case.autocontrol,
            reactions: case.reactions.iter().map(|(_, g)| g).collect(),
            result: self.identify(panel, &case.reactions, case.autocontrol),
        }
    }

    /// Analyzes independent cases against one shared panel, preserving input order
    pub fn identify_batch(&self, panel: &Panel, cases: &[Case]) -> Vec<CaseReport> {
        cases
            .par_iter()
            .map(|case| self.identify_case(panel, case))
            .collect()
    }
}

impl Default for AntibodyIdentifier {
    fn default() -> Self {
        Self::new(&AnalysisSettings::default())
    }
}
