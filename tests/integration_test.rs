use antibody_identification::*;
use std::fs;
use tempfile::TempDir;

/// Every cell carries D, c and e homozygously; scenarios add the antigens they test
fn base_phenotypes() -> Vec<Phenotype> {
    vec![Phenotype::with_antigens(&[Antigen::D, Antigen::LittleC, Antigen::LittleE]); PANEL_SIZE]
}

fn grades(positive: &[u8]) -> Reactions {
    let list = (1..=PANEL_SIZE as u8)
        .map(|id| if positive.contains(&id) { "2+" } else { "Neg" })
        .collect::<Vec<_>>()
        .join(",");
    Reactions::from_list(&list).unwrap()
}

#[test]
fn test_scenario_homozygous_exclusion() {
    let mut phenotypes = base_phenotypes();
    phenotypes[2].set(Antigen::BigK, true);
    let panel = Panel::from_phenotypes(phenotypes).unwrap();

    let result = AntibodyIdentifier::default().identify(&panel, &grades(&[1]), AutoControl::Negative);

    assert!(result.excluded.contains(&Antigen::BigK));
    assert!(!result.candidates.contains(&Antigen::BigK));
    assert!(result.candidates.contains(&Antigen::LittleK));
    assert!(result
        .exclusion_log
        .iter()
        .any(|l| l == "Excluded K (homozygous on cell 3)"));
}

#[test]
fn test_scenario_heterozygous_guard() {
    let mut phenotypes = base_phenotypes();
    phenotypes[2].set(Antigen::BigK, true);
    phenotypes[2].set(Antigen::LittleK, true);
    let panel = Panel::from_phenotypes(phenotypes).unwrap();

    let result = AntibodyIdentifier::default().identify(&panel, &grades(&[1]), AutoControl::Negative);

    assert!(!result.excluded.contains(&Antigen::BigK));
    assert!(result.candidates.contains(&Antigen::BigK));
}

#[test]
fn test_scenario_inclusion_match_and_rejection() {
    let mut phenotypes = base_phenotypes();
    for cell in [1usize, 4, 7] {
        phenotypes[cell - 1].set(Antigen::Fya, true);
        phenotypes[cell - 1].set(Antigen::Fyb, true);
    }
    phenotypes[0].set(Antigen::Jka, true);
    phenotypes[3].set(Antigen::Jka, true);
    phenotypes[3].set(Antigen::Jkb, true);
    let panel = Panel::from_phenotypes(phenotypes).unwrap();

    let result =
        AntibodyIdentifier::default().identify(&panel, &grades(&[1, 4, 7]), AutoControl::Negative);

    // D, c and e sit homozygously on the non-reactive cells
    assert!(result.excluded.contains(&Antigen::D));
    assert!(result.matches.contains(&Antigen::Fya));
    assert!(!result.warnings.iter().any(|w| w.starts_with("Anti-Fya ")));

    assert!(!result.matches.contains(&Antigen::Jka));
    assert!(result
        .warnings
        .contains(&"Anti-Jka is unlikely (reacted to cell 7 which is antigen-negative)".to_string()));
}

#[test]
fn test_scenario_single_specificity_identified() {
    let mut phenotypes = base_phenotypes();
    for cell in [2usize, 5, 9] {
        phenotypes[cell - 1].set(Antigen::BigE, true);
    }
    // the other antigens are ruled out on cells 10 and 11
    phenotypes[10] = Phenotype::with_antigens(&[
        Antigen::D,
        Antigen::BigC,
        Antigen::LittleE,
        Antigen::BigK,
        Antigen::Fya,
        Antigen::Jka,
        Antigen::M,
        Antigen::BigS,
    ]);
    for antigen in [
        Antigen::LittleK,
        Antigen::Fyb,
        Antigen::Jkb,
        Antigen::N,
        Antigen::LittleS,
    ] {
        phenotypes[9].set(antigen, true);
    }
    let panel = Panel::from_phenotypes(phenotypes).unwrap();

    let result =
        AntibodyIdentifier::default().identify(&panel, &grades(&[2, 5, 9]), AutoControl::Negative);

    assert_eq!(result.candidates, vec![Antigen::BigE]);
    assert_eq!(result.status, AnalysisStatus::Identified);
    assert_eq!(result.antibody_names(), vec!["Anti-E".to_string()]);
    assert_eq!(result.recommendations.len(), 2);
}

#[test]
fn test_scenario_autocontrol_suspends() {
    let panel = Panel::from_phenotypes(base_phenotypes()).unwrap();
    let result = AntibodyIdentifier::default().identify(&panel, &grades(&[1, 2, 3]), AutoControl::Positive);

    assert_eq!(result.status, AnalysisStatus::Suspended);
    assert!(result.matches.is_empty());
    assert!(result.candidates.is_empty());
    assert!(result.exclusion_log.is_empty());
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_scenario_no_candidates() {
    let mut phenotypes = base_phenotypes();
    phenotypes[5] = Phenotype::with_antigens(&[
        Antigen::D,
        Antigen::BigC,
        Antigen::BigE,
        Antigen::BigK,
        Antigen::Fya,
        Antigen::Jka,
        Antigen::M,
        Antigen::BigS,
    ]);
    phenotypes[6] = Phenotype::with_antigens(&[
        Antigen::LittleK,
        Antigen::Fyb,
        Antigen::Jkb,
        Antigen::N,
        Antigen::LittleS,
    ]);
    let panel = Panel::from_phenotypes(phenotypes).unwrap();

    let result = AntibodyIdentifier::default().identify(&panel, &grades(&[1]), AutoControl::Negative);

    assert_eq!(result.status, AnalysisStatus::InconclusiveNoCandidates);
    assert!(result.matches.is_empty());
    assert!(result.candidates.is_empty());
    assert_eq!(result.excluded.len(), ANTIGEN_ORDER.len());
}

#[test]
fn test_all_negative_panel_is_not_identified() {
    let panel = Panel::from_phenotypes(vec![Phenotype::new(); PANEL_SIZE]).unwrap();
    let result = AntibodyIdentifier::default().identify(&panel, &grades(&[]), AutoControl::Negative);
    assert_eq!(result.status, AnalysisStatus::InconclusiveNoMatches);
    assert!(result.matches.is_empty());
    assert_eq!(result.candidates.len(), 15);

    let mut settings = config::AnalysisSettings::default();
    settings.allow_vacuous_matches = true;
    let legacy = AntibodyIdentifier::new(&settings).identify(&panel, &grades(&[]), AutoControl::Negative);
    assert_eq!(legacy.status, AnalysisStatus::Ambiguous);
    assert_eq!(legacy.matches.len(), 15);
}

#[test]
fn test_partition_and_idempotence() {
    let mut phenotypes = base_phenotypes();
    phenotypes[1] = Phenotype::with_antigens(&[Antigen::BigC, Antigen::LittleC, Antigen::M]);
    phenotypes[4] = Phenotype::with_antigens(&[Antigen::Jkb, Antigen::BigS, Antigen::LittleS]);
    let panel = Panel::from_phenotypes(phenotypes).unwrap();
    let reactions = grades(&[1, 3, 11]);
    let identifier = AntibodyIdentifier::default();

    let first = identifier.identify(&panel, &reactions, AutoControl::Negative);
    let second = identifier.identify(&panel, &reactions, AutoControl::Negative);
    assert_eq!(first, second);

    assert_eq!(first.excluded.len() + first.candidates.len(), ANTIGEN_ORDER.len());
    for antigen in ANTIGEN_ORDER {
        assert_ne!(
            first.excluded.contains(&antigen),
            first.candidates.contains(&antigen),
            "{antigen}"
        );
    }
}

#[test]
fn test_files_end_to_end() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let dir = temp_dir.path();

    let panel_path = dir.join("panel.csv");
    PanelParser::new().write_template(&panel_path)?;
    let template = fs::read_to_string(&panel_path)?;
    assert_eq!(template.lines().count(), PANEL_SIZE + 1);

    // mark Fya on cells 1 and 2, and K+k- on the non-reactive cell 3
    let mut edited = Vec::new();
    for (i, line) in template.lines().enumerate() {
        let mut fields: Vec<String> = line.split(',').map(str::to_string).collect();
        if i == 1 || i == 2 {
            fields[8] = "+".to_string();
        }
        if i == 3 {
            fields[6] = "pos".to_string();
        }
        edited.push(fields.join(","));
    }
    fs::write(&panel_path, edited.join("\n"))?;

    let cases_dir = dir.join("cases");
    fs::create_dir(&cases_dir)?;
    let mut case = String::from("cell,reaction\n");
    for id in 1..=PANEL_SIZE {
        let grade = if id <= 2 { "3+" } else { "Neg" };
        case.push_str(&format!("{},{}\n", id, grade));
    }
    fs::write(cases_dir.join("p1.csv"), &case)?;
    fs::write(cases_dir.join("p2.csv"), format!("{}AC,Positive\n", case))?;

    let panel = PanelParser::new().parse(&panel_path)?;
    assert!(panel.cell(3).map(|c| c.phenotype.has(Antigen::BigK)).unwrap_or(false));

    let files = CaseDiscovery::new(false).discover(&[cases_dir])?;
    assert_eq!(files.len(), 2);
    let cases = files
        .iter()
        .map(|f| CaseParser::new().parse(f))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let reports = AntibodyIdentifier::default().identify_batch(&panel, &cases);
    assert_eq!(reports[0].case_id, "p1");
    assert_eq!(reports[0].result.status, AnalysisStatus::Identified);
    assert_eq!(reports[0].result.matches, vec![Antigen::Fya]);
    assert!(reports[0].result.excluded.contains(&Antigen::BigK));
    assert_eq!(reports[1].result.status, AnalysisStatus::Suspended);

    let written = ReportGenerator::new(&dir.join("reports"))?.generate(&reports, ReportFormat::Json)?;
    let json = fs::read_to_string(&written[0])?;
    assert!(json.contains("\"Fya\""));
    Ok(())
}
