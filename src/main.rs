use admissions_analyzer::breakdown::{self, GroupKey};
use admissions_analyzer::capacity::CapacityTable;
use admissions_analyzer::logging::init_logging;
use admissions_analyzer::models::{AnalysisRequest, Choice, Config};
use admissions_analyzer::validation::{capacity_sanity_check, count_multiple_admissions};
use admissions_analyzer::{analyzer, sources, FieldCatalog, KpiResult, KpiScope, Reshaper, SchoolReference};
use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

fn main() -> Result<()> {
    let matches = Command::new("admissions-analyzer")
        .version("1.0")
        .about("Normalizes admissions result exports and computes per-school KPIs")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("year")
                .short('y')
                .long("year")
                .value_name("YEAR")
                .help("Override the admission year from the configuration"),
        )
        .arg(
            Arg::new("round")
                .short('r')
                .long("round")
                .value_name("ROUND")
                .value_parser(clap::value_parser!(u32))
                .help("Analyze a single round instead of the configured ones"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .get_matches();

    init_logging(matches.get_count("verbose"))?;

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let mut config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        println!("⚠️  Please edit {} and point it at your data, then run the program again.", config_file);
        return Ok(());
    };

    if let Some(year) = matches.get_one::<String>("year") {
        config.year = year.clone();
    }
    if let Some(round) = matches.get_one::<u32>("round") {
        config.rounds = vec![*round];
    }
    if config.rounds.is_empty() {
        println!("❌ Error: no rounds configured in {}", config_file);
        return Ok(());
    }

    let data_dir = Path::new(config.data_directory.as_deref().unwrap_or("data-source"));
    let output_dir = config.output_directory.as_deref().unwrap_or("output");

    fs::create_dir_all(output_dir)?;
    clean_output_directory(output_dir, &config.rounds)?;

    println!("🔍 Analyzing admissions year: {}", config.year);
    println!("📂 Reading exports from: {}", data_dir.display());
    println!("📄 Output directory: {} (cleaned)", output_dir);

    // Raw applicant tables of the year
    let mut tables = Vec::new();
    for path in sources::discover_year_files(data_dir, &config.year)? {
        println!("📄 Processing: {}", path.display());
        match sources::read_applicant_table(&path) {
            Ok(table) => {
                println!("   ✅ Found {} applicant rows", table.rows.len());
                tables.push(table);
            }
            Err(e) => {
                println!("   ❌ Error processing file: {:#}", e);
            }
        }
    }

    if tables.is_empty() {
        println!("❌ No applicant exports for {} found in {}", config.year, data_dir.display());
        return Ok(());
    }

    let year_data = admissions_analyzer::load_year(&tables);
    if !year_data.unrecognized_columns.is_empty() {
        info!(columns = ?year_data.unrecognized_columns, "columns left unnormalized");
    }

    let schools = load_school_reference(data_dir, config.school_reference_file.as_deref())?;
    let field_map_path = data_dir.join(config.field_map_file.as_deref().unwrap_or("kkov_map.json"));
    let fields = FieldCatalog::new(sources::read_field_map(&field_map_path)?);
    println!("🏫 {} school ids, {} field names in reference data", schools.len(), fields.len());

    for round in config.rounds.clone() {
        println!("\n🎯 Round {}", round);
        let request = AnalysisRequest {
            year: config.year.clone(),
            round: Some(round),
        };
        let records = year_data.select(&request);
        if records.is_empty() {
            println!("   ⚠️  No applicants recorded for round {}", round);
            continue;
        }

        let anomalies = count_multiple_admissions(&records);
        if !anomalies.is_empty() {
            println!("   ⚠️  {} applicants admitted at more than one choice", anomalies.len());
        }

        let table = Reshaper::new(&schools, &fields).reshape(&records);
        println!("   ✅ {} applicants → {} choices", records.len(), table.len());

        let capacity_path = data_dir.join(sources::capacity_file_name(&config.year, round));
        let capacity = CapacityTable::from_records(&sources::read_capacity_table(&capacity_path, round)?)?;
        if capacity.is_empty() {
            println!("   ⚠️  No capacity data, capacity-based KPIs fall back to intake");
        }

        for finding in capacity_sanity_check(&table.choices, &capacity, &schools, round) {
            println!(
                "   ⚠️  {}: {:.1}% full ({} admitted / {} planned)",
                finding.school_name, finding.fullness_rate, finding.admitted, finding.planned_capacity
            );
        }

        let selected = select_choices(&table.choices, &config);
        let round_dir = Path::new(output_dir).join(format!("kolo{}", round));
        fs::create_dir_all(&round_dir)?;

        let summaries = compute_group_kpis(&selected, &capacity, &schools, round)?;
        generate_choices_csv(&selected, &round_dir)?;
        generate_kpi_summary_csv(&summaries, &round_dir)?;
        generate_reason_breakdown_csv(&selected, &round_dir)?;
        generate_outflow_csv(&selected, &round_dir)?;

        print_summary(&summaries);
        println!("   📂 Results: {}", round_dir.display());
    }

    println!("\n✅ Analysis complete!");
    Ok(())
}

struct GroupSummary {
    key: GroupKey,
    school_name: String,
    field_label: String,
    kpi: KpiResult,
}

fn load_school_reference(data_dir: &Path, file: Option<&str>) -> Result<SchoolReference> {
    let path = data_dir.join(file.unwrap_or("skoly.csv"));
    if !path.exists() {
        warn!(file = %path.display(), "school register not found, schools shown by id");
        return Ok(SchoolReference::default());
    }
    Ok(SchoolReference::from_records(&sources::read_school_reference(&path)?))
}

/// Apply the configured school/field interest lists.
fn select_choices(choices: &[Choice], config: &Config) -> Vec<Choice> {
    choices
        .iter()
        .filter(|c| {
            config
                .schools_of_interest
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| *id == c.institution_id))
        })
        .filter(|c| {
            config
                .fields_of_interest
                .as_ref()
                .map_or(true, |codes| codes.iter().any(|code| *code == c.field_code))
        })
        .cloned()
        .collect()
}

fn compute_group_kpis(
    choices: &[Choice],
    capacity: &CapacityTable,
    schools: &SchoolReference,
    round: u32,
) -> Result<Vec<GroupSummary>> {
    let mut summaries = Vec::new();
    for (key, rows) in breakdown::group_by_school_field(choices) {
        let planned = capacity.lookup(schools, &key.institution_id, &key.field_code, round);
        let scope = KpiScope::SchoolField {
            institution_id: key.institution_id.clone(),
            field_code: key.field_code.clone(),
        };
        let kpi = analyzer::compute_scoped(&scope, &rows, planned)?;
        summaries.push(GroupSummary {
            school_name: rows[0].school_name.clone(),
            field_label: rows[0].field_label.clone(),
            key,
            kpi,
        });
    }
    Ok(summaries)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
}

fn generate_choices_csv(choices: &[Choice], output_dir: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_dir.join("choices.csv"))?;
    for choice in choices {
        writer.serialize(choice)?;
    }
    writer.flush()?;
    Ok(())
}

fn generate_kpi_summary_csv(summaries: &[GroupSummary], output_dir: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_dir.join("kpi_summary.csv"))?;

    writer.write_record([
        "Institution",
        "School",
        "Field Code",
        "Field",
        "Applications",
        "Admitted",
        "Planned Capacity",
        "Success Rate",
        "Competition Index",
        "Pure Demand Index",
        "Fullness Rate",
        "Vacant Seats",
        "Min Score",
        "Avg Admitted",
        "Elite Avg",
        "Bottom 25 Avg",
        "Talent Gap",
        "P1 Loyalty",
        "Interest P1 %",
        "Intake P1 %",
        "Intake P3+ %",
        "Release Rate",
        "Boundary Density",
        "Capacity Rejected",
        "Lost To Higher Priority",
        "Failed Conditions",
        "Gave Up",
    ])?;

    for summary in summaries {
        let kpi = &summary.kpi;
        writer.write_record([
            summary.key.institution_id.clone(),
            summary.school_name.clone(),
            summary.key.field_code.clone(),
            summary.field_label.clone(),
            kpi.total_apps.to_string(),
            kpi.total_admitted.to_string(),
            kpi.planned_capacity.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            format!("{:.1}", kpi.success_rate),
            format!("{:.2}", kpi.competition_index),
            format!("{:.2}", kpi.pure_demand_index),
            format!("{:.1}", kpi.fullness_rate),
            kpi.vacant_seats.to_string(),
            fmt_opt(kpi.min_score),
            fmt_opt(kpi.avg_admitted),
            fmt_opt(kpi.elite_avg),
            fmt_opt(kpi.bottom_25_avg),
            format!("{:.1}", kpi.talent_gap),
            format!("{:.1}", kpi.p1_loyalty),
            format!("{:.1}", kpi.interest_p1_pct),
            format!("{:.1}", kpi.intake_p1_pct),
            format!("{:.1}", kpi.intake_p3p_pct),
            format!("{:.1}", kpi.release_rate),
            kpi.boundary_density.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            kpi.cap_count.to_string(),
            kpi.lost_count.to_string(),
            kpi.fail_count.to_string(),
            kpi.gave_up_count.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn generate_reason_breakdown_csv(choices: &[Choice], output_dir: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_dir.join("reason_breakdown.csv"))?;
    writer.write_record(["School", "Field", "Total Applications", "Last Admitted Score", "Outcome", "Count / Avg"])?;

    for (key, rows) in breakdown::group_by_school_field(choices) {
        let group = breakdown::reason_breakdown(&key, &rows);
        for bucket in &group.buckets {
            writer.write_record([
                group.school_name.clone(),
                group.field_label.clone(),
                group.total_count.to_string(),
                fmt_opt(group.min_score),
                bucket.bucket.to_string(),
                bucket.display_value(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn generate_outflow_csv(choices: &[Choice], output_dir: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_dir.join("outflow.csv"))?;
    writer.write_record(["School", "Field", "Admitted Instead At", "Applicants", "Avg Score"])?;

    for (_, rows) in breakdown::group_by_school_field(choices) {
        for entry in breakdown::outflow(&rows) {
            writer.write_record([
                rows[0].school_name.clone(),
                rows[0].field_label.clone(),
                entry.destination,
                entry.count.to_string(),
                fmt_opt(entry.avg_points_regular),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn print_summary(summaries: &[GroupSummary]) {
    let mut ranked: Vec<&GroupSummary> = summaries.iter().collect();
    ranked.sort_by(|a, b| b.kpi.pure_demand_index.total_cmp(&a.kpi.pure_demand_index));

    println!("   📈 Most demanded fields (pure demand index):");
    for (i, summary) in ranked.iter().take(10).enumerate() {
        println!(
            "   {}. {}, {}: {:.2} (cutoff {}, {} / {} admitted)",
            i + 1,
            summary.school_name,
            summary.field_label,
            summary.kpi.pure_demand_index,
            fmt_opt(summary.kpi.min_score),
            summary.kpi.total_admitted,
            summary.kpi.total_apps,
        );
    }
}

// Clean up previous results from output directory
fn clean_output_directory(output_dir: &str, rounds: &[u32]) -> Result<()> {
    let output_path = Path::new(output_dir);

    if !output_path.exists() {
        return Ok(());
    }

    println!("🧹 Cleaning previous results...");

    for round in rounds {
        let item_path = output_path.join(format!("kolo{}", round));
        if item_path.is_dir() {
            fs::remove_dir_all(&item_path)?;
            println!("   🗑️  Removed directory: kolo{}", round);
        }
    }

    println!("   ✅ Output directory cleaned");
    Ok(())
}
