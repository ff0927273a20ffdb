use anyhow::{Context, Result};
use attendance_analyzer::models::Config;
use attendance_analyzer::oracle::{GeminiOracle, StaticOracle};
use attendance_analyzer::reader::SheetReader;
use attendance_analyzer::{AnalysisError, AnalysisOptions, AnalysisSession, LowAttendanceReport};
use clap::{value_parser, Arg, Command};
use std::fs;
use std::path::Path;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr, user-facing output to stdout
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("attendance-analyzer")
        .version("1.0")
        .about("Lists students below an attendance threshold in an attendance sheet")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Attendance sheet (.csv, .xlsx, .xls, .ods, .html)")
                .required(true),
        )
        .arg(
            Arg::new("min-percentage")
                .short('m')
                .long("min-percentage")
                .value_name("PERCENT")
                .help("Minimum attendance percentage required")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory (overrides the configuration)"),
        )
        .arg(
            Arg::new("header-rows")
                .long("header-rows")
                .value_name("ROWS")
                .help("Header row numbers, e.g. 5,6,7 (skips the header oracle)")
                .value_delimiter(',')
                .value_parser(value_parser!(usize))
                .requires("subject-row"),
        )
        .arg(
            Arg::new("subject-row")
                .long("subject-row")
                .value_name("ROW")
                .help("Row number holding the subject names")
                .value_parser(value_parser!(usize))
                .requires("header-rows"),
        )
        .arg(
            Arg::new("subject")
                .short('s')
                .long("subject")
                .value_name("KEY")
                .help("Print the students listed for one subject key"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let mut config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        println!("⚠️  Please review {} and run the program again.", config_file);
        return Ok(());
    };

    // Command-line flags override the file
    if let Some(min_percentage) = matches.get_one::<f64>("min-percentage") {
        config.min_percentage = *min_percentage;
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_directory = Some(output.clone());
    }
    // Validate configuration
    if !(0.0..=100.0).contains(&config.min_percentage) {
        println!("❌ Error: min_percentage must be between 0 and 100, got {}", config.min_percentage);
        return Ok(());
    }

    let input = matches
        .get_one::<String>("input")
        .context("--input is required")?;
    let output_dir = config.output_directory.as_deref().unwrap_or("output").to_string();

    println!("📂 Reading attendance sheet: {}", input);
    println!("🎯 Minimum attendance: {}%", config.min_percentage);

    // Read the sheet as-is, no header assumed
    let raw = match SheetReader::new().read_file(Path::new(input)) {
        Ok(raw) => raw,
        Err(e) => {
            println!("❌ Failed to read file: {}", e);
            return Ok(());
        }
    };
    println!("   ✅ Read {} rows", raw.rows.len());

    let options = AnalysisOptions::from(&config);
    let header_rows: Option<Vec<usize>> = matches
        .get_many::<usize>("header-rows")
        .map(|rows| rows.copied().collect());
    let subject_row = matches.get_one::<usize>("subject-row").copied();

    // Explicit rows skip the oracle
    let outcome = match (header_rows, subject_row) {
        (Some(rows), Some(subject)) => {
            println!("🧭 Using header rows {:?} and subject row {}", rows, subject);
            let oracle = StaticOracle::from_rows(&rows, subject);
            AnalysisSession::run(&oracle, raw, &options).await
        }
        _ => {
            println!("🤖 Asking the header oracle for the sheet layout...");
            match GeminiOracle::from_config(&config.oracle) {
                Ok(oracle) => AnalysisSession::run(&oracle, raw, &options).await,
                Err(e) => Err(e),
            }
        }
    };

    let session = match outcome {
        Ok(session) => session,
        Err(e) => {
            report_failure(&e);
            return Ok(());
        }
    };

    if !session.extraction.status.is_success() {
        println!("❌ Summarization failed: {}", session.extraction.status.as_str());
        return Ok(());
    }

    // Create output directory if it doesn't exist
    fs::create_dir_all(&output_dir)?;

    // Clean up previous results
    clean_output_directory(&output_dir)?;

    // Generate reports
    generate_report_json(&session.extraction.report, &output_dir)?;
    generate_preview_csv(&session, &output_dir)?;
    generate_subject_csvs(&session.extraction.report, &output_dir)?;

    print_summary(&session, config.min_percentage);

    if let Some(subject) = matches.get_one::<String>("subject") {
        println!("\n📋 Students with attendance shortage in {}:", subject);
        println!("{}", session.select(subject));
    }

    println!("\n✅ Analysis complete!");
    println!("📂 Results: {}", output_dir);
    Ok(())
}

fn report_failure(e: &AnalysisError) {
    error!(kind = e.kind(), error = %e, "analysis failed");
    println!("❌ {}", e);
    if e.is_retryable() {
        println!("   🔁 The sheet layout could not be worked out. Please retry.");
    }
}

fn generate_report_json(report: &LowAttendanceReport, output_dir: &str) -> Result<()> {
    let content = report.to_json_pretty()?;
    fs::write(Path::new(output_dir).join("report.json"), content)?;
    Ok(())
}

fn generate_preview_csv(session: &AnalysisSession, output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join("preview.csv");
    let mut writer = csv::Writer::from_path(csv_path)?;
    session.aggregated.write_csv(&mut writer)?;
    Ok(())
}

fn generate_subject_csvs(report: &LowAttendanceReport, output_dir: &str) -> Result<()> {
    use csv::Writer;

    let subjects_dir = Path::new(output_dir).join("subjects");
    fs::create_dir_all(&subjects_dir)?;

    for subject in report.subjects() {
        let csv_path = subjects_dir.join(format!("{}.csv", subject.key));
        let mut writer = Writer::from_path(csv_path)?;

        // Write headers
        writer.write_record(["Student", "Percentage"])?;

        // Write data
        for student in &subject.students {
            let percentage = student.percentage.to_string();
            writer.write_record([student.student.as_str(), percentage.as_str()])?;
        }

        writer.flush()?;
    }

    Ok(())
}

fn print_summary(session: &AnalysisSession, min_percentage: f64) {
    println!("\n📊 SUMMARY");
    println!("==========\n");

    let spec = &session.resolution.spec;
    println!("🧭 Header rows: {:?}, subject row: {}", spec.header_rows, spec.subject_row);
    println!("📚 Subjects: {}", session.catalog.subjects.join(", "));
    println!("👥 Rows analysed: {}", session.aggregated.row_count());

    println!("\n📉 Students below {}%:", min_percentage);
    for subject in session.extraction.report.subjects() {
        if subject.students.is_empty() {
            println!("   ✅ {}: none", subject.key);
        } else {
            println!("   ❌ {}: {}", subject.key, subject.students.len());
        }
    }

    if !session.extraction.skipped_columns.is_empty() {
        println!(
            "\n⚠️  Skipped non-numeric columns: {}",
            session.extraction.skipped_columns.join(", ")
        );
    }
}

fn clean_output_directory(output_dir: &str) -> Result<()> {
    let output_path = Path::new(output_dir);

    if !output_path.exists() {
        return Ok(());
    }

    println!("🧹 Cleaning previous results...");

    let items_to_clean = ["report.json", "preview.csv", "subjects"];

    for item in &items_to_clean {
        let item_path = output_path.join(item);

        if item_path.is_file() {
            fs::remove_file(&item_path)?;
            println!("   🗑️  Removed file: {}", item);
        } else if item_path.is_dir() {
            fs::remove_dir_all(&item_path)?;
            println!("   🗑️  Removed directory: {}", item);
        }
    }

    println!("   ✅ Output directory cleaned");
    Ok(())
}
