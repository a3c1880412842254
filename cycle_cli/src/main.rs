use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use cycle_core::*;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "repcycle")]
#[command(about = "Training cycle planner and progress tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User whose data to read and write (default: $USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the next training cycle
    Start {
        /// First day of the cycle (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show the active cycle's progress
    Status,

    /// Show the active cycle's workout plan
    Plan,

    /// Mark an exercise of a plan day as done
    Mark {
        /// Plan day index (as shown by `plan`)
        #[arg(long)]
        day: u32,

        #[arg(long)]
        exercise: String,

        /// Remove the mark instead
        #[arg(long)]
        undo: bool,
    },

    /// Abandon the active cycle without archiving it
    Reset,

    /// List completed cycles
    History,

    /// Log a performed set
    Log {
        #[arg(long)]
        exercise: String,

        #[arg(long)]
        weight: f64,

        #[arg(long)]
        reps: u32,

        /// Which set this was
        #[arg(long, default_value_t = 1)]
        set: u32,

        /// Sets planned for the exercise
        #[arg(long, default_value_t = 1)]
        sets: u32,

        /// Average heart rate
        #[arg(long)]
        hr: Option<u32>,

        #[arg(long)]
        calories: Option<f64>,
    },

    /// Per-muscle-group and per-exercise statistics
    Stats,

    /// Training balance insights
    Insights,

    /// Record a body measurement
    Body {
        /// e.g. weight, waist
        #[arg(long)]
        parameter: String,

        #[arg(long)]
        value: f64,
    },

    /// Show how a body measurement changed over time
    Trend {
        #[arg(long)]
        parameter: String,
    },

    /// Print workout dates for a start date and frequency
    Schedule {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// 1x/week, 3x/week, 5x/week or daily
        #[arg(long, default_value = "3x/week")]
        frequency: String,

        /// Number of workout days
        #[arg(
            long,
            default_value_t = 30,
            value_parser = clap::value_parser!(u32).range(0..=cycle_core::schedule::MAX_SCHEDULE_DAYS as i64)
        )]
        days: u32,
    },

    /// Export the set log to CSV
    Export {
        #[arg(long)]
        out: PathBuf,
    },

    /// Rewrite completion marks from the old format
    Migrate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    cycle_core::logging::init_for_verbosity(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    let user = cli.user.clone().unwrap_or_else(default_user);
    tracing::debug!("Using data dir {:?} for user '{}'", data_dir, user);

    // schedule is a pure computation and needs no store
    if let Commands::Schedule {
        start,
        frequency,
        days,
    } = &cli.command
    {
        return cmd_schedule(*start, frequency, *days as usize);
    }

    let catalog = config.load_catalog()?;
    let engine = Engine::new(FileStore::new(data_dir), catalog, config)?;
    let now = Utc::now();

    match cli.command {
        Commands::Start { date } => cmd_start(&engine, &user, date, now),
        Commands::Status => cmd_status(&engine, &user),
        Commands::Plan => cmd_plan(&engine, &user),
        Commands::Mark {
            day,
            exercise,
            undo,
        } => cmd_mark(&engine, &user, day, &exercise, !undo, now),
        Commands::Reset => cmd_reset(&engine, &user),
        Commands::History => cmd_history(&engine, &user),
        Commands::Log {
            exercise,
            weight,
            reps,
            set,
            sets,
            hr,
            calories,
        } => {
            let logged = ExerciseStats {
                id: uuid::Uuid::new_v4(),
                exercise_name: exercise,
                date: now,
                weight,
                reps,
                set_number: set,
                sets,
                avg_heart_rate: hr,
                calories_burned: calories,
            };
            engine.log_set(&user, &logged)?;
            println!(
                "✓ Logged {} x {} @ {} ({} volume)",
                logged.exercise_name,
                logged.reps,
                logged.weight,
                logged.volume()
            );
            Ok(())
        }
        Commands::Stats => cmd_stats(&engine, &user, now),
        Commands::Insights => {
            let insights = engine.insights(&user, now);
            if insights.is_empty() {
                println!("No insights yet - log some sets first.");
            }
            for insight in insights {
                println!("  • {}", insight);
            }
            Ok(())
        }
        Commands::Body { parameter, value } => {
            engine.log_body_measurement(
                &user,
                &BodyMeasurement {
                    parameter: parameter.clone(),
                    date: now,
                    value,
                },
            )?;
            println!("✓ Recorded {} = {}", parameter, value);
            Ok(())
        }
        Commands::Trend { parameter } => cmd_trend(&engine, &user, &parameter),
        Commands::Export { out } => {
            let count = engine.export_stats_csv(&user, &out)?;
            println!("✓ Exported {} sets", count);
            println!("  CSV: {}", out.display());
            Ok(())
        }
        Commands::Migrate => {
            let rewritten = engine.migrate_legacy_keys(&user)?;
            println!("✓ Migrated {} completion marks", rewritten);
            Ok(())
        }
        Commands::Schedule { .. } => Ok(()),
    }
}

fn default_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "default".to_string())
}

/// Local midnight of `date`, as a UTC instant
fn local_start(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

fn cmd_start(
    engine: &Engine<FileStore>,
    user: &str,
    date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<()> {
    let start = date.map(local_start).unwrap_or(now);
    let started = engine.start_new_cycle(user, start)?;

    println!(
        "✓ Started cycle {} on {}",
        started.cycle.cycle_number,
        local_date(started.cycle.start_date)
    );
    println!("  {} workout days planned", started.plan.len());
    for selection in &started.selections {
        println!("  {}: {}", selection.slot, selection.exercises.join(", "));
        if selection.shortfall > 0 {
            println!(
                "    (slot has {} fewer exercises than requested)",
                selection.shortfall
            );
        }
    }
    Ok(())
}

fn cmd_status(engine: &Engine<FileStore>, user: &str) -> Result<()> {
    let cycle = match engine.active_cycle(user)? {
        Some(cycle) => cycle,
        None => {
            println!("No active cycle for {}.", user);
            return Ok(());
        }
    };

    let planned = engine.plan(user)?.map(|p| p.len()).unwrap_or(0);
    println!(
        "Cycle {} (started {})",
        cycle.cycle_number,
        local_date(cycle.start_date)
    );
    println!("  Days completed: {}/{}", cycle.days_completed, planned);
    println!("  Microcycles completed: {}", cycle.completed_microcycles);
    Ok(())
}

fn cmd_plan(engine: &Engine<FileStore>, user: &str) -> Result<()> {
    let plan = match engine.plan(user)? {
        Some(plan) => plan,
        None => {
            println!("No active cycle for {}.", user);
            return Ok(());
        }
    };
    let done = engine.completed_set(user)?;

    println!("Cycle {} plan:", plan.cycle_number);
    for day in &plan.days {
        println!(
            "{:>3}  {}  {}",
            day.day_index,
            local_date(day.date),
            day.slot
        );
        for exercise in &day.exercises {
            let mark = if done.contains(&CompletionKey::new(day.day_index, exercise.as_str())) {
                "x"
            } else {
                " "
            };
            println!("       [{}] {}", mark, exercise);
        }
    }
    Ok(())
}

fn cmd_mark(
    engine: &Engine<FileStore>,
    user: &str,
    day: u32,
    exercise: &str,
    completed: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let progress = engine.mark_exercise(user, day, exercise, completed, now)?;

    if completed {
        println!("✓ Marked {} on day {}", exercise, day);
    } else {
        println!("✓ Unmarked {} on day {}", exercise, day);
    }

    match progress.completed {
        Some(entry) => println!(
            "✓ Cycle {} complete! {} days trained.",
            entry.cycle_number, entry.days_completed
        ),
        None => println!(
            "  Days completed: {} (microcycles: {})",
            progress.days_completed, progress.completed_microcycles
        ),
    }
    Ok(())
}

fn cmd_reset(engine: &Engine<FileStore>, user: &str) -> Result<()> {
    match engine.reset_cycle(user)? {
        Some(cycle) => println!("✓ Reset cycle {}", cycle.cycle_number),
        None => println!("No active cycle for {}.", user),
    }
    Ok(())
}

fn cmd_history(engine: &Engine<FileStore>, user: &str) -> Result<()> {
    let history = engine.cycle_history(user)?;
    if history.is_empty() {
        println!("No completed cycles yet.");
        return Ok(());
    }

    for entry in history {
        println!(
            "Cycle {}: {} -> {} ({} days)",
            entry.cycle_number,
            local_date(entry.start_date),
            local_date(entry.completed_date),
            entry.days_completed
        );
    }
    Ok(())
}

fn cmd_stats(engine: &Engine<FileStore>, user: &str, now: DateTime<Utc>) -> Result<()> {
    println!("Total volume: {:.1}", engine.total_volume(user));
    println!();
    println!("Muscle groups:");
    for summary in engine.muscle_group_summaries(user, now) {
        let last = match summary.days_since_last_workout {
            Some(days) => format!("{} days ago", days),
            None => "never".to_string(),
        };
        println!(
            "  {:<12} volume {:>8.1}  sets {:>3}  max {:>6.1}  last {}",
            summary.muscle_group, summary.total_volume, summary.total_sets, summary.max_weight, last
        );
    }

    let exercises = engine.exercise_summaries(user);
    if !exercises.is_empty() {
        println!();
        println!("Exercises:");
        for summary in exercises {
            println!(
                "  {:<24} volume {:>8.1}  sets {:>3}  best {:>6.1}",
                summary.exercise_name, summary.total_volume, summary.total_sets, summary.best_weight
            );
        }
    }

    let daily = engine.daily_volume(user);
    if !daily.is_empty() {
        println!();
        println!("Daily volume:");
        for (date, volume) in daily {
            println!("  {}  {:>8.1}", date, volume);
        }
    }
    Ok(())
}

fn cmd_trend(engine: &Engine<FileStore>, user: &str, parameter: &str) -> Result<()> {
    let trend = match engine.body_trend(user, parameter) {
        Some(trend) => trend,
        None => {
            println!("No {} measurements recorded.", parameter);
            return Ok(());
        }
    };

    println!(
        "{}: {} -> {} ({:+}) over {} readings",
        trend.parameter, trend.first, trend.last, trend.change, trend.readings
    );
    if let Some(percent) = trend.change_percent {
        println!("  {:+.1}% since {}", percent, local_date(trend.first_date));
    }
    Ok(())
}

fn cmd_schedule(start: NaiveDate, frequency: &str, days: usize) -> Result<()> {
    let frequency = Frequency::parse(frequency);
    let start = Local
        .from_local_datetime(&start.and_time(chrono::NaiveTime::MIN))
        .earliest()
        .ok_or_else(|| Error::Precondition(format!("{} has no local midnight", start)))?;

    for date in generate_schedule(&start, frequency, days) {
        println!("{}", date.date_naive());
    }
    Ok(())
}
