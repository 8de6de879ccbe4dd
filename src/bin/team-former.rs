use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
#[cfg(feature = "highs")]
use team_former::cp::HighsSolver;
use team_former::error::{FormationError, RosterError};
use team_former::roster::{read_roster_csv, write_teams_csv, ColumnMap};
use team_former::teams::{
    Bounds, FormationFailure, TeamFormer, DEFAULT_MAX_TEAM_SIZE, DEFAULT_MIN_TEAM_SIZE,
    DEFAULT_SEED, DEFAULT_WAM_WEIGHT,
};
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Allocate students to the fewest lab-homogeneous, gender-safe teams, balanced by score."
)]
struct Cli {
    /// Student roster (CSV with a header row).
    #[arg(short, long, default_value = "students.csv", value_name = "PATH")]
    input: PathBuf,

    /// Where to write the roster with a `team` column appended.
    #[arg(short, long, default_value = "class_teams.csv", value_name = "PATH")]
    output: PathBuf,

    /// Weight of score balancing relative to team count.
    #[arg(long, default_value_t = DEFAULT_WAM_WEIGHT, value_name = "FLOAT")]
    wam_weight: f64,

    /// Smallest allowed team.
    #[arg(long, default_value_t = DEFAULT_MIN_TEAM_SIZE, value_name = "NUM")]
    min_team_size: usize,

    /// Largest allowed team.
    #[arg(long, default_value_t = DEFAULT_MAX_TEAM_SIZE, value_name = "NUM")]
    max_team_size: usize,

    /// Size of the team-number pool. Defaults to students / min_team_size.
    #[arg(long, value_name = "NUM")]
    max_teams: Option<usize>,

    /// Time budget for the whole run, in seconds.
    #[arg(long, default_value_t = 60, value_name = "SECS")]
    max_solve_time: u64,

    /// Solver seed.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Optimization back end.
    #[arg(long, value_enum, default_value_t = Backend::Search)]
    solver: Backend,

    /// Portfolio workers per lab (effective with the `parallel` feature).
    #[arg(short = 'j', long, default_value_t = 1, value_name = "NUM")]
    workers: usize,

    /// Column holding the lab label.
    #[arg(long, default_value = "lab", value_name = "NAME")]
    lab_column: String,

    /// Column holding the gender category.
    #[arg(long, default_value = "gender", value_name = "NAME")]
    gender_column: String,

    /// Column holding the score.
    #[arg(long, default_value = "wam", value_name = "NAME")]
    score_column: String,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// Built-in branch and bound with neighbourhood search.
    Search,
    /// HiGHS MIP solver (needs the `highs` feature).
    Highs,
}

#[derive(Debug, Error)]
enum CliError {
    #[cfg_attr(feature = "highs", allow(dead_code))]
    #[error("the '{0}' solver is not compiled in; rebuild with `--features {0}`")]
    Unavailable(&'static str),

    #[error("cannot open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Formation(#[from] FormationError),

    #[error(transparent)]
    Unallocated(#[from] FormationFailure),
}

fn setup_logging(verbosity: u8, quiet: bool) {
    let level_filter = if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(level_filter)
        .with(stderr_layer)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let columns = ColumnMap {
        lab: cli.lab_column,
        gender: cli.gender_column,
        score: cli.score_column,
    };
    let file = File::open(&cli.input).map_err(|source| CliError::Open {
        path: cli.input.display().to_string(),
        source,
    })?;
    let table = read_roster_csv(BufReader::new(file), &columns)?;

    let mut bounds = Bounds::for_roster(&table.roster, cli.min_team_size, cli.max_team_size)
        .with_wam_weight(cli.wam_weight)
        .with_max_solve_time(Duration::from_secs(cli.max_solve_time));
    if let Some(max_teams) = cli.max_teams {
        bounds = bounds.with_max_teams(max_teams);
    }
    debug!(?bounds, "formation bounds");

    let former = TeamFormer::new(bounds)
        .with_seed(cli.seed)
        .with_workers(cli.workers);
    let formation = match cli.solver {
        Backend::Search => former.form(&table.roster)?,
        #[cfg(feature = "highs")]
        Backend::Highs => former.with_solver(HighsSolver::new()).form(&table.roster)?,
        #[cfg(not(feature = "highs"))]
        Backend::Highs => return Err(CliError::Unavailable("highs")),
    };
    let assignment = formation.assignment()?;

    let out = File::create(&cli.output).map_err(|source| CliError::Open {
        path: cli.output.display().to_string(),
        source,
    })?;
    write_teams_csv(BufWriter::new(out), &table, &assignment)?;

    info!(status = %assignment.status, "teams written");
    println!("{} teams formed ({}).", assignment.team_count(), assignment.status);
    println!("Teams saved to {}", cli.output.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_library() {
        let cli = Cli::parse_from(["team-former"]);
        assert_eq!(cli.min_team_size, 4);
        assert_eq!(cli.max_team_size, 5);
        assert_eq!(cli.max_solve_time, 60);
        assert!((cli.wam_weight - 0.05).abs() < 1e-12);
        assert_eq!(cli.score_column, "wam");
        assert!(cli.max_teams.is_none());
        assert_eq!(cli.solver, Backend::Search);
    }

    #[cfg(not(feature = "highs"))]
    #[test]
    fn run_rejects_missing_back_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("students.csv");
        std::fs::write(&input, "gender,wam,lab\nM,70,1\nM,60,1\n").unwrap();

        let cli = Cli::parse_from([
            "team-former",
            "--input",
            input.to_str().unwrap(),
            "--min-team-size",
            "2",
            "--solver",
            "highs",
        ]);
        let err = run(cli).unwrap_err();
        assert!(matches!(err, CliError::Unavailable("highs")));
    }

    #[test]
    fn run_writes_teams() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("students.csv");
        let output = dir.path().join("teams.csv");
        std::fs::write(
            &input,
            "name,gender,wam,lab\na,M,70,1\nb,M,60,1\nc,F,80,1\nd,F,50,1\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "team-former",
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--min-team-size",
            "2",
            "--max-solve-time",
            "5",
        ]);
        run(cli).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("name,gender,wam,lab,team"));
        assert_eq!(written.lines().count(), 5);
    }

    #[test]
    fn run_reports_unallocated_labs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("students.csv");
        std::fs::write(&input, "gender,wam,lab\nM,70,1\nF,60,1\n").unwrap();

        let cli = Cli::parse_from([
            "team-former",
            "--input",
            input.to_str().unwrap(),
            "--output",
            dir.path().join("out.csv").to_str().unwrap(),
            "--min-team-size",
            "3",
        ]);
        let err = run(cli).unwrap_err();
        assert!(matches!(err, CliError::Unallocated(_)));
        assert!(err.to_string().contains("lower min_team_size"));
    }
}
