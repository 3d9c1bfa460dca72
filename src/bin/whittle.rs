//! Command line interface of the whittle test case reducer.

use clap::{ArgAction, Parser};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use whittle::{
    split_atoms, Atom, CleanupPolicy, ConcatTestBuilder, Configuration, IndexOrder, OutcomeCache,
    ReduceError, ReduceOptions, Reducer, ReductionLimit, Scheduler, SubprocessTest,
};

/// Semantic exit codes.
struct Exit;

impl Exit {
    /// Reduction finished and the result was written.
    const SUCCESS: i32 = 0;
    /// The reduction itself failed, e.g. the initial input is not
    /// interesting.
    const RUNTIME_ERROR: i32 = 1;
    /// Bad arguments, unreadable input, unusable tester.
    const USER_ERROR: i32 = 2;
}

#[derive(Parser, Debug)]
#[command(
    name = "whittle",
    version,
    about = "Minimises a failing test case while keeping it interesting"
)]
struct Cli {
    /// Test case to be reduced
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Tester executable; exit code 0 marks a candidate interesting
    #[arg(long = "test", value_name = "FILE")]
    test: PathBuf,

    /// Race probes in parallel
    #[arg(short = 'p', long = "parallel", action = ArgAction::SetTrue)]
    parallel: bool,

    /// Maximum number of tester processes to run in parallel
    /// (parallel mode only; default: CPU count)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    /// Merge the subset and complement loops into a single race
    #[arg(short = 'c', long = "combine-loops", action = ArgAction::SetTrue)]
    combine_loops: bool,

    /// Probe complements before subsets
    #[arg(long = "complement-first", action = ArgAction::SetTrue)]
    complement_first: bool,

    /// Ordering of subset probes: forward, backward, skip
    #[arg(long = "subset-iterator", value_name = "NAME", default_value = "forward",
          value_parser = parse_order)]
    subset_iterator: IndexOrder,

    /// Ordering of complement probes: forward, backward, skip
    #[arg(long = "complement-iterator", value_name = "NAME", default_value = "forward",
          value_parser = parse_order)]
    complement_iterator: IndexOrder,

    /// Split factor for granularity escalation
    #[arg(long = "split", value_name = "N", default_value_t = 2)]
    split: usize,

    /// Outcome cache keying: none, config, content
    #[arg(long = "cache", value_name = "NAME", default_value = "config",
          value_parser = parse_cache_mode)]
    cache: CacheMode,

    /// Remove every probe workspace as soon as its verdict is known
    /// (default: keep winning workspaces until superseded)
    #[arg(long = "cleanup", action = ArgAction::SetTrue)]
    cleanup: bool,

    /// Unit granularity of the initial split: line, char
    #[arg(long = "atom", value_name = "NAME", default_value = "line",
          value_parser = parse_atom)]
    atom: Atom,

    /// Kill a tester run that exceeds this many seconds; the probe counts
    /// as uninteresting
    #[arg(long = "timeout", value_name = "SECS")]
    timeout: Option<u64>,

    /// Stop after this many tester invocations, keeping the best result
    #[arg(long = "max-tests", value_name = "N")]
    max_tests: Option<usize>,

    /// Stop after this many seconds, keeping the best result
    #[arg(long = "deadline", value_name = "SECS")]
    deadline: Option<u64>,

    /// Print reduction statistics as JSON on standard output
    #[arg(long = "stats-json", action = ArgAction::SetTrue)]
    stats_json: bool,

    /// Working directory (default: <input>.<timestamp>)
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    out: Option<PathBuf>,

    /// Verbosity of diagnostic messages: error, warn, info, debug, trace
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", default_value = "info",
          value_parser = parse_log_level)]
    log_level: String,

    /// Verbose mode (alias for --log-level debug)
    #[arg(short = 'v', action = ArgAction::SetTrue)]
    verbose: bool,

    /// Quiet mode (alias for --log-level error)
    #[arg(short = 'q', action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheMode {
    None,
    Config,
    Content,
}

fn parse_order(s: &str) -> Result<IndexOrder, String> {
    s.parse()
}

fn parse_atom(s: &str) -> Result<Atom, String> {
    s.parse()
}

fn parse_cache_mode(s: &str) -> Result<CacheMode, String> {
    match s.to_lowercase().as_str() {
        "none" => Ok(CacheMode::None),
        "config" => Ok(CacheMode::Config),
        "content" => Ok(CacheMode::Content),
        other => Err(format!(
            "unknown cache mode '{other}'; valid modes: none, config, content"
        )),
    }
}

fn parse_log_level(s: &str) -> Result<String, String> {
    match s.to_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => Ok(level.to_owned()),
        other => Err(format!(
            "unknown log level '{other}'; valid levels: error, warn, info, debug, trace"
        )),
    }
}

struct Failure {
    code: i32,
    message: String,
}

impl Failure {
    fn user(message: impl Into<String>) -> Self {
        Self {
            code: Exit::USER_ERROR,
            message: message.into(),
        }
    }

    fn runtime(message: impl Into<String>) -> Self {
        Self {
            code: Exit::RUNTIME_ERROR,
            message: message.into(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(result) => {
            info!("result saved to {}", result.display());
            std::process::exit(Exit::SUCCESS);
        }
        Err(failure) => {
            eprintln!("whittle: {}", failure.message);
            std::process::exit(failure.code);
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("whittle={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<PathBuf, Failure> {
    let src = fs::read(&cli.input)
        .map_err(|e| Failure::user(format!("cannot read input {}: {e}", cli.input.display())))?;
    let src = String::from_utf8_lossy(&src);
    let atoms = split_atoms(&src, cli.atom);
    if atoms.is_empty() {
        return Err(Failure::user(format!(
            "input {} is empty",
            cli.input.display()
        )));
    }

    check_tester(&cli.test)?;

    let out = cli.out.clone().unwrap_or_else(|| {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(format!("{}.{stamp}", cli.input.display()))
    });
    let tests_dir = out.join("tests");
    fs::create_dir_all(&tests_dir)
        .map_err(|e| Failure::user(format!("cannot create {}: {e}", tests_dir.display())))?;

    let filename = cli
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "test".to_owned());

    let atom_count = atoms.len();
    info!(
        "reduce session starts for {} ({} {} atoms)",
        cli.input.display(),
        atom_count,
        match cli.atom {
            Atom::Line => "line",
            Atom::Char => "char",
        },
    );

    let builder = Arc::new(ConcatTestBuilder::new(Arc::new(atoms)));

    let mut tester = SubprocessTest::new(
        Arc::clone(&builder),
        cli.test.clone(),
        tests_dir.clone(),
        filename.clone(),
    )
    .with_cleanup(if cli.cleanup {
        CleanupPolicy::All
    } else {
        CleanupPolicy::KeepWinners
    });
    if let Some(secs) = cli.timeout {
        tester = tester.with_timeout(Duration::from_secs(secs));
    }

    let cache = Arc::new(match cli.cache {
        CacheMode::None => OutcomeCache::disabled(),
        CacheMode::Config => OutcomeCache::config(),
        CacheMode::Content => OutcomeCache::content(Arc::clone(&builder)),
    });

    let scheduler = if cli.parallel {
        let jobs = cli.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        });
        Scheduler::Parallel { jobs }
    } else {
        Scheduler::Sequential
    };

    let options = ReduceOptions {
        subset_first: !cli.complement_first,
        combine_loops: cli.combine_loops,
        subset_order: cli.subset_iterator,
        complement_order: cli.complement_iterator,
        split_factor: cli.split,
        ..ReduceOptions::default()
    };

    let mut reducer = Reducer::new(Arc::new(tester), cache, scheduler, options)
        .map_err(|e| Failure::user(e.to_string()))?;
    if cli.max_tests.is_some() || cli.deadline.is_some() {
        let mut limit = ReductionLimit::new();
        if let Some(max_tests) = cli.max_tests {
            limit = limit.with_max_tests(max_tests);
        }
        if let Some(secs) = cli.deadline {
            limit = limit.with_deadline(Duration::from_secs(secs));
        }
        reducer = reducer.with_limit(limit);
    }

    let result = reducer
        .ddmin(Configuration::full(atom_count))
        .map_err(|e| match e {
            ReduceError::InvalidOptions(_) => Failure::user(e.to_string()),
            _ => Failure::runtime(e.to_string()),
        })?;

    info!("{}", result.stats);
    if cli.stats_json {
        let stats = serde_json::to_string_pretty(&result.stats)
            .map_err(|e| Failure::runtime(format!("cannot serialise statistics: {e}")))?;
        println!("{stats}");
    }

    let out_file = out.join(&filename);
    fs::write(&out_file, builder.build(&result.config))
        .map_err(|e| Failure::runtime(format!("cannot write {}: {e}", out_file.display())))?;

    if cli.cleanup {
        let _ = fs::remove_dir_all(&tests_dir);
    }

    Ok(out_file)
}

fn check_tester(test: &Path) -> Result<(), Failure> {
    let metadata = fs::metadata(test)
        .map_err(|e| Failure::user(format!("tester {} is not usable: {e}", test.display())))?;
    if !metadata.is_file() {
        return Err(Failure::user(format!(
            "tester {} is not a regular file",
            test.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(Failure::user(format!(
                "tester {} is not executable",
                test.display()
            )));
        }
    }
    Ok(())
}
