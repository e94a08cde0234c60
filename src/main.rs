//! Resource-allocation simulator CLI
//!
//! Replays a scripted workload of resource operations under an optimistic
//! FIFO allocator, a conservative Banker's-algorithm allocator, or both,
//! and prints per-task and system-wide waiting statistics.
//!
//! # Output Format
//!
//! One section per policy: the policy name, abort notes if any, then
//! `Task <id>  <total>  <wait>  <wait%>` rows (or `aborted`) and a `total`
//! row over non-aborted tasks. `--json` emits the reports as JSON instead.
//!
//! # Exit Codes
//!
//! - `0`: All requested runs completed.
//! - `1`: I/O or script error, or a run stalled without progress.
//! - `2`: Invalid arguments.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use allocator_rs::{
    parse_program, Banker, Fifo, Program, RunReport, SimConfig, SimError, Simulation,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum PolicyKind {
    Fifo,
    Banker,
}

fn print_usage(exe: &std::ffi::OsStr) {
    eprintln!(
        "usage: {} [OPTIONS] <script>

OPTIONS:
    --policy=<fifo|banker|both>  Which allocator(s) to run (default: both)
    --max-cycles=<N>             Stall guard in cycles (default: 100000)
    --json                       Emit reports as JSON
    --help, -h                   Show this help message",
        exe.to_string_lossy()
    );
}

fn run_one(program: &Program, kind: PolicyKind, cfg: SimConfig) -> Result<RunReport, SimError> {
    match kind {
        PolicyKind::Fifo => Simulation::new(program, Fifo, cfg).run(),
        PolicyKind::Banker => Simulation::new(program, Banker, cfg).run(),
    }
}

fn main() {
    let mut args = env::args_os();
    let exe = args.next().unwrap_or_else(|| "allocator-rs".into());
    let mut path: Option<PathBuf> = None;
    let mut policies = vec![PolicyKind::Fifo, PolicyKind::Banker];
    let mut max_cycles: Option<u64> = None;
    let mut json = false;

    for arg in args {
        if let Some(flag) = arg.to_str() {
            if let Some(value) = flag.strip_prefix("--policy=") {
                policies = match value {
                    "fifo" => vec![PolicyKind::Fifo],
                    "banker" => vec![PolicyKind::Banker],
                    "both" => vec![PolicyKind::Fifo, PolicyKind::Banker],
                    _ => {
                        eprintln!("invalid --policy value: {}", value);
                        process::exit(2);
                    }
                };
                continue;
            }
            if let Some(value) = flag.strip_prefix("--max-cycles=") {
                let n: u64 = value.parse().unwrap_or_else(|_| {
                    eprintln!("invalid --max-cycles value: {}", value);
                    process::exit(2);
                });
                if n == 0 {
                    eprintln!("--max-cycles must be at least 1");
                    process::exit(2);
                }
                max_cycles = Some(n);
                continue;
            }
            if flag == "--json" {
                json = true;
                continue;
            }
            if flag == "--help" || flag == "-h" {
                print_usage(&exe);
                process::exit(0);
            }
            if flag.starts_with("--") {
                eprintln!("unknown option: {}", flag);
                print_usage(&exe);
                process::exit(2);
            }
        }
        if path.is_some() {
            eprintln!("multiple script paths given");
            print_usage(&exe);
            process::exit(2);
        }
        path = Some(PathBuf::from(arg));
    }

    let Some(path) = path else {
        print_usage(&exe);
        process::exit(2);
    };

    let input = match fs::read_to_string(&path) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("could not read {}: {}", path.display(), err);
            process::exit(1);
        }
    };
    let program = match parse_program(&input) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("script error: {}", err);
            process::exit(1);
        }
    };

    let mut cfg = SimConfig::default();
    if let Some(n) = max_cycles {
        cfg.max_cycles = n;
    }

    let mut failed = false;
    let mut reports = Vec::new();
    for (i, &kind) in policies.iter().enumerate() {
        match run_one(&program, kind, cfg) {
            Ok(report) => {
                if !json {
                    if i > 0 {
                        println!();
                    }
                    println!("{}", report.policy);
                    println!("{}", report.render());
                }
                reports.push(report);
            }
            Err(err) => {
                let name = match kind {
                    PolicyKind::Fifo => "FIFO",
                    PolicyKind::Banker => "BANKER'S",
                };
                eprintln!("{} run failed: {}", name, err);
                failed = true;
            }
        }
    }

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(text) => println!("{}", text),
            Err(err) => {
                eprintln!("could not serialize reports: {}", err);
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}
