//! crisis-runner: terminal front end for the crisis simulation.
//!
//! Usage:
//!   crisis-runner                              interactive session
//!   crisis-runner --session <id>               reattach after a restart
//!   crisis-runner --list                       list stored sessions
//!   crisis-runner --ipc-mode                   JSON lines on stdin/stdout
//!
//! Options:
//!   --db <path>  --config <file.json>  --model <id>  --temperature <t>

use anyhow::Result;
use crisis_core::{
    config::SimConfig,
    driver::{RoundResultView, SimulationDriver},
    generator::NarrativeGenerator,
    round::Suspension,
    state::Status,
    store::SimStore,
    CheckpointStore, SimError,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Start {
        cause: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    Resume {
        session_id: String,
        reply: String,
    },
    Advance {
        session_id: String,
    },
    Get {
        session_id: String,
    },
    List,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let list_mode = args.iter().any(|a| a == "--list");
    let session = string_arg(&args, "--session");

    let mut config = match string_arg(&args, "--config") {
        Some(path) => SimConfig::load(&path)?,
        None => SimConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(db) = string_arg(&args, "--db") {
        config.store.path = db;
    }
    if let Some(model) = string_arg(&args, "--model") {
        config.generator.model = model;
    }
    config.generator.temperature =
        parse_arg(&args, "--temperature", config.generator.temperature);

    if list_mode {
        return print_sessions(&open_listing_store(&config.store.path)?);
    }

    let mut driver = SimulationDriver::build(&config)?;
    if ipc_mode {
        return run_ipc_loop(&mut driver);
    }

    println!("=== Crisis Simulation ===");
    println!("  model:       {}", config.generator.model);
    println!("  temperature: {}", config.generator.temperature);
    println!("  db:          {}", config.store.path);
    println!();

    run_interactive(&mut driver, session)
}

fn run_interactive<G: NarrativeGenerator, S: CheckpointStore>(
    driver: &mut SimulationDriver<G, S>,
    session: Option<String>,
) -> Result<()> {
    let (session_id, mut suspension) = match session {
        Some(id) => match reattach(driver, &id)? {
            RoundResultView::Suspended { suspension, .. } => (id, suspension),
            final_view => {
                print_round(&final_view);
                return Ok(());
            }
        },
        None => {
            let Some(cause) = read_line("Cause of the crisis (short description): ")? else {
                return Ok(());
            };
            if cause.is_empty() {
                println!("Aborted: no cause given.");
                return Ok(());
            }
            let started = driver.start(&cause)?;
            (started.session_id, started.suspension)
        }
    };
    println!("  session:     {session_id}");

    loop {
        print_wave(&suspension);

        let Some(reply) = read_line("\nYour company response: ")? else {
            println!("\nStopped. Resume later with --session {session_id}");
            return Ok(());
        };
        if reply.is_empty() {
            println!("Note: empty response submitted. It will be rated poorly.");
        }

        let view = driver.resume(&session_id, &reply)?;
        print_round(&view);
        match view {
            RoundResultView::Suspended { suspension: next, .. } => suspension = next,
            RoundResultView::Final { .. } => return Ok(()),
        }
    }
}

/// Pick a stored session back up. A closed session yields its final view
/// instead of an error; an open one is advanced to its pending suspension.
fn reattach<G: NarrativeGenerator, S: CheckpointStore>(
    driver: &mut SimulationDriver<G, S>,
    session_id: &str,
) -> Result<RoundResultView, SimError> {
    match driver.final_view(session_id)? {
        Some(view) => Ok(view),
        None => driver.advance(session_id),
    }
}

/// Listing only reads the store, so no generator (or API key) is needed.
fn open_listing_store(path: &str) -> Result<SimStore> {
    let store = SimStore::open_or_memory(path)?;
    store.migrate()?;
    Ok(store)
}

fn run_ipc_loop<G: NarrativeGenerator>(driver: &mut SimulationDriver<G, SimStore>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Start { cause, session_id } => {
                let started = match session_id {
                    Some(id) => driver.start_with_id(&id, &cause),
                    None => driver.start(&cause),
                };
                started.map(serde_json::to_value)
            }
            IpcCommand::Resume { session_id, reply } => driver
                .resume(&session_id, &reply)
                .map(serde_json::to_value),
            IpcCommand::Advance { session_id } => driver
                .advance(&session_id)
                .map(serde_json::to_value),
            IpcCommand::Get { session_id } => driver
                .checkpoint(&session_id)
                .map(serde_json::to_value),
            IpcCommand::List => driver
                .store()
                .list_sessions()
                .map(serde_json::to_value),
        };

        let line = match reply {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => serde_json::json!({ "error": e.to_string() }),
            Err(e) => ipc_error(&e),
        };
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
    }
    Ok(())
}

fn ipc_error(e: &SimError) -> serde_json::Value {
    if !e.is_protocol_misuse() {
        log::error!("{e}");
    }
    let mut line = serde_json::json!({
        "error": e.to_string(),
        "protocol_misuse": e.is_protocol_misuse(),
    });
    if let Some(session_id) = e.recoverable_session() {
        line["session_id"] = serde_json::Value::from(session_id);
    }
    line
}

fn print_wave(suspension: &Suspension) {
    println!("\n=== Community wave (round {}) ===", suspension.round);
    println!("{}", suspension.community_wave);
    println!("\n{}", suspension.message);
}

fn print_round(view: &RoundResultView) {
    let (last_eval, reputation, iteration, status) = match view {
        RoundResultView::Suspended { last_eval, reputation_score, iteration, .. } => {
            (last_eval, *reputation_score, *iteration, Status::Ongoing)
        }
        RoundResultView::Final { last_eval, reputation_score, iteration, status, .. } => {
            (last_eval, *reputation_score, *iteration, *status)
        }
    };

    if let Some(eval) = last_eval {
        println!("\n--- Evaluation ---");
        println!("Score: {} | Label: {}", eval.score, eval.label);
        if !eval.reasons.is_empty() {
            println!("Reasons: {}", eval.reasons.join("; "));
        }
        if !eval.suggestions.is_empty() {
            println!("Suggestions: {}", eval.suggestions.join("; "));
        }
    }
    println!("Reputation: {reputation} | Round: {iteration} | Status: {status}");

    match status {
        Status::Resolved => println!("\nThe situation calms down. The storm has largely passed."),
        Status::Catastrophe => println!("\nReputation badly damaged. The storm escalates."),
        Status::Ongoing => {}
    }
}

fn print_sessions(store: &SimStore) -> Result<()> {
    let sessions = store.list_sessions()?;
    if sessions.is_empty() {
        println!("(no sessions)");
    }
    for s in sessions {
        println!(
            "{} | {:<26} | {:<11} | rep {:>3} | round {:>2} | {}",
            s.session_id, s.phase, s.status, s.reputation_score, s.iteration, s.cause
        );
    }
    Ok(())
}

/// Prompt and read one trimmed line. `None` on EOF.
fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn string_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisis_core::ScriptedGenerator;

    const GOOD_RESOLVED: &str =
        r#"{"score": 85, "label": "good", "reasons": [], "suggestions": [], "resolved": true, "catastrophe": false}"#;

    #[test]
    fn reattach_to_closed_session_prints_final_view() {
        let mut driver =
            SimulationDriver::build_test(ScriptedGenerator::new().reply("1. wave").reply(GOOD_RESOLVED)).unwrap();
        let started = driver.start("recall").unwrap();
        driver.resume(&started.session_id, "Full refunds, starting today.").unwrap();

        let view = reattach(&mut driver, &started.session_id).unwrap();
        assert!(view.is_final(), "closed session should reattach as final, got {view:?}");
    }

    #[test]
    fn reattach_to_waiting_session_returns_pending_wave() {
        let mut driver = SimulationDriver::build_test(ScriptedGenerator::new().reply("1. wave")).unwrap();
        let started = driver.start("recall").unwrap();

        let view = reattach(&mut driver, &started.session_id).unwrap();
        assert_eq!(view.suspension(), Some(&started.suspension));
        assert_eq!(driver.generator().remaining(), 0);
    }

    #[test]
    fn listing_store_opens_without_a_generator() {
        let store = open_listing_store(":memory:").unwrap();
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn flags_are_read_in_pairs() {
        let args: Vec<String> = ["crisis-runner", "--db", "x.sqlite", "--temperature", "hot"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(string_arg(&args, "--db").as_deref(), Some("x.sqlite"));
        assert_eq!(string_arg(&args, "--model"), None);
        assert_eq!(parse_arg(&args, "--temperature", 0.7), 0.7);
    }
}
