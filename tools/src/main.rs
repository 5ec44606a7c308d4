//! referral-runner: headless driver for the referral engine.
//!
//! Usage:
//!   referral-runner --db referrals.db --seed-demo 20
//!   referral-runner --db referrals.db --ipc-mode

use anyhow::Result;
use referral_core::{
    config::EngineConfig, history::HistoryRequest, LedgerResult, ReferralEngine,
};
use serde::Serialize;
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Register {
        display_name:  String,
        contact:       String,
        #[serde(default)]
        referral_code: Option<String>,
    },
    Verify {
        account_id: String,
    },
    Stats {
        account_id: String,
    },
    History {
        account_id: String,
        #[serde(default)]
        request:    HistoryRequest,
    },
    Leaderboard {
        #[serde(default)]
        page:      u32,
        #[serde(default)]
        page_size: u32,
    },
    Analytics {
        account_id:  String,
        #[serde(default)]
        period_days: u32,
    },
    Validate {
        code: String,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed_demo = parse_arg(&args, "--seed-demo", 0u32);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    if !ipc_mode {
        println!("referral-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!("  seed_demo: {seed_demo}");
        println!();
    }

    let config = match EngineConfig::load(data_dir) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{e:#}; using built-in defaults");
            EngineConfig::default()
        }
    };

    let db_effective = effective_db(db);
    let mut engine = ReferralEngine::open(&db_effective, config)?;

    if seed_demo > 0 {
        seed_demo_data(&mut engine, seed_demo)?;
    }

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        print_summary(&engine)?;
    }

    Ok(())
}

/// `referrers` verified referrers, referrer i bringing in
/// `(i * 7) % 13 + 1` verified sign-ups.
fn seed_demo_data(engine: &mut ReferralEngine, referrers: u32) -> Result<()> {
    let mut credited = 0u64;
    for i in 0..referrers {
        let name = format!("Demo Referrer {i}");
        let reg = engine.register_account(&name, &format!("demo{i}@example.com"), None)?;
        let referrer_id = reg.account.account_id;
        engine.set_verified(&referrer_id, true)?;

        for j in 0..(i * 7) % 13 + 1 {
            let friend = engine.register_account(
                &format!("Friend {i}-{j}"),
                &format!("friend{i}_{j}@example.com"),
                Some(&reg.account.referral_code),
            )?;
            if let Some(outcome) = engine.handle_user_verified(&friend.account.account_id)? {
                credited += outcome.coins_earned;
            }
        }
    }
    log::info!("seeded {referrers} referrers, {credited} coins credited");
    Ok(())
}

fn run_ipc_loop(engine: &mut ReferralEngine) -> Result<()> {
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
            IpcCommand::Register { display_name, contact, referral_code } => respond(
                engine.register_account(&display_name, &contact, referral_code.as_deref()),
            ),
            IpcCommand::Verify { account_id } => respond(engine.handle_user_verified(&account_id)),
            IpcCommand::Stats { account_id } => respond(engine.get_stats(&account_id)),
            IpcCommand::History { account_id, request } => {
                respond(engine.get_history(&account_id, &request))
            }
            IpcCommand::Leaderboard { page, page_size } => {
                respond(engine.get_leaderboard(page, page_size))
            }
            IpcCommand::Analytics { account_id, period_days } => {
                respond(engine.get_analytics(&account_id, period_days))
            }
            IpcCommand::Validate { code } => respond(engine.validate_code(&code)),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

/// One reply line: the payload, or `{"error": ...}` for a failed call.
fn respond<T: Serialize>(result: LedgerResult<T>) -> serde_json::Value {
    match result.map(serde_json::to_value) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => serde_json::json!({ "error": e.to_string() }),
        Err(e) => {
            log::debug!("ipc command failed: {e}");
            serde_json::json!({ "error": e.to_string(), "transient": e.is_transient() })
        }
    }
}

fn print_summary(engine: &ReferralEngine) -> Result<()> {
    let board = engine.get_leaderboard(1, 10)?;

    println!("=== LEADERBOARD (top {}) ===", board.entries.len());
    println!("  ranked accounts: {}", board.pagination.total_items);
    if board.entries.is_empty() {
        println!("  (No referrals credited yet)");
    }
    for e in &board.entries {
        println!(
            "  #{:<3} {:<24} {:<12} referrals: {:<4} coins: {}",
            e.rank, e.name, e.referral_code, e.referral_count, e.coin_balance
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

/// `:memory:` becomes a named shared-cache database so a forked
/// connection sees the same data. Paths pass through.
fn effective_db(db: &str) -> String {
    if db == ":memory:" {
        format!("file:referrals_{}?mode=memory&cache=shared", unix_seconds())
    } else {
        db.to_string()
    }
}

fn unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
