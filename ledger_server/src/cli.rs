use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty. Returns true if help was printed.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // LEDGER_CHAIN_RPC_URLS is left out on purpose. Provider URLs usually carry API keys.
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "LEDGER_DATABASE_URL",
        "LEDGER_DB_MAX_CONNECTIONS",
        "LEDGER_RUN_MIGRATIONS",
        "LEDGER_POLL_INTERVAL_MS",
        "LEDGER_ORACLE_MAX_ATTEMPTS",
        "LEDGER_BACKOFF_BASE_MS",
        "LEDGER_BACKOFF_MAX_MS",
        "LEDGER_ORACLE_CONCURRENCY",
        "LEDGER_SWEEP_INTERVAL_SECS",
        "LEDGER_SWEEP_BATCH_SIZE",
        "LEDGER_SWEEP_MIN_AGE_SECS",
        "LEDGER_SHUTDOWN_TIMEOUT_SECS",
        "LEDGER_FORCED_SHUTDOWN_SECS",
        "LEDGER_EVENT_BUFFER_SIZE",
        "LEDGER_CONFIRMATIONS",
        "LEDGER_RPC_TIMEOUT_MS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
