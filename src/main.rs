// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Remora CLI - intercepting proxy for security testing
//!
//! Manages rewrite rules, runs the proxy headless, and drives bulk replay.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use remora::replay::ReplayExecutor;
use remora::{ConfigStore, ProxyEngine};

const CONFIG_FILE: &str = "intercept_config.json";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("remora=info".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    match args[1].as_str() {
        "list" => list_rules(),
        "add" => add_rule(&args[2..]),
        "remove" => remove_rule(&args[2..]),
        "toggle" => toggle_rule(&args[2..]),
        "run" => run_proxy().await,
        "send" => send_bulk(&args[2..]).await,
        "--help" | "-h" | "help" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "--version" | "-v" | "version" => {
            println!("remora {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_usage();
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    println!(
        r#"Remora - Intercepting HTTP/HTTPS Proxy for Security Testing

USAGE:
    remora <COMMAND> [OPTIONS]

COMMANDS:
    list                              List configured rewrite rules
    add --host H --path P --param N --value V
                                      Add a rewrite rule
    remove <index>                    Remove a rule (1-based index)
    toggle <index>                    Enable/disable a rule (1-based index)
    run                               Run the proxy headless on the configured port
    send --url U --file F --param N [--threads T]
                                      Bulk GET replay with values from a file
    help                              Show this help message
    version                           Show version information

EXAMPLES:
    remora add --host example.com --path /search --param q --value hacked
    remora run
    remora send --url https://example.com/api --param id --file ids.txt --threads 10

Rules and the listen port live in {CONFIG_FILE}.
"#
    );
}

/// Pull the value following `--name` out of an argument list
fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn list_rules() -> ExitCode {
    let config = ConfigStore::load(CONFIG_FILE);
    let rules = config.rules();

    if rules.is_empty() {
        println!("No rules configured.");
        return ExitCode::SUCCESS;
    }

    println!(
        "{:<4} {:<9} {:<25} {:<20} {:<20} VALUE",
        "#", "STATUS", "HOST", "PATH", "PARAM"
    );
    println!("{}", "-".repeat(100));
    for (i, rule) in rules.iter().enumerate() {
        let status = if rule.enabled { "active" } else { "disabled" };
        println!(
            "{:<4} {:<9} {:<25} {:<20} {:<20} {}",
            i + 1,
            status,
            rule.host,
            rule.path,
            rule.param_name,
            rule.param_value
        );
    }
    ExitCode::SUCCESS
}

fn add_rule(args: &[String]) -> ExitCode {
    let (host, path, param, value) = match (
        flag(args, "--host"),
        flag(args, "--path"),
        flag(args, "--param"),
        flag(args, "--value"),
    ) {
        (Some(h), Some(p), Some(n), Some(v)) => (h, p, n, v),
        _ => {
            eprintln!("Usage: remora add --host H --path P --param N --value V");
            return ExitCode::from(1);
        }
    };

    let config = ConfigStore::load(CONFIG_FILE);
    match config.add_rule(&host, &path, &param, &value) {
        Ok(()) => {
            println!("Rule added.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to add rule: {e}");
            ExitCode::from(1)
        }
    }
}

/// Parse a 1-based rule index argument
fn parse_index(args: &[String]) -> Option<usize> {
    args.first()
        .and_then(|a| a.parse::<usize>().ok())
        .filter(|i| *i >= 1)
        .map(|i| i - 1)
}

fn remove_rule(args: &[String]) -> ExitCode {
    let Some(index) = parse_index(args) else {
        eprintln!("Usage: remora remove <index>");
        return ExitCode::from(1);
    };

    let config = ConfigStore::load(CONFIG_FILE);
    match config.remove_rule(index) {
        Ok(()) => {
            println!("Rule #{} removed.", index + 1);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to remove rule: {e}");
            ExitCode::from(1)
        }
    }
}

fn toggle_rule(args: &[String]) -> ExitCode {
    let Some(index) = parse_index(args) else {
        eprintln!("Usage: remora toggle <index>");
        return ExitCode::from(1);
    };

    let config = ConfigStore::load(CONFIG_FILE);
    match config.toggle_rule(index) {
        Ok(enabled) => {
            println!(
                "Rule #{} is now {}.",
                index + 1,
                if enabled { "active" } else { "disabled" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to toggle rule: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run_proxy() -> ExitCode {
    let config = Arc::new(ConfigStore::load(CONFIG_FILE));
    let engine = match ProxyEngine::new(config.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("Failed to start proxy: {e}");
            return ExitCode::from(1);
        }
    };

    println!("Proxy listening on http://127.0.0.1:{}", config.port());
    println!("Install the CA from http://mitm.it (through the proxy). Ctrl+C to stop.");

    let run_engine = engine.clone();
    let server = tokio::spawn(async move { run_engine.run().await });

    if tokio::signal::ctrl_c().await.is_ok() {
        println!("\nShutting down...");
        engine.stop();
    }

    match server.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("Proxy error: {e}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("Proxy task failed: {e}");
            ExitCode::from(1)
        }
    }
}

async fn send_bulk(args: &[String]) -> ExitCode {
    let (url, file, param) = match (
        flag(args, "--url"),
        flag(args, "--file"),
        flag(args, "--param"),
    ) {
        (Some(u), Some(f), Some(p)) => (u, f, p),
        _ => {
            eprintln!("Usage: remora send --url U --file F --param N [--threads T]");
            return ExitCode::from(1);
        }
    };
    let threads = flag(args, "--threads")
        .and_then(|t| t.parse::<usize>().ok())
        .unwrap_or(10);

    let values: Vec<String> = match std::fs::read_to_string(&file) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(e) => {
            eprintln!("Cannot read {file}: {e}");
            return ExitCode::from(1);
        }
    };
    if values.is_empty() {
        eprintln!("{file} holds no values.");
        return ExitCode::from(1);
    }

    let executor = match ReplayExecutor::direct() {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("Failed to build sender: {e}");
            return ExitCode::from(1);
        }
    };

    println!("Sending {} requests to {url} with {threads} workers", values.len());
    let results = executor.run_bulk_get(&url, &param, values, threads).await;
    let failed = results.iter().filter(|(_, s)| s.is_none()).count();
    println!("Done: {} sent, {failed} failed.", results.len());

    if failed == results.len() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
