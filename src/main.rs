//! txbind - transaction-scoped connection binding
//!
//! Command-line entry point for managing member balances.

use std::path::PathBuf;
use std::process::ExitCode;

use log::debug;

use txbind::db::{Database, DatabaseConfig, DatabaseResult};
use txbind::repository::Member;
use txbind::transaction::UnitOfWorkKey;

enum Command {
    Seed { id: String, money: i64 },
    Show { id: String },
    Transfer { from: String, to: String, amount: i64 },
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut path = PathBuf::from("txbind.db");
    let mut verbose = false;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--database" => {
                i += 1;
                if i < args.len() {
                    path = PathBuf::from(&args[i]);
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("txbind v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg if arg.starts_with('-') && arg.parse::<i64>().is_err() => {
                eprintln!("Unknown option: {}", arg);
                return ExitCode::FAILURE;
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let command = match parse_command(&positional) {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            eprintln!("Run with --help for usage.");
            return ExitCode::FAILURE;
        }
    };

    let config = DatabaseConfig::new(&path)
        .create_if_missing(true)
        .verbose(verbose);

    let db = match Database::open_with_config(config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error opening database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&db, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let words: Vec<&str> = args.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["seed", id, money] => Ok(Command::Seed {
            id: id.to_string(),
            money: parse_amount(money)?,
        }),
        ["show", id] => Ok(Command::Show { id: id.to_string() }),
        ["transfer", from, to, amount] => Ok(Command::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount: parse_amount(amount)?,
        }),
        [] => Err("missing command".to_string()),
        [name, ..] => Err(format!("unknown command or wrong arguments: {}", name)),
    }
}

fn parse_amount(s: &str) -> Result<i64, String> {
    s.parse().map_err(|_| format!("not a number: {}", s))
}

fn run(db: &Database, command: Command) -> DatabaseResult<()> {
    let key = UnitOfWorkKey::new();
    debug!("running command under unit of work {}", key);

    match command {
        Command::Seed { id, money } => {
            let members = db.members();
            match members.update(&key, &id, money) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    members.save(&key, &Member::new(id.clone(), money))?;
                }
                Err(e) => return Err(e.into()),
            }
            println!("{} = {}", id, money);
        }
        Command::Show { id } => {
            let member = db.members().find_by_id(&key, &id)?;
            print_json(&member);
        }
        Command::Transfer { from, to, amount } => {
            db.member_service().account_transfer(&from, &to, amount)?;
            println!("transferred {} from {} to {}", amount, from, to);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn print_help() {
    println!("txbind - transaction-scoped connection binding");
    println!();
    println!("Usage: txbind [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  seed ID MONEY              Create or reset a member balance");
    println!("  show ID                    Print a member as JSON");
    println!("  transfer FROM TO AMOUNT    Move money between members atomically");
    println!();
    println!("Options:");
    println!("  -d, --database PATH    Path to database file (default: txbind.db)");
    println!("  -v, --verbose          Enable debug logging");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Examples:");
    println!("  txbind seed memberA 10000");
    println!("  txbind transfer memberA memberB 2000");
    println!("  txbind -d bank.db show memberB");
}
