//! vexo CLI - manage scheduled jobs in a crontab.

use clap::Parser;
use std::process;
use std::time::Instant;
use vexo::action_log;
use vexo::cli::{Cli, Commands, ConfigCommands, CronCommands};
use vexo::commands::{self, Output};
use vexo::config::{ConfigOverrides, OutputFormat, ResolvedConfig, Settings, resolve_config};
use vexo::crontab::store::{CrontabStore, open_store};
use vexo::{Error, Result, exec, sys};

/// Environment variable holding the tracing filter.
const LOG_ENV: &str = "VEXO_LOG";

fn main() {
    init_tracing();

    let cli = Cli::parse();

    let mut overrides = ConfigOverrides::new();
    if let Some(ref path) = cli.crontab_file {
        overrides = overrides.with_crontab_file(path);
    }
    if let Some(ref user) = cli.user {
        overrides = overrides.with_crontab_user(user);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    let resolved = match resolve_config(&overrides) {
        Ok(resolved) => resolved,
        Err(e) => {
            report_error(&e, cli.human_readable);
            process::exit(1);
        }
    };
    let settings = resolved.settings();
    let human = settings.output_format == OutputFormat::Human;

    // Serialize command for logging
    let (cmd_name, args_json) = serialize_command(&cli.command);

    let store = open_store(&settings);
    let start = Instant::now();

    let result = run_command(cli.command, &resolved, &settings, store.as_ref(), human);

    let duration = start.elapsed().as_millis() as u64;
    let (success, error) = match &result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    action_log::log_action(
        &settings,
        &store.location(),
        &cmd_name,
        args_json,
        success,
        error,
        duration,
    );

    if let Err(e) = result {
        report_error(&e, human);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report_error(e: &Error, human: bool) {
    if human {
        eprintln!("Error: {}", e);
    } else {
        eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
    }
}

/// Refuse to touch another user's crontab without the privileges for it.
fn check_access(settings: &Settings) -> Result<()> {
    if settings.crontab_file.is_some() {
        return Ok(());
    }
    sys::check_crontab_access(settings.crontab_user.as_deref())
}

fn run_command(
    command: Commands,
    resolved: &ResolvedConfig,
    settings: &Settings,
    store: &dyn CrontabStore,
    human: bool,
) -> Result<()> {
    match command {
        Commands::Cron { command } => {
            check_access(settings)?;
            run_cron(command, settings, store, human)?;
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let result = commands::config_show(resolved)?;
                output(&result, human);
            }
            ConfigCommands::Get { key } => {
                let result = commands::config_get(resolved, &key)?;
                output(&result, human);
            }
            ConfigCommands::Set { key, value } => {
                let result = commands::config_set(&key, &value)?;
                output(&result, human);
            }
        },

        Commands::Doctor => {
            let result = commands::doctor(store, settings)?;
            output(&result, human);
        }
    }

    Ok(())
}

fn run_cron(
    command: CronCommands,
    settings: &Settings,
    store: &dyn CrontabStore,
    human: bool,
) -> Result<()> {
    match command {
        CronCommands::List => {
            let result = commands::cron_list(store, settings)?;
            output(&result, human);
        }

        CronCommands::Show { name } => {
            let result = commands::cron_show(store, settings, &name)?;
            output(&result, human);
        }

        CronCommands::Add {
            name,
            schedule,
            command,
        } => {
            let result = commands::cron_add(store, settings, &name, &schedule, &command)?;
            output(&result, human);
        }

        CronCommands::Remove { name } => {
            let result = commands::cron_remove(store, settings, &name)?;
            output(&result, human);
        }

        CronCommands::Enable { name } => {
            let result = commands::cron_enable(store, settings, &name)?;
            output(&result, human);
        }

        CronCommands::Disable { name } => {
            let result = commands::cron_disable(store, settings, &name)?;
            output(&result, human);
        }

        CronCommands::Run { name } => {
            exec::install_interrupt_handler();
            // Stream to stdout for humans; keep stdout clean for the JSON result otherwise
            let mut sink = |line: &str| {
                if human {
                    println!("{}", line);
                } else {
                    eprintln!("{}", line);
                }
            };
            let result = commands::cron_run(store, settings, &name, &mut sink)?;
            output(&result, human);
        }

        CronCommands::Test {
            name,
            no_exec,
            timeout,
        } => {
            exec::install_interrupt_handler();
            let result = commands::cron_test(store, settings, &name, !no_exec, timeout)?;
            output(&result, human);
        }

        CronCommands::History { name, limit } => {
            let result = commands::cron_history(settings, name.as_deref(), limit)?;
            output(&result, human);
        }

        CronCommands::Log { name, test, lines } => {
            let result = commands::cron_log(settings, &name, test, lines)?;
            output(&result, human);
        }

        CronCommands::Backup => {
            let result = commands::cron_backup(store, settings)?;
            output(&result, human);
        }

        CronCommands::Backups => {
            let result = commands::cron_backups(settings)?;
            output(&result, human);
        }

        CronCommands::Restore { id, yes } => {
            let result = commands::cron_restore(store, settings, id.as_deref(), yes)?;
            output(&result, human);
        }
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Command name and arguments for the action log.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    match command {
        Commands::Cron { command } => match command {
            CronCommands::List => ("cron list".to_string(), serde_json::json!({})),
            CronCommands::Show { name } => {
                ("cron show".to_string(), serde_json::json!({ "name": name }))
            }
            CronCommands::Add {
                name,
                schedule,
                command,
            } => (
                "cron add".to_string(),
                serde_json::json!({ "name": name, "schedule": schedule, "command": command }),
            ),
            CronCommands::Remove { name } => {
                ("cron remove".to_string(), serde_json::json!({ "name": name }))
            }
            CronCommands::Enable { name } => {
                ("cron enable".to_string(), serde_json::json!({ "name": name }))
            }
            CronCommands::Disable { name } => {
                ("cron disable".to_string(), serde_json::json!({ "name": name }))
            }
            CronCommands::Run { name } => {
                ("cron run".to_string(), serde_json::json!({ "name": name }))
            }
            CronCommands::Test {
                name,
                no_exec,
                timeout,
            } => (
                "cron test".to_string(),
                serde_json::json!({ "name": name, "no_exec": no_exec, "timeout": timeout }),
            ),
            CronCommands::History { name, limit } => (
                "cron history".to_string(),
                serde_json::json!({ "name": name, "limit": limit }),
            ),
            CronCommands::Log { name, test, lines } => (
                "cron log".to_string(),
                serde_json::json!({ "name": name, "test": test, "lines": lines }),
            ),
            CronCommands::Backup => ("cron backup".to_string(), serde_json::json!({})),
            CronCommands::Backups => ("cron backups".to_string(), serde_json::json!({})),
            CronCommands::Restore { id, yes } => (
                "cron restore".to_string(),
                serde_json::json!({ "id": id, "yes": yes }),
            ),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Show => ("config show".to_string(), serde_json::json!({})),
            ConfigCommands::Get { key } => {
                ("config get".to_string(), serde_json::json!({ "key": key }))
            }
            ConfigCommands::Set { key, value } => (
                "config set".to_string(),
                serde_json::json!({ "key": key, "value": value }),
            ),
        },

        Commands::Doctor => ("doctor".to_string(), serde_json::json!({})),
    }
}
