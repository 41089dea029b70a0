// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use entropy_db::resolver::MatchOptions;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("entropy-db v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'entropy-db --help' for usage information");
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "entropy-db", &mut std::io::stdout());
        return Ok(());
    }
    if let Commands::Init { db_path } = &command {
        return commands::cmd_init(db_path);
    }

    let config = commands::load_engine_config(cli.config.as_deref())?;

    match command {
        Commands::Add { record, id, db_path } => commands::cmd_add(&db_path, &record, id, &config),
        Commands::Remove { id, db_path } => commands::cmd_remove(&db_path, id, &config),
        Commands::Match {
            atom,
            slot,
            multi,
            no_mask,
            extended,
            no_cache,
            db_path,
        } => {
            let options = MatchOptions {
                match_slot: slot,
                multi_match: multi,
                mask_filter: !no_mask,
                extended,
                use_cache: !no_cache,
            };
            commands::cmd_match(&db_path, &atom, options, &config)
        }
        Commands::Deps { expr, db_path } => commands::cmd_deps(&db_path, &expr, &config),
        Commands::Treeupdates {
            file,
            dry_run,
            db_path,
        } => commands::cmd_treeupdates(&db_path, &file, dry_run, &config),
        Commands::Checksum { strict, db_path } => commands::cmd_checksum(&db_path, strict, &config),
        Commands::Init { .. } | Commands::Completions { .. } => Ok(()),
    }
}
