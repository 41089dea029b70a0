// src/cli.rs
//! CLI definitions for entropy-db
//!
//! Command implementations live in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "/var/lib/entropy/repository.db";

#[derive(Parser)]
#[command(name = "entropy-db")]
#[command(version)]
#[command(about = "Query and maintain a binary package repository", long_about = None)]
pub struct Cli {
    /// Configuration file (default: /etc/entropy/repository.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a repository database
    Init {
        /// Path to the database file
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Add a package from its JSON description
    Add {
        /// JSON record, or @path to read it from a file
        record: String,

        /// Request a specific package id
        #[arg(long)]
        id: Option<i64>,

        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Remove a package
    Remove {
        id: i64,

        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Resolve an atom to package ids
    Match {
        /// Atom or or-dependency, e.g. ">=app-misc/foo-1.2:2"
        atom: String,

        /// Override the atom's slot
        #[arg(long)]
        slot: Option<String>,

        /// Return every match instead of the newest
        #[arg(long)]
        multi: bool,

        /// Include masked packages
        #[arg(long)]
        no_mask: bool,

        /// Print version, tag and revision with each id
        #[arg(long)]
        extended: bool,

        /// Bypass the match cache
        #[arg(long)]
        no_cache: bool,

        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Check whether a dependency expression is satisfied
    Deps {
        /// Expression, e.g. "( app-misc/a & app-misc/b ) | app-misc/c"
        expr: String,

        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Apply move/slotmove directives from a file
    Treeupdates {
        file: PathBuf,

        /// Show which directives would run without changing anything
        #[arg(long)]
        dry_run: bool,

        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Print the repository checksum
    Checksum {
        /// Also cover dependencies and conflicts
        #[arg(long)]
        strict: bool,

        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
