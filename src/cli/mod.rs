//! CLI command definitions for taskdesk
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod seed;

use clap::{Args, Parser, Subcommand, ValueEnum};
use crate::types::Role;

/// Task desk REST service and admin tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve(ServeArgs),

    /// Register a user
    CreateUser(CreateUserArgs),

    /// Insert an admin, a demo user and a starter tag palette
    Seed,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct CreateUserArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,

    #[arg(long, value_enum, default_value_t = RoleArg::User)]
    pub role: RoleArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::User,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["taskdesk"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn create_user_parses_role() {
        let cli = Cli::parse_from([
            "taskdesk",
            "create-user",
            "--name",
            "Ada",
            "--email",
            "ada@example.com",
            "--password",
            "secret",
            "--role",
            "admin",
        ]);
        match cli.command {
            Some(Command::CreateUser(args)) => assert_eq!(Role::from(args.role), Role::Admin),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn serve_accepts_port_override() {
        let cli = Cli::parse_from(["taskdesk", "--log", "off", "serve", "--port", "9001"]);
        match cli.command {
            Some(Command::Serve(args)) => assert_eq!(args.port, Some(9001)),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
