//! CLI module - operator commands for latchkey
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

use crate::services::AccountService;

/// latchkey - account credentials and activation tokens
#[derive(Parser)]
#[command(name = "latchkey")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create default config file
    Init,

    /// Register a new (inactive) account and send its activation email
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Activate an account with the token from its activation link
    Activate {
        #[arg(long)]
        email: String,
        #[arg(long)]
        token: String,
    },

    /// Check a password, optionally starting a persistent session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Issue a remember token
        #[arg(long)]
        remember: bool,
    },

    /// End the persistent session of an account
    Forget {
        #[arg(long)]
        email: String,
    },

    /// Show an account
    Show {
        #[arg(long)]
        email: String,
    },
}

pub async fn dispatch(accounts: &impl AccountService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Register {
            name,
            email,
            password,
        } => commands::cmd_register(accounts, name, email, password).await,
        Commands::Activate { email, token } => {
            commands::cmd_activate(accounts, &email, &token).await
        }
        Commands::Login {
            email,
            password,
            remember,
        } => commands::cmd_login(accounts, &email, &password, remember).await,
        Commands::Forget { email } => commands::cmd_forget(accounts, &email).await,
        Commands::Show { email } => commands::cmd_show(accounts, &email).await,
    }
}
