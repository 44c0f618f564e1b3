// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "saturn",
    about = "Local-first multi-agent AI coding assistant",
    version,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Explicit config file (merged over the default search path)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (equivalent to SATURN_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Prompt to run when no subcommand is given
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browse the network for inference endpoints
    Discover {
        /// Browse window in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List peer agents on the coordination fabric
    Agents,
    /// List models served by the discovered endpoints
    Models,
    /// Run a prompt through the agent loop
    Run {
        /// The prompt; reads stdin when omitted
        prompt: Vec<String>,
        /// Skip coordination-fabric registration
        #[arg(long)]
        no_coordination: bool,
        /// Approve every tool call without asking
        #[arg(short = 'y', long)]
        assume_yes: bool,
    },
    /// Print the merged configuration
    ShowConfig,
}
