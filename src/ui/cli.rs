//! Command-line interface.
//!
//! Credentials can be passed as flags or through the `COMPASS_USERNAME` and
//! `COMPASS_PASSWORD` environment variables.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::hierarchy::{HierarchyEndpoint, UnitLevel};
use crate::models::member::RoleStatus;
use crate::reports::ReportType;

/// CLI arguments for the Compass client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Compass username
    #[arg(short = 'u', long, env = "COMPASS_USERNAME")]
    pub username: String,

    /// Compass password
    #[arg(short = 'p', long, env = "COMPASS_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Title of the role to use, e.g. "Regional Administrator".
    /// Defaults to the role Compass selects at login
    #[arg(short = 'r', long)]
    pub role: Option<String>,

    /// Location of the role, for members holding the same role in several places
    #[arg(short = 'l', long, requires = "role")]
    pub location: Option<String>,

    /// Path to a TOML settings file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Number of concurrent requests for multi-member and multi-unit commands
    #[arg(short = 't', long = "threads-num", default_value = "5")]
    pub threads_num: usize,

    /// Log debug output
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print results as JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Personal details of a member
    Member { membership_number: i64 },

    /// Roles of one or more members
    Roles {
        #[arg(required = true)]
        membership_numbers: Vec<i64>,

        /// Keep occasional helper, network, staff and council roles
        #[arg(long)]
        all_roles: bool,

        /// Only keep roles in this status (repeatable)
        #[arg(long = "status")]
        statuses: Vec<RoleStatus>,

        /// Also fetch role details (single member only)
        #[arg(long)]
        details: bool,

        /// Write the roles to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Permits held by a member
    Permits { membership_number: i64 },

    /// Training records of a member
    Training {
        membership_number: i64,

        /// Only mandatory ongoing learning
        #[arg(long)]
        mandatory: bool,
    },

    /// Awards held by a member
    Awards { membership_number: i64 },

    /// Disclosures of a member
    Disclosures {
        membership_number: i64,

        /// Only the most recently issued disclosure
        #[arg(long)]
        latest: bool,
    },

    /// Details of a single role
    RoleDetail { role_number: i64 },

    /// Units or sections directly below a unit
    Units {
        parent_unit: i64,

        /// Hierarchy endpoint, e.g. districts or group_sections
        #[arg(default_value = "groups")]
        endpoint: HierarchyEndpoint,
    },

    /// Full hierarchy below a unit
    Hierarchy {
        unit: i64,

        /// Level of the starting unit
        #[arg(long, default_value = "Organisation")]
        level: UnitLevel,
    },

    /// Members with roles in one or more units
    Members {
        #[arg(required = true)]
        units: Vec<i64>,

        /// Write the members to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Export a report as CSV
    Report {
        /// Report name, e.g. "Region Member Directory"
        report_type: ReportType,

        /// Output file. Defaults to a timestamped name in the current directory
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
}
