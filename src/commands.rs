//! Command-line commands

use clap::{Args, Subcommand};

use crate::api::types::{JobStatus, Priority};
use crate::filter::{Facet, SortOrder};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List jobs of the selected property
  Jobs(JobsArgs),
  /// Show completion statistics
  Stats {
    /// Preventive maintenance jobs only
    #[arg(long)]
    pm: bool,
  },
  /// List properties you have access to
  Properties {
    /// Bypass the cache
    #[arg(long)]
    refresh: bool,
  },
  /// Select the working property ("" clears the selection)
  Select { property_id: String },
  /// Inspect or change a single job
  #[command(subcommand)]
  Job(JobCommand),
  /// Preventive maintenance schedule
  #[command(subcommand)]
  Pm(PmCommand),
  /// Local cache management
  #[command(subcommand)]
  Cache(CacheCommand),
  /// Keep refreshing jobs of the selected property
  Watch {
    /// Seconds between refreshes
    #[arg(long, default_value_t = 60)]
    interval: u64,
    /// Preventive maintenance jobs only
    #[arg(long)]
    pm: bool,
  },
  /// Show the authenticated user
  Whoami,
  /// List rooms of the selected property
  Rooms,
  /// List job topics
  Topics,
}

#[derive(Args, Debug, Default)]
pub struct JobsArgs {
  /// Ignore cached data and fetch from the server
  #[arg(long)]
  pub refresh: bool,
  /// Preventive maintenance jobs only
  #[arg(long)]
  pub pm: bool,
  /// pending, in_progress, waiting_sparepart, completed or cancelled
  #[arg(long)]
  pub status: Option<JobStatus>,
  /// low, medium or high
  #[arg(long)]
  pub priority: Option<Priority>,
  /// Text to look for in description, remarks, rooms and topics
  #[arg(long)]
  pub search: Option<String>,
  /// Only jobs flagged as defective
  #[arg(long)]
  pub defective: bool,
  /// newest, oldest, priority or status
  #[arg(long, default_value = "newest")]
  pub sort: SortOrder,
  /// Summarize by status, priority or room
  #[arg(long, default_value = "status")]
  pub facet: Facet,
  #[arg(long, default_value_t = 1)]
  pub page: usize,
  #[arg(long, default_value_t = 20)]
  pub per_page: usize,
}

#[derive(Subcommand, Debug)]
pub enum JobCommand {
  /// Show a job fetched from the server
  Show { job_id: String },
  /// Report a new job for the selected property
  Create {
    description: String,
    #[arg(long, default_value = "medium")]
    priority: Priority,
    #[arg(long)]
    remarks: Option<String>,
    /// Room id (see `lubd rooms`)
    #[arg(long)]
    room: Option<String>,
    /// Topic title; created on the server if new
    #[arg(long)]
    topic: Option<String>,
    #[arg(long)]
    defective: bool,
    /// Preventive maintenance job; needs --room and --topic
    #[arg(long)]
    pm: bool,
  },
  /// Change the status of a job
  Status { job_id: String, status: JobStatus },
  /// Edit fields of a job
  Edit {
    job_id: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    remarks: Option<String>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    defective: Option<bool>,
  },
  /// Delete a job
  Delete { job_id: String },
}

#[derive(Subcommand, Debug)]
pub enum PmCommand {
  /// List preventive maintenance tasks
  List {
    #[arg(long)]
    refresh: bool,
    /// Include completed and cancelled tasks
    #[arg(long)]
    all: bool,
  },
  /// Mark a task as done
  Complete {
    pm_id: String,
    #[arg(long)]
    notes: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Remove cached collections of the selected property
  Clear,
}
