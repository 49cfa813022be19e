//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Containers that share selected namespaces", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run two containers, the second joining the first's network and user namespaces
    Share(ShareArgs),

    /// Show namespace information
    Namespaces {
        /// Process ID (default: current process)
        #[arg(short, long)]
        pid: Option<i32>,
    },
}

#[derive(Args)]
pub struct ShareArgs {
    /// Root filesystem for both containers
    #[arg(long, default_value = "/")]
    pub rootfs: PathBuf,

    /// Mount point of the cgroup v2 hierarchy
    #[arg(long, default_value = tandem_cgroup::CGROUP_ROOT)]
    pub cgroup_root: PathBuf,

    /// Cgroup path of the second container
    #[arg(long, default_value = "integration/test2")]
    pub cgroup_path: String,

    /// Command run in each container; it should exit once stdin closes
    #[arg(last = true, default_values = ["cat"])]
    pub command: Vec<String>,
}
