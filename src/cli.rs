use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "node-health-sentinel", version, about = "Node activity and stall monitor")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate addresses once and print the reports as JSON
    Check {
        /// Address to evaluate; repeat for a batch
        #[arg(long = "address", required = true)]
        addresses: Vec<String>,
    },
    /// Run inactivity and stall alert checks for a chat's watchlist
    Alerts {
        #[arg(long)]
        chat: i64,
    },
    /// Manage a chat's watchlist
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
    /// Set a chat's auto update interval in seconds (minimum 60)
    SetInterval {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        secs: f64,
    },
    /// Run the HTTP API and scheduled updates for every stored chat
    Serve {
        /// Override bind address, e.g. 0.0.0.0:8080
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum WatchAction {
    /// Add `<address>[,<label>]`
    Add {
        #[arg(long)]
        chat: i64,
        entry: String,
    },
    Remove {
        #[arg(long)]
        chat: i64,
        address: String,
    },
    List {
        #[arg(long)]
        chat: i64,
    },
}
