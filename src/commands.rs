//! CLI command definitions
//!
//! Defines the clap commands for the tab-interceptor CLI.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// List browser tabs that can be intercepted
    #[command(alias = "ls")]
    Targets,

    /// Attach to a tab and print paused exchanges as they arrive
    ///
    /// Runs until interrupted or the tab goes away. Exchanges stay paused
    /// until resolved with `continue`, `respond` or `block` from another
    /// terminal.
    Watch {
        /// Target id of the tab (see `targets`)
        target: String,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Continue a paused exchange, optionally editing the request
    #[command(alias = "c")]
    Continue {
        /// Exchange id printed by `watch`
        exchange_id: String,

        /// Replace the URL
        #[arg(long)]
        url: Option<String>,

        /// Replace the method
        #[arg(long, short = 'X')]
        method: Option<String>,

        /// Replace headers, as "Name: value" (repeatable)
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        /// Replace the request body
        #[arg(long, short = 'd')]
        body: Option<String>,
    },

    /// Fulfill a paused exchange with a response
    Respond {
        /// Exchange id printed by `watch`
        exchange_id: String,

        /// Status code (default: captured status, else 200)
        #[arg(long, short = 's')]
        status: Option<i64>,

        /// Response headers, as "Name: value" (repeatable)
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        /// Response body
        #[arg(long, short = 'd')]
        body: Option<String>,
    },

    /// Fail a paused exchange as blocked by the client
    Block {
        /// Exchange id printed by `watch`
        exchange_id: String,
    },

    /// Print the body of a paused response
    Body {
        /// Target id of the tab
        target: String,

        /// Exchange id printed by `watch`
        exchange_id: String,
    },

    /// Stop intercepting a tab
    Detach {
        /// Target id of the tab
        target: String,
    },

    /// Show attached tabs and paused exchanges
    Status,

    /// Stop the daemon, releasing every tab
    Stop,

    /// View daemon logs
    Logs {
        /// Number of lines to show
        #[arg(long, short = 'n', default_value = "50")]
        lines: usize,
    },

    /// [Hidden] Run in daemon mode - spawned automatically
    #[command(hide = true)]
    Daemon,
}
