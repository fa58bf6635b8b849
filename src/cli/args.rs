//! Command-line surface (spec.md §6.3): one subcommand per operation,
//! sharing `-d`/`-a`/`--as-of` where the operation needs financial data,
//! amendments, or an evaluation date.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "proviso",
    version,
    about = "A domain-specific language and evaluation engine for credit agreements",
    long_about = "Parses, validates, and evaluates ProViso credit agreements: covenant \
                  compliance, basket availability, phase and milestone tracking, \
                  waterfalls, reserves, conditions precedent, and amendment drift."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// emit machine-readable JSON instead of a plain-text table
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    pub file: String,

    /// financial data file (flat or multi-period JSON, spec.md §6.2)
    #[arg(short = 'd', long = "data")]
    pub data: Option<String>,

    /// amendment source files, applied in the order given
    #[arg(short = 'a', long = "amendments", num_args = 0..)]
    pub amendments: Vec<String>,

    /// ISO date or period label to evaluate as of; defaults to the
    /// latest recorded period
    #[arg(long = "as-of")]
    pub as_of: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// dump the parsed AST
    Parse {
        file: String,
        #[arg(long)]
        pretty: bool,
    },
    /// run semantic validation and report diagnostics
    Validate {
        file: String,
        #[arg(long)]
        quiet: bool,
    },
    /// check every covenant's compliance as of the current period
    Check(CommonArgs),
    /// report each basket's available capacity
    Baskets {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        verbose: bool,
    },
    /// report covenant compliance under a hypothetical change to the
    /// current period's financials
    Simulate {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        changes: String,
    },
    /// full status report: covenants, baskets, phase, milestones, reserves
    Status {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        show_cure: bool,
    },
    /// multi-period compliance history
    History {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        covenants_only: bool,
    },
    /// check whether an amount against a named basket or condition is
    /// currently permitted
    Query {
        #[command(flatten)]
        common: CommonArgs,
        action: String,
        #[arg(long)]
        amount: Option<String>,
    },
    /// list amendments applied so far
    Amendments(CommonArgs),
    /// apply a covenant's cure right
    Cure {
        #[command(flatten)]
        common: CommonArgs,
        covenant: String,
        amount: String,
    },
    /// basket usage ledger
    Ledger {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        basket: Option<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        export: Option<String>,
    },
    /// accumulate retained earnings into a builder basket
    Accumulate {
        #[command(flatten)]
        common: CommonArgs,
        basket: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// milestone achievement status
    Milestones(CommonArgs),
    /// reserve account balances
    Reserves(CommonArgs),
    /// execute a waterfall against available cash
    Waterfall {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long)]
        revenue: String,
        #[arg(long)]
        waterfall: String,
    },
    /// check a conditions-precedent checklist
    Draw {
        #[command(flatten)]
        common: CommonArgs,
        checklist: String,
    },
    /// the currently active phase
    Phase(CommonArgs),
}
