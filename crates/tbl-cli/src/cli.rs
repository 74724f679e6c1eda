use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tbl",
    about = "Tamper-evident billing ledger: document numbering and audit chains",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Data directory holding the store, `tbl.toml` and signing key.
    #[arg(long, global = true, default_value = "tbl-data", env = "TBL_DATA")]
    pub data: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the effective configuration
    Config(ConfigArgs),
    /// Allocate the next number of a sequence without creating a document
    NextNumber(SequenceArgs),
    /// Create a billing document
    Create(CreateArgs),
    /// Record a lifecycle event on a document
    Event(EventArgs),
    /// Change the financial fields of a document
    Amend(AmendArgs),
    /// Show a document and its audit log
    Show(NumberArg),
    /// Verify audit logs (all documents if no number is given)
    Verify(VerifyArgs),
    /// Print the compliance payload of a finalized document
    Encode(EncodeArgs),
    /// List documents and sequence counters
    List,
    /// Rewrite the store log keeping only the latest version of each record
    Compact,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the effective configuration to `<data>/tbl.toml`.
    #[arg(long)]
    pub write: bool,
}

#[derive(Args)]
pub struct SequenceArgs {
    #[arg(long, default_value = "invoice")]
    pub domain: String,
    pub period: String,
}

#[derive(Args)]
pub struct ActorArgs {
    #[arg(long, default_value = "cli")]
    pub actor: String,
    #[arg(long)]
    pub actor_name: Option<String>,
    /// Caller address recorded in the event origin.
    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Args)]
pub struct CreateArgs {
    #[command(flatten)]
    pub sequence: SequenceArgs,
    #[arg(long)]
    pub seller: String,
    #[arg(long)]
    pub seller_tax_id: Option<String>,
    #[arg(long)]
    pub buyer: String,
    #[arg(long)]
    pub buyer_tax_id: Option<String>,
    #[arg(long, default_value = "EUR")]
    pub currency: String,
    /// Net total in minor units.
    #[arg(long, allow_negative_numbers = true)]
    pub net: i64,
    /// Tax total in minor units.
    #[arg(long, allow_negative_numbers = true)]
    pub tax: i64,
    /// `description:quantity_milli:unit_price:tax_rate_bp`, repeatable.
    #[arg(long = "line")]
    pub lines: Vec<String>,
    /// UNCL 5305 code (S, AA, Z, E, AE).
    #[arg(long, default_value = "S")]
    pub tax_code: String,
    /// Create as issued instead of draft.
    #[arg(long)]
    pub issue: bool,
    #[arg(long)]
    pub detail: Option<String>,
    #[command(flatten)]
    pub who: ActorArgs,
}

#[derive(Args)]
pub struct EventArgs {
    pub number: String,
    /// transmitted, paid, voided, viewed, exported or modified.
    pub kind: String,
    /// Requested status, for transitions that need one.
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long, default_value = "")]
    pub detail: String,
    #[command(flatten)]
    pub who: ActorArgs,
}

#[derive(Args)]
pub struct AmendArgs {
    pub number: String,
    #[arg(long)]
    pub currency: Option<String>,
    #[arg(long, requires = "tax", allow_negative_numbers = true)]
    pub net: Option<i64>,
    #[arg(long, requires = "net", allow_negative_numbers = true)]
    pub tax: Option<i64>,
    #[arg(long = "line")]
    pub lines: Vec<String>,
    #[arg(long)]
    pub tax_code: Option<String>,
    #[arg(long, default_value = "amended")]
    pub detail: String,
    #[command(flatten)]
    pub who: ActorArgs,
}

#[derive(Args)]
pub struct NumberArg {
    pub number: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub number: Option<String>,
}

#[derive(Args)]
pub struct EncodeArgs {
    pub number: String,
    /// Print the raw payload as hex instead of base64.
    #[arg(long)]
    pub hex: bool,
}
