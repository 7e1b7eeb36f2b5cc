use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use portal::marketplace::ListingFilter;
use portal::models::listing::ListingType;
use portal::models::user::{AccountStatus, Role};
use portal::models::verification::VerificationStatus;
use rust_decimal::Decimal;

/// Carbon Portal: operator console for the carbon-credit marketplace
#[derive(Parser)]
#[command(name = "carbon-portal", version, about)]
pub struct Cli {
    /// Bearer token for the backends (overrides PORTAL_TOKEN)
    #[arg(long, global = true, env = "PORTAL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show who the current token belongs to
    Whoami,

    /// Role-specific overview
    Dashboard,

    /// Review journey verification requests (CVA)
    Verification {
        #[command(subcommand)]
        command: VerificationCommands,
    },

    /// Submit and list journeys (EV owner)
    Journey {
        #[command(subcommand)]
        command: JourneyCommands,
    },

    /// Wallet balance (EV owner)
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },

    /// Withdraw wallet funds to a bank account (EV owner)
    Payout {
        #[command(subcommand)]
        command: PayoutCommands,
    },

    /// Browse and buy credits (buyer)
    Marketplace {
        #[command(subcommand)]
        command: MarketplaceCommands,
    },

    /// Purchase history (buyer)
    Transaction {
        #[command(subcommand)]
        command: TransactionCommands,
    },

    /// Moderation and audit (admin)
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Inspect idempotency intents left by unfinished mutations
    Intent {
        #[command(subcommand)]
        command: IntentCommands,
    },
}

#[derive(Args, Clone, Copy)]
pub struct PageArgs {
    /// Zero-based page index
    #[arg(long, default_value = "0")]
    pub page: u32,
    #[arg(long, default_value = "20")]
    pub size: u32,
}

#[derive(Subcommand)]
pub enum VerificationCommands {
    /// List verification requests
    List {
        #[arg(long, default_value = "pending")]
        status: VerificationStatus,
        #[arg(long)]
        keyword: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Show one request, including checksum integrity
    Show { id: String },
    /// Approve a pending request and issue credits
    Approve {
        id: String,
        /// Defaults to the token subject
        #[arg(long)]
        verifier: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Reject a pending request
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        verifier: Option<String>,
    },
    /// Queue counters and credits issued
    Summary,
    /// Type keywords on stdin; results refresh after a quiet period
    Browse {
        #[arg(long, default_value = "pending")]
        status: VerificationStatus,
    },
}

#[derive(Subcommand)]
pub enum JourneyCommands {
    /// Submit a journey for verification
    Submit {
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        trip: String,
        /// RFC 3339 start time
        #[arg(long)]
        started: DateTime<Utc>,
        /// RFC 3339 end time
        #[arg(long)]
        ended: DateTime<Utc>,
        #[arg(long)]
        distance_km: f64,
        #[arg(long)]
        energy_kwh: f64,
    },
    /// List submitted journeys
    List {
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Show the wallet balance
    Balance,
}

#[derive(Subcommand)]
pub enum PayoutCommands {
    /// Request a payout
    Request {
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        bank_account: String,
    },
    /// List payout requests
    List {
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Args, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub min_price: Option<Decimal>,
    #[arg(long)]
    pub max_price: Option<Decimal>,
    /// Case-insensitive substring of the listing location
    #[arg(long)]
    pub location: Option<String>,
    /// fixed-price or auction
    #[arg(long = "type")]
    pub listing_type: Option<ListingType>,
    #[arg(long)]
    pub min_rating: Option<f64>,
    #[arg(long)]
    pub keyword: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> ListingFilter {
        ListingFilter {
            min_price: self.min_price,
            max_price: self.max_price,
            location: self.location.clone(),
            listing_type: self.listing_type,
            min_seller_rating: self.min_rating,
            keyword: self.keyword.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum MarketplaceCommands {
    /// List listings matching the filters
    List {
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Show one listing
    Show { id: String },
    /// Type keywords on stdin; results refresh after a quiet period
    Browse {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Buy credits from a fixed-price listing
    Buy {
        listing: String,
        /// tCO2 to buy
        #[arg(long)]
        quantity: f64,
    },
    /// Bid on an auction listing
    Bid {
        listing: String,
        #[arg(long)]
        amount: Decimal,
    },
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    Show { id: String },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Browse the audit trail
    Audit {
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        entity_type: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// List user accounts
    Users {
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        status: Option<AccountStatus>,
        #[arg(long)]
        keyword: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    Suspend {
        id: String,
        #[arg(long)]
        reason: String,
    },
    Activate { id: String },
    /// Take a listing off the marketplace
    RemoveListing {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Payout requests awaiting approval
    Payouts {
        #[command(flatten)]
        page: PageArgs,
    },
    ApprovePayout { id: String },
    RejectPayout {
        id: String,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
pub enum IntentCommands {
    /// List intents whose mutation never got a definitive answer
    List,
    /// Forget an intent; the next attempt gets a fresh idempotency key
    Clear { scope: String },
}
