use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal::auth::AuthSession;
use portal::client::Portal;
use portal::config::{self, Config};
use portal::debounce::debounce;
use portal::errors::PortalError;
use portal::intent::{FileIntentStore, IdempotencyLedger, IntentStore, RedisIntentStore};
use portal::marketplace::{apply_filters, ListingFilter};
use portal::models::audit::AuditLogQuery;
use portal::models::journey::JourneySubmission;
use portal::models::listing::{Listing, ListingQuery};
use portal::models::page::{Page, PageRequest};
use portal::models::user::{Role, UserQuery};
use portal::models::verification::{VerificationQuery, VerificationRequest, VerificationStatus};
use portal::models::wallet::PayoutRequest;
use portal::review::ReviewQueue;

mod cli;

/// Everything a command handler needs.
struct AppState {
    portal: Portal,
    ledger: IdempotencyLedger,
    review: ReviewQueue,
    config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fmt_json = std::env::var("PORTAL_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "carbon_portal=info,portal=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if fmt_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let state = build_state(cfg, args.token).await?;

    if let Err(e) = run(args.command, &state).await {
        eprintln!("{}", error_report(&e));
        std::process::exit(1);
    }
    Ok(())
}

/// Text shown to the operator for a failed command. Printed once, here,
/// rather than by the runtime's default `Result` reporting.
fn error_report(e: &anyhow::Error) -> String {
    if matches!(e.downcast_ref::<PortalError>(), Some(PortalError::Unauthorized)) {
        "Session expired or token rejected. Set PORTAL_TOKEN to a fresh token and retry.".into()
    } else {
        format!("Error: {:?}", e)
    }
}

async fn build_state(cfg: Config, token: Option<String>) -> anyhow::Result<AppState> {
    let session = match token.or_else(|| cfg.token.clone()) {
        Some(token) => AuthSession::with_token(token),
        None => AuthSession::new(),
    };

    let store: Arc<dyn IntentStore> = match cfg.redis_url.as_deref() {
        Some(url) => {
            tracing::debug!("Using Redis intent store");
            Arc::new(
                RedisIntentStore::connect(url, cfg.intent_ttl_secs)
                    .await
                    .context("cannot connect to PORTAL_REDIS_URL")?,
            )
        }
        None => Arc::new(FileIntentStore::open(&cfg.intent_dir).await?),
    };
    let ledger = IdempotencyLedger::new(store);

    let portal = Portal::new(&cfg, session)?;
    let review = ReviewQueue::new(portal.cva.clone(), ledger.clone());

    Ok(AppState {
        portal,
        ledger,
        review,
        config: cfg,
    })
}

async fn run(command: cli::Commands, state: &AppState) -> anyhow::Result<()> {
    match command {
        cli::Commands::Whoami => handle_whoami(state).await,
        cli::Commands::Dashboard => handle_dashboard(state).await,
        cli::Commands::Verification { command } => handle_verification_command(command, state).await,
        cli::Commands::Journey { command } => handle_journey_command(command, state).await,
        cli::Commands::Wallet { command } => match command {
            cli::WalletCommands::Balance => {
                let bal = state.portal.owner.get_wallet_balance().await?;
                println!("Owner:     {}", bal.owner_id);
                println!("Available: {:.3} tCO2", bal.available_credits);
                println!("Pending:   {:.3} tCO2", bal.pending_credits);
                println!("Cash:      {} {}", bal.cash_balance, bal.currency);
                if let Some(at) = bal.updated_at {
                    println!("Updated:   {}", at.format("%Y-%m-%d %H:%M"));
                }
                Ok(())
            }
        },
        cli::Commands::Payout { command } => handle_payout_command(command, state).await,
        cli::Commands::Marketplace { command } => handle_marketplace_command(command, state).await,
        cli::Commands::Transaction { command } => handle_transaction_command(command, state).await,
        cli::Commands::Admin { command } => handle_admin_command(command, state).await,
        cli::Commands::Intent { command } => handle_intent_command(command, state).await,
    }
}

async fn handle_whoami(state: &AppState) -> anyhow::Result<()> {
    let session = state.portal.session();
    if !session.is_authenticated().await {
        println!("Not logged in. Set PORTAL_TOKEN or pass --token.");
        return Ok(());
    }
    match session.claims().await {
        Some(claims) => {
            println!("Subject: {}", claims.sub);
            println!(
                "Role:    {}",
                claims.role.map(|r| r.to_string()).unwrap_or_else(|| "-".into())
            );
            if let Some(exp) = claims.exp {
                let suffix = if claims.is_expired() { " (expired)" } else { "" };
                println!("Expires: {}{}", exp, suffix);
            }
        }
        None => println!("Opaque token (no readable claims)."),
    }
    Ok(())
}

async fn handle_dashboard(state: &AppState) -> anyhow::Result<()> {
    let p = &state.portal;
    let role = p.session().claims().await.and_then(|c| c.role);
    let first_page = PageRequest::new(0, 5);

    match role {
        Some(Role::Cva) => {
            let query = VerificationQuery {
                status: Some(VerificationStatus::Pending),
                keyword: None,
                page: 0,
                size: 5,
            };
            let (summary, pending) =
                futures::try_join!(p.cva.get_verification_summary(), state.review.list(&query))?;
            println!(
                "Pending: {}   Approved: {}   Rejected: {}   Credits issued: {:.3}",
                summary.pending, summary.approved, summary.rejected, summary.total_credits_issued
            );
            print_verifications(&pending);
        }
        Some(Role::EvOwner) => {
            let (balance, journeys) = futures::try_join!(
                p.owner.get_wallet_balance(),
                p.owner.list_journeys(first_page)
            )?;
            println!(
                "Available: {:.3} tCO2   Pending: {:.3} tCO2   Cash: {} {}",
                balance.available_credits, balance.pending_credits, balance.cash_balance, balance.currency
            );
            println!("Recent journeys:");
            for j in journeys.content {
                println!("  {:<20} {:>9.1} km  {}", j.trip_id, j.distance_km, j.status);
            }
        }
        Some(Role::Buyer) => {
            let query = ListingQuery {
                page: 0,
                size: 5,
                ..Default::default()
            };
            let (listings, txs) = futures::try_join!(
                p.buyer.list_listings(&query),
                p.buyer.list_transactions(first_page)
            )?;
            println!("Newest listings:");
            print_listings(&listings.content.iter().collect::<Vec<_>>());
            println!("Recent transactions:");
            for t in txs.content {
                println!("  {:<38} {:>9.3} tCO2  {:?}", t.id, t.quantity, t.status);
            }
        }
        Some(Role::Admin) => {
            let audit_query = AuditLogQuery {
                page: 0,
                size: 5,
                ..Default::default()
            };
            let (audit, payouts) = futures::try_join!(
                p.admin.list_audit_logs(&audit_query),
                p.admin.list_pending_payouts(first_page)
            )?;
            println!("Payouts awaiting approval: {}", payouts.total_elements);
            println!("Latest audit events:");
            for a in audit.content {
                println!(
                    "  {} {:<12} {:<24} {}/{}",
                    a.created_at.format("%Y-%m-%d %H:%M"),
                    a.actor_id,
                    a.action,
                    a.entity_type,
                    a.entity_id
                );
            }
        }
        None => println!("No role in token; use a role-specific command instead."),
    }
    Ok(())
}

async fn handle_verification_command(
    cmd: cli::VerificationCommands,
    state: &AppState,
) -> anyhow::Result<()> {
    match cmd {
        cli::VerificationCommands::List {
            status,
            keyword,
            page,
        } => {
            let query = VerificationQuery {
                status: Some(status),
                keyword,
                page: page.page,
                size: PageRequest::new(page.page, page.size).size,
            };
            let requests = state.review.list(&query).await?;
            print_verifications(&requests);
        }
        cli::VerificationCommands::Show { id } => {
            let r = state.review.fetch(&id).await?;
            println!("ID:        {}", r.id);
            println!("Owner:     {}", r.owner_id);
            println!("Trip:      {}", r.trip_id);
            println!("Distance:  {:.3} km", r.distance_km);
            println!("Energy:    {:.3} kWh", r.energy_kwh);
            println!(
                "Checksum:  {} ({})",
                r.checksum,
                if r.checksum_matches() { "ok" } else { "MISMATCH" }
            );
            println!("Status:    {}", r.status);
            if let Some(v) = &r.verifier_id {
                println!("Verifier:  {}", v);
            }
            if let Some(at) = r.verified_at {
                println!("Decided:   {}", at.format("%Y-%m-%d %H:%M"));
            }
            if let Some(notes) = &r.notes {
                println!("Notes:     {}", notes);
            }
            if let Some(c) = &r.credit_issuance {
                println!(
                    "Credits:   {:.3} tCO2 ({} raw) from {:.1} kg CO2",
                    c.credits_rounded, c.credits_raw, c.co2_reduced_kg
                );
            }
            let actions = state.review.actions_for(&r);
            if !actions.is_empty() {
                println!("Actions:   {:?}", actions);
            }
        }
        cli::VerificationCommands::Approve { id, verifier, notes } => {
            let r = state.review.approve(&id, verifier, notes).await?;
            match &r.credit_issuance {
                Some(c) => println!(
                    "Request {} approved. Issued {:.3} tCO2 (key {}).",
                    r.id, c.credits_rounded, c.idempotency_key
                ),
                None => println!("Request {} approved.", r.id),
            }
        }
        cli::VerificationCommands::Reject {
            id,
            reason,
            verifier,
        } => {
            let r = state.review.reject(&id, verifier, &reason).await?;
            println!("Request {} rejected.", r.id);
        }
        cli::VerificationCommands::Summary => {
            let s = state.portal.cva.get_verification_summary().await?;
            println!("Pending:        {}", s.pending);
            println!("Approved:       {}", s.approved);
            println!("Rejected:       {}", s.rejected);
            println!("Credits issued: {:.3} tCO2", s.total_credits_issued);
        }
        cli::VerificationCommands::Browse { status } => {
            let mut keywords = spawn_keyword_reader(state);
            while let Some(keyword) = keywords.recv().await {
                let query = VerificationQuery {
                    status: Some(status),
                    keyword: Some(keyword).filter(|k| !k.is_empty()),
                    page: 0,
                    size: 20,
                };
                match state.review.list(&query).await {
                    Ok(page) => print_verifications(&page),
                    Err(e) => eprintln!("search failed: {}", e),
                }
            }
        }
    }
    Ok(())
}

async fn handle_journey_command(cmd: cli::JourneyCommands, state: &AppState) -> anyhow::Result<()> {
    match cmd {
        cli::JourneyCommands::Submit {
            vehicle,
            trip,
            started,
            ended,
            distance_km,
            energy_kwh,
        } => {
            let submission = JourneySubmission {
                vehicle_id: vehicle,
                trip_id: trip,
                started_at: started,
                ended_at: ended,
                distance_km,
                energy_kwh,
            };
            let created = state.portal.owner.submit_journey(&submission).await?;
            println!(
                "Journey submitted:\n  Request:  {}\n  Trip:     {}\n  Status:   {}\n  Checksum: {}",
                created.id, created.trip_id, created.status, created.checksum
            );
        }
        cli::JourneyCommands::List { page } => {
            let journeys = state
                .portal
                .owner
                .list_journeys(PageRequest::new(page.page, page.size))
                .await?;
            if journeys.content.is_empty() {
                println!("No journeys found.");
                return Ok(());
            }
            println!(
                "{:<20} {:<12} {:>10} {:>10} {:<10} STARTED",
                "TRIP", "VEHICLE", "KM", "KWH", "STATUS"
            );
            for j in &journeys.content {
                println!(
                    "{:<20} {:<12} {:>10.1} {:>10.2} {:<10} {}",
                    j.trip_id,
                    j.vehicle_id,
                    j.distance_km,
                    j.energy_kwh,
                    j.status,
                    j.started_at.format("%Y-%m-%d %H:%M")
                );
            }
            print_page_footer(&journeys);
        }
    }
    Ok(())
}

async fn handle_payout_command(cmd: cli::PayoutCommands, state: &AppState) -> anyhow::Result<()> {
    match cmd {
        cli::PayoutCommands::Request {
            amount,
            currency,
            bank_account,
        } => {
            let request = PayoutRequest {
                amount,
                currency,
                bank_account_id: bank_account,
            };
            let payout = state
                .portal
                .owner
                .request_payout(&state.ledger, &request)
                .await?;
            println!(
                "Payout requested:\n  ID:     {}\n  Amount: {} {}\n  Status: {:?}",
                payout.id, payout.amount, payout.currency, payout.status
            );
        }
        cli::PayoutCommands::List { page } => {
            let payouts = state
                .portal
                .owner
                .list_payouts(PageRequest::new(page.page, page.size))
                .await?;
            print_payouts(&payouts);
        }
    }
    Ok(())
}

async fn handle_marketplace_command(
    cmd: cli::MarketplaceCommands,
    state: &AppState,
) -> anyhow::Result<()> {
    let buyer = &state.portal.buyer;
    match cmd {
        cli::MarketplaceCommands::List { filters, page } => {
            let filter = filters.to_filter();
            let query = ListingQuery {
                keyword: filter.keyword.clone(),
                listing_type: filter.listing_type,
                page: page.page,
                size: PageRequest::new(page.page, page.size).size,
            };
            let listings = buyer.list_listings(&query).await?;
            print_listings(&apply_filters(&listings.content, &filter));
            print_page_footer(&listings);
        }
        cli::MarketplaceCommands::Show { id } => {
            let l = buyer.get_listing(&id).await?;
            println!("ID:       {}", l.id);
            println!("Title:    {}", l.title);
            println!("Seller:   {} ({:.1}★)", l.seller_name, l.seller_rating);
            println!("Location: {}", l.location);
            println!("Type:     {:?}", l.listing_type);
            println!("Price:    {} per tCO2", l.price_per_credit);
            println!("Quantity: {:.3} tCO2", l.quantity);
            println!("Status:   {:?}", l.status);
            if let Some(ends) = l.auction_ends_at {
                println!("Ends:     {}", ends.format("%Y-%m-%d %H:%M"));
            }
        }
        cli::MarketplaceCommands::Browse { filters } => {
            let base = filters.to_filter();
            let mut keywords = spawn_keyword_reader(state);
            while let Some(keyword) = keywords.recv().await {
                let filter = ListingFilter {
                    keyword: Some(keyword).filter(|k| !k.is_empty()),
                    ..base.clone()
                };
                let query = ListingQuery {
                    keyword: filter.keyword.clone(),
                    listing_type: filter.listing_type,
                    page: 0,
                    size: 50,
                };
                match buyer.list_listings(&query).await {
                    Ok(page) => print_listings(&apply_filters(&page.content, &filter)),
                    Err(e) => eprintln!("search failed: {}", e),
                }
            }
        }
        cli::MarketplaceCommands::Buy { listing, quantity } => {
            let tx = buyer.purchase(&state.ledger, &listing, quantity).await?;
            println!(
                "Purchase recorded:\n  Transaction: {}\n  Quantity:    {:.3} tCO2\n  Total:       {}\n  Status:      {:?}",
                tx.id, tx.quantity, tx.total_amount, tx.status
            );
        }
        cli::MarketplaceCommands::Bid { listing, amount } => {
            let bid = buyer.place_bid(&listing, amount).await?;
            println!("Bid {} placed: {} on listing {}.", bid.id, bid.amount, bid.listing_id);
        }
    }
    Ok(())
}

async fn handle_transaction_command(
    cmd: cli::TransactionCommands,
    state: &AppState,
) -> anyhow::Result<()> {
    let buyer = &state.portal.buyer;
    match cmd {
        cli::TransactionCommands::List { page } => {
            let txs = buyer
                .list_transactions(PageRequest::new(page.page, page.size))
                .await?;
            if txs.content.is_empty() {
                println!("No transactions found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<20} {:>10} {:>12} {:<10} CREATED",
                "ID", "LISTING", "TCO2", "TOTAL", "STATUS"
            );
            for t in &txs.content {
                println!(
                    "{:<38} {:<20} {:>10.3} {:>12} {:<10} {}",
                    t.id,
                    t.listing_id,
                    t.quantity,
                    t.total_amount,
                    format!("{:?}", t.status),
                    t.created_at.format("%Y-%m-%d")
                );
            }
            print_page_footer(&txs);
        }
        cli::TransactionCommands::Show { id } => {
            let t = buyer.get_transaction(&id).await?;
            println!("ID:          {}", t.id);
            println!("Listing:     {}", t.listing_id);
            println!("Seller:      {}", t.seller_id);
            println!("Quantity:    {:.3} tCO2", t.quantity);
            println!("Unit price:  {}", t.price_per_credit);
            println!("Total:       {}", t.total_amount);
            println!("Status:      {:?}", t.status);
            println!("Created:     {}", t.created_at.format("%Y-%m-%d %H:%M"));
            if let Some(cert) = &t.certificate_id {
                println!("Certificate: {}", cert);
            }
        }
    }
    Ok(())
}

async fn handle_admin_command(cmd: cli::AdminCommands, state: &AppState) -> anyhow::Result<()> {
    let admin = &state.portal.admin;
    match cmd {
        cli::AdminCommands::Audit {
            actor,
            action,
            entity_type,
            page,
        } => {
            let query = AuditLogQuery {
                actor_id: actor,
                action,
                entity_type,
                page: page.page,
                size: PageRequest::new(page.page, page.size).size,
            };
            let logs = admin.list_audit_logs(&query).await?;
            if logs.content.is_empty() {
                println!("No audit events found.");
                return Ok(());
            }
            println!(
                "{:<17} {:<14} {:<8} {:<28} ENTITY",
                "TIME", "ACTOR", "ROLE", "ACTION"
            );
            for a in &logs.content {
                println!(
                    "{:<17} {:<14} {:<8} {:<28} {}/{}",
                    a.created_at.format("%Y-%m-%d %H:%M"),
                    a.actor_id,
                    a.actor_role.map(|r| r.to_string()).unwrap_or_else(|| "-".into()),
                    a.action,
                    a.entity_type,
                    a.entity_id
                );
            }
            print_page_footer(&logs);
        }
        cli::AdminCommands::Users {
            role,
            status,
            keyword,
            page,
        } => {
            let query = UserQuery {
                role,
                status,
                keyword,
                page: page.page,
                size: PageRequest::new(page.page, page.size).size,
            };
            let users = admin.list_users(&query).await?;
            if users.content.is_empty() {
                println!("No users found.");
                return Ok(());
            }
            println!("{:<38} {:<30} {:<9} {:<10}", "ID", "EMAIL", "ROLE", "STATUS");
            for u in &users.content {
                println!(
                    "{:<38} {:<30} {:<9} {:<10}",
                    u.id,
                    u.email,
                    u.role.to_string(),
                    format!("{:?}", u.status)
                );
            }
            print_page_footer(&users);
        }
        cli::AdminCommands::Suspend { id, reason } => {
            let u = admin.suspend_user(&id, &reason).await?;
            println!("User {} is now {:?}.", u.id, u.status);
        }
        cli::AdminCommands::Activate { id } => {
            let u = admin.activate_user(&id).await?;
            println!("User {} is now {:?}.", u.id, u.status);
        }
        cli::AdminCommands::RemoveListing { id, reason } => {
            admin.remove_listing(&id, &reason).await?;
            println!("Listing {} removed.", id);
        }
        cli::AdminCommands::Payouts { page } => {
            let payouts = admin
                .list_pending_payouts(PageRequest::new(page.page, page.size))
                .await?;
            print_payouts(&payouts);
        }
        cli::AdminCommands::ApprovePayout { id } => {
            let p = admin.approve_payout(&id).await?;
            println!("Payout {} is now {:?}.", p.id, p.status);
        }
        cli::AdminCommands::RejectPayout { id, reason } => {
            let p = admin.reject_payout(&id, &reason).await?;
            println!("Payout {} is now {:?}.", p.id, p.status);
        }
    }
    Ok(())
}

async fn handle_intent_command(cmd: cli::IntentCommands, state: &AppState) -> anyhow::Result<()> {
    match cmd {
        cli::IntentCommands::List => {
            let intents = state.ledger.pending().await?;
            if intents.is_empty() {
                println!("No unfinished intents.");
                return Ok(());
            }
            println!("{:<40} {:<38} {:>8} CREATED", "SCOPE", "IDEMPOTENCY KEY", "ATTEMPTS");
            for i in intents {
                println!(
                    "{:<40} {:<38} {:>8} {}",
                    i.scope,
                    i.idempotency_key,
                    i.attempts,
                    i.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        cli::IntentCommands::Clear { scope } => {
            state.ledger.discard(&scope).await?;
            println!("Intent {} cleared.", scope);
        }
    }
    Ok(())
}

/// Read keywords from stdin and yield them once typing pauses.
fn spawn_keyword_reader(state: &AppState) -> tokio::sync::mpsc::Receiver<String> {
    let (input, output) = debounce::<String>(state.config.search_debounce);
    // Initial search with no keyword.
    input.push(String::new());
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !input.push(line.trim().to_string()) {
                break;
            }
        }
    });
    output
}

fn print_verifications(page: &Page<VerificationRequest>) {
    if page.content.is_empty() {
        println!("No verification requests found.");
        return;
    }
    println!(
        "{:<38} {:<16} {:>9} {:>9} {:<9} {:<8} ACTIONS",
        "ID", "TRIP", "KM", "KWH", "STATUS", "CHECKSUM"
    );
    for r in &page.content {
        let actions = r
            .available_actions()
            .iter()
            .map(|a| format!("{:?}", a).to_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<38} {:<16} {:>9.1} {:>9.2} {:<9} {:<8} {}",
            r.id,
            r.trip_id,
            r.distance_km,
            r.energy_kwh,
            r.status.as_str(),
            if r.checksum_matches() { "ok" } else { "MISMATCH" },
            actions
        );
    }
    print_page_footer(page);
}

fn print_listings(listings: &[&Listing]) {
    if listings.is_empty() {
        println!("No listings match.");
        return;
    }
    println!(
        "{:<24} {:<28} {:<20} {:<12} {:>10} {:>10} {:>6}",
        "ID", "TITLE", "LOCATION", "TYPE", "PRICE", "TCO2", "RATING"
    );
    for l in listings {
        let title = if l.title.chars().count() > 28 {
            format!("{}...", l.title.chars().take(25).collect::<String>())
        } else {
            l.title.clone()
        };
        println!(
            "{:<24} {:<28} {:<20} {:<12} {:>10} {:>10.3} {:>6.1}",
            l.id,
            title,
            l.location,
            format!("{:?}", l.listing_type),
            l.price_per_credit,
            l.quantity,
            l.seller_rating
        );
    }
}

fn print_payouts(payouts: &Page<portal::models::wallet::Payout>) {
    if payouts.content.is_empty() {
        println!("No payouts found.");
        return;
    }
    println!(
        "{:<38} {:>12} {:<5} {:<16} {:<9} REQUESTED",
        "ID", "AMOUNT", "CCY", "BANK ACCOUNT", "STATUS"
    );
    for p in &payouts.content {
        println!(
            "{:<38} {:>12} {:<5} {:<16} {:<9} {}",
            p.id,
            p.amount,
            p.currency,
            p.bank_account_id,
            format!("{:?}", p.status),
            p.requested_at.format("%Y-%m-%d")
        );
    }
    print_page_footer(payouts);
}

fn print_page_footer<T>(page: &Page<T>) {
    if page.total_pages > 1 {
        println!(
            "-- page {}/{} ({} total) --",
            page.number + 1,
            page.total_pages,
            page.total_elements
        );
    }
}
