use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use serde::Serialize;
use tbl_sdk::*;

use crate::cli::*;

const CONFIG_FILE: &str = "tbl.toml";
const KEY_FILE: &str = "signing.key";

type Ledger = BillingLedger<FileStore>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        data,
        format,
        ..
    } = cli;
    let config = load_config(&data)?;
    let open = || open_ledger(&data, config.clone());

    match command {
        Command::Config(args) => cmd_config(&data, &config, args, format),
        Command::NextNumber(args) => cmd_next_number(&open()?, args, format),
        Command::Create(args) => cmd_create(&open()?, args, format),
        Command::Event(args) => cmd_event(&open()?, args, format),
        Command::Amend(args) => cmd_amend(&open()?, args, format),
        Command::Show(args) => cmd_show(&open()?, args, format),
        Command::Verify(args) => cmd_verify(&open()?, args, format),
        Command::Encode(args) => cmd_encode(&open()?, args, format),
        Command::List => cmd_list(&open()?, format),
        Command::Compact => cmd_compact(&data, &config, format),
    }
}

// ---- Setup ----

fn load_config(data: &Path) -> anyhow::Result<LedgerConfig> {
    let path = data.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(LedgerConfig::default());
    }
    Ok(LedgerConfig::load(&path)?)
}

fn open_store(data: &Path, config: &LedgerConfig) -> anyhow::Result<FileStore> {
    FileStore::open(data, config.store.clone())
        .with_context(|| format!("opening store in {}", data.display()))
}

fn open_ledger(data: &Path, config: LedgerConfig) -> anyhow::Result<Ledger> {
    let store = open_store(data, &config)?;
    let ledger = match config.signing.scheme {
        SignatureScheme::Blake3Digest => BillingLedger::new(store, config)?,
        SignatureScheme::Ed25519 => {
            let signer = signing_key(data)?;
            BillingLedger::with_parts(store, config, signer, Arc::new(SystemClock))?
        }
    };
    Ok(ledger)
}

/// Load the Ed25519 key from the data directory, generating it on first use.
fn signing_key(data: &Path) -> anyhow::Result<Ed25519Signer> {
    let path = data.join(KEY_FILE);
    if path.exists() {
        let text = std::fs::read_to_string(&path)?;
        let bytes: [u8; 32] = hex::decode(text.trim())
            .with_context(|| format!("{}: not hex", path.display()))?
            .try_into()
            .map_err(|_| anyhow!("{}: expected 32 key bytes", path.display()))?;
        return Ok(Ed25519Signer::from_bytes(bytes));
    }
    let signer = Ed25519Signer::generate();
    std::fs::write(&path, hex::encode(signer.as_bytes()))?;
    tracing::info!(path = %path.display(), "generated signing key");
    Ok(signer)
}

fn caller(who: &ActorArgs) -> CallerContext {
    let name = who.actor_name.clone().unwrap_or_else(|| who.actor.clone());
    CallerContext::new(Actor::new(who.actor.clone(), name)).with_origin(OriginMeta::new(
        who.address.clone(),
        Some(format!("tbl/{}", env!("CARGO_PKG_VERSION"))),
    ))
}

/// `description:quantity_milli:unit_price:tax_rate_bp`; the description may
/// itself contain colons.
fn parse_line(spec: &str) -> anyhow::Result<LineItem> {
    let mut parts = spec.rsplitn(4, ':');
    let (Some(rate), Some(price), Some(quantity), Some(description)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        bail!("line {spec:?}: expected description:quantity_milli:unit_price:tax_rate_bp");
    };
    Ok(LineItem::new(
        description,
        quantity.parse().with_context(|| format!("line {spec:?}: quantity"))?,
        Amount::from_minor(price.parse().with_context(|| format!("line {spec:?}: price"))?),
        rate.parse().with_context(|| format!("line {spec:?}: tax rate"))?,
    )?)
}

fn parse_lines(specs: &[String]) -> anyhow::Result<BTreeMap<u32, LineItem>> {
    specs
        .iter()
        .zip(1u32..)
        .map(|(spec, id)| Ok((id, parse_line(spec)?)))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---- Commands ----

fn cmd_config(
    data: &Path,
    config: &LedgerConfig,
    args: ConfigArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let text = config.to_toml_string()?;
    if args.write {
        std::fs::create_dir_all(data)?;
        let path = data.join(CONFIG_FILE);
        std::fs::write(&path, &text)?;
        eprintln!("{} Wrote {}", "✓".green().bold(), path.display());
    }
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Text => {
            print!("{text}");
            Ok(())
        }
    }
}

fn cmd_next_number(ledger: &Ledger, args: SequenceArgs, format: OutputFormat) -> anyhow::Result<()> {
    let number = ledger.next_number(&args.domain, &args.period)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "domain": args.domain,
            "period": args.period,
            "number": number,
        })),
        OutputFormat::Text => {
            println!("{}", number.yellow().bold());
            Ok(())
        }
    }
}

fn cmd_create(ledger: &Ledger, args: CreateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let totals = DocumentTotals::from_net_and_tax(
        CurrencyCode::parse(&args.currency)?,
        Amount::from_minor(args.net),
        Amount::from_minor(args.tax),
    )?;
    let new = NewDocument {
        seller: Counterparty::new(args.seller, args.seller_tax_id),
        buyer: Counterparty::new(args.buyer, args.buyer_tax_id),
        totals,
        line_items: parse_lines(&args.lines)?,
        tax_indicator: TaxRateIndicator::from_code(&args.tax_code)?,
        issue: args.issue,
        detail: args.detail,
    };
    let doc = ledger.create_document(
        &args.sequence.domain,
        &args.sequence.period,
        new,
        &caller(&args.who),
    )?;

    match format {
        OutputFormat::Json => print_json(&doc),
        OutputFormat::Text => {
            println!(
                "{} Created {} ({})",
                "✓".green().bold(),
                doc.number.to_string().yellow().bold(),
                doc.status.to_string().cyan()
            );
            println!(
                "  Gross: {} {}",
                doc.totals.render(doc.totals.gross),
                doc.totals.currency
            );
            Ok(())
        }
    }
}

fn cmd_event(ledger: &Ledger, args: EventArgs, format: OutputFormat) -> anyhow::Result<()> {
    let number = DocumentNumber::parse(&args.number)?;
    let kind: EventKind = args.kind.parse()?;
    let requested = args
        .status
        .as_deref()
        .map(str::parse::<DocumentStatus>)
        .transpose()?;
    let event = ledger.record_event(&number, kind, &caller(&args.who), &args.detail, requested)?;

    match format {
        OutputFormat::Json => print_json(&event),
        OutputFormat::Text => {
            println!(
                "{} Recorded {} on {} (seq {}, status {})",
                "✓".green().bold(),
                event.kind.to_string().cyan(),
                number.to_string().yellow(),
                event.seq,
                event.status
            );
            Ok(())
        }
    }
}

fn cmd_amend(ledger: &Ledger, args: AmendArgs, format: OutputFormat) -> anyhow::Result<()> {
    let number = DocumentNumber::parse(&args.number)?;
    let current = ledger.load(&number)?.totals;

    let totals = if args.net.is_some() || args.currency.is_some() {
        let currency = match &args.currency {
            Some(code) => CurrencyCode::parse(code)?,
            None => current.currency,
        };
        Some(DocumentTotals::from_net_and_tax(
            currency,
            args.net.map(Amount::from_minor).unwrap_or(current.net),
            args.tax.map(Amount::from_minor).unwrap_or(current.tax),
        )?)
    } else {
        None
    };
    let amendment = Amendment {
        totals,
        line_items: if args.lines.is_empty() {
            None
        } else {
            Some(parse_lines(&args.lines)?)
        },
        tax_indicator: args
            .tax_code
            .as_deref()
            .map(TaxRateIndicator::from_code)
            .transpose()?,
        ..Amendment::default()
    };
    let event = ledger.amend_document(&number, &caller(&args.who), &args.detail, &amendment)?;

    match format {
        OutputFormat::Json => print_json(&event),
        OutputFormat::Text => {
            println!(
                "{} Amended {} (seq {})",
                "✓".green().bold(),
                number.to_string().yellow(),
                event.seq
            );
            Ok(())
        }
    }
}

fn cmd_show(ledger: &Ledger, args: NumberArg, format: OutputFormat) -> anyhow::Result<()> {
    let doc = ledger.load(&DocumentNumber::parse(&args.number)?)?;
    if format == OutputFormat::Json {
        return print_json(&doc);
    }

    println!(
        "{}  {}  issued {}",
        doc.number.to_string().yellow().bold(),
        doc.status.to_string().cyan(),
        doc.issued_at.to_rfc3339()
    );
    println!(
        "  Seller: {} {}",
        doc.seller.name,
        doc.seller.tax_id.as_deref().unwrap_or("-").dimmed()
    );
    println!(
        "  Buyer:  {} {}",
        doc.buyer.name,
        doc.buyer.tax_id.as_deref().unwrap_or("-").dimmed()
    );
    println!(
        "  Net {}  Tax {}  Gross {} {}  [{}]",
        doc.totals.render(doc.totals.net),
        doc.totals.render(doc.totals.tax),
        doc.totals.render(doc.totals.gross).bold(),
        doc.totals.currency,
        doc.tax_indicator.code()
    );
    for (id, line) in &doc.line_items {
        println!(
            "  {id:>3}. {} x{} @ {} = {}",
            line.description,
            line.quantity_milli,
            doc.totals.render(line.unit_price),
            doc.totals.render(line.net)
        );
    }
    println!("\nAudit log ({} events):", doc.log.len());
    for event in &doc.log {
        println!(
            "  {} {:<11} {:<11} {} {} {}",
            format!("#{}", event.seq).yellow(),
            event.kind.to_string(),
            event.status.to_string(),
            event.timestamp,
            event.actor_id.dimmed(),
            event.content_digest.short_hex().dimmed()
        );
        if !event.detail.is_empty() {
            println!("      {}", event.detail);
        }
    }
    Ok(())
}

fn cmd_verify(ledger: &Ledger, args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let numbers = match args.number {
        Some(number) => vec![DocumentNumber::parse(&number)?],
        None => ledger.documents()?,
    };
    let reports = numbers
        .iter()
        .map(|number| ledger.verify(number))
        .collect::<Result<Vec<_>, _>>()?;

    match format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Text => {
            for report in &reports {
                if report.passed() {
                    println!(
                        "{} {}: {} events, chain intact",
                        "✓".green().bold(),
                        report.document,
                        report.event_count
                    );
                } else {
                    println!("{} {}", "✗".red().bold(), report.document.to_string().red());
                    for violation in &report.violations {
                        println!("  - {violation}");
                    }
                }
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        bail!("{failed} of {} documents failed verification", reports.len());
    }
    Ok(())
}

fn cmd_encode(ledger: &Ledger, args: EncodeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let payload = ledger.encode(&DocumentNumber::parse(&args.number)?)?;
    let rendered = if args.hex {
        hex::encode(payload.as_bytes())
    } else {
        payload.to_base64()
    };
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "document": args.number,
            "payload": rendered,
            "fields": decode_payload(payload.as_bytes())?,
        })),
        OutputFormat::Text => {
            println!("{rendered}");
            Ok(())
        }
    }
}

fn cmd_list(ledger: &Ledger, format: OutputFormat) -> anyhow::Result<()> {
    let documents = ledger
        .documents()?
        .into_iter()
        .map(|number| ledger.load(&number))
        .collect::<Result<Vec<_>, _>>()?;
    let counters = ledger.counters()?;

    if format == OutputFormat::Json {
        let documents: Vec<_> = documents
            .iter()
            .map(|doc| {
                serde_json::json!({
                    "number": doc.number,
                    "status": doc.status,
                    "events": doc.log.len(),
                    "gross": doc.totals.render(doc.totals.gross),
                    "currency": doc.totals.currency,
                })
            })
            .collect();
        return print_json(&serde_json::json!({
            "documents": documents,
            "counters": counters,
        }));
    }

    if documents.is_empty() {
        println!("No documents.");
    }
    for doc in &documents {
        println!(
            "{}  {:<11} {:>12} {}  {} events",
            doc.number.to_string().yellow(),
            doc.status.to_string(),
            doc.totals.render(doc.totals.gross),
            doc.totals.currency,
            doc.log.len()
        );
    }
    if !counters.is_empty() {
        println!("\nSequences:");
        for counter in &counters {
            println!("  {}/{} at {}", counter.domain, counter.period, counter.value.to_string().bold());
        }
    }
    Ok(())
}

fn cmd_compact(data: &Path, config: &LedgerConfig, format: OutputFormat) -> anyhow::Result<()> {
    let stats = open_store(data, config)?.compact()?;
    if format == OutputFormat::Json {
        return print_json(&stats);
    }
    println!(
        "{} {} -> {} bytes ({} records)",
        "Compacted".green().bold(),
        stats.before,
        stats.after,
        stats.keys
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn run(data: &Path, args: &[&str]) -> anyhow::Result<()> {
        let data = data.to_str().unwrap();
        let mut argv = vec!["tbl", "--data", data];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap())
    }

    const CREATE: &[&str] = &[
        "create", "2025", "--seller", "Acme", "--seller-tax-id", "DE123456789", "--buyer", "Bob",
        "--net", "10000", "--tax", "1900", "--line", "Work: day rate:2000:5000:1900", "--issue",
    ];

    #[test]
    fn line_specs_allow_colons_in_description() {
        let line = parse_line("Work: day rate:2000:5000:1900").unwrap();
        assert_eq!(line.description, "Work: day rate");
        assert_eq!(line.quantity_milli, 2000);
        assert_eq!(line.net, Amount::from_minor(10_000));
        assert!(parse_line("2000:5000:1900").is_err());
        assert!(parse_line("Work:two:5000:1900").is_err());
    }

    #[test]
    fn lifecycle_through_the_cli() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), CREATE).unwrap();
        run(dir.path(), &["event", "25-000001", "transmitted", "--detail", "mailed"]).unwrap();
        run(dir.path(), &["amend", "25-000001", "--tax-code", "S", "--net", "10000", "--tax", "1900"])
            .unwrap();
        run(dir.path(), &["verify"]).unwrap();
        run(dir.path(), &["encode", "25-000001"]).unwrap();
        run(dir.path(), &["--format", "json", "list"]).unwrap();

        let store = FileStore::open(dir.path(), StoreConfig::default()).unwrap();
        let ledger = BillingLedger::new(store, LedgerConfig::default()).unwrap();
        let doc = ledger.load(&DocumentNumber::parse("25-000001").unwrap()).unwrap();
        assert_eq!(doc.status, DocumentStatus::Transmitted);
        assert_eq!(doc.log.len(), 3);
    }

    #[test]
    fn compacted_store_keeps_documents_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), CREATE).unwrap();
        run(dir.path(), &["event", "25-000001", "transmitted"]).unwrap();
        run(dir.path(), &["event", "25-000001", "paid"]).unwrap();
        let before = std::fs::metadata(dir.path().join("store.log")).unwrap().len();

        run(dir.path(), &["compact"]).unwrap();
        assert!(std::fs::metadata(dir.path().join("store.log")).unwrap().len() < before);

        run(dir.path(), &["verify"]).unwrap();
        run(dir.path(), CREATE).unwrap();
        let store = FileStore::open(dir.path(), StoreConfig::default()).unwrap();
        let ledger = BillingLedger::new(store, LedgerConfig::default()).unwrap();
        let paid = ledger.load(&DocumentNumber::parse("25-000001").unwrap()).unwrap();
        assert_eq!(paid.status, DocumentStatus::Paid);
        assert!(ledger.load(&DocumentNumber::parse("25-000002").unwrap()).is_ok());
    }

    #[test]
    fn illegal_event_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), CREATE).unwrap();
        run(dir.path(), &["event", "25-000001", "voided"]).unwrap();
        assert!(run(dir.path(), &["event", "25-000001", "paid"]).is_err());
        assert!(run(dir.path(), &["event", "25-000001", "refunded"]).is_err());
    }

    #[test]
    fn written_config_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["config", "--write"]).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config, LedgerConfig::default());
    }

    #[test]
    fn ed25519_key_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[signing]\nscheme = \"ed25519\"\n").unwrap();
        run(dir.path(), CREATE).unwrap();
        let key = std::fs::read_to_string(dir.path().join(KEY_FILE)).unwrap();

        run(dir.path(), &["event", "25-000001", "viewed"]).unwrap();
        run(dir.path(), &["verify", "25-000001"]).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join(KEY_FILE)).unwrap(), key);
    }
}
