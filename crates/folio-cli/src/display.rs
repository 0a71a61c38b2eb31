//! Terminal output: a vertical card for one document, and the ledger report
//! tables.

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use chrono::{DateTime, Utc};
use folio_core::{Document, NotificationOutcome};
use folio_store::LedgerReport;

const MAX_LOG_ENTRIES: usize = 10;

// ── Public API ──

/// Print a document as a card grouped by section. Empty sections are skipped.
pub fn print_document_card(doc: &Document) {
    println!("=== {} {} ===", doc.kind.label(), doc.reference);
    println!("{}", doc.title);
    println!();

    section("Identity");
    row("id", doc.id.as_str());
    row("kind", doc.kind.as_str());
    row("status", doc.status.as_str());
    row("currency", doc.currency.code());
    if let Some(digest) = &doc.credential {
        row("credential", &format!("{digest}…"));
    }
    println!();

    section("Party");
    row("name", &doc.party.name);
    row("email", &doc.party.email);
    if let Some(company) = &doc.party.company {
        row("company", company);
    }
    if let Some(phone) = &doc.party.phone {
        row("phone", phone);
    }
    if let Some(address) = &doc.party.address {
        row("address", &address.replace('\n', ", "));
    }
    println!();

    print_line_items(doc);
    print_dates(doc);

    if let Some(sig) = &doc.signature {
        section("Signature");
        row("signed by", &sig.signer_name);
        row("accepted at", &timestamp(sig.accepted_at));
        if let Some(ip) = &sig.signer_ip {
            row("from", ip);
        }
        println!();
    }

    if !doc.payments.is_empty() {
        section(&format!("Payments ({})", doc.payments.len()));
        for p in &doc.payments {
            let captured = p
                .amount_captured
                .map(|a| doc.currency.format(a))
                .unwrap_or_else(|| "-".into());
            println!(
                "  {:<26} {:<8} expected {} captured {}",
                p.gateway_session_id,
                p.status.as_str(),
                doc.currency.format(p.amount_expected),
                captured
            );
            if let Some(failure) = &p.failure {
                println!("  {:<26} {failure}", "");
            }
        }
        println!();
    }

    if !doc.notifications.is_empty() {
        section(&format!("Notifications ({})", doc.notifications.len()));
        for n in doc.notifications.iter().rev().take(MAX_LOG_ENTRIES) {
            let outcome = match n.outcome {
                NotificationOutcome::Sent => "sent".to_string(),
                NotificationOutcome::Failed => format!(
                    "FAILED: {}",
                    n.error_detail.as_deref().unwrap_or("unknown error")
                ),
            };
            println!(
                "  {} {:<24} {:<28} {outcome}",
                timestamp(n.sent_at),
                n.template.as_str(),
                n.recipient
            );
        }
        if doc.notifications.len() > MAX_LOG_ENTRIES {
            println!("  … {} earlier", doc.notifications.len() - MAX_LOG_ENTRIES);
        }
        println!();
    }

    if !doc.transitions.is_empty() {
        section("History");
        for t in &doc.transitions {
            println!("  {} {} -> {}", timestamp(t.at), t.from, t.to);
        }
        println!();
    }
}

/// Print the ledger report tables.
pub fn print_report(report: &LedgerReport) -> anyhow::Result<()> {
    print_batches("Documents by status", &report.by_status)?;
    print_batches("Captured revenue (minor units)", &report.revenue)?;
    Ok(())
}

// ── Sections ──

fn print_line_items(doc: &Document) {
    section(&format!("Line Items ({})", doc.line_items.len()));
    for item in &doc.line_items {
        println!(
            "  {:<40} {:>6} x {:>12} = {:>12}",
            truncate(&item.description, 40),
            item.quantity,
            doc.currency.format(item.unit_price),
            doc.currency.format(item.amount())
        );
    }
    let totals = doc.totals();
    println!();
    row("subtotal", &doc.currency.format(totals.subtotal));
    row(&format!("tax ({})", doc.tax_rate), &doc.currency.format(totals.tax));
    row("total", &doc.currency.format(totals.total));
    println!();
}

fn print_dates(doc: &Document) {
    section("Dates");
    row("created", &timestamp(doc.created_at));
    row("updated", &timestamp(doc.updated_at));
    if let Some(at) = doc.issued_at {
        row("issued", &timestamp(at));
    }
    if let Some(at) = doc.expires_at {
        row("expires", &timestamp(at));
    }
    if let Some(due) = doc.due_date {
        row("due", &due.to_string());
    }
    println!();
}

fn print_batches(title: &str, batches: &[RecordBatch]) -> anyhow::Result<()> {
    println!("{title}");
    if batches.iter().all(|b| b.num_rows() == 0) {
        println!("  (none)");
    } else {
        println!("{}", pretty_format_batches(batches)?);
    }
    println!();
    Ok(())
}

// ── Helpers ──

fn section(header: &str) {
    println!("{header}");
}

fn row(label: &str, value: &str) {
    println!("  {:<26} {}", label, value);
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max - 1).collect();
        out.push('…');
        out
    }
}
