use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use inbox_triage::config::{MailboxConfig, TriageConfig};
use inbox_triage::logging;
use inbox_triage::mailbox::DirectoryMailbox;
use inbox_triage::pipeline::{ReplyAction, TriageProcessor, TriageReport};
use inbox_triage::summarize::SummaryEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = match std::env::var("TRIAGE_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => Some(logging::init_with_file(Path::new(&dir))?),
        _ => {
            logging::init_console();
            None
        }
    };

    let config = TriageConfig::from_env().context("invalid triage configuration")?;
    let mailbox_config = MailboxConfig::from_env().context("invalid mailbox configuration")?;

    let engine = SummaryEngine::from_config(&config);

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Inbox: {}", mailbox_config.inbox_dir.display());
    eprintln!(
        "   Summaries: {}",
        if engine.is_abstractive() {
            format!("abstractive ({})", config.model)
        } else {
            "extractive".to_string()
        }
    );
    if !config.selection.is_all() {
        eprintln!("   Selecting: {:?}", config.selection);
    }
    eprintln!(
        "   Replies: {}\n",
        match (config.auto_reply, config.dry_run) {
            (false, _) => "off",
            (true, true) => "dry run",
            (true, false) => "live",
        }
    );

    let mailbox = Arc::new(
        DirectoryMailbox::open(&mailbox_config)
            .await
            .with_context(|| format!("failed to open {}", mailbox_config.inbox_dir.display()))?,
    );

    let targeted = !config.selection.is_all();
    let processor = TriageProcessor::for_mailbox(mailbox, engine, config);
    let reports = processor.run().await?;

    if reports.is_empty() {
        if targeted {
            println!("No message arrived within the target window. Widen the tolerance or the query.");
        } else {
            println!("No messages matched.");
        }
    }
    for report in &reports {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &TriageReport) {
    println!("From:    {}", report.from);
    println!("Subject: {}", report.subject);
    println!("Summary: {}", report.summary.text);
    println!("Verdict: {}", report.verdict.label());
    match &report.action {
        ReplyAction::SummaryOnly => {}
        ReplyAction::Skipped { reason } => println!("Reply:   skipped ({reason})"),
        ReplyAction::WouldSend { to, subject, body } => {
            println!("Reply:   would send to {to}: {subject}");
            for line in body.lines() {
                println!("    {line}");
            }
        }
        ReplyAction::Sent { sent_id } => println!("Reply:   sent ({sent_id})"),
        ReplyAction::SendFailed { reason } => println!("Reply:   failed ({reason})"),
    }
    println!("{}", "-".repeat(60));
}
