// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations and output rendering.

use std::io::IsTerminal;

use colored::Colorize;
use parley_core::types::{AccountId, IdentityRecord, PhoneNumber};
use parley_core::ParleyError;
use parley_identity::{Candidate, IdentityService, MergeOutcome, ReconcileReport};
use serde::Serialize;

use crate::Commands;

/// Output mode chosen on the command line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Output {
    json: bool,
    color: bool,
}

impl Output {
    /// Colors are disabled by `--plain` or when stdout is not a TTY.
    pub(crate) fn new(json: bool, plain: bool) -> Self {
        Self {
            json,
            color: !plain && std::io::stdout().is_terminal(),
        }
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<(), ParleyError> {
        let rendered = serde_json::to_string_pretty(value)
            .map_err(|e| ParleyError::Internal(format!("failed to serialize output: {e}")))?;
        println!("{rendered}");
        Ok(())
    }
}

/// Summary of a reconciliation pass for `--json` output.
#[derive(Debug, Serialize)]
pub(crate) struct ReportView {
    pub looked_up: usize,
    pub resolved: usize,
    pub unregistered: usize,
    pub failed_batches: usize,
    pub failed_existence_checks: usize,
    pub changes: Vec<OutcomeView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OutcomeView {
    pub kind: String,
    pub survivor: Option<String>,
    pub retired: Vec<String>,
}

impl From<&MergeOutcome> for OutcomeView {
    fn from(outcome: &MergeOutcome) -> Self {
        Self {
            kind: format!("{:?}", outcome.kind),
            survivor: outcome.survivor.as_ref().map(ToString::to_string),
            retired: outcome.retired().map(ToString::to_string).collect(),
        }
    }
}

impl From<&ReconcileReport> for ReportView {
    fn from(report: &ReconcileReport) -> Self {
        Self {
            looked_up: report.looked_up,
            resolved: report.resolved,
            unregistered: report.unregistered,
            failed_batches: report.failed_batches,
            failed_existence_checks: report.failed_existence_checks,
            changes: report.outcomes.iter().map(OutcomeView::from).collect(),
        }
    }
}

pub(crate) async fn dispatch(
    service: &IdentityService,
    command: Commands,
    output: &Output,
) -> Result<(), ParleyError> {
    match command {
        Commands::Lookup { phones } => run_lookup(service, &phones, output).await,
        Commands::Show { phone } => run_show(service, &phone, output).await,
        Commands::List => run_list(service, output).await,
        Commands::NextOrdering => {
            let value = service.next_ordering_value()?;
            if output.json {
                output.print_json(&serde_json::json!({ "ordering_value": value }))
            } else {
                println!("{value}");
                Ok(())
            }
        }
        Commands::Observe { phone, account } => {
            run_observe(service, phone.as_deref(), account.as_deref(), output).await
        }
    }
}

async fn run_lookup(
    service: &IdentityService,
    phones: &[String],
    output: &Output,
) -> Result<(), ParleyError> {
    let report = if phones.is_empty() {
        service.refresh_all().await?
    } else {
        let candidates = phones
            .iter()
            .map(|raw| PhoneNumber::parse(raw).map(Candidate::from))
            .collect::<Result<Vec<_>, _>>()?;
        service.refresh(candidates).await?
    };

    let view = ReportView::from(&report);
    if output.json {
        return output.print_json(&view);
    }

    println!("{}", format_report(&view, output.color));
    for change in &view.changes {
        println!("  {}", format_outcome(change));
    }
    Ok(())
}

async fn run_show(service: &IdentityService, raw: &str, output: &Output) -> Result<(), ParleyError> {
    let phone = PhoneNumber::parse(raw)?;
    let record = service.find_by_phone_number(&phone).await;

    if output.json {
        return output.print_json(&record);
    }
    match record {
        Some(record) => println!("{}", format_record(&record, output.color)),
        None => println!("no record for {phone}"),
    }
    Ok(())
}

async fn run_list(service: &IdentityService, output: &Output) -> Result<(), ParleyError> {
    let records = service.records().await;
    if output.json {
        return output.print_json(&records);
    }
    for record in &records {
        println!("{}", format_record(record, output.color));
    }
    println!("{} record(s)", records.len());
    Ok(())
}

async fn run_observe(
    service: &IdentityService,
    phone: Option<&str>,
    account: Option<&str>,
    output: &Output,
) -> Result<(), ParleyError> {
    let phone = phone.map(PhoneNumber::parse).transpose()?;
    let account = account.map(AccountId::parse).transpose()?;

    let outcome = service.observe(phone.as_ref(), account.as_ref()).await?;
    let view = OutcomeView::from(&outcome);
    if output.json {
        return output.print_json(&view);
    }
    println!("{}", format_outcome(&view));
    Ok(())
}

pub(crate) fn format_record(record: &IdentityRecord, color: bool) -> String {
    let phone = record
        .phone_number
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    let account = record
        .account_id
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);

    let mut line = format!("{}  {phone:<16}  {account}", record.local_id);
    if let Some(secondary) = &record.secondary_id {
        line.push_str(&format!("  ({secondary})"));
    }
    if record.is_unregistered() {
        let tag = if color {
            "unregistered".yellow().to_string()
        } else {
            "unregistered".to_string()
        };
        line.push_str(&format!("  [{tag}]"));
    }
    line
}

pub(crate) fn format_report(view: &ReportView, color: bool) -> String {
    let failures = view.failed_batches + view.failed_existence_checks;
    let summary = format!(
        "looked up {}, resolved {}, unregistered {}, {} change(s)",
        view.looked_up,
        view.resolved,
        view.unregistered,
        view.changes.len()
    );
    if failures == 0 {
        return summary;
    }

    let warning = format!(
        "{} failed batch(es), {} failed existence check(s)",
        view.failed_batches, view.failed_existence_checks
    );
    if color {
        format!("{summary}; {}", warning.red())
    } else {
        format!("{summary}; {warning}")
    }
}

fn format_outcome(view: &OutcomeView) -> String {
    let mut line = view.kind.to_lowercase();
    if let Some(survivor) = &view.survivor {
        line.push_str(&format!(" -> {survivor}"));
    }
    if !view.retired.is_empty() {
        line.push_str(&format!(" (retired {})", view.retired.join(", ")));
    }
    line
}
