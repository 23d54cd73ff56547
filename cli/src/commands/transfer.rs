use anyhow::Context;
use colored::*;
use indicatif::HumanBytes;
use tracing::info;

use transfer_common::config::Config;
use transfer_common::manifest::Manifest;
use transfer_core::auth::AuthSource;
use transfer_core::gcs::GcsStore;
use transfer_core::output::MetadataSink;
use transfer_core::transfer::{EntryReport, FailedEntry, TransferService, TransferSummary};

use crate::commands::CommandLine;
use crate::mprint;
use crate::terminal::{colors, print, progress};

type Detail = (String, ColoredString);

pub async fn transfer(cmd: &CommandLine, cfg: &Config) -> anyhow::Result<()> {
    let manifest = Manifest::load(&cfg.manifest)
        .with_context(|| format!("failed to load manifest {}", cfg.manifest.display()))?;

    let auth = AuthSource::select(cmd.access_token.clone(), cmd.credentials.clone(), cmd.anonymous);
    let store = GcsStore::from_config(cfg, auth).context("failed to create storage client")?;
    let mut sink = MetadataSink::open(&cfg.meta_outfile)
        .with_context(|| format!("failed to open {}", cfg.meta_outfile.display()))?;

    print_plan(cfg, &manifest, &store);

    let service = TransferService::new(store, cfg.transfer_settings())
        .with_progress(Box::new(progress::report));

    progress::init_progress(!cmd.no_progress && cfg.quiet == 0);
    let result = service.run(&manifest, &mut sink).await;
    progress::finish();

    let summary = result?;
    info!("Wrote {} records to {}", sink.written(), sink.path().display());
    transfer_ends(&summary, cfg);

    run_outcome(&summary)
}

/// Any failed or unattempted entry makes the run an error.
fn run_outcome(summary: &TransferSummary) -> anyhow::Result<()> {
    if summary.is_success() {
        return Ok(());
    }
    anyhow::bail!(
        "{} of {} transfers failed, {} not attempted",
        summary.failed.len(),
        summary.total,
        summary.skipped
    )
}

fn print_plan(cfg: &Config, manifest: &Manifest, store: &GcsStore) {
    if cfg.quiet > 0 {
        return;
    }

    let rules: String = if cfg.path_rules.is_empty() {
        "none".to_owned()
    } else {
        cfg.path_rules
            .iter()
            .map(|rule| rule.to_string())
            .collect::<Vec<String>>()
            .join(", ")
    };

    let lines: Vec<(&str, String)> = vec![
        ("Project", cfg.project.clone()),
        ("Manifest", format!("{} ({} objects)", cfg.manifest.display(), manifest.len())),
        ("Target", format!("gs://{}", cfg.target_bucket)),
        ("Outfile", cfg.meta_outfile.display().to_string()),
        ("Delete source", cfg.delete_source.to_string()),
        ("Path rules", rules),
        ("Endpoint", store.endpoint().to_owned()),
        ("Credentials", store.auth().describe()),
    ];

    let key_width: usize = lines.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in lines {
        print::aligned_line(key, value, key_width);
    }
}

fn transfer_ends(summary: &TransferSummary, cfg: &Config) {
    if summary.total == 0 {
        print::header("nothing to transfer", cfg.quiet);
        return;
    }

    if cfg.quiet > 0 {
        mprint!();
    }

    print::header("Transfer Results", cfg.quiet);
    if cfg.quiet < 2 {
        print_reports(summary);
    }
    print_summary(summary, cfg);
}

fn print_reports(summary: &TransferSummary) {
    let count = summary.completed.len() + summary.failed.len();
    let mut printed = 0;

    for report in &summary.completed {
        print_report_tree(report);
        printed += 1;
        if printed != count {
            mprint!();
        }
    }
    for failed in &summary.failed {
        print_failure_tree(failed);
        printed += 1;
        if printed != count {
            mprint!();
        }
    }
}

fn print_report_tree(report: &EntryReport) {
    print::tree_head(report.index, &report.target.to_string());

    let changed: String = report
        .changes
        .iter()
        .map(|change| change.field)
        .collect::<Vec<&str>>()
        .join(", ");

    let details: Vec<Detail> = vec![
        ("Source".to_owned(), report.source.to_string().color(colors::BUCKET)),
        ("Size".to_owned(), HumanBytes(report.record.node.size).to_string().normal()),
        ("Rewrites".to_owned(), report.rewrite_calls.to_string().normal()),
        ("Changed".to_owned(), changed.dimmed()),
        (
            "Original".to_owned(),
            if report.source_deleted {
                "deleted".yellow()
            } else {
                "kept".normal()
            },
        ),
        (
            "Time".to_owned(),
            format!("{:.2}s", report.elapsed.as_secs_f64()).normal(),
        ),
    ];

    print::as_tree_one_level(details);
}

fn print_failure_tree(failed: &FailedEntry) {
    print::tree_head(failed.index, &failed.source.to_string());
    print::as_tree_one_level(vec![(
        "Error".to_owned(),
        failed.error.to_string().color(colors::FAILURE),
    )]);
}

fn print_summary(summary: &TransferSummary, cfg: &Config) {
    let moved: ColoredString = format!("{} objects", summary.completed.len()).bold().green();
    let bytes: ColoredString = HumanBytes(summary.bytes_transferred()).to_string().bold();
    let total_time: ColoredString =
        format!("{:.2}s", summary.elapsed.as_secs_f64()).bold().yellow();

    let mut output: String = format!("Transfer Complete: {moved} ({bytes}) in {total_time}");
    if !summary.failed.is_empty() {
        output = format!(
            "{output}, {}",
            format!("{} failed", summary.failed.len()).bold().red()
        );
    }
    if summary.deleted_sources() > 0 {
        output = format!("{output}, {} sources deleted", summary.deleted_sources());
    }
    let output: String = output.color(colors::TEXT_DEFAULT).to_string();

    match cfg.quiet {
        0 => {
            print::fat_separator();
            print::centerln(&output);
            print::end_of_program();
        }
        _ => print::print_status(&output),
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
