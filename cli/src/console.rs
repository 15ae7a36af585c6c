use application::{FailureKind, ImportFailure, ImportReport, ProgressReporter, RunSummary};
use domain::DocumentName;

/// Prints progress and completion lines to stdout, per-file failures to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn importing(&self, document: &DocumentName) {
        println!("Importing {}", document);
    }

    fn import_failed(&self, failure: &ImportFailure) {
        eprintln!("{}", failure_line(failure));
    }

    fn container_done(&self, label: &str) {
        println!("Done importing {}!", label);
    }
}

fn failure_line(failure: &ImportFailure) -> String {
    match failure.kind {
        FailureKind::Store => failure.reason.clone(),
        FailureKind::Other => format!("skipped {}: {}", failure.document, failure.reason),
    }
}

fn report_line(report: &ImportReport) -> String {
    if report.imported.is_empty() && !report.simulated.is_empty() {
        format!(
            "{}: {} would be imported",
            report.container,
            report.simulated.len()
        )
    } else {
        format!(
            "{}: {} imported, {} failed",
            report.container,
            report.imported.len(),
            report.failures.len()
        )
    }
}

pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    vec![report_line(&summary.cases), report_line(&summary.names)]
}
