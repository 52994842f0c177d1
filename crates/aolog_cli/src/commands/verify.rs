//! Verify command implementation.

use super::{format_size, open_read_only_storage, CliError};
use aolog_core::{verify_storage, VerifyReport};
use std::path::Path;

/// Runs the verify command.
///
/// Walks every record without modifying the file and fails if any
/// structural problem is found. A log that only needs recovery passes.
pub fn run(path: &Path, page_size: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying log at {:?}", path);
    println!();

    let (_, storage) = open_read_only_storage(path, page_size)?;
    let report = verify_storage(&storage)?;
    print_report(&report);

    println!();
    if report.is_ok() {
        println!("✓ Log verification passed");
        Ok(())
    } else {
        println!("✗ Log verification failed");
        Err(CliError::VerificationFailed(report.problems.len()).into())
    }
}

fn print_report(report: &VerifyReport) {
    println!("  File size:            {} bytes", format_size(report.file_size));
    println!("  Committed records:    {}", report.data_records);
    println!("  Uncommitted records:  {}", report.uncommitted_records);
    println!("  Padding records:      {}", report.padding_records);
    println!("  Header count:         {}", report.header.records_count);
    println!("  Walk ended at offset: {}", report.scanned_until);
    println!(
        "  Status:               {}",
        if report.header.is_closed() {
            "closed"
        } else {
            "opened (not closed properly or in use)"
        }
    );
    if report.needs_recovery {
        println!(
            "  Recovery pending for [{}..{})",
            report.header.committed_up_to, report.header.allocated_up_to
        );
    }
    for problem in &report.problems {
        println!("  ERROR: {problem}");
    }
}
