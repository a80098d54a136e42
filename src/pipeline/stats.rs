use tracing::info;

use super::{FailureStage, ItemOutcome};

/// Counters for a single run. Not persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStatistics {
    pub total: usize,
    pub processed: usize,
    pub updated: usize,
    pub skipped_duplicate: usize,
    pub skipped_unchanged: usize,
    pub failed: usize,
    pub failed_title: usize,
    pub failed_description: usize,
    pub failed_write: usize,
}

impl RunStatistics {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            ItemOutcome::SkippedUnchanged => self.skipped_unchanged += 1,
            ItemOutcome::Previewed { would_change: false } => self.skipped_unchanged += 1,
            ItemOutcome::Previewed { would_change: true } => {}
            ItemOutcome::Failed(stage) => {
                self.failed += 1;
                match stage {
                    FailureStage::Title => self.failed_title += 1,
                    FailureStage::Description => self.failed_description += 1,
                    FailureStage::Write => self.failed_write += 1,
                }
            }
        }
    }

    pub fn log(&self) {
        info!(
            total = self.total,
            processed = self.processed,
            updated = self.updated,
            skipped_duplicate = self.skipped_duplicate,
            skipped_unchanged = self.skipped_unchanged,
            failed = self.failed,
            failed_title = self.failed_title,
            failed_description = self.failed_description,
            failed_write = self.failed_write,
            "Run finished"
        );
    }

    pub fn print(&self) {
        println!("{}", "=".repeat(44));
        println!("Summary");
        println!("{}", "=".repeat(44));
        println!("  Total products:       {}", self.total);
        println!("  Processed:            {}", self.processed);
        println!("  Updated:              {}", self.updated);
        println!("  Skipped (duplicate):  {}", self.skipped_duplicate);
        println!("  Skipped (unchanged):  {}", self.skipped_unchanged);
        println!("  Failed:               {}", self.failed);
        if self.failed > 0 {
            println!("    title:              {}", self.failed_title);
            println!("    description:        {}", self.failed_description);
            println!("    write:              {}", self.failed_write);
        }
        println!("{}", "=".repeat(44));
    }
}
