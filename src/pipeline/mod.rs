//! Per-item update state machine and the whole-catalog run loop.
//!
//! For every product: skip if checkpointed, refine the title, derive the slug,
//! refine the description with the refined title as context, then either
//! checkpoint an unchanged item or write the patch, audit it and checkpoint it.
//! Items that fail at any step stay un-checkpointed and are retried next run.

pub mod stats;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogClient, CatalogItem, UpdateOutcome};
use crate::config::RunSettings;
use crate::content::{has_material_change, slugify, RefinedContent, SeoPolicy};
use crate::refine::Refiner;
use crate::store::{AuditEntry, AuditLog, CheckpointStore};

pub use stats::RunStatistics;

/// Run-level knobs, independent of the services.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Refine and report, but never write, checkpoint or audit.
    pub preview: bool,
    pub limit: Option<usize>,
    /// Pause after every item, whatever its outcome.
    pub item_delay: Duration,
    pub show_progress: bool,
}

impl PipelineOptions {
    pub fn from_settings(run: &RunSettings) -> Self {
        Self {
            preview: run.preview,
            // Zero means no cap.
            limit: run.limit.filter(|&n| n > 0),
            item_delay: run.item_delay(),
            show_progress: run.show_progress,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Title,
    Description,
    Write,
}

/// Terminal state of one item in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Updated,
    SkippedDuplicate,
    SkippedUnchanged,
    Previewed { would_change: bool },
    Failed(FailureStage),
}

pub struct UpdatePipeline<C, R> {
    catalog: C,
    refiner: R,
    checkpoints: CheckpointStore,
    audit: AuditLog,
    policy: SeoPolicy,
    options: PipelineOptions,
}

impl<C: CatalogClient, R: Refiner> UpdatePipeline<C, R> {
    pub fn new(
        catalog: C,
        refiner: R,
        checkpoints: CheckpointStore,
        audit: AuditLog,
        policy: SeoPolicy,
        options: PipelineOptions,
    ) -> Self {
        Self {
            catalog,
            refiner,
            checkpoints,
            audit,
            policy,
            options,
        }
    }

    /// Fetch the catalog once and walk it in order.
    ///
    /// Only a failed catalog fetch is an error; every per-item problem ends up
    /// in the returned statistics.
    pub async fn run(&mut self) -> Result<RunStatistics> {
        if self.options.preview {
            warn!("Preview mode: no product will be updated, nothing will be checkpointed");
        }

        if self.checkpoints.is_empty() {
            info!("No checkpoints yet, starting from scratch");
        } else {
            info!("{} products already checkpointed", self.checkpoints.len());
        }

        let mut items = self
            .catalog
            .list_all()
            .await
            .context("failed to fetch the catalog")?;

        let mut stats = RunStatistics::default();
        if items.is_empty() {
            info!("No products found to process");
            return Ok(stats);
        }
        if let Some(limit) = self.options.limit {
            if items.len() > limit {
                items.truncate(limit);
                info!("Processing limited to {} products", limit);
            }
        }
        stats.total = items.len();
        info!("Processing {} products", items.len());

        let pb = if self.options.show_progress {
            let pb = ProgressBar::new(items.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                    .progress_chars("=> "),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        for item in &items {
            let outcome = self.process_item(item).await;
            stats.record(&outcome);
            pb.inc(1);
            tokio::time::sleep(self.options.item_delay).await;
        }

        pb.finish_and_clear();
        stats.log();
        Ok(stats)
    }

    /// Drive one item to a terminal state.
    pub async fn process_item(&mut self, item: &CatalogItem) -> ItemOutcome {
        let id = item.id;
        info!(item_id = %id, title = %item.title, "Processing product");

        if self.checkpoints.is_processed(id) {
            info!(item_id = %id, "Already processed, skipping");
            return ItemOutcome::SkippedDuplicate;
        }

        let content = match self.refine(item).await {
            Ok(content) => content,
            Err(stage) => return ItemOutcome::Failed(stage),
        };

        let changed = has_material_change(
            &item.title,
            &content.title,
            &item.description,
            &content.description,
        );

        if self.options.preview {
            info!(
                item_id = %id,
                would_change = changed,
                title = %content.title,
                slug = %content.slug,
                description = %content.description,
                "Preview"
            );
            return ItemOutcome::Previewed {
                would_change: changed,
            };
        }

        if !changed {
            info!(item_id = %id, "Content unchanged, skipping update");
            self.checkpoint(item);
            return ItemOutcome::SkippedUnchanged;
        }

        let patch = content.to_patch(&self.policy);
        debug!(item_id = %id, seo_title = %content.seo_title, "Writing patch");
        match self.catalog.apply_update(id, &patch).await {
            UpdateOutcome::Applied => {
                info!(item_id = %id, "Updated");
                self.record_audit(item, &content);
                self.checkpoint(item);
                ItemOutcome::Updated
            }
            UpdateOutcome::Failed => {
                error!(item_id = %id, "Update rejected, will retry next run");
                ItemOutcome::Failed(FailureStage::Write)
            }
        }
    }

    async fn refine(&self, item: &CatalogItem) -> Result<RefinedContent, FailureStage> {
        let id = item.id;
        let Some(title) = self.refiner.refine_title(&item.title).await else {
            error!(item_id = %id, "Failed to get refined title");
            return Err(FailureStage::Title);
        };
        let slug = slugify(&title);
        info!(item_id = %id, refined_title = %title, slug = %slug, "Title refined");

        let Some(description) = self
            .refiner
            .refine_description(&item.description, &title)
            .await
        else {
            error!(item_id = %id, "Failed to get refined description");
            return Err(FailureStage::Description);
        };
        debug!(item_id = %id, description = %description, "Description refined");

        Ok(RefinedContent::new(title, slug, description, &self.policy))
    }

    fn checkpoint(&mut self, item: &CatalogItem) {
        if let Err(e) = self.checkpoints.mark_processed(item.id) {
            error!(item_id = %item.id, "Could not save checkpoint: {}", e);
        }
    }

    fn record_audit(&mut self, item: &CatalogItem, content: &RefinedContent) {
        let entry = AuditEntry {
            item_id: item.id,
            previous_title: item.title.clone(),
            new_title: content.title.clone(),
            new_slug: content.slug.clone(),
            seo_title: content.seo_title.clone(),
            previous_description: item.description.clone(),
            new_description: content.description.clone(),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.audit.record(entry) {
            error!(item_id = %item.id, "Could not save audit entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::catalog::{ItemId, ProductPatch};
    use crate::store::LoadPolicy;

    struct FakeCatalog {
        items: Vec<CatalogItem>,
        reject: HashSet<ItemId>,
        writes: Mutex<Vec<(ItemId, ProductPatch)>>,
        unreachable: bool,
    }

    impl FakeCatalog {
        fn new(items: Vec<CatalogItem>) -> Self {
            Self {
                items,
                reject: HashSet::new(),
                writes: Mutex::new(Vec::new()),
                unreachable: false,
            }
        }

        fn writes(&self) -> Vec<(ItemId, ProductPatch)> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn list_all(&self) -> Result<Vec<CatalogItem>> {
            anyhow::ensure!(!self.unreachable, "connection refused");
            Ok(self.items.clone())
        }

        async fn apply_update(&self, id: ItemId, patch: &ProductPatch) -> UpdateOutcome {
            if self.reject.contains(&id) {
                return UpdateOutcome::Failed;
            }
            self.writes.lock().unwrap().push((id, patch.clone()));
            UpdateOutcome::Applied
        }
    }

    /// Answers from lookup tables; anything not listed comes back absent.
    #[derive(Default)]
    struct FakeRefiner {
        titles: HashMap<String, String>,
        descriptions: HashMap<String, String>,
        calls: AtomicUsize,
        description_contexts: Mutex<Vec<String>>,
    }

    impl FakeRefiner {
        fn title(mut self, from: &str, to: &str) -> Self {
            self.titles.insert(from.into(), to.into());
            self
        }

        fn description(mut self, from: &str, to: &str) -> Self {
            self.descriptions.insert(from.into(), to.into());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Refiner for FakeRefiner {
        async fn refine_title(&self, original_title: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.titles.get(original_title).cloned()
        }

        async fn refine_description(
            &self,
            original_description: &str,
            refined_title: &str,
        ) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.description_contexts
                .lock()
                .unwrap()
                .push(refined_title.to_string());
            self.descriptions.get(original_description).cloned()
        }
    }

    fn policy() -> SeoPolicy {
        SeoPolicy {
            title_suffix: " - WK Reifen".into(),
            title_key: "_yoast_wpseo_title".into(),
            description_key: "_yoast_wpseo_metadesc".into(),
            focus_keyword_key: None,
        }
    }

    fn options(preview: bool) -> PipelineOptions {
        PipelineOptions {
            preview,
            limit: None,
            item_delay: Duration::ZERO,
            show_progress: false,
        }
    }

    fn pipeline(
        dir: &Path,
        catalog: FakeCatalog,
        refiner: FakeRefiner,
        preview: bool,
    ) -> UpdatePipeline<FakeCatalog, FakeRefiner> {
        let checkpoints =
            CheckpointStore::open(dir.join("processed_items.json"), LoadPolicy::Strict).unwrap();
        let audit = AuditLog::open(dir.join("update_logs.json"), LoadPolicy::Strict).unwrap();
        UpdatePipeline::new(catalog, refiner, checkpoints, audit, policy(), options(preview))
    }

    fn tyre_catalog() -> Vec<CatalogItem> {
        vec![
            CatalogItem::new(1, "winterreifen 205/55 r16", "alt"),
            CatalogItem::new(2, "Sommerreifen 195/65", ""),
            CatalogItem::new(3, "Allwetter 225/45", "Guter Reifen"),
        ]
    }

    fn tyre_refiner() -> FakeRefiner {
        FakeRefiner::default()
            .title("winterreifen 205/55 r16", "Winterreifen 205/55 R16 91H")
            .title("Sommerreifen 195/65", "Sommerreifen 195/65 R15 91V")
            .title("Allwetter 225/45", "Ganzjahresreifen 225/45 R17")
            .description("alt", "Sicher durch den Winter.")
            .description("", "Leise und sparsam im Sommer.")
            .description("Guter Reifen", "Ganzjährig sicherer Grip.")
    }

    #[tokio::test]
    async fn updates_every_changed_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);

        let stats = p.run().await.unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.updated, 3);
        assert_eq!(stats.failed, 0);
        assert_eq!(p.audit.len(), 3);
        assert_eq!(p.checkpoints.len(), 3);

        let writes = p.catalog.writes();
        let (id, patch) = &writes[0];
        assert_eq!(*id, ItemId(1));
        assert_eq!(patch.name, "Winterreifen 205/55 R16 91H");
        assert_eq!(patch.slug, "winterreifen-20555-r16-91h");
        assert_eq!(patch.meta_data[0].value, "Winterreifen 205/55 R16 91H - WK Reifen");
        assert_eq!(patch.meta_data[1].value, "Sicher durch den Winter.");

        let entry = &p.audit.entries()[2];
        assert_eq!(entry.item_id, ItemId(3));
        assert_eq!(entry.previous_title, "Allwetter 225/45");
        assert_eq!(entry.previous_description, "Guter Reifen");
        assert_eq!(entry.new_slug, "ganzjahresreifen-22545-r17");
        assert_eq!(entry.seo_title, "Ganzjahresreifen 225/45 R17 - WK Reifen");
    }

    #[tokio::test]
    async fn description_uses_refined_title() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::new(vec![CatalogItem::new(1, "winterreifen 205/55 r16", "alt")]);
        let mut p = pipeline(dir.path(), catalog, tyre_refiner(), false);
        p.run().await.unwrap();
        let contexts = p.refiner.description_contexts.lock().unwrap().clone();
        assert_eq!(contexts, ["Winterreifen 205/55 R16 91H"]);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = pipeline(dir.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);
        first.run().await.unwrap();
        let audit_before = fs::read(dir.path().join("update_logs.json")).unwrap();

        let mut second = pipeline(dir.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);
        let stats = second.run().await.unwrap();

        assert_eq!(stats.skipped_duplicate, 3);
        assert_eq!(stats.updated, 0);
        assert!(second.catalog.writes().is_empty());
        assert_eq!(second.refiner.calls(), 0);
        assert_eq!(second.audit.len(), 3);
        assert_eq!(fs::read(dir.path().join("update_logs.json")).unwrap(), audit_before);
    }

    #[tokio::test]
    async fn case_only_title_change_is_checkpointed_without_write() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::new(vec![CatalogItem::new(7, "Winterreifen 205/55", "Guter Reifen")]);
        let refiner = FakeRefiner::default()
            .title("Winterreifen 205/55", "WINTERREIFEN 205/55")
            .description("Guter Reifen", "Guter Reifen");
        let mut p = pipeline(dir.path(), catalog, refiner, false);

        let stats = p.run().await.unwrap();

        assert_eq!(stats.skipped_unchanged, 1);
        assert_eq!(stats.updated, 0);
        assert!(p.catalog.writes().is_empty());
        assert!(p.audit.is_empty());
        assert!(p.checkpoints.is_processed(ItemId(7)));
        assert!(!dir.path().join("update_logs.json").exists());
    }

    #[tokio::test]
    async fn refinement_failure_is_not_checkpointed() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::new(vec![
            CatalogItem::new(1, "unbekannt", ""),
            CatalogItem::new(2, "Sommerreifen 195/65", "kein Eintrag"),
            CatalogItem::new(3, "Allwetter 225/45", "Guter Reifen"),
        ]);
        let mut p = pipeline(dir.path(), catalog, tyre_refiner(), false);

        let stats = p.run().await.unwrap();

        assert_eq!(stats.failed, 2);
        assert_eq!(stats.failed_title, 1);
        assert_eq!(stats.failed_description, 1);
        assert_eq!(stats.updated, 1);
        assert!(!p.checkpoints.is_processed(ItemId(1)));
        assert!(!p.checkpoints.is_processed(ItemId(2)));
        assert!(p.checkpoints.is_processed(ItemId(3)));
    }

    #[tokio::test]
    async fn failure_stage_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), FakeCatalog::new(Vec::new()), tyre_refiner(), false);
        let title_fail = p.process_item(&CatalogItem::new(1, "unbekannt", "alt")).await;
        let desc_fail = p
            .process_item(&CatalogItem::new(2, "Allwetter 225/45", "kein Eintrag"))
            .await;
        assert_eq!(title_fail, ItemOutcome::Failed(FailureStage::Title));
        assert_eq!(desc_fail, ItemOutcome::Failed(FailureStage::Description));
    }

    #[tokio::test]
    async fn rejected_write_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = FakeCatalog::new(tyre_catalog());
        catalog.reject.insert(ItemId(2));
        let mut first = pipeline(dir.path(), catalog, tyre_refiner(), false);

        let stats = first.run().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failed_write, 1);
        assert_eq!(stats.updated, 2);
        assert!(!first.checkpoints.is_processed(ItemId(2)));
        assert!(first.audit.entries().iter().all(|e| e.item_id != ItemId(2)));

        let mut second = pipeline(dir.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);
        let stats = second.run().await.unwrap();
        assert_eq!(stats.skipped_duplicate, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(second.catalog.writes()[0].0, ItemId(2));
    }

    #[tokio::test]
    async fn preview_leaves_stores_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut seed = pipeline(
            dir.path(),
            FakeCatalog::new(vec![CatalogItem::new(1, "winterreifen 205/55 r16", "alt")]),
            tyre_refiner(),
            false,
        );
        seed.run().await.unwrap();
        let checkpoint_before = fs::read(dir.path().join("processed_items.json")).unwrap();
        let audit_before = fs::read(dir.path().join("update_logs.json")).unwrap();

        let mut catalog_items = tyre_catalog();
        catalog_items.push(CatalogItem::new(4, "unbekannt", ""));
        let mut preview = pipeline(dir.path(), FakeCatalog::new(catalog_items), tyre_refiner(), true);
        let stats = preview.run().await.unwrap();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.skipped_duplicate, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.updated, 0);
        assert!(preview.catalog.writes().is_empty());
        assert_eq!(fs::read(dir.path().join("processed_items.json")).unwrap(), checkpoint_before);
        assert_eq!(fs::read(dir.path().join("update_logs.json")).unwrap(), audit_before);
    }

    #[tokio::test]
    async fn preview_reports_unchanged_items() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::new(vec![CatalogItem::new(7, "Winterreifen 205/55", "x")]);
        let refiner = FakeRefiner::default()
            .title("Winterreifen 205/55", "winterreifen 205/55")
            .description("x", "x");
        let mut p = pipeline(dir.path(), catalog, refiner, true);
        let outcome = p
            .process_item(&CatalogItem::new(7, "Winterreifen 205/55", "x"))
            .await;
        assert_eq!(outcome, ItemOutcome::Previewed { would_change: false });
        assert!(!p.checkpoints.is_processed(ItemId(7)));
        assert!(!dir.path().join("processed_items.json").exists());
    }

    #[tokio::test]
    async fn limit_truncates_in_fetch_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);
        p.options.limit = Some(2);

        let stats = p.run().await.unwrap();

        assert_eq!(stats.total, 2);
        let ids: Vec<ItemId> = p.catalog.writes().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, [ItemId(1), ItemId(2)]);
        assert!(!p.checkpoints.is_processed(ItemId(3)));
    }

    #[tokio::test]
    async fn zero_limit_from_settings_means_no_cap() {
        let mut run = crate::config::RunSettings::default();
        run.limit = Some(0);
        run.item_delay_ms = 0;
        run.show_progress = false;
        let options = PipelineOptions::from_settings(&run);
        assert_eq!(options.limit, None);

        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);
        p.options = options;
        let stats = p.run().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.updated, 3);
    }

    #[tokio::test]
    async fn unreachable_catalog_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = FakeCatalog::new(tyre_catalog());
        catalog.unreachable = true;
        let mut p = pipeline(dir.path(), catalog, tyre_refiner(), false);

        assert!(p.run().await.is_err());
        assert_eq!(p.refiner.calls(), 0);
        assert!(p.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_finishes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(dir.path(), FakeCatalog::new(Vec::new()), tyre_refiner(), false);
        assert_eq!(p.run().await.unwrap(), RunStatistics::default());
    }

    #[tokio::test]
    async fn independent_pipelines_do_not_share_state() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let mut pa = pipeline(a.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);
        let mut pb = pipeline(b.path(), FakeCatalog::new(tyre_catalog()), tyre_refiner(), false);
        pa.run().await.unwrap();
        let stats = pb.run().await.unwrap();
        assert_eq!(stats.updated, 3);
        assert_eq!(stats.skipped_duplicate, 0);
    }
}
