use crate::config::Config;
use crate::registry::{RegistryClient, Side};
use crate::source_reference::SourceReference;
use crate::tag_diff::missing_tags;
use anyhow::Context;
use tracing::{error, info};

/// Counters for one pass over the manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub references: usize,
    pub skipped: usize,
    pub copied: usize,
    pub failed: usize,
    /// Tags a dry run would have copied
    pub planned: usize,
}

pub struct Syncer<R> {
    config: Config,
    registry: R,
}

impl<R: RegistryClient> Syncer<R> {
    pub fn new(config: Config, registry: R) -> Self {
        Self { config, registry }
    }

    /// Processes every reference in order. A failing reference or tag is logged and
    /// skipped; the run always finishes.
    pub async fn run(&self, references: &[SourceReference]) -> SyncReport {
        let mut report = SyncReport::default();

        for reference in references {
            report.references += 1;
            if let Err(e) = self.sync_reference(reference, &mut report).await {
                error!("Skipping {}: {:#}", reference, e);
                report.skipped += 1;
            }
        }

        info!(
            "Sync finished: {} references, {} skipped, {} tags copied, {} copies failed",
            report.references, report.skipped, report.copied, report.failed
        );
        report
    }

    async fn sync_reference(
        &self,
        reference: &SourceReference,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        let source_tags = self
            .registry
            .list_tags(reference.as_str(), Side::Source)
            .await
            .context("Failed to get remote image tags")?;

        // prefer the repository name as normalized by the registry tool
        let normalized = match source_tags.repository.as_str() {
            "" => None,
            repository => SourceReference::parse(repository).ok(),
        };
        let source = normalized.as_ref().unwrap_or(reference);
        let destination_name = self.config.naming.destination_name(source);
        let destination = self.config.destination.repository(&destination_name);

        let destination_tags = self
            .registry
            .list_tags(&destination, Side::Destination)
            .await
            .context("Failed to get destination image tags")?;

        let diff = missing_tags(&source_tags.tags, &destination_tags.tags);
        info!(
            "Found {} tags of {} missing at {}: {:?}",
            diff.len(),
            source,
            destination,
            diff
        );

        for tag in &diff {
            if self.config.dry_run {
                info!(
                    "Dry run, would copy docker://{}:{} --> docker://{}:{}",
                    source, tag, destination, tag
                );
                report.planned += 1;
                continue;
            }

            match self.registry.copy_tag(source.as_str(), &destination, tag).await {
                Ok(()) => {
                    info!(
                        "Copied docker://{}:{} --> docker://{}:{}",
                        source, tag, destination, tag
                    );
                    report.copied += 1;
                }
                Err(e) => {
                    error!("Failed to copy image: {:#}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(())
    }
}
