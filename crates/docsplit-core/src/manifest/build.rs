use std::collections::HashSet;

use super::{ItemTask, Manifest, ManifestMeta, WorkItem, MANIFEST_VERSION};
use crate::collab::{sanitize_filename, DestinationRef};
use crate::job_db::unix_millis;
use crate::phase::Phase;
use crate::preflight::PreflightReport;
use crate::state_store::{ItemRecord, OutputRef};

/// Pick `stem.ext`, or `stem (2).ext`, `stem (3).ext`, ... if taken.
fn unique_name(taken: &mut HashSet<String>, stem: &str, ext: &str) -> String {
    let stem = match sanitize_filename(stem) {
        s if s.is_empty() => "output".to_string(),
        s => s,
    };
    let with_ext = |s: &str| {
        if ext.is_empty() {
            s.to_string()
        } else {
            format!("{}.{}", s, ext)
        }
    };
    let mut name = with_ext(&stem);
    let mut n = 2;
    while taken.contains(&name) {
        name = with_ext(&format!("{} ({})", stem, n));
        n += 1;
    }
    taken.insert(name.clone());
    name
}

/// One extract item per range group, in group order.
pub fn build_split_manifest(job_id: &str, report: &PreflightReport) -> Manifest {
    let mut taken = HashSet::new();
    let items = report
        .groups
        .iter()
        .enumerate()
        .map(|(i, group)| WorkItem {
            index: i as u32 + 1,
            label: group.label.clone(),
            task: ItemTask::Extract {
                segments: group.segments.clone(),
                output_name: unique_name(&mut taken, &group.label, &report.output_extension),
            },
        })
        .collect();

    Manifest {
        version: MANIFEST_VERSION,
        job_id: job_id.to_string(),
        phase: Phase::Split,
        created_at: unix_millis(),
        items,
        meta: ManifestMeta::Split {
            source: report.source.clone(),
            total_units: report.total_units,
            backend: report.backend.clone(),
        },
    }
}

/// One upload item per successful split output, in split index order.
/// Failed or missing split items are skipped.
pub fn build_upload_manifest(
    job_id: &str,
    split: &Manifest,
    split_items: &[ItemRecord],
    destination: DestinationRef,
) -> Manifest {
    let mut items = Vec::new();
    for work in &split.items {
        let Some(record) = split_items
            .iter()
            .find(|r| r.index == work.index && r.is_success())
        else {
            continue;
        };
        let Some(OutputRef::Artifact { path, .. }) = &record.output else {
            continue;
        };
        let remote_name = match &work.task {
            ItemTask::Extract { output_name, .. } => output_name.clone(),
            ItemTask::Upload { remote_name, .. } => remote_name.clone(),
        };
        items.push(WorkItem {
            index: items.len() as u32 + 1,
            label: work.label.clone(),
            task: ItemTask::Upload {
                artifact_path: path.clone(),
                remote_name,
                source_index: work.index,
            },
        });
    }

    Manifest {
        version: MANIFEST_VERSION,
        job_id: job_id.to_string(),
        phase: Phase::Upload,
        created_at: unix_millis(),
        items,
        meta: ManifestMeta::Upload { destination },
    }
}
