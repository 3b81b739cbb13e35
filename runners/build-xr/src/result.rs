//! 运行结果.

use mre_berry::prelude::*;
use std::io::{self, Write};

const S4: &str = "    ";

/// 将一次运行的汇总写进 `w` 中.
pub fn describe_summary<W: Write>(summary: &RunSummary, mut w: W) -> io::Result<()> {
    for (subject, status) in &summary.subjects {
        match status {
            SubjectStatus::Processed(r) => {
                let mark = if r.is_consistent() { "" } else { " (!)" };
                writeln!(w, "Subject `{subject}`: slices {:?}{mark}", r.peaks)?;
            }
            SubjectStatus::Skipped(missing) => {
                writeln!(w, "Subject `{subject}`: skipped, missing {missing:?}")?;
            }
            SubjectStatus::Failed(e) => writeln!(w, "Subject `{subject}`: failed, {e}")?,
        }
    }
    writeln!(
        w,
        "Processed: {}, skipped: {}, failed: {}",
        summary.count(|s| matches!(s, SubjectStatus::Processed(_))),
        summary.count(|s| matches!(s, SubjectStatus::Skipped(_))),
        summary.count(|s| matches!(s, SubjectStatus::Failed(_))),
    )?;
    if let Some(path) = &summary.output {
        writeln!(w, "Written to {}", path.display())?;
    }
    Ok(())
}

/// 将仓库的坐标轴与每个受试者的采集切片写进 `w` 中.
pub fn describe_store<W: Write>(store: &VolumeStore, mut w: W) -> io::Result<()> {
    let c = store.coords();
    let g = store.grid();
    writeln!(w, "Store:")?;
    writeln!(w, "{S4}grid: {} x {} x ({} | {})", g.nx, g.ny, g.nz_mri, g.nz_mre)?;
    writeln!(w, "{S4}sequence: {:?}", c.sequence)?;
    writeln!(w, "{S4}mask_type: {:?}", c.mask_type)?;
    writeln!(w, "{S4}mre_type: {:?}", c.mre_type)?;
    for subject in &c.subject {
        let marked = store.marked_slices(subject).unwrap_or_default();
        writeln!(w, "{S4}subject `{subject}`: slice_id {marked:?}")?;
    }
    Ok(())
}
