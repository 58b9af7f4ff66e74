use std::path::{Path, PathBuf};

use seeker_types::{Report, SessionId};

/// Seam for report writers (the Obsidian vault writer plugs in here).
pub trait ReportSink: Send + Sync {
    fn write_report(&self, session_id: SessionId, report: &Report) -> std::io::Result<PathBuf>;
}

/// Plain filesystem sink: one markdown file per session under the vault
/// directory.
pub struct FsReportSink {
    root: PathBuf,
}

impl FsReportSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ReportSink for FsReportSink {
    fn write_report(&self, session_id: SessionId, report: &Report) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(format!("{session_id}.md"));

        let mut content = format!("# {}\n\n> {}\n\n", report.title, report.summary);
        content.push_str(&report.full_content);
        if !report.citations.is_empty() {
            content.push_str("\n\n## References\n\n");
            for citation in &report.citations {
                content.push_str(&format!("{}. {}\n", citation.id, citation.url));
            }
        }

        std::fs::write(&path, content)?;
        Ok(path)
    }
}
