//! Debug snapshots of captured tooltip text.
//!
//! Written per roll when snapshots are enabled. Failures are logged and
//! swallowed; diagnostics never interrupt a running session.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub struct SnapshotWriter {
    dir: PathBuf,
    seq: u64,
}

impl SnapshotWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, seq: 0 }
    }

    /// Write one snapshot, returning its filename.
    pub fn write(&mut self, step_name: &str, text: &str) -> Result<String> {
        self.seq += 1;
        let filename = format!("snap_{:05}_{step_name}.txt", self.seq);
        fs::create_dir_all(&self.dir).with_context(|| format!("create {:?}", self.dir))?;
        let path = self.dir.join(&filename);
        fs::write(&path, text).with_context(|| format!("write {path:?}"))?;
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_sequenced() {
        let dir = std::env::temp_dir().join(format!("crafter-snap-{}", std::process::id()));
        let mut w = SnapshotWriter::new(dir.clone());
        assert_eq!(w.write("tooltip", "+80 to maximum Life").unwrap(), "snap_00001_tooltip.txt");
        assert_eq!(w.write("tooltip", "+12 to Dexterity").unwrap(), "snap_00002_tooltip.txt");
        let _ = fs::remove_dir_all(dir);
    }
}
