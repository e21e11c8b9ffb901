// ============================================================
// Layer 4 — Folder Scanner
// ============================================================
// Finds the labelled photographs under the data directory.
//
// Expected layout (one folder per task, one sub-folder per class):
//
//   dataset/
//     Leaf/    down/ horizontal/ up/
//     Shape/   conical/ long/ short/
//     Trunk/   basin/ crawl/ stand/
//     Trunk2/  many/ one/
//
// Each image becomes one TreeSample labelled for its folder's
// task only. Missing task or class folders are not an error;
// that class just contributes no samples.
//
// Files are sorted so the scan (and therefore the seeded split)
// is identical on every machine.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::sample::TreeSample;
use crate::domain::task::{Task, TaskLabels};
use crate::domain::traits::SampleSource;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct FolderScanner {
    root: PathBuf,
}

impl FolderScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SampleSource for FolderScanner {
    fn load_all(&self) -> Result<Vec<TreeSample>> {
        if !self.root.is_dir() {
            bail!("Data directory '{}' does not exist", self.root.display());
        }

        let mut samples = Vec::new();

        for task in Task::ALL {
            let mut task_total = 0usize;

            for (class_idx, class_name) in task.class_names().iter().enumerate() {
                let class_dir = self.root.join(task.dir_name()).join(class_name);
                if !class_dir.is_dir() {
                    tracing::debug!("No folder for {}/{}", task, class_name);
                    continue;
                }

                let images = list_images(&class_dir)?;
                tracing::debug!("{}/{}: {} images", task, class_name, images.len());
                task_total += images.len();

                samples.extend(
                    images
                        .into_iter()
                        .map(|path| TreeSample::new(path, TaskLabels::single(task, class_idx))),
                );
            }

            tracing::info!("Task {}: {} images", task, task_total);
        }

        tracing::info!("Scanned {} images under '{}'", samples.len(), self.root.display());
        Ok(samples)
    }
}

/// Sorted image files directly inside `dir`
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_labels_by_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Leaf/up/a.jpg");
        touch(dir.path(), "Leaf/down/b.PNG");
        touch(dir.path(), "Trunk2/one/c.jpeg");
        touch(dir.path(), "Trunk2/one/notes.txt");

        let samples = FolderScanner::new(dir.path()).load_all().unwrap();
        assert_eq!(samples.len(), 3);

        let down = samples.iter().find(|s| s.path.ends_with("b.PNG")).unwrap();
        assert_eq!(down.labels, TaskLabels::single(Task::Leaf, 0));

        let one = samples.iter().find(|s| s.path.ends_with("c.jpeg")).unwrap();
        assert_eq!(one.labels, TaskLabels::single(Task::Trunk2, 1));
    }

    #[test]
    fn test_missing_task_folders_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Shape/long/x.jpg");

        let samples = FolderScanner::new(dir.path()).load_all().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].task(), Some(Task::Shape));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(FolderScanner::new(missing).load_all().is_err());
    }
}
