use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gdrive_core::{DriveClient, DriveError, DriveFile, MediaDownload};
use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TargetFormat;
use crate::convert::{self, ConvertError};

/// Extension of the legacy container format this tool converts.
const SOURCE_EXTENSION: &str = "heic";

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Counts the non-folder descendants of `folder_id`.
///
/// The count is advisory: it is taken once before the walk, so a tree mutated
/// concurrently by another actor makes the progress total wrong.
pub async fn count_files(client: &DriveClient, folder_id: &str) -> Result<u64, DriveError> {
    let mut total = 0;
    let mut folders = vec![folder_id.to_string()];
    while let Some(folder_id) = folders.pop() {
        for child in client.list_children(&folder_id).await? {
            if child.is_folder() {
                folders.push(child.id);
            } else {
                total += 1;
            }
        }
    }
    Ok(total)
}

enum WorkItem {
    Folder { id: String, rel: PathBuf },
    File { file: DriveFile, rel: PathBuf },
}

/// Walks a remote folder tree depth-first in listing order, mirroring the
/// folder hierarchy under a local root and processing every leaf exactly once.
pub struct Walker<'a> {
    client: &'a DriveClient,
    local_root: &'a Path,
    format: TargetFormat,
    progress: &'a ProgressBar,
}

impl<'a> Walker<'a> {
    pub fn new(
        client: &'a DriveClient,
        local_root: &'a Path,
        format: TargetFormat,
        progress: &'a ProgressBar,
    ) -> Self {
        Self {
            client,
            local_root,
            format,
            progress,
        }
    }

    /// An explicit worklist instead of recursion, so remote nesting depth
    /// cannot overflow the call stack.
    pub async fn walk(&self, root_folder_id: &str) -> Result<(), MirrorError> {
        let mut stack = vec![WorkItem::Folder {
            id: root_folder_id.to_string(),
            rel: PathBuf::new(),
        }];
        while let Some(item) = stack.pop() {
            match item {
                WorkItem::Folder { id, rel } => {
                    let children = self.client.list_children(&id).await?;
                    let mut names = NameAllocator::default();
                    let mut discovered = Vec::with_capacity(children.len());
                    for child in children {
                        let child_rel = rel.join(names.allocate(&child.name));
                        if child.is_folder() {
                            fs::create_dir_all(self.local_root.join(&child_rel))?;
                            discovered.push(WorkItem::Folder {
                                id: child.id,
                                rel: child_rel,
                            });
                        } else {
                            discovered.push(WorkItem::File {
                                file: child,
                                rel: child_rel,
                            });
                        }
                    }
                    // Reversed so popping restores listing order.
                    stack.extend(discovered.into_iter().rev());
                }
                WorkItem::File { file, rel } => {
                    self.process_file(&file, &rel).await?;
                    self.progress.inc(1);
                }
            }
        }
        Ok(())
    }

    /// Converts one leaf if its extension matches the source format; anything
    /// else is skipped silently.
    async fn process_file(&self, file: &DriveFile, rel: &Path) -> Result<(), MirrorError> {
        if !matches_source_extension(rel) {
            debug!("skipping {}", rel.display());
            return Ok(());
        }
        let bytes = MediaDownload::new(self.client, file.id.as_str())
            .download_all()
            .await?;
        let image = convert::decode_heic(&bytes)?;
        let output = output_path(self.local_root, rel, self.format);
        convert::save_image(&image, &output, self.format)?;
        debug!("converted {} to {}", rel.display(), output.display());
        Ok(())
    }
}

/// Mirrored local path with the suffix replaced by the target format's.
fn output_path(local_root: &Path, rel: &Path, format: TargetFormat) -> PathBuf {
    local_root.join(rel).with_extension(format.extension())
}

fn matches_source_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
}

/// Hands out sibling names in listing order, disambiguating repeats with a
/// deterministic ` (n)` suffix ahead of the extension.
#[derive(Default)]
struct NameAllocator {
    seen: HashMap<String, u32>,
}

impl NameAllocator {
    fn allocate(&mut self, name: &str) -> String {
        let count = self.seen.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            return name.to_string();
        }
        let disambiguated = disambiguate(name, *count - 1);
        warn!("duplicate sibling name '{name}', mirroring as '{disambiguated}'");
        disambiguated
    }
}

fn disambiguate(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}
