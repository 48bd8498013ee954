//! On-disk layout of the pipeline workspace.
//!
//! ```text
//! {videos_root}/{job_id}/{shot_id}.mp4
//! {videos_root}/{job_id}/final_output.mp4
//! {jobs_root}/{job_id}.json
//! {jobs_root}/storyboards/{storyboard_id}.json
//! {uploads_root}/{timestamp}_{stem}{ext}
//! {temp_root}/...
//! ```

use std::path::{Path, PathBuf};

use crate::error::CoreError;

pub const FINAL_OUTPUT_FILE: &str = "final_output.mp4";
pub const STORYBOARDS_DIR: &str = "storyboards";

/// Image extensions accepted as reference uploads (lowercase, with dot).
pub const ALLOWED_UPLOAD_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Upload file stems are truncated to this many characters.
const MAX_UPLOAD_STEM_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct FileLayout {
    pub videos_root: PathBuf,
    pub jobs_root: PathBuf,
    pub uploads_root: PathBuf,
    pub temp_root: PathBuf,
}

impl FileLayout {
    /// Standard layout with `videos/`, `jobs/`, `uploads/` and `temp/`
    /// under one workspace directory.
    pub fn under(workspace: impl AsRef<Path>) -> Self {
        let root = workspace.as_ref();
        Self {
            videos_root: root.join("videos"),
            jobs_root: root.join("jobs"),
            uploads_root: root.join("uploads"),
            temp_root: root.join("temp"),
        }
    }

    /// Create every root directory if missing.
    pub async fn ensure_dirs(&self) -> Result<(), CoreError> {
        for dir in [
            &self.videos_root,
            &self.jobs_root,
            &self.jobs_root.join(STORYBOARDS_DIR),
            &self.uploads_root,
            &self.temp_root,
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                CoreError::Storage(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.videos_root.join(job_id)
    }

    pub fn shot_path(&self, job_id: &str, shot_id: &str) -> PathBuf {
        self.job_dir(job_id).join(format!("{shot_id}.mp4"))
    }

    pub fn final_output_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(FINAL_OUTPUT_FILE)
    }

    pub fn job_record_path(&self, job_id: &str) -> PathBuf {
        self.jobs_root.join(format!("{job_id}.json"))
    }

    pub fn storyboard_record_path(&self, storyboard_id: &str) -> PathBuf {
        self.jobs_root
            .join(STORYBOARDS_DIR)
            .join(format!("{storyboard_id}.json"))
    }

    /// Scratch directory handed to shot backends for one job.
    pub fn job_temp_dir(&self, job_id: &str) -> PathBuf {
        self.temp_root.join(job_id)
    }

    /// Remove the job's artifact and scratch directories.
    ///
    /// Returns whether the artifact directory existed.
    pub async fn cleanup_job(&self, job_id: &str) -> Result<bool, CoreError> {
        check_id_component(job_id)?;
        let _ = tokio::fs::remove_dir_all(self.job_temp_dir(job_id)).await;

        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(job_id, path = %dir.display(), "Removed job artifacts");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CoreError::Storage(format!(
                "failed to remove {}: {e}",
                dir.display()
            ))),
        }
    }

    /// Build the destination path for an uploaded reference image.
    ///
    /// The name is `{YYYYmmdd_HHMMSS}_{stem}{ext}` with the stem truncated.
    /// Only [`ALLOWED_UPLOAD_EXTENSIONS`] are accepted.
    pub fn upload_path(
        &self,
        original_name: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<PathBuf, CoreError> {
        let file_name = Path::new(original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::Validation("upload has no file name".into()))?;
        let path = Path::new(file_name);

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        if !ALLOWED_UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
            return Err(CoreError::Validation(format!(
                "Invalid file type. Allowed: {}",
                ALLOWED_UPLOAD_EXTENSIONS.join(", ")
            )));
        }

        let stem: String = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload")
            .chars()
            .take(MAX_UPLOAD_STEM_CHARS)
            .collect();
        let timestamp = now.format("%Y%m%d_%H%M%S");
        Ok(self.uploads_root.join(format!("{timestamp}_{stem}{ext}")))
    }
}

/// Move a file into place: rename first, falling back to copy + remove when
/// source and destination are on different filesystems.
pub async fn relocate(src: &Path, dst: &Path) -> Result<(), CoreError> {
    if src == dst {
        return Ok(());
    }
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            CoreError::Storage(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                error = %rename_err,
                "Rename failed, falling back to copy",
            );
            tokio::fs::copy(src, dst).await.map_err(|e| {
                CoreError::Storage(format!(
                    "failed to move {} to {}: {e}",
                    src.display(),
                    dst.display()
                ))
            })?;
            if let Err(e) = tokio::fs::remove_file(src).await {
                tracing::warn!(src = %src.display(), error = %e, "Failed to remove source after copy");
            }
            Ok(())
        }
    }
}

/// Reject ids that could escape their directory when used as a path
/// component.
pub fn check_id_component(id: &str) -> Result<(), CoreError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(CoreError::Validation(format!("invalid id: {id:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_paths() {
        let layout = FileLayout::under("/data");
        assert_eq!(
            layout.shot_path("job_1", "shot_a"),
            PathBuf::from("/data/videos/job_1/shot_a.mp4")
        );
        assert_eq!(
            layout.final_output_path("job_1"),
            PathBuf::from("/data/videos/job_1/final_output.mp4")
        );
        assert_eq!(
            layout.job_record_path("job_1"),
            PathBuf::from("/data/jobs/job_1.json")
        );
        assert_eq!(
            layout.storyboard_record_path("storyboard_1"),
            PathBuf::from("/data/jobs/storyboards/storyboard_1.json")
        );
    }

    #[test]
    fn upload_path_uses_timestamp_and_truncated_stem() {
        let layout = FileLayout::under("/data");
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let long = format!("{}.PNG", "a".repeat(80));
        let path = layout.upload_path(&long, now).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, format!("20240305_140709_{}.png", "a".repeat(50)));
    }

    #[test]
    fn upload_path_rejects_other_extensions() {
        let layout = FileLayout::under("/data");
        assert!(layout.upload_path("clip.gif", chrono::Utc::now()).is_err());
        assert!(layout.upload_path("noext", chrono::Utc::now()).is_err());
    }

    #[test]
    fn upload_path_strips_directories() {
        let layout = FileLayout::under("/data");
        let path = layout
            .upload_path("../../etc/photo.jpg", chrono::Utc::now())
            .unwrap();
        assert!(path.starts_with("/data/uploads"));
    }

    #[test]
    fn id_component_rejects_traversal() {
        assert!(check_id_component("job_abc").is_ok());
        assert!(check_id_component("../x").is_err());
        assert!(check_id_component("a/b").is_err());
        assert!(check_id_component("a\\b").is_err());
        assert!(check_id_component("").is_err());
    }

    #[tokio::test]
    async fn relocate_moves_file_and_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tmp.mp4");
        tokio::fs::write(&src, b"clip").await.unwrap();
        let dst = dir.path().join("videos/job_1/shot_1.mp4");

        relocate(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"clip");
    }

    #[tokio::test]
    async fn cleanup_job_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::under(dir.path());
        layout.ensure_dirs().await.unwrap();
        tokio::fs::create_dir_all(layout.job_dir("job_1")).await.unwrap();
        tokio::fs::write(layout.shot_path("job_1", "s"), b"x").await.unwrap();

        assert!(layout.cleanup_job("job_1").await.unwrap());
        assert!(!layout.job_dir("job_1").exists());
        assert!(!layout.cleanup_job("job_1").await.unwrap());
    }
}
