//! Job workspace management.
//!
//! Every job owns an isolated directory under the data root holding its
//! generated file list, compile options, stage logs and tool-written reports.
//! The workspace survives job completion so logs and reports stay
//! retrievable; it is removed only by force-delete.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{LogFile, LogStage};

/// HDL source extensions picked up for compilation.
const HDL_EXTENSIONS: &[&str] = &["v", "sv"];
/// Header extensions that mark a directory as an include directory.
const INCLUDE_EXTENSIONS: &[&str] = &["vh", "svh"];

/// File inventory captured while preparing a workspace.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkspaceManifest {
    pub src_files: Vec<String>,
    pub tb_files: Vec<String>,
    pub include_files: Vec<String>,
    pub include_dirs: Vec<String>,
}

/// An isolated per-job working directory.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
    project_dir: PathBuf,
}

impl JobWorkspace {
    pub fn new(jobs_dir: &Path, project_dir: PathBuf, job_id: Uuid) -> Self {
        Self {
            root: jobs_dir.join(job_id.to_string()),
            project_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Path of the log file a stage appends to.
    pub fn log_path(&self, stage: LogStage) -> PathBuf {
        self.logs_dir().join(format!("{}.log", stage))
    }

    /// Create the directory tree and generate `filelist.f`,
    /// `compile_options.txt` and `project_metadata.json` from the project
    /// sources. `extra_include_dirs` are appended after the scanned ones in
    /// request order, duplicates preserved.
    pub async fn prepare(&self, extra_include_dirs: &[String]) -> AppResult<WorkspaceManifest> {
        tokio::fs::create_dir_all(self.logs_dir()).await?;
        tokio::fs::create_dir_all(self.reports_dir()).await?;

        let src_dir = self.project_dir.join("src");
        let tb_dir = self.project_dir.join("tb");
        let include_dir = self.project_dir.join("include");

        let mut src_files = scan_files(&src_dir, HDL_EXTENSIONS, &self.root);
        let mut tb_files = scan_files(&tb_dir, HDL_EXTENSIONS, &self.root);
        let mut include_files = scan_files(&src_dir, INCLUDE_EXTENSIONS, &self.root);
        include_files.extend(scan_files(&include_dir, INCLUDE_EXTENSIONS, &self.root));
        src_files.sort();
        tb_files.sort();
        include_files.sort();

        // Sources first, testbenches after: compilation order matters.
        let mut filelist = String::new();
        for file in src_files.iter().chain(tb_files.iter()) {
            filelist.push_str(file);
            filelist.push('\n');
        }
        tokio::fs::write(self.root.join("filelist.f"), filelist).await?;

        let mut include_dirs: Vec<String> = scanned_include_dirs(
            &src_dir,
            &include_dir,
            &self.root,
        )
        .into_iter()
        .collect();
        include_dirs.extend(extra_include_dirs.iter().cloned());

        let mut compile_options = String::new();
        for dir in &include_dirs {
            compile_options.push_str("+incdir+");
            compile_options.push_str(dir);
            compile_options.push('\n');
        }
        tokio::fs::write(self.root.join("compile_options.txt"), compile_options).await?;

        let manifest = WorkspaceManifest {
            src_files,
            tb_files,
            include_files,
            include_dirs,
        };

        let metadata = serde_json::json!({
            "project_path": self.project_dir,
            "job_path": self.root,
            "src_files": manifest.src_files,
            "tb_files": manifest.tb_files,
            "include_files": manifest.include_files,
            "include_dirs": manifest.include_dirs,
            "total_files": manifest.src_files.len() + manifest.tb_files.len(),
            "generated_at": Utc::now(),
        });
        tokio::fs::write(
            self.root.join("project_metadata.json"),
            serde_json::to_vec_pretty(&metadata)?,
        )
        .await?;

        info!(
            workspace = %self.root.display(),
            sources = manifest.src_files.len(),
            testbenches = manifest.tb_files.len(),
            "Workspace prepared"
        );

        Ok(manifest)
    }

    /// Metadata for every log file in the workspace, sorted by filename.
    pub async fn list_logs(&self) -> AppResult<Vec<LogFile>> {
        let logs_dir = self.logs_dir();
        if !logs_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut logs = Vec::new();
        let mut entries = tokio::fs::read_dir(&logs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let stage = LogStage::from_filename(&filename);
            let modified_at: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            logs.push(LogFile {
                filename,
                stage,
                size: metadata.len(),
                modified_at,
                description: stage.description().to_string(),
            });
        }
        logs.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(logs)
    }

    /// Resolve a log filename inside the workspace, rejecting traversal.
    pub fn resolve_log(&self, filename: &str) -> AppResult<PathBuf> {
        let path = self.logs_dir().join(sanitize_relative(filename)?);
        if !path.is_file() {
            return Err(AppError::NotFound(format!("Log file {}", filename)));
        }
        Ok(path)
    }

    /// Read a log file's content.
    pub async fn read_log(&self, filename: &str) -> AppResult<String> {
        let path = self.resolve_log(filename)?;
        Ok(tokio::fs::read_to_string(path).await?)
    }

    /// Resolve a source file referenced by a report's file/line pointer.
    /// The workspace is searched first, then the project directory.
    pub fn resolve_source(&self, filename: &str) -> AppResult<PathBuf> {
        let relative = sanitize_relative(filename)?;

        let in_workspace = self.root.join(&relative);
        if in_workspace.is_file() {
            return Ok(in_workspace);
        }

        for subdir in ["", "src", "tb", "include"] {
            let candidate = if subdir.is_empty() {
                self.project_dir.join(&relative)
            } else {
                self.project_dir.join(subdir).join(&relative)
            };
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(AppError::NotFound(format!("Source file {}", filename)))
    }

    /// Delete the workspace directory and everything in it.
    pub async fn remove(&self) -> AppResult<()> {
        if self.root.exists() {
            tokio::fs::remove_dir_all(&self.root).await?;
            info!(workspace = %self.root.display(), "Workspace removed");
        }
        Ok(())
    }
}

/// Reject empty, absolute and parent-escaping paths.
fn sanitize_relative(filename: &str) -> AppResult<PathBuf> {
    if filename.is_empty() {
        return Err(AppError::Validation("Empty file path".to_string()));
    }
    let path = Path::new(filename);
    if path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return Err(AppError::Validation(
            "Path traversal not allowed".to_string(),
        ));
    }
    Ok(path.to_path_buf())
}

/// Recursively collect files with the given extensions, as paths relative to
/// `base` (falling back to absolute when they do not share a prefix).
fn scan_files(dir: &Path, extensions: &[&str], base: &Path) -> Vec<String> {
    let mut files = Vec::new();
    collect_files(dir, extensions, base, &mut files);
    files
}

fn collect_files(dir: &Path, extensions: &[&str], base: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extensions, base, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext))
        {
            out.push(relative_to(&path, base));
        }
    }
}

/// Include directories for compilation: the project `src/` root, any `src/`
/// subdirectory holding header files, and the project `include/` directory.
fn scanned_include_dirs(src_dir: &Path, include_dir: &Path, base: &Path) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    if src_dir.is_dir() {
        dirs.insert(relative_to(src_dir, base));
        collect_header_dirs(src_dir, base, &mut dirs);
    }
    if include_dir.is_dir() {
        dirs.insert(relative_to(include_dir, base));
    }
    dirs
}

fn collect_header_dirs(dir: &Path, base: &Path, out: &mut BTreeSet<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut has_headers = false;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_header_dirs(&path, base, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| INCLUDE_EXTENSIONS.contains(&ext))
        {
            has_headers = true;
        }
    }
    if has_headers {
        out.insert(relative_to(dir, base));
    }
}

/// Express `path` relative to `base`, walking up with `..` components where
/// needed. Falls back to the original path when no common root exists.
fn relative_to(path: &Path, base: &Path) -> String {
    let path_components: Vec<Component> = path.components().collect();
    let base_components: Vec<Component> = base.components().collect();

    let mut common = 0;
    while common < path_components.len()
        && common < base_components.len()
        && path_components[common] == base_components[common]
    {
        common += 1;
    }
    if common == 0 {
        return path.display().to_string();
    }

    let mut relative = PathBuf::new();
    for _ in common..base_components.len() {
        relative.push("..");
    }
    for component in &path_components[common..] {
        relative.push(component);
    }
    relative.display().to_string()
}
