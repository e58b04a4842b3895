//! Workspace file tools: read, write, append, mkdir, list, edit

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::tools::{required_arg, Tool, ToolContext, ToolResult};

/// Tool for reading file contents
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn usage(&self) -> &str {
        "read <path>"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the workspace."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = required_arg(args, 0, "path")?;
        let path = match ctx.workspace.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        debug!(path = %path.display(), "Reading file");
        if !path.is_file() {
            return Ok(ToolResult::error("Error: Not found."));
        }

        match fs::read_to_string(&path) {
            Ok(content) => Ok(ToolResult::success(ctx.truncate(content))),
            Err(e) => Ok(ToolResult::error(format!("Failed to read file: {}", e))),
        }
    }
}

/// Tool for overwriting a file, keeping the previous version in the trash
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn usage(&self) -> &str {
        "write <path> <content>"
    }

    fn description(&self) -> &str {
        "Overwrite a file; the previous version is moved to deleted-modified/."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = required_arg(args, 0, "path")?;
        required_arg(args, 1, "content")?;
        let content = args[1..].join(" ");

        let path = match ctx.workspace.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        if path.is_dir() {
            return Ok(ToolResult::error(format!("Not a file: {}", path_str)));
        }

        if path.exists() {
            match move_to_trash(&path, &ctx.workspace.trash_dir()) {
                Ok(kept) => debug!(kept = %kept.display(), "Previous version moved to trash"),
                Err(e) => return Ok(ToolResult::error(format!("Failed to keep previous version: {}", e))),
            }
        }

        if let Err(e) = ensure_parent(&path) {
            return Ok(ToolResult::error(format!("Failed to create directories: {}", e)));
        }

        match fs::write(&path, &content) {
            Ok(()) => Ok(ToolResult::success(format!("Written: {}", path_str))),
            Err(e) => Ok(ToolResult::error(format!("Failed to write file: {}", e))),
        }
    }
}

/// Tool for appending to a file
pub struct AppendTool;

#[async_trait]
impl Tool for AppendTool {
    fn name(&self) -> &str {
        "append"
    }

    fn usage(&self) -> &str {
        "append <path> <content>"
    }

    fn description(&self) -> &str {
        "Append text to a file, creating it if needed."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = required_arg(args, 0, "path")?;
        required_arg(args, 1, "content")?;
        let content = args[1..].join(" ");

        let path = match ctx.workspace.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        if let Err(e) = ensure_parent(&path) {
            return Ok(ToolResult::error(format!("Failed to create directories: {}", e)));
        }

        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(content.as_bytes()));

        match result {
            Ok(()) => Ok(ToolResult::success(format!(
                "Appended to {} ({} bytes)",
                path_str,
                content.len()
            ))),
            Err(e) => Ok(ToolResult::error(format!("Failed to append: {}", e))),
        }
    }
}

/// Tool for creating directories
pub struct MkdirTool;

#[async_trait]
impl Tool for MkdirTool {
    fn name(&self) -> &str {
        "mkdir"
    }

    fn usage(&self) -> &str {
        "mkdir <path>"
    }

    fn description(&self) -> &str {
        "Create a directory and any missing parents."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = required_arg(args, 0, "path")?;
        let path = match ctx.workspace.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        match fs::create_dir_all(&path) {
            Ok(()) => Ok(ToolResult::success(format!("Created directory: {}", path_str))),
            Err(e) => Ok(ToolResult::error(format!("Failed to create directory: {}", e))),
        }
    }
}

/// Tool for listing a directory
pub struct ListTool;

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list"
    }

    fn usage(&self) -> &str {
        "list [path]"
    }

    fn description(&self) -> &str {
        "List a directory (default: workspace root); directories end with /."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = args.first().map(|s| s.as_str()).unwrap_or(".");
        let path = match ctx.workspace.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        if !path.is_dir() {
            return Ok(ToolResult::error(format!("Not a directory: {}", path_str)));
        }

        let mut entries: Vec<String> = walkdir::WalkDir::new(&path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if e.file_type().is_dir() {
                    format!("{}/", name)
                } else {
                    name
                }
            })
            .collect();
        entries.sort();

        if entries.is_empty() {
            return Ok(ToolResult::success(format!("{} is empty", path_str)));
        }
        Ok(ToolResult::success(ctx.truncate(entries.join("\n"))))
    }
}

/// Tool for replacing one unique occurrence of a string in a file
pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn usage(&self) -> &str {
        "edit <path> <old> <new>"
    }

    fn description(&self) -> &str {
        "Replace exactly one occurrence of <old> with <new> in a file."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let path_str = required_arg(args, 0, "path")?;
        let old = required_arg(args, 1, "old")?;
        let new = required_arg(args, 2, "new")?;

        if old.is_empty() {
            return Ok(ToolResult::error("The text to replace must not be empty"));
        }

        let path = match ctx.workspace.resolve(path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read {}: {}", path_str, e))),
        };

        match content.matches(old).count() {
            0 => Ok(ToolResult::error(format!("Text not found in {}", path_str))),
            1 => {
                let updated = content.replacen(old, new, 1);
                match fs::write(&path, updated) {
                    Ok(()) => Ok(ToolResult::success(format!("Edited: {}", path_str))),
                    Err(e) => Ok(ToolResult::error(format!("Failed to write file: {}", e))),
                }
            }
            n => Ok(ToolResult::error(format!(
                "Text occurs {} times in {}; provide a unique snippet",
                n, path_str
            ))),
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.exists() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Move `path` into `trash` as `<name>_<YYYYmmdd_HHMMSS>`, returning the new location
fn move_to_trash(path: &Path, trash: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(trash)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    let mut target = trash.join(format!("{}_{}", name, stamp));
    let mut n = 1;
    while target.exists() {
        target = trash.join(format!("{}_{}_{}", name, stamp, n));
        n += 1;
    }

    fs::rename(path, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Workspace, STATUS_ERROR};
    use tempfile::TempDir;

    fn ctx(dir: &TempDir) -> ToolContext {
        ToolContext::new(Workspace::open(dir.path()).unwrap())
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        let result = WriteTool.execute(&args(&["notes.md", "hello", "world"]), &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "Written: notes.md");

        let result = ReadTool.execute(&args(&["notes.md"]), &ctx).await.unwrap();
        assert_eq!(result.output, "hello world");
    }

    #[tokio::test]
    async fn test_write_keeps_previous_version() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        WriteTool.execute(&args(&["a.txt", "first"]), &ctx).await.unwrap();
        WriteTool.execute(&args(&["a.txt", "second"]), &ctx).await.unwrap();

        let trash: Vec<_> = fs::read_dir(ctx.workspace.trash_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(trash.len(), 1);
        assert!(trash[0].file_name().unwrap().to_string_lossy().starts_with("a.txt_"));
        assert_eq!(fs::read_to_string(&trash[0]).unwrap(), "first");
        assert_eq!(fs::read_to_string(ctx.workspace.root().join("a.txt")).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_write_outside_workspace_is_denied() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        let result = WriteTool.execute(&args(&["../escape.txt", "x"]), &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_status, STATUS_ERROR);
        assert!(result.error.unwrap().contains("Access Denied"));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let dir = TempDir::new().unwrap();
        let result = ReadTool.execute(&args(&["nope.txt"]), &ctx(&dir)).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Error: Not found."));
    }

    #[tokio::test]
    async fn test_missing_argument_is_err() {
        let dir = TempDir::new().unwrap();
        assert!(WriteTool.execute(&args(&["only-path"]), &ctx(&dir)).await.is_err());
    }

    #[tokio::test]
    async fn test_append_and_mkdir_and_list() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        MkdirTool.execute(&args(&["kb/sub"]), &ctx).await.unwrap();
        AppendTool.execute(&args(&["kb/log.txt", "one\n"]), &ctx).await.unwrap();
        AppendTool.execute(&args(&["kb/log.txt", "two\n"]), &ctx).await.unwrap();
        assert_eq!(
            fs::read_to_string(ctx.workspace.root().join("kb/log.txt")).unwrap(),
            "one\ntwo\n"
        );

        let result = ListTool.execute(&args(&["kb"]), &ctx).await.unwrap();
        assert_eq!(result.output, "log.txt\nsub/");
    }

    #[tokio::test]
    async fn test_edit_requires_unique_match() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        fs::write(ctx.workspace.root().join("code.rs"), "let a = 1;\nlet b = 1;\n").unwrap();

        let result = EditTool.execute(&args(&["code.rs", "= 1", "= 2"]), &ctx).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("2 times"));

        let result = EditTool.execute(&args(&["code.rs", "let b = 1", "let b = 3"]), &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(
            fs::read_to_string(ctx.workspace.root().join("code.rs")).unwrap(),
            "let a = 1;\nlet b = 3;\n"
        );

        let result = EditTool.execute(&args(&["code.rs", "missing", "x"]), &ctx).await.unwrap();
        assert!(!result.success);
    }
}
