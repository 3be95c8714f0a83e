//! 沙箱文件工具
//!
//! SafeFs 绑定 workspace 根目录，所有路径经 resolve 校验必须在根下（禁止 ../ 逃逸）；
//! readTextFile / writeTextFile / listDirectory / getFileInfo 基于 SafeFs。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::MessagePart;
use crate::skills::base::{input_schema, parse_args, BaseTool};
use crate::skills::SkillError;

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn relative<'a>(&self, path: &'a str) -> &'a str {
        let path = path.trim_start_matches("./");
        if path.is_empty() {
            "."
        } else {
            path
        }
    }

    /// 已存在的路径：规范化后必须仍在根下（符号链接也会被解析）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SkillError> {
        let path = self.relative(path);
        let full = self.root_dir.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| SkillError::Execution(format!("Path not found: {path}")))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(SkillError::PathEscape(path.to_string()))
        }
    }

    /// 待创建的路径：不允许 .. 与根外绝对路径，父目录按需创建
    pub fn resolve_new(&self, path: &str) -> Result<PathBuf, SkillError> {
        let path = self.relative(path);
        let candidate = Path::new(path);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SkillError::PathEscape(path.to_string()));
        }
        let full = if candidate.is_absolute() {
            if !candidate.starts_with(&self.root_dir) {
                return Err(SkillError::PathEscape(path.to_string()));
            }
            candidate.to_path_buf()
        } else {
            self.root_dir.join(candidate)
        };
        let parent = full
            .parent()
            .ok_or_else(|| SkillError::PathEscape(path.to_string()))?;
        std::fs::create_dir_all(parent)
            .map_err(|e| SkillError::Execution(format!("Create dir failed: {e}")))?;
        let parent = parent
            .canonicalize()
            .map_err(|e| SkillError::Execution(e.to_string()))?;
        if !parent.starts_with(&self.root_dir) {
            return Err(SkillError::PathEscape(path.to_string()));
        }
        match full.file_name() {
            Some(name) => Ok(parent.join(name)),
            None => Err(SkillError::Execution(format!("Not a file path: {path}"))),
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, SkillError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| SkillError::Execution(format!("Read failed: {e}")))
    }

    pub fn write_file(&self, path: &str, text: &str) -> Result<PathBuf, SkillError> {
        let resolved = self.resolve_new(path)?;
        std::fs::write(&resolved, text)
            .map_err(|e| SkillError::Execution(format!("Write failed: {e}")))?;
        Ok(resolved)
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, SkillError> {
        let base = self.resolve(path)?;
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| SkillError::Execution(format!("List failed: {e}")))?
        {
            let e = e.map_err(|e| SkillError::Execution(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{name}{ty}"));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ReadArgs {
    /// 相对 workspace 的文件路径
    path: String,
    /// 起始行（从 1 开始，含）
    #[serde(default)]
    from: Option<usize>,
    /// 结束行（含）
    #[serde(default)]
    to: Option<usize>,
}

pub struct ReadTextFileTool {
    fs: SafeFs,
}

impl ReadTextFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl BaseTool for ReadTextFileTool {
    fn name(&self) -> &'static str {
        "readTextFile"
    }

    fn description(&self) -> &'static str {
        "Read a text file inside the workspace, optionally limited to a line range."
    }

    fn input_schema(&self) -> Value {
        input_schema::<ReadArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let args: ReadArgs = parse_args(self.name(), args)?;
        tracing::info!(path = %args.path, "readTextFile");
        let content = self.fs.read_file(&args.path)?;
        let text = match (args.from, args.to) {
            (None, None) => content,
            (from, to) => {
                let from = from.unwrap_or(1).max(1);
                let lines: Vec<&str> = content.lines().collect();
                let to = to.unwrap_or(lines.len()).min(lines.len());
                if from > to {
                    String::new()
                } else {
                    lines[from - 1..to].join("\n")
                }
            }
        };
        Ok(vec![MessagePart::text(text)])
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WriteArgs {
    /// 相对 workspace 的文件路径，父目录不存在时自动创建
    path: String,
    /// 写入的完整内容（覆盖）
    text: String,
}

pub struct WriteTextFileTool {
    fs: SafeFs,
}

impl WriteTextFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl BaseTool for WriteTextFileTool {
    fn name(&self) -> &'static str {
        "writeTextFile"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a text file inside the workspace."
    }

    fn input_schema(&self) -> Value {
        input_schema::<WriteArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let args: WriteArgs = parse_args(self.name(), args)?;
        tracing::info!(path = %args.path, bytes = args.text.len(), "writeTextFile");
        self.fs.write_file(&args.path, &args.text)?;
        Ok(vec![MessagePart::text(
            json!({ "path": args.path, "bytes": args.text.len() }).to_string(),
        )])
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PathArgs {
    /// 相对 workspace 的路径，默认 "."
    #[serde(default)]
    path: String,
}

pub struct ListDirectoryTool {
    fs: SafeFs,
}

impl ListDirectoryTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl BaseTool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "listDirectory"
    }

    fn description(&self) -> &'static str {
        "List a directory inside the workspace. Directories end with '/'."
    }

    fn input_schema(&self) -> Value {
        input_schema::<PathArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let args: PathArgs = parse_args(self.name(), args)?;
        tracing::info!(path = %args.path, "listDirectory");
        let entries = self.fs.list_dir(&args.path)?;
        Ok(vec![MessagePart::text(entries.join("\n"))])
    }
}

pub struct GetFileInfoTool {
    fs: SafeFs,
}

impl GetFileInfoTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl BaseTool for GetFileInfoTool {
    fn name(&self) -> &'static str {
        "getFileInfo"
    }

    fn description(&self) -> &'static str {
        "Get type, size and modification time of a path inside the workspace."
    }

    fn input_schema(&self) -> Value {
        input_schema::<PathArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let args: PathArgs = parse_args(self.name(), args)?;
        let resolved = self.fs.resolve(&args.path)?;
        let meta = std::fs::metadata(&resolved)
            .map_err(|e| SkillError::Execution(format!("Stat failed: {e}")))?;
        let modified = meta
            .modified()
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());
        let relative = resolved
            .strip_prefix(self.fs.root())
            .unwrap_or(&resolved)
            .to_string_lossy()
            .to_string();
        Ok(vec![MessagePart::text(
            json!({
                "path": relative,
                "isDirectory": meta.is_dir(),
                "isFile": meta.is_file(),
                "size": meta.len(),
                "modified": modified,
            })
            .to_string(),
        )])
    }
}
