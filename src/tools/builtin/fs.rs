use std::path::Path;

use serde_json::{json, Value};

use crate::permission::RiskLevel;
use crate::tools::{ErrorKind, Scope, ToolDefinition};

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, (ErrorKind, String)> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| (ErrorKind::InvalidArguments, format!("missing required string argument `{key}`")))
}

fn reject_unsafe_path(args: &Value) -> bool {
    args.get("path")
        .and_then(Value::as_str)
        .map(crate::permission::reject_path_escape)
        .unwrap_or(false)
}

pub fn read_file() -> ToolDefinition {
    ToolDefinition::builder(
        "read_file",
        "Reads the full contents of a UTF-8 text file relative to the working directory.",
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        }),
        Box::new(|args, _ctx| {
            let path = arg_str(args, "path")?;
            std::fs::read_to_string(path).map_err(|e| (ErrorKind::IoError, format!("reading {path}: {e}")))
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::ReadFiles)
    .validator(Box::new(reject_unsafe_path))
    .build()
}

pub fn list_directory() -> ToolDefinition {
    ToolDefinition::builder(
        "list_directory",
        "Lists entries (name and kind) of a directory relative to the working directory.",
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        }),
        Box::new(|args, _ctx| {
            let path = arg_str(args, "path")?;
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(path).map_err(|e| (ErrorKind::IoError, format!("listing {path}: {e}")))? {
                let entry = entry.map_err(|e| (ErrorKind::IoError, e.to_string()))?;
                let kind = if entry.path().is_dir() { "dir" } else { "file" };
                entries.push(format!("{}\t{}", kind, entry.file_name().to_string_lossy()));
            }
            entries.sort();
            Ok(entries.join("\n"))
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::ReadFiles)
    .validator(Box::new(reject_unsafe_path))
    .build()
}

const SEARCH_RESULT_CAP: usize = 200;

pub fn search_files() -> ToolDefinition {
    ToolDefinition::builder(
        "search_files",
        "Searches for a literal substring across files under a root directory, bounded by a result cap.",
        json!({
            "type": "object",
            "properties": {
                "root": { "type": "string" },
                "query": { "type": "string" }
            },
            "required": ["root", "query"]
        }),
        Box::new(|args, _ctx| {
            let root = arg_str(args, "root")?;
            let query = arg_str(args, "query")?;
            let mut hits = Vec::new();
            walk(Path::new(root), query, &mut hits);
            hits.truncate(SEARCH_RESULT_CAP);
            Ok(hits.join("\n"))
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::ReadFiles)
    .validator(Box::new(|args: &Value| {
        args.get("root")
            .and_then(Value::as_str)
            .map(crate::permission::reject_path_escape)
            .unwrap_or(false)
    }))
    .build()
}

fn walk(dir: &Path, query: &str, hits: &mut Vec<String>) {
    if hits.len() >= SEARCH_RESULT_CAP {
        return;
    }
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        if hits.len() >= SEARCH_RESULT_CAP {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            walk(&path, query, hits);
        } else if let Ok(content) = std::fs::read_to_string(&path) {
            for (lineno, line) in content.lines().enumerate() {
                if line.contains(query) {
                    hits.push(format!("{}:{}: {}", path.display(), lineno + 1, line.trim()));
                    if hits.len() >= SEARCH_RESULT_CAP {
                        return;
                    }
                }
            }
        }
    }
}

pub fn write_file() -> ToolDefinition {
    ToolDefinition::builder(
        "write_file",
        "Writes (overwrites) the full contents of a file relative to the working directory.",
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        }),
        Box::new(|args, _ctx| {
            let path = arg_str(args, "path")?;
            let content = arg_str(args, "content")?;
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| (ErrorKind::IoError, e.to_string()))?;
            }
            std::fs::write(path, content).map_err(|e| (ErrorKind::IoError, format!("writing {path}: {e}")))?;
            Ok(format!("wrote {} bytes to {}", content.len(), path))
        }),
    )
    .risk(RiskLevel::High)
    .scope(Scope::WriteFiles)
    .validator(Box::new(reject_unsafe_path))
    .build()
}

pub fn edit_file() -> ToolDefinition {
    ToolDefinition::builder(
        "edit_file",
        "Replaces one occurrence of old_text with new_text in a file. Fails if old_text is not found exactly once.",
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "old_text": { "type": "string" },
                "new_text": { "type": "string" }
            },
            "required": ["path", "old_text", "new_text"]
        }),
        Box::new(|args, _ctx| {
            let path = arg_str(args, "path")?;
            let old_text = arg_str(args, "old_text")?;
            let new_text = arg_str(args, "new_text")?;

            let content = std::fs::read_to_string(path).map_err(|e| (ErrorKind::IoError, format!("reading {path}: {e}")))?;
            let occurrences = content.matches(old_text).count();
            if occurrences != 1 {
                return Err((
                    ErrorKind::ValidationFailed,
                    format!("expected exactly one occurrence of old_text in {path}, found {occurrences}"),
                ));
            }
            let updated = content.replacen(old_text, new_text, 1);
            std::fs::write(path, &updated).map_err(|e| (ErrorKind::IoError, format!("writing {path}: {e}")))?;
            Ok(format!("edited {path}"))
        }),
    )
    .risk(RiskLevel::Medium)
    .scope(Scope::WriteFiles)
    .validator(Box::new(reject_unsafe_path))
    .build()
}
