//! 单元清单
//!
//! 从 units/ 目录读取 `*.toml` 清单，每个文件列出若干 `[[unit]]` 条目：
//! ```toml
//! [[unit]]
//! implementation = "EmailGetterUnit"
//! description = "Fetch recent emails"   # 可选，覆盖内置描述
//! ```
//! 以 `_` 开头的文件视为禁用。文件按名字排序，保证「后加载者胜出」有确定含义。

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// 单个清单文件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitManifest {
    #[serde(default, rename = "unit")]
    pub units: Vec<ManifestEntry>,
}

/// 清单条目：引用目录中的实现类型
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub implementation: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// 是否按命名约定禁用（文件名以 `_` 开头）
pub fn is_disabled(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('_'))
        .unwrap_or(true)
}

/// 列出目录中启用的清单文件，按文件名排序
pub fn manifest_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        if is_disabled(&path) {
            tracing::debug!(path = %path.display(), "skipping disabled manifest");
            continue;
        }
        sources.push(path);
    }
    sources.sort();
    Ok(sources)
}

/// 读取并解析单个清单
pub fn load_manifest(path: &Path) -> anyhow::Result<UnitManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: UnitManifest = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(manifest)
}
