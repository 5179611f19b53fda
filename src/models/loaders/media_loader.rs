use crate::models::media::{MediaFile, MediaKind, MediaPreview};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 预览图文件的后缀：`clip.mp4.preview.jpg` 是 `clip.mp4` 的预览图
const PREVIEW_SUFFIXES: [(&str, &str); 3] = [
    (".preview.jpg", "image/jpeg"),
    (".preview.jpeg", "image/jpeg"),
    (".preview.png", "image/png"),
];

/// 从单个文件加载素材
pub async fn load_media_file(path: &Path) -> Result<MediaFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("无效的文件路径: {}", path.display()))?;

    let bytes = fs::read(path)
        .await
        .with_context(|| format!("无法读取素材文件: {}", path.display()))?;

    let mut file = MediaFile::new(name, bytes)?.with_path(path);

    if let Some(preview) = load_preview(path).await? {
        file = file.with_preview(preview);
    }

    Ok(file)
}

/// 查找并加载预览图（可选）
async fn load_preview(path: &Path) -> Result<Option<MediaPreview>> {
    for (suffix, mime) in PREVIEW_SUFFIXES {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        let candidate = PathBuf::from(candidate);

        if fs::try_exists(&candidate).await.unwrap_or(false) {
            let bytes = fs::read(&candidate)
                .await
                .with_context(|| format!("无法读取预览图: {}", candidate.display()))?;
            return Ok(Some(MediaPreview::new(mime, bytes)));
        }
    }
    Ok(None)
}

fn is_preview_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PREVIEW_SUFFIXES
        .iter()
        .any(|(suffix, _)| lower.ends_with(suffix))
}

/// 从文件夹中加载所有受支持的素材文件（不递归，按文件名排序）
pub async fn load_media_folder(folder_path: &str) -> Result<Vec<MediaFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        if is_preview_file(&name) {
            continue;
        }

        if MediaKind::from_file_name(&name).is_none() {
            tracing::warn!("跳过不支持的文件: {}", name);
            continue;
        }

        paths.push(path);
    }

    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_media_file(&path).await {
            Ok(file) => files.push(file),
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(files)
}
