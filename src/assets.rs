use crate::io::Storage;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Frame images land in `<input>/frames/`, avatar images in `<input>/avatars/`.
/// The archive extraction step that produces this layout lives outside this
/// tool; we only consume its flattened output.
pub const AVATARS_DIR: &str = "avatars";
pub const FRAMES_DIR: &str = "frames";

/// Distinguished text asset names, matched case-insensitively.
pub const STORY_MAP_NAME: &str = "story.txt";
pub const STYLE_NAME: &str = "style.txt";

pub const DEFAULT_STYLE: &str =
    "Cinematic film still, natural color grade, fine grain, shallow depth of field.";

#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub name: String,
    pub bytes: Vec<u8>,
    pub media_type: String,
}

#[derive(Debug, Clone)]
pub struct TextAsset {
    pub name: String,
    pub content: String,
}

/// Everything the run works from. Read-only after loading; the BTreeMaps
/// keep frame iteration in lexicographic name order, which the script
/// assembly and context lookup both depend on.
pub struct AssetLibrary {
    pub avatars: BTreeMap<String, ImageAsset>,
    pub frames: BTreeMap<String, ImageAsset>,
    pub texts: Vec<TextAsset>,
}

pub fn base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

pub fn media_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

fn is_image_name(name: &str) -> bool {
    media_type_for(name) != "application/octet-stream"
}

/// The 4th line (index 3) of a per-frame text asset is the scene-text line.
/// This is a positional convention of the per-frame text format, preserved
/// as-is; there is no deeper meaning to the index.
pub fn scene_line(content: &str) -> Option<&str> {
    content.split('\n').nth(3)
}

/// Lines from index 3 onward form the richer per-frame scene snippet.
pub fn scene_snippet(content: &str) -> String {
    content
        .split('\n')
        .skip(3)
        .collect::<Vec<_>>()
        .join("\n")
}

impl AssetLibrary {
    pub async fn load(storage: &dyn Storage, input_folder: &str) -> Result<Self> {
        let avatars_dir = Path::new(input_folder).join(AVATARS_DIR);
        let frames_dir = Path::new(input_folder).join(FRAMES_DIR);

        let mut avatars = BTreeMap::new();
        for path in storage.list(avatars_dir.to_str().unwrap()).await? {
            let name = file_name(&path);
            if !is_image_name(&name) {
                continue;
            }
            let bytes = storage
                .read(&path)
                .await
                .context(format!("Failed to read avatar asset {}", path))?;
            let media_type = media_type_for(&name).to_string();
            avatars.insert(name.clone(), ImageAsset { name, bytes, media_type });
        }

        let mut frames = BTreeMap::new();
        let mut texts = Vec::new();
        for path in storage.list(frames_dir.to_str().unwrap()).await? {
            let name = file_name(&path);
            if is_image_name(&name) {
                let bytes = storage
                    .read(&path)
                    .await
                    .context(format!("Failed to read frame asset {}", path))?;
                let media_type = media_type_for(&name).to_string();
                frames.insert(name.clone(), ImageAsset { name, bytes, media_type });
            } else if name.to_ascii_lowercase().ends_with(".txt") {
                let bytes = storage
                    .read(&path)
                    .await
                    .context(format!("Failed to read text asset {}", path))?;
                let content = String::from_utf8(bytes)
                    .context(format!("Text asset {} is not valid UTF-8", name))?;
                texts.push(TextAsset { name, content });
            }
        }

        Ok(Self { avatars, frames, texts })
    }

    /// Per-frame text convention: the text asset shares the frame's base
    /// identifier and carries a .txt extension.
    pub fn find_frame_text(&self, frame_name: &str) -> Option<&TextAsset> {
        let base = base_name(frame_name);
        self.texts.iter().find(|t| {
            t.name.starts_with(base) && t.name.to_ascii_lowercase().ends_with(".txt")
        })
    }

    fn distinguished(&self, name: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.content.as_str())
    }

    pub fn style_directive(&self) -> &str {
        self.distinguished(STYLE_NAME)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STYLE)
    }

    pub fn story_map(&self) -> Option<&str> {
        self.distinguished(STORY_MAP_NAME)
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib_with_texts(texts: Vec<TextAsset>) -> AssetLibrary {
        AssetLibrary {
            avatars: BTreeMap::new(),
            frames: BTreeMap::new(),
            texts,
        }
    }

    #[test]
    fn test_base_name_strips_last_extension() {
        assert_eq!(base_name("frame_001.png"), "frame_001");
        assert_eq!(base_name("frame.001.png"), "frame.001");
        assert_eq!(base_name("noext"), "noext");
    }

    #[test]
    fn test_scene_line_requires_four_lines() {
        assert_eq!(scene_line("a\nb\nc\nd\ne"), Some("d"));
        assert_eq!(scene_line("a\nb\nc"), None);
    }

    #[test]
    fn test_scene_snippet_joins_tail_lines() {
        assert_eq!(scene_snippet("a\nb\nc\nd\ne"), "d\ne");
        assert_eq!(scene_snippet("a\nb"), "");
    }

    #[test]
    fn test_find_frame_text_matches_base() {
        let lib = lib_with_texts(vec![
            TextAsset {
                name: "frame_002.txt".to_string(),
                content: String::new(),
            },
            TextAsset {
                name: "frame_001_notes.txt".to_string(),
                content: String::new(),
            },
        ]);
        assert_eq!(
            lib.find_frame_text("frame_001.png").unwrap().name,
            "frame_001_notes.txt"
        );
        assert!(lib.find_frame_text("frame_003.png").is_none());
    }

    #[test]
    fn test_style_directive_case_insensitive_override() {
        let lib = lib_with_texts(vec![TextAsset {
            name: "Style.TXT".to_string(),
            content: "Moody noir lighting\n".to_string(),
        }]);
        assert_eq!(lib.style_directive(), "Moody noir lighting");

        let empty = lib_with_texts(vec![]);
        assert_eq!(empty.style_directive(), DEFAULT_STYLE);
    }

    #[test]
    fn test_media_type_mapping() {
        assert_eq!(media_type_for("a.PNG"), "image/png");
        assert_eq!(media_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(media_type_for("a.txt"), "application/octet-stream");
    }
}
