use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_input")]
    pub input_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_build")]
    pub build_folder: String,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    pub gemini: GeminiConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,

    /// High-capability tier, used once per run for the character bible.
    #[serde(default = "default_pro_model")]
    pub pro_model: String,

    /// Fast tier, used for the per-frame analysis/identification/synthesis calls.
    #[serde(default = "default_flash_model")]
    pub flash_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,
}

fn default_input() -> String {
    "input".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_build() -> String {
    "build".to_string()
}
fn default_aspect_ratio() -> String {
    "16:9".to_string()
}
fn default_pro_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_flash_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        let config: Config =
            serde_yaml_ng::from_str(&content).context("Failed to parse config.yml")?;
        Ok(config)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.input_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.build_folder)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let yaml = "gemini:\n  api_key: \"k\"\n";
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.input_folder, "input");
        assert_eq!(config.aspect_ratio, "16:9");
        assert_eq!(config.gemini.pro_model, "gemini-2.5-pro");
        assert!(!config.unattended);
    }
}
