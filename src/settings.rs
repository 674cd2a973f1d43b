use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::providers::{DEFAULT_ANALYSIS_MODEL, DEFAULT_FLASH_IMAGE_MODEL, DEFAULT_IMAGEN_MODEL};
use crate::style::{StyleConfig, StylePatch};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const DEFAULT_PREVIEW_WIDTH: u32 = 960;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub analysis: String,
    pub image: String,
    pub image_fallback: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            analysis: DEFAULT_ANALYSIS_MODEL.to_string(),
            image: DEFAULT_IMAGEN_MODEL.to_string(),
            image_fallback: DEFAULT_FLASH_IMAGE_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub models: ModelSettings,
    pub style: StyleConfig,
    pub font_paths: Vec<PathBuf>,
    pub font_dirs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub preview_width: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models: ModelSettings::default(),
            style: StyleConfig::default(),
            font_paths: Vec::new(),
            font_dirs: Vec::new(),
            output_dir: PathBuf::from("."),
            preview_width: DEFAULT_PREVIEW_WIDTH,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    models: Option<ModelsSection>,
    style: Option<StylePatch>,
    fonts: Option<FontsSection>,
    output: Option<OutputSection>,
    preview: Option<PreviewSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelsSection {
    analysis: Option<String>,
    image: Option<String>,
    image_fallback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FontsSection {
    paths: Option<Vec<String>>,
    dirs: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSection {
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PreviewSection {
    width: Option<u32>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings = settings
                .merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_str(self, content: &str) -> Result<Self> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed)
    }

    fn merge(mut self, incoming: SettingsFile) -> Result<Self> {
        if let Some(models) = incoming.models {
            if let Some(model) = non_blank(models.analysis) {
                self.models.analysis = model;
            }
            if let Some(model) = non_blank(models.image) {
                self.models.image = model;
            }
            if let Some(model) = non_blank(models.image_fallback) {
                self.models.image_fallback = model;
            }
        }
        if let Some(patch) = incoming.style {
            self.style = self.style.merge(patch)?;
        }
        if let Some(fonts) = incoming.fonts {
            if let Some(paths) = fonts.paths {
                self.font_paths = expand_all(paths);
            }
            if let Some(dirs) = fonts.dirs {
                self.font_dirs = expand_all(dirs);
            }
        }
        if let Some(output) = incoming.output
            && let Some(dir) = non_blank(output.dir)
        {
            self.output_dir = expand_home(&dir);
        }
        if let Some(preview) = incoming.preview
            && let Some(width) = preview.width
            && width > 0
        {
            self.preview_width = width;
        }
        Ok(self)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn expand_all(values: Vec<String>) -> Vec<PathBuf> {
    values
        .into_iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| expand_home(&value))
        .collect()
}

fn expand_home(value: &str) -> PathBuf {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return Path::new(&home).join(rest);
    }
    PathBuf::from(value)
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".thumbgenius"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::FontStyle;
    use crate::test_util::with_temp_home;

    #[test]
    fn embedded_defaults_match_builtin_defaults() {
        let parsed = Settings::default().merge_str(DEFAULT_SETTINGS_TOML).unwrap();
        assert_eq!(parsed.style, StyleConfig::default());
        assert_eq!(parsed.models, ModelSettings::default());
        assert_eq!(parsed.preview_width, 960);
        assert_eq!(parsed.output_dir, PathBuf::from("."));
    }

    #[test]
    fn writes_home_settings_on_first_load() {
        with_temp_home(|home| {
            load_settings(None).unwrap();
            let written = home.join(".thumbgenius").join("settings.toml");
            assert_eq!(fs::read_to_string(written).unwrap(), DEFAULT_SETTINGS_TOML);
        });
    }

    #[test]
    fn local_home_file_overrides_defaults() {
        with_temp_home(|home| {
            let dir = home.join(".thumbgenius");
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("settings.local.toml"),
                "[models]\nimage = \"imagen-3.0-generate-002\"\n\n[style]\nfont = \"Bangers\"\nshadowBlur = 4.0\n\n[preview]\nwidth = 640\n",
            )
            .unwrap();
            let settings = load_settings(None).unwrap();
            assert_eq!(settings.models.image, "imagen-3.0-generate-002");
            assert_eq!(settings.models.analysis, "gemini-2.5-flash");
            assert_eq!(settings.style.font(), FontStyle::Cartoon);
            assert_eq!(settings.style.shadow_blur(), 4.0);
            assert_eq!(settings.preview_width, 640);
        });
    }

    #[test]
    fn explicit_file_wins_and_must_exist() {
        with_temp_home(|home| {
            let extra = home.join("mine.toml");
            assert!(load_settings(Some(&extra)).is_err());
            fs::write(&extra, "[output]\ndir = \"~/thumbs\"\n").unwrap();
            let settings = load_settings(Some(&extra)).unwrap();
            assert_eq!(settings.output_dir, home.join("thumbs"));
        });
    }

    #[test]
    fn bad_style_value_is_rejected() {
        let err = Settings::default()
            .merge_str("[style]\nfont = \"Papyrus\"\n")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Papyrus"));
    }
}
