use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use gpui::*;
use gpui_component::{Theme, ThemeMode};
use parlor_llm::{
    DEFAULT_MODEL, DEFAULT_OLLAMA_BASE_URL, GenerationOptions, ModelHandle, ModelRegistry,
    OLLAMA_PROVIDER_ID, ProviderConfig,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "parlor";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "PARLOR_";

const MAX_TEMPERATURE: f64 = 2.0;

/// Everything a user can configure. Missing keys take their default, so a
/// settings file may hold any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub provider_id: String,
    pub ollama_base_url: String,
    /// Registry short name or Ollama tag.
    pub default_model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    /// System prompt sent ahead of every exchange.
    pub preamble: Option<String>,
    #[serde(with = "theme_mode_name")]
    pub theme_mode: ThemeMode,
}

impl Default for ChatSettings {
    fn default() -> Self {
        let default_model = ModelRegistry::builtin()
            .default_handle()
            .unwrap_or(DEFAULT_MODEL);

        Self {
            provider_id: OLLAMA_PROVIDER_ID.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            default_model: default_model.name().to_string(),
            temperature: None,
            max_tokens: None,
            preamble: None,
            theme_mode: ThemeMode::Light,
        }
    }
}

impl ChatSettings {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_id, &self.ollama_base_url)
    }

    /// Model tag to request. Unknown keys are passed through as raw tags so
    /// models outside the registry stay usable.
    pub fn model_id(&self) -> String {
        match self.registered_model() {
            Some(handle) => handle.model_id().to_string(),
            None => self.default_model.clone(),
        }
    }

    pub fn registered_model(&self) -> Option<ModelHandle> {
        ModelRegistry::builtin().resolve(&self.default_model)
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            system_prompt: self.preamble.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Trims text fields, restores blanks to defaults and drops sampling
    /// values the server would reject.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();

        Self {
            provider_id: trimmed_or(self.provider_id, defaults.provider_id),
            ollama_base_url: trimmed_or(
                self.ollama_base_url.trim().trim_end_matches('/').to_string(),
                defaults.ollama_base_url,
            ),
            default_model: trimmed_or(self.default_model, defaults.default_model),
            temperature: self
                .temperature
                .filter(|value| value.is_finite())
                .map(|value| value.clamp(0.0, MAX_TEMPERATURE)),
            max_tokens: self.max_tokens.filter(|value| *value > 0),
            preamble: self
                .preamble
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            theme_mode: self.theme_mode,
        }
    }

    pub fn apply_theme(&self, window: Option<&mut Window>, cx: &mut App) {
        Theme::change(self.theme_mode, window, cx);
    }
}

fn trimmed_or(value: String, fallback: String) -> String {
    match value.trim() {
        "" => fallback,
        trimmed => trimmed.to_string(),
    }
}

mod theme_mode_name {
    use gpui_component::ThemeMode;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mode: &ThemeMode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(mode.name())
    }

    /// Anything but `dark` reads as light.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ThemeMode, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(if name.trim().eq_ignore_ascii_case("dark") {
            ThemeMode::Dark
        } else {
            ThemeMode::Light
        })
    }
}

/// Reads defaults, then the settings file, then `PARLOR_*` variables. A file
/// that fails to parse is ignored as a whole.
fn read_layers(path: &Path) -> ChatSettings {
    let mut figment = Figment::from(Serialized::defaults(ChatSettings::default()));
    if path.exists() {
        figment = figment.merge(Json::file(path));
    } else {
        tracing::info!(path = ?path, "no settings file yet, using defaults");
    }

    match figment
        .merge(Env::prefixed(SETTINGS_ENV_PREFIX))
        .extract::<ChatSettings>()
    {
        Ok(settings) => settings.normalized(),
        Err(error) => {
            tracing::warn!(path = ?path, error = %error, "unreadable settings, using defaults");
            ChatSettings::default()
        }
    }
}

/// Writes next to `path` first so a crash never leaves a truncated file.
fn write_replacing(path: &Path, settings: &ChatSettings) -> Result<(), SettingsError> {
    if let Some(directory) = path.parent() {
        std::fs::create_dir_all(directory).context(CreateDirSnafu {
            stage: "settings-dir",
            path: directory.to_path_buf(),
        })?;
    }

    let json = serde_json::to_vec_pretty(settings).context(EncodeSnafu {
        stage: "settings-encode",
    })?;
    let staged = path.with_extension("json.tmp");
    std::fs::write(&staged, json).context(StageFileSnafu {
        stage: "settings-stage",
        path: staged.clone(),
    })?;
    std::fs::rename(&staged, path).context(ReplaceFileSnafu {
        stage: "settings-replace",
        path: path.to_path_buf(),
    })?;

    tracing::info!(path = ?path, "settings saved");
    Ok(())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("cannot create {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode settings on `{stage}`: {source}"))]
    Encode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot write {path:?} on `{stage}`: {source}"))]
    StageFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot replace {path:?} on `{stage}`: {source}"))]
    ReplaceFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The settings file plus the snapshot read from it.
pub struct SettingsStore {
    current: ArcSwap<ChatSettings>,
    path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parlor"))
            .join(SETTINGS_FILE_NAME)
    }

    pub fn new(path: PathBuf) -> Self {
        Self {
            current: ArcSwap::from_pointee(read_layers(&path)),
            path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<ChatSettings> {
        self.current.load_full()
    }

    pub fn config_path(&self) -> &Path {
        &self.path
    }

    /// Persists first; the snapshot only changes once the file does.
    pub fn update(&self, settings: ChatSettings) -> Result<Arc<ChatSettings>, SettingsError> {
        let settings = Arc::new(settings.normalized());
        write_replacing(&self.path, &settings)?;
        self.current.store(settings.clone());
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingsChanged {
    pub settings: ChatSettings,
}

/// App-wide settings entity. Views subscribe for [`SettingsChanged`].
pub struct SettingsState {
    store: SettingsStore,
}

impl EventEmitter<SettingsChanged> for SettingsState {}

impl SettingsState {
    /// Wraps an already loaded store; the file is not read again.
    pub fn new(store: SettingsStore, cx: &mut App) -> Entity<Self> {
        cx.new(|_| Self { store })
    }

    pub fn settings(&self) -> Arc<ChatSettings> {
        self.store.settings()
    }

    pub fn save(
        &mut self,
        settings: ChatSettings,
        cx: &mut Context<Self>,
    ) -> Result<(), SettingsError> {
        let saved = self.store.update(settings)?;
        cx.emit(SettingsChanged {
            settings: (*saved).clone(),
        });
        cx.notify();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("parlor-settings-{}", uuid::Uuid::now_v7()))
            .join(name)
    }

    fn write_scratch(path: &Path, json: &str) {
        std::fs::create_dir_all(path.parent().expect("scratch dir")).expect("create scratch dir");
        std::fs::write(path, json).expect("write settings");
    }

    #[::core::prelude::v1::test]
    fn normalization_fills_blanks_and_clamps() {
        let settings = ChatSettings {
            provider_id: " ".into(),
            ollama_base_url: "http://gpu-box:11434/".into(),
            default_model: "".into(),
            temperature: Some(7.5),
            max_tokens: Some(0),
            preamble: Some("   ".into()),
            theme_mode: ThemeMode::Dark,
        }
        .normalized();

        assert_eq!(settings.provider_id, "ollama");
        assert_eq!(settings.ollama_base_url, "http://gpu-box:11434");
        assert_eq!(settings.default_model, "llama");
        assert_eq!(settings.temperature, Some(2.0));
        assert_eq!(settings.max_tokens, None);
        assert_eq!(settings.preamble, None);
        assert_eq!(settings.theme_mode, ThemeMode::Dark);
    }

    #[::core::prelude::v1::test]
    fn model_id_resolves_registry_names_and_passes_raw_tags() {
        let mut settings = ChatSettings::default();
        assert_eq!(settings.model_id(), "llama3.1:latest");

        settings.default_model = "granite".into();
        assert_eq!(settings.model_id(), "granite4:3b");

        settings.default_model = "mistral:7b".into();
        assert_eq!(settings.model_id(), "mistral:7b");
        assert_eq!(settings.registered_model(), None);
    }

    #[::core::prelude::v1::test]
    fn preamble_becomes_the_system_prompt() {
        let settings = ChatSettings {
            preamble: Some("answer tersely".into()),
            temperature: Some(0.2),
            ..ChatSettings::default()
        };

        let options = settings.generation_options();
        assert_eq!(options.system_prompt.as_deref(), Some("answer tersely"));
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.max_tokens, None);
    }

    #[::core::prelude::v1::test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(scratch_path("settings.json"));
        let settings = store.settings();
        assert_eq!(settings.ollama_base_url, DEFAULT_OLLAMA_BASE_URL);
        assert_eq!(settings.default_model, "llama");
    }

    #[::core::prelude::v1::test]
    fn partial_file_merges_over_defaults() {
        let path = scratch_path("settings.json");
        write_scratch(&path, r#"{"default_model": "qwen3", "theme_mode": "dark"}"#);

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.default_model, "qwen3");
        assert_eq!(settings.model_id(), "qwen3:4b");
        assert_eq!(settings.theme_mode, ThemeMode::Dark);
        assert_eq!(settings.ollama_base_url, DEFAULT_OLLAMA_BASE_URL);
    }

    #[::core::prelude::v1::test]
    fn update_persists_and_reloads() {
        let path = scratch_path("nested/settings.json");
        let store = SettingsStore::new(path.clone());

        let mut settings = (*store.settings()).clone();
        settings.default_model = " deepseek ".into();
        settings.max_tokens = Some(512);
        let saved = store.update(settings).expect("persist settings");

        assert_eq!(saved.default_model, "deepseek");
        assert_eq!(store.settings().default_model, "deepseek");
        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.default_model, "deepseek");
        assert_eq!(reloaded.max_tokens, Some(512));
    }

    #[::core::prelude::v1::test]
    fn malformed_file_falls_back_to_defaults() {
        let path = scratch_path("settings.json");
        write_scratch(&path, "{ not json");

        assert_eq!(*SettingsStore::new(path).settings(), ChatSettings::default());
    }

    #[::core::prelude::v1::test]
    fn snapshot_is_taken_once_per_store() {
        let path = scratch_path("settings.json");
        write_scratch(&path, r#"{"theme_mode": "dark"}"#);

        let store = SettingsStore::new(path.clone());
        write_scratch(&path, r#"{"theme_mode": "light", "default_model": "granite"}"#);

        let settings = store.settings();
        assert_eq!(settings.theme_mode, ThemeMode::Dark);
        assert_eq!(settings.default_model, "llama");
    }
}
