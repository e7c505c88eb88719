use std::sync::OnceLock;

use super::model::Model;

/// Named reference to a model served by the local Ollama runtime.
///
/// A handle is plain configuration: nothing is contacted when it is created, so
/// a tag that is not pulled locally only fails once a request is streamed
/// through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle {
    name: &'static str,
    model_id: &'static str,
}

impl ModelHandle {
    pub const fn new(name: &'static str, model_id: &'static str) -> Self {
        Self { name, model_id }
    }

    /// Short name used by settings and the model selector.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Ollama model tag, e.g. `llama3.1:latest`.
    pub const fn model_id(&self) -> &'static str {
        self.model_id
    }

    pub fn as_model(&self) -> Model {
        Model::new(self.model_id, self.name)
    }
}

pub const OLLAMA_DEEPSEEK: ModelHandle = ModelHandle::new("deepseek", "deepseek-r1:8b");
pub const OLLAMA_LLAMA: ModelHandle = ModelHandle::new("llama", "llama3.1:latest");
pub const OLLAMA_QWEN3: ModelHandle = ModelHandle::new("qwen3", "qwen3:4b");
pub const OLLAMA_QWEN3_VL: ModelHandle = ModelHandle::new("qwen3-vl", "qwen3-vl:4b");
pub const OLLAMA_GRANITE: ModelHandle = ModelHandle::new("granite", "granite4:3b");

pub const DEFAULT_MODEL: ModelHandle = OLLAMA_LLAMA;

const BUILTIN_HANDLES: [ModelHandle; 5] = [
    OLLAMA_DEEPSEEK,
    OLLAMA_LLAMA,
    OLLAMA_QWEN3,
    OLLAMA_QWEN3_VL,
    OLLAMA_GRANITE,
];

/// Immutable name -> handle mapping built once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    handles: Vec<ModelHandle>,
    default_index: usize,
}

static BUILTIN_REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

impl ModelRegistry {
    /// Builds a registry from `handles`. The default falls back to the first
    /// handle when `default` is not part of the list.
    pub fn new(handles: Vec<ModelHandle>, default: ModelHandle) -> Self {
        let default_index = handles
            .iter()
            .position(|handle| *handle == default)
            .unwrap_or(0);
        Self {
            handles,
            default_index,
        }
    }

    pub fn builtin() -> &'static ModelRegistry {
        BUILTIN_REGISTRY.get_or_init(|| Self::new(BUILTIN_HANDLES.to_vec(), DEFAULT_MODEL))
    }

    pub fn handles(&self) -> &[ModelHandle] {
        &self.handles
    }

    pub fn default_handle(&self) -> Option<ModelHandle> {
        self.handles.get(self.default_index).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<ModelHandle> {
        let name = name.trim();
        self.handles
            .iter()
            .find(|handle| handle.name.eq_ignore_ascii_case(name))
            .copied()
    }

    pub fn by_model_id(&self, model_id: &str) -> Option<ModelHandle> {
        let model_id = model_id.trim();
        self.handles
            .iter()
            .find(|handle| handle.model_id == model_id)
            .copied()
    }

    /// Resolves either a short name or an Ollama tag.
    pub fn resolve(&self, key: &str) -> Option<ModelHandle> {
        self.by_name(key).or_else(|| self.by_model_id(key))
    }

    pub fn models(&self) -> Vec<Model> {
        self.handles.iter().map(ModelHandle::as_model).collect()
    }
}

pub fn registry_models() -> Vec<Model> {
    ModelRegistry::builtin().models()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_keeps_declaration_order() {
        let ids = ModelRegistry::builtin()
            .handles()
            .iter()
            .map(|handle| handle.model_id())
            .collect::<Vec<_>>();

        assert_eq!(
            ids,
            vec![
                "deepseek-r1:8b",
                "llama3.1:latest",
                "qwen3:4b",
                "qwen3-vl:4b",
                "granite4:3b",
            ]
        );
    }

    #[test]
    fn resolve_accepts_short_names_and_tags() {
        let registry = ModelRegistry::builtin();

        assert_eq!(registry.resolve("qwen3"), Some(OLLAMA_QWEN3));
        assert_eq!(registry.resolve(" Granite "), Some(OLLAMA_GRANITE));
        assert_eq!(registry.resolve("qwen3-vl:4b"), Some(OLLAMA_QWEN3_VL));
        assert_eq!(registry.resolve("mistral:7b"), None);
    }

    #[test]
    fn default_falls_back_to_first_handle_when_missing() {
        let registry = ModelRegistry::new(vec![OLLAMA_GRANITE, OLLAMA_QWEN3], OLLAMA_LLAMA);
        assert_eq!(registry.default_handle(), Some(OLLAMA_GRANITE));

        assert_eq!(
            ModelRegistry::builtin().default_handle(),
            Some(OLLAMA_LLAMA)
        );
        assert_eq!(ModelRegistry::new(Vec::new(), OLLAMA_LLAMA).default_handle(), None);
    }

    #[test]
    fn handles_map_to_selector_models() {
        let model = OLLAMA_DEEPSEEK.as_model();
        assert_eq!(model.id, "deepseek-r1:8b");
        assert_eq!(model.name, "deepseek");
        assert_eq!(registry_models().len(), 5);
    }
}
