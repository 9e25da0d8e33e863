use std::collections::HashMap;

pub const DEFAULT_REDUCED_CAPABILITY_MODELS: &[&str] = &["o1-mini", "o1-preview"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub system_role: bool,
    pub native_tools: bool,
    pub sampling_params: bool,
    pub structured_output: bool,
}

impl ModelCapabilities {
    pub const FULL: Self =
        Self { system_role: true, native_tools: true, sampling_params: true, structured_output: true };
    pub const REDUCED: Self = Self {
        system_role: false,
        native_tools: false,
        sampling_params: false,
        structured_output: false,
    };

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityTable {
    default: ModelCapabilities,
    models: HashMap<String, ModelCapabilities>,
}

impl CapabilityTable {
    pub fn new(default: ModelCapabilities) -> Self {
        Self { default, models: HashMap::new() }
    }

    pub fn with_model(mut self, model: impl Into<String>, capabilities: ModelCapabilities) -> Self {
        self.models.insert(model.into(), capabilities);
        self
    }

    pub fn with_reduced_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for model in models {
            self.models.insert(model.into(), ModelCapabilities::REDUCED);
        }
        self
    }

    pub fn lookup(&self, model: &str) -> ModelCapabilities {
        let model = model.trim();
        if let Some(capabilities) = self.models.get(model) {
            return *capabilities;
        }
        model
            .rsplit_once('/')
            .and_then(|(_, bare)| self.models.get(bare))
            .copied()
            .unwrap_or(self.default)
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new(ModelCapabilities::FULL)
            .with_reduced_models(DEFAULT_REDUCED_CAPABILITY_MODELS.iter().copied())
    }
}
