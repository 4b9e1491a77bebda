//! Model-to-vendor routing and cross-vendor model equivalence.

use itertools::Itertools;

use crate::model::Vendor;

/// Known model identifiers.
const MODELS: &[(&str, Vendor, Tier)] = &[
    ("gpt-4o", Vendor::OpenAi, Tier::Flagship),
    ("gpt-4.1", Vendor::OpenAi, Tier::Flagship),
    ("gpt-4-turbo", Vendor::OpenAi, Tier::Flagship),
    ("gpt-4o-mini", Vendor::OpenAi, Tier::Fast),
    ("gpt-4.1-mini", Vendor::OpenAi, Tier::Fast),
    ("gpt-3.5-turbo", Vendor::OpenAi, Tier::Fast),
    ("o1", Vendor::OpenAi, Tier::Reasoning),
    ("o3", Vendor::OpenAi, Tier::Reasoning),
    ("o3-mini", Vendor::OpenAi, Tier::Reasoning),
    ("o4-mini", Vendor::OpenAi, Tier::Reasoning),
    ("claude-sonnet-4-20250514", Vendor::Anthropic, Tier::Flagship),
    ("claude-3-7-sonnet-20250219", Vendor::Anthropic, Tier::Flagship),
    ("claude-3-5-sonnet-20241022", Vendor::Anthropic, Tier::Flagship),
    ("claude-3-5-haiku-20241022", Vendor::Anthropic, Tier::Fast),
    ("claude-opus-4-20250514", Vendor::Anthropic, Tier::Reasoning),
    ("gemini-2.5-pro", Vendor::Gemini, Tier::Flagship),
    ("gemini-1.5-pro", Vendor::Gemini, Tier::Flagship),
    ("gemini-2.5-flash", Vendor::Gemini, Tier::Fast),
    ("gemini-2.0-flash", Vendor::Gemini, Tier::Fast),
    ("gemini-1.5-flash", Vendor::Gemini, Tier::Fast),
];

/// Prefixes for model ids not in [`MODELS`].
const FAMILIES: &[(&str, Vendor)] = &[
    ("gpt-", Vendor::OpenAi),
    ("chatgpt-", Vendor::OpenAi),
    ("o1", Vendor::OpenAi),
    ("o3", Vendor::OpenAi),
    ("o4", Vendor::OpenAi),
    ("claude", Vendor::Anthropic),
    ("gemini", Vendor::Gemini),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Flagship,
    Fast,
    Reasoning,
}

impl Tier {
    fn model_for(self, vendor: Vendor) -> &'static str {
        match (self, vendor) {
            (Tier::Flagship, Vendor::OpenAi) => "gpt-4o",
            (Tier::Flagship, Vendor::Anthropic) => "claude-sonnet-4-20250514",
            (Tier::Flagship, Vendor::Gemini) => "gemini-2.5-pro",
            (Tier::Fast, Vendor::OpenAi) => "gpt-4o-mini",
            (Tier::Fast, Vendor::Anthropic) => "claude-3-5-haiku-20241022",
            (Tier::Fast, Vendor::Gemini) => "gemini-2.5-flash",
            (Tier::Reasoning, Vendor::OpenAi) => "o4-mini",
            (Tier::Reasoning, Vendor::Anthropic) => "claude-opus-4-20250514",
            (Tier::Reasoning, Vendor::Gemini) => "gemini-2.5-pro",
        }
    }

    /// Tier of an unlisted model id, guessed from its name.
    fn guess(model: &str) -> Tier {
        if ["o1", "o3", "o4"].iter().any(|p| model.starts_with(p)) || model.contains("opus") {
            Tier::Reasoning
        } else if ["mini", "haiku", "flash", "nano"].iter().any(|p| model.contains(p)) {
            Tier::Fast
        } else {
            Tier::Flagship
        }
    }
}

/// Static routing tables for the configured vendors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelRouter;

impl ModelRouter {
    pub fn new() -> Self {
        Self
    }

    /// Vendor owning a model id, or the vendor itself when given a vendor name.
    pub fn resolve_provider(&self, model_or_vendor: &str) -> Option<Vendor> {
        let name = model_or_vendor.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        if let Ok(vendor) = name.parse::<Vendor>() {
            return Some(vendor);
        }
        if let Some((_, vendor, _)) = MODELS.iter().find(|(id, _, _)| *id == name) {
            return Some(*vendor);
        }
        FAMILIES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, vendor)| *vendor)
    }

    /// Closest model on `vendor` to `requested`. `None` means "use the
    /// vendor's default": the request named a vendor, an unknown model, or a
    /// model `vendor` already owns.
    pub fn equivalent_model(&self, vendor: Vendor, requested: &str) -> Option<&'static str> {
        let name = requested.trim().to_ascii_lowercase();
        if name.parse::<Vendor>().is_ok() {
            return None;
        }
        let owner = self.resolve_provider(&name)?;
        if owner == vendor {
            return None;
        }
        let tier = MODELS
            .iter()
            .find(|(id, _, _)| *id == name)
            .map(|(_, _, tier)| *tier)
            .unwrap_or_else(|| Tier::guess(&name));
        Some(tier.model_for(vendor))
    }

    /// Model to request from `vendor` for a call that asked for `requested`.
    pub fn model_for(&self, vendor: Vendor, requested: Option<&str>) -> Option<String> {
        let requested = requested?.trim();
        if requested.parse::<Vendor>().is_ok() {
            return None;
        }
        if self.resolve_provider(requested) == Some(vendor) {
            return Some(requested.to_string());
        }
        self.equivalent_model(vendor, requested).map(str::to_string)
    }

    /// Every configured vendor exactly once, the requested one first.
    pub fn build_order(&self, requested: Option<&str>, configured: &[Vendor]) -> Vec<Vendor> {
        let mut order: Vec<Vendor> = configured.iter().copied().unique().collect();

        if let Some(preferred) = requested.and_then(|r| self.resolve_provider(r)) {
            if let Some(pos) = order.iter().position(|v| *v == preferred) {
                let vendor = order.remove(pos);
                order.insert(0, vendor);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Vendor; 3] = Vendor::ALL;

    #[test]
    fn test_resolve_provider() {
        let router = ModelRouter::new();
        assert_eq!(router.resolve_provider("gpt-4o"), Some(Vendor::OpenAi));
        assert_eq!(router.resolve_provider("Claude"), Some(Vendor::Anthropic));
        assert_eq!(router.resolve_provider("gemini"), Some(Vendor::Gemini));
        assert_eq!(router.resolve_provider("gpt-5-preview"), Some(Vendor::OpenAi));
        assert_eq!(router.resolve_provider("o3-pro"), Some(Vendor::OpenAi));
        assert_eq!(router.resolve_provider("llama-3"), None);
        assert_eq!(router.resolve_provider(""), None);
    }

    #[test]
    fn test_equivalent_model() {
        let router = ModelRouter::new();
        assert_eq!(router.equivalent_model(Vendor::Anthropic, "gpt-4o"), Some("claude-sonnet-4-20250514"));
        assert_eq!(router.equivalent_model(Vendor::Gemini, "gpt-4o-mini"), Some("gemini-2.5-flash"));
        assert_eq!(router.equivalent_model(Vendor::OpenAi, "claude-opus-4-20250514"), Some("o4-mini"));
        assert_eq!(router.equivalent_model(Vendor::OpenAi, "claude-3-haiku-20240307"), Some("gpt-4o-mini"));
        assert_eq!(router.equivalent_model(Vendor::OpenAi, "gpt-4o"), None);
        assert_eq!(router.equivalent_model(Vendor::OpenAi, "claude"), None);
        assert_eq!(router.equivalent_model(Vendor::OpenAi, "llama-3"), None);
    }

    #[test]
    fn test_model_for() {
        let router = ModelRouter::new();
        assert_eq!(router.model_for(Vendor::OpenAi, Some("gpt-4.1")), Some("gpt-4.1".into()));
        assert_eq!(router.model_for(Vendor::Gemini, Some("gpt-4.1")), Some("gemini-2.5-pro".into()));
        assert_eq!(router.model_for(Vendor::Gemini, Some("openai")), None);
        assert_eq!(router.model_for(Vendor::Gemini, None), None);
    }

    #[test]
    fn test_build_order_puts_requested_first() {
        let router = ModelRouter::new();
        assert_eq!(
            router.build_order(Some("claude-3-5-haiku-20241022"), &ALL),
            vec![Vendor::Anthropic, Vendor::OpenAi, Vendor::Gemini]
        );
        assert_eq!(router.build_order(None, &ALL), ALL.to_vec());
    }

    #[test]
    fn test_build_order_each_vendor_once() {
        let router = ModelRouter::new();
        let configured = [Vendor::Gemini, Vendor::OpenAi, Vendor::Gemini];
        assert_eq!(
            router.build_order(Some("gpt-4o"), &configured),
            vec![Vendor::OpenAi, Vendor::Gemini]
        );
        // An unconfigured preference leaves the configured order alone.
        assert_eq!(
            router.build_order(Some("claude"), &configured),
            vec![Vendor::Gemini, Vendor::OpenAi]
        );
    }
}
